use crate::types::{Intent, Language};

/// One entry of a keyword list.
#[derive(Debug, Clone, Copy)]
pub enum Keyword {
    /// Matches a whole token.
    Word(&'static str),
    /// Matches any token starting with the stem, so inflections come for free.
    Stem(&'static str),
    /// Matches a run of consecutive tokens.
    Phrase(&'static str),
}

use Keyword::{Phrase, Stem, Word};

const BOOKING_IT: &[Keyword] = &[
    Stem("prenot"),
    Stem("appuntament"),
    Phrase("fissare un"),
    Phrase("fissiamo"),
    Stem("disponibilit"),
    Phrase("una call"),
    Phrase("videochiamata"),
    Phrase("incontrarci"),
    Stem("incontr"),
    Stem("riserv"),
];

const BOOKING_EN: &[Keyword] = &[
    Stem("book"),
    Stem("appointment"),
    Stem("schedul"),
    Stem("reserv"),
    Phrase("set up a call"),
    Phrase("a call"),
    Stem("meeting"),
    Word("meet"),
    Stem("availab"),
];

const SUPPORT_IT: &[Keyword] = &[
    Stem("assistenz"),
    Stem("support"),
    Stem("problem"),
    Word("aiuto"),
    Word("aiutatemi"),
    Word("ticket"),
    Stem("guast"),
    Phrase("non funziona"),
    Phrase("non va"),
    Stem("error"),
    Stem("segnal"),
    Word("bug"),
];

const SUPPORT_EN: &[Keyword] = &[
    Stem("support"),
    Word("help"),
    Stem("problem"),
    Stem("issue"),
    Word("ticket"),
    Phrase("not working"),
    Phrase("doesn't work"),
    Phrase("does not work"),
    Stem("broke"),
    Word("bug"),
    Stem("error"),
    Word("complaint"),
];

const SERVICES_IT: &[Keyword] = &[
    Stem("serviz"),
    Phrase("cosa fate"),
    Phrase("di cosa vi occupate"),
    Stem("offrit"),
    Stem("prezz"),
    Stem("cost"),
    Stem("listin"),
    Stem("preventiv"),
    Stem("tariff"),
];

const SERVICES_EN: &[Keyword] = &[
    Stem("service"),
    Phrase("what do you do"),
    Phrase("what do you offer"),
    Stem("offer"),
    Stem("pric"),
    Stem("cost"),
    Stem("quote"),
    Stem("rates"),
];

fn lists(language: Language) -> [(Intent, &'static [Keyword]); 3] {
    match language {
        Language::It => [
            (Intent::Booking, BOOKING_IT),
            (Intent::Support, SUPPORT_IT),
            (Intent::Services, SERVICES_IT),
        ],
        Language::En => [
            (Intent::Booking, BOOKING_EN),
            (Intent::Support, SUPPORT_EN),
            (Intent::Services, SERVICES_EN),
        ],
    }
}

/// Lower-cases and splits on anything but letters, digits and `'`, `@`, `-`.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '@' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn keyword_matches(keyword: &Keyword, tokens: &[String]) -> bool {
    match keyword {
        Word(word) => tokens.iter().any(|t| t == word),
        Stem(stem) => tokens.iter().any(|t| t.starts_with(stem)),
        Phrase(phrase) => {
            let wanted = phrase.split_whitespace().collect::<Vec<_>>();
            tokens
                .windows(wanted.len())
                .any(|window| window.iter().zip(&wanted).all(|(a, b)| a == b))
        }
    }
}

/// Short stems (three letters or fewer) must match a whole token, longer ones prefix.
pub fn stem_matches(stem: &str, tokens: &[String]) -> bool {
    if stem.chars().count() <= 3 {
        tokens.iter().any(|t| t == stem)
    } else {
        tokens.iter().any(|t| t.starts_with(stem))
    }
}

pub fn classify(utterance: &str, language: Language) -> Intent {
    let tokens = tokens(utterance);
    if tokens.is_empty() {
        return Intent::General;
    }
    for lang in [language, language.other()] {
        for (intent, keywords) in lists(lang) {
            if keywords.iter().any(|k| keyword_matches(k, &tokens)) {
                return intent;
            }
        }
    }
    Intent::General
}
