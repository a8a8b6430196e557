//! Pieces shared by the booking and support dialogues.

use serde::{Deserialize, Serialize};

use crate::{
    error::DialogueError,
    intent::{keyword_matches, tokens, Keyword},
};

/// A collected field that can be filled once. Reopening it is crate-private so
/// only the explicit modify sub-flows can do it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetOnce<T>(Option<T>);

impl<T> Default for SetOnce<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> SetOnce<T> {
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn set(&mut self, field: &'static str, value: T) -> Result<(), DialogueError> {
        if self.0.is_some() {
            return Err(DialogueError::FieldAlreadySet(field));
        }
        self.0 = Some(value);
        Ok(())
    }

    pub(crate) fn reopen(&mut self) -> Option<T> {
        self.0.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReply {
    Accept,
    Modify,
    Unclear,
}

const MODIFY: &[Keyword] = &[
    Keyword::Stem("modific"),
    Keyword::Stem("cambi"),
    Keyword::Stem("corregg"),
    Keyword::Stem("sbagliat"),
    Keyword::Stem("modify"),
    Keyword::Stem("change"),
    Keyword::Word("edit"),
    Keyword::Word("fix"),
    Keyword::Word("wrong"),
    Keyword::Word("update"),
];

const NEGATIVE_OPENERS: &[&str] = &["no", "nope", "nah"];
const NEGATORS: &[&str] = &["non", "not", "don't"];

const AFFIRMATIVE: &[Keyword] = &[
    Keyword::Stem("conferm"),
    Keyword::Word("si"),
    Keyword::Word("sì"),
    Keyword::Word("ok"),
    Keyword::Word("okay"),
    Keyword::Word("certo"),
    Keyword::Word("esatto"),
    Keyword::Word("perfetto"),
    Keyword::Word("procedi"),
    Keyword::Phrase("va bene"),
    Keyword::Phrase("tutto ok"),
    Keyword::Word("yes"),
    Keyword::Word("yep"),
    Keyword::Word("y"),
    Keyword::Stem("confirm"),
    Keyword::Word("correct"),
    Keyword::Word("sure"),
    Keyword::Phrase("go ahead"),
];

/// Modify wins over everything, a negative answer counts as modify, then affirmatives.
pub fn read_confirmation(input: &str) -> ConfirmReply {
    let toks = tokens(input);
    if MODIFY.iter().any(|k| keyword_matches(k, &toks)) || is_negative(&toks) {
        ConfirmReply::Modify
    } else if AFFIRMATIVE.iter().any(|k| keyword_matches(k, &toks)) {
        ConfirmReply::Accept
    } else {
        ConfirmReply::Unclear
    }
}

/// A reply that opens with "no", or negates a confirm word ("non confermo",
/// "not correct"). A "non" elsewhere ("non vedo l'ora") is not a refusal.
fn is_negative(toks: &[String]) -> bool {
    let opens_with_no = match toks {
        [first, rest @ ..] if NEGATIVE_OPENERS.contains(&first.as_str()) => {
            !matches!(rest.first().map(String::as_str), Some("problem" | "problema" | "worries"))
        }
        _ => false,
    };
    opens_with_no
        || toks.iter().enumerate().any(|(i, tok)| {
            NEGATORS.contains(&tok.as_str())
                && AFFIRMATIVE.iter().any(|k| starts_with_keyword(k, &toks[i + 1..]))
        })
}

fn starts_with_keyword(keyword: &Keyword, toks: &[String]) -> bool {
    match keyword {
        Keyword::Word(word) => toks.first().is_some_and(|t| t == word),
        Keyword::Stem(stem) => toks.first().is_some_and(|t| t.starts_with(stem)),
        Keyword::Phrase(phrase) => {
            let wanted = phrase.split_whitespace().collect::<Vec<_>>();
            toks.len() >= wanted.len() && toks.iter().zip(&wanted).all(|(a, b)| a == b)
        }
    }
}

/// True when the whole message is a request to abandon the current flow.
pub fn is_cancel(input: &str) -> bool {
    let normalized = tokens(input).join(" ");
    matches!(
        normalized.as_str(),
        "annulla" | "annullare" | "cancel" | "stop" | "esci" | "exit" | "ricomincia" | "quit"
    )
}

/// Picks the one option whose index, label or keyword matches the input.
/// Returns `None` when nothing matches or several options do.
pub fn pick_option<T: Copy + PartialEq>(
    input: &str,
    options: &[T],
    label: impl Fn(T) -> Vec<&'static str>,
    keywords: impl Fn(T) -> &'static [&'static str],
) -> Option<T> {
    let trimmed = input.trim().trim_end_matches(['.', ')', '!']).trim();
    let toks = tokens(trimmed);

    let index_token = match toks.as_slice() {
        [only] => Some(only.as_str()),
        [word, n] if matches!(word.as_str(), "opzione" | "option" | "numero" | "number" | "n") => {
            Some(n.as_str())
        }
        _ => None,
    };
    if let Some(index) = index_token.and_then(|t| t.parse::<usize>().ok()) {
        return index.checked_sub(1).and_then(|i| options.get(i)).copied();
    }

    let lowered = trimmed.to_lowercase();
    if let Some(exact) = options
        .iter()
        .copied()
        .find(|&o| label(o).iter().any(|l| l.to_lowercase() == lowered))
    {
        return Some(exact);
    }

    let mut matched = options
        .iter()
        .copied()
        .filter(|&o| keywords(o).iter().any(|k| crate::intent::stem_matches(k, &toks)));
    let first = matched.next()?;
    if matched.next().is_some() {
        return None;
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_once_refuses_overwrites() {
        let mut cell = SetOnce::default();
        cell.set("time", 14).unwrap();
        assert!(matches!(
            cell.set("time", 15),
            Err(DialogueError::FieldAlreadySet("time"))
        ));
        assert_eq!(cell.get(), Some(&14));
        assert_eq!(cell.reopen(), Some(14));
        cell.set("time", 15).unwrap();
        assert_eq!(cell.get(), Some(&15));
    }

    #[test]
    fn confirmation_words() {
        assert_eq!(read_confirmation("confermo"), ConfirmReply::Accept);
        assert_eq!(read_confirmation("Sì, va bene"), ConfirmReply::Accept);
        assert_eq!(read_confirmation("yes please"), ConfirmReply::Accept);
        assert_eq!(read_confirmation("modifica"), ConfirmReply::Modify);
        assert_eq!(read_confirmation("sì ma vorrei cambiare l'orario"), ConfirmReply::Modify);
        assert_eq!(read_confirmation("no"), ConfirmReply::Modify);
        assert_eq!(read_confirmation("non confermo"), ConfirmReply::Modify);
        assert_eq!(read_confirmation("no grazie"), ConfirmReply::Modify);
        assert_eq!(read_confirmation("non va bene"), ConfirmReply::Modify);
        assert_eq!(read_confirmation("that's not correct"), ConfirmReply::Modify);
    }

    #[test]
    fn a_stray_non_does_not_refuse() {
        assert_eq!(
            read_confirmation("perfetto, non vedo l'ora"),
            ConfirmReply::Accept
        );
        assert_eq!(read_confirmation("sì, non c'è problema"), ConfirmReply::Accept);
        assert_eq!(read_confirmation("no problem, confirm"), ConfirmReply::Accept);
        assert_eq!(
            read_confirmation("Mario Rossi, mario@example.com, 3331234567"),
            ConfirmReply::Unclear
        );
    }

    #[test]
    fn cancel_needs_the_whole_message() {
        assert!(is_cancel("Annulla"));
        assert!(is_cancel(" stop! "));
        assert!(!is_cancel("il server si stop-pa sempre"));
        assert!(!is_cancel("non annullare"));
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Fruit {
        Apple,
        Pear,
    }

    fn fruit_label(f: Fruit) -> Vec<&'static str> {
        match f {
            Fruit::Apple => vec!["Mela rossa"],
            Fruit::Pear => vec!["Pera"],
        }
    }

    fn fruit_keywords(f: Fruit) -> &'static [&'static str] {
        match f {
            Fruit::Apple => &["mela", "rossa"],
            Fruit::Pear => &["pera", "rossa"],
        }
    }

    #[test]
    fn pick_option_by_index_label_or_keyword() {
        let options = [Fruit::Apple, Fruit::Pear];
        let pick = |input: &str| pick_option(input, &options, fruit_label, fruit_keywords);
        assert_eq!(pick("1"), Some(Fruit::Apple));
        assert_eq!(pick("2."), Some(Fruit::Pear));
        assert_eq!(pick("opzione 2"), Some(Fruit::Pear));
        assert_eq!(pick("3"), None);
        assert_eq!(pick("0"), None);
        assert_eq!(pick("mela rossa"), Some(Fruit::Apple));
        assert_eq!(pick("una pera"), Some(Fruit::Pear));
        assert_eq!(pick("rossa"), None);
        assert_eq!(pick("banana"), None);
    }
}
