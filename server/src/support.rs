//! The support ticket dialogue. Same shape as booking, fewer fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    dialogue::{pick_option, read_confirmation, ConfirmReply, SetOnce},
    error::DialogueError,
    extract::{is_plausible_name, is_valid_email},
    intent::{keyword_matches, tokens, Keyword},
    prompting::{say, Line, Prompts},
    types::{DialogueStep, Language, SupportTicket, TicketCategory, TicketPriority, TicketStatus},
};

pub const MIN_DESCRIPTION_CHARS: usize = 10;
const MAX_NAME_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStep {
    #[default]
    Initial,
    Name,
    Email,
    Category,
    Description,
    Confirmation,
    AskTicketModification,
}

impl From<SupportStep> for DialogueStep {
    fn from(step: SupportStep) -> Self {
        match step {
            SupportStep::Initial => DialogueStep::Initial,
            SupportStep::Name => DialogueStep::Name,
            SupportStep::Email => DialogueStep::Email,
            SupportStep::Category => DialogueStep::Category,
            SupportStep::Description => DialogueStep::Description,
            SupportStep::Confirmation => DialogueStep::Confirmation,
            SupportStep::AskTicketModification => DialogueStep::AskTicketModification,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportField {
    Name,
    Email,
    Category,
    Description,
}

impl SupportField {
    fn step(self) -> SupportStep {
        match self {
            Self::Name => SupportStep::Name,
            Self::Email => SupportStep::Email,
            Self::Category => SupportStep::Category,
            Self::Description => SupportStep::Description,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        const NAME: &[Keyword] = &[Keyword::Word("nome"), Keyword::Word("name")];
        const EMAIL: &[Keyword] = &[
            Keyword::Word("email"),
            Keyword::Word("e-mail"),
            Keyword::Word("mail"),
            Keyword::Stem("indirizz"),
            Keyword::Word("address"),
        ];
        const CATEGORY: &[Keyword] = &[
            Keyword::Stem("categori"),
            Keyword::Word("category"),
            Keyword::Word("tipo"),
            Keyword::Word("type"),
        ];
        const DESCRIPTION: &[Keyword] = &[
            Keyword::Stem("descri"),
            Keyword::Stem("problem"),
            Keyword::Word("testo"),
            Keyword::Word("text"),
            Keyword::Word("details"),
        ];

        let toks = tokens(input);
        if let [only] = toks.as_slice() {
            match only.as_str() {
                "1" => return Some(Self::Name),
                "2" => return Some(Self::Email),
                "3" => return Some(Self::Category),
                "4" => return Some(Self::Description),
                _ => {}
            }
        }
        [
            (Self::Name, NAME),
            (Self::Email, EMAIL),
            (Self::Category, CATEGORY),
            (Self::Description, DESCRIPTION),
        ]
        .into_iter()
        .find(|(_, words)| words.iter().any(|k| keyword_matches(k, &toks)))
        .map(|(field, _)| field)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportDraft {
    name: SetOnce<String>,
    email: SetOnce<String>,
    category: SetOnce<TicketCategory>,
    description: SetOnce<String>,
}

impl SupportDraft {
    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.email.get().map(String::as_str)
    }

    pub fn category(&self) -> Option<TicketCategory> {
        self.category.get().copied()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.get().map(String::as_str)
    }

    pub fn next_missing(&self) -> Option<SupportField> {
        if !self.name.is_set() {
            Some(SupportField::Name)
        } else if !self.email.is_set() {
            Some(SupportField::Email)
        } else if !self.category.is_set() {
            Some(SupportField::Category)
        } else if !self.description.is_set() {
            Some(SupportField::Description)
        } else {
            None
        }
    }

    pub(crate) fn revise(&mut self, field: SupportField) {
        match field {
            SupportField::Name => {
                self.name.reopen();
            }
            SupportField::Email => {
                self.email.reopen();
            }
            SupportField::Category => {
                self.category.reopen();
            }
            SupportField::Description => {
                self.description.reopen();
            }
        }
    }

    /// Builds the ticket, stamping its id from the creation time.
    pub fn to_ticket(&self, now: DateTime<Utc>) -> Result<SupportTicket, DialogueError> {
        Ok(SupportTicket {
            id: format!("TICKET-{}", now.timestamp_millis()),
            name: self.name().ok_or(DialogueError::Incomplete("name"))?.to_string(),
            email: self.email().ok_or(DialogueError::Incomplete("email"))?.to_string(),
            category: self.category().ok_or(DialogueError::Incomplete("category"))?,
            description: self
                .description()
                .ok_or(DialogueError::Incomplete("description"))?
                .to_string(),
            priority: TicketPriority::default(),
            status: TicketStatus::default(),
            created_at: now,
        })
    }

    pub fn collected(&self) -> Value {
        let mut out = Map::new();
        if let Some(name) = self.name() {
            out.insert("name".into(), json!(name));
        }
        if let Some(email) = self.email() {
            out.insert("email".into(), json!(email));
        }
        if let Some(category) = self.category() {
            out.insert("category".into(), json!(category));
        }
        if let Some(description) = self.description() {
            out.insert("description".into(), json!(description));
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportState {
    pub step: SupportStep,
    pub draft: SupportDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportOutcome {
    Reply(String),
    /// Confirmed; the caller stamps and stores the ticket.
    CreateTicket,
}

impl SupportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(
        &mut self,
        input: &str,
        lang: Language,
        prompts: &Prompts,
    ) -> Result<SupportOutcome, DialogueError> {
        let input = input.trim();
        let reply = match self.step {
            SupportStep::Initial => {
                self.step = SupportStep::Name;
                say(Line::AskName, lang)
            }
            SupportStep::Name => {
                let name = input.split_whitespace().collect::<Vec<_>>().join(" ");
                if is_plausible_name(&name) && name.chars().count() <= MAX_NAME_CHARS {
                    self.draft.name.set("name", name)?;
                    self.move_on(lang, prompts)?
                } else {
                    say(Line::InvalidName, lang)
                }
            }
            SupportStep::Email => {
                if is_valid_email(input) {
                    self.draft.email.set("email", input.to_string())?;
                    self.move_on(lang, prompts)?
                } else {
                    say(Line::InvalidEmail, lang)
                }
            }
            SupportStep::Category => match pick_option(
                input,
                &TicketCategory::ALL,
                category_labels,
                TicketCategory::keywords,
            ) {
                Some(category) => {
                    self.draft.category.set("category", category)?;
                    self.move_on(lang, prompts)?
                }
                None => format!(
                    "{}\n\n{}",
                    say(Line::InvalidCategory, lang),
                    prompts.category_menu(lang, None)?
                ),
            },
            SupportStep::Description => {
                if non_blank_chars(input) >= MIN_DESCRIPTION_CHARS {
                    self.draft.description.set("description", input.to_string())?;
                    self.move_on(lang, prompts)?
                } else {
                    say(
                        Line::DescriptionTooShort {
                            min: MIN_DESCRIPTION_CHARS,
                        },
                        lang,
                    )
                }
            }
            SupportStep::Confirmation => match read_confirmation(input) {
                ConfirmReply::Accept => return Ok(SupportOutcome::CreateTicket),
                ConfirmReply::Modify => {
                    self.step = SupportStep::AskTicketModification;
                    say(Line::AskTicketModification, lang)
                }
                ConfirmReply::Unclear => say(Line::ConfirmUnclear, lang),
            },
            SupportStep::AskTicketModification => match SupportField::parse(input) {
                Some(field) => {
                    self.draft.revise(field);
                    self.move_on(lang, prompts)?
                }
                None => say(Line::TicketModificationUnclear, lang),
            },
        };
        Ok(SupportOutcome::Reply(reply))
    }

    fn move_on(&mut self, lang: Language, prompts: &Prompts) -> Result<String, DialogueError> {
        self.step = self
            .draft
            .next_missing()
            .map(SupportField::step)
            .unwrap_or(SupportStep::Confirmation);
        Ok(match self.step {
            SupportStep::Initial | SupportStep::Name => say(Line::AskName, lang),
            SupportStep::Email => say(
                Line::AskEmail {
                    name: self.draft.name().unwrap_or_default(),
                },
                lang,
            ),
            SupportStep::Category => prompts.category_menu(lang, self.draft.name())?,
            SupportStep::Description => say(Line::AskDescription, lang),
            SupportStep::Confirmation => prompts.ticket_summary(
                lang,
                self.draft.name().ok_or(DialogueError::Incomplete("name"))?,
                self.draft.email().ok_or(DialogueError::Incomplete("email"))?,
                self.draft
                    .category()
                    .ok_or(DialogueError::Incomplete("category"))?,
                self.draft
                    .description()
                    .ok_or(DialogueError::Incomplete("description"))?,
            )?,
            SupportStep::AskTicketModification => say(Line::AskTicketModification, lang),
        })
    }
}

fn non_blank_chars(input: &str) -> usize {
    input.chars().filter(|c| !c.is_whitespace()).count()
}

fn category_labels(category: TicketCategory) -> Vec<&'static str> {
    vec![
        category.label(Language::It),
        category.label(Language::En),
        category.slug(),
    ]
}
