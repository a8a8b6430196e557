//! The appointment booking dialogue.
//!
//! Every collected field is set once. After any field is filled the dialogue
//! moves to the first field still missing, in the order service, date, time,
//! contact, and to the confirmation once nothing is missing. A revision from
//! the confirmation therefore reopens exactly one field and comes straight
//! back to the summary.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    availability::SlotChecker,
    dialogue::{pick_option, read_confirmation, ConfirmReply, SetOnce},
    error::DialogueError,
    extract::extract_contact,
    intent::{keyword_matches, tokens, Keyword},
    prompting::{say, BookingView, Line, Prompts},
    schedule::{parse_date, parse_time, BusinessHours, DateRejection, TimeRejection},
    types::{BookingResult, ContactDetails, DialogueStep, Language, Service},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    #[default]
    Start,
    ChooseService,
    ChooseDate,
    ChooseTime,
    CollectContact,
    Confirm,
    AskModification,
}

impl From<BookingStep> for DialogueStep {
    fn from(step: BookingStep) -> Self {
        match step {
            BookingStep::Start => DialogueStep::Start,
            BookingStep::ChooseService => DialogueStep::ChooseService,
            BookingStep::ChooseDate => DialogueStep::ChooseDate,
            BookingStep::ChooseTime => DialogueStep::ChooseTime,
            BookingStep::CollectContact => DialogueStep::CollectContact,
            BookingStep::Confirm => DialogueStep::Confirm,
            BookingStep::AskModification => DialogueStep::AskModification,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingField {
    Service,
    Date,
    Time,
    Contact,
}

impl BookingField {
    fn step(self) -> BookingStep {
        match self {
            Self::Service => BookingStep::ChooseService,
            Self::Date => BookingStep::ChooseDate,
            Self::Time => BookingStep::ChooseTime,
            Self::Contact => BookingStep::CollectContact,
        }
    }

    /// Reads which field the visitor wants to revise.
    pub fn parse(input: &str) -> Option<Self> {
        const SERVICE: &[Keyword] = &[Keyword::Stem("serviz"), Keyword::Stem("service")];
        const DATE: &[Keyword] = &[
            Keyword::Word("data"),
            Keyword::Word("date"),
            Keyword::Stem("giorn"),
            Keyword::Word("day"),
        ];
        const TIME: &[Keyword] = &[
            Keyword::Stem("orari"),
            Keyword::Word("ora"),
            Keyword::Word("time"),
            Keyword::Word("hour"),
        ];
        const CONTACT: &[Keyword] = &[
            Keyword::Word("dati"),
            Keyword::Stem("contatt"),
            Keyword::Word("nome"),
            Keyword::Word("email"),
            Keyword::Stem("telefon"),
            Keyword::Word("personal"),
            Keyword::Stem("contact"),
            Keyword::Word("name"),
            Keyword::Word("phone"),
            Keyword::Word("details"),
            Keyword::Word("info"),
        ];

        let toks = tokens(input);
        if let [only] = toks.as_slice() {
            match only.as_str() {
                "1" => return Some(Self::Service),
                "2" => return Some(Self::Date),
                "3" => return Some(Self::Time),
                "4" => return Some(Self::Contact),
                _ => {}
            }
        }
        [
            (Self::Service, SERVICE),
            (Self::Date, DATE),
            (Self::Time, TIME),
            (Self::Contact, CONTACT),
        ]
        .into_iter()
        .find(|(_, words)| words.iter().any(|k| keyword_matches(k, &toks)))
        .map(|(field, _)| field)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingDraft {
    service: SetOnce<Service>,
    date: SetOnce<NaiveDate>,
    time: SetOnce<NaiveTime>,
    contact: SetOnce<ContactDetails>,
    message: SetOnce<String>,
}

impl BookingDraft {
    pub fn service(&self) -> Option<Service> {
        self.service.get().copied()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date.get().copied()
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time.get().copied()
    }

    pub fn contact(&self) -> Option<&ContactDetails> {
        self.contact.get()
    }

    pub fn next_missing(&self) -> Option<BookingField> {
        if !self.service.is_set() {
            Some(BookingField::Service)
        } else if !self.date.is_set() {
            Some(BookingField::Date)
        } else if !self.time.is_set() {
            Some(BookingField::Time)
        } else if !self.contact.is_set() {
            Some(BookingField::Contact)
        } else {
            None
        }
    }

    /// Reopens one field. The note travels with the contact details.
    pub(crate) fn revise(&mut self, field: BookingField) {
        match field {
            BookingField::Service => {
                self.service.reopen();
            }
            BookingField::Date => {
                self.date.reopen();
            }
            BookingField::Time => {
                self.time.reopen();
            }
            BookingField::Contact => {
                self.contact.reopen();
                self.message.reopen();
            }
        }
    }

    pub fn to_result(&self) -> Result<BookingResult, DialogueError> {
        let service = self.service().ok_or(DialogueError::Incomplete("service"))?;
        let date = self.date().ok_or(DialogueError::Incomplete("date"))?;
        let time = self.time().ok_or(DialogueError::Incomplete("time"))?;
        let contact = self.contact().ok_or(DialogueError::Incomplete("contact"))?;
        Ok(BookingResult {
            service,
            date,
            time,
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            message: self.message.get().cloned(),
        })
    }

    /// Fields collected so far in wire form; unset fields are left out.
    pub fn collected(&self) -> Value {
        let mut out = Map::new();
        if let Some(service) = self.service() {
            out.insert("service".into(), json!(service));
        }
        if let Some(date) = self.date() {
            out.insert("date".into(), json!(date.format("%Y-%m-%d").to_string()));
        }
        if let Some(time) = self.time() {
            out.insert("time".into(), json!(time.format("%H:%M").to_string()));
        }
        if let Some(contact) = self.contact() {
            out.insert("name".into(), json!(contact.name));
            out.insert("email".into(), json!(contact.email));
            out.insert("phone".into(), json!(contact.phone));
        }
        if let Some(message) = self.message.get() {
            out.insert("message".into(), json!(message));
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingState {
    pub step: BookingStep,
    pub draft: BookingDraft,
}

/// Everything a booking turn reads besides its own state.
pub struct TurnContext<'a> {
    pub language: Language,
    /// Business-local wall clock.
    pub now: NaiveDateTime,
    pub hours: &'a BusinessHours,
    pub slots: &'a SlotChecker,
    pub prompts: &'a Prompts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Reply(String),
    /// The visitor confirmed; the result still has to be stored.
    Finalize(BookingResult),
}

impl BookingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one visitor message through the dialogue.
    pub async fn advance(
        &mut self,
        input: &str,
        ctx: &TurnContext<'_>,
    ) -> Result<BookingOutcome, DialogueError> {
        let lang = ctx.language;
        let reply = match self.step {
            BookingStep::Start => {
                self.step = BookingStep::ChooseService;
                ctx.prompts.service_menu(lang)?
            }
            BookingStep::ChooseService => {
                match pick_option(input, &Service::ALL, service_labels, Service::keywords) {
                    Some(service) => {
                        self.draft.service.set("service", service)?;
                        self.move_on(ctx)?
                    }
                    None => format!(
                        "{}\n\n{}",
                        say(Line::InvalidService, lang),
                        ctx.prompts.service_menu(lang)?
                    ),
                }
            }
            BookingStep::ChooseDate => self.take_date(input, ctx).await?,
            BookingStep::ChooseTime => self.take_time(input, ctx).await?,
            BookingStep::CollectContact => self.take_contact(input, ctx)?,
            BookingStep::Confirm => match read_confirmation(input) {
                ConfirmReply::Accept => return Ok(BookingOutcome::Finalize(self.draft.to_result()?)),
                ConfirmReply::Modify => {
                    self.step = BookingStep::AskModification;
                    say(Line::AskModification, lang)
                }
                ConfirmReply::Unclear => say(Line::ConfirmUnclear, lang),
            },
            BookingStep::AskModification => match BookingField::parse(input) {
                Some(field) => {
                    self.draft.revise(field);
                    self.move_on(ctx)?
                }
                None => say(Line::ModificationUnclear, lang),
            },
        };
        Ok(BookingOutcome::Reply(reply))
    }

    /// The slot went to someone else between confirmation and storage.
    pub fn reopen_time_after_conflict(&mut self) {
        self.draft.revise(BookingField::Time);
        self.step = BookingStep::ChooseTime;
    }

    fn move_on(&mut self, ctx: &TurnContext<'_>) -> Result<String, DialogueError> {
        self.step = self
            .draft
            .next_missing()
            .map(BookingField::step)
            .unwrap_or(BookingStep::Confirm);
        self.prompt(ctx)
    }

    /// The question belonging to the current step.
    fn prompt(&self, ctx: &TurnContext<'_>) -> Result<String, DialogueError> {
        let lang = ctx.language;
        Ok(match self.step {
            BookingStep::Start | BookingStep::ChooseService => ctx.prompts.service_menu(lang)?,
            BookingStep::ChooseDate => match self.draft.service() {
                Some(service) => say(Line::AskDate { service }, lang),
                None => return Err(DialogueError::Incomplete("service")),
            },
            BookingStep::ChooseTime => match self.draft.date() {
                Some(date) => say(
                    Line::AskTime {
                        date,
                        hours: ctx.hours,
                    },
                    lang,
                ),
                None => return Err(DialogueError::Incomplete("date")),
            },
            BookingStep::CollectContact => say(Line::AskContact, lang),
            BookingStep::Confirm => {
                let result = self.draft.to_result()?;
                ctx.prompts.booking_summary(lang, &BookingView::from(&result))?
            }
            BookingStep::AskModification => say(Line::AskModification, lang),
        })
    }

    async fn take_date(
        &mut self,
        input: &str,
        ctx: &TurnContext<'_>,
    ) -> Result<String, DialogueError> {
        let lang = ctx.language;
        let Some(date) = parse_date(input, ctx.now.date()) else {
            return Ok(say(Line::InvalidDate, lang));
        };
        match ctx.hours.check_date(date, ctx.now.date()) {
            Err(DateRejection::Past) => return Ok(say(Line::DateInPast, lang)),
            Err(DateRejection::Closed) => {
                return Ok(say(Line::DateClosed { hours: ctx.hours }, lang))
            }
            Ok(()) => {}
        }

        // A time kept from before a date revision must still hold on the new day.
        if let Some(time) = self.draft.time() {
            let still_valid = ctx.hours.check_time(date, time, ctx.now).is_ok()
                && ctx.slots.is_free(date, time).await;
            if !still_valid {
                self.draft.date.set("date", date)?;
                self.draft.revise(BookingField::Time);
                self.step = BookingStep::ChooseTime;
                return Ok(format!(
                    "{} {}",
                    say(Line::TimeNoLongerFree { date, time }, lang),
                    say(
                        Line::AskTime {
                            date,
                            hours: ctx.hours
                        },
                        lang
                    )
                ));
            }
        }

        self.draft.date.set("date", date)?;
        self.move_on(ctx)
    }

    async fn take_time(
        &mut self,
        input: &str,
        ctx: &TurnContext<'_>,
    ) -> Result<String, DialogueError> {
        let lang = ctx.language;
        let date = self.draft.date().ok_or(DialogueError::Incomplete("date"))?;
        let Some(time) = parse_time(input) else {
            return Ok(say(Line::InvalidTime { hours: ctx.hours }, lang));
        };
        match ctx.hours.check_time(date, time, ctx.now) {
            Err(TimeRejection::OutsideHours) => {
                return Ok(say(Line::TimeOutsideHours { hours: ctx.hours }, lang))
            }
            Err(TimeRejection::Misaligned) => {
                return Ok(say(Line::TimeMisaligned { hours: ctx.hours }, lang))
            }
            Err(TimeRejection::Past) => return Ok(say(Line::TimeInPast, lang)),
            Ok(()) => {}
        }
        if !ctx.slots.is_free(date, time).await {
            return Ok(say(Line::SlotTaken { time }, lang));
        }
        self.draft.time.set("time", time)?;
        self.move_on(ctx)
    }

    fn take_contact(&mut self, input: &str, ctx: &TurnContext<'_>) -> Result<String, DialogueError> {
        let extracted = extract_contact(input);
        let missing = extracted.missing();
        if !missing.is_empty() {
            return Ok(say(Line::ContactIncomplete { missing }, ctx.language));
        }

        self.draft.contact.set(
            "contact",
            ContactDetails {
                name: extracted.name,
                email: extracted.email,
                phone: extracted.phone,
            },
        )?;
        if let Some(note) = extracted.note {
            self.draft.message.set("message", note)?;
        }
        self.move_on(ctx)
    }
}

fn service_labels(service: Service) -> Vec<&'static str> {
    vec![
        service.label(Language::It),
        service.label(Language::En),
        service.slug(),
    ]
}
