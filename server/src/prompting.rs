//! Everything the assistant says. Multi-line replies are minijinja templates;
//! one-liners live in [`Line`].

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use minijinja::{context, Environment};
use serde::Serialize;

use crate::{
    schedule::BusinessHours,
    types::{BookingResult, Language, Service, SupportTicket, TicketCategory},
};

const SERVICE_MENU_TEMPLATE: &str = include_str!("prompts/service_menu.j2");
const SERVICES_OVERVIEW_TEMPLATE: &str = include_str!("prompts/services_overview.j2");
const BOOKING_SUMMARY_TEMPLATE: &str = include_str!("prompts/booking_summary.j2");
const BOOKING_CONFIRMED_TEMPLATE: &str = include_str!("prompts/booking_confirmed.j2");
const CATEGORY_MENU_TEMPLATE: &str = include_str!("prompts/category_menu.j2");
const TICKET_SUMMARY_TEMPLATE: &str = include_str!("prompts/ticket_summary.j2");
const TICKET_CREATED_TEMPLATE: &str = include_str!("prompts/ticket_created.j2");

#[derive(Serialize)]
struct MenuEntry {
    index: usize,
    label: &'static str,
    blurb: &'static str,
}

fn service_entries(lang: Language) -> Vec<MenuEntry> {
    Service::ALL
        .iter()
        .enumerate()
        .map(|(i, s)| MenuEntry {
            index: i + 1,
            label: s.label(lang),
            blurb: s.blurb(lang),
        })
        .collect()
}

/// Booking fields as they appear in a summary, complete or not.
pub struct BookingView<'a> {
    pub service: Service,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub message: Option<&'a str>,
}

impl<'a> From<&'a BookingResult> for BookingView<'a> {
    fn from(b: &'a BookingResult) -> Self {
        Self {
            service: b.service,
            date: b.date,
            time: b.time,
            name: &b.name,
            email: &b.email,
            phone: &b.phone,
            message: b.message.as_deref(),
        }
    }
}

pub struct Prompts {
    env: Environment<'static>,
}

impl Prompts {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("service_menu", SERVICE_MENU_TEMPLATE)?;
        env.add_template("services_overview", SERVICES_OVERVIEW_TEMPLATE)?;
        env.add_template("booking_summary", BOOKING_SUMMARY_TEMPLATE)?;
        env.add_template("booking_confirmed", BOOKING_CONFIRMED_TEMPLATE)?;
        env.add_template("category_menu", CATEGORY_MENU_TEMPLATE)?;
        env.add_template("ticket_summary", TICKET_SUMMARY_TEMPLATE)?;
        env.add_template("ticket_created", TICKET_CREATED_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, minijinja::Error> {
        let text = self.env.get_template(name)?.render(ctx)?;
        Ok(text.trim().to_string())
    }

    pub fn service_menu(&self, lang: Language) -> Result<String, minijinja::Error> {
        self.render(
            "service_menu",
            context! { lang => lang.as_str(), services => service_entries(lang) },
        )
    }

    pub fn services_overview(&self, lang: Language) -> Result<String, minijinja::Error> {
        self.render(
            "services_overview",
            context! { lang => lang.as_str(), services => service_entries(lang) },
        )
    }

    pub fn booking_summary(
        &self,
        lang: Language,
        view: &BookingView<'_>,
    ) -> Result<String, minijinja::Error> {
        self.render(
            "booking_summary",
            context! {
                lang => lang.as_str(),
                service => view.service.label(lang),
                date => display_date(view.date, lang),
                time => view.time.format("%H:%M").to_string(),
                name => view.name,
                email => view.email,
                phone => view.phone,
                message => view.message,
            },
        )
    }

    pub fn booking_confirmed(
        &self,
        lang: Language,
        booking: &BookingResult,
        reference: &str,
    ) -> Result<String, minijinja::Error> {
        self.render(
            "booking_confirmed",
            context! {
                lang => lang.as_str(),
                service => booking.service.label(lang),
                date => display_date(booking.date, lang),
                time => booking.time.format("%H:%M").to_string(),
                email => &booking.email,
                reference => reference,
            },
        )
    }

    pub fn category_menu(
        &self,
        lang: Language,
        name: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        let categories = TicketCategory::ALL
            .iter()
            .enumerate()
            .map(|(i, c)| MenuEntry {
                index: i + 1,
                label: c.label(lang),
                blurb: "",
            })
            .collect::<Vec<_>>();
        self.render(
            "category_menu",
            context! { lang => lang.as_str(), name => name, categories => categories },
        )
    }

    pub fn ticket_summary(
        &self,
        lang: Language,
        name: &str,
        email: &str,
        category: TicketCategory,
        description: &str,
    ) -> Result<String, minijinja::Error> {
        self.render(
            "ticket_summary",
            context! {
                lang => lang.as_str(),
                name => name,
                email => email,
                category => category.label(lang),
                description => description,
            },
        )
    }

    pub fn ticket_created(
        &self,
        lang: Language,
        ticket: &SupportTicket,
    ) -> Result<String, minijinja::Error> {
        self.render(
            "ticket_created",
            context! { lang => lang.as_str(), id => &ticket.id, email => &ticket.email },
        )
    }
}

fn weekday_name(day: Weekday, lang: Language) -> &'static str {
    match lang {
        Language::It => match day {
            Weekday::Mon => "lunedì",
            Weekday::Tue => "martedì",
            Weekday::Wed => "mercoledì",
            Weekday::Thu => "giovedì",
            Weekday::Fri => "venerdì",
            Weekday::Sat => "sabato",
            Weekday::Sun => "domenica",
        },
        Language::En => match day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        },
    }
}

pub fn display_date(date: NaiveDate, lang: Language) -> String {
    let day = weekday_name(date.weekday(), lang);
    match lang {
        Language::It => format!("{day} {}", date.format("%d/%m/%Y")),
        Language::En => format!("{day} {}", date.format("%Y-%m-%d")),
    }
}

fn open_days(hours: &BusinessHours, lang: Language) -> String {
    hours
        .days
        .iter()
        .map(|d| weekday_name(*d, lang))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Short replies. Variants carry whatever they interpolate.
#[derive(Debug, Clone)]
pub enum Line<'a> {
    Help,
    Cancelled,
    Apology,
    Stored { reference: &'a str },
    InvalidService,
    AskDate { service: Service },
    InvalidDate,
    DateInPast,
    DateClosed { hours: &'a BusinessHours },
    AskTime { date: NaiveDate, hours: &'a BusinessHours },
    InvalidTime { hours: &'a BusinessHours },
    TimeOutsideHours { hours: &'a BusinessHours },
    TimeMisaligned { hours: &'a BusinessHours },
    TimeInPast,
    SlotTaken { time: NaiveTime },
    TimeNoLongerFree { date: NaiveDate, time: NaiveTime },
    SlotLostAtConfirm { date: NaiveDate, time: NaiveTime },
    AskContact,
    ContactIncomplete { missing: Vec<&'static str> },
    ConfirmUnclear,
    AskModification,
    ModificationUnclear,
    AskName,
    InvalidName,
    AskEmail { name: &'a str },
    InvalidEmail,
    InvalidCategory,
    AskDescription,
    DescriptionTooShort { min: usize },
    AskTicketModification,
    TicketModificationUnclear,
}

pub fn say(line: Line<'_>, lang: Language) -> String {
    use Language::{En, It};
    match (line, lang) {
        (Line::Help, It) => "Posso aiutarti a prenotare un appuntamento, aprire una richiesta di assistenza o raccontarti i nostri servizi. Cosa ti serve?".into(),
        (Line::Help, En) => "I can book an appointment for you, open a support request or tell you about our services. What do you need?".into(),
        (Line::Cancelled, It) => "Va bene, ho annullato. Se ti serve altro sono qui.".into(),
        (Line::Cancelled, En) => "All right, I've cancelled that. I'm here if you need anything else.".into(),
        (Line::Apology, It) => "Scusa, qualcosa è andato storto dalla nostra parte. Riprova tra qualche istante.".into(),
        (Line::Apology, En) => "Sorry, something went wrong on our side. Please try again in a moment.".into(),

        (Line::Stored { reference }, It) => format!("Fatto! Il codice di riferimento è {reference}."),
        (Line::Stored { reference }, En) => format!("Done! Your reference is {reference}."),

        (Line::InvalidService, It) => "Non ho capito quale servizio ti interessa. Rispondi con un numero da 1 a 4 oppure con il nome del servizio.".into(),
        (Line::InvalidService, En) => "I didn't catch which service you mean. Reply with a number from 1 to 4 or the name of the service.".into(),
        (Line::AskDate { service }, It) => format!(
            "Ottima scelta: {}. Per quale giorno vuoi fissare l'appuntamento? (es. 10/03/2025 oppure 2025-03-10)",
            service.label(It)
        ),
        (Line::AskDate { service }, En) => format!(
            "Great choice: {}. Which day works for you? (e.g. 2025-03-10 or 10/03/2025)",
            service.label(En)
        ),
        (Line::InvalidDate, It) => "Non riesco a leggere la data. Scrivila come 10/03/2025 oppure 2025-03-10.".into(),
        (Line::InvalidDate, En) => "I couldn't read that date. Please write it as 2025-03-10 or 10/03/2025.".into(),
        (Line::DateInPast, It) => "Quella data è già passata. Scegli un giorno a partire da oggi.".into(),
        (Line::DateInPast, En) => "That date has already passed. Please pick a day from today onwards.".into(),
        (Line::DateClosed { hours }, lang) => match lang {
            It => format!("Quel giorno siamo chiusi. Riceviamo solo {}. Scegli un altro giorno.", open_days(hours, It)),
            En => format!("We're closed that day. We're open on {}. Please pick another day.", open_days(hours, En)),
        },
        (Line::AskTime { date, hours }, It) => format!(
            "Perfetto, {}. A che ora? Siamo disponibili {} con appuntamenti ogni {} minuti.",
            display_date(date, It),
            hours.hours_label(),
            hours.slot_minutes
        ),
        (Line::AskTime { date, hours }, En) => format!(
            "Perfect, {}. What time? We're available {} with a slot every {} minutes.",
            display_date(date, En),
            hours.hours_label(),
            hours.slot_minutes
        ),
        (Line::InvalidTime { hours }, It) => format!(
            "Orario non valido. Indica un orario tra {}, ad esempio 14:00.",
            hours.hours_label()
        ),
        (Line::InvalidTime { hours }, En) => format!(
            "That's not a valid time. Pick a time between {}, for example 14:00.",
            hours.hours_label()
        ),
        (Line::TimeOutsideHours { hours }, It) => format!(
            "A quell'ora siamo chiusi. Riceviamo {}.",
            hours.hours_label()
        ),
        (Line::TimeOutsideHours { hours }, En) => format!(
            "We're not available at that time. Our hours are {}.",
            hours.hours_label()
        ),
        (Line::TimeMisaligned { hours }, It) => format!(
            "Gli appuntamenti partono ogni {} minuti dalle {}. Scegli un orario come 14:00 o 14:30.",
            hours.slot_minutes,
            hours.open.format("%H:%M")
        ),
        (Line::TimeMisaligned { hours }, En) => format!(
            "Appointments start every {} minutes from {}. Pick a time like 14:00 or 14:30.",
            hours.slot_minutes,
            hours.open.format("%H:%M")
        ),
        (Line::TimeInPast, It) => "Quell'orario è già passato. Scegline uno più avanti.".into(),
        (Line::TimeInPast, En) => "That time has already passed. Please pick a later one.".into(),
        (Line::SlotTaken { time }, It) => format!(
            "Le {} sono già occupate. Scegli un altro orario.",
            time.format("%H:%M")
        ),
        (Line::SlotTaken { time }, En) => format!(
            "{} is already taken. Please choose another time.",
            time.format("%H:%M")
        ),
        (Line::TimeNoLongerFree { date, time }, It) => format!(
            "Per {} l'orario delle {} non è disponibile. Scegli un altro orario.",
            display_date(date, It),
            time.format("%H:%M")
        ),
        (Line::TimeNoLongerFree { date, time }, En) => format!(
            "{} isn't available on {}. Please choose another time.",
            time.format("%H:%M"),
            display_date(date, En)
        ),
        (Line::SlotLostAtConfirm { date, time }, It) => format!(
            "Mi dispiace, nel frattempo le {} di {} sono state prenotate. Scegli un altro orario per lo stesso giorno.",
            time.format("%H:%M"),
            display_date(date, It)
        ),
        (Line::SlotLostAtConfirm { date, time }, En) => format!(
            "Sorry, {} on {} was booked in the meantime. Please choose another time that day.",
            time.format("%H:%M"),
            display_date(date, En)
        ),
        (Line::AskContact, It) => "Ora mi servono i tuoi dati: nome e cognome, email e telefono, separati da una virgola. Esempio: Mario Rossi, mario@example.com, 3331234567".into(),
        (Line::AskContact, En) => "Now I need your details: full name, email and phone, separated by commas. Example: Mario Rossi, mario@example.com, 3331234567".into(),
        (Line::ContactIncomplete { missing }, lang) => {
            let missing = missing
                .iter()
                .map(|field| contact_field_label(field, lang))
                .collect::<Vec<_>>();
            match lang {
                It => format!(
                    "Non sono riuscito a leggere: {}. Scrivi nome, email e telefono separati da una virgola, ad esempio: Mario Rossi, mario@example.com, 3331234567",
                    missing.join(", ")
                ),
                En => format!(
                    "I couldn't read your {}. Write name, email and phone separated by commas, for example: Mario Rossi, mario@example.com, 3331234567",
                    missing.join(", ")
                ),
            }
        }
        (Line::ConfirmUnclear, It) => "Rispondi \"confermo\" per procedere oppure \"modifica\" per cambiare un dato.".into(),
        (Line::ConfirmUnclear, En) => "Reply \"confirm\" to go ahead or \"change\" to edit something.".into(),
        (Line::AskModification, It) => "Cosa vuoi modificare: servizio, data, orario o dati di contatto?".into(),
        (Line::AskModification, En) => "What would you like to change: service, date, time or contact details?".into(),
        (Line::ModificationUnclear, It) => "Non ho capito. Scrivi servizio, data, orario oppure dati.".into(),
        (Line::ModificationUnclear, En) => "Sorry, I didn't get that. Write service, date, time or details.".into(),

        (Line::AskName, It) => "Certo, apriamo una richiesta di assistenza. Come ti chiami?".into(),
        (Line::AskName, En) => "Sure, let's open a support request. What's your name?".into(),
        (Line::InvalidName, It) => "Mi serve un nome valido, senza numeri. Come ti chiami?".into(),
        (Line::InvalidName, En) => "I need a valid name without digits. What's your name?".into(),
        (Line::AskEmail { name }, It) => format!("Piacere, {name}. A quale email possiamo risponderti?"),
        (Line::AskEmail { name }, En) => format!("Nice to meet you, {name}. Which email should we reply to?"),
        (Line::InvalidEmail, It) => "L'indirizzo email non sembra valido. Riprova, ad esempio mario@example.com.".into(),
        (Line::InvalidEmail, En) => "That email address doesn't look right. Try again, for example mario@example.com.".into(),
        (Line::InvalidCategory, It) => "Scegli una categoria con un numero da 1 a 4.".into(),
        (Line::InvalidCategory, En) => "Please pick a category with a number from 1 to 4.".into(),
        (Line::AskDescription, It) => "Descrivi il problema in qualche riga.".into(),
        (Line::AskDescription, En) => "Describe the problem in a few lines.".into(),
        (Line::DescriptionTooShort { min }, It) => format!("Aggiungi qualche dettaglio in più (almeno {min} caratteri)."),
        (Line::DescriptionTooShort { min }, En) => format!("Please add a bit more detail (at least {min} characters)."),
        (Line::AskTicketModification, It) => "Cosa vuoi modificare: nome, email, categoria o descrizione?".into(),
        (Line::AskTicketModification, En) => "What would you like to change: name, email, category or description?".into(),
        (Line::TicketModificationUnclear, It) => "Non ho capito. Scrivi nome, email, categoria oppure descrizione.".into(),
        (Line::TicketModificationUnclear, En) => "Sorry, I didn't get that. Write name, email, category or description.".into(),
    }
}

fn contact_field_label(field: &str, lang: Language) -> &'static str {
    match (field, lang) {
        ("name", Language::It) => "nome",
        ("email", _) => "email",
        ("phone", Language::It) => "telefono",
        ("name", Language::En) => "name",
        ("phone", Language::En) => "phone",
        (_, Language::It) => "dati",
        (_, Language::En) => "details",
    }
}
