use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    It,
    En,
}

impl Language {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "it" | "it-it" | "ita" | "italian" | "italiano" => Some(Self::It),
            "en" | "en-us" | "en-gb" | "eng" | "english" => Some(Self::En),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::It => "it",
            Self::En => "en",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::It => Self::En,
            Self::En => Self::It,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Booking,
    Support,
    Services,
    General,
}

/// The agency offerings shown in the booking menu, in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    WebDevelopment,
    DigitalMarketing,
    Seo,
    BrandStrategy,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::WebDevelopment,
        Service::DigitalMarketing,
        Service::Seo,
        Service::BrandStrategy,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Self::WebDevelopment => "web_development",
            Self::DigitalMarketing => "digital_marketing",
            Self::Seo => "seo",
            Self::BrandStrategy => "brand_strategy",
        }
    }

    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (Self::WebDevelopment, Language::It) => "Sviluppo siti web ed e-commerce",
            (Self::WebDevelopment, Language::En) => "Website & e-commerce development",
            (Self::DigitalMarketing, Language::It) => "Marketing digitale e social",
            (Self::DigitalMarketing, Language::En) => "Digital & social marketing",
            (Self::Seo, Language::It) => "SEO e posizionamento",
            (Self::Seo, Language::En) => "SEO & search ranking",
            (Self::BrandStrategy, Language::It) => "Consulenza strategica e branding",
            (Self::BrandStrategy, Language::En) => "Brand strategy consulting",
        }
    }

    pub fn blurb(self, language: Language) -> &'static str {
        match (self, language) {
            (Self::WebDevelopment, Language::It) => "siti veloci, e-commerce e web app su misura",
            (Self::WebDevelopment, Language::En) => "fast websites, online shops and custom web apps",
            (Self::DigitalMarketing, Language::It) => "campagne social, advertising e newsletter",
            (Self::DigitalMarketing, Language::En) => "social campaigns, advertising and newsletters",
            (Self::Seo, Language::It) => "audit tecnico, contenuti e crescita organica su Google",
            (Self::Seo, Language::En) => "technical audits, content and organic growth on Google",
            (Self::BrandStrategy, Language::It) => "identità di marca, posizionamento e piani di crescita",
            (Self::BrandStrategy, Language::En) => "brand identity, positioning and growth plans",
        }
    }

    /// Word stems that select this service from free text, across both languages.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::WebDevelopment => &[
                "sito", "siti", "web", "website", "ecommerce", "e-commerce", "sviluppo",
                "development", "app",
            ],
            Self::DigitalMarketing => &[
                "marketing", "social", "ads", "advertising", "pubblicit", "campagn", "campaign",
                "newsletter",
            ],
            Self::Seo => &["seo", "posizionamento", "ranking", "google", "search", "ricerca"],
            Self::BrandStrategy => &[
                "consulenza", "consulting", "strategi", "strategy", "brand", "branding", "logo",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Technical,
    Billing,
    Account,
    Other,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 4] = [
        TicketCategory::Technical,
        TicketCategory::Billing,
        TicketCategory::Account,
        TicketCategory::Other,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Billing => "billing",
            Self::Account => "account",
            Self::Other => "other",
        }
    }

    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (Self::Technical, Language::It) => "Problema tecnico",
            (Self::Technical, Language::En) => "Technical issue",
            (Self::Billing, Language::It) => "Fatturazione e pagamenti",
            (Self::Billing, Language::En) => "Billing & payments",
            (Self::Account, Language::It) => "Account e accesso",
            (Self::Account, Language::En) => "Account & access",
            (Self::Other, Language::It) => "Altro",
            (Self::Other, Language::En) => "Other",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Technical => &[
                "tecnic", "technical", "errore", "error", "bug", "sito", "site", "server",
                "funziona",
            ],
            Self::Billing => &[
                "fattur", "billing", "invoice", "pagament", "payment", "prezzo", "price",
            ],
            Self::Account => &["account", "accesso", "login", "password", "access", "credenziali"],
            Self::Other => &["altro", "other", "varie"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TicketPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Open,
    Pending,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Terminal value of the booking dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResult {
    pub service: Service,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    pub id: String,
    pub name: String,
    pub email: String,
    pub category: TicketCategory,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Booking,
    Support,
}

/// Step names exposed to clients. Booking and support steps share one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStep {
    General,
    Start,
    ChooseService,
    ChooseDate,
    ChooseTime,
    CollectContact,
    Confirm,
    AskModification,
    Finalize,
    Initial,
    Name,
    Email,
    Category,
    Description,
    Confirmation,
    AskTicketModification,
    TicketCreated,
}

/// Which flow a turn should prefer when the session is not already inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryPoint {
    #[default]
    Auto,
    Booking,
    Support,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub step: DialogueStep,
    pub completed: bool,
    pub data: Value,
    pub flow: Option<FlowKind>,
    pub reference: Option<String>,
    pub session_reset: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventEnvelopeIn {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// `HH:MM` wire format for times; chrono's default carries seconds.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
