//! Splits a single "name, email, phone" line into its parts.
//!
//! Delimited input is classified token by token. When that does not yield one
//! email, one phone and a name, the whole line is scanned for an email and a
//! digit run instead and whatever is left over becomes the name.

use std::sync::LazyLock;

use regex::Regex;

pub const MIN_PHONE_DIGITS: usize = 6;
pub const MAX_PHONE_DIGITS: usize = 15;

static EMAIL_EXACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});
static EMAIL_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
        .expect("valid regex")
});
static PHONE_SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\(?\d[\d\s().\-/]{4,}\d").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Extra free text found next to the contact fields.
    pub note: Option<String>,
}

impl ExtractedContact {
    /// Names of the fields that are absent or fail validation, in prompt order.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_plausible_name(&self.name) {
            missing.push("name");
        }
        if !is_valid_email(&self.email) {
            missing.push("email");
        }
        if !is_valid_phone(&self.phone) {
            missing.push("phone");
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Email,
    Phone,
    Name,
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_EXACT.is_match(value.trim())
}

pub fn phone_digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}

/// Only digits and the usual phone punctuation, with a plausible digit count.
pub fn is_valid_phone(value: &str) -> bool {
    let value = value.trim();
    let digits = phone_digit_count(value);
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | '(' | ')' | '/' | ' '))
}

/// A name needs at least one letter and no digits or `@`.
pub fn is_plausible_name(value: &str) -> bool {
    let value = value.trim();
    value.chars().any(char::is_alphabetic)
        && !value.chars().any(|c| c.is_ascii_digit() || c == '@')
}

fn classify_token(token: &str) -> TokenKind {
    if is_valid_email(token) {
        TokenKind::Email
    } else if is_valid_phone(token) {
        TokenKind::Phone
    } else {
        TokenKind::Name
    }
}

pub fn extract_contact(input: &str) -> ExtractedContact {
    split_by_delimiters(input).unwrap_or_else(|| scan_whole(input))
}

fn split_by_delimiters(input: &str) -> Option<ExtractedContact> {
    let tokens = input
        .split([',', ';', '\n', '\r'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    if tokens.len() < 3 {
        return None;
    }

    let mut emails = Vec::new();
    let mut phones = Vec::new();
    let mut names = Vec::new();
    for token in tokens {
        match classify_token(token) {
            TokenKind::Email => emails.push(token),
            TokenKind::Phone => phones.push(token),
            TokenKind::Name => names.push(token),
        }
    }
    if emails.len() != 1 || phones.len() != 1 || names.is_empty() {
        return None;
    }
    if !is_plausible_name(names[0]) {
        return None;
    }

    let note = (names.len() > 1).then(|| names[1..].join(", "));
    Some(ExtractedContact {
        name: names[0].to_string(),
        email: emails[0].to_string(),
        phone: phones[0].to_string(),
        note,
    })
}

fn scan_whole(input: &str) -> ExtractedContact {
    let mut remainder = input.to_string();

    let email = EMAIL_SEARCH
        .find(input)
        .map(|m| m.as_str().to_string())
        .filter(|e| is_valid_email(e))
        .unwrap_or_default();
    if !email.is_empty() {
        remainder = remainder.replacen(&email, " ", 1);
    }

    let phone = PHONE_SEARCH
        .find_iter(&remainder)
        .map(|m| m.as_str().trim().to_string())
        .find(|p| is_valid_phone(p))
        .unwrap_or_default();
    if !phone.is_empty() {
        remainder = remainder.replacen(&phone, " ", 1);
    }

    let name = remainder
        .split([',', ';', '\n', '\r'])
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    let name = if is_plausible_name(&name) {
        name
    } else {
        String::new()
    };

    ExtractedContact {
        name,
        email,
        phone,
        note: None,
    }
}
