use std::{str::FromStr, time::Duration};

use chrono::{FixedOffset, NaiveTime, Weekday};

use crate::{error::ConfigError, schedule::BusinessHours, types::Language};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub session_idle_timeout: Duration,
    pub session_sweep_interval: Duration,
    pub availability_url: Option<String>,
    pub availability_timeout: Duration,
    pub business_hours: BusinessHours,
    pub default_language: Language,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            storage: StorageBackend::Memory,
            session_idle_timeout: Duration::from_secs(3600),
            session_sweep_interval: Duration::from_secs(300),
            availability_url: None,
            availability_timeout: Duration::from_millis(1500),
            business_hours: BusinessHours::default(),
            default_language: Language::It,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        let port = parse_or("PORT", get("PORT"), defaults.port)?;

        let storage = match get("CHAT_STORAGE").map(|v| v.to_ascii_lowercase()) {
            Some(kind) if kind == "memory" => StorageBackend::Memory,
            Some(kind) if kind == "postgres" => StorageBackend::Postgres {
                url: resolve_database_url(&get),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "CHAT_STORAGE",
                    value: other,
                    reason: "expected memory or postgres".into(),
                })
            }
            None if ["DATABASE_URL", "POSTGRES_HOST", "POSTGRES_DB"]
                .iter()
                .any(|key| get(*key).is_some()) =>
            {
                StorageBackend::Postgres {
                    url: resolve_database_url(&get),
                }
            }
            None => StorageBackend::Memory,
        };

        let idle_secs = parse_or(
            "SESSION_IDLE_TIMEOUT_SECS",
            get("SESSION_IDLE_TIMEOUT_SECS"),
            defaults.session_idle_timeout.as_secs(),
        )?;
        if idle_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "SESSION_IDLE_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        let sweep_secs = parse_or(
            "SESSION_SWEEP_INTERVAL_SECS",
            get("SESSION_SWEEP_INTERVAL_SECS"),
            defaults.session_sweep_interval.as_secs(),
        )?
        .max(1);
        let availability_ms = parse_or(
            "AVAILABILITY_TIMEOUT_MS",
            get("AVAILABILITY_TIMEOUT_MS"),
            defaults.availability_timeout.as_millis() as u64,
        )?;

        let mut hours = defaults.business_hours.clone();
        if let Some(raw) = get("BUSINESS_OPEN") {
            hours.open = parse_clock("BUSINESS_OPEN", &raw)?;
        }
        if let Some(raw) = get("BUSINESS_CLOSE") {
            hours.close = parse_clock("BUSINESS_CLOSE", &raw)?;
        }
        if hours.open >= hours.close {
            return Err(ConfigError::Invalid {
                key: "BUSINESS_CLOSE",
                value: hours.close.format("%H:%M").to_string(),
                reason: "must be later than BUSINESS_OPEN".into(),
            });
        }
        if let Some(raw) = get("BUSINESS_DAYS") {
            hours.days = parse_days(&raw)?;
        }
        hours.slot_minutes = parse_or("SLOT_MINUTES", get("SLOT_MINUTES"), hours.slot_minutes)?;
        if hours.slot_minutes == 0 || hours.slot_minutes > 240 {
            return Err(ConfigError::Invalid {
                key: "SLOT_MINUTES",
                value: hours.slot_minutes.to_string(),
                reason: "must be between 1 and 240".into(),
            });
        }
        let offset_hours: i32 = parse_or(
            "BUSINESS_UTC_OFFSET_HOURS",
            get("BUSINESS_UTC_OFFSET_HOURS"),
            hours.utc_offset.local_minus_utc() / 3600,
        )?;
        hours.utc_offset =
            FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| ConfigError::Invalid {
                key: "BUSINESS_UTC_OFFSET_HOURS",
                value: offset_hours.to_string(),
                reason: "offset out of range".into(),
            })?;

        let default_language = match get("DEFAULT_LANGUAGE") {
            Some(tag) => Language::from_tag(&tag).ok_or(ConfigError::Invalid {
                key: "DEFAULT_LANGUAGE",
                value: tag,
                reason: "expected it or en".into(),
            })?,
            None => defaults.default_language,
        };

        Ok(Self {
            port,
            storage,
            session_idle_timeout: Duration::from_secs(idle_secs),
            session_sweep_interval: Duration::from_secs(sweep_secs),
            availability_url: get("AVAILABILITY_URL"),
            availability_timeout: Duration::from_millis(availability_ms),
            business_hours: hours,
            default_language,
        })
    }
}

fn resolve_database_url(get: &dyn Fn(&str) -> Option<String>) -> String {
    if let Some(url) = get("DATABASE_URL") {
        return url;
    }
    let host = get("POSTGRES_HOST")
        .or_else(|| get("PGHOST"))
        .unwrap_or_else(|| "localhost".to_string());
    let port = get("POSTGRES_PORT")
        .or_else(|| get("PGPORT"))
        .unwrap_or_else(|| "5432".to_string());
    let user = get("POSTGRES_USER")
        .or_else(|| get("PGUSER"))
        .unwrap_or_else(|| "postgres".to_string());
    let db = get("POSTGRES_DB")
        .or_else(|| get("PGDATABASE"))
        .unwrap_or_else(|| "agency_chat".to_string());
    match get("POSTGRES_PASSWORD").or_else(|| get("PGPASSWORD")) {
        Some(password) => format!("postgres://{user}:{password}@{host}:{port}/{db}"),
        None => format!("postgres://{user}@{host}:{port}/{db}"),
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}

fn parse_clock(key: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

fn parse_days(raw: &str) -> Result<Vec<Weekday>, ConfigError> {
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = match part {
            "1" => Weekday::Mon,
            "2" => Weekday::Tue,
            "3" => Weekday::Wed,
            "4" => Weekday::Thu,
            "5" => Weekday::Fri,
            "6" => Weekday::Sat,
            "7" => Weekday::Sun,
            other => {
                return Err(ConfigError::Invalid {
                    key: "BUSINESS_DAYS",
                    value: raw.to_string(),
                    reason: format!("{other} is not an ISO weekday number"),
                })
            }
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err(ConfigError::Invalid {
            key: "BUSINESS_DAYS",
            value: raw.to_string(),
            reason: "at least one day is required".into(),
        });
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(3600));
        assert_eq!(config.availability_timeout, Duration::from_millis(1500));
        assert_eq!(config.business_hours.slot_minutes, 30);
        assert_eq!(config.default_language, Language::It);
    }

    #[test]
    fn database_url_selects_postgres() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x@db/chat")])).unwrap();
        assert_eq!(
            config.storage,
            StorageBackend::Postgres {
                url: "postgres://x@db/chat".into()
            }
        );
    }

    #[test]
    fn postgres_host_alone_selects_postgres() {
        let config =
            Config::from_lookup(lookup(&[("POSTGRES_HOST", "db"), ("POSTGRES_DB", "chat")]))
                .unwrap();
        assert_eq!(
            config.storage,
            StorageBackend::Postgres {
                url: "postgres://postgres@db:5432/chat".into()
            }
        );
        let config = Config::from_lookup(lookup(&[
            ("POSTGRES_HOST", "db"),
            ("CHAT_STORAGE", "memory"),
        ]))
        .unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
    }

    #[test]
    fn postgres_url_is_assembled_from_parts() {
        let config = Config::from_lookup(lookup(&[
            ("CHAT_STORAGE", "postgres"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_USER", "agency"),
            ("POSTGRES_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(
            config.storage,
            StorageBackend::Postgres {
                url: "postgres://agency:pw@db:5432/agency_chat".into()
            }
        );
    }

    #[test]
    fn business_settings_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("BUSINESS_OPEN", "08:30"),
            ("BUSINESS_CLOSE", "17:00"),
            ("BUSINESS_DAYS", "1,3,5"),
            ("SLOT_MINUTES", "60"),
            ("SESSION_IDLE_TIMEOUT_SECS", "120"),
            ("DEFAULT_LANGUAGE", "en"),
        ]))
        .unwrap();
        let hours = &config.business_hours;
        assert_eq!(hours.open, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(hours.close, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(hours.days, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert_eq!(hours.slot_minutes, 60);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(120));
        assert_eq!(config.default_language, Language::En);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CHAT_STORAGE", "redis")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SESSION_IDLE_TIMEOUT_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BUSINESS_DAYS", "1,9")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("BUSINESS_OPEN", "18:00"),
            ("BUSINESS_CLOSE", "09:00")
        ]))
        .is_err());
    }
}
