use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::warn;

use crate::error::AvailabilityError;

#[async_trait]
pub trait AvailabilityService: Send + Sync {
    async fn is_slot_available(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, AvailabilityError>;
}

/// Asks the calendar for a slot, bounded by a timeout. When the calendar
/// cannot answer the slot is treated as free; the final write still guards
/// against double booking.
#[derive(Clone)]
pub struct SlotChecker {
    service: Arc<dyn AvailabilityService>,
    timeout: Duration,
}

impl SlotChecker {
    pub fn new(service: Arc<dyn AvailabilityService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub async fn is_free(&self, date: NaiveDate, time: NaiveTime) -> bool {
        match tokio::time::timeout(self.timeout, self.service.is_slot_available(date, time)).await
        {
            Ok(Ok(available)) => available,
            Ok(Err(err)) => {
                warn!(%date, %time, error = %err, "availability check failed, assuming free");
                true
            }
            Err(_) => {
                warn!(%date, %time, timeout_ms = self.timeout.as_millis() as u64, "availability check timed out, assuming free");
                true
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityAnswer {
    available: bool,
}

/// Remote calendar reached over HTTP: `GET {url}?date=YYYY-MM-DD&time=HH:MM`
/// answering `{"available": bool}`.
#[derive(Clone)]
pub struct HttpAvailability {
    client: reqwest::Client,
    url: String,
}

impl HttpAvailability {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AvailabilityService for HttpAvailability {
    async fn is_slot_available(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, AvailabilityError> {
        let date = date.format("%Y-%m-%d").to_string();
        let time = time.format("%H:%M").to_string();
        let resp = self
            .client
            .get(&self.url)
            .query(&[("date", date.as_str()), ("time", time.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        let answer: AvailabilityAnswer = serde_json::from_str(&body)
            .map_err(|err| AvailabilityError::Malformed(err.to_string()))?;
        Ok(answer.available)
    }
}
