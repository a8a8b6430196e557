//! Where finished bookings and tickets end up.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    availability::AvailabilityService,
    clock::Clock,
    error::{AvailabilityError, PersistenceError},
    types::{BookingResult, SupportTicket},
};

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Stores the booking and returns its reference. Fails with
    /// [`PersistenceError::Conflict`] when the slot was taken in the meantime.
    async fn finalize_booking(&self, booking: &BookingResult) -> Result<String, PersistenceError>;
    async fn finalize_ticket(&self, ticket: &SupportTicket) -> Result<String, PersistenceError>;
}

fn conflict(date: NaiveDate, time: NaiveTime) -> PersistenceError {
    PersistenceError::Conflict {
        date: date.format("%Y-%m-%d").to_string(),
        time: time.format("%H:%M").to_string(),
    }
}

/// One appointment per slot, kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBookings {
    appointments: RwLock<HashMap<(NaiveDate, NaiveTime), (String, BookingResult)>>,
    tickets: RwLock<HashMap<String, SupportTicket>>,
}

impl InMemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bookings(&self) -> Vec<BookingResult> {
        let mut all = self
            .appointments
            .read()
            .await
            .values()
            .map(|(_, b)| b.clone())
            .collect::<Vec<_>>();
        all.sort_by_key(|b| (b.date, b.time));
        all
    }

    pub async fn tickets(&self) -> Vec<SupportTicket> {
        let mut all = self.tickets.read().await.values().cloned().collect::<Vec<_>>();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    /// Takes a slot directly, as if another visitor had booked it.
    pub async fn occupy(&self, booking: BookingResult) {
        let id = Uuid::new_v4().to_string();
        self.appointments
            .write()
            .await
            .insert((booking.date, booking.time), (id, booking));
    }
}

#[async_trait]
impl Persistence for InMemoryBookings {
    async fn finalize_booking(&self, booking: &BookingResult) -> Result<String, PersistenceError> {
        let mut appointments = self.appointments.write().await;
        let key = (booking.date, booking.time);
        if appointments.contains_key(&key) {
            return Err(conflict(booking.date, booking.time));
        }
        let id = Uuid::new_v4().to_string();
        appointments.insert(key, (id.clone(), booking.clone()));
        info!(appointment_id = %id, date = %booking.date, time = %booking.time, "appointment stored");
        Ok(id)
    }

    async fn finalize_ticket(&self, ticket: &SupportTicket) -> Result<String, PersistenceError> {
        match self.tickets.write().await.entry(ticket.id.clone()) {
            Entry::Occupied(_) => {
                return Err(PersistenceError::DuplicateTicket {
                    id: ticket.id.clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(ticket.clone());
            }
        }
        info!(ticket_id = %ticket.id, category = ticket.category.slug(), "ticket stored");
        Ok(ticket.id.clone())
    }
}

#[async_trait]
impl AvailabilityService for InMemoryBookings {
    async fn is_slot_available(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, AvailabilityError> {
        Ok(!self.appointments.read().await.contains_key(&(date, time)))
    }
}

/// Appointments and tickets in Postgres. A unique index on the slot makes the
/// insert the final word on double booking.
#[derive(Clone)]
pub struct PgBookings {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgBookings {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

const UNIQUE_VIOLATION: &str = "23505";

#[async_trait]
impl Persistence for PgBookings {
    async fn finalize_booking(&self, booking: &BookingResult) -> Result<String, PersistenceError> {
        let id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO appointments (id, service, appointment_date, appointment_time, name, email, phone, message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&id)
        .bind(booking.service.slug())
        .bind(booking.date.format("%Y-%m-%d").to_string())
        .bind(booking.time.format("%H:%M").to_string())
        .bind(&booking.name)
        .bind(&booking.email)
        .bind(&booking.phone)
        .bind(&booking.message)
        .bind(self.clock.now().to_rfc3339())
        .execute(&self.db)
        .await;

        match inserted {
            Ok(_) => {
                info!(appointment_id = %id, date = %booking.date, time = %booking.time, "appointment stored");
                Ok(id)
            }
            Err(err) if is_unique_violation(&err) => Err(conflict(booking.date, booking.time)),
            Err(err) => Err(err.into()),
        }
    }

    async fn finalize_ticket(&self, ticket: &SupportTicket) -> Result<String, PersistenceError> {
        let inserted = sqlx::query(
            "INSERT INTO support_tickets (id, name, email, category, description, priority, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&ticket.id)
        .bind(&ticket.name)
        .bind(&ticket.email)
        .bind(ticket.category.slug())
        .bind(&ticket.description)
        .bind(ticket.priority.as_str())
        .bind(ticket.status.as_str())
        .bind(ticket.created_at.to_rfc3339())
        .execute(&self.db)
        .await;
        match inserted {
            Ok(_) => {
                info!(ticket_id = %ticket.id, category = ticket.category.slug(), "ticket stored");
                Ok(ticket.id.clone())
            }
            Err(err) if is_unique_violation(&err) => Err(PersistenceError::DuplicateTicket {
                id: ticket.id.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl AvailabilityService for PgBookings {
    async fn is_slot_available(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, AvailabilityError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS taken FROM appointments WHERE appointment_date = $1 AND appointment_time = $2",
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(time.format("%H:%M").to_string())
        .fetch_one(&self.db)
        .await?;
        let taken: i64 = row.get("taken");
        Ok(taken == 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{Service, TicketCategory, TicketPriority, TicketStatus};

    fn booking(hour: u32) -> BookingResult {
        BookingResult {
            service: Service::Seo,
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            name: "Mario Rossi".into(),
            email: "mario@example.com".into(),
            phone: "3331234567".into(),
            message: None,
        }
    }

    #[tokio::test]
    async fn second_booking_of_a_slot_conflicts() {
        let store = InMemoryBookings::new();
        let first = store.finalize_booking(&booking(14)).await.unwrap();
        assert!(!first.is_empty());
        assert!(matches!(
            store.finalize_booking(&booking(14)).await,
            Err(PersistenceError::Conflict { .. })
        ));
        store.finalize_booking(&booking(15)).await.unwrap();
        assert_eq!(store.bookings().await.len(), 2);
    }

    #[tokio::test]
    async fn availability_follows_stored_bookings() {
        let store = InMemoryBookings::new();
        let b = booking(10);
        assert!(store.is_slot_available(b.date, b.time).await.unwrap());
        store.occupy(b.clone()).await;
        assert!(!store.is_slot_available(b.date, b.time).await.unwrap());
    }

    #[tokio::test]
    async fn tickets_keep_their_id() {
        let store = InMemoryBookings::new();
        let ticket = SupportTicket {
            id: "TICKET-1740819600000".into(),
            name: "Anna".into(),
            email: "anna@example.com".into(),
            category: TicketCategory::Billing,
            description: "La fattura di febbraio è sbagliata".into(),
            priority: TicketPriority::default(),
            status: TicketStatus::default(),
            created_at: Utc::now(),
        };
        let id = store.finalize_ticket(&ticket).await.unwrap();
        assert_eq!(id, ticket.id);
        assert_eq!(store.tickets().await, vec![ticket]);
    }

    #[tokio::test]
    async fn ticket_ids_are_never_overwritten() {
        let store = InMemoryBookings::new();
        let first = SupportTicket {
            id: "TICKET-1740823200000".into(),
            name: "Anna".into(),
            email: "anna@example.com".into(),
            category: TicketCategory::Technical,
            description: "Il modulo contatti non funziona".into(),
            priority: TicketPriority::default(),
            status: TicketStatus::default(),
            created_at: Utc::now(),
        };
        let second = SupportTicket {
            name: "Luca".into(),
            email: "luca@example.com".into(),
            ..first.clone()
        };
        store.finalize_ticket(&first).await.unwrap();
        assert!(matches!(
            store.finalize_ticket(&second).await,
            Err(PersistenceError::DuplicateTicket { ref id }) if id == "TICKET-1740823200000"
        ));
        assert_eq!(store.tickets().await, vec![first]);
    }
}
