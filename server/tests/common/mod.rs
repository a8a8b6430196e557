#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use agency_chat_server::{
    availability::SlotChecker,
    clock::ManualClock,
    engine::ChatEngine,
    persistence::InMemoryBookings,
    prompting::Prompts,
    schedule::BusinessHours,
    session::{InMemorySessionStore, SessionManager},
    types::{ChatReply, ChatRequest, EntryPoint, Language},
};
use chrono::{TimeZone, Utc};

pub const IDLE: Duration = Duration::from_secs(3600);

pub struct Harness {
    pub engine: ChatEngine,
    pub clock: Arc<ManualClock>,
    pub bookings: Arc<InMemoryBookings>,
}

/// Saturday 2025-03-01, 10:00 UTC. 2025-03-10 is the following Monday week.
pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
    ));
    let bookings = Arc::new(InMemoryBookings::new());
    let sessions = Arc::new(SessionManager::new(
        Arc::new(InMemorySessionStore::new()),
        clock.clone(),
        IDLE,
    ));
    let engine = ChatEngine::new(
        sessions,
        SlotChecker::new(bookings.clone(), Duration::from_secs(1)),
        bookings.clone(),
        Prompts::new().unwrap(),
        BusinessHours::default(),
        Language::It,
    );
    Harness {
        engine,
        clock,
        bookings,
    }
}

impl Harness {
    pub async fn send(&self, session_id: &str, message: &str) -> ChatReply {
        self.engine
            .handle(
                &ChatRequest {
                    message: message.into(),
                    session_id: session_id.into(),
                    language: None,
                },
                EntryPoint::Auto,
            )
            .await
            .unwrap()
    }

    pub async fn send_all(&self, session_id: &str, messages: &[&str]) -> ChatReply {
        let mut last = None;
        for message in messages {
            last = Some(self.send(session_id, message).await);
        }
        last.expect("at least one message")
    }
}

pub const UP_TO_CONFIRM: [&str; 5] = [
    "voglio prenotare",
    "1",
    "2025-03-10",
    "14:00",
    "Mario Rossi, mario@example.com, 3331234567",
];
