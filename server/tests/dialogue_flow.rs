mod common;

use agency_chat_server::{
    clock::Clock,
    session::Lookup,
    types::{BookingResult, ChatRequest, DialogueStep, EntryPoint, FlowKind, Service},
};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde_json::json;

use common::{harness, UP_TO_CONFIRM};

#[tokio::test]
async fn booking_happy_path_completes_with_the_collected_record() {
    let h = harness();
    let reply = h.send_all("s1", &UP_TO_CONFIRM).await;
    assert_eq!(reply.step, DialogueStep::Confirm);
    assert!(!reply.completed);

    let reply = h.send("s1", "confermo").await;
    assert!(reply.completed);
    assert_eq!(reply.step, DialogueStep::Finalize);
    assert_eq!(reply.flow, Some(FlowKind::Booking));
    assert_eq!(
        reply.data,
        json!({
            "service": "web_development",
            "date": "2025-03-10",
            "time": "14:00",
            "name": "Mario Rossi",
            "email": "mario@example.com",
            "phone": "3331234567"
        })
    );
    let reference = reply.reference.expect("booking reference");
    assert!(reply.response.contains(&reference));
    assert_eq!(h.bookings.bookings().await.len(), 1);

    // The finished session is gone; the same id starts over quietly.
    assert!(matches!(
        h.engine.sessions().get("s1").await.unwrap(),
        Lookup::Missing
    ));
    let reply = h.send("s1", "ciao").await;
    assert_eq!(reply.step, DialogueStep::General);
    assert!(!reply.session_reset);
}

#[tokio::test]
async fn modifying_the_time_keeps_everything_else() {
    let h = harness();
    h.send_all("s1", &UP_TO_CONFIRM).await;

    let reply = h.send("s1", "modifica").await;
    assert_eq!(reply.step, DialogueStep::AskModification);
    let reply = h.send("s1", "orario").await;
    assert_eq!(reply.step, DialogueStep::ChooseTime);
    let reply = h.send("s1", "15:00").await;
    assert_eq!(reply.step, DialogueStep::Confirm);

    let reply = h.send("s1", "confermo").await;
    assert!(reply.completed);
    assert_eq!(
        reply.data,
        json!({
            "service": "web_development",
            "date": "2025-03-10",
            "time": "15:00",
            "name": "Mario Rossi",
            "email": "mario@example.com",
            "phone": "3331234567"
        })
    );
}

#[tokio::test]
async fn modify_asks_for_a_field_instead_of_restarting() {
    let h = harness();
    h.send_all("s1", &UP_TO_CONFIRM).await;
    for word in ["modifica", "no", "vorrei cambiare qualcosa"] {
        let reply = h.send("s1", word).await;
        assert_eq!(reply.step, DialogueStep::AskModification, "{word}");
        assert_ne!(reply.step, DialogueStep::Start);
        // An unclear field name keeps asking.
        let reply = h.send("s1", "boh").await;
        assert_eq!(reply.step, DialogueStep::AskModification);
        let reply = h.send("s1", "servizio").await;
        assert_eq!(reply.step, DialogueStep::ChooseService);
        let reply = h.send("s1", "3").await;
        assert_eq!(reply.step, DialogueStep::Confirm);
        assert_eq!(reply.data["service"], "seo");
        assert_eq!(reply.data["time"], "14:00");
    }
}

#[tokio::test]
async fn resending_the_contact_line_is_harmless() {
    let h = harness();
    let first = h.send_all("s1", &UP_TO_CONFIRM).await;
    let again = h
        .send("s1", "Mario Rossi, mario@example.com, 3331234567")
        .await;
    assert_eq!(again.step, DialogueStep::Confirm);
    assert_eq!(again.data, first.data);
    let again = h
        .send("s1", "Mario Rossi, mario@example.com, 3331234567")
        .await;
    assert_eq!(again.step, DialogueStep::Confirm);
    assert_eq!(again.data, first.data);
}

#[tokio::test]
async fn concurrent_duplicates_apply_once() {
    let h = harness();
    h.send_all("s1", &["prenota", "2"]).await;
    let (a, b) = tokio::join!(h.send("s1", "2025-03-10"), h.send("s1", "2025-03-10"));
    let steps = [a.step, b.step];
    assert!(steps.iter().all(|s| *s == DialogueStep::ChooseTime), "{steps:?}");
    let Lookup::Found(session) = h.engine.sessions().get("s1").await.unwrap() else {
        panic!("session missing");
    };
    assert_eq!(session.collected()["date"], "2025-03-10");
    assert_eq!(session.revision, 3);
}

#[tokio::test]
async fn idle_sessions_restart_with_a_reset_flag() {
    let h = harness();
    h.send_all("s1", &["voglio prenotare", "1"]).await;

    h.clock.advance(Duration::minutes(59));
    let reply = h.send("s1", "2025-03-10").await;
    assert_eq!(reply.step, DialogueStep::ChooseTime);

    h.clock.advance(Duration::minutes(61));
    assert!(matches!(
        h.engine.sessions().get("s1").await.unwrap(),
        Lookup::Expired
    ));
    let reply = h.send("s1", "14:00").await;
    assert!(reply.session_reset);
    assert_eq!(reply.step, DialogueStep::General);
    assert_eq!(reply.data, json!({}));

    let reply = h.send("s1", "prenota").await;
    assert!(!reply.session_reset);
    assert_eq!(reply.step, DialogueStep::ChooseService);
}

#[tokio::test]
async fn slot_taken_at_confirmation_sends_the_visitor_back_to_times() {
    let h = harness();
    h.send_all("s1", &UP_TO_CONFIRM).await;

    h.bookings
        .occupy(BookingResult {
            service: Service::Seo,
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            name: "Luca Verdi".into(),
            email: "luca@example.com".into(),
            phone: "3209876543".into(),
            message: None,
        })
        .await;

    let reply = h.send("s1", "confermo").await;
    assert!(!reply.completed);
    assert_eq!(reply.step, DialogueStep::ChooseTime);
    assert!(reply.response.contains("nel frattempo"));
    assert!(reply.data.get("time").is_none());
    assert_eq!(reply.data["name"], "Mario Rossi");

    let reply = h.send("s1", "14:00").await;
    assert_eq!(reply.step, DialogueStep::ChooseTime);
    h.send("s1", "16:30").await;
    let reply = h.send("s1", "confermo").await;
    assert!(reply.completed);
    assert_eq!(reply.data["time"], "16:30");
    assert_eq!(h.bookings.bookings().await.len(), 2);
}

#[tokio::test]
async fn support_ticket_end_to_end() {
    let h = harness();
    let reply = h.send("s2", "ho un problema con il sito").await;
    assert_eq!(reply.step, DialogueStep::Name);
    assert_eq!(reply.flow, Some(FlowKind::Support));

    // Keywords no longer reroute once the flow is running.
    let reply = h.send("s2", "voglio prenotare").await;
    assert_eq!(reply.step, DialogueStep::Email);
    assert_eq!(reply.data["name"], "voglio prenotare");
    h.send("s2", "annulla").await;

    let reply = h
        .send_all(
            "s2",
            &[
                "assistenza",
                "Anna Bianchi",
                "anna@example.com",
                "1",
                "Il modulo contatti restituisce un errore 500",
            ],
        )
        .await;
    assert_eq!(reply.step, DialogueStep::Confirmation);
    assert!(reply.response.contains("Problema tecnico"));

    let reply = h.send("s2", "confermo").await;
    assert!(reply.completed);
    assert_eq!(reply.step, DialogueStep::TicketCreated);
    let expected_id = format!("TICKET-{}", h.clock.now().timestamp_millis());
    assert_eq!(reply.reference.as_deref(), Some(expected_id.as_str()));
    assert_eq!(reply.data["id"], expected_id);
    assert_eq!(reply.data["category"], "technical");
    assert_eq!(reply.data["priority"], "medium");
    assert_eq!(reply.data["status"], "open");
    assert_eq!(h.bookings.tickets().await.len(), 1);
}

#[tokio::test]
async fn english_booking_uses_english_prompts() {
    let h = harness();
    let first = h
        .engine
        .handle(
            &ChatRequest {
                message: "I want to book a call".into(),
                session_id: "en1".into(),
                language: Some("en".into()),
            },
            EntryPoint::Auto,
        )
        .await
        .unwrap();
    assert_eq!(first.step, DialogueStep::ChooseService);
    assert!(first.response.contains("Which service"));

    let reply = h
        .send_all(
            "en1",
            &[
                "seo",
                "tomorrow",
                "10/03/2025",
                "2pm",
                "mario@example.com\nMario Rossi\n+39 333 123 4567",
            ],
        )
        .await;
    assert_eq!(reply.step, DialogueStep::Confirm);
    assert!(reply.response.contains("Monday 2025-03-10"));
    assert_eq!(reply.data["phone"], "+39 333 123 4567");

    let reply = h.send("en1", "yes").await;
    assert!(reply.completed);
    assert!(reply.response.starts_with("Done!"));
}

#[tokio::test]
async fn tickets_opened_in_the_same_millisecond_do_not_overwrite_each_other() {
    let h = harness();
    let steps = [
        "assistenza",
        "Anna Bianchi",
        "anna@example.com",
        "1",
        "Il modulo contatti restituisce un errore 500",
    ];
    h.send_all("a", &steps).await;
    h.send_all("b", &steps).await;

    let first = h.send("a", "confermo").await;
    assert!(first.completed);
    let second = h.send("b", "confermo").await;
    assert!(!second.completed);
    assert_eq!(second.step, DialogueStep::Confirmation);
    assert!(second.response.starts_with("Scusa"));
    assert_eq!(h.bookings.tickets().await.len(), 1);

    // A millisecond later the retry gets its own id.
    h.clock.advance(Duration::milliseconds(1));
    let retry = h.send("b", "confermo").await;
    assert!(retry.completed);
    assert_ne!(retry.reference, first.reference);
    assert_eq!(h.bookings.tickets().await.len(), 2);
}
