use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    availability::{AvailabilityService, HttpAvailability, SlotChecker},
    clock::{Clock, SystemClock},
    config::{Config, StorageBackend},
    engine::ChatEngine,
    persistence::{InMemoryBookings, Persistence, PgBookings},
    prompting::Prompts,
    session::{InMemorySessionStore, Lookup, PgSessionStore, SessionManager, SessionStore},
    types::{ChatRequest, CreateSessionBody, EntryPoint, EventEnvelopeIn},
};

pub struct AppState {
    pub engine: ChatEngine,
}

impl AppState {
    pub fn new(engine: ChatEngine) -> Self {
        Self { engine }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/booking", post(booking_chat))
        .route("/api/chat/support", post(support_chat))
        .route("/api/chat/session", post(create_session))
        .route(
            "/api/chat/session/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = state.engine.sessions().clock().now();
    Json(json!({ "ok": true, "now": now.to_rfc3339() }))
}

async fn chat(State(state): State<Arc<AppState>>, Json(body): Json<ChatRequest>) -> Response {
    run_turn(&state, body, EntryPoint::Auto).await
}

async fn booking_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Response {
    run_turn(&state, body, EntryPoint::Booking).await
}

async fn support_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Response {
    run_turn(&state, body, EntryPoint::Support).await
}

async fn run_turn(state: &Arc<AppState>, body: ChatRequest, entry: EntryPoint) -> Response {
    match state.engine.handle(&body, entry).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => err.into_response(),
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

async fn create_session(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionBody::default()
    } else {
        match serde_json::from_slice::<CreateSessionBody>(&body) {
            Ok(body) => body,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid JSON body" })),
                )
                    .into_response()
            }
        }
    };
    let language = state.engine.language_or_default(body.language.as_deref());
    match state.engine.sessions().create(language).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(json!({ "sessionId": session.id })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "session create failed");
            internal_error()
        }
    }
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.engine.sessions().get(&session_id).await {
        Ok(Lookup::Found(session)) => Json(json!({
            "sessionId": session.id,
            "language": session.language,
            "flow": session.flow_kind(),
            "step": session.step(),
            "data": session.collected(),
            "createdAt": session.created_at.to_rfc3339(),
            "lastActivityAt": session.last_activity_at.to_rfc3339(),
        }))
        .into_response(),
        Ok(Lookup::Expired | Lookup::Missing) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "session not found" })),
        )
            .into_response(),
        Err(err) => {
            error!(session_id, error = %err, "session read failed");
            internal_error()
        }
    }
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.engine.sessions().remove(&session_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!(session_id, error = %err, "session delete failed");
            internal_error()
        }
    }
}

fn event_payload<T: Serialize>(event: &str, data: T) -> Option<String> {
    serde_json::to_string(&json!({ "event": event, "data": data })).ok()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let emit = |event: &str, data: Value| {
        if let Some(payload) = event_payload(event, data) {
            let _ = tx.send(payload);
        }
    };

    while let Some(Ok(message)) = ws_receiver.next().await {
        let text = match message {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let Ok(envelope) = serde_json::from_str::<EventEnvelopeIn>(&text) else {
            emit("chat:error", json!({ "error": "invalid event envelope" }));
            continue;
        };

        match envelope.event.as_str() {
            "chat:message" => {
                let Ok(request) = serde_json::from_value::<ChatRequest>(envelope.data) else {
                    emit("chat:error", json!({ "error": "invalid chat message" }));
                    continue;
                };
                match state.engine.handle(&request, EntryPoint::Auto).await {
                    Ok(reply) => emit("chat:reply", json!(reply)),
                    Err(err) => emit("chat:error", json!({ "error": err.to_string() })),
                }
            }
            other => {
                debug!(event = other, "unknown websocket event");
                emit("chat:error", json!({ "error": format!("unknown event {other}") }));
            }
        }
    }

    send_task.abort();
}

/// Wires the stores and collaborators the configuration asks for.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (store, persistence, calendar): (
        Arc<dyn SessionStore>,
        Arc<dyn Persistence>,
        Arc<dyn AvailabilityService>,
    ) = match &config.storage {
        StorageBackend::Memory => {
            warn!("using in-memory storage; sessions and bookings are lost on restart");
            let bookings = Arc::new(InMemoryBookings::new());
            (
                Arc::new(InMemorySessionStore::new()),
                bookings.clone(),
                bookings,
            )
        }
        StorageBackend::Postgres { url } => {
            let db = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to postgres (check DATABASE_URL or POSTGRES_* env vars)")?;
            sqlx::migrate!("./migrations")
                .run(&db)
                .await
                .context("failed to run sqlx migrations")?;
            let bookings = Arc::new(PgBookings::new(db.clone(), clock.clone()));
            (
                Arc::new(PgSessionStore::new(db)),
                bookings.clone(),
                bookings,
            )
        }
    };

    let calendar: Arc<dyn AvailabilityService> = match &config.availability_url {
        Some(url) => {
            info!(%url, "using remote availability service");
            Arc::new(HttpAvailability::new(reqwest::Client::new(), url.clone()))
        }
        None => calendar,
    };

    let sessions = Arc::new(SessionManager::new(
        store,
        clock,
        config.session_idle_timeout,
    ));
    let _sweeper = sessions.spawn_sweeper(config.session_sweep_interval);

    let engine = ChatEngine::new(
        sessions,
        SlotChecker::new(calendar, config.availability_timeout),
        persistence,
        Prompts::new().context("failed to compile prompt templates")?,
        config.business_hours.clone(),
        config.default_language,
    );
    Ok(Arc::new(AppState::new(engine)))
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,agency_chat_server=debug,tower_http=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;
    let storage = match config.storage {
        StorageBackend::Memory => "memory",
        StorageBackend::Postgres { .. } => "postgres",
    };
    let state = build_state(&config).await?;
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(port = config.port, storage, "chat server running at http://localhost:{}", config.port);
    axum::serve(listener, app)
        .await
        .context("server runtime failure")?;
    Ok(())
}
