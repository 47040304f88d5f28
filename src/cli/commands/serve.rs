//! HTTP API server.
//!
//! Each session id maps to its own conversation, so clients never see each
//! other's turns.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::CourseMateError;
use crate::evidence::EvidenceRef;
use crate::orchestrator::{Orchestrator, Session};
use crate::rag::AnswerKind;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shown to clients when a turn fails unexpectedly. Details go to the log.
const APOLOGY: &str =
    "Sorry, something went wrong while answering your question. Please try again in a moment.";

/// Shared application state.
struct AppState {
    orchestrator: Arc<Orchestrator>,
    sessions: Mutex<SessionStore<Session>>,
}

struct SessionEntry<S> {
    session: Arc<Mutex<S>>,
    last_active: Instant,
}

/// Live sessions by id. Idle sessions expire, and a full store drops its
/// least recently used session to make room.
struct SessionStore<S> {
    entries: HashMap<String, SessionEntry<S>>,
    timeout: Duration,
    max_sessions: usize,
}

impl<S> SessionStore<S> {
    fn new(timeout: Duration, max_sessions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Fetch the session for `id`, creating it (and an id) when needed.
    fn get_or_create(
        &mut self,
        id: Option<String>,
        now: Instant,
        create: impl FnOnce() -> S,
    ) -> (String, Arc<Mutex<S>>) {
        self.cleanup_expired(now);

        let id = id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(entry) = self.entries.get_mut(&id) {
            entry.last_active = now;
            return (id, entry.session.clone());
        }

        if self.entries.len() >= self.max_sessions {
            self.evict_least_recent();
        }

        info!("New session {}", id);
        let session = Arc::new(Mutex::new(create()));
        self.entries.insert(
            id.clone(),
            SessionEntry {
                session: session.clone(),
                last_active: now,
            },
        );
        (id, session)
    }

    /// Drop sessions idle for longer than the timeout.
    fn cleanup_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let timeout = self.timeout;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_active) <= timeout);

        let expired = before - self.entries.len();
        if expired > 0 {
            debug!("Expired {} idle sessions", expired);
        }
        expired
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_active)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            debug!("Session store full, dropping {}", id);
            self.entries.remove(&id);
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'coursemate doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let state = Arc::new(AppState {
        orchestrator: Arc::new(Orchestrator::new(&settings)?),
        sessions: Mutex::new(SessionStore::new(
            settings.server.session_timeout(),
            settings.server.max_sessions,
        )),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/session/{id}", delete(end_session))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("CourseMate API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Ask", "POST /ask");
    Output::kv("End session", "DELETE /session/{id}");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    /// Continue an earlier conversation; omitted starts a new one.
    #[serde(default)]
    session_id: Option<String>,
    /// Answer as of this date instead of today.
    #[serde(default)]
    today: Option<chrono::NaiveDate>,
}

#[derive(Serialize)]
struct AskResponse {
    session_id: String,
    answer: String,
    kind: AnswerKind,
    citations: Vec<EvidenceRef>,
    caveats: Vec<String>,
    tool_calls: Vec<ToolCallInfo>,
}

#[derive(Serialize)]
struct ToolCallInfo {
    tool: String,
    input: String,
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.sessions.lock().await.len();
    Json(serde_json::json!({ "status": "ok", "sessions": sessions }))
}

async fn end_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    if state.sessions.lock().await.remove(&id) {
        info!("Ended session {}", id);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> axum::response::Response {
    if req.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "question is empty".to_string(),
            }),
        )
            .into_response();
    }

    let (session_id, session) = state.sessions.lock().await.get_or_create(
        req.session_id,
        Instant::now(),
        || Session::new(state.orchestrator.clone()),
    );
    let today = req.today.unwrap_or_else(|| chrono::Local::now().date_naive());

    // Turns within one session run one at a time.
    let mut session = session.lock().await;
    match session.ask(&req.question, today).await {
        Ok(answer) => {
            let tool_calls = session
                .state()
                .current()
                .map(|turn| {
                    turn.invocations()
                        .iter()
                        .map(|inv| ToolCallInfo {
                            tool: inv.tool().to_string(),
                            input: inv.input.to_string(),
                            status: match &inv.outcome {
                                Ok(output) if output.is_absence() => "not_found".to_string(),
                                Ok(_) => "ok".to_string(),
                                Err(e) => e.kind().to_string(),
                            },
                        })
                        .collect()
                })
                .unwrap_or_default();

            Json(AskResponse {
                session_id,
                answer: answer.text,
                kind: answer.kind,
                citations: answer.citations,
                caveats: answer.caveats,
                tool_calls,
            })
            .into_response()
        }
        Err(e) => turn_failed(&session_id, &e),
    }
}

/// Log the real error and hand the client an apology.
fn turn_failed(session_id: &str, error: &CourseMateError) -> axum::response::Response {
    warn!("Session {} failed: {}", session_id, error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: APOLOGY.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_sessions: usize) -> SessionStore<u32> {
        SessionStore::new(Duration::from_secs(60), max_sessions)
    }

    #[test]
    fn test_missing_id_creates_session() {
        let mut sessions = store(10);
        let (id, _) = sessions.get_or_create(None, Instant::now(), || 1);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_known_id_reuses_session() {
        let mut sessions = store(10);
        let now = Instant::now();
        let (_, first) = sessions.get_or_create(Some("a".into()), now, || 1);
        let (_, again) = sessions.get_or_create(Some("a".into()), now, || 2);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let mut sessions = store(10);
        let start = Instant::now();
        sessions.get_or_create(Some("old".into()), start, || 1);
        sessions.get_or_create(Some("recent".into()), start + Duration::from_secs(50), || 2);

        let later = start + Duration::from_secs(90);
        assert_eq!(sessions.cleanup_expired(later), 1);
        assert_eq!(sessions.len(), 1);

        // Coming back after expiry starts over.
        let (_, session) = sessions.get_or_create(Some("old".into()), later, || 3);
        assert_eq!(*session.try_lock().unwrap(), 3);
    }

    #[test]
    fn test_full_store_drops_least_recent() {
        let mut sessions = store(2);
        let start = Instant::now();
        sessions.get_or_create(Some("a".into()), start, || 1);
        sessions.get_or_create(Some("b".into()), start + Duration::from_secs(1), || 2);
        // Touching "a" makes "b" the least recently used.
        sessions.get_or_create(Some("a".into()), start + Duration::from_secs(2), || 1);
        sessions.get_or_create(Some("c".into()), start + Duration::from_secs(3), || 3);

        assert_eq!(sessions.len(), 2);
        assert!(sessions.entries.contains_key("a"));
        assert!(sessions.entries.contains_key("c"));
        assert!(!sessions.entries.contains_key("b"));
    }

    #[tokio::test]
    async fn test_turn_failure_hides_internal_error() {
        let error = CourseMateError::Conversation("previous turn is still in progress".into());
        let response = turn_failed("a", &error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], APOLOGY);
        assert!(!body.to_string().contains("in progress"));
    }

    #[test]
    fn test_remove_ends_session() {
        let mut sessions = store(10);
        sessions.get_or_create(Some("a".into()), Instant::now(), || 1);
        assert!(sessions.remove("a"));
        assert!(!sessions.remove("a"));
        assert_eq!(sessions.len(), 0);
    }
}
