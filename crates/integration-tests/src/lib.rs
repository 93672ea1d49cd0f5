//! Integration tests for the Atelier cart client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```
//!
//! # Fake Backend
//!
//! [`FakeBackend`] serves the cart REST contract with `axum` on a loopback
//! port. Cart semantics come from [`InMemoryCartGateway`]; the HTTP layer
//! records every request and can replay scripted responses, so tests can
//! check both what the client sends and how it handles what comes back.
//!
//! ```rust,ignore
//! let backend = FakeBackend::start().await?;
//! let gateway = HttpCartGateway::new(&backend.config())?;
//! backend.script(Scripted::status(503, r#"{"message":"Maintenance"}"#));
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use atelier_cart::gateway::wire::CartLineRecord;
use atelier_cart::gateway::{AddLine, CartGateway, CheckoutReceipt, InMemoryCartGateway};
use atelier_cart::{CartError, GatewayConfig, ResponseBody};
use atelier_core::{LineId, SourceKind, SubjectId, TargetId};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use url::Url;

// =============================================================================
// Recorded and scripted traffic
// =============================================================================

/// A request as received by the fake backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    /// Body parsed as JSON, if it was JSON.
    pub body: Option<serde_json::Value>,
}

/// Canned response returned instead of the real handler.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Scripted {
    /// Respond immediately with `status` and `body`.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// Wait `delay` before responding.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

// =============================================================================
// FakeBackend
// =============================================================================

struct FakeState {
    cart: Arc<InMemoryCartGateway>,
    requests: Mutex<Vec<RecordedRequest>>,
    scripted: Mutex<VecDeque<Scripted>>,
}

/// Cart backend served over HTTP on `127.0.0.1`.
///
/// The server task stops when the value is dropped.
pub struct FakeBackend {
    base_url: Url,
    state: Arc<FakeState>,
    server: tokio::task::JoinHandle<()>,
}

impl FakeBackend {
    /// Bind a loopback port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if no port can be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state = Arc::new(FakeState {
            cart: Arc::new(InMemoryCartGateway::new()),
            requests: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
        });

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let base_url =
            Url::parse(&format!("http://{addr}/api")).map_err(std::io::Error::other)?;

        let app = router(Arc::clone(&state));
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Fake cart backend stopped");
            }
        });

        Ok(Self {
            base_url,
            state,
            server,
        })
    }

    /// Backend cart state.
    #[must_use]
    pub fn cart(&self) -> &InMemoryCartGateway {
        &self.state.cart
    }

    /// API root, e.g. `http://127.0.0.1:41234/api`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Gateway configuration pointing at this backend.
    #[must_use]
    pub fn config(&self) -> GatewayConfig {
        GatewayConfig::new(self.base_url.clone())
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }

    /// Most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<RecordedRequest> {
        lock(&self.state.requests).last().cloned()
    }

    /// Answer the next request with `response` instead of the real handler.
    ///
    /// Scripted responses are used in the order they were queued.
    pub fn script(&self, response: Scripted) {
        lock(&self.state.scripted).push_back(response);
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn router(state: Arc<FakeState>) -> Router {
    let api = Router::new()
        .route("/cart", get(fetch_cart))
        .route("/cart/add", post(add_line))
        .route("/cart/clear", delete(clear_cart))
        .route("/cart/{line}", delete(remove_line))
        .route("/cart/{line}/quantity", patch(change_quantity))
        .route("/checkout", post(checkout));

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
        .with_state(state)
}

/// Record the request, then either replay a scripted response or run the handler.
async fn record(State(state): State<Arc<FakeState>>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    lock(&state.requests).push(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(String::from),
        authorization: parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from),
        body: serde_json::from_slice(&bytes).ok(),
    });

    let scripted = lock(&state.scripted).pop_front();
    if let Some(scripted) = scripted {
        tokio::time::sleep(scripted.delay).await;
        let status =
            StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, scripted.body).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Deserialize)]
struct SubjectQuery {
    subject: i64,
}

#[derive(Deserialize)]
struct DeltaQuery {
    delta: i32,
}

#[derive(Deserialize)]
struct SubjectBody {
    subject: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    target_id: String,
    source_kind: SourceKind,
    quantity: NonZeroU32,
    subject: i64,
}

/// Backend error rendered as the real API does: status plus `{message}`.
struct ApiError(CartError);

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            CartError::Rejected { status, body, .. } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
                match body {
                    ResponseBody::Json(value) => (status, Json(value)).into_response(),
                    ResponseBody::Raw(text) => (status, text).into_response(),
                    ResponseBody::Empty => status.into_response(),
                }
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": other.to_string() })),
            )
                .into_response(),
        }
    }
}

async fn fetch_cart(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<SubjectQuery>,
) -> Result<Json<Vec<CartLineRecord>>, ApiError> {
    let cart = state.cart.fetch(SubjectId::new(query.subject)).await?;
    Ok(Json(cart.lines().iter().map(CartLineRecord::from).collect()))
}

async fn add_line(
    State(state): State<Arc<FakeState>>,
    Json(body): Json<AddBody>,
) -> Result<StatusCode, ApiError> {
    let request = AddLine {
        target_id: TargetId::new(body.target_id),
        source_kind: body.source_kind,
        quantity: body.quantity,
        subject: SubjectId::new(body.subject),
    };
    state.cart.add(&request).await?;
    Ok(StatusCode::OK)
}

async fn change_quantity(
    State(state): State<Arc<FakeState>>,
    Path(line): Path<String>,
    Query(query): Query<DeltaQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .cart
        .change_quantity(&LineId::new(line), query.delta)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_line(
    State(state): State<Arc<FakeState>>,
    Path(line): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.cart.remove(&LineId::new(line)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<SubjectQuery>,
) -> Result<StatusCode, ApiError> {
    state.cart.clear(SubjectId::new(query.subject)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn checkout(
    State(state): State<Arc<FakeState>>,
    Json(body): Json<SubjectBody>,
) -> Result<Json<CheckoutReceipt>, ApiError> {
    let receipt = state.cart.checkout(SubjectId::new(body.subject)).await?;
    Ok(Json(receipt))
}
