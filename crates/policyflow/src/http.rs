//! Axum HTTP handlers for the PolicyFlow server.
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`.
//! Handlers resolve the caller, hand off to the access layer and map
//! `CoreError` kinds onto status codes with a `{"error": ...}` body.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use policyflow_access::{stats_report, Directory, PolicyEngine};
use policyflow_core::{
    Acknowledgement, CallerContext, CoreError, Department, DepartmentInput, DepartmentPatch,
    DocumentStore, ErrorKind, Policy, PolicyDetail, PolicyInput, PolicyListItem, PolicyPatch,
    PolicyVersion, StatsReport, User, UserInput, UserPatch, VersionInput,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::config::AppConfig;
use crate::identity::{resolve_caller, AuthError, ResolveError, TokenIssuer};

/// Shared application state for Axum handlers.
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub tokens: TokenIssuer,
    pub config: AppConfig,
}

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(handle_health))
        .route("/me", get(handle_me))
        .route("/policies", get(handle_list_policies).post(handle_create_policy))
        .route(
            "/policies/{id}",
            get(handle_get_policy).put(handle_update_policy),
        )
        .route(
            "/policies/{id}/versions",
            get(handle_list_versions).post(handle_create_version),
        )
        .route(
            "/policies/{id}/current-version",
            put(handle_set_current_version),
        )
        .route("/policies/{id}/acknowledge", post(handle_acknowledge))
        .route(
            "/policies/{id}/acknowledgements",
            get(handle_list_acknowledgements),
        )
        .route(
            "/departments",
            get(handle_list_departments).post(handle_create_department),
        )
        .route(
            "/departments/{id}",
            put(handle_update_department).delete(handle_delete_department),
        )
        .route("/users", get(handle_list_users).post(handle_create_user))
        .route(
            "/users/{id}",
            put(handle_update_user).delete(handle_delete_user),
        )
        .route("/admin/stats", get(handle_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors and request plumbing
// ---------------------------------------------------------------------------

/// Error response: a status code and a client-facing message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match e.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => {
                error!(error = %e, "request failed");
                return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            }
        };
        ApiError::new(status, e.message())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        debug!(reason = %e, "authentication rejected");
        ApiError::new(StatusCode::UNAUTHORIZED, e.to_string())
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Auth(auth) => auth.into(),
            ResolveError::Store(core) => core.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Extract the session token from the Authorization header.
fn extract_session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the bearer token and resolve it to a caller.
fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<CallerContext> {
    let token = extract_session_token(headers).ok_or(AuthError::Missing)?;
    let claims = state.tokens.verify(token)?;
    Ok(resolve_caller(state.store.as_ref(), &claims)?)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(value)| value).map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Health and identity
// ---------------------------------------------------------------------------

/// GET /health -- liveness
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /me -- the caller's own user row
async fn handle_me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let caller = authenticate(&state, &headers)?;
    Ok(Json(Directory::new(state.store.as_ref()).me(&caller)?))
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// GET /policies -- visible policies with the caller's acknowledgement flag
async fn handle_list_policies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PolicyListItem>>> {
    let caller = authenticate(&state, &headers)?;
    let items = PolicyEngine::new(state.store.as_ref()).list_with_ack(&caller)?;
    Ok(Json(items))
}

/// POST /policies
async fn handle_create_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PolicyInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let caller = authenticate(&state, &headers)?;
    let input = body(payload)?;
    let policy = PolicyEngine::new(state.store.as_ref()).create_policy(&caller, input)?;
    Ok((StatusCode::CREATED, Json(policy)))
}

/// GET /policies/{id}
async fn handle_get_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<PolicyDetail>> {
    let caller = authenticate(&state, &headers)?;
    let detail = PolicyEngine::new(state.store.as_ref()).get_policy_detail(&caller, &id)?;
    Ok(Json(detail))
}

/// PUT /policies/{id}
async fn handle_update_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<PolicyPatch>, JsonRejection>,
) -> ApiResult<Json<Policy>> {
    let caller = authenticate(&state, &headers)?;
    let patch = body(payload)?;
    let policy = PolicyEngine::new(state.store.as_ref()).update_policy(&caller, &id, patch)?;
    Ok(Json(policy))
}

/// GET /policies/{id}/versions -- newest first
async fn handle_list_versions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PolicyVersion>>> {
    let caller = authenticate(&state, &headers)?;
    let versions = PolicyEngine::new(state.store.as_ref()).list_versions(&caller, &id)?;
    Ok(Json(versions))
}

/// POST /policies/{id}/versions -- publish new content and make it current
async fn handle_create_version(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<VersionInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PolicyVersion>)> {
    let caller = authenticate(&state, &headers)?;
    let input = body(payload)?;
    let version = PolicyEngine::new(state.store.as_ref()).create_version(&caller, &id, input)?;
    Ok((StatusCode::CREATED, Json(version)))
}

#[derive(Debug, Deserialize)]
struct CurrentVersionRequest {
    #[serde(default)]
    version_id: String,
}

/// PUT /policies/{id}/current-version -- repoint to an existing version
async fn handle_set_current_version(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<CurrentVersionRequest>, JsonRejection>,
) -> ApiResult<Json<Policy>> {
    let caller = authenticate(&state, &headers)?;
    let req = body(payload)?;
    let policy = PolicyEngine::new(state.store.as_ref()).set_current_version(
        &caller,
        &id,
        req.version_id.trim(),
    )?;
    Ok(Json(policy))
}

/// POST /policies/{id}/acknowledge -- sign off on the current version
async fn handle_acknowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Acknowledgement>)> {
    let caller = authenticate(&state, &headers)?;
    let ack = PolicyEngine::new(state.store.as_ref()).acknowledge(&caller, &id)?;
    Ok((StatusCode::CREATED, Json(ack)))
}

/// Acknowledgement with its recomputed signature check.
#[derive(Debug, Serialize)]
struct AcknowledgementView {
    #[serde(flatten)]
    ack: Acknowledgement,
    verified: bool,
}

/// GET /policies/{id}/acknowledgements -- who signed the current version
async fn handle_list_acknowledgements(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AcknowledgementView>>> {
    let caller = authenticate(&state, &headers)?;
    let engine = PolicyEngine::new(state.store.as_ref());
    let views = engine
        .list_acknowledgements(&caller, &id)?
        .into_iter()
        .map(|ack| AcknowledgementView {
            verified: engine.verify_acknowledgement(&ack),
            ack,
        })
        .collect();
    Ok(Json(views))
}

// ---------------------------------------------------------------------------
// Departments
// ---------------------------------------------------------------------------

/// GET /departments
async fn handle_list_departments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Department>>> {
    let caller = authenticate(&state, &headers)?;
    let departments = Directory::new(state.store.as_ref()).list_departments(&caller)?;
    Ok(Json(departments))
}

/// POST /departments
async fn handle_create_department(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DepartmentInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Department>)> {
    let caller = authenticate(&state, &headers)?;
    let input = body(payload)?;
    let dept = Directory::new(state.store.as_ref()).create_department(&caller, input)?;
    Ok((StatusCode::CREATED, Json(dept)))
}

/// PUT /departments/{id}
async fn handle_update_department(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<DepartmentPatch>, JsonRejection>,
) -> ApiResult<Json<Department>> {
    let caller = authenticate(&state, &headers)?;
    let patch = body(payload)?;
    let dept = Directory::new(state.store.as_ref()).update_department(&caller, &id, patch)?;
    Ok(Json(dept))
}

/// DELETE /departments/{id}
async fn handle_delete_department(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let caller = authenticate(&state, &headers)?;
    Directory::new(state.store.as_ref()).delete_department(&caller, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// GET /users -- all users, or the caller's department for DeptAdmin
async fn handle_list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<User>>> {
    let caller = authenticate(&state, &headers)?;
    let users = Directory::new(state.store.as_ref()).list_users(&caller)?;
    Ok(Json(users))
}

/// POST /users
async fn handle_create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let caller = authenticate(&state, &headers)?;
    let input = body(payload)?;
    let user = Directory::new(state.store.as_ref()).create_user(&caller, input)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /users/{id}
async fn handle_update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let caller = authenticate(&state, &headers)?;
    let patch = body(payload)?;
    let user = Directory::new(state.store.as_ref()).update_user(&caller, &id, patch)?;
    Ok(Json(user))
}

/// DELETE /users/{id}
async fn handle_delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let caller = authenticate(&state, &headers)?;
    Directory::new(state.store.as_ref()).delete_user(&caller, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// GET /admin/stats
async fn handle_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<StatsReport>> {
    let caller = authenticate(&state, &headers)?;
    Ok(Json(stats_report(state.store.as_ref(), &caller)?))
}
