use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;

use crate::authz::condition::PredicateRegistry;
use crate::authz::resource::ResourceRecord;
use crate::authz::store::PolicyStore;
use crate::authz::types::{Actor, AuthzRequest, RequestContext, Role};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PolicyStore>,
    /// Source for `/v1/reload`; `None` when serving the built-in policy.
    pub policies_dir: Option<PathBuf>,
    pub registry: Arc<PredicateRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub actor: Actor,
    pub resource: ResourceRecord,
    pub actions: Vec<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleSummary {
    pub name: String,
    pub display_name: String,
    pub color: Option<String>,
    pub parents: Vec<String>,
    pub resource_kinds: Vec<String>,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        let mut resource_kinds: Vec<String> = role.permissions.keys().cloned().collect();
        resource_kinds.sort();
        Self {
            name: role.name.clone(),
            display_name: role.display_name.clone(),
            color: role.color.clone(),
            parents: role.parents.clone(),
            resource_kinds,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/authorize", post(handle_authorize))
        .route("/v1/roles", get(list_roles))
        .route("/v1/roles/{name}", get(get_role))
        .route("/v1/reload", post(handle_reload))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> impl IntoResponse {
    let mut context = RequestContext::new();
    context.attributes = req.context;
    if let Some(ms) = req.timeout_ms {
        context = context.with_timeout(Duration::from_millis(ms));
    }

    let request = AuthzRequest::new(&req.actor, &req.resource)
        .actions(req.actions)
        .with_context(context);

    match state.store.authorizer().authorize(&request) {
        Ok(()) => Json(AuthorizeResponse { allowed: true }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_roles(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let mut roles: Vec<RoleSummary> = snapshot.roles().map(RoleSummary::from).collect();
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    Json(roles)
}

async fn get_role(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    match snapshot.role(&name) {
        Some(role) => Json(RoleSummary::from(role)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("role `{name}` is not defined") })),
        )
            .into_response(),
    }
}

async fn handle_reload(State(state): State<AppState>) -> impl IntoResponse {
    let Some(dir) = state.policies_dir.as_deref() else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "no policies directory configured" })),
        )
            .into_response();
    };

    match state.store.reload(dir, &state.registry) {
        Ok(()) => {
            let snapshot = state.store.snapshot();
            Json(json!({
                "roles": snapshot.role_count(),
                "presets": snapshot.preset_count(),
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
