//! Route registration: site CRUD, approval list management, system endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use sites_core::{ListParams, ListResult, ServiceError};
use sites_store::{AdminRegistry, ApprovalEntry, ApprovalStatus, Caller, NewSite, SiteOps, SiteRecord};

use crate::auth_middleware::{self, JwtState};

/// Application shared state.
#[derive(Clone)]
pub struct AppState {
    pub sites: Arc<SiteOps>,
    pub admins: Arc<AdminRegistry>,
}

/// Build the complete router.
///
/// Routes:
///   GET    /sites                     list (paginated, ordered by site number)
///   POST   /sites                     create
///   GET    /sites/{id}                get
///   PATCH  /sites/{id}                partial update (RFC 7386 merge patch)
///   DELETE /sites/{id}                delete
///   GET    /admins?status=...         list approval entries
///   POST   /admins/requests           request write access for the caller
///   POST   /admins/{email}/approve    approve an email
///   POST   /admins/{email}/revoke     revoke an email
pub fn build_router(state: AppState, jwt_state: Arc<JwtState>) -> Router {
    Router::new()
        .route("/sites", get(list_sites).post(create_site))
        .route(
            "/sites/{id}",
            get(get_site).patch(update_site).delete(delete_site),
        )
        .route("/admins", get(list_admins))
        .route("/admins/requests", post(request_access))
        .route("/admins/{email}/approve", post(approve_admin))
        .route("/admins/{email}/revoke", post(revoke_admin))
        .with_state(state)
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(middleware::from_fn_with_state(
            jwt_state,
            auth_middleware::auth_middleware,
        ))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "sitesd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_sites(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<SiteRecord>>, ServiceError> {
    Ok(Json(state.sites.list(&caller, &params)?))
}

async fn get_site(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<SiteRecord>, ServiceError> {
    Ok(Json(state.sites.get_or_err(&caller, &id)?))
}

async fn create_site(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(new): Json<NewSite>,
) -> Result<Json<SiteRecord>, ServiceError> {
    Ok(Json(state.sites.create(&caller, new)?))
}

async fn update_site(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<SiteRecord>, ServiceError> {
    Ok(Json(state.sites.update(&caller, &id, &patch)?))
}

async fn delete_site(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<(), ServiceError> {
    state.sites.delete(&caller, &id)
}

#[derive(Debug, Deserialize)]
struct AdminQuery {
    #[serde(default)]
    status: Option<ApprovalStatus>,
}

async fn list_admins(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<Vec<ApprovalEntry>>, ServiceError> {
    Ok(Json(state.admins.list(&caller, query.status)?))
}

async fn request_access(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApprovalEntry>, ServiceError> {
    Ok(Json(state.admins.request_access(&caller)?))
}

async fn approve_admin(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> Result<Json<ApprovalEntry>, ServiceError> {
    Ok(Json(state.admins.approve(&caller, &email)?))
}

async fn revoke_admin(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(email): Path<String>,
) -> Result<Json<ApprovalEntry>, ServiceError> {
    Ok(Json(state.admins.revoke(&caller, &email)?))
}
