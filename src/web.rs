//! HTTP surface: the check RPCs and the administrative CRUD services.
//!
//! Authenticated calls carry `Authorization: <token>` (HS-signed, claim
//! `biz_id`) or an `X-Biz-ID` header. Mutations that can change a user's
//! effective permissions reload the affected snapshots and publish the
//! change event; attribute and policy mutations invalidate their cache
//! keys.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cache::abac::AbacCache;
use crate::cache::hot::PolicyHotCache;
use crate::cache::session::SessionPermissionCache;
use crate::engine::{self, rbac, CheckInput};
use crate::errors::ApsisError;
use crate::events::bus::EventBus;
use crate::failover::pool::FailoverPool;
use crate::settings::Settings;
use crate::store;
use crate::token;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool: FailoverPool,
    pub sessions: Arc<SessionPermissionCache>,
    pub abac_cache: Arc<AbacCache>,
    pub hot: Arc<PolicyHotCache>,
    pub bus: Arc<dyn EventBus>,
}

impl IntoResponse for ApsisError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApsisError::BizNotFound(_)
            | ApsisError::KeyNotFound(_)
            | ApsisError::AttributeNotFound(_)
            | ApsisError::UpdateFailed(_) => StatusCode::NOT_FOUND,
            ApsisError::InvalidParameter(_)
            | ApsisError::DecodeError(_)
            | ApsisError::UnknownOperator { .. }
            | ApsisError::UnknownDataType(_) => StatusCode::BAD_REQUEST,
            ApsisError::UniqueConflict(_) => StatusCode::CONFLICT,
            ApsisError::Jose(_) | ApsisError::PermissionDenied => StatusCode::UNAUTHORIZED,
            ApsisError::UnknownPermissionAction => StatusCode::UNPROCESSABLE_ENTITY,
            // The write was accepted onto the failover stream.
            ApsisError::ToAsync => StatusCode::ACCEPTED,
            ApsisError::DbUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "code": self.code(), "message": self.to_string() }));
        (status, body).into_response()
    }
}

type WebResult<T> = Result<T, ApsisError>;

/// Business scope of an authenticated call: the bearer token's `biz_id`
/// claim, or the `X-Biz-ID` header.
fn biz_id_from(headers: &HeaderMap, settings: &Settings) -> WebResult<i64> {
    if let Some(raw) = headers.get(axum::http::header::AUTHORIZATION) {
        let raw = raw
            .to_str()
            .map_err(|_| ApsisError::InvalidParameter("authorization header".into()))?;
        let raw = raw.strip_prefix("Bearer ").unwrap_or(raw);
        return token::verify(&settings.token.secret, raw);
    }
    if let Some(raw) = headers.get("x-biz-id") {
        return raw
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ApsisError::InvalidParameter("x-biz-id header".into()));
    }
    Err(ApsisError::PermissionDenied)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/permissions/check", post(check_permission))
        .route("/v1/permissions/check-batch", post(batch_check_permission))
        .route("/v1/permissions/all", get(get_all_permissions))
        .route("/v1/admin/businesses", post(create_business).get(list_businesses))
        .route("/v1/admin/businesses/{id}", delete(delete_business))
        .route("/v1/admin/resources", post(create_resource).get(list_resources))
        .route(
            "/v1/admin/resources/{id}",
            put(update_resource).delete(delete_resource),
        )
        .route("/v1/admin/permissions", post(create_permission).get(list_permissions))
        .route(
            "/v1/admin/permissions/{id}",
            put(update_permission).delete(delete_permission),
        )
        .route("/v1/admin/roles", post(create_role).get(list_roles))
        .route("/v1/admin/roles/{id}", put(update_role).delete(delete_role))
        .route(
            "/v1/admin/role-inclusions",
            post(add_role_inclusion).delete(remove_role_inclusion),
        )
        .route(
            "/v1/admin/role-permissions",
            post(add_role_permission).delete(remove_role_permission),
        )
        .route("/v1/admin/user-roles", post(grant_user_role).delete(revoke_user_role))
        .route(
            "/v1/admin/user-permissions",
            post(grant_user_permission).delete(revoke_user_permission),
        )
        .route(
            "/v1/admin/attributes/definitions",
            post(create_attribute_definition).get(list_attribute_definitions),
        )
        .route(
            "/v1/admin/attributes/definitions/{id}",
            delete(delete_attribute_definition),
        )
        .route(
            "/v1/admin/attributes/subject",
            put(set_subject_attribute).delete(delete_subject_attribute),
        )
        .route(
            "/v1/admin/attributes/resource",
            put(set_resource_attribute).delete(delete_resource_attribute),
        )
        .route(
            "/v1/admin/attributes/environment",
            put(set_environment_attribute).delete(delete_environment_attribute),
        )
        .route("/v1/admin/policies", post(create_policy).get(list_policies))
        .route("/v1/admin/policies/{id}", delete(delete_policy))
        .route("/v1/admin/policies/{id}/status", put(update_policy_status))
        .route("/v1/admin/policies/{id}/rules", post(create_policy_rule))
        .route(
            "/v1/admin/permission-policies",
            post(attach_permission_policy).delete(detach_permission_policy),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.settings.server.host, state.settings.server.port)
        .parse()
        .into_diagnostic()?;
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ---------- check services ----------

#[derive(Debug, Deserialize)]
pub struct CheckPermissionRequest {
    pub uid: i64,
    pub permission: PermissionQuery,
}

#[derive(Debug, Deserialize)]
pub struct PermissionQuery {
    pub biz_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    pub actions: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
}

impl CheckPermissionRequest {
    fn to_input(&self) -> CheckInput {
        CheckInput {
            biz_id: self.permission.biz_id,
            user_id: self.uid,
            resource_type: self.permission.resource_type.clone(),
            resource_key: self.permission.resource_key.clone(),
            actions: self.permission.actions.clone(),
            overrides: self.permission.attributes.clone(),
        }
    }
}

async fn check_permission(
    State(state): State<AppState>,
    Json(req): Json<CheckPermissionRequest>,
) -> WebResult<Json<CheckPermissionResponse>> {
    let allowed = engine::check(
        &state.pool,
        &state.sessions,
        &state.abac_cache,
        &req.to_input(),
        store::now_ms(),
    )
    .await?;
    Ok(Json(CheckPermissionResponse { allowed }))
}

#[derive(Debug, Deserialize)]
struct BatchCheckRequest {
    requests: Vec<CheckPermissionRequest>,
}

#[derive(Debug, Serialize)]
struct BatchCheckResponse {
    allowed: Vec<bool>,
}

/// Positional: `allowed[i]` answers `requests[i]`.
async fn batch_check_permission(
    State(state): State<AppState>,
    Json(req): Json<BatchCheckRequest>,
) -> WebResult<Json<BatchCheckResponse>> {
    let now = store::now_ms();
    let mut allowed = Vec::with_capacity(req.requests.len());
    for request in &req.requests {
        allowed.push(
            engine::check(
                &state.pool,
                &state.sessions,
                &state.abac_cache,
                &request.to_input(),
                now,
            )
            .await?,
        );
    }
    Ok(Json(BatchCheckResponse { allowed }))
}

#[derive(Debug, Deserialize)]
struct AllPermissionsQuery {
    biz_id: i64,
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct AllPermissionsResponse {
    user_permissions: Vec<UserPermissionRow>,
}

#[derive(Debug, Serialize)]
struct UserPermissionRow {
    biz_id: i64,
    user_id: i64,
    permission_id: i64,
    permission_name: String,
    resource_type: String,
    resource_key: String,
    permission_action: String,
    effect: String,
}

async fn get_all_permissions(
    State(state): State<AppState>,
    Query(query): Query<AllPermissionsQuery>,
) -> WebResult<Json<AllPermissionsResponse>> {
    let effective =
        rbac::resolve_user_permissions(&state.pool, query.biz_id, query.user_id, store::now_ms())
            .await?;
    let ids: Vec<i64> = effective.iter().map(|p| p.permission_id).collect();
    let names: HashMap<i64, String> =
        store::permissions::get_permissions_by_ids(&state.pool, query.biz_id, &ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

    let user_permissions = effective
        .into_iter()
        .map(|p| UserPermissionRow {
            biz_id: query.biz_id,
            user_id: query.user_id,
            permission_id: p.permission_id,
            permission_name: names.get(&p.permission_id).cloned().unwrap_or_default(),
            resource_type: p.resource_type,
            resource_key: p.resource_key,
            permission_action: p.action,
            effect: p.effect.to_string(),
        })
        .collect();
    Ok(Json(AllPermissionsResponse { user_permissions }))
}

// ---------- businesses ----------

#[derive(Debug, Deserialize)]
struct CreateBusinessRequest {
    owner_id: i64,
    owner_type: String,
    name: String,
    #[serde(default)]
    rate_limit: i64,
}

async fn create_business(
    State(state): State<AppState>,
    Json(req): Json<CreateBusinessRequest>,
) -> WebResult<impl IntoResponse> {
    let business = store::businesses::create_business(
        &state.pool,
        req.owner_id,
        &req.owner_type,
        &req.name,
        req.rate_limit,
    )
    .await?;
    let bearer = token::issue(&state.settings.token.secret, business.id)?;
    store::businesses::update_business_token(&state.pool, business.id, &bearer).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "business": business, "token": bearer })),
    ))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: u64,
}

async fn list_businesses(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let businesses = store::businesses::list_businesses(&state.pool, page.page).await?;
    Ok(Json(businesses))
}

async fn delete_business(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    store::businesses::delete_business(state.pool.transactional()?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- resources ----------

#[derive(Debug, Deserialize)]
struct CreateResourceRequest {
    resource_type: String,
    resource_key: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: String,
}

async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateResourceRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let resource = store::resources::create_resource(
        &state.pool,
        biz_id,
        &req.resource_type,
        &req.resource_key,
        &req.name,
        &req.description,
        &req.metadata,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn list_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    Ok(Json(store::resources::list_resources(&state.pool, biz_id, page.page).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateResourceRequest {
    name: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
}

async fn update_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateResourceRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::resources::update_resource(&state.pool, biz_id, id, req.name, req.description, req.metadata)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::resources::delete_resource(&state.pool, biz_id, id).await?;
    state.abac_cache.invalidate_resource(biz_id, id).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- permissions ----------

#[derive(Debug, Deserialize)]
struct CreatePermissionRequest {
    resource_id: i64,
    name: String,
    #[serde(default)]
    description: String,
    action: String,
    #[serde(default)]
    metadata: String,
}

async fn create_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePermissionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let resource = store::resources::get_resource(&state.pool, biz_id, req.resource_id)
        .await?
        .ok_or_else(|| ApsisError::InvalidParameter(format!("resource {}", req.resource_id)))?;
    let permission = store::permissions::create_permission(
        &state.pool,
        biz_id,
        &req.name,
        &req.description,
        &resource,
        &req.action,
        &req.metadata,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

async fn list_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    Ok(Json(store::permissions::list_permissions(&state.pool, biz_id, page.page).await?))
}

#[derive(Debug, Deserialize)]
struct UpdatePermissionRequest {
    name: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
}

async fn update_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePermissionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::permissions::update_permission(&state.pool, biz_id, id, req.name, req.description, req.metadata)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::permissions::delete_permission(&state.pool, biz_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- roles ----------

#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    role_type: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: String,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    end_time: i64,
}

async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRoleRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let role = store::roles::create_role(
        &state.pool,
        biz_id,
        &req.role_type,
        &req.name,
        &req.description,
        &req.metadata,
        req.start_time,
        req.end_time,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn list_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    Ok(Json(store::roles::list_roles(&state.pool, biz_id, page.page).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    name: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
}

async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRoleRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::roles::update_role(&state.pool, biz_id, id, req.name, req.description, req.metadata).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::roles::delete_role(&state.pool, biz_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- role inclusions / role permissions ----------

#[derive(Debug, Deserialize)]
struct RoleInclusionRequest {
    including_role_id: i64,
    included_role_id: i64,
}

/// Reloads every user whose closure reaches the included role, then
/// publishes their fresh snapshots.
async fn reload_role_holders(state: &AppState, biz_id: i64, role_id: i64) -> WebResult<()> {
    let users = rbac::affected_users(&state.pool, biz_id, role_id).await?;
    state
        .sessions
        .reload(&state.pool, biz_id, &users, store::now_ms())
        .await
}

async fn add_role_inclusion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RoleInclusionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let edge = store::roles::add_inclusion(
        &state.pool,
        biz_id,
        req.including_role_id,
        req.included_role_id,
    )
    .await?;
    reload_role_holders(&state, biz_id, req.included_role_id).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn remove_role_inclusion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RoleInclusionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::roles::remove_inclusion(&state.pool, biz_id, req.including_role_id, req.included_role_id)
        .await?;
    // The edge is gone; holders of the including side lose the closure.
    reload_role_holders(&state, biz_id, req.including_role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RolePermissionRequest {
    role_id: i64,
    permission_id: i64,
}

async fn add_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RolePermissionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let permission = store::permissions::get_permission(&state.pool, biz_id, req.permission_id)
        .await?
        .ok_or_else(|| ApsisError::InvalidParameter(format!("permission {}", req.permission_id)))?;
    let edge =
        store::roles::add_role_permission(&state.pool, biz_id, req.role_id, &permission).await?;
    reload_role_holders(&state, biz_id, req.role_id).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn remove_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RolePermissionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::roles::remove_role_permission(&state.pool, biz_id, req.role_id, req.permission_id).await?;
    reload_role_holders(&state, biz_id, req.role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- user roles / user permissions ----------

#[derive(Debug, Deserialize)]
struct UserRoleRequest {
    user_id: i64,
    role_id: i64,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    end_time: i64,
}

async fn grant_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UserRoleRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let edge = store::users::grant_user_role(
        &state.pool,
        biz_id,
        req.user_id,
        req.role_id,
        req.start_time,
        req.end_time,
    )
    .await?;
    state
        .sessions
        .reload(&state.pool, biz_id, &[req.user_id], store::now_ms())
        .await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn revoke_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UserRoleRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::users::revoke_user_role(&state.pool, biz_id, req.user_id, req.role_id).await?;
    state
        .sessions
        .reload(&state.pool, biz_id, &[req.user_id], store::now_ms())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct UserPermissionRequest {
    user_id: i64,
    permission_id: i64,
    #[serde(default = "default_effect")]
    effect: String,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    end_time: i64,
}

fn default_effect() -> String {
    "allow".to_string()
}

async fn grant_user_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UserPermissionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let overlay = store::users::grant_user_permission(
        &state.pool,
        biz_id,
        req.user_id,
        req.permission_id,
        &req.effect,
        req.start_time,
        req.end_time,
    )
    .await?;
    state
        .sessions
        .reload(&state.pool, biz_id, &[req.user_id], store::now_ms())
        .await?;
    Ok((StatusCode::CREATED, Json(overlay)))
}

async fn revoke_user_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UserPermissionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::users::revoke_user_permission(&state.pool, biz_id, req.user_id, req.permission_id).await?;
    state
        .sessions
        .reload(&state.pool, biz_id, &[req.user_id], store::now_ms())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- attribute definitions and values ----------

#[derive(Debug, Deserialize)]
struct CreateAttributeDefinitionRequest {
    name: String,
    #[serde(default)]
    description: String,
    data_type: String,
    entity_type: String,
    #[serde(default)]
    validation_rule: String,
}

async fn create_attribute_definition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAttributeDefinitionRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let def = store::attributes::create_definition(
        &state.pool,
        biz_id,
        &req.name,
        &req.description,
        &req.data_type,
        &req.entity_type,
        &req.validation_rule,
    )
    .await?;
    state.abac_cache.invalidate_definitions(biz_id).await;
    Ok((StatusCode::CREATED, Json(def)))
}

async fn list_attribute_definitions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    Ok(Json(store::attributes::list_definitions(&state.pool, biz_id, page.page).await?))
}

async fn delete_attribute_definition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::delete_definition(&state.pool, biz_id, id).await?;
    state.abac_cache.invalidate_definitions(biz_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SubjectAttributeRequest {
    subject_id: i64,
    attr_def_id: i64,
    #[serde(default)]
    value: String,
}

async fn set_subject_attribute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubjectAttributeRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::set_subject_value(&state.pool, biz_id, req.subject_id, req.attr_def_id, &req.value)
        .await?;
    state.abac_cache.invalidate_subject(biz_id, req.subject_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_subject_attribute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubjectAttributeRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::delete_subject_value(&state.pool, biz_id, req.subject_id, req.attr_def_id)
        .await?;
    state.abac_cache.invalidate_subject(biz_id, req.subject_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ResourceAttributeRequest {
    resource_id: i64,
    attr_def_id: i64,
    #[serde(default)]
    value: String,
}

async fn set_resource_attribute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResourceAttributeRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::set_resource_value(&state.pool, biz_id, req.resource_id, req.attr_def_id, &req.value)
        .await?;
    state.abac_cache.invalidate_resource(biz_id, req.resource_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_resource_attribute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResourceAttributeRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::delete_resource_value(&state.pool, biz_id, req.resource_id, req.attr_def_id)
        .await?;
    state.abac_cache.invalidate_resource(biz_id, req.resource_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct EnvironmentAttributeRequest {
    attr_def_id: i64,
    #[serde(default)]
    value: String,
}

async fn set_environment_attribute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EnvironmentAttributeRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::set_environment_value(&state.pool, biz_id, req.attr_def_id, &req.value).await?;
    state.abac_cache.invalidate_environment(biz_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_environment_attribute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EnvironmentAttributeRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::attributes::delete_environment_value(&state.pool, biz_id, req.attr_def_id).await?;
    state.abac_cache.invalidate_environment(biz_id).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- policies ----------

#[derive(Debug, Deserialize)]
struct CreatePolicyRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_policy_status")]
    status: String,
    #[serde(default = "default_execute_type")]
    execute_type: String,
}

fn default_policy_status() -> String {
    "active".to_string()
}

fn default_execute_type() -> String {
    "logic".to_string()
}

async fn create_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePolicyRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let policy = store::policies::create_policy(
        &state.pool,
        biz_id,
        &req.name,
        &req.description,
        &req.status,
        &req.execute_type,
    )
    .await?;
    state.hot.invalidate(biz_id).await;
    Ok((StatusCode::CREATED, Json(policy)))
}

async fn list_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    Ok(Json(store::policies::list_policies(&state.pool, biz_id, page.page).await?))
}

#[derive(Debug, Deserialize)]
struct UpdatePolicyStatusRequest {
    status: String,
}

async fn update_policy_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePolicyStatusRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::policies::update_policy_status(&state.pool, biz_id, id, &req.status).await?;
    state.hot.invalidate(biz_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::policies::delete_policy(state.pool.transactional()?, biz_id, id).await?;
    state.hot.invalidate(biz_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreatePolicyRuleRequest {
    #[serde(default)]
    attr_def_id: i64,
    #[serde(default)]
    value: String,
    operator: String,
    #[serde(default)]
    left_id: i64,
    #[serde(default)]
    right_id: i64,
}

async fn create_policy_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(policy_id): Path<i64>,
    Json(req): Json<CreatePolicyRuleRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let rule = store::policies::save_rule(
        &state.pool,
        biz_id,
        policy_id,
        req.attr_def_id,
        &req.value,
        &req.operator,
        req.left_id,
        req.right_id,
    )
    .await?;
    state.hot.invalidate(biz_id).await;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Deserialize)]
struct PermissionPolicyRequest {
    permission_id: i64,
    policy_id: i64,
    #[serde(default = "default_effect")]
    effect: String,
}

async fn attach_permission_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PermissionPolicyRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    let edge = store::policies::attach_policy(
        &state.pool,
        biz_id,
        req.permission_id,
        req.policy_id,
        &req.effect,
    )
    .await?;
    state.hot.invalidate(biz_id).await;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn detach_permission_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PermissionPolicyRequest>,
) -> WebResult<impl IntoResponse> {
    let biz_id = biz_id_from(&headers, &state.settings)?;
    store::policies::detach_policy(&state.pool, biz_id, req.permission_id, req.policy_id).await?;
    state.hot.invalidate(biz_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn settings_with_secret(secret: &str) -> Settings {
        let mut settings = Settings::default();
        settings.token.secret = secret.to_string();
        settings
    }

    #[test]
    fn biz_id_from_bearer_token() {
        let settings = settings_with_secret("s3cr3t");
        let token = crate::token::issue("s3cr3t", 42).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(biz_id_from(&headers, &settings).unwrap(), 42);

        // Bare token without the Bearer prefix also passes.
        let mut bare = HeaderMap::new();
        bare.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&token).unwrap(),
        );
        assert_eq!(biz_id_from(&bare, &settings).unwrap(), 42);
    }

    #[test]
    fn biz_id_from_header_fallback() {
        let settings = settings_with_secret("s3cr3t");
        let mut headers = HeaderMap::new();
        headers.insert("x-biz-id", HeaderValue::from_static("7"));
        assert_eq!(biz_id_from(&headers, &settings).unwrap(), 7);
    }

    #[test]
    fn unauthenticated_calls_are_rejected() {
        let settings = settings_with_secret("s3cr3t");
        let err = biz_id_from(&HeaderMap::new(), &settings).unwrap_err();
        assert!(matches!(err, ApsisError::PermissionDenied));

        let mut forged = HeaderMap::new();
        let token = crate::token::issue("other-secret", 42).unwrap();
        forged.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&token).unwrap(),
        );
        assert!(biz_id_from(&forged, &settings).is_err());
    }

    #[test]
    fn error_kinds_map_to_stable_statuses() {
        let cases = [
            (ApsisError::BizNotFound(1), StatusCode::NOT_FOUND),
            (ApsisError::UniqueConflict("role".into()), StatusCode::CONFLICT),
            (ApsisError::InvalidParameter("x".into()), StatusCode::BAD_REQUEST),
            (ApsisError::ToAsync, StatusCode::ACCEPTED),
            (ApsisError::DbUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ApsisError::PermissionDenied, StatusCode::UNAUTHORIZED),
            (ApsisError::UnknownPermissionAction, StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
