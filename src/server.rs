//!
//! inkpost HTTP server
//! -------------------
//! Axum-based JSON REST API for the blog.
//!
//! Responsibilities:
//! - HTTP Basic credential extraction handed to the auth gate as an
//!   (identifier, secret) pair.
//! - Per-request gating: rejected credentials end the request with 401,
//!   an unconfirmed principal with 403, before any handler logic runs.
//! - Post, comment, profile and follower endpoints delegating to the store.
//! - Token issuance for password-authenticated confirmed accounts.
//! - Structured JSON errors for every failure, including the 404 fallback.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::forms::{CommentForm, EditProfileAdminForm, EditProfileForm, PostForm, RegisterForm};
use crate::identity::{
    confirmed_principal, AuthGate, AuthResult, Capability, Principal, TokenService,
};
use crate::storage::{Comment, Post, SharedStore, User};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SharedStore,
    pub gate: Arc<AuthGate>,
}

/// Wire up store, token service and gate from a configuration. The token
/// service is owned by the gate; issued-token state is not reachable except
/// through it.
pub fn app_state(config: AppConfig) -> AppState {
    let store = SharedStore::new(config.admin_email.clone());
    let tokens = TokenService::new(config.token_ttl);
    let gate = Arc::new(AuthGate::new(store.clone(), tokens));
    AppState { config: Arc::new(config), store, gate }
}

/// Mount all API routes. Split from `run` so tests can drive the router
/// directly.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "inkpost ok" }))
        .route("/api/v1/posts", get(list_posts).post(new_post))
        .route("/api/v1/posts/{id}", get(get_post).put(edit_post))
        .route("/api/v1/posts/{id}/comments", get(post_comments).post(new_comment))
        .route("/api/v1/comments", get(list_comments))
        .route("/api/v1/comments/{id}", get(get_comment))
        .route("/api/v1/comments/{id}/moderate", post(moderate_comment))
        .route("/api/v1/users", post(register))
        .route("/api/v1/users/{id}", get(get_user).put(edit_user))
        .route("/api/v1/users/{id}/posts", get(user_posts))
        .route("/api/v1/users/{id}/timeline", get(user_timeline))
        .route("/api/v1/users/{id}/follow", post(follow_user).delete(unfollow_user))
        .route("/api/v1/tokens", post(issue_token))
        .fallback(not_found)
        .with_state(state)
}

/// Start the HTTP server bound to the configured port.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let port = config.http_port;
    let state = app_state(config);
    let app = build_router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ---- authentication plumbing ----

/// Decode an HTTP Basic `Authorization` header into an (identifier, secret)
/// pair. `None` means no usable header was presented at all; an explicit
/// empty pair (`Basic` over ":") decodes to two empty strings, which the
/// gate resolves as an anonymous visitor.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?;
    let s = value.to_str().ok()?;
    // The auth scheme token is case-insensitive (RFC 7235).
    let (scheme, encoded) = s.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    match text.split_once(':') {
        Some((identifier, secret)) => Some((identifier.to_string(), secret.to_string())),
        None => Some((text, String::new())),
    }
}

/// Per-request identity hook, applied by every API handler. A request with no
/// `Authorization` header at all is refused; clients wanting anonymous access
/// present an explicit empty credential pair. Presented but invalid
/// credentials are a 401 regardless of endpoint, and a resolved principal
/// that is unconfirmed is a 403 before any operation runs.
fn identify(state: &AppState, headers: &HeaderMap) -> AppResult<AuthResult> {
    let Some((identifier, secret)) = basic_credentials(headers) else {
        return Err(AppError::auth("unauthenticated", "authentication required"));
    };
    let result = state.gate.resolve(&identifier, &secret);
    match &result {
        AuthResult::Rejected(_) => {
            Err(AppError::auth("invalid_credentials", "invalid credentials"))
        }
        AuthResult::Authenticated { principal, .. } => {
            if !principal.confirmed {
                return Err(AppError::forbidden("unconfirmed", "unconfirmed account"));
            }
            state.store.touch_last_seen(principal.user_id);
            Ok(result)
        }
        AuthResult::Anonymous => Ok(result),
    }
}

// ---- JSON projections ----

fn post_url(id: u64) -> String {
    format!("/api/v1/posts/{id}")
}

fn user_url(id: u64) -> String {
    format!("/api/v1/users/{id}")
}

fn post_json(p: &Post) -> Value {
    json!({
        "url": post_url(p.id),
        "body": p.body,
        "body_html": p.body_html,
        "timestamp": p.timestamp.to_rfc3339(),
        "author_url": user_url(p.author_id),
        "comments_url": format!("/api/v1/posts/{}/comments", p.id),
    })
}

fn comment_json(c: &Comment) -> Value {
    json!({
        "url": format!("/api/v1/comments/{}", c.id),
        "post_url": post_url(c.post_id),
        "body": c.body,
        "body_html": c.body_html,
        "timestamp": c.timestamp.to_rfc3339(),
        "author_url": user_url(c.author_id),
        "disabled": c.disabled,
    })
}

fn user_json(state: &AppState, user: &User) -> Value {
    json!({
        "url": user_url(user.id),
        "username": user.username,
        "name": user.name,
        "location": user.location,
        "about_me": user.about_me,
        "member_since": user.member_since.to_rfc3339(),
        "last_seen": user.last_seen.to_rfc3339(),
        "posts_url": format!("/api/v1/users/{}/posts", user.id),
        "timeline_url": format!("/api/v1/users/{}/timeline", user.id),
        "post_count": state.store.user_post_count(user.id),
    })
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<usize>,
}

/// Wrap one page of items with the pagination envelope: `prev_url` and
/// `next_url` are null off the ends, `count` is the unpaginated total.
fn page_envelope(
    key: &str,
    base: &str,
    items: Vec<Value>,
    page: usize,
    per_page: usize,
    total: usize,
) -> Value {
    // Page numbers come straight from the query string; saturate rather than
    // trust them to stay in range.
    let prev_url = (page > 1).then(|| format!("{base}?page={}", page - 1));
    let next_url = (page.saturating_mul(per_page) < total)
        .then(|| format!("{base}?page={}", page.saturating_add(1)));
    json!({
        key: items,
        "prev_url": prev_url,
        "next_url": next_url,
        "count": total,
    })
}

fn location_header(url: &str) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(url)
        .map_err(|e| AppError::internal("bad_location".to_string(), e.to_string()))?;
    headers.insert(header::LOCATION, value);
    Ok(headers)
}

// ---- posts ----

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    let page = params.page.unwrap_or(1).max(1);
    let per_page = state.config.posts_per_page;
    let (posts, total) = state.store.posts_page(page, per_page);
    let items = posts.iter().map(post_json).collect();
    let body = page_envelope("posts", "/api/v1/posts", items, page, per_page, total);
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn new_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<PostForm>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    form.validate()?;
    let created = state.store.create_post(principal.user_id, &form.body)?;
    let location = location_header(&post_url(created.id))?;
    Ok((StatusCode::CREATED, location, Json(post_json(&created))).into_response())
}

async fn get_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    let found = state
        .store
        .post(id)
        .ok_or_else(|| AppError::not_found("no_post", "post not found"))?;
    Ok((StatusCode::OK, Json(post_json(&found))).into_response())
}

async fn edit_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(form): Json<PostForm>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    let existing = state
        .store
        .post(id)
        .ok_or_else(|| AppError::not_found("no_post", "post not found"))?;
    if existing.author_id != principal.user_id && !principal.is_administrator() {
        return Err(AppError::forbidden("not_author", "insufficient permissions"));
    }
    form.validate()?;
    let updated = state.store.update_post(id, &form.body)?;
    Ok((StatusCode::OK, Json(post_json(&updated))).into_response())
}

// ---- comments ----

async fn post_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    if state.store.post(id).is_none() {
        return Err(AppError::not_found("no_post", "post not found"));
    }
    let page = params.page.unwrap_or(1).max(1);
    let per_page = state.config.comments_per_page;
    let (comments, total) = state.store.comments_for_post(id, page, per_page);
    let items = comments.iter().map(comment_json).collect();
    let base = format!("/api/v1/posts/{id}/comments");
    let body = page_envelope("comments", &base, items, page, per_page, total);
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn new_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(form): Json<CommentForm>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    form.validate()?;
    let created = state.store.add_comment(id, principal.user_id, &form.body)?;
    let location = location_header(&format!("/api/v1/comments/{}", created.id))?;
    Ok((StatusCode::CREATED, location, Json(comment_json(&created))).into_response())
}

async fn get_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    let found = state
        .store
        .comment(id)
        .ok_or_else(|| AppError::not_found("no_comment", "comment not found"))?;
    Ok((StatusCode::OK, Json(comment_json(&found))).into_response())
}

#[derive(Debug, Deserialize)]
struct ModerateForm {
    disabled: bool,
}

/// Flip a comment's moderation flag. Restricted to principals holding the
/// moderation capability.
async fn moderate_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(form): Json<ModerateForm>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    if !principal.can(Capability::Moderate) {
        return Err(AppError::forbidden("not_moderator", "insufficient permissions"));
    }
    let updated = state.store.set_comment_disabled(id, form.disabled)?;
    Ok((StatusCode::OK, Json(comment_json(&updated))).into_response())
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    let page = params.page.unwrap_or(1).max(1);
    let per_page = state.config.comments_per_page;
    let (comments, total) = state.store.comments_page(page, per_page);
    let items = comments.iter().map(comment_json).collect();
    let body = page_envelope("comments", "/api/v1/comments", items, page, per_page, total);
    Ok((StatusCode::OK, Json(body)).into_response())
}

// ---- accounts and profiles ----

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<RegisterForm>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    form.validate()?;
    let user = state.store.register(&form.email, &form.username, &form.password)?;
    let location = location_header(&user_url(user.id))?;
    Ok((StatusCode::CREATED, location, Json(user_json(&state, &user))).into_response())
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    let user = state
        .store
        .user(id)
        .ok_or_else(|| AppError::not_found("no_user", "user not found"))?;
    Ok((StatusCode::OK, Json(user_json(&state, &user))).into_response())
}

/// Profile edit. The administrator form covers identity fields (email,
/// username, confirmed, role) with duplicate checks; everyone else may edit
/// only their own descriptive fields.
async fn edit_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(payload): Json<Value>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    if state.store.user(id).is_none() {
        return Err(AppError::not_found("no_user", "user not found"));
    }
    let updated = if principal.is_administrator() {
        let form: EditProfileAdminForm = serde_json::from_value(payload)
            .map_err(|e| AppError::validation("bad_payload".to_string(), e.to_string()))?;
        form.validate(&state.store, id)?;
        state.store.admin_update(
            id,
            form.email,
            form.username,
            form.confirmed,
            form.role,
            form.name,
            form.location,
            form.about_me,
        )?
    } else if principal.user_id == id {
        let form: EditProfileForm = serde_json::from_value(payload)
            .map_err(|e| AppError::validation("bad_payload".to_string(), e.to_string()))?;
        form.validate()?;
        state.store.update_profile(id, form.name, form.location, form.about_me)?
    } else {
        return Err(AppError::forbidden("not_your_profile", "insufficient permissions"));
    };
    Ok((StatusCode::OK, Json(user_json(&state, &updated))).into_response())
}

async fn user_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    if state.store.user(id).is_none() {
        return Err(AppError::not_found("no_user", "user not found"));
    }
    let page = params.page.unwrap_or(1).max(1);
    let per_page = state.config.posts_per_page;
    let (posts, total) = state.store.posts_by_user(id, page, per_page);
    let items = posts.iter().map(post_json).collect();
    let base = format!("/api/v1/users/{id}/posts");
    let body = page_envelope("posts", &base, items, page, per_page, total);
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn user_timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    identify(&state, &headers)?;
    if state.store.user(id).is_none() {
        return Err(AppError::not_found("no_user", "user not found"));
    }
    let page = params.page.unwrap_or(1).max(1);
    let per_page = state.config.posts_per_page;
    let (posts, total) = state.store.followed_posts(id, page, per_page);
    let items = posts.iter().map(post_json).collect();
    let base = format!("/api/v1/users/{id}/timeline");
    let body = page_envelope("posts", &base, items, page, per_page, total);
    Ok((StatusCode::OK, Json(body)).into_response())
}

// ---- follows ----

fn follow_target(state: &AppState, principal: &Principal, id: u64) -> AppResult<()> {
    if state.store.user(id).is_none() {
        return Err(AppError::not_found("no_user", "user not found"));
    }
    if principal.user_id == id {
        return Err(AppError::validation("self_follow", "cannot follow yourself"));
    }
    Ok(())
}

async fn follow_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    follow_target(&state, principal, id)?;
    state.store.follow(principal.user_id, id)?;
    Ok((StatusCode::OK, Json(json!({"status": "ok"}))).into_response())
}

async fn unfollow_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let principal = confirmed_principal(&auth)?;
    follow_target(&state, principal, id)?;
    state.store.unfollow(principal.user_id, id)?;
    Ok((StatusCode::OK, Json(json!({"status": "ok"}))).into_response())
}

// ---- tokens ----

async fn issue_token(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let auth = identify(&state, &headers)?;
    let (token, expiration) = state.gate.issue_token(&auth)?;
    Ok((StatusCode::OK, Json(json!({"token": token, "expiration": expiration}))).into_response())
}

// ---- fallback ----

async fn not_found() -> AppError {
    AppError::not_found("no_route", "the requested resource does not exist")
}
