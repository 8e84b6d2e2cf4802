//! # bazaar_api
//!
//! HTTP API library for Bazaar.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use bazaar_core::auth::account::AccountService;
use bazaar_core::auth::external::ExternalAuthVerifier;
use bazaar_core::auth::jwt::JwtService;
use bazaar_core::auth::refresh_tokens::RefreshTokenService;
use bazaar_core::authz::permissions as perm;
use bazaar_core::authz::{AuthorizationDataProvider, StoreAuthorizationSource};
use bazaar_core::cache::DistributedCache;
use bazaar_core::events::EventDispatcher;
use bazaar_core::notifications::{EmailSender, NotificationService, SmsSender};
use bazaar_core::store::Database;
use bazaar_core::todos::{TodoItemService, TodoListService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, notifications, todo_items, todo_lists, users};
use crate::middleware::authorize::guarded;

/// Infrastructure the services are built on.
pub struct Backends {
    pub db: Arc<dyn Database>,
    pub cache: Arc<dyn DistributedCache>,
    pub email: Arc<dyn EmailSender>,
    pub sms: Arc<dyn SmsSender>,
    pub external: Arc<dyn ExternalAuthVerifier>,
    pub events: EventDispatcher,
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub db: Arc<dyn Database>,
    pub jwt: Arc<JwtService>,
    pub authz: Arc<AuthorizationDataProvider>,
    pub refresh_tokens: Arc<RefreshTokenService>,
    pub accounts: Arc<AccountService>,
    pub lists: Arc<TodoListService>,
    pub items: Arc<TodoItemService>,
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    /// Wire every service over `backends`.
    pub fn new(config: ApiConfig, backends: Backends) -> Self {
        let Backends {
            db,
            cache,
            email,
            sms,
            external,
            events,
        } = backends;

        let jwt = Arc::new(JwtService::new(config.jwt.clone()));
        let refresh_tokens = Arc::new(RefreshTokenService::new(
            db.clone(),
            chrono::Duration::days(config.refresh_token_ttl_days),
        ));
        let authz = Arc::new(AuthorizationDataProvider::new(
            Arc::new(StoreAuthorizationSource(db.clone())),
            cache,
            config.authz_cache,
        ));
        let accounts = Arc::new(AccountService::new(
            db.clone(),
            jwt.clone(),
            refresh_tokens.clone(),
            authz.clone(),
            external,
        ));

        Self {
            config: Arc::new(config),
            jwt,
            authz,
            refresh_tokens,
            accounts,
            lists: Arc::new(TodoListService::new(db.clone(), events.clone())),
            items: Arc::new(TodoItemService::new(db.clone(), events)),
            notifications: Arc::new(NotificationService::new(db.clone(), email, sms)),
            db,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let read_lists = format!("permission:{}", perm::TODO_LISTS_READ);
    let create_lists = format!("permission:{}", perm::TODO_LISTS_CREATE);
    let update_lists = format!("permission:{}", perm::TODO_LISTS_UPDATE);
    let delete_lists = format!("permission:{}", perm::TODO_LISTS_DELETE);
    let read_items = format!("permission:{}", perm::TODO_ITEMS_READ);
    let create_items = format!("permission:{}", perm::TODO_ITEMS_CREATE);
    let update_items = format!("permission:{}", perm::TODO_ITEMS_UPDATE);
    let delete_items = format!("permission:{}", perm::TODO_ITEMS_DELETE);
    let send_notifications = format!("permission:{}", perm::NOTIFICATIONS_SEND);
    let admin = format!("role:{}", perm::ROLE_ADMIN);
    let manage_users = format!("role:{};policy:{}", perm::ROLE_ADMIN, perm::POLICY_USER_MANAGEMENT);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login/password", post(auth::login_handler))
        .route("/auth/login/external", post(auth::external_login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (require a bearer access token, then the route's guard)
    let s = &state;
    let protected = Router::new()
        .route("/auth/logout/all", post(auth::logout_all_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/sessions", get(auth::sessions_handler))
        .route(
            "/api/todos/lists",
            guarded(get(todo_lists::query_lists), s, &read_lists)
                .merge(guarded(post(todo_lists::create_list), s, &create_lists)),
        )
        .route(
            "/api/todos/lists/{id}",
            guarded(get(todo_lists::get_list), s, &read_lists)
                .merge(guarded(put(todo_lists::update_list), s, &update_lists))
                .merge(guarded(axum::routing::delete(todo_lists::delete_list), s, &delete_lists)),
        )
        .route(
            "/api/todos/items",
            guarded(get(todo_items::query_items), s, &read_items)
                .merge(guarded(post(todo_items::create_item), s, &create_items)),
        )
        .route(
            "/api/todos/items/{id}",
            guarded(get(todo_items::get_item), s, &read_items)
                .merge(guarded(put(todo_items::update_item), s, &update_items))
                .merge(guarded(axum::routing::delete(todo_items::delete_item), s, &delete_items)),
        )
        .route(
            "/api/todos/items/{id}/done",
            guarded(post(todo_items::complete_item), s, &update_items),
        )
        .route(
            "/api/notifications",
            guarded(post(notifications::send_notification), s, &send_notifications),
        )
        .route("/api/admin/roles", guarded(get(users::list_roles), s, &admin))
        .route(
            "/api/admin/users/{id}/roles",
            guarded(put(users::set_user_roles), s, &manage_users),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
