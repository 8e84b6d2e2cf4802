//! Integration tests: build the router over the in-memory backends and drive
//! it with `oneshot`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use bazaar_api::config::ApiConfig;
use bazaar_api::{AppState, Backends};
use bazaar_core::auth::external::{ExternalAuthConfig, HttpExternalAuth};
use bazaar_core::auth::jwt::{TokenKind, TokenSubject};
use bazaar_core::cache::memory::MemoryCache;
use bazaar_core::events::EventDispatcher;
use bazaar_core::notifications::{LogEmailSender, LogSmsSender};
use bazaar_core::seed::seed_defaults;
use bazaar_core::store::memory::MemoryDatabase;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    state: AppState,
}

async fn test_app() -> TestApp {
    let db = MemoryDatabase::new();
    seed_defaults(&db).await.expect("seed roles");
    let state = AppState::new(
        ApiConfig::with_secret("integration-test-secret"),
        Backends {
            db: Arc::new(db),
            cache: Arc::new(MemoryCache::new()),
            email: Arc::new(LogEmailSender),
            sms: Arc::new(LogSmsSender),
            external: Arc::new(HttpExternalAuth::new(
                reqwest::Client::new(),
                ExternalAuthConfig::default(),
            )),
            events: EventDispatcher::new(),
        },
    );
    TestApp {
        app: bazaar_api::router(state.clone()),
        state,
    }
}

struct Reply {
    status: StatusCode,
    set_cookie: Option<String>,
    body: Value,
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .expect("request");

        let resp = self.app.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply {
            status,
            set_cookie,
            body,
        }
    }

    /// Register and return `(access_token, refresh_token)`.
    async fn register(&self, name: &str) -> (String, String) {
        let reply = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": format!("{name}@example.com"),
                    "userName": name,
                    "password": "correct horse",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        let data = &reply.body["data"];
        (
            data["accessToken"].as_str().expect("access token").to_string(),
            data["refreshToken"].as_str().expect("refresh token").to_string(),
        )
    }
}

fn codes(body: &Value) -> Vec<String> {
    body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e["code"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn health_reports_memory_backend() {
    let app = test_app().await;
    let reply = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["database"], true);
    assert_eq!(reply.body["backend"], "memory");
}

#[tokio::test]
async fn first_user_is_admin_and_can_manage_todos() {
    let app = test_app().await;
    let (token, _) = app.register("ada").await;

    let me = app.call(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["roles"], json!(["Admin"]));
    assert_eq!(me.body["data"]["isSystem"], true);

    let list = app
        .call(
            Method::POST,
            "/api/todos/lists",
            Some(&token),
            Some(json!({ "title": "Groceries", "colour": "#FF5733" })),
        )
        .await;
    assert_eq!(list.status, StatusCode::CREATED);
    let list_id = list.body["data"]["id"].as_str().unwrap().to_string();

    let item = app
        .call(
            Method::POST,
            "/api/todos/items",
            Some(&token),
            Some(json!({ "listId": list_id, "title": "Milk", "priority": "high" })),
        )
        .await;
    assert_eq!(item.status, StatusCode::CREATED);
    let item_id = item.body["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/todos/items/{item_id}/done");
    let done = app.call(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(done.status, StatusCode::OK);
    let done_at = done.body["data"]["doneAt"].clone();

    let again = app.call(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(codes(&again.body), vec!["todo_item.already_done"]);

    let fetched = app
        .call(Method::GET, &format!("/api/todos/items/{item_id}"), Some(&token), None)
        .await;
    assert_eq!(fetched.body["data"]["doneAt"], done_at);

    let page = app
        .call(Method::GET, "/api/todos/lists?search=groc&pageSize=5", Some(&token), None)
        .await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["pagination"]["totalCount"], 1);
    assert_eq!(page.body["pagination"]["pageSize"], 5);

    let deleted = app
        .call(Method::DELETE, &format!("/api/todos/lists/{list_id}"), Some(&token), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    let gone = app
        .call(Method::GET, &format!("/api/todos/items/{item_id}"), Some(&token), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guards_reject_missing_grants() {
    let app = test_app().await;
    let (admin, _) = app.register("ada").await;
    let (user, _) = app.register("bob").await;

    let anonymous = app.call(Method::GET, "/api/todos/lists", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let lists = app.call(Method::GET, "/api/todos/lists", Some(&user), None).await;
    assert_eq!(lists.status, StatusCode::OK);

    let notify = json!({
        "useCase": "reminder",
        "sendMethod": "email",
        "receivers": ["ada@example.com"],
        "message": "hi",
    });
    let denied = app
        .call(Method::POST, "/api/notifications", Some(&user), Some(notify.clone()))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let sent = app
        .call(Method::POST, "/api/notifications", Some(&admin), Some(notify))
        .await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(sent.body["data"]["delivered"], json!(["ada@example.com"]));

    let roles = app.call(Method::GET, "/api/admin/roles", Some(&user), None).await;
    assert_eq!(roles.status, StatusCode::FORBIDDEN);
    let roles = app.call(Method::GET, "/api/admin/roles", Some(&admin), None).await;
    assert_eq!(roles.status, StatusCode::OK);
}

#[tokio::test]
async fn role_change_takes_effect_immediately() {
    let app = test_app().await;
    let (admin, _) = app.register("ada").await;
    let (user, _) = app.register("bob").await;

    let me = app.call(Method::GET, "/auth/me", Some(&user), None).await;
    let bob_id = me.body["data"]["userId"].as_str().unwrap().to_string();
    let denied = app.call(Method::GET, "/api/admin/roles", Some(&user), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let set = app
        .call(
            Method::PUT,
            &format!("/api/admin/users/{bob_id}/roles"),
            Some(&admin),
            Some(json!({ "roles": ["Admin", "User"] })),
        )
        .await;
    assert_eq!(set.status, StatusCode::OK);

    let allowed = app.call(Method::GET, "/api/admin/roles", Some(&user), None).await;
    assert_eq!(allowed.status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_and_detects_reuse() {
    let app = test_app().await;
    let (_, first) = app.register("ada").await;

    let rotated = app
        .call(Method::POST, "/auth/refresh", None, Some(json!({ "refreshToken": first })))
        .await;
    assert_eq!(rotated.status, StatusCode::OK);
    let cookie = rotated.set_cookie.expect("refresh cookie");
    assert!(cookie.starts_with("bazaar_refresh="));
    assert!(cookie.contains("HttpOnly"));
    let second = rotated.body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(second, first);

    let reused = app
        .call(Method::POST, "/auth/refresh", None, Some(json!({ "refreshToken": first })))
        .await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(codes(&reused.body), vec!["auth.refresh_token_reused"]);

    let revoked_successor = app
        .call(Method::POST, "/auth/refresh", None, Some(json!({ "refreshToken": second })))
        .await;
    assert_eq!(revoked_successor.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_reads_the_cookie() {
    let app = test_app().await;
    let (_, refresh) = app.register("ada").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .header(header::COOKIE, format!("bazaar_refresh={refresh}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let missing = app.call(Method::POST, "/auth/refresh", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(codes(&missing.body), vec!["auth.refresh_token_missing"]);
}

#[tokio::test]
async fn refresh_kind_jwt_is_not_a_bearer_token() {
    let app = test_app().await;
    app.register("ada").await;
    let refresh_jwt = app
        .state
        .jwt
        .issue(
            &TokenSubject {
                user_id: Uuid::new_v4(),
                email: "ada@example.com".into(),
                user_name: "ada".into(),
                roles: vec!["Admin".into()],
                permissions: vec![],
                is_system: true,
            },
            TokenKind::Refresh,
        )
        .unwrap();
    let reply = app
        .call(Method::GET, "/auth/me", Some(&refresh_jwt.token), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_errors_list_every_code() {
    let app = test_app().await;
    let reply = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "nope", "userName": " ", "password": "short" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    assert_eq!(
        codes(&reply.body),
        vec!["auth.email_invalid", "auth.user_name_required", "auth.password_too_short"]
    );
}

#[tokio::test]
async fn logout_revokes_and_clears_cookie() {
    let app = test_app().await;
    let (access, refresh) = app.register("ada").await;

    let out = app
        .call(Method::POST, "/auth/logout", None, Some(json!({ "refreshToken": refresh })))
        .await;
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(out.body["data"]["revoked"], true);
    assert!(out.set_cookie.unwrap().contains("Max-Age=0"));

    let sessions = app.call(Method::GET, "/auth/sessions", Some(&access), None).await;
    assert_eq!(sessions.body["data"][0]["state"], "revoked");
}
