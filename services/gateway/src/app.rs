//! Gateway 应用装配：路由、CORS、后台清理与监听。

use std::sync::Arc;

use ag_shared_protocol::API_KEY_HEADER;
use anyhow::Context;
use axum::{
    Router, middleware,
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::{
    auth::{
        handlers::{login_handler, profile_handler, refresh_handler, register_handler},
        middleware::require_auth,
        refresh::spawn_refresh_sweeper,
        store::FileCredentialStore,
    },
    config::Config,
    state::AppState,
};

/// Gateway 入口：打开凭证存储、启动清理任务并监听 HTTP。
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    let store = FileCredentialStore::open(config.store_path.clone()).with_context(|| {
        format!("open credential store: {}", config.store_path.display())
    })?;
    let state = AppState::new(config.secret.clone(), Arc::new(store));
    let _sweeper = spawn_refresh_sweeper(state.refresh.clone(), config.sweep_interval);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    info!(
        "auth gateway listening on {} (store: {})",
        config.addr,
        config.store_path.display()
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/// 装配路由；受保护路由挂鉴权中间件。
pub(crate) fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    let protected = Router::new()
        .route("/api/user/profile", get(profile_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/user/register", post(register_handler))
        .merge(protected)
        .layer(cors)
        .with_state(state)
}

/// 健康检查接口。
async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::build_router;
    use crate::{
        api::types::NewUser,
        auth::{
            api_key::ApiKeyValidator,
            password::hash_password_with_cost,
            store::{CredentialStore, FileCredentialStore},
            token::SigningSecret,
        },
        state::AppState,
    };

    async fn app_with_user() -> (Router, Arc<FileCredentialStore>, u64) {
        let store = Arc::new(FileCredentialStore::in_memory());
        let password_hash = hash_password_with_cost("s3cret".to_string(), 4)
            .await
            .expect("hash");
        let user = store
            .insert_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash,
                role: "admin".to_string(),
            })
            .await
            .expect("user");
        let secret = SigningSecret::new("router-test-secret").expect("secret");
        let app = build_router(AppState::new(secret, store.clone()));
        (app, store, user.user_id)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn login(app: &Router) -> Value {
        let (status, body) = send(
            app,
            post_json("/api/auth/login", json!({"username": "alice", "password": "s3cret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn login_refresh_and_replay_over_http() {
        let (app, _, _) = app_with_user().await;
        let first = login(&app).await;
        assert_eq!(first["token_type"], "Bearer");
        assert_eq!(first["expires_in"], 900);

        let refresh = json!({"refresh_token": first["refresh_token"]});
        let (status, second) = send(&app, post_json("/api/auth/refresh", refresh.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(second["refresh_token"], first["refresh_token"]);

        let (status, body) = send(&app, post_json("/api/auth/refresh", refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, post_json("/api/auth/refresh", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_accepts_a_form_encoded_body() {
        let (app, _, _) = app_with_user().await;
        let first = login(&app).await;
        let refresh_token = first["refresh_token"].as_str().expect("refresh");

        let req = Request::post("/api/auth/refresh")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("refresh_token={refresh_token}")))
            .expect("request");
        let (status, second) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["token_type"], "Bearer");
        assert_ne!(second["refresh_token"], first["refresh_token"]);

        let req = Request::post("/api/auth/refresh")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("refresh_token="))
            .expect("request");
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn unparseable_bodies_get_the_error_envelope() {
        let (app, _, _) = app_with_user().await;
        let requests = [
            Request::post("/api/auth/login")
                .header("content-type", "application/json")
                .body(Body::from("{not json")),
            Request::post("/api/auth/refresh")
                .header("content-type", "text/plain")
                .body(Body::from("refresh_token=x")),
            Request::post("/api/user/register").body(Body::from("{}")),
            Request::post("/api/user/register")
                .header("content-type", "application/json")
                .body(Body::from("[1, 2]")),
        ];
        for req in requests {
            let (status, body) = send(&app, req.expect("request")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["ok"], false);
            assert_eq!(body["code"], "INVALID_REQUEST");
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let (app, _, _) = app_with_user().await;
        let (wrong_status, wrong) = send(
            &app,
            post_json("/api/auth/login", json!({"username": "alice", "password": "nope"})),
        )
        .await;
        let (unknown_status, unknown) = send(
            &app,
            post_json("/api/auth/login", json!({"username": "mallory", "password": "s3cret"})),
        )
        .await;
        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_status, unknown_status);
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn profile_prefers_bearer_over_api_key() {
        let (app, store, user_id) = app_with_user().await;
        let key = ApiKeyValidator::new(store.clone())
            .create(99, "ci-bot", "read")
            .await
            .expect("key")
            .key;
        let tokens = login(&app).await;
        let access = tokens["access_token"].as_str().expect("access");

        let req = Request::get("/api/user/profile")
            .header("authorization", format!("Bearer {access}"))
            .header("api-key", &key)
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["access_by"], "JWT");
        assert_eq!(body["data"]["user_id"], user_id);
        assert_eq!(body["data"]["role"], "admin");

        let req = Request::get("/api/user/profile")
            .header("api-key", &key)
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["access_by"], "APIKey");
        assert_eq!(body["data"]["client_id"], "ci-bot");
        assert_eq!(body["data"]["role"], "read");
    }

    #[tokio::test]
    async fn profile_rejections_share_one_body() {
        let (app, store, _) = app_with_user().await;
        let key = ApiKeyValidator::new(store.clone())
            .create(1, "ci-bot", "read")
            .await
            .expect("key")
            .key;

        let requests = [
            Request::get("/api/user/profile").body(Body::empty()),
            Request::get("/api/user/profile")
                .header("authorization", "Bearer not.a.jwt")
                .header("api-key", &key)
                .body(Body::empty()),
            Request::get("/api/user/profile")
                .header("authorization", "Basic abc")
                .body(Body::empty()),
            Request::get("/api/user/profile")
                .header("api-key", "agk_unknown")
                .body(Body::empty()),
        ];
        let mut bodies = Vec::new();
        for req in requests {
            let (status, body) = send(&app, req.expect("request")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            bodies.push(body);
        }
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn register_then_login_and_duplicate_conflict() {
        let (app, _, _) = app_with_user().await;
        let body = json!({
            "username": "bob",
            "password": "pw-bob",
            "email": "bob@example.com",
            "role": "user",
        });
        let (status, created) = send(&app, post_json("/api/user/register", body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["username"], "bob");
        assert!(created["data"].get("password_hash").is_none());

        let (status, _) = send(&app, post_json("/api/user/register", body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            post_json("/api/auth/login", json!({"username": "bob", "password": "pw-bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let (app, _, _) = app_with_user().await;
        let resp = app
            .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
