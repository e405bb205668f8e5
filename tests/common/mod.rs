use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use hydrotrack::auth::SecretHasher;
use hydrotrack::config::ServerConfig;
use hydrotrack::server::{AppState, create_router};
use hydrotrack::store::{MemoryStore, Store};
use hydrotrack::types::Owner;

pub const GREENHOUSE_PASSWORD: &str = "greenhouse";
pub const NURSERY_PASSWORD: &str = "nursery";

/// An in-process server backed by a memory store with two owners.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let hasher = SecretHasher::new();
        for (name, password) in [("greenhouse", GREENHOUSE_PASSWORD), ("nursery", NURSERY_PASSWORD)] {
            store
                .create_owner(&Owner {
                    id: format!("{name}-id"),
                    name: name.to_string(),
                    password_hash: hasher.hash(password).expect("hash password"),
                    created_at: Utc::now(),
                })
                .expect("create owner");
        }

        let state = Arc::new(AppState::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(mockable::DefaultClock),
            &ServerConfig::default(),
        ));

        Self {
            store,
            router: create_router(state),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Option<Value>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).expect("response is JSON"))
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<Value>) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        self.send(request).await
    }

    pub async fn login(&self, password: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/login",
                None,
                Some(serde_json::json!({ "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body.expect("login body")["data"]["token"]
            .as_str()
            .expect("token is a string")
            .to_string()
    }

    pub async fn create_table(&self, token: &str, body: Value) -> Value {
        let (status, body) = self
            .call(Method::POST, "/api/v1/tables", Some(token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body.expect("create body")["data"].clone()
    }
}
