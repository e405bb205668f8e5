use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};
use tracing::error;

use super::session::session_router;
use super::tables::tables_router;
use crate::auth::SecretHasher;
use crate::config::ServerConfig;
use crate::store::Store;
use crate::tracker::{SharedClock, TableService, TrackerError};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tables: TableService,
    pub hasher: SecretHasher,
    pub clock: SharedClock,
    pub session_ttl: chrono::Duration,
    pub storage_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: SharedClock, config: &ServerConfig) -> Self {
        let tables = TableService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.storage_timeout(),
        );

        Self {
            store,
            tables,
            hasher: SecretHasher::new(),
            clock,
            session_ttl: config.session_ttl(),
            storage_timeout: config.storage_timeout(),
        }
    }

    /// Runs session work (store lookups and password hashing) on the blocking
    /// pool, bounded by the storage timeout.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, TrackerError>
    where
        T: Send + 'static,
        F: FnOnce(&AppState) -> T + Send + 'static,
    {
        let state = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || f(&state));

        match tokio::time::timeout(self.storage_timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Session task failed: {e}");
                Err(TrackerError::StorageUnavailable(format!(
                    "session task failed: {e}"
                )))
            }
            Err(_) => {
                error!(
                    "Session task timed out after {}ms",
                    self.storage_timeout.as_millis()
                );
                Err(TrackerError::StorageUnavailable(format!(
                    "timed out after {}ms",
                    self.storage_timeout.as_millis()
                )))
            }
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", session_router())
        .nest("/api/v1", tables_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;
    use crate::auth;
    use crate::store::SqliteStore;
    use crate::types::Owner;

    const PASSWORD: &str = "greenhouse";

    fn request(method: Method, uri: &str, token: &str, body: &'static str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_calls_are_bounded_by_storage_timeout() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("hydrotrack.db")).unwrap());
        store.initialize().unwrap();
        let hasher = SecretHasher::new();
        store
            .create_owner(&Owner {
                id: "owner-1".to_string(),
                name: "owner".to_string(),
                password_hash: hasher.hash(PASSWORD).unwrap(),
                created_at: Utc::now(),
            })
            .unwrap();
        let issued = auth::login(
            store.as_ref(),
            &hasher,
            PASSWORD,
            chrono::Duration::hours(1),
            Utc::now(),
        )
        .unwrap()
        .unwrap();

        let config = ServerConfig {
            storage_timeout_ms: 50,
            ..ServerConfig::default()
        };
        let state = Arc::new(AppState::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(mockable::DefaultClock),
            &config,
        ));
        let router = create_router(state);

        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let _conn = store.connection();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(1000));
            })
        };
        locked_rx.recv().unwrap();

        let requests = [
            request(Method::GET, "/api/v1/tables", &issued.token, ""),
            request(Method::POST, "/api/v1/logout", &issued.token, ""),
            request(
                Method::POST,
                "/api/v1/login",
                &issued.token,
                r#"{"password":"greenhouse"}"#,
            ),
        ];
        for request in requests {
            let response = router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }

        holder.join().unwrap();
    }
}
