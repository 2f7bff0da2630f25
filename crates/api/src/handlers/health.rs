//! Health check endpoint for load balancers and monitoring.
//!
//! Returns 200 OK if the store answers PING, 503 Service Unavailable otherwise.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: bool,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = match state.stores.connection.ping().await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!("store health check failed: {:?}", e);
            false
        }
    };

    let response = HealthResponse {
        status: if store_ok { "ok" } else { "unhealthy" },
        store: store_ok,
    };

    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::stores::{MemoryStore, RedisConnection, StoreConnection};
    use crate::test_utils::TestStateBuilder;

    #[tokio::test]
    async fn healthy_store_returns_ok() {
        let state = TestStateBuilder::new()
            .with_memory_store(Arc::new(MemoryStore::new()))
            .build();

        let response = health_check(State(state)).await.into_response();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unreachable_store_returns_503() {
        let conn = Arc::new(
            RedisConnection::open("redis://127.0.0.1:6379", Duration::from_secs(1)).unwrap(),
        );
        conn.close().await;
        let state = TestStateBuilder::new().with_connection(conn).build();

        let response = health_check(State(state)).await.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
