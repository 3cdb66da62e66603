use crate::gatherers::GathererRegistry;
use crate::status::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{debug, error};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    gatherers: usize,
    scheduled: usize,
    failing: usize,
}

// The sink is both the hosts registry and the write target; without it
// nothing can be gathered.
async fn check_database_health(pool: &PgPool) -> Result<(), StatusCode> {
    match pool.acquire().await {
        Ok(mut conn) => match conn.ping().await {
            Ok(()) => Ok(()),
            Err(error) => {
                error!("Failed to ping monitoring database: {}", error);
                Err(StatusCode::SERVICE_UNAVAILABLE)
            }
        },
        Err(error) => {
            error!("Failed to acquire monitoring database connection: {}", error);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

fn create_health_response(db_result: &Result<(), StatusCode>, registry: &GathererRegistry) -> Health {
    let statuses = registry.snapshot();

    Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if db_result.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
        gatherers: statuses.len(),
        scheduled: statuses.iter().filter(|s| s.scheduled).count(),
        failing: statuses
            .iter()
            .filter(|s| s.scheduled && s.last_success == Some(false))
            .count(),
    }
}

fn create_response_body(method: &Method, health: &Health) -> Body {
    if *method == Method::GET {
        Json(health).into_response().into_body()
    } else {
        Body::empty()
    }
}

// X-App: name:version:short-commit
fn create_app_headers(health: &Health) -> HeaderMap {
    let short_hash = health.commit.get(0..7).unwrap_or("");

    let header_value = format!("{}:{}:{}", health.name, health.version, short_hash);

    match header_value.parse::<HeaderValue>() {
        Ok(x_app_header_value) => {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        }
        Err(err) => {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        }
    }
}

pub async fn health(
    method: Method,
    Extension(pool): Extension<PgPool>,
    Extension(registry): Extension<GathererRegistry>,
) -> impl IntoResponse {
    let db_result = check_database_health(&pool).await;
    let health = create_health_response(&db_result, &registry);
    let body = create_response_body(&method, &health);
    let headers = create_app_headers(&health);

    match db_result {
        Ok(()) => (StatusCode::OK, headers, body),
        Err(status_code) => {
            debug!("Monitoring database is unhealthy");
            (status_code, headers, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatherers::{GathererKey, TickReport};
    use crate::hosts::MetricKind;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_health_counts_failing_scheduled_gatherers() {
        let registry = GathererRegistry::new();
        let failing = GathererKey::new(1, MetricKind::Sproc);
        let paused = GathererKey::new(1, MetricKind::Load);

        registry.register(failing, "db1[shop]", Duration::from_secs(60), true);
        registry.register(paused, "db1[shop]", Duration::from_secs(60), false);
        for key in [failing, paused] {
            registry.record(
                key,
                "db1[shop]",
                &TickReport {
                    started_at: Utc::now(),
                    elapsed: Duration::from_millis(1),
                    result: Err("timeout".to_string()),
                },
            );
        }

        let health = create_health_response(&Ok(()), &registry);

        assert_eq!(health.database, "ok");
        assert_eq!(health.gatherers, 2);
        assert_eq!(health.scheduled, 1);
        assert_eq!(health.failing, 1, "paused gatherers do not count as failing");
    }

    #[test]
    fn test_app_header() {
        let health = create_health_response(&Err(StatusCode::SERVICE_UNAVAILABLE), &GathererRegistry::new());
        let headers = create_app_headers(&health);

        let value = headers.get("X-App").unwrap().to_str().unwrap();
        assert!(value.starts_with(&format!("{}:{}:", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))));
        assert_eq!(health.database, "error");
    }

    #[test]
    fn test_options_has_no_body() {
        let health = create_health_response(&Ok(()), &GathererRegistry::new());
        let body = create_response_body(&Method::OPTIONS, &health);

        assert_eq!(
            http_body_size(&body),
            Some(0)
        );
    }

    fn http_body_size(body: &Body) -> Option<u64> {
        use axum::body::HttpBody as _;
        body.size_hint().exact()
    }
}
