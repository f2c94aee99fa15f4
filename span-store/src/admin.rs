use crate::database;
use crate::metrics::Metrics;
use crate::store::{SpanReader, StoreError};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backtraced_error::error_chain_to_pretty_formatted;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use span_model::{Operation, ServiceName, Trace, TraceId, TraceQueryParameters};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AdminState {
    pub con: PgPool,
    pub metrics: Arc<Metrics>,
    pub reader: Arc<dyn SpanReader>,
}

#[derive(Debug)]
pub struct ApiError {
    pub code: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code, self.message).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        if value.is_not_found() {
            return ApiError {
                code: StatusCode::NOT_FOUND,
                message: value.to_string(),
            };
        }
        error!(
            "Error during api request: {}",
            error_chain_to_pretty_formatted(&value)
        );
        ApiError {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "DB error when handling the request".to_string(),
        }
    }
}

pub fn router(state: AdminState) -> axum::Router {
    axum::Router::new()
        .route("/", axum::routing::get(ready))
        .route("/metrics", axum::routing::get(metrics_get))
        .route("/api/services", axum::routing::get(services_get))
        .route(
            "/api/services/:service/operations",
            axum::routing::get(operations_get),
        )
        .route("/api/traces", axum::routing::get(traces_get))
        .route("/api/traces/:trace_id", axum::routing::get(trace_get))
        .with_state(state)
}

/// Serves `router` until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    router: axum::Router,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = axum::Server::try_bind(&addr)?;
    info!(address = %addr, "Admin server listening");
    server
        .serve(router.into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

#[instrument(skip_all)]
async fn ready(State(state): State<AdminState>) -> impl IntoResponse {
    match tokio::time::timeout(PING_TIMEOUT, database::ping(&state.con)).await {
        Ok(Ok(())) => (StatusCode::OK, "ok".to_string()),
        Ok(Err(e)) => {
            error!("{}", error_chain_to_pretty_formatted(&e));
            (StatusCode::INTERNAL_SERVER_ERROR, e.context)
        }
        Err(_) => {
            error!("database ping timed out after {PING_TIMEOUT:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database ping timed out".to_string(),
            )
        }
    }
}

async fn metrics_get(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render().map_err(|e| ApiError {
        code: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })?;
    Ok((
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            prometheus::TEXT_FORMAT,
        )],
        body,
    ))
}

async fn services_get(
    State(state): State<AdminState>,
) -> Result<Json<Vec<ServiceName>>, ApiError> {
    Ok(Json(state.reader.get_services().await?))
}

async fn operations_get(
    Path(service): Path<String>,
    State(state): State<AdminState>,
) -> Result<Json<Vec<Operation>>, ApiError> {
    Ok(Json(state.reader.get_operations(&service).await?))
}

async fn trace_get(
    Path(trace_id): Path<String>,
    State(state): State<AdminState>,
) -> Result<Json<Trace>, ApiError> {
    let trace_id: TraceId = trace_id.parse().map_err(|e: span_model::ParseIdError| ApiError {
        code: StatusCode::BAD_REQUEST,
        message: e.to_string(),
    })?;
    Ok(Json(state.reader.get_trace(trace_id).await?))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TraceSearch {
    pub service: Option<String>,
    pub operation: Option<String>,
    pub start_time_min: Option<DateTime<Utc>>,
    pub start_time_max: Option<DateTime<Utc>>,
    pub duration_min_micros: Option<u64>,
    pub duration_max_micros: Option<u64>,
    pub limit: Option<usize>,
}

impl From<TraceSearch> for TraceQueryParameters {
    fn from(search: TraceSearch) -> Self {
        TraceQueryParameters {
            service_name: search.service,
            operation_name: search.operation,
            start_time_min: search.start_time_min,
            start_time_max: search.start_time_max,
            duration_min: search.duration_min_micros.map(Duration::from_micros),
            duration_max: search.duration_max_micros.map(Duration::from_micros),
            num_traces: search.limit.unwrap_or_default(),
        }
    }
}

async fn traces_get(
    Query(search): Query<TraceSearch>,
    State(state): State<AdminState>,
) -> Result<Json<Vec<Trace>>, ApiError> {
    let query = TraceQueryParameters::from(search);
    Ok(Json(state.reader.find_traces(&query).await?))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn search_maps_to_query_parameters() {
        let search = TraceSearch {
            service: Some("svc-1".to_string()),
            start_time_min: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            duration_min_micros: Some(1_500),
            ..Default::default()
        };
        let query = TraceQueryParameters::from(search);
        assert_eq!(query.service_name.as_deref(), Some("svc-1"));
        assert_eq!(query.operation_name, None);
        assert_eq!(query.duration_min, Some(Duration::from_micros(1_500)));
        assert_eq!(query.duration_max, None);
        assert_eq!(query.effective_num_traces(), span_model::DEFAULT_NUM_TRACES);
    }

    #[test]
    fn search_parses_rfc3339_times_from_json() {
        let search: TraceSearch = serde_json::from_value(serde_json::json!({
            "start_time_min": "2023-11-14T22:13:20Z",
            "limit": 5
        }))
        .unwrap();
        assert_eq!(
            search.start_time_min,
            Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        );
        assert_eq!(search.limit, Some(5));
    }

    #[test]
    fn missing_traces_are_not_found() {
        let err = ApiError::from(StoreError::TraceNotFound {
            trace_id: TraceId::new(0, 1),
        });
        assert_eq!(err.code, StatusCode::NOT_FOUND);
    }
}
