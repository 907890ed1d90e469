//! `/shard` route and its error mapping.
//!
//! The handler validates the seed, then hands the allocation to a blocking
//! thread since the store performs synchronous file I/O. All failures are
//! mapped to a status code in [`ApiError`]'s [`IntoResponse`] impl; response
//! bodies for errors are empty.

use crate::server::telemetry::{RequestOutcome, record_request};
use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use shardalloc::{AllocationService, Assignment, Error};
use std::time::Instant;
use tokio::task::JoinError;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Builds the application router around a shared [`AllocationService`].
pub fn router(service: AllocationService) -> Router {
    Router::new()
        .route("/shard", get(shard))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct ShardQuery {
    seed: Option<String>,
}

/// Failure of a `/shard` request.
#[derive(Debug)]
pub enum ApiError {
    /// The allocator refused or failed the request.
    Allocation(Error),
    /// The blocking allocation task panicked or was cancelled.
    Task(JoinError),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Allocation(err)
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self::Task(err)
    }
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Allocation(Error::EmptySeed) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Allocation(Error::CorruptStore { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Allocation(Error::Config(_) | Error::Io { .. } | Error::Encode(_))
            | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        #[cfg(feature = "tracing")]
        {
            match &self {
                Self::Allocation(err) if status.is_server_error() => {
                    tracing::error!(error = %err, "allocation failed");
                }
                Self::Task(err) => tracing::error!(error = %err, "allocation task failed"),
                Self::Allocation(_) => {}
            }
        }
        status.into_response()
    }
}

async fn shard(
    State(service): State<AllocationService>,
    query: Result<Query<ShardQuery>, QueryRejection>,
) -> Result<String, ApiError> {
    let start = Instant::now();
    let result = allocate(service, query).await;

    let outcome = match &result {
        Ok(_) => RequestOutcome::Allocated,
        Err(err) => RequestOutcome::from_status(err.status()),
    };
    record_request(outcome, start.elapsed().as_secs_f64() * 1000.0);

    result.map(|assignment| format!("{assignment}\n"))
}

async fn allocate(
    service: AllocationService,
    query: Result<Query<ShardQuery>, QueryRejection>,
) -> Result<Assignment, ApiError> {
    // A malformed or repeated `seed` parameter carries no usable seed either.
    let seed = query
        .ok()
        .and_then(|Query(query)| query.seed)
        .filter(|seed| !seed.is_empty())
        .ok_or(Error::EmptySeed)?;

    let assignment = tokio::task::spawn_blocking(move || service.allocate(&seed)).await??;
    Ok(assignment)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
