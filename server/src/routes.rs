use crate::app::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use patscope_scanner::{ErrorReport, ScanError};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness probe
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
pub struct PatentsParams {
    medicine: Option<String>,
}

/// Search patents for a medicine name.
///
/// The pipeline runs in its own task: if the client disconnects, the handler
/// future is dropped but the run finishes and releases its browsers normally.
pub async fn patents_handler(
    State(state): State<AppState>,
    Query(params): Query<PatentsParams>,
) -> Response {
    let Some(medicine) = params.medicine.filter(|m| !m.trim().is_empty()) else {
        let err = ScanError::InvalidQuery("missing medicine parameter".to_string());
        return (StatusCode::BAD_REQUEST, Json(err.report())).into_response();
    };

    tracing::info!(%medicine, "Patent search requested");
    let pipeline = state.pipeline.clone();
    let task = tokio::spawn(async move { pipeline.extract(&medicine).await });

    match task.await {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(e)) => (status_for(&e), Json(e.report())).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Extraction task failed");
            let report = ErrorReport {
                error_kind: "internal",
                message: "extraction task failed".to_string(),
                per_engine_failures: Vec::new(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(report)).into_response()
        }
    }
}

fn status_for(err: &ScanError) -> StatusCode {
    match err {
        ScanError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        ScanError::Exhausted { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
