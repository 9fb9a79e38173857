//! Diagnosis endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crop_diagnosis::utils::error::DIAGNOSIS_ERROR_LABEL;
use crop_diagnosis::{DiagnoseRequest, DiagnoseResponse, DiagnosisError};

use crate::state::SharedState;

/// Error body; `disease` is only present on internal failures
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
}

fn error_response(err: &DiagnosisError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse {
        error: err.to_string(),
        disease: err.disease_label().map(String::from),
    };
    (status, Json(body)).into_response()
}

/// POST /diagnose - Diagnose a base64 leaf image for a crop
pub async fn diagnose(
    State(state): State<SharedState>,
    payload: Result<Json<DiagnoseRequest>, JsonRejection>,
) -> Response {
    if !state.service.is_available() {
        return error_response(&DiagnosisError::ServiceUnavailable);
    }

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(&DiagnosisError::BadRequest(rejection.body_text()));
        }
    };

    let worker = state.clone();
    let outcome =
        tokio::task::spawn_blocking(move || worker.service.diagnose_request(&request)).await;

    match outcome {
        Ok(Ok(result)) => {
            info!(
                "{} -> {} ({:.1}%)",
                result.crop_key,
                result.disease_label,
                result.confidence * 100.0
            );
            (StatusCode::OK, Json(DiagnoseResponse::from(result))).into_response()
        }
        Ok(Err(err)) => error_response(&err),
        Err(join_error) => {
            error!("Diagnosis task failed: {}", join_error);
            error_response(&DiagnosisError::Internal {
                message: join_error.to_string(),
                disease_label: DIAGNOSIS_ERROR_LABEL.to_string(),
            })
        }
    }
}
