//! Route handlers

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use chatsales_core::{PipelineOutput, SaleRecord};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::export::{write_csv, EXPORT_FILENAME};

const UPLOAD_FIELD: &str = "file";

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /upload`: run the pipeline over one uploaded `.txt` chat export.
pub async fn upload_chat(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<PipelineOutput>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string).unwrap_or_default();
        if !filename.to_ascii_lowercase().ends_with(".txt") {
            return Err(ApiError::bad_request(
                "Only .txt chat export files are accepted.",
            ));
        }

        let bytes = field.bytes().await?;
        let text = String::from_utf8_lossy(&bytes);
        info!(filename = %filename, bytes = bytes.len(), "Chat export received");

        let output = state.pipeline.run(&text, &filename).await;
        return Ok(Json(output));
    }

    Err(ApiError::bad_request("No file uploaded."))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub sales: Vec<SaleRecord>,
}

/// `POST /export`: render the given sales as a CSV attachment.
pub async fn export_sales(Json(request): Json<ExportRequest>) -> ApiResult<impl IntoResponse> {
    if request.sales.is_empty() {
        return Err(ApiError::bad_request("No sales data to export."));
    }

    let body = write_csv(&request.sales).map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(rows = request.sales.len(), "Sales exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        body,
    ))
}
