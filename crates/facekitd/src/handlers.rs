//! HTTP handlers for the three image endpoints.
//!
//! Every handler reads the whole multipart body, validates it before touching
//! the filesystem, stages the upload, hands it to the engine, persists the
//! result and removes what it staged on every exit path.

use crate::errors::{ApiError, Result};
use crate::staging::{removed_background_name, second_scratch_name, validate_upload, Upload};
use crate::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use facekit_core::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use utoipa::ToSchema;

/// Body of a successful find-face call.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FindFaceResponse {
    /// Absolute path of the annotated image.
    pub path: String,
}

/// Body of a successful rm-bg call.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoveBackgroundResponse {
    /// Absolute path of the PNG with the background removed.
    pub file_path: String,
}

/// Collect every file part of the body, keyed by field name.
async fn read_uploads(mut multipart: Multipart) -> Result<HashMap<String, Upload>> {
    let mut uploads = HashMap::new();
    while let Some(field) = multipart.next_field().await? {
        let (Some(name), Some(filename)) = (field.name().map(str::to_owned), field.file_name().map(str::to_owned))
        else {
            continue;
        };
        let bytes = field.bytes().await?;
        tracing::debug!(field = %name, filename = %filename, size = bytes.len(), "received upload");
        uploads.insert(name, Upload { filename, bytes });
    }
    Ok(uploads)
}

fn take_file(uploads: &mut HashMap<String, Upload>) -> Result<Upload> {
    uploads.remove("file").ok_or_else(|| ApiError::BadRequest {
        message: "Missing required field: 'file'".to_string(),
    })
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[utoipa::path(
    post,
    path = "/find-face/",
    tag = "faces",
    summary = "Find a face and mark its landmarks",
    description = "Detects the most prominent face and draws its bounding box, eyes, nose and mouth corners. \
                   The annotated image is saved in the results directory under the uploaded filename.",
    request_body(content_type = "multipart/form-data", description = "Image in field `file` (png, jpg, jpeg, webp)"),
    responses(
        (status = 200, description = "Face found", body = FindFaceResponse),
        (status = 204, description = "No face found"),
        (status = 400, description = "Missing `file` field"),
        (status = 422, description = "Invalid File Format"),
        (status = 500, description = "Processing failed; body carries the error message")
    )
)]
pub async fn find_face(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut uploads = read_uploads(multipart).await?;
    let upload = take_file(&mut uploads)?;
    let filename = validate_upload(&upload.filename)?;

    let scratch = state.staging.stage(&filename, &upload.bytes).await?;
    let outcome = annotate(&state, &scratch, &filename).await;
    state.staging.discard(&scratch).await;

    match outcome? {
        Some(path) => Ok(Json(FindFaceResponse { path: display(&path) }).into_response()),
        None => {
            tracing::info!(filename = %filename, "no face found");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

async fn annotate(state: &AppState, scratch: &Path, filename: &str) -> Result<Option<std::path::PathBuf>> {
    match state.engine.annotate(scratch).await? {
        Some(image) => Ok(Some(state.staging.write_result(filename, image).await?)),
        None => Ok(None),
    }
}

#[utoipa::path(
    post,
    path = "/rm-bg/",
    tag = "images",
    summary = "Remove the background of an image",
    description = "Replaces the background with transparency. The result is always a PNG named after the \
                   part of the filename before its first dot, e.g. `a.b.jpg` becomes `a-rm.png`.",
    request_body(content_type = "multipart/form-data", description = "Image in field `file` (png, jpg, jpeg, webp)"),
    responses(
        (status = 200, description = "Background removed", body = RemoveBackgroundResponse),
        (status = 400, description = "Missing `file` field"),
        (status = 422, description = "Invalid File Format"),
        (status = 500, description = "Processing failed; body carries the error message")
    )
)]
pub async fn remove_background(State(state): State<AppState>, multipart: Multipart) -> Result<Json<RemoveBackgroundResponse>> {
    let mut uploads = read_uploads(multipart).await?;
    let upload = take_file(&mut uploads)?;
    let filename = validate_upload(&upload.filename)?;

    let scratch = state.staging.stage(&filename, &upload.bytes).await?;
    let outcome = cut_out(&state, &scratch, &filename).await;
    state.staging.discard(&scratch).await;

    let path = outcome?;
    Ok(Json(RemoveBackgroundResponse { file_path: display(&path) }))
}

async fn cut_out(state: &AppState, scratch: &Path, filename: &str) -> Result<std::path::PathBuf> {
    let image = state.engine.remove_background(scratch).await?;
    state.staging.write_png(&removed_background_name(filename), image).await
}

#[utoipa::path(
    post,
    path = "/comapre-face/",
    tag = "faces",
    summary = "Compare the faces in two images",
    description = "Returns whether both images show the same person. After a successful comparison \
                   every file present in the scratch directory is removed.",
    request_body(content_type = "multipart/form-data", description = "Images in fields `file1` and `file2`"),
    responses(
        (status = 200, description = "Comparison verdict (verified, distance, threshold, model_name, detector_backend, ...)"),
        (status = 405, description = "Both File required"),
        (status = 422, description = "Invalid File Format"),
        (status = 500, description = "Processing failed; body carries the error message")
    )
)]
pub async fn compare_face(State(state): State<AppState>, multipart: Multipart) -> Result<Json<Verdict>> {
    let mut uploads = read_uploads(multipart).await?;
    let (Some(first), Some(second)) = (uploads.remove("file1"), uploads.remove("file2")) else {
        return Err(ApiError::BothFilesRequired);
    };
    let name1 = validate_upload(&first.filename)?;
    let name2 = validate_upload(&second.filename)?;

    let path1 = state.staging.stage(&name1, &first.bytes).await?;
    let path2 = match state.staging.stage(&second_scratch_name(&name1, &name2), &second.bytes).await {
        Ok(path) => path,
        Err(e) => {
            state.staging.discard(&path1).await;
            return Err(e.into());
        }
    };

    let snapshot = state.staging.snapshot().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "cannot list scratch directory; only this request's files will be removed");
        vec![path1.clone(), path2.clone()]
    });

    match state.engine.compare(&path1, &path2).await {
        Ok(verdict) => {
            state.staging.sweep(&snapshot).await;
            Ok(Json(verdict))
        }
        Err(e) => {
            state.staging.discard(&path1).await;
            state.staging.discard(&path2).await;
            Err(e.into())
        }
    }
}
