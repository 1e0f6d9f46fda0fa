//! HTTP handlers for the mutation endpoints.
//!
//! Every failure is returned as `{"detail": ...}` with a mapped status code;
//! extractor rejections are folded into the same shape.

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::{FormRejection, QueryRejection},
        Form, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};
use treemirror_types::wire::{FILE_FIELD, SUB_PATH_FIELD};
use treemirror_types::{
    Ack, ApplyError, EntryKind, ErrorDetail, Greeting, RelativePath, RenameForm, SubPathForm,
};

use super::ServerState;

/// Wraps [`ApplyError`] so it can be turned into a response.
#[derive(Debug)]
pub struct HandlerError(pub ApplyError);

impl From<ApplyError> for HandlerError {
    fn from(e: ApplyError) -> Self {
        HandlerError(e)
    }
}

impl From<treemirror_types::PathError> for HandlerError {
    fn from(e: treemirror_types::PathError) -> Self {
        HandlerError(e.into())
    }
}

/// Status code for each error kind.
pub fn status_code(err: &ApplyError) -> StatusCode {
    match err {
        ApplyError::NotFound(_) => StatusCode::NOT_FOUND,
        ApplyError::Conflict(_) => StatusCode::BAD_REQUEST,
        ApplyError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ApplyError::UnsupportedKind(_) => StatusCode::BAD_REQUEST,
        ApplyError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        ApplyError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ApplyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

/// Keep the body-limit status from the multipart stream; everything else is
/// a malformed request.
fn multipart_error(e: MultipartError) -> ApplyError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApplyError::PayloadTooLarge(e.body_text())
    } else {
        ApplyError::bad_request(e.body_text())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = status_code(&self.0);
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, self.0);
        } else {
            debug!("Request rejected with {}: {}", status, self.0);
        }
        (
            status,
            Json(ErrorDetail {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type HandlerResult = Result<Json<Ack>, HandlerError>;

pub async fn root() -> Json<Greeting> {
    Json(Greeting::default())
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /uploadfile - multipart `file` + `subPath`
pub async fn upload_file(
    State(state): State<ServerState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> HandlerResult {
    let mut multipart = multipart.map_err(|e| ApplyError::bad_request(e.body_text()))?;
    let mut sub_path: Option<String> = None;
    let mut content = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(SUB_PATH_FIELD) => {
                sub_path = Some(field.text().await.map_err(multipart_error)?);
            }
            Some(FILE_FIELD) => {
                content = Some(field.bytes().await.map_err(multipart_error)?);
            }
            other => debug!("Ignoring unexpected multipart field {:?}", other),
        }
    }

    let sub_path = sub_path
        .ok_or_else(|| ApplyError::bad_request(format!("missing '{}' field", SUB_PATH_FIELD)))?;
    let content =
        content.ok_or_else(|| ApplyError::bad_request(format!("missing '{}' field", FILE_FIELD)))?;

    let path = RelativePath::parse(&sub_path)?;
    Ok(Json(state.applier.save_file(&path, &content).await?))
}

/// DELETE /deletefile?subPath=...
pub async fn delete_file(
    State(state): State<ServerState>,
    query: Result<Query<SubPathForm>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| ApplyError::bad_request(e.body_text()))?;
    let path = RelativePath::parse(&query.sub_path)?;
    Ok(Json(state.applier.delete_entry(&path).await?))
}

/// DELETE /deletedirectory?subPath=...
///
/// Same routine as `/deletefile`: the destination decides what the entry is.
pub async fn delete_directory(
    State(state): State<ServerState>,
    query: Result<Query<SubPathForm>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| ApplyError::bad_request(e.body_text()))?;
    let path = RelativePath::parse(&query.sub_path)?;
    debug!("Client reports {} as a directory", path);
    Ok(Json(state.applier.delete_entry(&path).await?))
}

/// PUT /renamefile - form `oldSubPath`, `newSubPath`
pub async fn rename_file(
    State(state): State<ServerState>,
    form: Result<Form<RenameForm>, FormRejection>,
) -> HandlerResult {
    rename(state, form, EntryKind::File).await
}

/// PUT /renamedirectory - form `oldSubPath`, `newSubPath`
pub async fn rename_directory(
    State(state): State<ServerState>,
    form: Result<Form<RenameForm>, FormRejection>,
) -> HandlerResult {
    rename(state, form, EntryKind::Directory).await
}

async fn rename(
    state: ServerState,
    form: Result<Form<RenameForm>, FormRejection>,
    expected: EntryKind,
) -> HandlerResult {
    let Form(form) = form.map_err(|e| ApplyError::bad_request(e.body_text()))?;
    let from = RelativePath::parse(&form.old_sub_path)?;
    let to = RelativePath::parse(&form.new_sub_path)?;
    Ok(Json(state.applier.rename_entry(&from, &to, expected).await?))
}

/// POST /createdirectory - form `subPath`
pub async fn create_directory(
    State(state): State<ServerState>,
    form: Result<Form<SubPathForm>, FormRejection>,
) -> HandlerResult {
    let Form(form) = form.map_err(|e| ApplyError::bad_request(e.body_text()))?;
    let path = RelativePath::parse(&form.sub_path)?;
    Ok(Json(state.applier.create_directory(&path).await?))
}
