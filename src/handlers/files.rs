//! File attachments on deliveries and NCEs.
//!
//! Both parents share one implementation; every operation is authorized
//! against the parent record (Read to list or download, Update to upload or
//! delete).

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::{load_delivery, load_nce};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{FileParent, FileRecord, MessageResponse, NewFile},
    policy::{self, Action, Ownership},
    storage::{StorageService, clean_filename, object_key},
};

/// UploadForm
///
/// Documentation-only schema for the multipart body. Repeat `files` to attach
/// several files in one request.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = Vec<String>, format = Binary)]
    files: Vec<Vec<u8>>,
    /// `true` marks the uploads as receipts.
    is_receipt: Option<bool>,
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn authorize_parent(
    state: &AppState,
    actor: &AuthUser,
    parent: FileParent,
    action: Action,
) -> AppResult<()> {
    match parent {
        FileParent::Delivery(id) => {
            let delivery = load_delivery(state.repo.as_ref(), id).await?;
            policy::authorize(actor, action, policy::Resource::Delivery, &Ownership::from(&delivery))
        }
        FileParent::Nce(id) => {
            let nce = load_nce(state.repo.as_ref(), id).await?;
            policy::authorize(actor, action, policy::Resource::Nce, &Ownership::from(&nce))
        }
    }
}

/// The file record, provided it hangs off `parent`.
async fn load_attached(state: &AppState, parent: FileParent, file_id: Uuid) -> AppResult<FileRecord> {
    state
        .repo
        .get_file(file_id)
        .await?
        .filter(|file| file.parent() == Some(parent))
        .ok_or_else(|| AppError::not_found("File"))
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// remove_blobs
///
/// Best-effort removal of the stored objects behind `files`. Failures are
/// logged; the caller deletes the records regardless.
pub(crate) async fn remove_blobs(storage: &dyn StorageService, files: &[FileRecord]) {
    for file in files {
        if let Err(err) = storage.delete_object(&file.storage_key).await {
            tracing::warn!(file_id = %file.id, key = %file.storage_key, error = %err, "Failed to delete blob");
        }
    }
}

async fn list(state: &AppState, actor: &AuthUser, parent: FileParent) -> AppResult<Vec<FileRecord>> {
    authorize_parent(state, actor, parent, Action::Read).await?;
    state.repo.list_files(parent).await
}

async fn upload(
    state: &AppState,
    actor: &AuthUser,
    parent: FileParent,
    mut multipart: Multipart,
) -> AppResult<Vec<FileRecord>> {
    authorize_parent(state, actor, parent, Action::Update).await?;

    let mut uploads = Vec::new();
    let mut is_receipt = false;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("files" | "file") => {
                let filename = clean_filename(field.file_name().unwrap_or_default());
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
                uploads.push(Upload {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("is_receipt") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed is_receipt field: {e}")))?;
                is_receipt = is_truthy(&value);
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(AppError::Validation("No files provided".to_string()));
    }

    let folder = parent.folder();
    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let key = object_key(&folder, &upload.filename);
        state
            .storage
            .put_object(&key, upload.bytes, upload.content_type.as_deref())
            .await?;

        let record = state
            .repo
            .create_file(NewFile {
                parent,
                filename: upload.filename,
                storage_key: key,
                is_receipt,
            })
            .await?;
        tracing::info!(file_id = %record.id, key = %record.storage_key, user_id = %actor.id, "File uploaded");
        stored.push(record);
    }

    Ok(stored)
}

async fn download(
    state: &AppState,
    actor: &AuthUser,
    parent: FileParent,
    file_id: Uuid,
) -> AppResult<Response> {
    authorize_parent(state, actor, parent, Action::Read).await?;
    let file = load_attached(state, parent, file_id).await?;

    let bytes = state
        .storage
        .get_object(&file.storage_key)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found on disk".to_string()))?;

    let disposition = format!("attachment; filename=\"{}\"", file.filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn delete(
    state: &AppState,
    actor: &AuthUser,
    parent: FileParent,
    file_id: Uuid,
) -> AppResult<MessageResponse> {
    authorize_parent(state, actor, parent, Action::Update).await?;
    let file = load_attached(state, parent, file_id).await?;

    remove_blobs(state.storage.as_ref(), std::slice::from_ref(&file)).await;
    if !state.repo.delete_file(file.id).await? {
        return Err(AppError::not_found("File"));
    }

    tracing::info!(file_id = %file.id, user_id = %actor.id, "File deleted");
    Ok(MessageResponse::new("File deleted successfully"))
}

// --- Delivery attachments ---

/// list_delivery_files
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/deliveries/{id}/files",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Attached files", body = [FileRecord]),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn list_delivery_files(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<FileRecord>>> {
    Ok(Json(list(&state, &actor, FileParent::Delivery(id)).await?))
}

/// upload_delivery_files
///
/// [Authenticated Route] Multipart upload; each `files` part becomes one
/// record stored under `deliveries/<id>/`.
#[utoipa::path(
    post,
    path = "/deliveries/{id}/files",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored files", body = [FileRecord]),
        (status = 400, description = "No files provided"),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn upload_delivery_files(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Vec<FileRecord>>> {
    Ok(Json(upload(&state, &actor, FileParent::Delivery(id), multipart).await?))
}

/// download_delivery_file
///
/// [Authenticated Route] Streams the stored bytes back as an attachment.
#[utoipa::path(
    get,
    path = "/deliveries/{id}/files/{file_id}/download",
    params(
        ("id" = Uuid, Path, description = "Delivery ID"),
        ("file_id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "File not found, or not found on disk")
    )
)]
pub async fn download_delivery_file(
    actor: AuthUser,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    download(&state, &actor, FileParent::Delivery(id), file_id).await
}

/// delete_delivery_file
///
/// [Authenticated Route]
#[utoipa::path(
    delete,
    path = "/deliveries/{id}/files/{file_id}",
    params(
        ("id" = Uuid, Path, description = "Delivery ID"),
        ("file_id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "File not found")
    )
)]
pub async fn delete_delivery_file(
    actor: AuthUser,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(delete(&state, &actor, FileParent::Delivery(id), file_id).await?))
}

// --- NCE attachments ---

/// list_nce_files
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/nces/{id}/files",
    params(("id" = Uuid, Path, description = "NCE ID")),
    responses(
        (status = 200, description = "Attached files", body = [FileRecord]),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "NCE not found")
    )
)]
pub async fn list_nce_files(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<FileRecord>>> {
    Ok(Json(list(&state, &actor, FileParent::Nce(id)).await?))
}

/// upload_nce_files
///
/// [Authenticated Route] Evidence for an NCE; stored under `nces/<id>/`.
#[utoipa::path(
    post,
    path = "/nces/{id}/files",
    params(("id" = Uuid, Path, description = "NCE ID")),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored files", body = [FileRecord]),
        (status = 400, description = "No files provided"),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "NCE not found")
    )
)]
pub async fn upload_nce_files(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Vec<FileRecord>>> {
    Ok(Json(upload(&state, &actor, FileParent::Nce(id), multipart).await?))
}

/// download_nce_file
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/nces/{id}/files/{file_id}/download",
    params(
        ("id" = Uuid, Path, description = "NCE ID"),
        ("file_id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "File not found, or not found on disk")
    )
)]
pub async fn download_nce_file(
    actor: AuthUser,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    download(&state, &actor, FileParent::Nce(id), file_id).await
}

/// delete_nce_file
///
/// [Authenticated Route]
#[utoipa::path(
    delete,
    path = "/nces/{id}/files/{file_id}",
    params(
        ("id" = Uuid, Path, description = "NCE ID"),
        ("file_id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "File not found")
    )
)]
pub async fn delete_nce_file(
    actor: AuthUser,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(delete(&state, &actor, FileParent::Nce(id), file_id).await?))
}
