use lambda_http::{http::StatusCode, Body, Response};

use crate::access::{user_has_capability, Actor, Capability};
use crate::error::{parse_id, AppError};
use crate::ncdb::{T_MENUS, T_MENU_ITEMS, T_MENU_UPLOADS};
use crate::responses;
use crate::restaurants::{ensure_restaurant_access, load_restaurant};
use crate::types::{
    push_activity, ActivityEntry, CreateUploadRequest, Menu, MenuItem, MenuUpload, UploadStatus,
};
use crate::AppState;

/// Move an upload to a new status, appending an activity entry. Rejects
/// transitions the state machine does not allow.
pub async fn transition_upload(
    state: &AppState,
    upload: &MenuUpload,
    to: UploadStatus,
    detail: Option<String>,
) -> Result<(), AppError> {
    if !upload.status.can_transition(to) {
        return Err(AppError::ValidationFailed(format!(
            "Upload cannot move from {} to {}",
            upload.status.as_str(),
            to.as_str()
        )));
    }

    let mut activity = upload.activity();
    push_activity(
        &mut activity,
        ActivityEntry {
            at: chrono::Utc::now().to_rfc3339(),
            event: format!("{} -> {}", upload.status.as_str(), to.as_str()),
            detail,
        },
    );
    let activity_log = serde_json::to_string(&activity)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    state
        .ncdb
        .update(
            T_MENU_UPLOADS,
            upload.id,
            &serde_json::json!({
                "status": to.as_str(),
                "activity_log": activity_log,
                "updated_at": chrono::Utc::now().to_rfc3339(),
            }),
        )
        .await?;

    tracing::info!(
        "Upload {} moved {} -> {}",
        upload.id,
        upload.status.as_str(),
        to.as_str()
    );
    Ok(())
}

async fn load_upload_checked(
    state: &AppState,
    actor: &Actor,
    upload_id: u64,
) -> Result<MenuUpload, AppError> {
    let upload: MenuUpload = state
        .ncdb
        .read_as(T_MENU_UPLOADS, upload_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Upload"))?;
    let restaurant = load_restaurant(state, upload.restaurant_id).await?;
    ensure_restaurant_access(actor, &restaurant)?;
    Ok(upload)
}

fn ensure_menu_manage(actor: &Actor) -> Result<(), AppError> {
    if user_has_capability(actor, Capability::MenuManage) {
        Ok(())
    } else {
        Err(AppError::CapabilityDenied)
    }
}

/// Register a document for asynchronous processing. Responds 202: the
/// worker picks the upload up on its next batch.
pub async fn create_upload(
    state: &AppState,
    actor: &Actor,
    restaurant_id: &str,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(restaurant_id, "restaurant")?;
    let restaurant = load_restaurant(state, id).await?;
    ensure_restaurant_access(actor, &restaurant)?;

    let request: CreateUploadRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;
    if request.source_url.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "Upload source_url is required".to_string(),
        ));
    }

    // The target menu must belong to the restaurant the upload is scoped to.
    let menu: Menu = state
        .ncdb
        .read_as(T_MENUS, request.menu_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu"))?;
    if menu.restaurant_id != id {
        return Err(AppError::ValidationFailed(
            "Menu does not belong to this restaurant".to_string(),
        ));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let activity = vec![ActivityEntry {
        at: now.clone(),
        event: "registered".to_string(),
        detail: Some(format!("by {}", actor.id)),
    }];
    let record = serde_json::json!({
        "restaurant_id": id,
        "menu_id": request.menu_id,
        "status": UploadStatus::Pending.as_str(),
        "source_url": request.source_url.trim(),
        "content_type": request.content_type,
        "activity_log": serde_json::to_string(&activity)
            .map_err(|e| AppError::Internal(e.to_string()))?,
        "created_at": now,
    });
    let upload_id = state.ncdb.create(T_MENU_UPLOADS, &record).await?;

    tracing::info!("Upload {} registered for restaurant {}", upload_id, id);

    let created: MenuUpload = state
        .ncdb
        .read_as(T_MENU_UPLOADS, upload_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Upload"))?;
    Ok(responses::success(StatusCode::ACCEPTED, &created))
}

pub async fn get_upload(
    state: &AppState,
    actor: &Actor,
    upload_id: &str,
) -> Result<Response<Body>, AppError> {
    let id = parse_id(upload_id, "upload")?;
    let upload = load_upload_checked(state, actor, id).await?;

    // Include candidate items so the review screen has everything in one
    // round trip.
    let candidates: Vec<MenuItem> = state
        .ncdb
        .search_as(
            T_MENU_ITEMS,
            &serde_json::json!({ "upload_id": id, "state": "candidate" }),
        )
        .await?;

    Ok(responses::success(
        StatusCode::OK,
        &serde_json::json!({
            "upload": upload,
            "candidates": candidates,
        }),
    ))
}

/// Accept a reviewed upload: its candidate items become active.
pub async fn promote_upload(
    state: &AppState,
    actor: &Actor,
    upload_id: &str,
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(upload_id, "upload")?;
    let upload = load_upload_checked(state, actor, id).await?;
    if upload.status != UploadStatus::NeedsReview {
        return Err(AppError::ValidationFailed(
            "Upload is not awaiting review".to_string(),
        ));
    }

    let candidates: Vec<MenuItem> = state
        .ncdb
        .search_as(
            T_MENU_ITEMS,
            &serde_json::json!({ "upload_id": id, "state": "candidate" }),
        )
        .await?;
    for item in &candidates {
        state
            .ncdb
            .update(
                T_MENU_ITEMS,
                item.id,
                &serde_json::json!({ "state": "active" }),
            )
            .await?;
    }

    transition_upload(
        state,
        &upload,
        UploadStatus::Promoted,
        Some(format!("{} items promoted by {}", candidates.len(), actor.id)),
    )
    .await?;

    Ok(responses::success(
        StatusCode::OK,
        &serde_json::json!({ "promoted": candidates.len() }),
    ))
}

/// Reject a reviewed upload: its candidate items are removed.
pub async fn discard_upload(
    state: &AppState,
    actor: &Actor,
    upload_id: &str,
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(upload_id, "upload")?;
    let upload = load_upload_checked(state, actor, id).await?;
    if upload.status != UploadStatus::NeedsReview {
        return Err(AppError::ValidationFailed(
            "Upload is not awaiting review".to_string(),
        ));
    }

    let candidates: Vec<MenuItem> = state
        .ncdb
        .search_as(
            T_MENU_ITEMS,
            &serde_json::json!({ "upload_id": id, "state": "candidate" }),
        )
        .await?;
    for item in &candidates {
        state.ncdb.delete(T_MENU_ITEMS, item.id).await?;
    }

    transition_upload(
        state,
        &upload,
        UploadStatus::Discarded,
        Some(format!("{} items discarded by {}", candidates.len(), actor.id)),
    )
    .await?;

    Ok(responses::success(
        StatusCode::OK,
        &serde_json::json!({ "discarded": candidates.len() }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ncdb::{NcdbClient, NcdbConfig};
    use crate::session::AuthConfig;

    fn offline_state() -> std::sync::Arc<AppState> {
        AppState::new(
            NcdbClient::new(NcdbConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                instance: "test".to_string(),
                secret_key: "test".to_string(),
            }),
            AuthConfig::new("s".to_string(), "c".to_string(), 3600),
            None,
        )
    }

    fn upload(status: UploadStatus) -> MenuUpload {
        MenuUpload {
            id: 1,
            restaurant_id: 2,
            menu_id: 3,
            status,
            source_url: "https://example.com/menu.txt".to_string(),
            content_type: None,
            extracted_text: None,
            activity_log: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_before_any_write() {
        let state = offline_state();
        let err = transition_upload(&state, &upload(UploadStatus::Promoted), UploadStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
        assert!(err.public_message().contains("promoted"));
    }

    #[test]
    fn upload_request_requires_a_target_menu() {
        let err = serde_json::from_value::<CreateUploadRequest>(
            serde_json::json!({ "source_url": "https://x/menu.txt" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("menu_id"));

        let ok: CreateUploadRequest = serde_json::from_value(
            serde_json::json!({ "source_url": "https://x/menu.txt", "menu_id": 3 }),
        )
        .unwrap();
        assert_eq!(ok.menu_id, 3);
        assert_eq!(ok.content_type, None);
    }
}
