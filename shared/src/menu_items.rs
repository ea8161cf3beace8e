use lambda_http::{http::StatusCode, Body, Response};

use crate::access::{user_has_capability, Actor, Capability};
use crate::error::{parse_id, AppError};
use crate::menus::{load_menu_checked, load_menu_readable};
use crate::ncdb::T_MENU_ITEMS;
use crate::responses;
use crate::types::{CreateMenuItemRequest, MenuItem, UpdateMenuItemRequest};
use crate::AppState;

async fn load_item_checked(
    state: &AppState,
    actor: &Actor,
    item_id: u64,
) -> Result<MenuItem, AppError> {
    let item: MenuItem = state
        .ncdb
        .read_as(T_MENU_ITEMS, item_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu item"))?;
    // Item rights are transitive through the menu's restaurant.
    load_menu_checked(state, actor, item.menu_id).await?;
    Ok(item)
}

fn ensure_menu_manage(actor: &Actor) -> Result<(), AppError> {
    if user_has_capability(actor, Capability::MenuManage) {
        Ok(())
    } else {
        Err(AppError::CapabilityDenied)
    }
}

pub async fn list_items(
    state: &AppState,
    actor: &Actor,
    menu_id: &str,
) -> Result<Response<Body>, AppError> {
    let id = parse_id(menu_id, "menu")?;
    load_menu_readable(state, actor, id).await?;

    let items: Vec<MenuItem> = state
        .ncdb
        .search_as(T_MENU_ITEMS, &serde_json::json!({ "menu_id": id }))
        .await?;
    Ok(responses::success(StatusCode::OK, &items))
}

pub async fn create_item(
    state: &AppState,
    actor: &Actor,
    menu_id: &str,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(menu_id, "menu")?;
    let menu = load_menu_checked(state, actor, id).await?;

    let request: CreateMenuItemRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;
    if request.name.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "Item name is required".to_string(),
        ));
    }

    let record = serde_json::json!({
        "menu_id": id,
        "restaurant_id": menu.restaurant_id,
        "name": request.name.trim(),
        "description": request.description,
        "price": request.price,
        "allergens": request.allergens,
        "state": "active",
        "created_at": chrono::Utc::now().to_rfc3339(),
    });
    let item_id = state.ncdb.create(T_MENU_ITEMS, &record).await?;

    tracing::info!("Menu item {} created on menu {}", item_id, id);

    let created: MenuItem = state
        .ncdb
        .read_as(T_MENU_ITEMS, item_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu item"))?;
    Ok(responses::success(StatusCode::CREATED, &created))
}

pub async fn update_item(
    state: &AppState,
    actor: &Actor,
    item_id: &str,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(item_id, "menu item")?;
    load_item_checked(state, actor, id).await?;

    let request: UpdateMenuItemRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;

    let mut patch = serde_json::Map::new();
    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(AppError::ValidationFailed(
                "Item name cannot be empty".to_string(),
            ));
        }
        patch.insert("name".to_string(), serde_json::json!(name.trim()));
    }
    if let Some(description) = request.description {
        patch.insert("description".to_string(), serde_json::json!(description));
    }
    if let Some(price) = request.price {
        patch.insert("price".to_string(), serde_json::json!(price));
    }
    if let Some(allergens) = request.allergens {
        patch.insert("allergens".to_string(), serde_json::json!(allergens));
    }

    if !patch.is_empty() {
        state
            .ncdb
            .update(T_MENU_ITEMS, id, &serde_json::Value::Object(patch))
            .await?;
    }

    let updated: MenuItem = state
        .ncdb
        .read_as(T_MENU_ITEMS, id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu item"))?;
    Ok(responses::success(StatusCode::OK, &updated))
}

pub async fn delete_item(
    state: &AppState,
    actor: &Actor,
    item_id: &str,
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(item_id, "menu item")?;
    load_item_checked(state, actor, id).await?;

    state.ncdb.delete(T_MENU_ITEMS, id).await?;
    tracing::info!("Menu item {} deleted by {}", id, actor.id);

    Ok(responses::success(
        StatusCode::OK,
        &serde_json::json!({ "deleted": true }),
    ))
}
