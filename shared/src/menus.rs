use lambda_http::{http::StatusCode, Body, Response};

use crate::access::{user_has_capability, Actor, Capability};
use crate::error::{parse_id, AppError};
use crate::ncdb::T_MENUS;
use crate::responses;
use crate::restaurants::{ensure_restaurant_access, load_restaurant};
use crate::types::{CreateMenuRequest, Menu, UpdateMenuRequest};
use crate::AppState;

/// Fetch a menu or 404, then re-check access through its own restaurant
/// record: menu rights are transitive through restaurant access.
pub async fn load_menu_checked(
    state: &AppState,
    actor: &Actor,
    menu_id: u64,
) -> Result<Menu, AppError> {
    let menu: Menu = state
        .ncdb
        .read_as(T_MENUS, menu_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu"))?;
    let restaurant = load_restaurant(state, menu.restaurant_id).await?;
    ensure_restaurant_access(actor, &restaurant)?;
    Ok(menu)
}

fn ensure_menu_manage(actor: &Actor) -> Result<(), AppError> {
    if user_has_capability(actor, Capability::MenuManage) {
        Ok(())
    } else {
        Err(AppError::CapabilityDenied)
    }
}

/// Read-only gate for menu-scoped routes: `menu.view` grants platform-wide
/// read access, everyone else needs ordinary restaurant access.
fn ensure_menu_scope_read(
    actor: &Actor,
    restaurant: &crate::types::Restaurant,
) -> Result<(), AppError> {
    if user_has_capability(actor, Capability::MenuView) {
        return Ok(());
    }
    ensure_restaurant_access(actor, restaurant)
}

/// Read-only variant of `load_menu_checked`.
pub async fn load_menu_readable(
    state: &AppState,
    actor: &Actor,
    menu_id: u64,
) -> Result<Menu, AppError> {
    let menu: Menu = state
        .ncdb
        .read_as(T_MENUS, menu_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu"))?;
    let restaurant = load_restaurant(state, menu.restaurant_id).await?;
    ensure_menu_scope_read(actor, &restaurant)?;
    Ok(menu)
}

pub async fn list_menus(
    state: &AppState,
    actor: &Actor,
    restaurant_id: &str,
) -> Result<Response<Body>, AppError> {
    let id = parse_id(restaurant_id, "restaurant")?;
    let restaurant = load_restaurant(state, id).await?;
    ensure_menu_scope_read(actor, &restaurant)?;

    let menus: Vec<Menu> = state
        .ncdb
        .search_as(T_MENUS, &serde_json::json!({ "restaurant_id": id }))
        .await?;
    Ok(responses::success(StatusCode::OK, &menus))
}

pub async fn create_menu(
    state: &AppState,
    actor: &Actor,
    restaurant_id: &str,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(restaurant_id, "restaurant")?;
    let restaurant = load_restaurant(state, id).await?;
    ensure_restaurant_access(actor, &restaurant)?;

    let request: CreateMenuRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;
    if request.name.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "Menu name is required".to_string(),
        ));
    }

    let record = serde_json::json!({
        "restaurant_id": id,
        "name": request.name.trim(),
        "description": request.description,
        "is_active": true,
        "created_at": chrono::Utc::now().to_rfc3339(),
    });
    let menu_id = state.ncdb.create(T_MENUS, &record).await?;

    tracing::info!("Menu {} created for restaurant {}", menu_id, id);

    let created: Menu = state
        .ncdb
        .read_as(T_MENUS, menu_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu"))?;
    Ok(responses::success(StatusCode::CREATED, &created))
}

pub async fn get_menu(
    state: &AppState,
    actor: &Actor,
    menu_id: &str,
) -> Result<Response<Body>, AppError> {
    let id = parse_id(menu_id, "menu")?;
    let menu = load_menu_readable(state, actor, id).await?;
    Ok(responses::success(StatusCode::OK, &menu))
}

pub async fn update_menu(
    state: &AppState,
    actor: &Actor,
    menu_id: &str,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(menu_id, "menu")?;
    load_menu_checked(state, actor, id).await?;

    let request: UpdateMenuRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;

    let mut patch = serde_json::Map::new();
    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(AppError::ValidationFailed(
                "Menu name cannot be empty".to_string(),
            ));
        }
        patch.insert("name".to_string(), serde_json::json!(name.trim()));
    }
    if let Some(description) = request.description {
        patch.insert("description".to_string(), serde_json::json!(description));
    }
    if let Some(is_active) = request.is_active {
        patch.insert("is_active".to_string(), serde_json::json!(is_active));
    }

    if !patch.is_empty() {
        state
            .ncdb
            .update(T_MENUS, id, &serde_json::Value::Object(patch))
            .await?;
    }

    let updated: Menu = state
        .ncdb
        .read_as(T_MENUS, id)
        .await?
        .ok_or(AppError::ResourceNotFound("Menu"))?;
    Ok(responses::success(StatusCode::OK, &updated))
}

pub async fn delete_menu(
    state: &AppState,
    actor: &Actor,
    menu_id: &str,
) -> Result<Response<Body>, AppError> {
    ensure_menu_manage(actor)?;
    let id = parse_id(menu_id, "menu")?;
    load_menu_checked(state, actor, id).await?;

    state.ncdb.delete(T_MENUS, id).await?;
    tracing::info!("Menu {} deleted by {}", id, actor.id);

    Ok(responses::success(
        StatusCode::OK,
        &serde_json::json!({ "deleted": true }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::types::Restaurant;
    use std::collections::BTreeSet;

    fn actor_with(role: Role) -> Actor {
        Actor {
            id: "9".to_string(),
            email: "who@x.com".to_string(),
            role,
            capabilities: role.default_capabilities(),
            assigned_restaurants: BTreeSet::new(),
            ncdb_user_id: None,
        }
    }

    fn restaurant() -> Restaurant {
        Restaurant {
            id: 7,
            name: "Thai Corner".to_string(),
            owner_id: Some("999".to_string()),
            is_active: true,
            address: None,
            created_at: None,
        }
    }

    #[test]
    fn menu_view_capability_allows_reading_out_of_scope() {
        let auditor = actor_with(Role::Auditor);
        assert!(ensure_menu_scope_read(&auditor, &restaurant()).is_ok());
        // Reads only; mutation still needs menu.manage.
        assert!(ensure_menu_manage(&auditor).is_err());
    }

    #[test]
    fn without_menu_view_reads_fall_back_to_restaurant_access() {
        let staff = actor_with(Role::Staff);
        assert!(ensure_menu_scope_read(&staff, &restaurant()).is_err());

        let mut assigned = actor_with(Role::Staff);
        assigned.assigned_restaurants.insert("7".to_string());
        assert!(ensure_menu_scope_read(&assigned, &restaurant()).is_ok());
    }
}
