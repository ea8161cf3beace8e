use lambda_http::{http::StatusCode, Body, Response};

use crate::access::{
    actor_has_restaurant_access, user_has_capability, Actor, Capability, ASSIGNED_ALL,
};
use crate::error::{parse_id, AppError};
use crate::ncdb::T_RESTAURANTS;
use crate::responses;
use crate::types::{CreateRestaurantRequest, Restaurant, UpdateRestaurantRequest};
use crate::AppState;

/// Fetch a restaurant or 404.
pub async fn load_restaurant(state: &AppState, id: u64) -> Result<Restaurant, AppError> {
    state
        .ncdb
        .read_as(T_RESTAURANTS, id)
        .await?
        .ok_or(AppError::ResourceNotFound("Restaurant"))
}

/// Resource-level gate shared by every restaurant-scoped route.
pub fn ensure_restaurant_access(actor: &Actor, restaurant: &Restaurant) -> Result<(), AppError> {
    let id = restaurant.id.to_string();
    if actor_has_restaurant_access(actor, &id, restaurant.owner_id.as_deref()) {
        Ok(())
    } else {
        Err(AppError::CapabilityDenied)
    }
}

/// Read-only gate: `restaurant.view` grants platform-wide read access on
/// top of the ordinary management and assignment rules. Mutations still go
/// through `ensure_restaurant_access`.
pub fn ensure_restaurant_view(actor: &Actor, restaurant: &Restaurant) -> Result<(), AppError> {
    if user_has_capability(actor, Capability::RestaurantView) {
        return Ok(());
    }
    ensure_restaurant_access(actor, restaurant)
}

fn sees_all_restaurants(actor: &Actor) -> bool {
    user_has_capability(actor, Capability::RestaurantManageAny)
        || user_has_capability(actor, Capability::RestaurantView)
        || actor.assigned_restaurants.contains(ASSIGNED_ALL)
}

/// List restaurants visible to the actor: everything for broad actors,
/// owned + assigned for everyone else.
pub async fn list_restaurants(
    state: &AppState,
    actor: &Actor,
) -> Result<Response<Body>, AppError> {
    let all: Vec<Restaurant> = state
        .ncdb
        .search_as(T_RESTAURANTS, &serde_json::json!({}))
        .await?;

    let visible: Vec<Restaurant> = if sees_all_restaurants(actor) {
        all
    } else {
        all.into_iter()
            .filter(|r| {
                actor_has_restaurant_access(actor, &r.id.to_string(), r.owner_id.as_deref())
            })
            .collect()
    };

    Ok(responses::success(StatusCode::OK, &visible))
}

pub async fn create_restaurant(
    state: &AppState,
    actor: &Actor,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    if !user_has_capability(actor, Capability::RestaurantManageAny)
        && !user_has_capability(actor, Capability::RestaurantManageOwn)
    {
        return Err(AppError::CapabilityDenied);
    }

    let request: CreateRestaurantRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;
    if request.name.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "Restaurant name is required".to_string(),
        ));
    }

    // Prefer the backend's numeric user id as the owner reference when the
    // session carries one; external records mix both forms.
    let owner_id = match actor.ncdb_user_id {
        Some(n) if n > 0 => n.to_string(),
        _ => actor.id.clone(),
    };

    let now = chrono::Utc::now().to_rfc3339();
    let record = serde_json::json!({
        "name": request.name.trim(),
        "owner_id": owner_id,
        "is_active": true,
        "address": request.address,
        "created_at": now,
    });
    let id = state.ncdb.create(T_RESTAURANTS, &record).await?;

    tracing::info!("Restaurant {} created by {}", id, actor.id);

    let created = load_restaurant(state, id).await?;
    Ok(responses::success(StatusCode::CREATED, &created))
}

pub async fn get_restaurant(
    state: &AppState,
    actor: &Actor,
    restaurant_id: &str,
) -> Result<Response<Body>, AppError> {
    let id = parse_id(restaurant_id, "restaurant")?;
    let restaurant = load_restaurant(state, id).await?;
    ensure_restaurant_view(actor, &restaurant)?;
    Ok(responses::success(StatusCode::OK, &restaurant))
}

pub async fn update_restaurant(
    state: &AppState,
    actor: &Actor,
    restaurant_id: &str,
    body: &[u8],
) -> Result<Response<Body>, AppError> {
    let id = parse_id(restaurant_id, "restaurant")?;
    let restaurant = load_restaurant(state, id).await?;
    ensure_restaurant_access(actor, &restaurant)?;

    let request: UpdateRestaurantRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;

    let mut patch = serde_json::Map::new();
    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(AppError::ValidationFailed(
                "Restaurant name cannot be empty".to_string(),
            ));
        }
        patch.insert("name".to_string(), serde_json::json!(name.trim()));
    }
    if let Some(address) = request.address {
        patch.insert("address".to_string(), serde_json::json!(address));
    }
    if let Some(is_active) = request.is_active {
        patch.insert("is_active".to_string(), serde_json::json!(is_active));
    }

    if !patch.is_empty() {
        state
            .ncdb
            .update(T_RESTAURANTS, id, &serde_json::Value::Object(patch))
            .await?;
    }

    let updated = load_restaurant(state, id).await?;
    Ok(responses::success(StatusCode::OK, &updated))
}

pub async fn delete_restaurant(
    state: &AppState,
    actor: &Actor,
    restaurant_id: &str,
) -> Result<Response<Body>, AppError> {
    let id = parse_id(restaurant_id, "restaurant")?;
    let restaurant = load_restaurant(state, id).await?;
    ensure_restaurant_access(actor, &restaurant)?;

    state.ncdb.delete(T_RESTAURANTS, id).await?;
    tracing::info!("Restaurant {} deleted by {}", id, actor.id);

    Ok(responses::success(
        StatusCode::OK,
        &serde_json::json!({ "deleted": true }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use std::collections::BTreeSet;

    fn auditor() -> Actor {
        Actor {
            id: "9".to_string(),
            email: "audit@x.com".to_string(),
            role: Role::Auditor,
            capabilities: Role::Auditor.default_capabilities(),
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
    fn view_capability_grants_read_but_not_mutation() {
        let actor = auditor();
        let target = restaurant();
        assert!(ensure_restaurant_view(&actor, &target).is_ok());
        assert!(matches!(
            ensure_restaurant_access(&actor, &target),
            Err(AppError::CapabilityDenied)
        ));
    }

    #[test]
    fn view_capability_sees_every_restaurant_in_listings() {
        assert!(sees_all_restaurants(&auditor()));

        let mut without_view = auditor();
        without_view.capabilities.remove(&Capability::RestaurantView);
        assert!(!sees_all_restaurants(&without_view));
        assert!(ensure_restaurant_view(&without_view, &restaurant()).is_err());
    }
}
