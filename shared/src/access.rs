use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Reserved value in `assigned_restaurants` meaning unrestricted access.
pub const ASSIGNED_ALL: &str = "all";

// ========== ROLE ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Manager,
    Staff,
    Auditor,
}

impl Role {
    /// Resolve a role from session input. An absent role defaults to
    /// `Manager`; an unrecognized string maps to `Staff` so a typo can
    /// never elevate.
    pub fn resolve(raw: Option<&str>) -> Role {
        match raw {
            None => Role::Manager,
            Some(s) if s.trim().is_empty() => Role::Manager,
            Some(s) => match s.trim().to_ascii_lowercase().as_str() {
                "superadmin" => Role::Superadmin,
                "admin" => Role::Admin,
                "manager" => Role::Manager,
                "staff" => Role::Staff,
                "auditor" => Role::Auditor,
                _ => Role::Staff,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
            Role::Auditor => "auditor",
        }
    }

    /// Default capability set for the role. Deterministic, duplicate-free
    /// (set semantics), and non-empty for every role.
    pub fn default_capabilities(&self) -> BTreeSet<Capability> {
        let caps: &[Capability] = match self {
            Role::Superadmin => &[
                Capability::PlatformSuperadmin,
                Capability::RestaurantManageAny,
                Capability::UserManageAny,
                Capability::MenuManage,
            ],
            Role::Admin => &[
                Capability::RestaurantManageAny,
                Capability::UserManageAny,
                Capability::MenuManage,
            ],
            Role::Manager => &[
                Capability::RestaurantManageOwn,
                Capability::RestaurantManageAssigned,
                Capability::MenuManage,
            ],
            Role::Staff => &[Capability::MenuManage],
            Role::Auditor => &[Capability::RestaurantView, Capability::MenuView],
        };
        caps.iter().copied().collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== CAPABILITY ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    PlatformSuperadmin,
    RestaurantManageAny,
    RestaurantManageOwn,
    RestaurantManageAssigned,
    RestaurantView,
    MenuManage,
    MenuView,
    UserManageAny,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::PlatformSuperadmin => "platform.superadmin",
            Capability::RestaurantManageAny => "restaurant.manage:any",
            Capability::RestaurantManageOwn => "restaurant.manage:own",
            Capability::RestaurantManageAssigned => "restaurant.manage:assigned",
            Capability::RestaurantView => "restaurant.view",
            Capability::MenuManage => "menu.manage",
            Capability::MenuView => "menu.view",
            Capability::UserManageAny => "user.manage:any",
        }
    }

    /// Parse a wire capability string. Unknown strings yield `None` and are
    /// ignored by the actor builder, never granted.
    pub fn parse(s: &str) -> Option<Capability> {
        match s.trim() {
            "platform.superadmin" => Some(Capability::PlatformSuperadmin),
            "restaurant.manage:any" => Some(Capability::RestaurantManageAny),
            "restaurant.manage:own" => Some(Capability::RestaurantManageOwn),
            "restaurant.manage:assigned" => Some(Capability::RestaurantManageAssigned),
            "restaurant.view" => Some(Capability::RestaurantView),
            "menu.manage" => Some(Capability::MenuManage),
            "menu.view" => Some(Capability::MenuView),
            "user.manage:any" => Some(Capability::UserManageAny),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Capability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ========== ACTOR ==========

/// Heterogeneous session/user input as it arrives from the token or an
/// external user record: ids may be numbers or strings, everything optional.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RawSession {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub assigned_restaurants: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub ncdb_user_id: Option<i64>,
}

/// Normalized authenticated principal. Built fresh per request, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub capabilities: BTreeSet<Capability>,
    pub assigned_restaurants: BTreeSet<String>,
    pub ncdb_user_id: Option<i64>,
}

impl Actor {
    /// Normalize raw session input into an `Actor`. Total: degenerate input
    /// still yields a usable low-privilege value.
    pub fn from_session(raw: &RawSession) -> Actor {
        let email = raw
            .email
            .as_deref()
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let id = raw
            .id
            .as_ref()
            .and_then(scalar_to_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| email.clone());

        let role = Role::resolve(raw.role.as_deref());

        let mut capabilities = role.default_capabilities();
        if let Some(overrides) = &raw.capabilities {
            // Union with the role defaults; unknown strings are dropped.
            capabilities.extend(overrides.iter().filter_map(|s| Capability::parse(s)));
        }

        let assigned_restaurants = raw
            .assigned_restaurants
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter_map(scalar_to_string)
            .filter(|s| !s.is_empty())
            .collect();

        Actor {
            id,
            email,
            role,
            capabilities,
            assigned_restaurants,
            ncdb_user_id: raw.ncdb_user_id,
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ========== DECISIONS ==========

/// True if the actor holds the capability, or holds `platform.superadmin`,
/// which satisfies every check. The bypass lives here and nowhere else.
pub fn user_has_capability(actor: &Actor, capability: Capability) -> bool {
    actor.capabilities.contains(&Capability::PlatformSuperadmin)
        || actor.capabilities.contains(&capability)
}

/// Restaurant-level access decision, first match wins:
/// 1. manage:any or superadmin
/// 2. sentinel "all" assignment
/// 3. direct assignment of this restaurant id
/// 4. manage:own and the owner reference matches the actor's identity
/// 5. manage:assigned and direct assignment (unreachable past step 3,
///    kept as an explicit fallback)
pub fn actor_has_restaurant_access(
    actor: &Actor,
    restaurant_id: &str,
    owner_id: Option<&str>,
) -> bool {
    if user_has_capability(actor, Capability::RestaurantManageAny) {
        return true;
    }
    if actor.assigned_restaurants.contains(ASSIGNED_ALL) {
        return true;
    }
    let restaurant_id = restaurant_id.trim();
    if actor.assigned_restaurants.contains(restaurant_id) {
        return true;
    }
    if actor.capabilities.contains(&Capability::RestaurantManageOwn) {
        if let Some(owner) = owner_id {
            if owner_matches(actor, owner) {
                return true;
            }
        }
    }
    if actor
        .capabilities
        .contains(&Capability::RestaurantManageAssigned)
        && actor.assigned_restaurants.contains(restaurant_id)
    {
        return true;
    }
    false
}

fn owner_matches(actor: &Actor, owner_id: &str) -> bool {
    let owner = owner_id.trim().to_ascii_lowercase();
    if owner.is_empty() {
        return false;
    }
    if owner == actor.id.trim().to_ascii_lowercase() || owner == actor.email {
        return true;
    }
    // Secondary numeric id only counts when positive.
    match actor.ncdb_user_id {
        Some(n) if n > 0 => owner == n.to_string(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, caps: &[Capability], assigned: &[&str]) -> Actor {
        let mut capabilities = role.default_capabilities();
        capabilities.extend(caps.iter().copied());
        Actor {
            id: "42".to_string(),
            email: "foo@bar.com".to_string(),
            role,
            capabilities,
            assigned_restaurants: assigned.iter().map(|s| s.to_string()).collect(),
            ncdb_user_id: None,
        }
    }

    fn bare_actor(caps: &[Capability], assigned: &[&str]) -> Actor {
        Actor {
            id: "42".to_string(),
            email: "foo@bar.com".to_string(),
            role: Role::Manager,
            capabilities: caps.iter().copied().collect(),
            assigned_restaurants: assigned.iter().map(|s| s.to_string()).collect(),
            ncdb_user_id: None,
        }
    }

    #[test]
    fn every_role_has_nonempty_deterministic_defaults() {
        for role in [
            Role::Superadmin,
            Role::Admin,
            Role::Manager,
            Role::Staff,
            Role::Auditor,
        ] {
            let a = role.default_capabilities();
            let b = role.default_capabilities();
            assert!(!a.is_empty(), "{} has empty defaults", role);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn unrecognized_role_never_grants_superadmin() {
        for raw in ["root", "SUPER", "owner", "administrator!"] {
            let role = Role::resolve(Some(raw));
            assert_eq!(role, Role::Staff);
            assert!(!role
                .default_capabilities()
                .contains(&Capability::PlatformSuperadmin));
        }
    }

    #[test]
    fn absent_role_defaults_to_manager() {
        assert_eq!(Role::resolve(None), Role::Manager);
        assert_eq!(Role::resolve(Some("  ")), Role::Manager);
        assert_eq!(Role::resolve(Some(" Manager ")), Role::Manager);
    }

    #[test]
    fn superadmin_satisfies_every_capability() {
        let a = bare_actor(&[Capability::PlatformSuperadmin], &[]);
        for cap in [
            Capability::RestaurantManageAny,
            Capability::RestaurantManageOwn,
            Capability::UserManageAny,
            Capability::MenuManage,
        ] {
            assert!(user_has_capability(&a, cap));
        }
    }

    #[test]
    fn manage_any_is_monotonic() {
        // Any previously denied pair becomes allowed once manage:any is held.
        let denied = bare_actor(&[], &[]);
        assert!(!actor_has_restaurant_access(&denied, "7", Some("999")));

        let mut allowed = denied.clone();
        allowed.capabilities.insert(Capability::RestaurantManageAny);
        assert!(actor_has_restaurant_access(&allowed, "7", Some("999")));
        assert!(actor_has_restaurant_access(&allowed, "anything", None));
    }

    #[test]
    fn sentinel_all_allows_any_restaurant() {
        let a = bare_actor(&[], &["all"]);
        assert!(actor_has_restaurant_access(&a, "1", None));
        assert!(actor_has_restaurant_access(&a, "not-in-list", Some("999")));
    }

    #[test]
    fn assignment_match_allows_without_capability() {
        // manager, no explicit caps beyond defaults, assigned ["55"]
        let a = actor(Role::Manager, &[], &["55"]);
        assert!(actor_has_restaurant_access(&a, "55", Some("999")));
    }

    #[test]
    fn ownership_match_requires_manage_own() {
        let a = bare_actor(&[Capability::RestaurantManageOwn], &[]);
        assert!(actor_has_restaurant_access(&a, "7", Some("42")));

        let without = bare_actor(&[], &[]);
        assert!(!actor_has_restaurant_access(&without, "7", Some("42")));
    }

    #[test]
    fn ownership_comparison_is_case_and_whitespace_insensitive() {
        let a = bare_actor(&[Capability::RestaurantManageOwn], &[]);
        assert!(actor_has_restaurant_access(&a, "7", Some(" Foo@Bar.com ")));
    }

    #[test]
    fn ownership_matches_positive_numeric_id_only() {
        let mut a = bare_actor(&[Capability::RestaurantManageOwn], &[]);
        a.ncdb_user_id = Some(77);
        assert!(actor_has_restaurant_access(&a, "7", Some("77")));

        a.ncdb_user_id = Some(-77);
        assert!(!actor_has_restaurant_access(&a, "7", Some("-77")));
    }

    #[test]
    fn staff_without_assignment_is_denied() {
        let a = Actor {
            id: "9".to_string(),
            email: "s@x.com".to_string(),
            role: Role::Staff,
            capabilities: Role::Staff.default_capabilities(),
            assigned_restaurants: BTreeSet::new(),
            ncdb_user_id: None,
        };
        assert!(!actor_has_restaurant_access(&a, "7", Some("42")));
    }

    #[test]
    fn builder_normalizes_and_is_idempotent() {
        let raw = RawSession {
            id: Some(serde_json::json!(42)),
            email: Some("  Foo@Bar.COM ".to_string()),
            role: Some("MANAGER".to_string()),
            capabilities: Some(vec![
                "menu.manage".to_string(),
                "restaurant.manage:own".to_string(),
                "made.up:capability".to_string(),
            ]),
            assigned_restaurants: Some(vec![
                serde_json::json!(55),
                serde_json::json!("88"),
            ]),
            ncdb_user_id: Some(42),
        };

        let a = Actor::from_session(&raw);
        assert_eq!(a.id, "42");
        assert_eq!(a.email, "foo@bar.com");
        assert_eq!(a.role, Role::Manager);
        assert!(a.capabilities.contains(&Capability::RestaurantManageOwn));
        assert!(a.capabilities.contains(&Capability::MenuManage));
        assert!(a.assigned_restaurants.contains("55"));
        assert!(a.assigned_restaurants.contains("88"));

        let b = Actor::from_session(&raw);
        assert_eq!(a, b);
    }

    #[test]
    fn builder_never_fails_on_degenerate_input() {
        let a = Actor::from_session(&RawSession::default());
        assert_eq!(a.id, "unknown");
        assert_eq!(a.email, "unknown");
        assert_eq!(a.role, Role::Manager);

        let raw = RawSession {
            id: None,
            email: Some("Who@Example.org".to_string()),
            ..RawSession::default()
        };
        // id falls back to the normalized email
        assert_eq!(Actor::from_session(&raw).id, "who@example.org");
    }

    #[test]
    fn unknown_capability_strings_are_ignored() {
        let raw = RawSession {
            capabilities: Some(vec!["platform.superadmin!".to_string()]),
            ..RawSession::default()
        };
        let a = Actor::from_session(&raw);
        assert!(!a.capabilities.contains(&Capability::PlatformSuperadmin));
    }
}
