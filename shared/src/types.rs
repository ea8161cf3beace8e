use serde::{Deserialize, Serialize};

/// Append-only activity log cap per upload; oldest entries drop first.
pub const ACTIVITY_LOG_CAP: usize = 50;

// ========== RESTAURANT ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Restaurant {
    pub id: u64,
    pub name: String,
    /// Owner reference as stored upstream; string or number on the wire.
    #[serde(default, deserialize_with = "de_opt_scalar_string")]
    pub owner_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRestaurantRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

// ========== MENU ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Menu {
    pub id: u64,
    pub restaurant_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMenuRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMenuRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

// ========== MENU ITEM ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MenuItem {
    pub id: u64,
    pub menu_id: u64,
    #[serde(default)]
    pub restaurant_id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Allergen labels pass through as free strings; the vocabulary is not
    /// enforced here.
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub state: Option<String>, // active | candidate
    #[serde(default)]
    pub upload_id: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMenuItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMenuItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub allergens: Option<Vec<String>>,
}

// ========== MENU UPLOAD ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    NeedsReview,
    Promoted,
    Discarded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::NeedsReview => "needs_review",
            UploadStatus::Promoted => "promoted",
            UploadStatus::Discarded => "discarded",
            UploadStatus::Failed => "failed",
        }
    }

    /// Legal transitions of the upload state machine:
    /// pending → processing → {needs_review | failed},
    /// needs_review → {promoted | discarded}.
    pub fn can_transition(self, to: UploadStatus) -> bool {
        matches!(
            (self, to),
            (UploadStatus::Pending, UploadStatus::Processing)
                | (UploadStatus::Processing, UploadStatus::NeedsReview)
                | (UploadStatus::Processing, UploadStatus::Failed)
                | (UploadStatus::NeedsReview, UploadStatus::Promoted)
                | (UploadStatus::NeedsReview, UploadStatus::Discarded)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActivityEntry {
    pub at: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MenuUpload {
    pub id: u64,
    pub restaurant_id: u64,
    /// Menu the parsed candidate items will attach to.
    pub menu_id: u64,
    pub status: UploadStatus,
    pub source_url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    /// JSON-encoded `Vec<ActivityEntry>` as stored upstream.
    #[serde(default)]
    pub activity_log: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl MenuUpload {
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.activity_log
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub source_url: String,
    pub content_type: Option<String>,
    pub menu_id: u64,
}

/// Append an entry, dropping oldest entries past the cap.
pub fn push_activity(log: &mut Vec<ActivityEntry>, entry: ActivityEntry) {
    log.push(entry);
    if log.len() > ACTIVITY_LOG_CAP {
        let excess = log.len() - ACTIVITY_LOG_CAP;
        log.drain(..excess);
    }
}

// ========== USER (NCDB record, auth-relevant fields only) ==========
#[derive(Debug, Deserialize, Clone)]
pub struct UserRecord {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub assigned_restaurants: Option<Vec<serde_json::Value>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn de_opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_id_accepts_string_or_number() {
        let from_number: Restaurant =
            serde_json::from_value(serde_json::json!({"id": 1, "name": "A", "owner_id": 42}))
                .unwrap();
        assert_eq!(from_number.owner_id.as_deref(), Some("42"));

        let from_string: Restaurant = serde_json::from_value(
            serde_json::json!({"id": 1, "name": "A", "owner_id": "owner@x.com"}),
        )
        .unwrap();
        assert_eq!(from_string.owner_id.as_deref(), Some("owner@x.com"));

        let absent: Restaurant =
            serde_json::from_value(serde_json::json!({"id": 1, "name": "A"})).unwrap();
        assert_eq!(absent.owner_id, None);
        assert!(absent.is_active);
    }

    #[test]
    fn upload_state_machine_legality() {
        use UploadStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(NeedsReview));
        assert!(Processing.can_transition(Failed));
        assert!(NeedsReview.can_transition(Promoted));
        assert!(NeedsReview.can_transition(Discarded));

        assert!(!Pending.can_transition(NeedsReview));
        assert!(!Promoted.can_transition(Pending));
        assert!(!Failed.can_transition(Processing));
        assert!(!Discarded.can_transition(Promoted));
    }

    #[test]
    fn activity_log_caps_at_fifty_dropping_oldest() {
        let mut log = Vec::new();
        for i in 0..60 {
            push_activity(
                &mut log,
                ActivityEntry {
                    at: format!("t{}", i),
                    event: format!("e{}", i),
                    detail: None,
                },
            );
        }
        assert_eq!(log.len(), ACTIVITY_LOG_CAP);
        assert_eq!(log.first().unwrap().event, "e10");
        assert_eq!(log.last().unwrap().event, "e59");
    }

    #[test]
    fn upload_status_wire_form_is_snake_case() {
        assert_eq!(
            serde_json::to_value(UploadStatus::NeedsReview).unwrap(),
            serde_json::json!("needs_review")
        );
        let parsed: UploadStatus = serde_json::from_value(serde_json::json!("failed")).unwrap();
        assert_eq!(parsed, UploadStatus::Failed);
    }
}
