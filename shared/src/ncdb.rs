use serde::{Deserialize, Serialize};

use crate::error::AppError;

// NCDB table names.
pub const T_USERS: &str = "users";
pub const T_RESTAURANTS: &str = "restaurants";
pub const T_MENUS: &str = "menus";
pub const T_MENU_ITEMS: &str = "menu_items";
pub const T_MENU_UPLOADS: &str = "menu_uploads";

#[derive(Debug, Clone)]
pub struct NcdbConfig {
    pub base_url: String,
    pub instance: String,
    pub secret_key: String,
}

/// Thin client for the hosted NoCodeBackend REST API. Every data operation
/// in the application is a call-through to this service; nothing is
/// persisted locally. No retry policy (deliberate, documented gap).
#[derive(Debug, Clone)]
pub struct NcdbClient {
    http: reqwest::Client,
    config: NcdbConfig,
}

#[derive(Debug, Deserialize)]
struct NcdbEnvelope {
    status: String,
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

impl NcdbClient {
    pub fn new(config: NcdbConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}?Instance={}",
            self.config.base_url.trim_end_matches('/'),
            path,
            self.config.instance
        )
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<NcdbEnvelope, AppError> {
        let response = request
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("NCDB request failed ({}): {}", context, e);
                AppError::Upstream(format!("{}: {}", context, e))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(NcdbEnvelope {
                status: "not_found".to_string(),
                data: Vec::new(),
                id: None,
                message: None,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("NCDB returned {} ({}): {}", status, context, body);
            return Err(AppError::Upstream(format!("{}: HTTP {}", context, status)));
        }

        let envelope: NcdbEnvelope = response.json().await.map_err(|e| {
            tracing::error!("NCDB response parse failed ({}): {}", context, e);
            AppError::Upstream(format!("{}: bad response", context))
        })?;

        if envelope.status != "success" {
            tracing::error!(
                "NCDB reported failure ({}): {}",
                context,
                envelope.message.as_deref().unwrap_or("no message")
            );
            return Err(AppError::Upstream(format!("{}: backend error", context)));
        }
        Ok(envelope)
    }

    /// Insert a record, returning the new id.
    pub async fn create<T: Serialize + ?Sized>(
        &self,
        table: &str,
        record: &T,
    ) -> Result<u64, AppError> {
        let context = format!("create {}", table);
        let request = self
            .http
            .post(self.url(&format!("create/{}", table)))
            .json(record);
        let envelope = self.execute(request, &context).await?;
        envelope
            .id
            .ok_or_else(|| AppError::Upstream(format!("{}: missing id", context)))
    }

    /// Fetch one record by id. `Ok(None)` when the backend has no such row.
    pub async fn read(
        &self,
        table: &str,
        id: u64,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let context = format!("read {}/{}", table, id);
        let request = self.http.get(self.url(&format!("read/{}/{}", table, id)));
        let envelope = self.execute(request, &context).await?;
        Ok(envelope.data.into_iter().next())
    }

    /// Search by exact-match filters, e.g. `{"restaurant_id": 7}`.
    pub async fn search(
        &self,
        table: &str,
        filters: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let context = format!("search {}", table);
        let request = self
            .http
            .post(self.url(&format!("search/{}", table)))
            .json(filters);
        let envelope = self.execute(request, &context).await?;
        Ok(envelope.data)
    }

    /// Partial update of one record.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        table: &str,
        id: u64,
        patch: &T,
    ) -> Result<(), AppError> {
        let context = format!("update {}/{}", table, id);
        let request = self
            .http
            .put(self.url(&format!("update/{}/{}", table, id)))
            .json(patch);
        self.execute(request, &context).await?;
        Ok(())
    }

    pub async fn delete(&self, table: &str, id: u64) -> Result<(), AppError> {
        let context = format!("delete {}/{}", table, id);
        let request = self
            .http
            .delete(self.url(&format!("delete/{}/{}", table, id)));
        self.execute(request, &context).await?;
        Ok(())
    }

    /// Fetch one record and decode it into a typed shape. `Ok(None)` covers
    /// both a missing row and a row this core cannot decode (the backend's
    /// schema is not ours to model fully).
    pub async fn read_as<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        id: u64,
    ) -> Result<Option<T>, AppError> {
        Ok(self
            .read(table, id)
            .await?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    /// Search and decode, skipping rows that do not decode.
    pub async fn search_as<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        filters: &serde_json::Value,
    ) -> Result<Vec<T>, AppError> {
        Ok(self
            .search(table, filters)
            .await?
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }
}
