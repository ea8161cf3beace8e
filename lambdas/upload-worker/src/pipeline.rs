use allerq_shared::error::AppError;
use allerq_shared::ncdb::{T_MENU_ITEMS, T_MENU_UPLOADS};
use allerq_shared::types::{MenuUpload, UploadStatus};
use allerq_shared::uploads::transition_upload;
use allerq_shared::AppState;
use serde::Deserialize;

/// One parsed menu line from an upload document.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

/// Pulls the raw document text for an upload.
#[allow(async_fn_in_trait)]
pub trait TextExtractor {
    async fn extract(&self, upload: &MenuUpload) -> Result<String, AppError>;
}

/// Turns document text into candidate menu items.
#[allow(async_fn_in_trait)]
pub trait MenuParser {
    async fn parse(&self, text: &str) -> Result<Vec<CandidateItem>, AppError>;
}

/// Fetches `source_url` over HTTP and accepts text-like documents.
pub struct HttpTextExtractor {
    http: reqwest::Client,
}

impl HttpTextExtractor {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, upload: &MenuUpload) -> Result<String, AppError> {
        let response = self
            .http
            .get(&upload.source_url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("fetching {}: {}", upload.source_url, e)))?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "fetching {} returned {}",
                upload.source_url,
                response.status()
            )));
        }

        let served_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let declared_ok = upload.content_type.as_deref().is_some_and(is_text_like);
        if !is_text_like(&served_type) && !declared_ok {
            return Err(AppError::ValidationFailed(format!(
                "Unsupported document content type: {}",
                served_type
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("reading {}: {}", upload.source_url, e)))?;
        if text.trim().is_empty() {
            return Err(AppError::ValidationFailed(
                "Document contains no text".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Content types the extractor will hand to the parser.
fn is_text_like(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence == "application/json"
        || essence == "application/xml"
}

/// Sends document text to the external parser endpoint.
pub struct AiMenuParser {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl AiMenuParser {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: std::env::var("MENU_PARSER_URL")
                .map_err(|_| anyhow::anyhow!("MENU_PARSER_URL must be set"))?,
            api_key: std::env::var("MENU_PARSER_API_KEY")
                .map_err(|_| anyhow::anyhow!("MENU_PARSER_API_KEY must be set"))?,
        })
    }
}

#[derive(Deserialize)]
struct ParserResponse {
    #[serde(default)]
    items: Vec<CandidateItem>,
}

impl MenuParser for AiMenuParser {
    async fn parse(&self, text: &str) -> Result<Vec<CandidateItem>, AppError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("menu parser request: {}", e)))?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "menu parser returned {}",
                response.status()
            )));
        }
        let parsed: ParserResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("menu parser response: {}", e)))?;
        Ok(parsed.items)
    }
}

/// Process every pending upload in sequence. A failure on one upload marks
/// it failed, pings the ops webhook, and moves on; only failure to list the
/// pending set fails the invocation.
pub async fn run_batch<E, P>(
    state: &AppState,
    extractor: &E,
    parser: &P,
) -> Result<usize, AppError>
where
    E: TextExtractor,
    P: MenuParser,
{
    let pending: Vec<MenuUpload> = state
        .ncdb
        .search_as(
            T_MENU_UPLOADS,
            &serde_json::json!({ "status": UploadStatus::Pending.as_str() }),
        )
        .await?;
    tracing::info!("{} pending uploads", pending.len());

    let mut processed = 0;
    for upload in pending {
        match process_upload(state, extractor, parser, &upload).await {
            Ok(count) => {
                tracing::info!("Upload {} produced {} candidate items", upload.id, count);
                processed += 1;
            }
            Err(e) => {
                tracing::error!("Upload {} failed: {:?}", upload.id, e);
                mark_failed(state, upload.id, &e).await;
                if let Some(notifier) = &state.notifier {
                    notifier
                        .notify(&format!(
                            "Menu upload {} failed: {}",
                            upload.id,
                            e.public_message()
                        ))
                        .await;
                }
            }
        }
    }
    Ok(processed)
}

async fn process_upload<E, P>(
    state: &AppState,
    extractor: &E,
    parser: &P,
    upload: &MenuUpload,
) -> Result<usize, AppError>
where
    E: TextExtractor,
    P: MenuParser,
{
    transition_upload(state, upload, UploadStatus::Processing, None).await?;
    let current = refresh(state, upload.id).await?;

    let text = extractor.extract(&current).await?;
    state
        .ncdb
        .update(
            T_MENU_UPLOADS,
            current.id,
            &serde_json::json!({ "extracted_text": text }),
        )
        .await?;

    let candidates = parser.parse(&text).await?;
    for item in &candidates {
        state
            .ncdb
            .create(
                T_MENU_ITEMS,
                &serde_json::json!({
                    "menu_id": current.menu_id,
                    "restaurant_id": current.restaurant_id,
                    "name": item.name,
                    "description": item.description,
                    "price": item.price,
                    "allergens": item.allergens,
                    "state": "candidate",
                    "upload_id": current.id,
                    "created_at": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await?;
    }

    let current = refresh(state, upload.id).await?;
    transition_upload(
        state,
        &current,
        UploadStatus::NeedsReview,
        Some(format!("{} candidate items", candidates.len())),
    )
    .await?;
    Ok(candidates.len())
}

/// Re-read the upload so transitions append to the stored activity log
/// rather than a stale copy.
async fn refresh(state: &AppState, upload_id: u64) -> Result<MenuUpload, AppError> {
    state
        .ncdb
        .read_as(T_MENU_UPLOADS, upload_id)
        .await?
        .ok_or(AppError::ResourceNotFound("Upload"))
}

async fn mark_failed(state: &AppState, upload_id: u64, cause: &AppError) {
    let fresh = match state.ncdb.read_as::<MenuUpload>(T_MENU_UPLOADS, upload_id).await {
        Ok(Some(fresh)) => fresh,
        Ok(None) => {
            tracing::error!("Upload {} vanished while marking failed", upload_id);
            return;
        }
        Err(e) => {
            tracing::error!("Could not re-read upload {}: {:?}", upload_id, e);
            return;
        }
    };
    if let Err(e) = transition_upload(
        state,
        &fresh,
        UploadStatus::Failed,
        Some(cause.public_message()),
    )
    .await
    {
        tracing::error!("Could not mark upload {} failed: {:?}", upload_id, e);
    }
}
