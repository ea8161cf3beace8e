/// Chat-ops webhook reporter. Failures to notify are logged and swallowed;
/// a broken webhook must never take a request or a worker batch down.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
        }
    }

    pub async fn notify(&self, text: &str) {
        let payload = serde_json::json!({ "text": text });
        match self.http.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::error!(
                    "Ops webhook returned {}: {}",
                    response.status(),
                    text
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Failed to send ops notification: {}", e);
            }
        }
    }
}
