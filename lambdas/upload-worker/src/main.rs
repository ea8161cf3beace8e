use allerq_shared::AppState;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::sync::Arc;

use pipeline::{AiMenuParser, HttpTextExtractor};

mod pipeline;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let state = AppState::from_env()?;
    let extractor = Arc::new(HttpTextExtractor::new());
    let parser = Arc::new(AiMenuParser::from_env()?);

    run(service_fn(move |event: LambdaEvent<serde_json::Value>| {
        let state = Arc::clone(&state);
        let extractor = Arc::clone(&extractor);
        let parser = Arc::clone(&parser);
        async move {
            // Scheduled invocation; the payload carries no routing information.
            tracing::info!("Upload worker invoked: {}", event.context.request_id);
            let processed =
                pipeline::run_batch(&state, extractor.as_ref(), parser.as_ref()).await?;
            tracing::info!("Batch complete, {} uploads processed", processed);
            Ok::<(), Error>(())
        }
    }))
    .await
}
