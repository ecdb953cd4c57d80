//! Shared `async-openai` client setup for the OpenAI-compatible adapters.

use async_openai::{Client, config::OpenAIConfig};
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;

/// Build a client against `base_url` (e.g. `https://api.openai.com/v1`).
///
/// Retries are disabled: provider failures surface on the first attempt.
pub(crate) fn build_client(base_url: &str, api_key: Option<&str>) -> Client<OpenAIConfig> {
    let mut config = OpenAIConfig::new().with_api_base(base_url.trim_end_matches('/'));
    if let Some(key) = api_key {
        config = config.with_api_key(key);
    }
    let no_retry = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build();
    Client::with_config(config).with_backoff(no_retry)
}
