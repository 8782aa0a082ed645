use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after,
    wait_with_backoff,
};
use super::{TextTranslator, TranslateFuture, non_empty};

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

/// Google Translate through the public `gtx` web client endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    source: String,
    target: String,
}

impl GoogleTranslator {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl TextTranslator for GoogleTranslator {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move { call_translate(self, text).await })
    }
}

fn base_url() -> String {
    std::env::var("GOOGLE_TRANSLATE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

async fn call_translate(translator: &GoogleTranslator, text: &str) -> Result<Option<String>> {
    let client = reqwest::Client::new();
    let url = reqwest::Url::parse_with_params(
        &format!("{}/translate_a/single", base_url()),
        &[
            ("client", "gtx"),
            ("sl", translator.source.as_str()),
            ("tl", translator.target.as_str()),
            ("dt", "t"),
            ("q", text),
        ],
    )
    .with_context(|| "failed to build Google Translate URL")?;

    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            return extract_google_translation(&body);
        }
        if is_rate_limited(status, &body) && attempt < RATE_LIMIT_MAX_RETRIES {
            delay = wait_with_backoff("Google Translate", attempt, delay, retry_after).await;
            continue;
        }
        return Err(anyhow!("Google Translate error ({}): {}", status, body.trim()));
    }
}

/// The response is a nested array whose first element lists
/// `[translated, original, ...]` segments.
pub(crate) fn extract_google_translation(payload: &str) -> Result<Option<String>> {
    let value: Value =
        serde_json::from_str(payload).with_context(|| "invalid Google Translate response")?;
    let Some(segments) = value.get(0).and_then(Value::as_array) else {
        return Ok(None);
    };
    let mut translated = String::new();
    for segment in segments {
        if let Some(part) = segment.get(0).and_then(Value::as_str) {
            translated.push_str(part);
        }
    }
    Ok(non_empty(translated))
}
