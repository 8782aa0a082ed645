use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after,
    wait_with_backoff,
};
use super::{TextTranslator, TranslateFuture, non_empty};

const FREE_BASE_URL: &str = "https://api-free.deepl.com";
const PRO_BASE_URL: &str = "https://api.deepl.com";

#[derive(Debug, Clone)]
pub struct DeeplTranslator {
    key: String,
    source: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DeeplError {
    message: String,
}

impl DeeplTranslator {
    pub fn new(key: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    fn base_url(&self) -> String {
        if let Ok(url) = std::env::var("DEEPL_BASE_URL") {
            return url;
        }
        if self.key.ends_with(":fx") {
            FREE_BASE_URL.to_string()
        } else {
            PRO_BASE_URL.to_string()
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut body = json!({
            "text": [text],
            "target_lang": deepl_target_lang(&self.target),
        });
        if !self.source.eq_ignore_ascii_case("auto") {
            body["source_lang"] = json!(self.source.to_uppercase());
        }
        body
    }
}

impl TextTranslator for DeeplTranslator {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move { call_translate(self, text).await })
    }
}

async fn call_translate(translator: &DeeplTranslator, text: &str) -> Result<Option<String>> {
    let client = reqwest::Client::new();
    let url = format!("{}/v2/translate", translator.base_url());
    let body = translator.request_body(text);

    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = client
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", translator.key))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return extract_deepl_translation(&text);
        }
        if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
            delay = wait_with_backoff("DeepL", attempt, delay, retry_after).await;
            continue;
        }
        return Err(anyhow!(
            "DeepL API error ({}): {}",
            status,
            extract_deepl_error(&text).unwrap_or(text)
        ));
    }
}

/// DeepL wants a regional variant for some targets.
fn deepl_target_lang(target: &str) -> String {
    match target.to_lowercase().as_str() {
        "en" => "EN-US".to_string(),
        "pt" => "PT-BR".to_string(),
        other => other.to_uppercase(),
    }
}

pub(crate) fn extract_deepl_translation(payload: &str) -> Result<Option<String>> {
    let response: DeeplResponse =
        serde_json::from_str(payload).with_context(|| "invalid DeepL response")?;
    Ok(response
        .translations
        .into_iter()
        .next()
        .and_then(|translation| non_empty(translation.text)))
}

fn extract_deepl_error(payload: &str) -> Option<String> {
    serde_json::from_str::<DeeplError>(payload)
        .ok()
        .map(|error| error.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_env_var;

    #[test]
    fn picks_endpoint_from_key() {
        with_env_var("DEEPL_BASE_URL", None, || {
            assert_eq!(DeeplTranslator::new("k:fx", "ja", "en").base_url(), FREE_BASE_URL);
            assert_eq!(DeeplTranslator::new("k", "ja", "en").base_url(), PRO_BASE_URL);
        });
        with_env_var("DEEPL_BASE_URL", Some("http://127.0.0.1:9"), || {
            assert_eq!(
                DeeplTranslator::new("k", "ja", "en").base_url(),
                "http://127.0.0.1:9"
            );
        });
    }

    #[test]
    fn builds_request_body() {
        let translator = DeeplTranslator::new("k:fx", "ja", "en");
        let body = translator.request_body("wait");
        insta::assert_json_snapshot!(body, @r#"
        {
          "source_lang": "JA",
          "target_lang": "EN-US",
          "text": [
            "wait"
          ]
        }
        "#);
        let auto = DeeplTranslator::new("k", "auto", "de").request_body("x");
        assert!(auto.get("source_lang").is_none());
        assert_eq!(auto["target_lang"], "DE");
    }

    #[test]
    fn extracts_first_translation() {
        let payload = r#"{"translations":[{"detected_source_language":"JA","text":"Wait!"}]}"#;
        assert_eq!(
            extract_deepl_translation(payload).unwrap(),
            Some("Wait!".to_string())
        );
        assert_eq!(
            extract_deepl_translation(r#"{"translations":[]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn extracts_error_message() {
        assert_eq!(
            extract_deepl_error(r#"{"message":"Wrong endpoint"}"#),
            Some("Wrong endpoint".to_string())
        );
        assert_eq!(extract_deepl_error("oops"), None);
    }
}
