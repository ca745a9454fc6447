use base64::Engine as _;
use rand::Rng;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::config::{CaptionConfig, RetryPolicy};
use crate::error::{Error, Result};

/// Image bytes prepared for the remote captioning capability.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub mime_type: &'static str,
    pub data_base64: String,
}

pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// The remote captioning capability: one image plus a prompt in, text out.
/// Implementations map their transport failures onto the crate's error
/// taxonomy (`Auth`, `RateLimited`, `Transient`, `MalformedResponse`).
pub trait CaptionProvider: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        payload: &ImagePayload,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Gemini `generateContent` over HTTP.
pub struct GeminiProvider {
    client: reqwest::Client,
    config: CaptionConfig,
}

impl GeminiProvider {
    pub fn new(config: CaptionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

impl CaptionProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, payload: &ImagePayload) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_key
        );
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": prompt},
                    {"inline_data": {"mime_type": payload.mime_type, "data": payload.data_base64}}
                ]
            }]
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::Auth(format!("{status}: {text}")),
                429 => Error::RateLimited(format!("{status}: {text}")),
                _ => Error::Transient(format!("{status}: {text}")),
            });
        }

        let value: serde_json::Value = resp.json().await.map_err(|e| Error::Transient(e.to_string()))?;
        match value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
        {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(Error::MalformedResponse),
        }
    }
}

/// Wraps a [`CaptionProvider`] with the bounded exponential-backoff retry
/// policy. Never touches the catalog store; persisting a successful caption
/// is the caller's job.
pub struct CaptionClient<P> {
    provider: P,
    retry: RetryPolicy,
}

impl<P: CaptionProvider> CaptionClient<P> {
    pub fn new(provider: P, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Reads and encodes the image, then calls the provider with up to
    /// `max_attempts` tries. An unsupported extension fails immediately with
    /// no file read and no network call; a credential rejection aborts the
    /// retry budget; an empty-text success is retried like a failure.
    pub async fn describe(&self, image_path: &Path, prompt: &str) -> Result<String> {
        let mime_type = mime_type_for(image_path).ok_or_else(|| {
            Error::UnsupportedType(
                image_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("(none)")
                    .to_string(),
            )
        })?;

        let bytes = tokio::fs::read(image_path).await?;
        let payload = ImagePayload {
            mime_type,
            data_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
        };

        for attempt in 1..=self.retry.max_attempts {
            let result = self
                .provider
                .generate(prompt, &payload)
                .await
                .and_then(|text| {
                    if text.trim().is_empty() {
                        Err(Error::MalformedResponse)
                    } else {
                        Ok(text)
                    }
                });

            match result {
                Ok(text) => {
                    log::info!("Caption received for {}", image_path.display());
                    return Ok(text);
                }
                Err(e) if !e.is_retryable() => {
                    log::error!("Caption failed for {}; not retrying: {e}", image_path.display());
                    return Err(e);
                }
                Err(e) => {
                    log::warn!(
                        "Caption attempt {attempt}/{} failed for {}: {e}",
                        self.retry.max_attempts,
                        image_path.display()
                    );
                    if attempt == self.retry.max_attempts {
                        return Err(Error::RemoteCallFailed(e.to_string()));
                    }
                    let jitter_ms =
                        rand::thread_rng().gen_range(0..=self.retry.max_jitter.as_millis() as u64);
                    let delay = self.retry.backoff_for(attempt) + Duration::from_millis(jitter_ms);
                    log::debug!("Retrying caption in {}ms", delay.as_millis());
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(Error::RemoteCallFailed("retry budget exhausted".to_string()))
    }
}
