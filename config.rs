use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PROMPT: &str = "Describe this image.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePaths {
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl StorePaths {
    /// Resolves the platform data directory for the backing document.
    pub fn discover() -> Result<Self> {
        let data_root = dirs::data_dir()
            .ok_or_else(|| Error::StoreInit("Failed to get app data dir".to_string()))?;
        let root = data_root.join("ImageTagger");
        Ok(Self {
            db_path: root.join("db.json"),
            root,
        })
    }
}

/// Connection settings for the remote captioning capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry that follows failed attempt `attempt` (1-based):
    /// `initial_delay * 2^(attempt - 1)`, jitter excluded.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Named prompt texts selectable from the UI. Unknown keys fall back to the
/// default prompt rather than failing the captioning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptCatalog {
    pub prompts: HashMap<String, String>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        let mut prompts = HashMap::new();
        prompts.insert("basic".to_string(), DEFAULT_PROMPT.to_string());
        prompts.insert(
            "detailed".to_string(),
            "Describe this image in detail, including subjects, setting and mood.".to_string(),
        );
        prompts.insert(
            "keywords".to_string(),
            "List the main subjects of this image as short keywords.".to_string(),
        );
        Self { prompts }
    }
}

impl PromptCatalog {
    pub fn resolve(&self, key: &str) -> &str {
        match self.prompts.get(key) {
            Some(text) => text,
            None => {
                log::warn!("Unknown prompt key '{key}', falling back to default prompt");
                DEFAULT_PROMPT
            }
        }
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.prompts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(8000));
    }

    #[test]
    fn unknown_prompt_key_falls_back() {
        let catalog = PromptCatalog::default();
        assert_eq!(catalog.resolve("basic"), DEFAULT_PROMPT);
        assert_eq!(catalog.resolve("no-such-key"), DEFAULT_PROMPT);
        assert!(catalog.resolve("detailed").contains("detail"));
    }
}
