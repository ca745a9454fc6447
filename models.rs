use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// One cataloged image. The only entity persisted in the backing document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "folderName", default)]
    pub folder_name: String,
    pub last_updated: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(path: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path: path.to_string(),
            description: String::new(),
            tags: Vec::new(),
            folder_name: folder_name_for(path),
            last_updated: Utc::now(),
        }
    }

    /// Fills in fields that older documents may lack and re-normalizes tags.
    pub fn migrate(&mut self) {
        self.tags = normalize_tags(self.tags.iter().map(|t| t.as_str()));
        if self.folder_name.is_empty() {
            self.folder_name = folder_name_for(&self.path);
        }
    }
}

/// The full backing document: `{"images": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogDocument {
    #[serde(default)]
    pub images: Vec<ImageRecord>,
}

/// Base name of the containing directory, for display only.
pub fn folder_name_for(path: &str) -> String {
    if path.is_empty() {
        return "Unknown".to_string();
    }
    // Paths may come from another platform; treat backslashes as separators.
    let normalized = path.replace('\\', "/");
    Path::new(&normalized)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Trim, lowercase, drop empties, dedupe keeping first occurrence.
pub fn normalize_tags<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        out.push(tag);
    }
    out
}

/// Tag edits arrive either as free text from a single input field or as an
/// already-split list from the UI's tag chips.
#[derive(Debug, Clone)]
pub enum TagsInput {
    Text(String),
    List(Vec<String>),
}

impl TagsInput {
    pub fn normalize(&self) -> Vec<String> {
        match self {
            TagsInput::Text(text) => normalize_tags(text.split(',')),
            TagsInput::List(items) => normalize_tags(items.iter().map(|t| t.as_str())),
        }
    }
}

impl From<&str> for TagsInput {
    fn from(text: &str) -> Self {
        TagsInput::Text(text.to_string())
    }
}

impl From<Vec<String>> for TagsInput {
    fn from(items: Vec<String>) -> Self {
        TagsInput::List(items)
    }
}

/// Outcome of a mutating call made against an optimistic local edit. On
/// `Reverted` the caller must overwrite its local value with `record`, the
/// confirmed state re-fetched from the store (`None` if the record vanished).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied { record: ImageRecord },
    Reverted { record: Option<ImageRecord>, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub message: String,
}

/// Aggregate result of a sequential captioning batch.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}
