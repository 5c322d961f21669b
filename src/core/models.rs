use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "Pending",
            ImageStatus::Processing => "Processing",
            ImageStatus::Completed => "Completed",
            ImageStatus::Failed => "Failed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "Image is queued for analysis",
            ImageStatus::Processing => "Analysis in progress",
            ImageStatus::Completed => "Analysis finished",
            ImageStatus::Failed => "Analysis encountered an error",
        }
    }

    /// Completed and failed images never change again on the server.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageStatus::Completed | ImageStatus::Failed)
    }
}

fn unknown_file_name() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedImage {
    pub image_id: String,
    #[serde(default)]
    pub status: ImageStatus,
    #[serde(default = "unknown_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl TrackedImage {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        if self.created_at <= 0 {
            return None;
        }
        Utc.timestamp_opt(self.created_at, 0).single()
    }

    pub fn short_name(&self, max_len: usize) -> String {
        if self.file_name.chars().count() <= max_len {
            return self.file_name.clone();
        }
        let keep = max_len.saturating_sub(3);
        let truncated: String = self.file_name.chars().take(keep).collect();
        format!("{truncated}...")
    }
}

/// Observable state handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GalleryView {
    pub items: Vec<TrackedImage>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub delete_in_progress: bool,
    pub is_polling: bool,
}

impl GalleryView {
    pub fn has_non_terminal(&self) -> bool {
        self.items.iter().any(|item| !item.status.is_terminal())
    }

    pub fn find(&self, image_id: &str) -> Option<&TrackedImage> {
        self.items.iter().find(|item| item.image_id == image_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResults {
    pub image_id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub status: ImageStatus,
    #[serde(default = "unknown_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub results: AnalysisResults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub celebrities: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<AnalysisSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    #[serde(default)]
    pub top_labels: Vec<ScoredName>,
    #[serde(default)]
    pub is_safe: Option<bool>,
    #[serde(default)]
    pub moderation_issues: Vec<ScoredName>,
    #[serde(default)]
    pub face_count: Option<u32>,
    #[serde(default)]
    pub primary_emotion: Option<String>,
    #[serde(default)]
    pub age_range: Option<AgeRange>,
    #[serde(default)]
    pub celebrity_count: Option<u32>,
    #[serde(default)]
    pub recognized_celebrities: Vec<ScoredName>,
    #[serde(default)]
    pub has_text: Option<bool>,
    #[serde(default)]
    pub text_snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredName {
    pub name: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgeRange {
    pub low: u32,
    pub high: u32,
}
