//! Type definitions for document ingestion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Curriculum topic a document (and every question derived from it) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Length,
    Area,
    Capacity,
    Weight,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Length => "length",
            Topic::Area => "area",
            Topic::Capacity => "capacity",
            Topic::Weight => "weight",
        }
    }
}

impl std::str::FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "length" => Ok(Topic::Length),
            "area" => Ok(Topic::Area),
            "capacity" => Ok(Topic::Capacity),
            "weight" => Ok(Topic::Weight),
            other => Err(format!("unknown topic: {other}")),
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// MIME types recognized by the ingestor; MIME is authoritative, extension is a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentMime {
    PlainText,
    Pdf,
    Docx,
}

impl DocumentMime {
    pub fn from_mime_str(mime: &str) -> Option<Self> {
        match mime {
            "text/plain" => Some(DocumentMime::PlainText),
            "application/pdf" => Some(DocumentMime::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(DocumentMime::Docx)
            }
            _ => None,
        }
    }

    /// Fall back to sniffing a recognized extension when the MIME type itself is unrecognized
    pub fn from_extension_hint(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?.to_lowercase();
        match ext.as_str() {
            "txt" => Some(DocumentMime::PlainText),
            "pdf" => Some(DocumentMime::Pdf),
            "docx" => Some(DocumentMime::Docx),
            _ => None,
        }
    }
}

/// An uploaded curriculum artifact
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub topic: Topic,
    pub grade_levels: Vec<i32>,
    pub uploader: String,
    pub upload_time: DateTime<Utc>,
    pub status: DocumentStatus,
    pub chunk_count: usize,
}

impl Document {
    pub fn new(title: String, topic: Topic, grade_levels: Vec<i32>, uploader: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            topic,
            grade_levels,
            uploader,
            upload_time: Utc::now(),
            status: DocumentStatus::Pending,
            chunk_count: 0,
        }
    }
}

/// A contiguous, immutable text span derived from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub sequence: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// Outcome of a successful or failed ingest call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub status: DocumentStatus,
    pub chunk_count: usize,
}
