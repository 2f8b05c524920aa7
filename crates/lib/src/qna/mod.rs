//! Answer providers: the trait the relay queries, and a QnA Maker client.
//!
//! A provider turns a question into an ordered (best first) list of scored answers.

mod maker;

pub use maker::{QnaMakerClient, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Name/value metadata pair attached to a knowledge base entry (also used for strict filters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QnaMetadata {
    pub name: String,
    pub value: String,
}

/// One scored answer for a question. `score` is normalised to 0.0–1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    pub answer: String,
    pub score: f32,
    /// Knowledge base questions this answer is stored under.
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Vec<QnaMetadata>,
}

impl AnswerCandidate {
    pub fn new(answer: impl Into<String>, score: f32) -> Self {
        Self {
            answer: answer.into(),
            score,
            questions: Vec::new(),
            id: None,
            source: None,
            metadata: Vec::new(),
        }
    }
}

/// Knowledge base coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QnaEndpoint {
    pub host: String,
    pub knowledge_base_id: String,
    pub endpoint_key: String,
}

/// Query options sent with every question.
#[derive(Debug, Clone, PartialEq)]
pub struct QnaOptions {
    /// Minimum normalised score (0.0–1.0).
    pub score_threshold: f32,
    /// Maximum number of answers returned.
    pub top: u32,
    pub strict_filters: Vec<QnaMetadata>,
    pub timeout_ms: Option<u64>,
}

impl Default for QnaOptions {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            top: DEFAULT_TOP,
            strict_filters: Vec::new(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QnaError {
    #[error("qna request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("qna api error: {0}")]
    Api(String),
    #[error("invalid qna endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid qna options: {0}")]
    InvalidOptions(String),
}

/// Source of ranked answers for a question.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Answers for `question`, best first. Empty when nothing matched.
    async fn get_answers(&self, question: &str) -> Result<Vec<AnswerCandidate>, QnaError>;
}
