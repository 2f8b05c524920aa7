//! QnA Maker runtime client: POST {host}/knowledgebases/{kbId}/generateAnswer.
//! The service scores answers 0–100; candidates are normalised to 0.0–1.0.

use crate::qna::{AnswerCandidate, AnswerProvider, QnaEndpoint, QnaError, QnaMetadata, QnaOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_TOP: u32 = 1;

/// Answer id the service uses for its "No good match found in KB." placeholder.
const NO_MATCH_ANSWER_ID: i64 = -1;

/// Client for a single QnA Maker knowledge base.
#[derive(Clone)]
pub struct QnaMakerClient {
    endpoint: QnaEndpoint,
    options: QnaOptions,
    client: reqwest::Client,
}

impl QnaMakerClient {
    /// Validates endpoint and options. The host's trailing `/` is dropped.
    pub fn new(endpoint: QnaEndpoint, options: QnaOptions) -> Result<Self, QnaError> {
        let host = endpoint.host.trim().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(QnaError::InvalidEndpoint("host is required".to_string()));
        }
        if endpoint.knowledge_base_id.trim().is_empty() {
            return Err(QnaError::InvalidEndpoint(
                "knowledge base id is required".to_string(),
            ));
        }
        if endpoint.endpoint_key.trim().is_empty() {
            return Err(QnaError::InvalidEndpoint("endpoint key is required".to_string()));
        }
        if !(0.0..=1.0).contains(&options.score_threshold) {
            return Err(QnaError::InvalidOptions(format!(
                "scoreThreshold must be between 0 and 1, got {}",
                options.score_threshold
            )));
        }
        if options.top < 1 {
            return Err(QnaError::InvalidOptions(
                "top must be an integer greater than 0".to_string(),
            ));
        }
        if options.timeout_ms == Some(0) {
            return Err(QnaError::InvalidOptions(
                "timeoutMs must be greater than 0 (omit it for no timeout)".to_string(),
            ));
        }
        Ok(Self {
            endpoint: QnaEndpoint {
                host,
                knowledge_base_id: endpoint.knowledge_base_id.trim().to_string(),
                endpoint_key: endpoint.endpoint_key.trim().to_string(),
            },
            options,
            client: reqwest::Client::new(),
        })
    }

    pub fn knowledge_base_id(&self) -> &str {
        &self.endpoint.knowledge_base_id
    }

    fn generate_answer_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/generateAnswer",
            self.endpoint.host, self.endpoint.knowledge_base_id
        )
    }

    /// v2/v3 hosts authenticate with the subscription key header; newer runtimes use EndpointKey.
    fn auth_header(&self) -> (&'static str, String) {
        let host = &self.endpoint.host;
        if host.ends_with("v2.0") || host.ends_with("v3.0") {
            ("Ocp-Apim-Subscription-Key", self.endpoint.endpoint_key.clone())
        } else {
            (
                "Authorization",
                format!("EndpointKey {}", self.endpoint.endpoint_key),
            )
        }
    }

    /// POST generateAnswer. Empty (after trim) questions return no answers without a request.
    pub async fn generate_answer(&self, question: &str) -> Result<Vec<AnswerCandidate>, QnaError> {
        let question = question.trim();
        if question.is_empty() {
            log::debug!("qna: empty question, skipping generateAnswer");
            return Ok(Vec::new());
        }
        let url = self.generate_answer_url();
        let body = GenerateAnswerRequest {
            question: question.to_string(),
            top: self.options.top,
            score_threshold: self.options.score_threshold * 100.0,
            strict_filters: self.options.strict_filters.clone(),
        };
        let (header, value) = self.auth_header();
        let mut req = self.client.post(&url).header(header, value).json(&body);
        if let Some(ms) = self.options.timeout_ms {
            req = req.timeout(Duration::from_millis(ms));
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(QnaError::Api(format!("{} {}", status, body)));
        }
        let data: GenerateAnswerResponse = res.json().await?;
        Ok(rank_answers(data.answers, &self.options))
    }
}

#[async_trait]
impl AnswerProvider for QnaMakerClient {
    async fn get_answers(&self, question: &str) -> Result<Vec<AnswerCandidate>, QnaError> {
        self.generate_answer(question).await
    }
}

/// Normalise scores, drop the no-match placeholder and anything under the threshold,
/// order best first, keep at most `top`.
fn rank_answers(answers: Vec<RawAnswer>, options: &QnaOptions) -> Vec<AnswerCandidate> {
    let mut out: Vec<AnswerCandidate> = answers
        .into_iter()
        .filter(|a| a.id != Some(NO_MATCH_ANSWER_ID))
        .map(|a| AnswerCandidate {
            answer: a.answer,
            score: a.score / 100.0,
            questions: a.questions,
            id: a.id,
            source: a.source,
            metadata: a.metadata,
        })
        .filter(|a| a.score >= options.score_threshold)
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out.truncate(options.top as usize);
    out
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAnswerRequest {
    question: String,
    top: u32,
    score_threshold: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    strict_filters: Vec<QnaMetadata>,
}

#[derive(Debug, Deserialize)]
struct GenerateAnswerResponse {
    #[serde(default)]
    answers: Vec<RawAnswer>,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    metadata: Vec<QnaMetadata>,
}
