//! Answer generation backend abstraction and HTTP client.
//!
//! The contract is text-in/text-out: `(query, context, history) -> answer`.
//! The query engine owns fallback behavior when generation fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use std::time::Duration;

use crate::error::GenerationError;
use crate::models::{ChatRole, ChatTurn, GenerationConfig};
use crate::services::normalize::contains_hangul;
use crate::utils::retry::{RetryConfig, with_retry};

/// Replaceable generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate an answer from the question, an assembled context block, and
    /// prior conversation turns.
    async fn generate(
        &self,
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String, GenerationError>;

    /// Model identifier, recorded in export manifests.
    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// HTTP generation client against an Ollama-style `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl HttpGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retry: RetryConfig::default(),
        })
    }

    async fn generate_once(&self, prompt: String) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::RequestError(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(GenerationError::ServerError(format!(
                "generate request failed with status: {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let answer = parsed.response.trim().to_string();
        if answer.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "backend returned an empty answer".to_string(),
            ));
        }

        Ok(answer)
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn generate(
        &self,
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(question, context, history);
        with_retry(&self.retry, || self.generate_once(prompt.clone()))
            .await
            .into_result()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Assemble the language-matched prompt. The instructions tell the model to
/// prefer the explicit `metadata:` lines over free text for numeric answers
/// and to aggregate across all provided documents when asked for totals.
pub fn build_prompt(question: &str, context: &str, history: &[ChatTurn]) -> String {
    let korean = contains_hangul(question);

    let mut conv = String::new();
    for turn in history.iter().rev().take(4).rev() {
        let role = match (turn.role, korean) {
            (ChatRole::User, true) => "사용자",
            (ChatRole::Assistant, true) => "어시스턴트",
            (ChatRole::User, false) => "User",
            (ChatRole::Assistant, false) => "Assistant",
        };
        let content: String = turn.content.chars().take(150).collect();
        writeln!(conv, "{}: {}", role, content).unwrap();
    }

    let mut prompt = String::new();
    if korean {
        prompt.push_str(
            "당신은 한국어로 대화하는 문서 분석 어시스턴트입니다.\n\n\
             규칙:\n\
             - 반드시 한국어로만 답변하세요\n\
             - 금액 질문에는 본문보다 metadata: 줄의 값을 우선 사용하세요\n\
             - \"총\", \"전체\", \"모두\" 같은 단어가 있으면 관련된 모든 문서를 합산하세요\n\
             - 실제 파일명을 사용하세요\n\
             - 문서에 없는 정보는 추측하지 마세요\n\n",
        );
        if !conv.is_empty() {
            writeln!(prompt, "이전 대화:\n{}", conv).unwrap();
        }
        writeln!(prompt, "관련 문서:\n{}", context).unwrap();
        writeln!(prompt, "\n질문: {}\n\n답변:", question).unwrap();
    } else {
        prompt.push_str(
            "You are a document analysis assistant.\n\n\
             Rules:\n\
             - Answer ONLY in English\n\
             - For amounts, prefer the values on metadata: lines over free text\n\
             - If the question asks for a total or sum, aggregate across ALL provided documents\n\
             - Use actual filenames, not placeholders\n\
             - Do not guess information that is not in the documents\n\n",
        );
        if !conv.is_empty() {
            writeln!(prompt, "Previous conversation:\n{}", conv).unwrap();
        }
        writeln!(prompt, "Relevant documents:\n{}", context).unwrap();
        writeln!(prompt, "\nQuestion: {}\n\nAnswer:", question).unwrap();
    }

    prompt
}
