//! Language-model client for date/amount extraction.
//!
//! Sends the extracted receipt text inside a fixed instruction prompt to an
//! OpenAI-compatible chat-completions endpoint and parses the strict-JSON
//! reply. No retry at this layer; a timeout or connection failure is reported
//! to the orchestrator as-is.

use std::future::Future;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Instruction prompt for the extraction call. The receipt content is
/// appended between four backticks.
const PROMPT: &str = "\
Extrair de um dado texto, utilizando exclusivamente as informacoes que constam no \
texto fornecido, sem inventar, com o conteudo de comprovantes de pagamento. \
Siga as instrucoes abaixo:

1. Data do pagamento
2. Valor pago
3. Utilize a tecnica chain of thoughts reasoning
4. O conteudo do comprovante sera colocado entre quatro backticks
5. A resposta deve ser em formato JSON, com as chaves data_pagamento, contendo a data \
em formato 'yyyy-mm-dd', e valor_pagamento, contendo o valor pago em formato ponto \
flutuante. A resposta deve conter somente o JSON, mais nada.
6. Caso nao seja possivel extrair as informacoes, responda apenas 'erro'

Exemplo de resposta:

{
  \"data_pagamento\": \"2023-02-17\",
  \"valor_pagamento\": 10799.10
}

Conteudo do comprovante:
";

/// Receipt text beyond this many characters is truncated before the call.
const MAX_INPUT_CHARS: usize = 100_000;

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?is)<think>.*?</think>").unwrap();
    static ref JSON_FENCE: Regex = Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").unwrap();
}

/// Structured reply from the extraction call.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelReply {
    /// Payment date, expected as `YYYY-MM-DD`; validated downstream.
    #[serde(rename = "data_pagamento")]
    pub payment_date: String,
    /// Payment amount as a JSON number; validated downstream.
    #[serde(rename = "valor_pagamento")]
    pub amount: serde_json::Number,
}

/// Seam for the date/amount inference call, so the pipeline can be exercised
/// without a live endpoint.
pub trait InferDateAmount {
    fn infer(&self, text: &str) -> impl Future<Output = Result<ModelReply, LlmError>> + Send;
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct ModelClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ModelClient {
    /// Create a client with the configured endpoint, model, and hard timeout.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Unreachable(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn complete(&self, text: &str) -> Result<String, LlmError> {
        let context = build_context(text);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        info!(
            model = %self.config.model,
            timeout_s = self.config.timeout_seconds,
            context_chars = context.len(),
            "sending receipt text to LLM"
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &context,
            }],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Unreachable(format!("endpoint returned {}", status)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::MalformedResponse("empty completion".to_string()));
        }

        debug!(reply_chars = content.len(), "LLM reply received");
        Ok(content)
    }
}

impl InferDateAmount for ModelClient {
    async fn infer(&self, text: &str) -> Result<ModelReply, LlmError> {
        let raw = self.complete(text).await?;
        parse_reply(&raw)
    }
}

/// Assemble the full prompt context, truncating oversized receipt text.
fn build_context(text: &str) -> String {
    let text = if text.len() > MAX_INPUT_CHARS {
        warn!(chars = text.len(), "receipt text too long, truncating");
        let truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();
        truncated
    } else {
        text.to_string()
    };

    format!("{PROMPT}\n````\n{text}\n````\n")
}

/// Parse a raw completion into a [`ModelReply`].
///
/// Models wrap the JSON in reasoning blocks, markdown fences, or doubled
/// braces copied from the prompt examples; all of that is stripped first.
pub fn parse_reply(raw: &str) -> Result<ModelReply, LlmError> {
    let cleaned = THINK_BLOCK.replace_all(raw, "");
    let cleaned = cleaned
        .replace("{{", "{")
        .replace("}}", "}")
        .replace("\\\"", "\"")
        .replace("\\_", "_");

    let payload = match JSON_FENCE.captures(&cleaned) {
        Some(caps) => caps[1].to_string(),
        None => cleaned.trim().to_string(),
    };

    if payload.eq_ignore_ascii_case("erro") {
        return Err(LlmError::Refused);
    }

    serde_json::from_str(&payload).map_err(|e| LlmError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_json_reply() {
        let reply =
            parse_reply(r#"{"data_pagamento": "2023-02-17", "valor_pagamento": 107.10}"#).unwrap();
        assert_eq!(reply.payment_date, "2023-02-17");
        assert_eq!(reply.amount.to_string(), "107.1");
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "Here it is:\n```json\n{\"data_pagamento\": \"2020-08-20\", \"valor_pagamento\": 41.00}\n```\n";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.payment_date, "2020-08-20");
    }

    #[test]
    fn test_parse_strips_think_block() {
        let raw = "<think>the date is near the top\nand the amount below</think>\n{\"data_pagamento\": \"2023-01-05\", \"valor_pagamento\": 12.5}";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.payment_date, "2023-01-05");
    }

    #[test]
    fn test_parse_unwraps_doubled_braces() {
        let raw = r#"{{"data_pagamento": "2023-01-05", "valor_pagamento": 12.5}}"#;
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.payment_date, "2023-01-05");
    }

    #[test]
    fn test_erro_reply_is_refusal() {
        assert!(matches!(parse_reply("erro"), Err(LlmError::Refused)));
        assert!(matches!(parse_reply("  Erro  "), Err(LlmError::Refused)));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = parse_reply(r#"{"data_pagamento": "2023-02-17"}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_wrongly_typed_amount_is_malformed() {
        let err =
            parse_reply(r#"{"data_pagamento": "2023-02-17", "valor_pagamento": "caro"}"#)
                .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_non_json_reply_is_malformed() {
        let err = parse_reply("o valor pago foi R$ 107,10").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_context_embeds_text_between_backticks() {
        let context = build_context("conta de luz");
        assert!(context.contains("````\nconta de luz\n````"));
        assert!(context.starts_with("Extrair"));
    }

    #[test]
    fn test_context_truncates_oversized_text() {
        let long = "x".repeat(MAX_INPUT_CHARS + 10);
        let context = build_context(&long);
        assert!(context.len() < long.len() + PROMPT.len());
    }
}
