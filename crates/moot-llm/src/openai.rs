use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use moot_core::config::ModelConfig;
use moot_core::error::{MootError, Result};
use moot_core::traits::Generator;
use moot_core::types::{GenerationRequest, ResponseFormat};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat completions client.
///
/// Prose turns use the primary model; JSON decisions use the structured model
/// and request a JSON object response.
pub struct OpenAiGenerator {
    http: Client,
    text_model: ModelConfig,
    structured_model: ModelConfig,
}

impl OpenAiGenerator {
    pub fn new(text_model: ModelConfig, structured_model: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            text_model,
            structured_model,
        }
    }

    fn model_for(&self, format: ResponseFormat) -> &ModelConfig {
        match format {
            ResponseFormat::Text => &self.text_model,
            ResponseFormat::Json => &self.structured_model,
        }
    }
}

// Request types
#[derive(Serialize, Debug)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OaiResponseFormat>,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiResponseFormat {
    r#type: &'static str,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn build_request(config: &ModelConfig, request: &GenerationRequest) -> ChatRequest {
    let mut system = format!(
        "You are {} in a simulated criminal trial. Reply only with what {} says next, without stage directions.\n\n{}",
        request.speaker, request.speaker, request.instruction
    );
    if request.format == ResponseFormat::Json {
        system.push_str("\n\nRespond with a single JSON object and nothing else.");
    }

    let record = if request.transcript.is_empty() {
        "(the hearing has not started yet)".to_string()
    } else {
        request
            .transcript
            .iter()
            .map(|u| format!("{}: {}", u.speaker, u.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    ChatRequest {
        model: config.model_id.clone(),
        messages: vec![
            OaiMessage {
                role: "system",
                content: system,
            },
            OaiMessage {
                role: "user",
                content: format!("Court record so far:\n{}", record),
            },
        ],
        max_tokens: config.max_tokens,
        temperature: if config.temperature > 0.0 {
            Some(config.temperature)
        } else {
            None
        },
        response_format: match request.format {
            ResponseFormat::Json => Some(OaiResponseFormat {
                r#type: "json_object",
            }),
            ResponseFormat::Text => None,
        },
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> MootError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        MootError::RateLimited(format!("HTTP {}: {}", status, body))
    } else {
        MootError::Generation(format!("HTTP {}: {}", status, body))
    }
}

pub(crate) fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| MootError::GenerationParse(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(MootError::GenerationParse(
            "response contained no message content".into(),
        ));
    }
    Ok(content)
}

impl Generator for OpenAiGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let config = self.model_for(request.format);
            let url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let body = build_request(config, &request);

            debug!(step = %request.step, model = %config.model_id, "Sending generation request");

            let mut req = self.http.post(url).json(&body);
            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| MootError::Generation(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| MootError::Generation(e.to_string()))?;

            if !status.is_success() {
                return Err(classify_status(status, &text));
            }

            parse_response(&text)
        })
    }
}
