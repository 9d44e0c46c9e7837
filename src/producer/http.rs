//! HTTP design producer for OpenAI-compatible chat completion APIs.
//!
//! Sends a templated prompt describing the request and parses the model's
//! JSON reply into a structured design. Every transport or parse problem
//! surfaces as a `ProducerError`; wrapped in
//! [`super::ResilientProducer`], those errors become fallback designs
//! instead of pipeline failures.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::design::ArchitectureDesign;
use crate::utils::json_extraction::extract_json_object;

use super::{DesignProducer, ProducedDesign, ProducerError, ProducerInput};

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "anthropic/claude-opus-4.5";

/// Request timeout for completion calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// System prompt establishing the output contract.
const SYSTEM_PROMPT: &str = "You are a software architect. Reply with a single JSON object and \
nothing else. The object must have keys: components (array of {name, description, technology?}), \
data_stores (array of {name, engine, purpose}), apis (array of {name, protocol, description}), \
security_notes (array of strings), scaling_notes (array of strings), cloud_provider (string or \
null), architecture_style (string or null), diagram_source (Mermaid flowchart string).";

/// User prompt template rendered per request.
const USER_PROMPT_TEMPLATE: &str = "\
{% if refinement %}Refine the following architecture.\n\
Prior design (JSON): {{ prior_design }}\n\
Change request: {{ instruction }}\n\
{% else %}Design a software architecture.\n\
{% endif %}\
Input ({{ input_kind }}): {{ content }}\n\
Target scale: {{ scale_profile }}\n\
Detail level: {{ detail_level }}\n\
{% if must_use %}Must use: {{ must_use }}\n{% endif %}\
{% if avoid %}Must avoid: {{ avoid }}\n{% endif %}\
{% if preferred_language %}Preferred language: {{ preferred_language }}\n{% endif %}\
{% if enhancements %}Also apply: {{ enhancements }}\n{% endif %}";

/// Configuration for the HTTP producer.
#[derive(Debug, Clone)]
pub struct HttpProducerConfig {
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl HttpProducerConfig {
    /// Creates a configuration with the default model and temperature.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
        }
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Reads configuration from environment variables.
    ///
    /// - `ARCHFORGE_LLM_API_BASE`: base URL (required)
    /// - `ARCHFORGE_LLM_API_KEY`: bearer token (optional)
    /// - `ARCHFORGE_LLM_MODEL`: model identifier (optional)
    ///
    /// # Errors
    ///
    /// Returns `ProducerError::MissingApiBase` if the base URL is not set.
    pub fn from_env() -> Result<Self, ProducerError> {
        let api_base =
            env::var("ARCHFORGE_LLM_API_BASE").map_err(|_| ProducerError::MissingApiBase)?;
        let api_key = env::var("ARCHFORGE_LLM_API_KEY").ok();
        let model = env::var("ARCHFORGE_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            api_base,
            api_key,
            model,
            temperature: 0.2,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// The JSON shape the model is asked to return.
#[derive(Debug, Deserialize)]
struct ProducedWire {
    #[serde(flatten)]
    design: ArchitectureDesign,
    #[serde(default)]
    diagram_source: String,
}

/// Design producer backed by an OpenAI-compatible chat API.
pub struct HttpDesignProducer {
    config: HttpProducerConfig,
    http_client: Client,
}

impl HttpDesignProducer {
    /// Creates a producer with the given configuration.
    pub fn new(config: HttpProducerConfig) -> Result<Self, ProducerError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProducerError::RequestFailed(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Creates a producer from environment variables.
    pub fn from_env() -> Result<Self, ProducerError> {
        Self::new(HttpProducerConfig::from_env()?)
    }

    /// Renders the user prompt for an input.
    fn render_prompt(&self, input: &ProducerInput) -> Result<String, ProducerError> {
        let mut context = Context::new();
        context.insert("input_kind", input.input_kind.as_str());
        context.insert("content", &input.content);
        context.insert("scale_profile", input.scale_profile.as_str());
        context.insert("detail_level", input.detail_level.as_str());
        context.insert("must_use", &input.constraints.must_use.join(", "));
        context.insert("avoid", &input.constraints.avoid.join(", "));
        context.insert(
            "preferred_language",
            input.constraints.preferred_language.as_deref().unwrap_or(""),
        );
        context.insert("enhancements", &input.enhancements.join(", "));

        match &input.refinement {
            Some(refinement) => {
                let prior = serde_json::to_string(&refinement.prior_design)
                    .map_err(|e| ProducerError::ParseError(e.to_string()))?;
                context.insert("refinement", &true);
                context.insert("instruction", &refinement.instruction);
                context.insert("prior_design", &prior);
            }
            None => {
                context.insert("refinement", &false);
            }
        }

        Ok(Tera::one_off(USER_PROMPT_TEMPLATE, &context, false)?)
    }

    /// Parses the completion body into a produced design.
    fn parse_response(&self, content: &str) -> Result<ProducedDesign, ProducerError> {
        let json = extract_json_object(content)
            .map_err(|e| ProducerError::ParseError(e.to_string()))?;

        let wire: ProducedWire = serde_json::from_str(&json)
            .map_err(|e| ProducerError::ParseError(e.to_string()))?;

        if !wire.design.has_components() {
            return Err(ProducerError::InvalidOutput(
                "components array is empty".to_string(),
            ));
        }

        let diagram_source = if wire.diagram_source.trim().is_empty() {
            super::fallback::render_diagram_source(&wire.design)
        } else {
            wire.diagram_source
        };

        Ok(ProducedDesign {
            design: wire.design,
            diagram_source,
        })
    }
}

#[async_trait]
impl DesignProducer for HttpDesignProducer {
    async fn produce(&self, input: &ProducerInput) -> Result<ProducedDesign, ProducerError> {
        let prompt = self.render_prompt(input)?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.api_base);
        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProducerError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProducerError::ApiError {
                code: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProducerError::ParseError(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProducerError::ParseError("response had no choices".to_string()))?;

        self.parse_response(content)
    }
}
