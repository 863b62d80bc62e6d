use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ build_http_client, http_stream_generate, ChatClient, StreamLine, TokenStream };
use crate::llm::{ GenerationConfig, ModelConfig };
use crate::models::chat::Message;

/// Hosted services that speak the OpenAI chat-completions dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIProvider {
    OpenAI,
    DeepSeek,
    Groq,
    XAI,
}

impl OpenAIProvider {
    pub fn name(&self) -> &'static str {
        match self {
            OpenAIProvider::OpenAI => "OpenAI",
            OpenAIProvider::DeepSeek => "DeepSeek",
            OpenAIProvider::Groq => "Groq",
            OpenAIProvider::XAI => "xAI",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            OpenAIProvider::OpenAI => "https://api.openai.com/v1",
            OpenAIProvider::DeepSeek => "https://api.deepseek.com/v1",
            OpenAIProvider::Groq => "https://api.groq.com/openai/v1",
            OpenAIProvider::XAI => "https://api.x.ai/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            OpenAIProvider::OpenAI => "gpt-4o-mini",
            OpenAIProvider::DeepSeek => "deepseek-chat",
            OpenAIProvider::Groq => "llama-3.1-8b-instant",
            OpenAIProvider::XAI => "grok-2-latest",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            OpenAIProvider::OpenAI => "OPENAI_API_KEY",
            OpenAIProvider::DeepSeek => "DEEPSEEK_API_KEY",
            OpenAIProvider::Groq => "GROQ_API_KEY",
            OpenAIProvider::XAI => "XAI_API_KEY",
        }
    }
}

pub struct OpenAIChatClient {
    http: HttpClient,
    provider: OpenAIProvider,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(flatten)]
    generation: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(
        provider: OpenAIProvider,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| provider.default_model().to_string());
        let api_url = base_url.unwrap_or_else(|| provider.default_base_url().to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                format!("Invalid API key format: {}", e)
            )?
        );

        let http = build_http_client(timeout_secs, headers)?;

        Ok(Self {
            http,
            provider,
            model: chat_model,
            base_url: api_url,
        })
    }

    /// The key comes from the model config, falling back to the provider's
    /// conventional environment variable.
    pub fn from_config(
        provider: OpenAIProvider,
        model: Option<String>,
        config: &ModelConfig
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = resolve_api_key(
            provider,
            config.api_key.as_deref(),
            std::env::var(provider.api_key_env()).ok()
        )?;

        Self::new(provider, api_key, model, config.base_url.clone(), config.timeout_secs)
    }

    pub fn provider(&self) -> OpenAIProvider {
        self.provider
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn request(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>,
        stream: bool
    ) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            generation: generation_config.cloned().unwrap_or_default(),
            stream: if stream { Some(true) } else { None },
        }
    }
}

/// A non-empty configured key wins over the environment value.
fn resolve_api_key(
    provider: OpenAIProvider,
    configured: Option<&str>,
    from_env: Option<String>
) -> Result<String, String> {
    configured
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| from_env.filter(|k| !k.is_empty()))
        .ok_or_else(|| {
            format!(
                "{} API key is required (model_config.api_key or {})",
                provider.name(),
                provider.api_key_env()
            )
        })
}

fn parse_sse_line(line: &str) -> StreamLine {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => {
            return StreamLine::Skip;
        }
    };
    if data == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            let Some(choice) = stream_resp.choices.into_iter().next() else {
                return StreamLine::Skip;
            };
            match choice.delta.content {
                Some(content) if !content.is_empty() => StreamLine::Token(content),
                _ if choice.finish_reason.is_some() => StreamLine::Done,
                _ => StreamLine::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            StreamLine::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn invoke(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let req = self.request(messages, generation_config, false);

        let resp = self.http
            .post(self.endpoint())
            .json(&req)
            .send().await?
            .error_for_status()?
            .json::<OpenAIResponse>().await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| format!("No response from {} API", self.provider.name()))?
            .message.content.unwrap_or_default();

        Ok(content)
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let req = self.request(messages, generation_config, true);
        info!("Streaming {} completion from {}", self.provider.name(), self.model);
        http_stream_generate(self.http.clone(), self.endpoint(), req, parse_sse_line).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
