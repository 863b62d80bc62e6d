use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use reqwest::header::HeaderMap;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ build_http_client, http_stream_generate, ChatClient, StreamLine, TokenStream };
use crate::llm::{ GenerationConfig, ModelConfig };
use crate::models::chat::Message;

#[derive(Debug)]
pub struct OllamaChatClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

impl From<&GenerationConfig> for OllamaOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            num_predict: config.max_tokens,
            stop: config.stop.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
}

impl OllamaChatClient {
    pub fn new(
        base_url: Option<String>,
        completion_model: Option<String>,
        timeout_secs: Option<u64>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let model = completion_model.unwrap_or_else(|| "cogito:3b".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Ok(Self {
            http: build_http_client(timeout_secs, HeaderMap::new())?,
            base_url: url,
            completion_model: model,
        })
    }

    pub fn from_config(
        model: Option<String>,
        config: &ModelConfig
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(config.base_url.clone(), model, config.timeout_secs)
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn request(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>,
        stream: bool
    ) -> ChatRequest {
        ChatRequest {
            model: self.completion_model.clone(),
            messages: messages.to_vec(),
            stream,
            options: generation_config.map(OllamaOptions::from),
        }
    }
}

fn parse_ndjson_line(line: &str) -> StreamLine {
    if line.is_empty() {
        return StreamLine::Skip;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(stream_resp) => {
            let content = stream_resp.message.map(|m| m.content).unwrap_or_default();
            if !content.is_empty() {
                StreamLine::Token(content)
            } else if stream_resp.done {
                StreamLine::Done
            } else {
                StreamLine::Skip
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            StreamLine::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn invoke(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let req = self.request(messages, generation_config, false);
        let resp = self.http.post(self.endpoint()).json(&req).send().await?.error_for_status()?;
        let data = resp.json::<ChatResponse>().await?;
        Ok(data.message.content)
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let req = self.request(messages, generation_config, true);
        info!("Streaming Ollama completion from {}", self.completion_model);
        http_stream_generate(self.http.clone(), self.endpoint(), req, parse_ndjson_line).await
    }

    fn model(&self) -> &str {
        &self.completion_model
    }
}
