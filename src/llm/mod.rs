pub mod chat;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_ENGINE: &str = "openai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    OpenAI,
    Ollama,
    DeepSeek,
    Groq,
    XAI,
}

impl LlmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmType::OpenAI => "openai",
            LlmType::Ollama => "ollama",
            LlmType::DeepSeek => "deepseek",
            LlmType::Groq => "groq",
            LlmType::XAI => "xai",
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid LLM engine: '{0}'")]
pub struct ParseLlmTypeError(pub String);

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            "deepseek" => Ok(LlmType::DeepSeek),
            "groq" => Ok(LlmType::Groq),
            "xai" => Ok(LlmType::XAI),
            _ => Err(ParseLlmTypeError(s.to_string())),
        }
    }
}

/// Backend selection, fixed for the lifetime of a bot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_config: Option<ModelConfig>,
}

#[derive(Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Per-call sampling parameters. Unset fields are left to the backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}
