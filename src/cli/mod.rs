use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

use crate::config::load_llm_config;
use crate::llm::{ GenerationConfig, LlmConfig, ModelConfig };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- LLM Backend Args ---
    /// LLM engine (openai, ollama, deepseek, groq, xai). Defaults to openai.
    #[arg(long, env = "LLM_ENGINE")]
    pub engine: Option<String>,

    /// Model name (e.g., gpt-4o-mini, llama3.1). Adapters pick a default if unset.
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// API key for hosted engines. Falls back to the provider's own variable (e.g., OPENAI_API_KEY).
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the LLM API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "LLM_BASE_URL")]
    pub base_url: Option<String>,

    /// Request timeout for LLM calls, in seconds
    #[arg(long, env = "LLM_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// JSON file holding {"engine", "model", "model_config"}. Flags above override it.
    #[arg(long, env = "LLM_CONFIG_PATH")]
    pub llm_config: Option<PathBuf>,

    // --- Generation Args ---
    /// Sampling temperature
    #[arg(long, env = "TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability mass
    #[arg(long, env = "TOP_P")]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate per reply
    #[arg(long, env = "MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    // --- Search Args ---
    /// Number of papers to retrieve per question
    #[arg(long, env = "MAX_RESULTS", default_value = "5")]
    pub max_results: usize,

    // --- Session Args ---
    /// Print the answer as it is generated
    #[arg(long, env = "STREAM", default_value = "false")]
    pub stream: bool,

    /// Ask a single question and exit instead of starting an interactive session
    #[arg(short, long)]
    pub message: Option<String>,
}

impl Args {
    pub fn resolve_llm_config(&self) -> Result<LlmConfig, Box<dyn Error + Send + Sync>> {
        let mut config = match &self.llm_config {
            Some(path) => load_llm_config(path)?,
            None => LlmConfig::default(),
        };

        if self.engine.is_some() {
            config.engine = self.engine.clone();
        }
        if self.model.is_some() {
            config.model = self.model.clone();
        }
        if self.api_key.is_some() || self.base_url.is_some() || self.timeout_secs.is_some() {
            let model_config = config.model_config.get_or_insert_with(ModelConfig::default);
            if self.api_key.is_some() {
                model_config.api_key = self.api_key.clone();
            }
            if self.base_url.is_some() {
                model_config.base_url = self.base_url.clone();
            }
            if self.timeout_secs.is_some() {
                model_config.timeout_secs = self.timeout_secs;
            }
        }
        Ok(config)
    }

    pub fn generation_config(&self) -> Option<GenerationConfig> {
        let config = GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: None,
        };
        if config == GenerationConfig::default() { None } else { Some(config) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{ CommandFactory, FromArgMatches };
    use std::io::Write;

    /// Parses flags only; `LLM_*`, `TEMPERATURE` and friends in the shell
    /// running the tests are ignored.
    fn parse_flags<const N: usize>(argv: [&str; N]) -> Args {
        let matches = Args::command()
            .mut_args(|arg| arg.env(Option::<&'static str>::None))
            .try_get_matches_from(argv)
            .unwrap();
        Args::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn env_lookups_can_be_disabled() {
        let command = Args::command().mut_args(|arg| arg.env(Option::<&'static str>::None));
        assert!(command.get_arguments().all(|arg| arg.get_env().is_none()));
        assert!(Args::command().get_arguments().any(|arg| arg.get_env().is_some()));
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"engine":"openai","model":"gpt-4o","model_config":{{"base_url":"http://proxy/v1","timeout_secs":10}}}}"#
        ).unwrap();

        let args = parse_flags([
            "arxiv-chat",
            "--llm-config",
            file.path().to_str().unwrap(),
            "--model",
            "gpt-4o-mini",
            "--api-key",
            "sk-flag",
        ]);
        let config = args.resolve_llm_config().unwrap();
        assert_eq!(config.engine.as_deref(), Some("openai"));
        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
        let model_config = config.model_config.unwrap();
        assert_eq!(model_config.api_key.as_deref(), Some("sk-flag"));
        assert_eq!(model_config.base_url.as_deref(), Some("http://proxy/v1"));
        assert_eq!(model_config.timeout_secs, Some(10));
    }

    #[test]
    fn generation_config_only_when_set() {
        let args = parse_flags(["arxiv-chat", "--max-results", "3"]);
        assert_eq!(args.max_results, 3);
        assert!(!args.stream);
        assert!(args.engine.is_none());
        assert!(args.generation_config().is_none());

        let args = parse_flags(["arxiv-chat", "--temperature", "0.1"]);
        assert_eq!(args.generation_config().unwrap().temperature, Some(0.1));
    }
}
