pub mod prompt;

use crate::llm::LlmConfig;
use std::error::Error;
use std::fs;
use std::path::Path;

pub fn load_llm_config<P: AsRef<Path>>(path: P) -> Result<LlmConfig, Box<dyn Error + Send + Sync>> {
    let path = path.as_ref();
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read LLM config file '{}': {}", path.display(), e))?;
    let config: LlmConfig = serde_json
        ::from_str(&file_content)
        .map_err(|e| format!("Failed to parse LLM config file '{}': {}", path.display(), e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_config_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"engine":"ollama","model":"llama3","model_config":{{"base_url":"http://localhost:11434"}}}}"#
        ).unwrap();

        let config = load_llm_config(file.path()).unwrap();
        assert_eq!(config.engine.as_deref(), Some("ollama"));
        assert_eq!(config.model.as_deref(), Some("llama3"));
        let model_config = config.model_config.unwrap();
        assert_eq!(model_config.base_url.as_deref(), Some("http://localhost:11434"));
        assert!(model_config.api_key.is_none());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_llm_config("/nonexistent/llm.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/llm.json"));
    }
}
