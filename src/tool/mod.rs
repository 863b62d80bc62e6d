pub mod arxiv;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use self::arxiv::ArxivTool;

pub const DEFAULT_TOOL: &str = "arxiv";

/// A paper search backend. `call` receives whatever text the intent model
/// produced and answers with a JSON list of paper records, or `None` when
/// nothing matched.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn call(
        &self,
        raw_text: &str,
        max_results: usize
    ) -> Result<Option<String>, Box<dyn StdError + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    Arxiv,
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolType::Arxiv => f.write_str("arxiv"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid search tool: '{0}'")]
pub struct ParseToolTypeError(pub String);

impl FromStr for ToolType {
    type Err = ParseToolTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "arxiv" => Ok(ToolType::Arxiv),
            _ => Err(ParseToolTypeError(s.to_string())),
        }
    }
}

pub fn new_tool(tool_type: ToolType) -> Result<Arc<dyn SearchTool>, Box<dyn StdError + Send + Sync>> {
    let tool: Arc<dyn SearchTool> = match tool_type {
        ToolType::Arxiv => Arc::new(ArxivTool::new()?),
    };
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tool_is_registered() {
        assert_eq!(DEFAULT_TOOL.parse::<ToolType>(), Ok(ToolType::Arxiv));
        assert!(new_tool(ToolType::Arxiv).is_ok());
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert_eq!(
            "pubmed".parse::<ToolType>(),
            Err(ParseToolTypeError("pubmed".to_string()))
        );
    }
}
