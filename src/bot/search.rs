use log::{ debug, info };

use super::conversation::build_messages;
use super::BotError;
use crate::config::prompt::ARXIV_SEARCH_PROMPT;
use crate::llm::chat::ChatClient;
use crate::llm::GenerationConfig;
use crate::models::chat::HistoryTurn;
use crate::tool::SearchTool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Serialized paper list exactly as the tool returned it.
    pub papers: Option<String>,
    /// The model's raw intent text, forwarded to the tool unchanged.
    pub search_query: String,
}

/// Asks the model to turn the message into search parameters and hands its
/// reply straight to the search tool. The reply is not validated here.
pub async fn search(
    llm: &dyn ChatClient,
    tool: &dyn SearchTool,
    message: &str,
    history: &[HistoryTurn],
    generation_config: Option<&GenerationConfig>,
    max_results: usize
) -> Result<SearchOutcome, BotError> {
    let messages = build_messages(message, history, Some(ARXIV_SEARCH_PROMPT));
    let search_query = llm.invoke(&messages, generation_config).await.map_err(BotError::Llm)?;
    debug!("Search intent from model: {}", search_query);

    let papers = tool.call(&search_query, max_results).await.map_err(BotError::Search)?;
    info!(
        "Paper search finished: {}",
        if papers.is_some() { "results found" } else { "no results" }
    );

    Ok(SearchOutcome { papers, search_query })
}
