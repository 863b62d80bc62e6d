pub mod conversation;
pub mod formatter;
pub mod search;

use log::{ debug, info };
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use self::conversation::build_messages;
use self::formatter::{ prepare_message, render_cards, FormatError };
use self::search::{ search, SearchOutcome };
use crate::config::prompt::ARXIV_SYSTEM_PROMPT;
use crate::llm::chat::{ new_client, ChatClient, TokenStream };
use crate::llm::{ GenerationConfig, LlmConfig, LlmType, ModelConfig, ParseLlmTypeError, DEFAULT_ENGINE };
use crate::models::chat::{ HistoryTurn, Message };
use crate::tool::{ new_tool, ParseToolTypeError, SearchTool, ToolType, DEFAULT_TOOL };

pub const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    UnknownEngine(#[from] ParseLlmTypeError),
    #[error(transparent)]
    UnknownTool(#[from] ParseToolTypeError),
    #[error("Failed to initialize {component}: {source}")]
    Client {
        component: String,
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("Language model call failed: {0}")]
    Llm(Box<dyn StdError + Send + Sync>),
    #[error("Paper search failed: {0}")]
    Search(Box<dyn StdError + Send + Sync>),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// One user turn. Both histories belong to the caller: `history_chat` holds
/// earlier (question, answer) pairs, `history_search` earlier
/// (question, search intent) pairs.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub history_chat: Vec<HistoryTurn>,
    pub history_search: Vec<HistoryTurn>,
    pub generation_config: Option<GenerationConfig>,
    pub max_results: usize,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history_chat: Vec::new(),
            history_search: Vec::new(),
            generation_config: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutput {
    pub answer: String,
    /// Markdown paper listing, empty when the search found nothing.
    pub paper_cards: String,
    /// Raw intent text the model produced for the search tool.
    pub search_query: String,
}

pub struct ChatStreamOutput {
    pub answer: TokenStream,
    pub paper_cards: String,
    pub search_query: String,
}

/// Recommends arXiv papers: extracts a search intent with the model, runs
/// the search tool, and answers grounded in what was found.
pub struct ArxivChatBot {
    llm: Arc<dyn ChatClient>,
    tool: Arc<dyn SearchTool>,
}

fn parse_llm_config(
    llm_config: Option<LlmConfig>
) -> (String, Option<String>, Option<ModelConfig>) {
    let LlmConfig { engine, model, model_config } = llm_config.unwrap_or_default();
    (engine.unwrap_or_else(|| DEFAULT_ENGINE.to_string()), model, model_config)
}

impl ArxivChatBot {
    /// Resolves both registries before building anything, so an unknown
    /// engine fails without touching a backend.
    pub fn new(llm_config: Option<LlmConfig>) -> Result<Self, BotError> {
        let (engine, model, model_config) = parse_llm_config(llm_config);
        let llm_type: LlmType = engine.parse()?;
        let tool_type: ToolType = DEFAULT_TOOL.parse()?;

        info!("Setting up LLM...");
        let llm = new_client(llm_type, model, model_config.as_ref()).map_err(|source| {
            BotError::Client { component: format!("{} chat client", llm_type), source }
        })?;
        info!("LLM Engine: {}", llm_type);
        info!("Model ID/Path: {}", llm.model());
        info!("Model Config: {:?}", model_config);
        info!("LLM has been initialized.");

        let tool = new_tool(tool_type).map_err(|source| {
            BotError::Client { component: format!("{} search tool", tool_type), source }
        })?;
        info!("Search tool: {}", tool_type);

        Ok(Self::from_parts(llm, tool))
    }

    pub fn from_parts(llm: Arc<dyn ChatClient>, tool: Arc<dyn SearchTool>) -> Self {
        Self { llm, tool }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    async fn search_and_prepare(
        &self,
        request: &ChatRequest
    ) -> Result<(Vec<Message>, String, String), BotError> {
        let SearchOutcome { papers, search_query } = search(
            self.llm.as_ref(),
            self.tool.as_ref(),
            &request.message,
            &request.history_search,
            request.generation_config.as_ref(),
            request.max_results
        ).await?;

        let paper_cards = render_cards(papers.as_deref())?;
        let message_for_llm = prepare_message(&request.message, papers.as_deref())?;
        debug!("Grounded prompt:\n{}", message_for_llm);

        let messages = build_messages(
            &message_for_llm,
            &request.history_chat,
            Some(ARXIV_SYSTEM_PROMPT)
        );
        Ok((messages, paper_cards, search_query))
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatOutput, BotError> {
        let (messages, paper_cards, search_query) = self.search_and_prepare(request).await?;
        let answer = self.llm
            .invoke(&messages, request.generation_config.as_ref()).await
            .map_err(BotError::Llm)?;

        Ok(ChatOutput { answer, paper_cards, search_query })
    }

    /// Like [`chat`](Self::chat), but the answer arrives incrementally. The
    /// search step still waits for the complete intent.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStreamOutput, BotError> {
        let (messages, paper_cards, search_query) = self.search_and_prepare(request).await?;
        let answer = self.llm
            .invoke_stream(&messages, request.generation_config.as_ref()).await
            .map_err(BotError::Llm)?;

        Ok(ChatStreamOutput { answer, paper_cards, search_query })
    }
}
