pub mod bot;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod tool;

use bot::{ ArxivChatBot, ChatOutput, ChatRequest };
use cli::Args;
use futures::StreamExt;
use log::info;
use models::chat::HistoryTurn;
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let llm_config = args.resolve_llm_config()?;

    info!("--- Core Configuration ---");
    info!("LLM Engine: {}", llm_config.engine.as_deref().unwrap_or(llm::DEFAULT_ENGINE));
    info!("Model: {}", llm_config.model.as_deref().unwrap_or("adapter default"));
    info!("Max Results: {}", args.max_results);
    info!("Streaming: {}", args.stream);
    info!("-------------------------");

    let bot = ArxivChatBot::new(Some(llm_config))?;
    let mut session = Session::new(&args);

    if let Some(message) = &args.message {
        session.turn(&bot, message).await?;
        return Ok(());
    }

    println!("Ask about papers (empty line or 'exit' to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() || message == "exit" || message == "quit" {
            break;
        }
        session.turn(&bot, message).await?;
    }
    Ok(())
}

/// The histories live here, on the caller side; the bot keeps none.
struct Session {
    history_chat: Vec<HistoryTurn>,
    history_search: Vec<HistoryTurn>,
    generation_config: Option<llm::GenerationConfig>,
    max_results: usize,
    stream: bool,
}

impl Session {
    fn new(args: &Args) -> Self {
        Self {
            history_chat: Vec::new(),
            history_search: Vec::new(),
            generation_config: args.generation_config(),
            max_results: args.max_results,
            stream: args.stream,
        }
    }

    async fn turn(
        &mut self,
        bot: &ArxivChatBot,
        message: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let request = ChatRequest {
            message: message.to_string(),
            history_chat: self.history_chat.clone(),
            history_search: self.history_search.clone(),
            generation_config: self.generation_config.clone(),
            max_results: self.max_results,
        };

        let output = if self.stream {
            let mut streamed = bot.chat_stream(&request).await?;
            print_header(&streamed.paper_cards, &streamed.search_query);
            let mut answer = String::new();
            while let Some(token) = streamed.answer.next().await {
                let token = token?;
                print!("{}", token);
                std::io::stdout().flush()?;
                answer.push_str(&token);
            }
            println!();
            ChatOutput {
                answer,
                paper_cards: streamed.paper_cards,
                search_query: streamed.search_query,
            }
        } else {
            let output = bot.chat(&request).await?;
            print_header(&output.paper_cards, &output.search_query);
            println!("{}", output.answer);
            output
        };

        self.history_chat.push(HistoryTurn::new(message, output.answer));
        self.history_search.push(HistoryTurn::new(message, output.search_query));
        Ok(())
    }
}

fn print_header(paper_cards: &str, search_query: &str) {
    println!("Search query: {}", search_query.trim());
    if paper_cards.is_empty() {
        println!("(no papers found)");
    } else {
        println!("{}", paper_cards);
    }
}
