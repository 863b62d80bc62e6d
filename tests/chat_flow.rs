use arxiv_chat::bot::{ ArxivChatBot, BotError, ChatRequest };
use arxiv_chat::config::prompt::{ ARXIV_SEARCH_PROMPT, ARXIV_SYSTEM_PROMPT };
use arxiv_chat::llm::chat::{ collect_stream, ChatClient, TokenStream };
use arxiv_chat::llm::GenerationConfig;
use arxiv_chat::models::chat::{ HistoryTurn, Message, Role };
use arxiv_chat::models::paper::PaperRecord;
use arxiv_chat::tool::SearchTool;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::{ Arc, Mutex };

const INTENT: &str =
    r#"{"research_field": ["graph neural networks"], "authors": [], "search_order": "Relevance"}"#;

/// Replies with a fixed intent to the search prompt and echoes the last
/// user turn otherwise. Every conversation it sees is recorded.
#[derive(Default)]
struct FakeLlm {
    calls: Mutex<Vec<Vec<Message>>>,
}

impl FakeLlm {
    fn reply(messages: &[Message]) -> String {
        match messages.first() {
            Some(first) if first.content == ARXIV_SEARCH_PROMPT => INTENT.to_string(),
            _ => format!("answer[{}]", messages.last().map(|m| m.content.len()).unwrap_or(0)),
        }
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for FakeLlm {
    async fn invoke(
        &self,
        messages: &[Message],
        _generation_config: Option<&GenerationConfig>
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(Self::reply(messages))
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        _generation_config: Option<&GenerationConfig>
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let reply = Self::reply(messages);
        let pieces: Vec<Result<String, Box<dyn StdError + Send + Sync>>> = reply
            .chars()
            .map(|c| Ok(c.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

struct FakeTool {
    result: Option<String>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeTool {
    fn returning(result: Option<String>) -> Self {
        Self { result, calls: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl SearchTool for FakeTool {
    async fn call(
        &self,
        raw_text: &str,
        max_results: usize
    ) -> Result<Option<String>, Box<dyn StdError + Send + Sync>> {
        self.calls.lock().unwrap().push((raw_text.to_string(), max_results));
        Ok(self.result.clone())
    }
}

struct BrokenLlm;

#[async_trait]
impl ChatClient for BrokenLlm {
    async fn invoke(
        &self,
        _messages: &[Message],
        _generation_config: Option<&GenerationConfig>
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        Err("connection refused".into())
    }

    fn model(&self) -> &str {
        "broken"
    }
}

fn gnn_papers() -> String {
    let papers = vec![
        PaperRecord {
            title: "A Comprehensive Survey on Graph Neural Networks".into(),
            authors: vec!["Zonghan Wu".into(), "Shirui Pan".into()],
            summary: "We provide a comprehensive overview of GNNs.".into(),
            pdf_url: "http://arxiv.org/pdf/1901.00596v4".into(),
        },
        PaperRecord {
            title: "How Powerful are Graph Neural Networks?".into(),
            authors: vec!["Keyulu Xu".into()],
            summary: "We characterize the expressive power of GNNs.".into(),
            pdf_url: "http://arxiv.org/pdf/1810.00826v3".into(),
        },
    ];
    serde_json::to_string(&papers).unwrap()
}

fn bot_with(llm: Arc<FakeLlm>, tool: Arc<FakeTool>) -> ArxivChatBot {
    ArxivChatBot::from_parts(llm, tool)
}

#[tokio::test]
async fn recommends_papers_with_grounded_answer() {
    let llm = Arc::new(FakeLlm::default());
    let tool = Arc::new(FakeTool::returning(Some(gnn_papers())));
    let bot = bot_with(llm.clone(), tool.clone());

    let request = ChatRequest::new("recommend papers on graph neural networks");
    let output = bot.chat(&request).await.unwrap();

    assert_eq!(output.search_query, INTENT);
    assert_eq!(*tool.calls.lock().unwrap(), vec![(INTENT.to_string(), 5)]);

    assert!(
        output.paper_cards.contains(
            "### [1. A Comprehensive Survey on Graph Neural Networks](http://arxiv.org/pdf/1901.00596v4)"
        )
    );
    assert!(
        output.paper_cards.contains(
            "### [2. How Powerful are Graph Neural Networks?](http://arxiv.org/pdf/1810.00826v3)"
        )
    );
    assert!(!output.paper_cards.contains("### [3."));

    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    let answer_call = &calls[1];
    assert_eq!(answer_call.len(), 2);
    assert_eq!(answer_call[0], Message::system(ARXIV_SYSTEM_PROMPT));
    let grounded = &answer_call[1].content;
    assert!(grounded.contains("Title: A Comprehensive Survey on Graph Neural Networks"));
    assert!(grounded.contains("Authors: Zonghan Wu, Shirui Pan"));
    assert!(grounded.ends_with("recommend papers on graph neural networks\n"));
    assert_eq!(output.answer, format!("answer[{}]", grounded.len()));
}

#[tokio::test]
async fn empty_search_passes_message_through() {
    let llm = Arc::new(FakeLlm::default());
    let tool = Arc::new(FakeTool::returning(None));
    let bot = bot_with(llm.clone(), tool);

    let output = bot.chat(&ChatRequest::new("anything on {weird} topics?")).await.unwrap();

    assert_eq!(output.paper_cards, "");
    let calls = llm.calls();
    let final_user = calls[1].last().unwrap();
    assert_eq!(final_user.role, Role::User);
    assert_eq!(final_user.content, "anything on {weird} topics?");
}

#[tokio::test]
async fn histories_go_to_their_own_stage() {
    let llm = Arc::new(FakeLlm::default());
    let tool = Arc::new(FakeTool::returning(None));
    let bot = bot_with(llm.clone(), tool.clone());

    let mut request = ChatRequest::new("and newer ones?");
    request.history_chat = vec![HistoryTurn::new("gnn papers", "Here are some GNN papers.")];
    request.history_search = vec![
        HistoryTurn::new("hi", "{}"),
        HistoryTurn::new("gnn papers", INTENT)
    ];
    request.max_results = 3;
    bot.chat(&request).await.unwrap();

    let calls = llm.calls();
    assert_eq!(calls[0].len(), 2 * 2 + 2);
    assert_eq!(calls[0][4], Message::assistant(INTENT));
    assert_eq!(calls[1].len(), 2 * 1 + 2);
    assert_eq!(calls[1][2], Message::assistant("Here are some GNN papers."));
    assert_eq!(tool.calls.lock().unwrap()[0].1, 3);
}

#[tokio::test]
async fn streamed_answer_matches_blocking_answer() {
    let llm = Arc::new(FakeLlm::default());
    let tool = Arc::new(FakeTool::returning(Some(gnn_papers())));
    let bot = bot_with(llm, tool);
    let request = ChatRequest::new("recommend papers on graph neural networks");

    let blocking = bot.chat(&request).await.unwrap();
    let streamed = bot.chat_stream(&request).await.unwrap();

    assert_eq!(streamed.paper_cards, blocking.paper_cards);
    assert_eq!(streamed.search_query, blocking.search_query);
    assert_eq!(collect_stream(streamed.answer).await.unwrap(), blocking.answer);
}

#[tokio::test]
async fn repeated_calls_are_identical() {
    let llm = Arc::new(FakeLlm::default());
    let tool = Arc::new(FakeTool::returning(Some(gnn_papers())));
    let bot = bot_with(llm.clone(), tool);
    let request = ChatRequest::new("recommend papers on graph neural networks");

    let first = bot.chat(&request).await.unwrap();
    let second = bot.chat(&request).await.unwrap();

    assert_eq!(first, second);
    let calls = llm.calls();
    assert_eq!(calls[0], calls[2]);
    assert_eq!(calls[1], calls[3]);
}

#[tokio::test]
async fn malformed_papers_are_fatal() {
    let llm = Arc::new(FakeLlm::default());
    let tool = Arc::new(
        FakeTool::returning(Some(r#"[{"title":"t","authors":[],"summary":"s"}]"#.into()))
    );
    let bot = bot_with(llm.clone(), tool);

    let err = bot.chat(&ChatRequest::new("m")).await.unwrap_err();
    assert!(matches!(err, BotError::Format(_)));
    assert_eq!(llm.calls().len(), 1);
}

#[tokio::test]
async fn model_errors_propagate() {
    let tool = Arc::new(FakeTool::returning(None));
    let bot = ArxivChatBot::from_parts(Arc::new(BrokenLlm), tool.clone());

    let err = bot.chat(&ChatRequest::new("m")).await.unwrap_err();
    assert!(matches!(err, BotError::Llm(_)));
    assert!(err.to_string().contains("connection refused"));
    assert!(tool.calls.lock().unwrap().is_empty());
}
