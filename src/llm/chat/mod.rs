pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream, StreamExt };
use log::debug;
use reqwest::Client as HttpClient;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ GenerationConfig, LlmType, ModelConfig };
use crate::models::chat::Message;
use self::ollama::OllamaChatClient;
use self::openai::{ OpenAIChatClient, OpenAIProvider };

/// Incremental answer text as produced by a backend.
pub type TokenStream = Pin<
    Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>
>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Runs the conversation to completion and returns the full reply.
    async fn invoke(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>
    ) -> Result<String, Box<dyn StdError + Send + Sync>>;

    /// Same conversation, delivered as it is generated. Backends without
    /// native streaming yield the whole reply as a single item.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        generation_config: Option<&GenerationConfig>
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let response = self.invoke(messages, generation_config).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(response) })))
    }

    fn model(&self) -> &str;
}

pub async fn collect_stream(
    mut stream: TokenStream
) -> Result<String, Box<dyn StdError + Send + Sync>> {
    let mut text = String::new();
    while let Some(token) = stream.next().await {
        text.push_str(&token?);
    }
    Ok(text)
}

pub fn new_client(
    llm_type: LlmType,
    model: Option<String>,
    model_config: Option<&ModelConfig>
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let default_config = ModelConfig::default();
    let config = model_config.unwrap_or(&default_config);
    let client: Arc<dyn ChatClient> = match llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaChatClient::from_config(model, config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(
                OpenAIProvider::OpenAI,
                model,
                config
            )?;
            Arc::new(specific_client)
        }
        LlmType::DeepSeek => {
            let specific_client = OpenAIChatClient::from_config(
                OpenAIProvider::DeepSeek,
                model,
                config
            )?;
            Arc::new(specific_client)
        }
        LlmType::Groq => {
            let specific_client = OpenAIChatClient::from_config(
                OpenAIProvider::Groq,
                model,
                config
            )?;
            Arc::new(specific_client)
        }
        LlmType::XAI => {
            let specific_client = OpenAIChatClient::from_config(
                OpenAIProvider::XAI,
                model,
                config
            )?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

pub(crate) fn build_http_client(
    timeout_secs: Option<u64>,
    headers: reqwest::header::HeaderMap
) -> Result<HttpClient, Box<dyn StdError + Send + Sync>> {
    let mut builder = HttpClient::builder().default_headers(headers);
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)
}

/// What a provider-specific parser makes of one line of a streamed body.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamLine {
    Token(String),
    Skip,
    Done,
}

pub(crate) fn create_streaming_response<F, Fut>(response_fn: F) -> TokenStream
    where
        F: FnOnce(mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>) -> Fut +
            Send +
            'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Splits a chunked body into lines. Bytes are only decoded once a whole
/// line is present, so a multibyte character split across chunks survives.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Appends `chunk` and returns every line it completed, without the
    /// trailing `\n` or `\r\n`.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = &line_bytes[..pos];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }

    /// Whatever is left after the body ends without a final newline.
    pub(crate) fn finish(self) -> Option<String> {
        let tail = self.pending.strip_suffix(b"\r").unwrap_or(&self.pending[..]);
        if tail.is_empty() { None } else { Some(String::from_utf8_lossy(tail).into_owned()) }
    }
}

/// Posts `payload` and feeds the response body, one line at a time, through
/// `line_parser`.
pub(crate) async fn http_stream_generate(
    client: HttpClient,
    url: String,
    payload: impl serde::Serialize + Send + 'static,
    line_parser: fn(&str) -> StreamLine
) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
    let resp = client.post(&url).json(&payload).send().await?.error_for_status()?;

    Ok(
        create_streaming_response(move |tx| async move {
            let mut bytes = resp.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        for line in lines.push(&buf) {
                            match line_parser(line.trim()) {
                                StreamLine::Token(tok) => {
                                    if tx.send(Ok(tok)).await.is_err() {
                                        return;
                                    }
                                }
                                StreamLine::Skip => {}
                                StreamLine::Done => {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Box::new(e) as _)).await;
                        return;
                    }
                }
            }

            if let Some(tail) = lines.finish() {
                if let StreamLine::Token(tok) = line_parser(tail.trim()) {
                    let _ = tx.send(Ok(tok)).await;
                }
            }
            debug!("Stream from {} finished", url);
        })
    )
}
