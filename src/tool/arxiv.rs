use async_trait::async_trait;
use log::{ debug, info, warn };
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Deserializer };
use serde_json::Value;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::SearchTool;
use crate::models::paper::PaperRecord;

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

static ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("entry pattern"));
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("title pattern"));
static SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").expect("summary pattern")
});
static AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<author>\s*<name>(.*?)</name>").expect("author pattern")
});
static ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<id>(.*?)</id>").expect("id pattern"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<link\s[^>]*>").expect("link pattern"));
static HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"href="([^"]*)""#).expect("href pattern"));
static XML_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").expect("entity pattern")
});

#[derive(Debug, Error)]
pub enum ArxivError {
    #[error("arXiv request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid arXiv API url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to serialize papers: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrder {
    Latest,
    Relevance,
}

impl SearchOrder {
    fn sort_by(&self) -> &'static str {
        match self {
            SearchOrder::Latest => "submittedDate",
            SearchOrder::Relevance => "relevance",
        }
    }
}

/// The structured request the intent prompt asks the model for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchIntent {
    #[serde(default, deserialize_with = "lenient_list")]
    pub research_field: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub search_order: Option<String>,
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts `null`, a single string, or a list; non-text items are dropped.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where D: Deserializer<'de>
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_text).collect(),
        other => value_text(other).into_iter().collect(),
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where D: Deserializer<'de>
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().find_map(value_text),
        other => value_text(other),
    })
}

impl SearchIntent {
    pub fn order(&self) -> SearchOrder {
        match self.search_order.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(order) if order == "latest" => SearchOrder::Latest,
            _ => SearchOrder::Relevance,
        }
    }
}

/// Reads a search intent out of model output, tolerating code fences and
/// surrounding prose.
pub fn parse_intent(raw_text: &str) -> Option<SearchIntent> {
    let start = raw_text.find('{')?;
    let end = raw_text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw_text[start..=end]).ok()
}

fn quoted(term: &str) -> Option<String> {
    let cleaned = collapse_whitespace(&term.replace('"', " "));
    if cleaned.is_empty() { None } else { Some(format!("\"{}\"", cleaned)) }
}

/// Builds the arXiv `search_query` expression. Topics are OR-ed together,
/// authors are AND-ed, and both groups must match.
pub fn build_query(raw_text: &str) -> Option<(String, SearchOrder)> {
    match parse_intent(raw_text) {
        Some(intent) => {
            let topics: Vec<String> = intent.research_field
                .iter()
                .filter_map(|f| quoted(f))
                .map(|f| format!("(ti:{f} OR abs:{f})"))
                .collect();
            let authors: Vec<String> = intent.authors
                .iter()
                .filter_map(|a| quoted(a))
                .map(|a| format!("au:{a}"))
                .collect();

            let mut clauses = Vec::new();
            if !topics.is_empty() {
                clauses.push(format!("({})", topics.join(" OR ")));
            }
            if !authors.is_empty() {
                clauses.push(format!("({})", authors.join(" AND ")));
            }
            if clauses.is_empty() {
                return None;
            }
            Some((clauses.join(" AND "), intent.order()))
        }
        None => {
            warn!("Search intent is not valid JSON, using it as a free-text query");
            free_text_query(raw_text).map(|q| (q, SearchOrder::Relevance))
        }
    }
}

/// Every word must appear somewhere in the paper.
fn free_text_query(text: &str) -> Option<String> {
    let words: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|w| w.trim_matches(|c: char| c == '-' || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| format!("all:{w}"))
        .collect();
    if words.is_empty() { None } else { Some(words.join(" AND ")) }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes named and numeric character references in a single pass, so
/// `&amp;lt;` stays `&lt;`.
fn unescape_xml(text: &str) -> String {
    XML_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "amp" => Some('&'),
            _ => {
                let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => entity[1..].parse::<u32>().ok(),
                };
                code.and_then(char::from_u32)
            }
        };
        decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
    }).into_owned()
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern.captures(text).map(|caps| unescape_xml(caps[1].trim()))
}

fn pdf_link(entry: &str) -> Option<String> {
    let from_links = LINK.find_iter(entry)
        .map(|m| m.as_str())
        .find(|tag| tag.contains(r#"title="pdf""#))
        .and_then(|tag| first_capture(&HREF, tag));

    from_links.or_else(|| first_capture(&ID, entry).map(|id| id.replacen("/abs/", "/pdf/", 1)))
}

/// Extracts paper records from an arXiv Atom feed, in feed order.
pub fn parse_feed(feed: &str) -> Vec<PaperRecord> {
    ENTRY.captures_iter(feed)
        .filter_map(|caps| {
            let entry = &caps[1];
            let title = first_capture(&TITLE, entry).map(|t| collapse_whitespace(&t));
            let Some(title) = title.filter(|t| !t.is_empty()) else {
                warn!("Skipping arXiv entry without a title");
                return None;
            };
            let summary = first_capture(&SUMMARY, entry)
                .map(|s| collapse_whitespace(&s))
                .unwrap_or_default();
            let authors = AUTHOR.captures_iter(entry)
                .map(|a| collapse_whitespace(&unescape_xml(&a[1])))
                .collect();
            let pdf_url = pdf_link(entry).unwrap_or_default();
            Some(PaperRecord { title, authors, summary, pdf_url })
        })
        .collect()
}

pub struct ArxivTool {
    http: HttpClient,
    api_url: String,
}

impl ArxivTool {
    pub fn new() -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::with_api_url(ARXIV_API_URL)
    }

    pub fn with_api_url(api_url: &str) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;
        Ok(Self { http, api_url: api_url.to_string() })
    }

    pub fn request_url(
        &self,
        search_query: &str,
        order: SearchOrder,
        max_results: usize
    ) -> Result<Url, ArxivError> {
        let max_results = max_results.to_string();
        let url = Url::parse_with_params(
            &self.api_url,
            &[
                ("search_query", search_query),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", order.sort_by()),
                ("sortOrder", "descending"),
            ]
        )?;
        Ok(url)
    }

    async fn fetch(
        &self,
        search_query: &str,
        order: SearchOrder,
        max_results: usize
    ) -> Result<Option<String>, ArxivError> {
        let url = self.request_url(search_query, order, max_results)?;
        info!("Querying arXiv: {}", url);
        let feed = self.http.get(url).send().await?.error_for_status()?.text().await?;

        let papers = parse_feed(&feed);
        info!("arXiv returned {} papers", papers.len());
        if papers.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&papers)?))
    }
}

#[async_trait]
impl SearchTool for ArxivTool {
    async fn call(
        &self,
        raw_text: &str,
        max_results: usize
    ) -> Result<Option<String>, Box<dyn StdError + Send + Sync>> {
        let Some((search_query, order)) = build_query(raw_text) else {
            debug!("No usable search terms in: {}", raw_text);
            return Ok(None);
        };
        if max_results == 0 {
            return Ok(None);
        }
        Ok(self.fetch(&search_query, order, max_results).await?)
    }
}
