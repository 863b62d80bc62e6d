use thiserror::Error;

use crate::config::prompt::{ self, PromptError };
use crate::models::paper::PaperRecord;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Search tool returned malformed papers: {0}")]
    Papers(#[from] serde_json::Error),
    #[error(transparent)]
    Template(#[from] PromptError),
}

/// Decodes a search tool's output. Absent, blank and `[]` all mean no papers.
pub fn parse_papers(papers: Option<&str>) -> Result<Vec<PaperRecord>, FormatError> {
    match papers.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => Ok(serde_json::from_str(raw)?),
    }
}

/// Markdown cards for display, numbered from 1 in search order, inside one
/// scrollable container. Empty when there are no papers.
pub fn render_cards(papers: Option<&str>) -> Result<String, FormatError> {
    let papers = parse_papers(papers)?;
    if papers.is_empty() {
        return Ok(String::new());
    }

    let mut cards = String::new();
    for (index, paper) in papers.iter().enumerate() {
        cards.push_str(
            &prompt::get_paper_card(
                index + 1,
                &paper.title,
                &paper.pdf_url,
                &paper.joined_authors(),
                &paper.summary
            )?
        );
    }
    Ok(prompt::get_card_container(&cards)?)
}

/// Condensed title/authors/abstract block the model answers from.
pub fn render_grounding_text(papers: &[PaperRecord]) -> Result<String, FormatError> {
    let mut content = String::new();
    for paper in papers {
        content.push_str(
            &prompt::get_grounding_entry(&paper.title, &paper.joined_authors(), &paper.summary)?
        );
    }
    Ok(content)
}

/// The user turn for the answering model: the message itself when nothing
/// was found, otherwise the grounded-answer prompt.
pub fn prepare_message(message: &str, papers: Option<&str>) -> Result<String, FormatError> {
    let papers = parse_papers(papers)?;
    if papers.is_empty() {
        return Ok(message.to_string());
    }
    let content = render_grounding_text(&papers)?;
    Ok(prompt::get_chat_prompt(&content, message)?)
}
