use once_cell::sync::Lazy;
use regex::{ Captures, Regex };
use thiserror::Error;

pub const ARXIV_SYSTEM_PROMPT: &str = "You are skilled at recommending academic papers to users.";

pub const ARXIV_SEARCH_PROMPT: &str = r#"Task
Extract the key information from the user's question so it can be used to search for papers.

Input
The user's question or statement (a string).

Output
JSON with the following fields:
{
    "research_field": ["<topic1>", "<topic2>"],
    "authors": ["<author1>", "<author2>"],
    "search_order": "<sort type>"
}

Fields
research_field: research topics in English (must be English), may be empty.
authors: paper authors in English (must be English), may be empty.
search_order: how to rank results, either "Latest" (newest first) or "Relevance" (most relevant first).
"#;

pub const ARXIV_CHAT_TEMPLATE: &str = r#"Answer the question using the arXiv paper candidates below. Do not make anything up. If the candidate set is empty, remind me to check whether the arXiv service is available.

arXiv paper candidates:

{content}

Question:

{message}
"#;

pub const PAPER_CARD_TEMPLATE: &str = r#"
### [{index}. {title}]({pdf_url})

**Authors:** {authors}

**Abstract:** {abstract}

"#;

pub const PAPER_CARD_CONTAINER: &str = r#"
<div style="flex: 1; overflow-y: auto;">
{content}
</div>
"#;

pub const PAPER_GROUNDING_ENTRY: &str = "Title: {title}\nAuthors: {authors}\nAbstract: {abstract}\n\n";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Prompt template references '{{{0}}}' but no value was supplied")]
    MissingPlaceholder(String),
}

/// Substitutes every `{name}` in `template`. Values are inserted as-is and
/// never rescanned.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
    let lookup = |name: &str| values.iter().find(|(key, _)| *key == name).map(|(_, v)| *v);

    if let Some(missing) = PLACEHOLDER.captures_iter(template)
        .map(|caps| caps[1].to_string())
        .find(|name| lookup(name).is_none())
    {
        return Err(PromptError::MissingPlaceholder(missing));
    }

    let filled = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        lookup(&caps[1]).unwrap_or_default().to_string()
    });
    Ok(filled.into_owned())
}

pub fn get_chat_prompt(content: &str, message: &str) -> Result<String, PromptError> {
    fill_template(ARXIV_CHAT_TEMPLATE, &[("content", content), ("message", message)])
}

pub fn get_paper_card(
    index: usize,
    title: &str,
    pdf_url: &str,
    authors: &str,
    abstract_text: &str
) -> Result<String, PromptError> {
    let index = index.to_string();
    fill_template(
        PAPER_CARD_TEMPLATE,
        &[
            ("index", index.as_str()),
            ("title", title),
            ("pdf_url", pdf_url),
            ("authors", authors),
            ("abstract", abstract_text),
        ]
    )
}

pub fn get_card_container(content: &str) -> Result<String, PromptError> {
    fill_template(PAPER_CARD_CONTAINER, &[("content", content)])
}

pub fn get_grounding_entry(
    title: &str,
    authors: &str,
    abstract_text: &str
) -> Result<String, PromptError> {
    fill_template(
        PAPER_GROUNDING_ENTRY,
        &[("title", title), ("authors", authors), ("abstract", abstract_text)]
    )
}
