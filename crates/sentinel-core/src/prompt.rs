//! Prompt assembly for retrieval-augmented answers.
//!
//! Renders the user question followed by the ranked context documents,
//! keeping the context block within a character budget.
//!
//! # Overflow
//!
//! Documents are added in rank order until the next one would exceed
//! `max_context_chars`; everything from that point on is dropped, so the
//! lowest-ranked documents go first. When even the top-ranked document
//! does not fit, it is cut at a char boundary and ends with
//! [`TRUNCATED_MARKER`].

use serde::Serialize;

use crate::models::QueryResult;

/// System instruction sent alongside every prompt.
pub const ANALYST_INSTRUCTIONS: &str = "You are a senior financial analyst. \
Answer the user's question using ONLY the information in the Context section. \
If the context does not contain the answer, say that the available news does not cover it. \
Keep the answer concise and professional.";

/// Appended to a context document that was cut to fit the budget.
pub const TRUNCATED_MARKER: &str = "[truncated]";

const NO_CONTEXT: &str = "No relevant news was found for this question. \
Tell the user that the available news does not cover it.";

const BLOCK_SEPARATOR: &str = "\n\n";

/// Whether the prompt carries retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Grounded,
    NoRelevantContext,
}

/// An assembled prompt plus bookkeeping about what made it in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub text: String,
    pub status: ContextStatus,
    /// Context documents rendered into `text`.
    pub included: usize,
    /// Context documents left out for budget reasons.
    pub dropped: usize,
    /// The top document was cut to fit.
    pub truncated: bool,
}

/// Build the prompt for `question` from ranked `context`.
pub fn assemble_prompt(question: &str, context: &[QueryResult], max_context_chars: usize) -> Prompt {
    let question = question.trim();

    if context.is_empty() {
        return Prompt {
            text: render(question, NO_CONTEXT),
            status: ContextStatus::NoRelevantContext,
            included: 0,
            dropped: 0,
            truncated: false,
        };
    }

    let mut body = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for (rank, result) in context.iter().enumerate() {
        let block = render_block(rank + 1, result);
        let cost = block.chars().count()
            + if included > 0 {
                BLOCK_SEPARATOR.len()
            } else {
                0
            };
        if used + cost > max_context_chars {
            break;
        }
        if included > 0 {
            body.push_str(BLOCK_SEPARATOR);
        }
        body.push_str(&block);
        used += cost;
        included += 1;
    }

    let mut truncated = false;
    if included == 0 {
        body = truncate_block(&render_block(1, &context[0]), max_context_chars);
        included = 1;
        truncated = true;
    }

    let dropped = context.len() - included;
    if dropped > 0 {
        tracing::debug!(included, dropped, max_context_chars, "context trimmed to budget");
    }

    Prompt {
        text: render(question, &body),
        status: ContextStatus::Grounded,
        included,
        dropped,
        truncated,
    }
}

fn render(question: &str, context: &str) -> String {
    format!("Question: {}\n\nContext:\n{}\n", question, context)
}

fn render_block(rank: usize, result: &QueryResult) -> String {
    format!(
        "[{}] {}\nTicker: {}\nPublished: {}\n{}",
        rank,
        result.headline,
        result.ticker.as_deref().unwrap_or("MARKET"),
        result.published_at.format("%Y-%m-%d %H:%M UTC"),
        result.content
    )
}

/// Cut `block` to at most `max_chars` chars, marker included. Below the
/// marker's own length only a prefix of the marker fits.
fn truncate_block(block: &str, max_chars: usize) -> String {
    let keep = max_chars.saturating_sub(TRUNCATED_MARKER.len() + 1);
    let cut: String = block.chars().take(keep).collect();
    let cut = cut.trim_end();
    if cut.is_empty() {
        TRUNCATED_MARKER.chars().take(max_chars).collect()
    } else {
        format!("{}\n{}", cut, TRUNCATED_MARKER)
    }
}
