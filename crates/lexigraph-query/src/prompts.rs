//! Answer prompt templates

use lexigraph_core::template;

pub const ANSWER_FULLY: &str = "Answer the question fully, using every relevant statement.";
pub const ANSWER_CONCISELY: &str = "Answer the question concisely, in no more than a few sentences.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a question answering agent. \
Answer only from the search results provided. If the search results do not \
contain the answer, say that you do not know.";

pub const DEFAULT_USER_PROMPT: &str = "<search_results>\n{search_results}\n</search_results>\n\n\
{answer_mode}\n\nQuestion: {query}";

/// System and user templates
///
/// The user template takes `{query}`, `{search_results}` and
/// `{answer_mode}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub system: String,
    pub user: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            user: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    pub fn render(&self, query: &str, search_results: &str, verbose: bool) -> String {
        let answer_mode = if verbose { ANSWER_FULLY } else { ANSWER_CONCISELY };
        let user = template::render(
            &self.user,
            &[
                ("search_results", search_results),
                ("answer_mode", answer_mode),
                ("query", query),
            ],
        );
        format!("{}\n\n{}", self.system, user)
    }
}
