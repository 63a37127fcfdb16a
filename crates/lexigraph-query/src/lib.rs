//! Query side of the lexical graph
//!
//! [`TraversalQueryEngine`] embeds a question, seeds from the statement (and
//! optionally chunk) vector index, expands through facts and entities,
//! groups what it found by topic and asks the language model for an answer
//! grounded in that context.

pub mod engine;
pub mod error;
pub mod format;
pub mod processors;
pub mod prompts;
pub mod results;
pub mod retriever;

pub use engine::{QueryOptions, QueryResponse, QueryState, SearchProfile, TraversalQueryEngine};
pub use error::{QueryError, QueryResult};
pub use format::{format_context, parse_context, ContextStatement, ContextTopic};
pub use processors::{BedrockXmlFormatter, PostProcessor, ScoreRerank, StatementLimit};
pub use prompts::PromptTemplates;
pub use results::{RetrievedStatement, SearchResults, SourceTrace, TopicGroup};
pub use retriever::{GraphRetriever, RetrievalSettings, Seeds};
