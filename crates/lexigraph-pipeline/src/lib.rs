//! Build side of the lexical graph
//!
//! ```text
//! SourceDocument ─► Extractor ─► ExtractionFragment ─► GraphBuilder ─► tenant stores
//!                      ▲                                     ▲
//!                      └──────── BatchOrchestrator ──────────┘
//! ```
//!
//! [`LexicalGraphIndex`] wires the stages together behind the `extract`,
//! `build` and `extract_and_build` entry points.

pub mod build;
pub mod document;
pub mod error;
pub mod extraction;
pub mod fragment;
pub mod index;
pub mod orchestrator;
pub mod parsing;
pub mod prompts;

pub use build::{BuildReport, FailedGroup, GraphBuilder};
pub use document::SourceDocument;
pub use error::{PipelineError, PipelineResult, PipelineWarning};
pub use extraction::{ClassificationSet, DocumentExtraction, Extractor};
pub use fragment::{ExtractionFragment, FragmentRef};
pub use index::{ExtractReport, GraphStats, IndexReport, LexicalGraphIndex};
pub use orchestrator::{BatchOrchestrator, BatchReport, BatchUnit, FailedItem, Progress};
