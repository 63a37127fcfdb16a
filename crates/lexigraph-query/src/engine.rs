//! `TraversalQueryEngine`: question in, grounded answer out
//!
//! ```text
//! Received ─► SeedSearch ─► Expand ─► Format ─► Invoke ─► Done
//!                 │
//!                 └─► EmptyResult (no seeds for the tenant)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use lexigraph_config::{ConfigError, ContextFormat, QueryConfig};
use lexigraph_core::versioning::now_millis;
use lexigraph_core::{
    EmbeddingModel, GraphStore, InferOptions, LanguageModel, MetadataFilter, TenantId,
    VectorStore,
};
use tracing::{debug, info};

use crate::error::{QueryError, QueryResult};
use crate::format::{format_context, to_context_topics};
use crate::processors::{BedrockXmlFormatter, PostProcessor, ScoreRerank, StatementLimit};
use crate::prompts::PromptTemplates;
use crate::results::{SearchResults, SourceTrace};
use crate::retriever::{GraphRetriever, RetrievalSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    SeedSearch,
    Expand,
    Format,
    Invoke,
    Done,
    /// No seeds were found for the tenant
    EmptyResult,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Done | QueryState::EmptyResult)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Received => "received",
            QueryState::SeedSearch => "seed_search",
            QueryState::Expand => "expand",
            QueryState::Format => "format",
            QueryState::Invoke => "invoke",
            QueryState::Done => "done",
            QueryState::EmptyResult => "empty_result",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProfile {
    /// Seed search plus graph expansion; context defaults to `text`
    Traversal,
    /// Seed search only; context is always `bedrock_xml`
    Similarity,
}

/// Per-query overrides of the engine configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<MetadataFilter>,
    pub context_format: Option<ContextFormat>,
    pub verbose: Option<bool>,
    /// Epoch milliseconds; defaults to now
    pub as_of: Option<i64>,
}

impl QueryOptions {
    #[must_use]
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_context_format(mut self, format: ContextFormat) -> Self {
        self.context_format = Some(format);
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    #[must_use]
    pub fn with_as_of(mut self, as_of: i64) -> Self {
        self.as_of = Some(as_of);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    /// Sources behind the answer, when the source trace is enabled
    pub sources: Option<Vec<SourceTrace>>,
    pub state: QueryState,
    /// Serialized context sent to the model
    pub context: String,
}

impl QueryResponse {
    fn empty(sources: Option<Vec<SourceTrace>>) -> Self {
        Self {
            answer: String::new(),
            sources,
            state: QueryState::EmptyResult,
            context: String::new(),
        }
    }
}

pub struct TraversalQueryEngine {
    config: QueryConfig,
    profile: SearchProfile,
    retriever: GraphRetriever,
    llm: Arc<dyn LanguageModel>,
    processors: Vec<Arc<dyn PostProcessor>>,
    prompts: PromptTemplates,
    infer_options: InferOptions,
}

impl TraversalQueryEngine {
    /// Engine with graph expansion, formatting context as `text` unless
    /// configured otherwise
    pub fn for_traversal_based_search(
        config: QueryConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> QueryResult<Self> {
        Self::new(SearchProfile::Traversal, config, graph, vectors, llm, embedder)
    }

    /// Engine ranking statements by similarity alone
    ///
    /// Context is always `bedrock_xml`; format preferences are ignored.
    pub fn for_similarity_based_search(
        config: QueryConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> QueryResult<Self> {
        Self::new(SearchProfile::Similarity, config, graph, vectors, llm, embedder)
    }

    fn new(
        profile: SearchProfile,
        config: QueryConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> QueryResult<Self> {
        for (field, value) in [
            ("query.top_k", config.top_k),
            ("query.max_statements_per_topic", config.max_statements_per_topic),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        Ok(Self {
            config,
            profile,
            retriever: GraphRetriever::new(graph, vectors, embedder),
            llm,
            processors: Vec::new(),
            prompts: PromptTemplates::default(),
            infer_options: InferOptions::default(),
        })
    }

    /// Append a post-processor after the built-in ranking and limit steps
    #[must_use]
    pub fn with_post_processor(mut self, processor: Arc<dyn PostProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_infer_options(mut self, options: InferOptions) -> Self {
        self.infer_options = options;
        self
    }

    pub fn profile(&self) -> SearchProfile {
        self.profile
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Format used for a query with these options
    pub fn context_format(&self, options: &QueryOptions) -> ContextFormat {
        match self.profile {
            SearchProfile::Similarity => ContextFormat::BedrockXml,
            SearchProfile::Traversal => options
                .context_format
                .or(self.config.context_format)
                .unwrap_or(ContextFormat::Text),
        }
    }

    fn settings(&self, options: &QueryOptions) -> RetrievalSettings {
        RetrievalSettings {
            top_k: self.config.top_k,
            include_chunk_seeds: self.config.include_chunk_seeds,
            max_hops: match self.profile {
                SearchProfile::Traversal => self.config.max_hops,
                SearchProfile::Similarity => 0,
            },
            versioning: self.config.versioning,
            as_of: options.as_of.unwrap_or_else(now_millis),
        }
    }

    fn pipeline(&self, format: ContextFormat) -> Vec<Arc<dyn PostProcessor>> {
        let mut pipeline: Vec<Arc<dyn PostProcessor>> = vec![
            Arc::new(ScoreRerank),
            Arc::new(StatementLimit(self.config.max_statements_per_topic)),
        ];
        pipeline.extend(self.processors.iter().cloned());
        if format == ContextFormat::BedrockXml {
            pipeline.push(Arc::new(BedrockXmlFormatter));
        }
        pipeline
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Seed search, expansion and post-processing without invoking the model
    pub async fn retrieve(
        &self,
        question: &str,
        tenant: &TenantId,
        options: &QueryOptions,
    ) -> QueryResult<SearchResults> {
        let settings = self.settings(options);
        let filter = options.filter.as_ref();

        let start = Instant::now();
        debug!(tenant = %tenant, state = %QueryState::SeedSearch, "query state");
        let mut seeds = self
            .retriever
            .seed_search(question, filter, &settings, tenant)
            .await?;
        if seeds.is_empty() {
            return Ok(SearchResults::default());
        }
        let seed_count = seeds.len();

        debug!(tenant = %tenant, state = %QueryState::Expand, "query state");
        self.retriever.expand(&mut seeds, &settings, tenant).await?;
        let mut results = self
            .retriever
            .assemble(&seeds, filter, &settings, tenant)
            .await?;

        for processor in self.pipeline(self.context_format(options)) {
            results = processor.process(results, question)?;
            debug!(processor = processor.name(), statements = results.statement_count(), "post-processed");
        }

        info!(
            tenant = %tenant,
            seeds = seed_count,
            statements = results.statement_count(),
            topics = results.groups.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "retrieval complete"
        );
        Ok(results)
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Answer `question` from the tenant's graph
    ///
    /// A tenant without matching statements yields an empty answer in the
    /// [`QueryState::EmptyResult`] state; the model is not called.
    pub async fn query(
        &self,
        question: &str,
        tenant: &TenantId,
        options: &QueryOptions,
    ) -> QueryResult<QueryResponse> {
        let start = Instant::now();
        debug!(tenant = %tenant, state = %QueryState::Received, "query state");

        let results = self.retrieve(question, tenant, options).await?;
        let trace = self
            .config
            .include_source_trace
            .then(|| results.source_trace());
        if results.is_empty() {
            debug!(tenant = %tenant, state = %QueryState::EmptyResult, "query state");
            return Ok(QueryResponse::empty(trace));
        }

        debug!(tenant = %tenant, state = %QueryState::Format, "query state");
        let format = self.context_format(options);
        let context = match results.prebuilt_context {
            Some(ref prebuilt) => prebuilt.clone(),
            None => format_context(format, &to_context_topics(&results))?,
        };

        debug!(tenant = %tenant, state = %QueryState::Invoke, "query state");
        let verbose = options.verbose.unwrap_or(self.config.verbose);
        let prompt = self.prompts.render(question, &context, verbose);
        let answer = self.llm.infer(&prompt, &self.infer_options).await?;

        info!(
            tenant = %tenant,
            format = %format,
            statements = results.statement_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query answered"
        );
        debug!(tenant = %tenant, state = %QueryState::Done, "query state");

        Ok(QueryResponse {
            answer,
            sources: trace,
            state: QueryState::Done,
            context,
        })
    }

    /// Not supported; use [`query`](Self::query)
    pub async fn query_streaming(
        &self,
        _question: &str,
        _tenant: &TenantId,
        _options: &QueryOptions,
    ) -> QueryResult<QueryResponse> {
        Err(QueryError::StreamingUnsupported)
    }
}
