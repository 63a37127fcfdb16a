//! Extraction stage: chunks to topics, statements, facts and entities
//!
//! Everything produced here is tenant-independent. Ids are computed as soon
//! as a unit is parsed, so a proposition repeated across chunks collapses to
//! one statement node in the fragment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lexigraph_config::ExtractionConfig;
use lexigraph_core::{
    Chunk, EdgeKind, Embedding, EmbeddingModel, Entity, Fact, GraphEdge, GraphNode, IdGenerator,
    InferOptions, LanguageModel, Source, Statement, Topic, VectorIndex,
};
use tracing::{debug, info, warn};

use crate::document::SourceDocument;
use crate::error::{PipelineResult, PipelineWarning};
use crate::fragment::ExtractionFragment;
use crate::orchestrator::BatchUnit;
use crate::parsing::{
    merge_classifications, parse_classifications, parse_facts, parse_topics,
    resolve_classification, ParsedTopic, LOCAL_ENTITY_CLASSIFICATION,
};
use crate::prompts::{render, CLASSIFICATION_PROMPT, EXTRACT_FACT_PROMPT, EXTRACT_TOPIC_PROMPT};

/// Classification set shared by every document of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationSet {
    pub labels: Vec<String>,
    /// Set when the pre-pass failed and only preferred labels are in use
    pub fallback: Option<PipelineWarning>,
}

impl ClassificationSet {
    fn prompt_value(&self) -> String {
        if self.labels.is_empty() {
            "any".to_string()
        } else {
            self.labels.join(", ")
        }
    }
}

/// Extraction output for one document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentExtraction {
    pub source_id: String,
    pub fragment: ExtractionFragment,
    pub warnings: Vec<PipelineWarning>,
}

impl DocumentExtraction {
    /// Chunks that were left out because their extraction failed
    pub fn skipped_chunks(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                PipelineWarning::ChunkSkipped { chunk_id, .. } => Some(chunk_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Runs the model prompts of the extraction stage
pub struct Extractor {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn EmbeddingModel>,
    config: ExtractionConfig,
    ids: IdGenerator,
    options: InferOptions,
}

impl Extractor {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
        config: ExtractionConfig,
    ) -> Self {
        let ids = IdGenerator::new(
            config.include_classification_in_entity_id,
            config.use_chunk_id_delimiter,
        );
        Self {
            llm,
            embedder,
            config,
            ids,
            options: InferOptions::default(),
        }
    }

    #[must_use]
    pub fn with_infer_options(mut self, options: InferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id_generator(&self) -> IdGenerator {
        self.ids
    }

    // ========================================================================
    // Classification pre-pass
    // ========================================================================

    /// One inference per batch proposing the entity classifications
    ///
    /// Only a fatal model error fails; anything else falls back to the
    /// preferred classifications with a warning.
    pub async fn infer_classifications(
        &self,
        documents: &[SourceDocument],
    ) -> PipelineResult<ClassificationSet> {
        let preferred = self.config.preferred_entity_classifications.clone();
        if !self.config.infer_entity_classifications {
            return Ok(ClassificationSet {
                labels: preferred,
                fallback: None,
            });
        }

        let sample: Vec<&str> = documents
            .iter()
            .flat_map(|d| d.chunks.iter())
            .map(String::as_str)
            .take(self.config.classification_sample_size)
            .collect();
        if sample.is_empty() {
            return Ok(ClassificationSet {
                labels: preferred,
                fallback: None,
            });
        }

        let template = self
            .config
            .classification_prompt
            .as_deref()
            .unwrap_or(CLASSIFICATION_PROMPT);
        let text = sample.join("\n\n");
        let prompt = render(template, &[("text", text.as_str())]);

        match self.llm.infer(&prompt, &self.options).await {
            Ok(response) => {
                let labels = merge_classifications(&preferred, &parse_classifications(&response));
                debug!(count = labels.len(), "inferred entity classifications");
                Ok(ClassificationSet {
                    labels,
                    fallback: None,
                })
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(error = %e, "classification pre-pass failed, using preferred classifications");
                Ok(ClassificationSet {
                    labels: preferred,
                    fallback: Some(PipelineWarning::ClassificationFallback {
                        error: e.to_string(),
                    }),
                })
            }
        }
    }

    // ========================================================================
    // Per-document extraction
    // ========================================================================

    /// Extract one document
    ///
    /// A chunk whose extraction fails is skipped with a warning; only fatal
    /// errors are returned.
    pub async fn extract_document(
        &self,
        document: &SourceDocument,
        classifications: &ClassificationSet,
    ) -> PipelineResult<DocumentExtraction> {
        let start = Instant::now();
        let source_id = document.source_id(&self.ids);
        let metadata_str = document.metadata_str();

        let mut fragment = ExtractionFragment::new();
        fragment.add_node(GraphNode::Source(Source {
            source_id: source_id.clone(),
            metadata: document.metadata.clone(),
        }));

        let mut warnings = Vec::new();
        if let Some(fallback) = &classifications.fallback {
            warnings.push(fallback.clone());
        }

        let mut previous_chunk: Option<String> = None;
        for (sequence, text) in document.chunks.iter().enumerate() {
            let chunk_id = self.ids.create_chunk_id(&source_id, text, &metadata_str);
            let chunk = Chunk {
                chunk_id: chunk_id.clone(),
                source_id: source_id.clone(),
                text: text.clone(),
                sequence,
            };

            match self.extract_chunk(chunk, classifications).await {
                Ok(chunk_fragment) => {
                    fragment.merge(chunk_fragment);
                    if let Some(previous) = previous_chunk.replace(chunk_id.clone()) {
                        if previous != chunk_id {
                            fragment.add_edge(GraphEdge::new(EdgeKind::Next, previous, &chunk_id));
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(source_id = %source_id, chunk_id = %chunk_id, error = %e, "skipping chunk");
                    warnings.push(PipelineWarning::ChunkSkipped {
                        source_id: source_id.clone(),
                        chunk_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            source_id = %source_id,
            nodes = fragment.node_count(),
            edges = fragment.edge_count(),
            skipped = warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "extracted document"
        );

        Ok(DocumentExtraction {
            source_id,
            fragment,
            warnings,
        })
    }

    async fn extract_chunk(
        &self,
        chunk: Chunk,
        classifications: &ClassificationSet,
    ) -> PipelineResult<ExtractionFragment> {
        let mut fragment = ExtractionFragment::new();
        let chunk_id = chunk.chunk_id.clone();
        let source_id = chunk.source_id.clone();

        let vector = self.embedder.embed(&chunk.text).await?;
        fragment.add_embedding(Embedding {
            index: VectorIndex::Chunk,
            id: chunk_id.clone(),
            source_id: source_id.clone(),
            vector,
        });

        let template = self
            .config
            .extract_topic_prompt
            .as_deref()
            .unwrap_or(EXTRACT_TOPIC_PROMPT);
        let labels = classifications.prompt_value();
        let prompt = render(
            template,
            &[("classifications", labels.as_str()), ("text", chunk.text.as_str())],
        );
        let response = self.llm.infer(&prompt, &self.options).await?;
        let topics = parse_topics(&response);
        debug!(chunk_id = %chunk_id, topics = topics.topics.len(), "parsed topics");

        fragment.add_edge(GraphEdge::new(EdgeKind::ExtractedFrom, &chunk_id, &source_id));
        fragment.add_node(GraphNode::Chunk(chunk));

        for topic in topics.topics {
            self.extract_topic(&mut fragment, &source_id, &chunk_id, topic, classifications)
                .await?;
        }
        Ok(fragment)
    }

    async fn extract_topic(
        &self,
        fragment: &mut ExtractionFragment,
        source_id: &str,
        chunk_id: &str,
        topic: ParsedTopic,
        classifications: &ClassificationSet,
    ) -> PipelineResult<()> {
        let topic_id = self.ids.create_topic_id(source_id, &topic.label);
        fragment.add_node(GraphNode::Topic(Topic {
            topic_id: topic_id.clone(),
            source_id: source_id.to_string(),
            label: topic.label.clone(),
        }));
        fragment.add_edge(GraphEdge::new(EdgeKind::MentionedIn, &topic_id, chunk_id));

        for text in topic.propositions {
            let statement_id = self.ids.create_statement_id(&topic_id, &text);
            let vector = self.embedder.embed(&text).await?;
            fragment.add_embedding(Embedding {
                index: VectorIndex::Statement,
                id: statement_id.clone(),
                source_id: source_id.to_string(),
                vector,
            });

            let details = self
                .extract_facts(fragment, source_id, &statement_id, &topic.label, &text, classifications)
                .await?;

            fragment.add_node(GraphNode::Statement(Statement {
                statement_id: statement_id.clone(),
                topic_id: topic_id.clone(),
                text,
                details,
            }));
            fragment.add_edge(GraphEdge::new(EdgeKind::BelongsTo, &statement_id, &topic_id));
            fragment.add_edge(GraphEdge::new(EdgeKind::MentionedIn, &statement_id, chunk_id));
        }
        Ok(())
    }

    /// Adds fact and entity nodes; returns the statement details
    async fn extract_facts(
        &self,
        fragment: &mut ExtractionFragment,
        source_id: &str,
        statement_id: &str,
        topic: &str,
        statement: &str,
        classifications: &ClassificationSet,
    ) -> PipelineResult<Vec<String>> {
        let template = self
            .config
            .extract_fact_prompt
            .as_deref()
            .unwrap_or(EXTRACT_FACT_PROMPT);
        let labels = classifications.prompt_value();
        let prompt = render(
            template,
            &[
                ("classifications", labels.as_str()),
                ("topic", topic),
                ("statement", statement),
            ],
        );
        let response = self.llm.infer(&prompt, &self.options).await?;
        let parsed = parse_facts(&response);

        // lowercase mention -> entity id
        let mut entities: BTreeMap<String, String> = BTreeMap::new();
        for entity in &parsed.entities {
            let classification = resolve_classification(&entity.classification, &classifications.labels);
            let entity_id = self.ids.create_entity_id(&entity.value, &classification);
            entities.insert(entity.value.to_lowercase(), entity_id.clone());
            fragment.add_node(GraphNode::Entity(Entity {
                entity_id,
                value: entity.value.clone(),
                classification,
            }));
        }

        for fact in parsed.facts {
            let subject_id = match entities.get(&fact.subject.to_lowercase()) {
                Some(id) => id.clone(),
                None => {
                    let id = self.ids.create_local_entity_id(source_id, &fact.subject);
                    fragment.add_node(GraphNode::Entity(Entity {
                        entity_id: id.clone(),
                        value: fact.subject.clone(),
                        classification: LOCAL_ENTITY_CLASSIFICATION.to_string(),
                    }));
                    id
                }
            };
            let object_id = entities.get(&fact.object.to_lowercase()).cloned();

            let value = format!("{} {} {}", fact.subject, fact.predicate, fact.object);
            let fact_id = self.ids.create_fact_id(&value);

            fragment.add_edge(GraphEdge::new(EdgeKind::Supports, &fact_id, statement_id));
            fragment.add_edge(GraphEdge::new(EdgeKind::Subject, &fact_id, &subject_id));
            if let Some(object_id) = &object_id {
                fragment.add_edge(GraphEdge::new(EdgeKind::Object, &fact_id, object_id));
            }
            fragment.add_node(GraphNode::Fact(Fact {
                fact_id,
                subject_id,
                predicate: fact.predicate,
                complement: object_id.is_none().then(|| fact.object.clone()),
                object_id,
                value,
            }));
        }

        Ok(parsed.details)
    }
}

#[async_trait]
impl BatchUnit for Extractor {
    type Item = SourceDocument;
    type Context = ClassificationSet;
    type Output = DocumentExtraction;

    fn item_id(&self, item: &SourceDocument) -> String {
        item.source_id(&self.ids)
    }

    async fn prepare(&self, batch: &[SourceDocument]) -> PipelineResult<ClassificationSet> {
        self.infer_classifications(batch).await
    }

    async fn process(
        &self,
        item: &SourceDocument,
        context: &ClassificationSet,
    ) -> PipelineResult<DocumentExtraction> {
        self.extract_document(item, context).await
    }
}
