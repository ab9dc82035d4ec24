//! Question answering over the vector store.
//!
//! Pipeline: script/intent detection, entity extraction and alias
//! resolution, filtered retrieval, relevance-floor filtering, per-entity
//! aggregation, context assembly, generation with a deterministic template
//! fallback, and source attribution.
//!
//! Failures degrade to a language-matched template answer; `answer` never
//! raises and never returns an empty answer.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;
use std::time::Instant;

use crate::models::{ChatTurn, EntityTotal, QueryConfig, QueryResponse, ScoredChunk, SourceRef};
use crate::services::embedding::EmbeddingBackend;
use crate::services::generation::GenerationBackend;
use crate::services::normalize::{EntityNormalizer, contains_hangul};
use crate::services::vector_store::{MetadataFilter, VectorStore};

pub struct QueryEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    generator: Arc<dyn GenerationBackend>,
    normalizer: EntityNormalizer,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn GenerationBackend>,
        normalizer: EntityNormalizer,
        config: QueryConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            normalizer,
            config,
        }
    }

    /// Answer a question. Degrades to template answers on backend failure;
    /// the returned sources never include a chunk below the relevance floor.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> QueryResponse {
        let korean = contains_hangul(question);
        let started = Instant::now();

        // Step 1-3: intent, entity, alias resolution
        let wants_aggregation = self.normalizer.wants_aggregation(question);
        let entity = self.normalizer.resolve_entity(question);
        let date = self.normalizer.extract_date(question);

        let mut filter = MetadataFilter::new();
        if let Some(ref entity) = entity {
            filter = filter.eq("store", entity.value());
        }
        if let Some((ref date, false)) = date {
            filter = filter.eq("date", date.clone());
        }

        // Step 4: embed the (history-contextualized) question
        let contextualized = contextualize(question, history);
        let vectors = match self.embedder.embed(&[contextualized]).await {
            Ok(vectors) if !vectors.is_empty() => vectors,
            _ => {
                return degraded_response(korean, started.elapsed().as_millis() as u64);
            }
        };

        let results = match self
            .store
            .query(&vectors[0], self.config.top_k, &filter)
            .await
        {
            Ok(results) => results,
            Err(_) => {
                return degraded_response(korean, started.elapsed().as_millis() as u64);
            }
        };

        // Low-similarity chunks never become evidence or cited sources
        let surviving: Vec<ScoredChunk> = results
            .into_iter()
            .filter(|r| r.similarity >= self.config.similarity_floor)
            .collect();

        let retrieval_ms = started.elapsed().as_millis() as u64;

        if surviving.is_empty() {
            return QueryResponse {
                answer: not_available_answer(korean),
                sources: Vec::new(),
                totals: Vec::new(),
                retrieval_ms,
            };
        }

        // Step 5: per-entity aggregation
        let totals = if wants_aggregation {
            self.aggregate(&surviving)
        } else {
            Vec::new()
        };

        // Step 6-7: context assembly and generation with template fallback
        let context = build_context(&surviving);
        let answer = match self.generator.generate(question, &context, history).await {
            Ok(answer) if !answer.trim().is_empty() => answer,
            _ => fallback_answer(korean, &totals, &surviving),
        };

        // Step 8: attributed sources with similarity scores
        let sources = surviving
            .iter()
            .map(|r| SourceRef {
                chunk_id: r.chunk_id.clone(),
                filename: r.metadata.filename.clone(),
                similarity: r.similarity,
                snippet: snippet(&r.text),
            })
            .collect();

        QueryResponse {
            answer,
            sources,
            totals,
            retrieval_ms,
        }
    }

    /// Group surviving results by canonical entity and sum the `total`
    /// field per group. Sums are rounded to cents and never mixed across
    /// entities.
    fn aggregate(&self, results: &[ScoredChunk]) -> Vec<EntityTotal> {
        let mut totals: Vec<EntityTotal> = Vec::new();

        for result in results {
            let (Some(store), Some(amount)) = (&result.metadata.store, result.metadata.total)
            else {
                continue;
            };
            let entity = self.normalizer.canonical_value(store);

            match totals.iter_mut().find(|t| t.entity == entity) {
                Some(group) => {
                    group.total += amount;
                    group.count += 1;
                }
                None => totals.push(EntityTotal {
                    entity,
                    total: amount,
                    count: 1,
                }),
            }
        }

        for group in &mut totals {
            group.total = (group.total * 100.0).round() / 100.0;
        }
        totals
    }
}

/// Resolve follow-up questions against recent history before embedding.
fn contextualize(question: &str, history: &[ChatTurn]) -> String {
    const REFERENCES: &[&str] = &["it", "that", "this", "there", "then", "거기", "그거", "그때"];

    let lower = question.to_lowercase();
    let has_reference = REFERENCES.iter().any(|r| {
        if r.is_ascii() {
            lower
                .split_whitespace()
                .any(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()) == *r)
        } else {
            question.contains(r)
        }
    });

    if !has_reference || history.is_empty() {
        return question.to_string();
    }

    let mut parts: Vec<String> = history
        .iter()
        .rev()
        .take(4)
        .rev()
        .map(|turn| turn.content.chars().take(200).collect())
        .collect();
    parts.push(question.to_string());
    parts.join(". ")
}

/// Context block: per source, filename then explicit `metadata:` lines ahead
/// of the free text, so the generator prefers metadata fields for numeric
/// answers.
fn build_context(results: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for result in results {
        writeln!(context, "=== {} ===", result.metadata.filename).unwrap();
        for (key, value) in result.metadata.field_pairs() {
            writeln!(context, "metadata: {}={}", key, value).unwrap();
        }
        writeln!(context, "{}\n", result.text.trim_end()).unwrap();
    }
    context
}

fn snippet(text: &str) -> String {
    let trimmed: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        format!("{}...", trimmed)
    } else {
        trimmed
    }
}

fn degraded_response(korean: bool, retrieval_ms: u64) -> QueryResponse {
    let answer = if korean {
        "지금은 질문을 처리할 수 없습니다. 잠시 후 다시 시도해 주세요.".to_string()
    } else {
        "The answer is not available right now. Please try again in a moment.".to_string()
    };
    QueryResponse {
        answer,
        sources: Vec::new(),
        totals: Vec::new(),
        retrieval_ms,
    }
}

fn not_available_answer(korean: bool) -> String {
    if korean {
        "관련 정보를 찾을 수 없습니다. 질문을 바꾸거나 문서를 더 처리해 보세요.".to_string()
    } else {
        "That information is not available in your documents. Try rephrasing the question or \
         ingesting more documents."
            .to_string()
    }
}

/// Deterministic template answer built directly from the aggregation result.
fn fallback_answer(korean: bool, totals: &[EntityTotal], results: &[ScoredChunk]) -> String {
    if !totals.is_empty() {
        let mut out = String::new();
        for group in totals {
            if korean {
                writeln!(
                    out,
                    "{}에서 총 ${:.2}를 사용하셨습니다 (영수증 {}건).",
                    group.entity, group.total, group.count
                )
                .unwrap();
            } else {
                writeln!(
                    out,
                    "You spent a total of ${:.2} at {} across {} receipt(s).",
                    group.total, group.entity, group.count
                )
                .unwrap();
            }
        }
        return out.trim_end().to_string();
    }

    match results.first() {
        Some(best) => {
            let preview: String = best.text.chars().take(300).collect();
            if korean {
                format!("문서에서 찾은 내용: {}", preview)
            } else {
                format!("Based on the documents: {}", preview)
            }
        }
        None => not_available_answer(korean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, GenerationError};
    use crate::models::{ChunkMetadata, DocumentKind, StoredChunk};
    use crate::services::normalize::AliasTable;
    use async_trait::async_trait;
    use std::path::PathBuf;

    /// Returns a fixed vector for every input.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }

        fn model_name(&self) -> &str {
            "fixed-test-embedder"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Timeout)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing-test-embedder"
        }
    }

    struct StaticGenerator(Option<String>);

    #[async_trait]
    impl GenerationBackend for StaticGenerator {
        async fn generate(
            &self,
            _question: &str,
            _context: &str,
            _history: &[ChatTurn],
        ) -> Result<String, GenerationError> {
            match &self.0 {
                Some(answer) => Ok(answer.clone()),
                None => Err(GenerationError::Timeout),
            }
        }

        fn model_name(&self) -> &str {
            "static-test-generator"
        }
    }

    fn receipt_chunk(id: &str, store: &str, total: f64, embedding: Vec<f32>) -> StoredChunk {
        let mut metadata = ChunkMetadata::for_document(
            &PathBuf::from(format!("/receipts/{id}.jpeg")),
            DocumentKind::Receipt,
            0,
        );
        metadata.store = Some(store.to_string());
        metadata.total = Some(total);
        StoredChunk {
            id: id.to_string(),
            document_id: id.to_string(),
            text: format!("Receipt from {store}, total ${total:.2}"),
            embedding,
            metadata,
        }
    }

    async fn engine_with_chunks(
        chunks: Vec<StoredChunk>,
        query_vector: Vec<f32>,
        generator: StaticGenerator,
    ) -> (QueryEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::create(dir.path()).unwrap());
        store.upsert(chunks).await.unwrap();

        let engine = QueryEngine::new(
            store,
            Arc::new(FixedEmbedder(query_vector)),
            Arc::new(generator),
            EntityNormalizer::new(AliasTable::with_defaults()),
            QueryConfig::default(),
        );
        (engine, dir)
    }

    #[tokio::test]
    async fn test_costco_aggregation_excludes_other_merchants() {
        let chunks = vec![
            receipt_chunk("r1", "Costco Wholesale", 189.71, vec![1.0, 0.0]),
            receipt_chunk("r2", "Costco Wholesale", 222.18, vec![1.0, 0.05]),
            receipt_chunk("r3", "NOFRILLS", 36.44, vec![1.0, 0.1]),
        ];
        let (engine, _dir) =
            engine_with_chunks(chunks, vec![1.0, 0.0], StaticGenerator(None)).await;

        let response = engine.answer("total at Costco", &[]).await;

        assert_eq!(response.totals.len(), 1);
        assert_eq!(response.totals[0].entity, "Costco Wholesale");
        assert_eq!(response.totals[0].total, 411.89);
        assert_eq!(response.totals[0].count, 2);
        // NOFRILLS chunk is filtered out, not merely ignored by the sum
        assert!(response.sources.iter().all(|s| !s.snippet.contains("NOFRILLS")));
    }

    #[tokio::test]
    async fn test_korean_query_matches_english_metadata() {
        let chunks = vec![
            receipt_chunk("r1", "Costco Wholesale", 189.71, vec![1.0, 0.0]),
            receipt_chunk("r2", "Costco Wholesale", 222.18, vec![1.0, 0.05]),
        ];
        let (engine, _dir) =
            engine_with_chunks(chunks, vec![1.0, 0.0], StaticGenerator(None)).await;

        let response = engine.answer("코스트코에서 얼마나 썼어?", &[]).await;

        assert_eq!(response.totals.len(), 1);
        assert_eq!(response.totals[0].total, 411.89);
        // Template fallback answers in the question's language
        assert!(contains_hangul(&response.answer));
        assert!(response.answer.contains("411.89"));
    }

    #[tokio::test]
    async fn test_no_source_below_similarity_floor() {
        let chunks = vec![
            receipt_chunk("near", "Costco Wholesale", 10.0, vec![1.0, 0.0]),
            // Orthogonal vector: similarity 0.0, below the floor
            receipt_chunk("far", "Costco Wholesale", 99.0, vec![0.0, 1.0]),
        ];
        let (engine, _dir) = engine_with_chunks(
            chunks,
            vec![1.0, 0.0],
            StaticGenerator(Some("answer".to_string())),
        )
        .await;

        let response = engine.answer("total at Costco", &[]).await;

        assert_eq!(response.sources.len(), 1);
        assert!(response.sources.iter().all(|s| s.similarity >= 0.5));
        // The low-similarity chunk's amount never leaks into the aggregate
        assert_eq!(response.totals[0].total, 10.0);
    }

    #[tokio::test]
    async fn test_generation_failure_falls_back_to_template() {
        let chunks = vec![receipt_chunk("r1", "Costco Wholesale", 189.71, vec![1.0, 0.0])];
        let (engine, _dir) =
            engine_with_chunks(chunks, vec![1.0, 0.0], StaticGenerator(None)).await;

        let response = engine.answer("total at Costco", &[]).await;

        assert!(!response.answer.is_empty());
        assert!(response.answer.contains("$189.71"));
        assert!(response.answer.contains("Costco Wholesale"));
    }

    #[tokio::test]
    async fn test_no_results_yields_not_available() {
        let (engine, _dir) = engine_with_chunks(
            Vec::new(),
            vec![1.0, 0.0],
            StaticGenerator(Some("unused".to_string())),
        )
        .await;

        let response = engine.answer("total at Costco", &[]).await;
        assert!(response.answer.contains("not available"));
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::create(dir.path()).unwrap());
        let engine = QueryEngine::new(
            store,
            Arc::new(FailingEmbedder),
            Arc::new(StaticGenerator(Some("unused".to_string()))),
            EntityNormalizer::with_defaults(),
            QueryConfig::default(),
        );

        let response = engine.answer("total at Costco", &[]).await;
        assert!(response.answer.contains("not available"));
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_generated_answer_used_when_backend_succeeds() {
        let chunks = vec![receipt_chunk("r1", "Costco Wholesale", 189.71, vec![1.0, 0.0])];
        let (engine, _dir) = engine_with_chunks(
            chunks,
            vec![1.0, 0.0],
            StaticGenerator(Some("You spent $189.71 at Costco.".to_string())),
        )
        .await;

        let response = engine.answer("total at Costco", &[]).await;
        assert_eq!(response.answer, "You spent $189.71 at Costco.");
        assert_eq!(response.sources.len(), 1);
    }

    #[test]
    fn test_build_context_puts_metadata_before_text() {
        let chunk = receipt_chunk("r1", "Costco Wholesale", 222.18, vec![1.0]);
        let scored = ScoredChunk {
            chunk_id: chunk.id,
            text: chunk.text,
            metadata: chunk.metadata,
            similarity: 0.9,
        };
        let context = build_context(&[scored]);

        let metadata_pos = context.find("metadata: store=Costco Wholesale").unwrap();
        let total_pos = context.find("metadata: total=222.18").unwrap();
        let text_pos = context.find("Receipt from").unwrap();
        assert!(context.starts_with("=== r1.jpeg ==="));
        assert!(metadata_pos < text_pos);
        assert!(total_pos < text_pos);
    }

    #[test]
    fn test_contextualize_appends_history_for_references() {
        let history = vec![ChatTurn {
            role: crate::models::ChatRole::User,
            content: "how much at costco?".to_string(),
        }];
        let contextualized = contextualize("what card did I use there?", &history);
        assert!(contextualized.contains("costco"));

        let standalone = contextualize("total at Costco", &history);
        assert_eq!(standalone, "total at Costco");
    }
}
