use std::sync::Arc;

use tutor_core::config::{ConversationSettings, RetrievalSettings, Settings};
use tutor_core::domain::{ConversationSession, EntityBuffer, Exchange, TenantKey};
use tutor_core::error::{codes, AppError};

use crate::citations::{cited_sources, strip_citations};
use crate::entities::{EntityExtractor, HeuristicEntityExtractor};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseManager, Retriever, ScoredChunk};
use crate::llm::Llm;

pub mod prompts;

/// Returned when no passage clears the similarity threshold. The model is not called.
pub const NO_RELEVANT_INFO: &str = "I couldn't find any relevant information in my knowledge base.";

/// Source label reported when an answer drew on no retrieved passage.
pub const GENERAL_KNOWLEDGE: &str = "general knowledge";

const PRONOUNS: &[&str] = &["he", "she", "it", "they", "his", "her", "their", "them"];

/// Answers student questions against one knowledge base, carrying conversation state
/// in an explicit [`ConversationSession`] value.
pub struct ConversationEngine {
    llm: Arc<dyn Llm>,
    retriever: Arc<dyn Retriever>,
    extractor: Arc<dyn EntityExtractor>,
    llm_model: String,
    retrieval: RetrievalSettings,
    conversation: ConversationSettings,
}

impl ConversationEngine {
    pub fn new(
        llm: Arc<dyn Llm>,
        retriever: Arc<dyn Retriever>,
        llm_model: impl Into<String>,
        retrieval: RetrievalSettings,
        conversation: ConversationSettings,
    ) -> Self {
        Self {
            llm,
            retriever,
            extractor: Arc::new(HeuristicEntityExtractor),
            llm_model: llm_model.into(),
            retrieval,
            conversation,
        }
    }

    pub fn from_settings(llm: Arc<dyn Llm>, retriever: Arc<dyn Retriever>, settings: &Settings) -> Self {
        Self::new(
            llm,
            retriever,
            settings.provider.llm_model.clone(),
            settings.retrieval.clone(),
            settings.conversation.clone(),
        )
    }

    pub fn with_entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Binds a fresh session to the subject. Fails with `KB_NOT_FOUND` until the subject's
    /// knowledge base has been built.
    pub fn start_session(
        &self,
        manager: &KnowledgeBaseManager,
        key: &TenantKey,
        subject_name: &str,
    ) -> Result<(ConversationSession, Arc<KnowledgeBase>), AppError> {
        let kb = manager.load(key)?.ok_or_else(|| {
            AppError::new(codes::KB_NOT_FOUND, "No knowledge base found for this subject")
                .with_details(format!("tenant={key}"))
        })?;
        tracing::info!(tenant = %key, chunks = kb.len(), "conversation session started");
        Ok((ConversationSession::new(key.subject_id, subject_name), kb))
    }

    /// Runs one question through retrieval and generation.
    ///
    /// Returns the updated session and the reply text. On error the caller's session is
    /// unchanged; nothing is committed until generation succeeds.
    pub fn answer(
        &self,
        session: &ConversationSession,
        kb: &KnowledgeBase,
        question: &str,
    ) -> Result<(ConversationSession, String), AppError> {
        let query = augment_query(question, session.entity_buffer());
        if query != question {
            tracing::debug!(subject_id = session.subject_id, query = %query, "augmented query");
        }

        let passages: Vec<ScoredChunk> = self
            .retriever
            .search(kb, &query, self.retrieval.number_of_chunks)?
            .into_iter()
            .filter(|hit| hit.score >= self.retrieval.similarity_threshold)
            .collect();
        if passages.is_empty() {
            tracing::info!(
                subject_id = session.subject_id,
                threshold = self.retrieval.similarity_threshold,
                "no passage above similarity threshold"
            );
            return Ok((session.clone(), NO_RELEVANT_INFO.to_string()));
        }

        let mut buffer = session.entity_buffer().clone();
        buffer.merge(self.extractor.extract(question));
        let passage_text = passages
            .iter()
            .map(|p| p.chunk.text())
            .collect::<Vec<_>>()
            .join("\n");
        buffer.merge(self.extractor.extract(&passage_text));

        let history = truncate_history(
            session.history(),
            self.conversation.max_history_length,
            self.conversation.max_history_tokens,
        );
        let prompt = prompts::tutor_prompt(
            &session.subject_name,
            &history,
            &buffer.snapshot(),
            &passages,
            question,
        );

        let raw = self.llm.generate(&self.llm_model, &prompt)?;
        let clean = strip_citations(&raw);
        if clean.is_empty() {
            return Err(AppError::new(
                codes::AI_GENERATION_FAILED,
                "Completion contained no answer text",
            )
            .with_details(format!("model={}", self.llm_model)));
        }

        let sources = passage_sources(&passages);
        let cited = cited_sources(&raw);
        if cited.iter().any(|c| !sources.contains(c)) {
            tracing::debug!(?cited, ?sources, "model cited names outside the retrieved passages");
        }

        let entities = buffer.snapshot();
        let mut next = session.clone();
        *next.entity_buffer_mut() = buffer;
        next.push_exchange(Exchange {
            question: question.to_string(),
            response: clean.clone(),
            sources: sources.clone(),
            entities,
        });

        let reply = format!("{clean}\n\nSources: {}", sources.join(", "));
        Ok((next, reply))
    }
}

/// Appends the remembered entities to a question that leans on a pronoun.
pub fn augment_query(question: &str, buffer: &EntityBuffer) -> String {
    if buffer.is_empty() || !mentions_pronoun(question) {
        return question.to_string();
    }
    format!("{question} {}", buffer.joined())
}

fn mentions_pronoun(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|t| PRONOUNS.contains(&t.to_lowercase().as_str()))
}

pub fn render_history(exchanges: &[Exchange]) -> String {
    exchanges
        .iter()
        .map(|e| format!("Student: {}\nAssistant: {}", e.question, e.response))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders at most `max_exchanges` recent exchanges, dropping the oldest until the text fits
/// in `max_words` whitespace-separated words. The stored history is not touched.
pub fn truncate_history(history: &[Exchange], max_exchanges: usize, max_words: usize) -> String {
    let mut window = &history[history.len().saturating_sub(max_exchanges)..];
    let mut rendered = render_history(window);
    while !window.is_empty() && rendered.split_whitespace().count() > max_words {
        window = &window[1..];
        rendered = render_history(window);
    }
    rendered
}

fn passage_sources(passages: &[ScoredChunk]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in passages {
        let id = p.chunk.source_id();
        if !out.iter().any(|s| s == id) {
            out.push(id.to_string());
        }
    }
    if out.is_empty() {
        out.push(GENERAL_KNOWLEDGE.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exchange(q: &str, r: &str) -> Exchange {
        Exchange {
            question: q.to_string(),
            response: r.to_string(),
            sources: vec![],
            entities: vec![],
        }
    }

    #[test]
    fn pronoun_questions_pick_up_buffered_entities() {
        let mut buffer = EntityBuffer::new();
        assert_eq!(augment_query("What did he discover?", &buffer), "What did he discover?");

        buffer.merge(["Newton"]);
        assert_eq!(
            augment_query("What did he discover?", &buffer),
            "What did he discover? Newton"
        );
        assert_eq!(augment_query("Their legacy?", &buffer), "Their legacy? Newton");
        // Whole tokens only.
        assert_eq!(augment_query("Where is the theatre?", &buffer), "Where is the theatre?");
    }

    #[test]
    fn history_keeps_only_recent_exchanges() {
        let history = vec![exchange("q1", "r1"), exchange("q2", "r2"), exchange("q3", "r3")];
        assert_eq!(
            truncate_history(&history, 2, 1000),
            "Student: q2\nAssistant: r2\nStudent: q3\nAssistant: r3"
        );
        assert_eq!(truncate_history(&history, 0, 1000), "");
    }

    #[test]
    fn history_respects_word_budget() {
        let history = vec![
            exchange("one two three", "four five six"),
            exchange("seven", "eight"),
        ];
        // Each rendering adds the two role labels as words.
        assert_eq!(truncate_history(&history, 5, 4), "Student: seven\nAssistant: eight");
        assert_eq!(truncate_history(&history, 5, 3), "");
        assert_eq!(render_history(&history).split_whitespace().count(), 12);
    }
}
