use crate::citations::citation_marker;
use crate::knowledge::ScoredChunk;

pub const NO_HISTORY: &str = "(no previous conversation)";
pub const NO_ENTITIES: &str = "(none)";

/// Passages in retrieval order, each headed by its citation marker.
pub fn context_blocks(passages: &[ScoredChunk]) -> String {
    passages
        .iter()
        .map(|p| format!("{}\n{}", citation_marker(p.chunk.source_id()), p.chunk.text()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn tutor_prompt(
    subject_name: &str,
    history: &str,
    entities: &[String],
    passages: &[ScoredChunk],
    question: &str,
) -> String {
    let history = if history.trim().is_empty() {
        NO_HISTORY
    } else {
        history
    };
    let entities = if entities.is_empty() {
        NO_ENTITIES.to_string()
    } else {
        entities.join(", ")
    };
    let context = context_blocks(passages);

    format!(
        r#"You are a teaching assistant for the course "{subject_name}".

Rules:
1) Answer ONLY from the context passages below. Do not use outside knowledge.
2) Cite every passage you rely on inline, in the form [Source: <name>], using the name shown above the passage.
3) If the question uses a pronoun (he, she, it, they, ...) that the conversation and the recently mentioned entities do not resolve, ask the student to clarify instead of guessing.
4) If the context does not contain the answer, say that the course material does not cover it.

Conversation so far:
{history}

Recently mentioned entities: {entities}

Context passages:
{context}

Student question:
{question}

Answer:
"#
    )
}
