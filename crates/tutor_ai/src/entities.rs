/// Pulls named entities out of free text, in order of first appearance, without duplicates.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Capitalized word runs ("Isaac Newton", "Paris") and acronyms ("DNA").
///
/// Function words that are only capitalized because they open a sentence ("The", "What",
/// "He") are not entities. A capitalized word that opens a sentence and is not one of them
/// still counts, so "Newton discovered gravity" yields `Newton`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEntityExtractor;

const SENTENCE_START_WORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "what", "which", "who", "whom", "whose",
    "when", "where", "why", "how", "is", "are", "was", "were", "do", "does", "did", "can",
    "could", "should", "would", "will", "shall", "may", "might", "must", "has", "have", "had",
    "i", "he", "she", "it", "they", "we", "you", "his", "her", "its", "their", "our", "your",
    "my", "in", "on", "at", "of", "for", "from", "to", "by", "with", "about", "after",
    "before", "during", "and", "but", "or", "so", "if", "then", "there", "here", "yes", "no",
    "please", "tell", "explain", "describe", "also", "however", "every", "each", "some", "all",
    "any", "many", "most",
];

struct Token {
    core: String,
    sentence_start: bool,
    breaks_after: bool,
}

impl EntityExtractor for HeuristicEntityExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut run: Vec<String> = Vec::new();

        for token in tokenize(text) {
            if is_capitalized(&token.core) {
                let skip = run.is_empty()
                    && token.sentence_start
                    && SENTENCE_START_WORDS.contains(&token.core.to_lowercase().as_str());
                if !skip {
                    run.push(token.core);
                }
            } else {
                flush(&mut run, &mut out);
            }
            if token.breaks_after {
                flush(&mut run, &mut out);
            }
        }
        flush(&mut run, &mut out);
        out
    }
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut sentence_start = true;
    for raw in text.split_whitespace() {
        let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let core = trimmed
            .strip_suffix("'s")
            .or_else(|| trimmed.strip_suffix("\u{2019}s"))
            .unwrap_or(trimmed)
            .to_string();
        let ends_sentence = raw
            .trim_end_matches(['"', '\'', ')', '\u{201d}'])
            .ends_with(|c: char| matches!(c, '.' | '!' | '?'));
        let breaks_after = raw
            .chars()
            .last()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(false);
        if !core.is_empty() {
            out.push(Token {
                core,
                sentence_start,
                breaks_after,
            });
        }
        sentence_start = ends_sentence;
    }
    out
}

fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_uppercase() => chars.next().is_some(),
        _ => false,
    }
}

fn flush(run: &mut Vec<String>, out: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    let entity = run.join(" ");
    run.clear();
    if !out.contains(&entity) {
        out.push(entity);
    }
}
