//! Context detection
//!
//! Keyword-hit counting over a fixed lexicon. The context with the most
//! hits wins; ties go to the earlier entry in declaration order, and zero
//! hits means general.

use crate::types::ConversationContext;

const LEXICON: &[(ConversationContext, &[&str])] = &[
    (
        ConversationContext::Family,
        &[
            "mom", "dad", "mother", "father", "parent", "sibling", "brother", "sister", "family",
            "home", "grandma", "grandpa", "aunt", "uncle", "cousin", "wife", "husband", "spouse",
            "kid", "child", "son", "daughter",
        ],
    ),
    (
        ConversationContext::Work,
        &[
            "work", "job", "office", "boss", "colleague", "coworker", "project", "meeting",
            "deadline", "salary", "career", "promotion", "client", "business", "professional",
            "company", "manager", "team",
        ],
    ),
    (
        ConversationContext::College,
        &[
            "college", "university", "school", "class", "professor", "teacher", "exam", "test",
            "grade", "study", "student", "campus", "lecture", "homework", "assignment", "degree",
            "major", "semester",
        ],
    ),
    (
        ConversationContext::Personal,
        &[
            "myself", "i feel", "i think", "i believe", "my opinion", "personally", "my life",
            "my goal", "my dream", "my fear", "my hope",
        ],
    ),
    (
        ConversationContext::Health,
        &[
            "health", "doctor", "hospital", "medicine", "sick", "illness", "exercise", "diet",
            "sleep", "mental", "therapy", "anxiety", "depression", "stress", "workout", "gym",
            "weight",
        ],
    ),
    (
        ConversationContext::Hobby,
        &[
            "hobby", "game", "music", "movie", "book", "art", "sport", "travel", "cooking",
            "reading", "playing", "watching", "listening", "collecting", "photography", "painting",
        ],
    ),
];

/// Detect the dominant conversation context of an utterance.
pub fn detect_context(text: &str) -> ConversationContext {
    let lower = text.to_lowercase();

    let mut best = ConversationContext::General;
    let mut best_hits = 0usize;

    for (context, keywords) in LEXICON {
        let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
        if hits > best_hits {
            best_hits = hits;
            best = *context;
        }
    }

    best
}
