//! Importance scoring
//!
//! Heuristic initial importance for experience entries: a 0.5 base plus
//! bonuses for user speech, emotional language, questions, and length.

use crate::types::Role;

const EMOTIONAL_WORDS: &[&str] = &[
    "love", "hate", "fear", "hope", "dream", "worry", "excited", "sad", "happy", "angry",
    "frustrated",
];

const BASE: f32 = 0.5;
const USER_BONUS: f32 = 0.1;
const EMOTION_BONUS: f32 = 0.05;
const EMOTION_CAP: f32 = 0.2;
const QUESTION_BONUS: f32 = 0.1;
const LENGTH_BONUS: f32 = 0.1;
const LONG_UTTERANCE_WORDS: usize = 20;

/// Initial importance of an utterance, clamped to [0, 1].
pub fn score_importance(text: &str, role: Role) -> f32 {
    let lower = text.to_lowercase();
    let mut importance = BASE;

    if role == Role::User {
        importance += USER_BONUS;
    }

    let emotional_hits = EMOTIONAL_WORDS.iter().filter(|w| lower.contains(*w)).count();
    importance += (emotional_hits as f32 * EMOTION_BONUS).min(EMOTION_CAP);

    if text.contains('?') {
        importance += QUESTION_BONUS;
    }

    if text.split_whitespace().count() > LONG_UTTERANCE_WORDS {
        importance += LENGTH_BONUS;
    }

    importance.clamp(0.0, 1.0)
}
