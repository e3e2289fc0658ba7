//! Core data model
//!
//! Records for the three memory layers, routing decisions, and the
//! request/response types of the write and retrieval pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::similarity::new_id;

/// The three memory layers, in retrieval-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Exact key-value user attributes (never embedded)
    Identity,
    /// Conversational events with importance decay
    Experience,
    /// Durable skills and concepts (always embedded)
    Knowledge,
}

impl Layer {
    /// Classifier output order: identity, experience, knowledge.
    pub const ALL: [Layer; 3] = [Layer::Identity, Layer::Experience, Layer::Knowledge];

    /// Retrieval merge priority; higher sorts first.
    pub fn priority(self) -> u8 {
        match self {
            Layer::Identity => 3,
            Layer::Experience => 2,
            Layer::Knowledge => 1,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Layer::Identity => 0,
            Layer::Experience => 1,
            Layer::Knowledge => 2,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Identity => write!(f, "identity"),
            Layer::Experience => write!(f, "experience"),
            Layer::Knowledge => write!(f, "knowledge"),
        }
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "identity" | "imm" => Ok(Layer::Identity),
            "experience" | "emm" => Ok(Layer::Experience),
            "knowledge" | "kmm" => Ok(Layer::Knowledge),
            other => Err(format!("unknown layer: {other}")),
        }
    }
}

/// Routing decision: a target layer or a meta-outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Identity,
    Experience,
    Knowledge,
    /// Top probability below the confidence threshold; ask the user
    Ask,
    /// Two layers within the conflict margin of each other
    Conflict,
    /// Safety-blocked; the caller must not persist
    Blocked,
}

impl Decision {
    pub fn layer(self) -> Option<Layer> {
        match self {
            Decision::Identity => Some(Layer::Identity),
            Decision::Experience => Some(Layer::Experience),
            Decision::Knowledge => Some(Layer::Knowledge),
            _ => None,
        }
    }
}

impl From<Layer> for Decision {
    fn from(layer: Layer) -> Self {
        match layer {
            Layer::Identity => Decision::Identity,
            Layer::Experience => Decision::Experience,
            Layer::Knowledge => Decision::Knowledge,
        }
    }
}

/// Conversation context tags for experience entries.
///
/// Declaration order is the tie-break order for context detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationContext {
    #[default]
    General,
    Family,
    Work,
    College,
    Personal,
    Health,
    Hobby,
}

impl std::fmt::Display for ConversationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConversationContext::General => "general",
            ConversationContext::Family => "family",
            ConversationContext::Work => "work",
            ConversationContext::College => "college",
            ConversationContext::Personal => "personal",
            ConversationContext::Health => "health",
            ConversationContext::Hobby => "hobby",
        };
        write!(f, "{label}")
    }
}

/// Category of an identity fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Identity,
    Preference,
    Trait,
    Boundary,
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FactCategory::Identity => "identity",
            FactCategory::Preference => "preference",
            FactCategory::Trait => "trait",
            FactCategory::Boundary => "boundary",
        };
        write!(f, "{label}")
    }
}

/// How an identity fact entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    Explicit,
    Inferred,
}

/// An exact key-value user attribute (IMM).
///
/// At most one fact per key is canonical: the one with the highest
/// confidence. Older duplicates are tolerated as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityFact {
    pub id: String,
    /// Lowercase token, e.g. `name`, `diet`, `allergy`, `preferred_name`
    pub key: String,
    /// Verbatim token or phrase
    pub value: String,
    pub category: FactCategory,
    /// Monotonically non-decreasing under reinforcement; only conflict
    /// resolution may drop it (to 0.7 on replacement)
    pub confidence: f32,
    pub confirmation_count: u32,
    pub last_confirmed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub source: FactSource,
}

impl IdentityFact {
    pub fn new(key: impl Into<String>, value: impl Into<String>, category: FactCategory) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            key: key.into(),
            value: value.into(),
            category,
            confidence: 0.8,
            confirmation_count: 1,
            last_confirmed: now,
            created_at: now,
            source: FactSource::Explicit,
        }
    }
}

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A conversational event (EMM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub id: String,
    pub content: String,
    pub context: ConversationContext,
    pub timestamp: DateTime<Utc>,
    /// Current importance; decays toward the floor over time
    pub importance: f32,
    /// Importance at creation; the decay anchor, never mutated
    pub original_importance: f32,
    pub role: Role,
    /// Absent when the embedding provider was unavailable at write time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ExperienceEntry {
    pub fn new(content: impl Into<String>, role: Role, importance: f32) -> Self {
        let importance = importance.clamp(0.0, 1.0);
        Self {
            id: new_id(),
            content: content.into(),
            context: ConversationContext::General,
            timestamp: Utc::now(),
            importance,
            original_importance: importance,
            role,
            embedding: None,
        }
    }

    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Category of a knowledge entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Skill,
    Concept,
    Fact,
}

/// A durable skill or concept (KMM). The embedding is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub content: String,
    pub category: KnowledgeCategory,
    pub embedding: Vec<f32>,
    pub confidence: f32,
    pub reinforcement_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(content: impl Into<String>, category: KnowledgeCategory, embedding: Vec<f32>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            category,
            embedding,
            confidence: 0.6,
            reinforcement_count: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Persisted classifier weights: one vector per layer, length D.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterWeights {
    pub identity: Vec<f32>,
    pub experience: Vec<f32>,
    pub knowledge: Vec<f32>,
}

impl RouterWeights {
    pub fn dimension(&self) -> usize {
        self.identity.len()
    }

    pub fn layer(&self, layer: Layer) -> &[f32] {
        match layer {
            Layer::Identity => &self.identity,
            Layer::Experience => &self.experience,
            Layer::Knowledge => &self.knowledge,
        }
    }

    pub fn layer_mut(&mut self, layer: Layer) -> &mut Vec<f32> {
        match layer {
            Layer::Identity => &mut self.identity,
            Layer::Experience => &mut self.experience,
            Layer::Knowledge => &mut self.knowledge,
        }
    }
}

/// A routing correction, appended to the correction log for retraining.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrectionEntry {
    pub text: String,
    pub context: Vec<String>,
    pub correct_layer: Layer,
    pub timestamp: DateTime<Utc>,
}

/// What produced a routing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Rule,
    Ml,
}

/// A structured intent surfaced by a slash command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CommandIntent {
    Recall { query: String },
    Forget { query: String },
    Remember { text: String },
}

/// The outcome of routing one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResult {
    pub decision: Decision,
    pub confidence: f32,
    pub source: RouteSource,
    /// Set when a slash command fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<CommandIntent>,
}

impl RoutingResult {
    pub fn rule(decision: Decision) -> Self {
        Self {
            decision,
            confidence: 1.0,
            source: RouteSource::Rule,
            intent: None,
        }
    }

    pub fn with_intent(mut self, intent: CommandIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// A write request entering the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub content: String,
    pub role: Role,
    #[serde(default)]
    pub context: ConversationContext,
    /// Bypass routing and target this layer directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_layer: Option<Layer>,
}

impl WriteRequest {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::User,
            context: ConversationContext::General,
            force_layer: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::Assistant,
            context: ConversationContext::General,
            force_layer: None,
        }
    }

    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.force_layer = Some(layer);
        self
    }
}

/// Suggested handling for an identity conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Existing fact is high-confidence; confirm with the user first
    AskUser,
    /// Existing fact is weakly held; replacing is reasonable
    Update,
}

/// A detected conflict between a stored identity fact and a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConflict {
    pub key: String,
    pub existing_id: String,
    pub existing_value: String,
    pub existing_confidence: f32,
    pub new_value: String,
    pub suggested_action: SuggestedAction,
}

/// User decision on a surfaced conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    KeepExisting,
    UpdateNew,
    AskLater,
}

/// The outcome of a write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<IdentityConflict>,
    /// Surfaced by `/forget`; nothing was persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forget_query: Option<String>,
    pub message: String,
}

impl WriteResult {
    pub fn ok(layer: Layer, entry_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            layer: Some(layer),
            entry_id: Some(entry_id.into()),
            conflict: None,
            forget_query: None,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            layer: None,
            entry_id: None,
            conflict: None,
            forget_query: None,
            message: message.into(),
        }
    }

    pub fn conflict(conflict: IdentityConflict) -> Self {
        let message = format!(
            "conflicting value for '{}': stored '{}', new '{}'",
            conflict.key, conflict.existing_value, conflict.new_value
        );
        Self {
            success: false,
            layer: Some(Layer::Identity),
            entry_id: None,
            conflict: Some(conflict),
            forget_query: None,
            message,
        }
    }
}

/// Options for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    #[serde(default)]
    pub context_filter: Option<ConversationContext>,
    #[serde(default = "default_true")]
    pub include_identity: bool,
    #[serde(default = "default_true")]
    pub include_experience: bool,
    #[serde(default = "default_true")]
    pub include_knowledge: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub semantic_threshold: f32,
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.4
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            context_filter: None,
            include_identity: true,
            include_experience: true,
            include_knowledge: true,
            top_k: default_top_k(),
            semantic_threshold: default_threshold(),
        }
    }
}

/// One retrieved memory, merged across layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub layer: Layer,
    pub content: String,
    pub confidence: f32,
    /// Present for semantic hits, absent for exact identity matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl RetrievedMemory {
    /// Within-layer ranking key: similarity when present, else confidence.
    pub fn rank_key(&self) -> f32 {
        self.similarity.unwrap_or(self.confidence)
    }
}
