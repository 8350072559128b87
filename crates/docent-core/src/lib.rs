//! docent-core: conversational answer pipeline over a document corpus.
//!
//! The pipeline takes a conversation history, detects intent, resolves a
//! persona voice (pausing once to ask when it can't), retrieves and grades
//! corpus passages, composes a persona-voiced answer with citations, and
//! registers the response with the feedback subsystem so human ratings can
//! adjust future retrieval ranking.
//!
//! External services (vector similarity search, text generation, tone
//! profiles) are reached through the traits in [`collaborators`] and
//! injected at construction.

pub mod citations;
mod collaborators;
mod intent;
mod persona;
mod pipeline;
mod shared;

pub use collaborators::{
    CollaboratorError, Generation, NoToneProfiles, SimilaritySearch, TextGenerator, TokenUsage,
    ToneProfileSource,
};
pub use intent::{is_acknowledgment, is_social_media_request, query_shape, QueryShape};
pub use persona::{
    Persona, PersonaCatalog, PersonaResolution, PersonaResolver, DEFAULT_PERSONA,
};
pub use pipeline::{
    concatenated_context, retrieve, ConversationPipeline, Grade, PipelineError, ScoredPassage,
    TurnOutcome, SHORT_CONTEXT_OVERRIDE_CHARS,
};
pub use shared::{
    Conversation, ConversationPhase, ConversationTurn, DocentConfig, Passage, Role, DEFAULT_TOP_K,
};
