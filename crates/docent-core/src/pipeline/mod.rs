//! Conversation orchestrator: the branching, stateful decision pipeline.
//!
//! One turn runs EXTRACT → CLASSIFY_INTENT → {ACK_SHORTCIRCUIT |
//! RESOLVE_PERSONA} → {AWAIT_PERSONA_CHOICE | RETRIEVE} → GRADE →
//! {COMPOSE_SOCIAL | COMPOSE_STANDARD} → REGISTER_FEEDBACK → OFFER_FEEDBACK,
//! synchronously and single-threaded. The only suspension point is the
//! persona clarification, which is a full return to the caller; resumption is
//! a re-invocation with accumulated history, not a held coroutine.
//!
//! Collaborator calls are single-attempt. Any collaborator error aborts the
//! turn with no partial state saved.

mod compose;
mod grade;
mod retrieval;

pub use grade::{Grade, SHORT_CONTEXT_OVERRIDE_CHARS};
pub use retrieval::{concatenated_context, retrieve, ScoredPassage};

use crate::collaborators::{CollaboratorError, SimilaritySearch, TextGenerator, ToneProfileSource};
use crate::intent;
use crate::persona::{PersonaCatalog, PersonaResolution, PersonaResolver};
use crate::shared::{Conversation, ConversationPhase, DocentConfig};
use docent_feedback::{FeedbackCollector, FeedbackStore, PassageMeta};
use std::sync::Arc;
use std::time::Instant;

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("conversation has no user turn")]
    NoUserTurn,
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// The result of one pipeline invocation. Exactly one of these shapes comes
/// back, so a paused clarification can never also carry a response id.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Acknowledgment short-circuit: a canned closing, no retrieval or
    /// generation, feedback already counted as collected for the turn.
    Closing { reply: String },
    /// Persona clarification issued; the turn is over. Re-invoke with the
    /// accumulated history and this phase to continue.
    AwaitingPersona {
        prompt: String,
        /// The user's question, preserved verbatim for the resumed turn.
        original_query: String,
    },
    /// A finalized answer.
    Answered {
        reply: String,
        response_id: String,
        persona: String,
        grade: Grade,
        social: bool,
        /// Whether the caller should ask the user for a rating.
        feedback_requested: bool,
        latency_ms: u64,
        passages: Vec<ScoredPassage>,
    },
}

/// The conversational workflow orchestrator. Collaborators and the feedback
/// store are injected at construction; the pipeline itself holds no mutable
/// state between invocations, so independent conversations can run as
/// independent invocations sharing only the store.
pub struct ConversationPipeline<S, G, T> {
    search: S,
    generator: G,
    tones: T,
    catalog: PersonaCatalog,
    store: Arc<FeedbackStore>,
    collector: FeedbackCollector,
    top_k: usize,
}

impl<S, G, T> ConversationPipeline<S, G, T>
where
    S: SimilaritySearch,
    G: TextGenerator,
    T: ToneProfileSource,
{
    pub fn new(
        search: S,
        generator: G,
        tones: T,
        catalog: PersonaCatalog,
        store: Arc<FeedbackStore>,
        config: &DocentConfig,
    ) -> Self {
        Self {
            search,
            generator,
            tones,
            catalog,
            collector: FeedbackCollector::new(Arc::clone(&store)),
            store,
            top_k: config.top_k,
        }
    }

    /// The correlator, for routing user ratings back after a turn.
    pub fn collector(&self) -> &FeedbackCollector {
        &self.collector
    }

    /// Runs one conversational turn over the supplied history.
    pub async fn run_turn(&self, conversation: &Conversation) -> Result<TurnOutcome, PipelineError> {
        let started = Instant::now();

        // EXTRACT. The newest user turn is the working query.
        let query = conversation
            .latest_user_text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(PipelineError::NoUserTurn)?;

        // A single-turn history is a new conversation: any carried-over phase
        // is stale state from an unrelated exchange and is discarded.
        let phase = if conversation.is_new() {
            ConversationPhase::Open
        } else {
            conversation.phase.clone()
        };

        // CLASSIFY_INTENT: acknowledgment short-circuit.
        if intent::is_acknowledgment(&query) {
            tracing::info!(target: "docent::pipeline", "acknowledgment; returning canned closing");
            return Ok(TurnOutcome::Closing {
                reply: intent::closing_reply(&query).to_string(),
            });
        }

        // RESOLVE_PERSONA. Retrieval never runs while a clarification is open.
        let preserved = match &phase {
            ConversationPhase::AwaitingPersona { original_query } => Some(original_query.as_str()),
            ConversationPhase::Open => None,
        };
        let resolver = PersonaResolver::new(&self.catalog);
        let (persona, query) = match resolver
            .resolve(&self.generator, &query, preserved)
            .await?
        {
            PersonaResolution::Resolved {
                persona,
                restored_query,
            } => {
                let effective = restored_query.unwrap_or(query);
                (persona, effective)
            }
            PersonaResolution::NeedsClarification { prompt } => {
                let original_query = preserved.map(str::to_string).unwrap_or_else(|| query.clone());
                tracing::info!(
                    target: "docent::pipeline",
                    "persona unresolved; pausing for clarification"
                );
                return Ok(TurnOutcome::AwaitingPersona {
                    prompt,
                    original_query,
                });
            }
        };

        let social = intent::is_social_media_request(&query);
        let shape = intent::query_shape(&query);
        let tone = self
            .tones
            .tone_profile(&persona)
            .unwrap_or_else(|| self.catalog.tone_for(&persona).to_string());

        // RETRIEVE.
        let passages = retrieval::retrieve(&self.search, &self.store, &query, self.top_k).await?;
        let context = retrieval::concatenated_context(&passages);

        // GRADE, with the short-context override on top of the grader's raw
        // verdict.
        let mut grade = grade::grade_context(&self.generator, &query, &context).await?;
        if context.chars().count() < SHORT_CONTEXT_OVERRIDE_CHARS {
            grade = Grade::Relevant;
        }

        // COMPOSE.
        let reply = compose::compose_reply(
            &self.generator,
            &query,
            &context,
            &tone,
            grade,
            social,
            shape,
            &passages,
        )
        .await?;

        // REGISTER_FEEDBACK. Registration never fails the turn.
        let latency_ms = started.elapsed().as_millis() as u64;
        let metas: Vec<PassageMeta> = passages.iter().map(|p| p.passage.meta()).collect();
        let response_id =
            self.collector
                .register_response(&query, &reply, &metas, &persona, latency_ms);

        // OFFER_FEEDBACK.
        let feedback_requested = self.collector.should_request_feedback(&query);

        tracing::info!(
            target: "docent::pipeline",
            response_id = %response_id,
            persona = %persona,
            grade = ?grade,
            social = social,
            latency_ms = latency_ms,
            "turn answered"
        );

        Ok(TurnOutcome::Answered {
            reply,
            response_id,
            persona,
            grade,
            social,
            feedback_requested,
            latency_ms,
            passages,
        })
    }
}
