//! Persona catalog and the one-round clarification protocol.
//!
//! Resolution contract: resolve to exactly one persona, or pause once and ask
//! the user. The catalog is read-only and injected at construction; nothing
//! here touches global state.

use crate::collaborators::{CollaboratorError, TextGenerator};
use serde::{Deserialize, Serialize};

/// Name of the fallback persona every catalog carries.
pub const DEFAULT_PERSONA: &str = "default";

const DEFAULT_TONE: &str = "Answer in a clear, warm, professional voice. Ground every claim in \
    the retrieved material, keep paragraphs short, and say plainly when the collection does not \
    cover something.";

const JANELLE_TONE: &str = "Answer as Janelle: direct, encouraging, and practical. Lead with the \
    takeaway, speak from experience in the first person, and close with one concrete step the \
    reader can try this week.";

/// A named tone/voice profile applied to generated answers. Read-only catalog
/// entry; never mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    /// Tone guidance injected into generation prompts.
    pub tone: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, tone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tone: tone.into(),
        }
    }
}

/// The set of voices an answer can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl PersonaCatalog {
    /// Catalog with the built-in voices.
    pub fn builtin() -> Self {
        Self {
            personas: vec![
                Persona::new(DEFAULT_PERSONA, DEFAULT_TONE),
                Persona::new("janelle", JANELLE_TONE),
            ],
        }
    }

    /// Catalog from explicit entries; a "default" persona is appended when the
    /// caller didn't supply one, so tone fallback always has a target.
    pub fn new(personas: Vec<Persona>) -> Self {
        let mut personas = personas;
        if !personas
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(DEFAULT_PERSONA))
        {
            personas.push(Persona::new(DEFAULT_PERSONA, DEFAULT_TONE));
        }
        Self { personas }
    }

    pub fn names(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.name.as_str()).collect()
    }

    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<&Persona> {
        let name = name.trim();
        self.personas
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Built-in tone text for `name`, falling back to the default persona.
    pub fn tone_for(&self, name: &str) -> &str {
        self.find(name)
            .or_else(|| self.find(DEFAULT_PERSONA))
            .map(|p| p.tone.as_str())
            .unwrap_or(DEFAULT_TONE)
    }
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Outcome of one resolution round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaResolution {
    /// A persona was identified. `restored_query` carries the preserved
    /// original query when this turn answered a prior clarification.
    Resolved {
        persona: String,
        restored_query: Option<String>,
    },
    /// Neither the message nor the classifier named a persona; the caller
    /// should return this prompt and re-invoke once the user replies.
    NeedsClarification { prompt: String },
}

/// Runs the three-step resolution protocol against a catalog.
pub struct PersonaResolver<'c> {
    catalog: &'c PersonaCatalog,
}

impl<'c> PersonaResolver<'c> {
    pub fn new(catalog: &'c PersonaCatalog) -> Self {
        Self { catalog }
    }

    /// Resolves a persona for the newest user message.
    ///
    /// (a) A message that is itself an exact persona-name token answers a
    /// prior clarification; the preserved query is restored.
    /// (b) Otherwise the generator is asked a constrained single-token
    /// classification question; only an exact catalog name is accepted.
    /// (c) Otherwise a clarification enumerating the known personas is
    /// returned and the turn halts.
    pub async fn resolve<G: TextGenerator + ?Sized>(
        &self,
        generator: &G,
        latest_user_text: &str,
        preserved_query: Option<&str>,
    ) -> Result<PersonaResolution, CollaboratorError> {
        if let Some(persona) = self.exact_name_token(latest_user_text) {
            tracing::debug!(
                target: "docent::persona",
                persona = %persona,
                restored = preserved_query.is_some(),
                "persona resolved from exact name token"
            );
            return Ok(PersonaResolution::Resolved {
                persona,
                restored_query: preserved_query.map(str::to_string),
            });
        }

        let prompt = self.detection_prompt(latest_user_text);
        let reply = generator.generate(&prompt).await?;
        let token = normalize_token(&reply.content);
        if let Some(persona) = self.catalog.find(&token) {
            tracing::debug!(
                target: "docent::persona",
                persona = %persona.name,
                "persona resolved by classifier"
            );
            return Ok(PersonaResolution::Resolved {
                persona: persona.name.clone(),
                restored_query: preserved_query.map(str::to_string),
            });
        }

        // Ambiguous classifier output defaults to "no persona named".
        Ok(PersonaResolution::NeedsClarification {
            prompt: self.clarification_prompt(),
        })
    }

    /// The whole message as a persona name, e.g. a bare "janelle" answering a
    /// clarification.
    fn exact_name_token(&self, text: &str) -> Option<String> {
        let token = normalize_token(text);
        self.catalog.find(&token).map(|p| p.name.clone())
    }

    fn detection_prompt(&self, message: &str) -> String {
        format!(
            "You route questions to persona voices. Known personas: {names}.\n\
             If the message explicitly asks for one of these voices by name, reply with exactly \
             that name. If no persona is named, reply with exactly: none\n\
             Reply with a single lowercase token and nothing else.\n\n\
             Message: {message}",
            names = self.catalog.names().join(", "),
            message = message,
        )
    }

    /// Clarification message enumerating the known personas.
    pub fn clarification_prompt(&self) -> String {
        format!(
            "Which voice would you like for this answer? Known personas: {}. \
             Reply with one of these names to continue.",
            self.catalog.names().join(", ")
        )
    }
}

fn normalize_token(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_lowercase()
}
