//! Shared types used across the Docent crates: configuration, conversation
//! turns, and retrieved passages.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of passages requested from the similarity search.
pub const DEFAULT_TOP_K: usize = 3;

/// Global application configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocentConfig {
    /// Application identity, used in log lines.
    pub app_name: String,
    /// Base directory for the feedback database.
    pub storage_path: String,
    /// Passages requested per retrieval.
    pub top_k: usize,
}

impl DocentConfig {
    /// Path of the feedback SQLite database under `storage_path`.
    pub fn feedback_db_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join("feedback.db")
    }

    /// Load config from file and environment. Precedence: env `DOCENT_CONFIG`
    /// path > `config/docent.toml` > defaults, with `DOCENT`-prefixed env vars
    /// overriding everything.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("DOCENT_CONFIG").unwrap_or_else(|_| "config/docent".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Docent")?
            .set_default("storage_path", "./data")?
            .set_default("top_k", DEFAULT_TOP_K as i64)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("DOCENT").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

impl Default for DocentConfig {
    fn default() -> Self {
        Self {
            app_name: "Docent".to_string(),
            storage_path: "./data".to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation. The caller supplies the full turn history
/// on every invocation; Docent does not own durable chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Where a conversation stands between invocations. Carried explicitly in
/// metadata so the pipeline never has to re-parse prior assistant messages to
/// learn that it asked for a persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConversationPhase {
    /// Normal flow; no pending clarification.
    Open,
    /// A persona clarification was issued; the original query is preserved
    /// verbatim until the user picks a voice.
    AwaitingPersona { original_query: String },
}

/// A conversation as handed to the pipeline: full turn history plus phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub turns: Vec<ConversationTurn>,
    pub phase: ConversationPhase,
}

impl Conversation {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self {
            turns,
            phase: ConversationPhase::Open,
        }
    }

    /// A conversation resuming after a persona clarification.
    pub fn resuming(turns: Vec<ConversationTurn>, original_query: impl Into<String>) -> Self {
        Self {
            turns,
            phase: ConversationPhase::AwaitingPersona {
                original_query: original_query.into(),
            },
        }
    }

    /// A turn history of exactly one message means a brand-new conversation;
    /// any carried-over phase is discarded.
    pub fn is_new(&self) -> bool {
        self.turns.len() == 1
    }

    /// Text of the newest user turn, if any.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.text.as_str())
    }
}

/// A retrieved document chunk plus metadata from the similarity-search
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// The excerpt text.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Source locator (URL or path) for citations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            doc_id: None,
            title: None,
            source: None,
        }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The metadata slice persisted by the feedback subsystem.
    pub fn meta(&self) -> docent_feedback::PassageMeta {
        docent_feedback::PassageMeta {
            doc_id: self.doc_id.clone(),
            title: self.title.clone(),
            source: self.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_turn_conversation_is_new() {
        let conversation = Conversation::resuming(
            vec![ConversationTurn::user("hello")],
            "stale query",
        );
        assert!(conversation.is_new());
    }

    #[test]
    fn latest_user_text_skips_assistant_turns() {
        let conversation = Conversation::new(vec![
            ConversationTurn::user("first"),
            ConversationTurn::assistant("reply"),
            ConversationTurn::user("second"),
            ConversationTurn::assistant("another reply"),
        ]);
        assert_eq!(conversation.latest_user_text(), Some("second"));
    }

    #[test]
    fn config_defaults() {
        let config = DocentConfig::default();
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!(config.feedback_db_path().ends_with("feedback.db"));
    }
}
