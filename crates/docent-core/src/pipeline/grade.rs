//! Relevance grading: one classification call, reduced to a binary verdict.

use crate::collaborators::{CollaboratorError, TextGenerator};

/// Context shorter than this always grades relevant, whatever the grader
/// said. Bias toward optimistic answering over false negatives.
pub const SHORT_CONTEXT_OVERRIDE_CHARS: usize = 50;

/// Binary relevance verdict over retrieved passages for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Relevant,
    NotRelevant,
}

impl Grade {
    pub fn is_relevant(&self) -> bool {
        matches!(self, Grade::Relevant)
    }
}

fn grading_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a grader assessing whether retrieved documents can answer a user question.\n\
         Weigh three things: direct relevance to the question, conceptual alignment with its \
         topic, and whether the material is actionable for the asker.\n\n\
         Retrieved documents:\n{context}\n\n\
         User question: {question}\n\n\
         Give a binary score 'yes' or 'no' to indicate whether the documents are relevant \
         to the question.",
        context = context,
        question = query,
    )
}

/// Asks the generator for a relevance verdict. Any reply containing "yes"
/// (case-insensitive) is relevant; everything else is not.
pub async fn grade_context<G: TextGenerator + ?Sized>(
    generator: &G,
    query: &str,
    context: &str,
) -> Result<Grade, CollaboratorError> {
    let reply = generator.generate(&grading_prompt(query, context)).await?;
    let grade = if reply.content.to_lowercase().contains("yes") {
        Grade::Relevant
    } else {
        Grade::NotRelevant
    };
    tracing::debug!(target: "docent::pipeline", grade = ?grade, "context graded");
    Ok(grade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Generation;

    struct FixedGenerator(String);

    #[async_trait::async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<Generation, CollaboratorError> {
            Ok(Generation::new(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn yes_substring_is_relevant() {
        for reply in ["yes", "Yes.", "YES, clearly relevant"] {
            let generator = FixedGenerator(reply.to_string());
            assert_eq!(
                grade_context(&generator, "q", "ctx").await.unwrap(),
                Grade::Relevant
            );
        }
    }

    #[tokio::test]
    async fn anything_else_is_not_relevant() {
        for reply in ["no", "No.", "unrelated", ""] {
            let generator = FixedGenerator(reply.to_string());
            assert_eq!(
                grade_context(&generator, "q", "ctx").await.unwrap(),
                Grade::NotRelevant
            );
        }
    }
}
