//! Response composition: prompt variant selection and citation appending.

use crate::citations::{citation_block, citation_line};
use crate::collaborators::{CollaboratorError, TextGenerator};
use crate::intent::QueryShape;
use crate::pipeline::grade::Grade;
use crate::pipeline::retrieval::ScoredPassage;

fn shape_instruction(shape: QueryShape) -> &'static str {
    match shape {
        QueryShape::HowTo => {
            "The question asks how to do something: answer as ordered, practical steps."
        }
        QueryShape::ListRequest(_) => {
            "The question asks for a specific number of items: answer as a numbered list of \
             exactly that many entries."
        }
        QueryShape::General => "Answer in flowing prose.",
    }
}

fn answer_prompt(query: &str, context: &str, tone: &str, shape: QueryShape) -> String {
    format!(
        "Voice guidance: {tone}\n\n\
         Based on the following context, answer the question. {shape}\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\n\
         Answer:",
        tone = tone,
        shape = shape_instruction(shape),
        context = context,
        query = query,
    )
}

fn knowledge_gap_prompt(query: &str, tone: &str) -> String {
    format!(
        "Voice guidance: {tone}\n\n\
         The document collection does not contain material relevant to this question. \
         Acknowledge, in your own voice, that you cannot give a confident answer, and do not \
         invent one. Suggest rephrasing or a nearby topic the collection does cover.\n\n\
         Question: {query}",
        tone = tone,
        query = query,
    )
}

fn social_post_prompt(context: &str, tone: &str) -> String {
    format!(
        "Voice guidance: {tone}\n\n\
         You are a social media content creator. Create a short, engaging post based on the \
         following information. The post should be concise, use appropriate hashtags, and stay \
         under 280 characters for Twitter/X compatibility.\n\n\
         Information to use:\n{context}\n\n\
         Create a social media post:",
        tone = tone,
        context = context,
    )
}

/// Composes the final reply for a graded turn: picks the prompt variant by
/// (social, grade, shape), invokes generation once, and appends citations to
/// relevant answers.
#[allow(clippy::too_many_arguments)]
pub async fn compose_reply<G: TextGenerator + ?Sized>(
    generator: &G,
    query: &str,
    context: &str,
    tone: &str,
    grade: Grade,
    social: bool,
    shape: QueryShape,
    passages: &[ScoredPassage],
) -> Result<String, CollaboratorError> {
    let prompt = match (social, grade) {
        (_, Grade::NotRelevant) => knowledge_gap_prompt(query, tone),
        (true, Grade::Relevant) => social_post_prompt(context, tone),
        (false, Grade::Relevant) => answer_prompt(query, context, tone, shape),
    };

    let reply = generator.generate(&prompt).await?;
    if let Some(usage) = reply.usage {
        tracing::debug!(
            target: "docent::pipeline",
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "generation token usage"
        );
    }

    let mut answer = reply.content;
    if grade.is_relevant() {
        // Compact citations for short-form posts, the full block otherwise.
        let citations = if social {
            citation_line(passages)
        } else {
            citation_block(passages)
        };
        answer.push_str(&citations);
    }
    Ok(answer)
}
