//! Sub-question decomposition.

use tracing::warn;

use crate::context::TechniqueContext;

/// Splits a compound question into self-contained sub-questions via the
/// model. Degrades to the original question on any failure, so reasoning
/// can always proceed.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuestionDecomposer;

fn strip_list_marker(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("- ") {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    Some(rest.trim())
}

fn parse_sub_questions(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(strip_list_marker)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl QuestionDecomposer {
    pub fn new() -> Self {
        Self
    }

    pub async fn decompose(
        &self,
        ctx: &mut TechniqueContext,
        question: &str,
        max_depth: usize,
    ) -> Vec<String> {
        let prompt = format!(
            "Break the question into at most {max_depth} self-contained \
             sub-questions, numbered one per line. If it is already simple, \
             restate it as a single sub-question.\n\nQuestion: {question}"
        );
        let text = match ctx.generate(&prompt, 256, 0.2).await {
            Ok(generation) => generation.text,
            Err(e) => {
                warn!(error = %e, "decomposition failed, reasoning over the question as-is");
                return vec![question.to_string()];
            }
        };
        let mut sub_questions = parse_sub_questions(&text);
        sub_questions.truncate(max_depth);
        if sub_questions.is_empty() {
            vec![question.to_string()]
        } else {
            sub_questions
        }
    }
}
