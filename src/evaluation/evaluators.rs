//! LLM-as-judge evaluators.
//!
//! Diagnostic only: their results are printed, never persisted.

use crate::config::{JudgePrompts, Prompts};
use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument, warn};

/// Outcome of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub query: String,
    pub response: Option<String>,
    pub contexts: Vec<String>,
    /// Normalized to 0..=1.
    pub score: Option<f64>,
    pub passing: Option<bool>,
    pub feedback: String,
    pub invalid_result: bool,
    pub invalid_reason: Option<String>,
}

impl EvaluationResult {
    fn invalid(mut self, reason: impl Into<String>) -> Self {
        self.invalid_result = true;
        self.invalid_reason = Some(reason.into());
        self
    }
}

fn result_regex() -> &'static Regex {
    static RESULT: OnceLock<Regex> = OnceLock::new();
    RESULT.get_or_init(|| Regex::new(r"\[RESULT\]\s*(\d+(?:\.\d+)?)").expect("Invalid regex"))
}

/// Points after the last `[RESULT]` marker, if the judge followed the format.
pub fn parse_result_points(feedback: &str) -> Option<f64> {
    result_regex()
        .captures_iter(feedback)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Verdict of a pairwise judgement: `1.0` if A wins, `0.0` if B wins, `0.5` for a tie.
pub fn parse_pairwise_verdict(feedback: &str) -> Option<f64> {
    if feedback.contains("[[A]]") {
        Some(1.0)
    } else if feedback.contains("[[B]]") {
        Some(0.0)
    } else if feedback.contains("[[C]]") {
        Some(0.5)
    } else {
        None
    }
}

/// Scores whether a response addresses the query (two criteria, one point each).
pub struct AnswerRelevancyEvaluator {
    judge: Arc<dyn ChatModel>,
    template: String,
}

impl AnswerRelevancyEvaluator {
    const MAX_POINTS: f64 = 2.0;

    pub fn new(judge: Arc<dyn ChatModel>, prompts: &JudgePrompts) -> Self {
        Self {
            judge,
            template: prompts.answer_relevancy.clone(),
        }
    }

    #[instrument(skip(self, response))]
    pub async fn evaluate(&self, query: &str, response: &str) -> Result<EvaluationResult> {
        let mut vars = HashMap::new();
        vars.insert("query", query.to_string());
        vars.insert("response", response.to_string());
        let feedback = self.judge.complete(&Prompts::render(&self.template, &vars)).await?;

        let result = EvaluationResult {
            query: query.to_string(),
            response: Some(response.to_string()),
            feedback: feedback.clone(),
            ..Default::default()
        };
        Ok(score_points(result, &feedback, Self::MAX_POINTS))
    }
}

/// Scores whether retrieved contexts can answer the query (two criteria, two points each).
pub struct ContextRelevancyEvaluator {
    judge: Arc<dyn ChatModel>,
    template: String,
}

impl ContextRelevancyEvaluator {
    const MAX_POINTS: f64 = 4.0;

    pub fn new(judge: Arc<dyn ChatModel>, prompts: &JudgePrompts) -> Self {
        Self {
            judge,
            template: prompts.context_relevancy.clone(),
        }
    }

    #[instrument(skip(self, contexts), fields(contexts = contexts.len()))]
    pub async fn evaluate(&self, query: &str, contexts: &[String]) -> Result<EvaluationResult> {
        let mut vars = HashMap::new();
        vars.insert("query", query.to_string());
        vars.insert("context", contexts.join("\n\n"));
        let feedback = self.judge.complete(&Prompts::render(&self.template, &vars)).await?;

        let result = EvaluationResult {
            query: query.to_string(),
            contexts: contexts.to_vec(),
            feedback: feedback.clone(),
            ..Default::default()
        };
        Ok(score_points(result, &feedback, Self::MAX_POINTS))
    }
}

fn score_points(result: EvaluationResult, feedback: &str, max_points: f64) -> EvaluationResult {
    match parse_result_points(feedback) {
        Some(points) => EvaluationResult {
            score: Some((points / max_points).clamp(0.0, 1.0)),
            ..result
        },
        None => {
            warn!("Judge output has no [RESULT] score");
            result.invalid("Unable to parse the judge's score")
        }
    }
}

/// Compares two answers to the same query.
///
/// The judge sees the answers in both orders. When the two verdicts
/// disagree the result is a tie.
pub struct PairwiseEvaluator {
    judge: Arc<dyn ChatModel>,
    prompts: JudgePrompts,
}

impl PairwiseEvaluator {
    pub fn new(judge: Arc<dyn ChatModel>, prompts: &JudgePrompts) -> Self {
        Self {
            judge,
            prompts: prompts.clone(),
        }
    }

    /// Score is `1.0` when `response` is better than `second_response`.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn evaluate(
        &self,
        query: &str,
        response: &str,
        second_response: &str,
        reference: Option<&str>,
    ) -> Result<EvaluationResult> {
        let forward = self.judge_once(query, response, second_response, reference).await?;
        let backward = self.judge_once(query, second_response, response, reference).await?;

        let result = EvaluationResult {
            query: query.to_string(),
            response: Some(response.to_string()),
            contexts: reference.map(|r| vec![r.to_string()]).unwrap_or_default(),
            ..Default::default()
        };

        let (Some(first), Some(second)) = (
            parse_pairwise_verdict(&forward),
            parse_pairwise_verdict(&backward),
        ) else {
            return Ok(EvaluationResult {
                feedback: format!("{}\n\n{}", forward, backward),
                ..result
            }
            .invalid("Unable to parse the judge's verdict"));
        };

        debug!("Pairwise verdicts: {} then {}", first, 1.0 - second);

        let (score, feedback) = if (first - (1.0 - second)).abs() < f64::EPSILON {
            (first, forward)
        } else {
            (
                0.5,
                format!(
                    "It is not clear which answer is better: the verdict changed with the order.\n\n{}\n\n{}",
                    forward, backward
                ),
            )
        };

        Ok(EvaluationResult {
            score: Some(score),
            passing: if score > 0.5 {
                Some(true)
            } else if score < 0.5 {
                Some(false)
            } else {
                None
            },
            feedback,
            ..result
        })
    }

    async fn judge_once(
        &self,
        query: &str,
        answer_a: &str,
        answer_b: &str,
        reference: Option<&str>,
    ) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("query", query.to_string());
        vars.insert("answer_a", answer_a.to_string());
        vars.insert("answer_b", answer_b.to_string());
        vars.insert("reference", reference.unwrap_or_default().to_string());

        self.judge
            .chat(&[
                ChatMessage::system(self.prompts.pairwise_system.clone()),
                ChatMessage::user(Prompts::render(&self.prompts.pairwise_user, &vars)),
            ])
            .await
    }
}
