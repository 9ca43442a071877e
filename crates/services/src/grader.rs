//! Free-text answer grading.
//!
//! Grading runs in tiers, cheapest first: accepted-keyword containment, then
//! a normalized match against the expected answer, and only then the AI
//! oracle for free-text near-misses. The oracle is best-effort; callers are
//! expected to fail closed (mark the answer incorrect) when it errors.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hub_core::model::{GradedAnswer, QuizQuestion};

use crate::error::GraderError;

const GRADING_TIMEOUT: Duration = Duration::from_secs(15);

//
// ─── GRADER CONTRACT ───────────────────────────────────────────────────────────
//

/// Grades one free-text answer against its question.
#[async_trait]
pub trait AnswerGrader: Send + Sync {
    /// Produce a verdict for `answer`.
    ///
    /// # Errors
    ///
    /// Returns `GraderError` when the backend cannot produce a verdict at
    /// all; callers treat that as an incorrect answer.
    async fn grade(&self, question: &QuizQuestion, answer: &str)
    -> Result<GradedAnswer, GraderError>;
}

//
// ─── NORMALIZED MATCHING ───────────────────────────────────────────────────────
//

/// Lowercase, strip punctuation, drop leading articles, collapse whitespace.
fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped
        .split_whitespace()
        .filter(|word| !matches!(*word, "a" | "an" | "the"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Any accepted keyword appearing in the normalized answer counts.
fn contains_any_keyword(answer: &str, keywords: &[String]) -> bool {
    let normalized = normalize(answer);
    keywords.iter().any(|keyword| {
        let needle = normalize(keyword);
        !needle.is_empty() && normalized.contains(&needle)
    })
}

/// Flexible free-text match: exact after normalization, or containment in
/// either direction. An empty answer never matches.
fn matches_answer(user_answer: &str, correct_answer: &str) -> bool {
    let ua = normalize(user_answer);
    let ca = normalize(correct_answer);
    if ua.is_empty() || ca.is_empty() {
        return false;
    }
    ua == ca || ua.contains(&ca) || ca.contains(&ua)
}

fn deterministic_verdict(question: &QuizQuestion, answer: &str) -> Option<GradedAnswer> {
    if contains_any_keyword(answer, &question.accepted_keywords)
        || matches_answer(answer, &question.correct_answer)
    {
        return Some(GradedAnswer::correct(question, answer, None));
    }
    None
}

//
// ─── KEYWORD GRADER ────────────────────────────────────────────────────────────
//

/// Purely deterministic grader: keywords and normalized answer matching
/// only. Useful when no AI backend is configured, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordGrader;

#[async_trait]
impl AnswerGrader for KeywordGrader {
    async fn grade(
        &self,
        question: &QuizQuestion,
        answer: &str,
    ) -> Result<GradedAnswer, GraderError> {
        Ok(deterministic_verdict(question, answer)
            .unwrap_or_else(|| GradedAnswer::incorrect(question, answer, None)))
    }
}

//
// ─── AI GRADER ─────────────────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct AiGraderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl AiGraderConfig {
    /// Read configuration from `FOODHUB_AI_API_KEY`, `FOODHUB_AI_BASE_URL`,
    /// and `FOODHUB_AI_MODEL`. Returns `None` when no key is set, in which
    /// case grading stays deterministic.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("FOODHUB_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url =
            env::var("FOODHUB_AI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = env::var("FOODHUB_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Tiered grader: deterministic matching first, AI chat-completion fallback
/// for answers the cheap tiers reject.
///
/// With no configuration the AI tier is skipped entirely and the
/// deterministic verdict stands, so the grader degrades rather than erroring
/// when unconfigured.
#[derive(Clone)]
pub struct AiGrader {
    client: Client,
    config: Option<AiGraderConfig>,
}

impl AiGrader {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(AiGraderConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<AiGraderConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn grade_with_ai(
        &self,
        question: &QuizQuestion,
        answer: &str,
    ) -> Result<GradedAnswer, GraderError> {
        let config = self.config.as_ref().ok_or(GraderError::Disabled)?;

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_owned(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(question, answer),
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .timeout(GRADING_TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GraderError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GraderError::EmptyResponse)?;

        let verdict: AiVerdict = serde_json::from_str(content.trim())
            .map_err(|e| GraderError::MalformedVerdict(e.to_string()))?;

        Ok(apply_verdict(question, answer, verdict))
    }
}

#[async_trait]
impl AnswerGrader for AiGrader {
    async fn grade(
        &self,
        question: &QuizQuestion,
        answer: &str,
    ) -> Result<GradedAnswer, GraderError> {
        if let Some(graded) = deterministic_verdict(question, answer) {
            return Ok(graded);
        }

        if !self.enabled() {
            debug!("no AI grading backend configured; deterministic verdict stands");
            return Ok(GradedAnswer::incorrect(question, answer, None));
        }

        self.grade_with_ai(question, answer).await
    }
}

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

const SYSTEM_PROMPT: &str = "You are a grading assistant. Return JSON only. \
Never reveal the correct answer when wrong. Normalize comparisons: ignore \
case, punctuation, minor wording differences. If ANY accepted keyword \
appears in the normalized user answer, mark correct.";

fn build_user_prompt(question: &QuizQuestion, answer: &str) -> String {
    let keywords = if question.accepted_keywords.is_empty() {
        "none".to_owned()
    } else {
        question.accepted_keywords.join(", ")
    };
    format!(
        "Question: {question}\n\
         User Answer: {answer}\n\
         Expected Answer: {expected}\n\
         Accepted Keywords: {keywords}\n\
         Explanation (use if correct): {explanation}\n\
         Hint (use if wrong): {hint}\n\
         \n\
         Rules:\n\
         - Normalize (lowercase, strip punctuation, collapse whitespace).\n\
         - Correct if normalized user answer equals expected OR contains ANY accepted keyword.\n\
         - If correct: {{\"correct\": true, \"explanation\": \"<explanation>\", \"feedback\": \"positive reinforcement\"}}.\n\
         - If wrong: {{\"correct\": false, \"hint\": \"<hint>\", \"feedback\": \"encouragement only\"}}.\n\
         Return JSON only.",
        question = question.question,
        answer = answer,
        expected = if question.correct_answer.is_empty() {
            "none"
        } else {
            question.correct_answer.as_str()
        },
        keywords = keywords,
        explanation = question.explanation,
        hint = question.hint,
    )
}

fn apply_verdict(question: &QuizQuestion, answer: &str, verdict: AiVerdict) -> GradedAnswer {
    let mut graded = if verdict.correct {
        GradedAnswer::correct(question, answer, verdict.feedback)
    } else {
        GradedAnswer::incorrect(question, answer, verdict.feedback)
    };
    if verdict.correct {
        if verdict.explanation.is_some() {
            graded.explanation = verdict.explanation;
        }
    } else if verdict.hint.is_some() {
        graded.hint = verdict.hint;
    }
    graded
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// The JSON contract the grading prompt asks the model to honor.
#[derive(Debug, Deserialize)]
struct AiVerdict {
    correct: bool,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    hint: Option<String>,
    #[serde(default)]
    feedback: Option<String>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
