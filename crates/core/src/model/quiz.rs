use serde::{Deserialize, Serialize};

/// One free-text quiz question as authored in the lesson catalog.
///
/// `accepted_keywords` are alternative tokens any of which makes an answer
/// correct; `explanation` is shown on a correct answer and `hint` on a wrong
/// one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub correct_answer: String,
    #[serde(default)]
    pub accepted_keywords: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub hint: String,
}

impl QuizQuestion {
    #[must_use]
    pub fn new(
        question: impl Into<String>,
        correct_answer: impl Into<String>,
        accepted_keywords: Vec<String>,
        explanation: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            correct_answer: correct_answer.into(),
            accepted_keywords,
            explanation: explanation.into(),
            hint: hint.into(),
        }
    }
}

/// Verdict for one graded answer, as returned to the submitting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question: String,
    pub user_answer: String,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl GradedAnswer {
    /// Verdict for a correct answer: explanation plus positive feedback.
    #[must_use]
    pub fn correct(question: &QuizQuestion, user_answer: &str, feedback: Option<String>) -> Self {
        Self {
            question: question.question.clone(),
            user_answer: user_answer.to_owned(),
            correct: true,
            explanation: non_empty(&question.explanation),
            hint: None,
            feedback: feedback.or_else(|| Some("Correct answer!".to_owned())),
        }
    }

    /// Verdict for a wrong answer: hint plus encouragement, never the
    /// correct answer itself.
    #[must_use]
    pub fn incorrect(question: &QuizQuestion, user_answer: &str, feedback: Option<String>) -> Self {
        Self {
            question: question.question.clone(),
            user_answer: user_answer.to_owned(),
            correct: false,
            explanation: None,
            hint: non_empty(&question.hint),
            feedback: feedback.or_else(|| Some("Incorrect answer.".to_owned())),
        }
    }

    /// Fail-closed verdict used when the grading backend is unreachable:
    /// the answer is marked incorrect with generic feedback so a slow or
    /// broken oracle can never block progress updates or leak answers.
    #[must_use]
    pub fn unavailable(question: &QuizQuestion, user_answer: &str) -> Self {
        Self {
            question: question.question.clone(),
            user_answer: user_answer.to_owned(),
            correct: false,
            explanation: None,
            hint: Some("Grading service unavailable.".to_owned()),
            feedback: Some("Please try again later.".to_owned()),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_owned()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> QuizQuestion {
        QuizQuestion::new(
            "What does mise en place mean?",
            "everything in its place",
            vec!["in its place".to_owned()],
            "Mise en place means having everything prepped and in its place.",
            "Think about how a station is set up before service.",
        )
    }

    #[test]
    fn correct_verdict_carries_explanation_not_hint() {
        let graded = GradedAnswer::correct(&question(), "everything in its place", None);
        assert!(graded.correct);
        assert!(graded.explanation.is_some());
        assert!(graded.hint.is_none());
    }

    #[test]
    fn incorrect_verdict_carries_hint_not_explanation() {
        let graded = GradedAnswer::incorrect(&question(), "a kind of knife", None);
        assert!(!graded.correct);
        assert!(graded.explanation.is_none());
        assert!(graded.hint.is_some());
    }

    #[test]
    fn unavailable_verdict_fails_closed() {
        let graded = GradedAnswer::unavailable(&question(), "anything");
        assert!(!graded.correct);
        assert_eq!(graded.feedback.as_deref(), Some("Please try again later."));
    }

    #[test]
    fn empty_hint_is_omitted() {
        let mut q = question();
        q.hint.clear();
        let graded = GradedAnswer::incorrect(&q, "wrong", None);
        assert!(graded.hint.is_none());
    }
}
