use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use log::{error, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::recorder::TRANSCRIBING_PLACEHOLDER;

/// Score plus feedback text for one rubric category or metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricFeedback {
    pub score: i32,
    pub feedback: String,
}

/// Structured STAR-method evaluation of one answer.
///
/// Wire shape is fixed (camelCase field names). Every field defaults so a
/// partially conforming payload decodes to zeros and empty strings instead of
/// failing; callers must tolerate out-of-range scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Evaluation {
    pub overall_score: i32,
    pub categories: IndexMap<String, MetricFeedback>,
    pub additional_metrics: IndexMap<String, MetricFeedback>,
    pub general_feedback: String,
    pub improvement_suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_answer: Option<String>,
}

impl Evaluation {
    /// Substitute result for any scoring failure. Never surfaced as an error:
    /// the caller always receives something renderable.
    pub fn degraded() -> Self {
        Evaluation {
            overall_score: 0,
            categories: IndexMap::new(),
            additional_metrics: IndexMap::new(),
            general_feedback:
                "Sorry, there was an error analyzing your response. Please try again.".to_string(),
            improvement_suggestions: vec!["Try recording again".to_string()],
            example_answer: None,
        }
    }
}

/// STAR categories scoring below this are called out as weak areas when
/// requesting a model answer.
pub const WEAK_AREA_THRESHOLD: i32 = 75;

/// Categories from `evaluation` that need work, as "category: feedback" lines.
pub fn weak_areas(evaluation: &Evaluation) -> Vec<String> {
    evaluation
        .categories
        .iter()
        .filter(|(_, metric)| metric.score < WEAK_AREA_THRESHOLD)
        .map(|(category, metric)| format!("{}: {}", category, metric.feedback))
        .collect()
}

/// Fallback model answer used when example generation fails.
pub const GENERIC_EXAMPLE_ANSWER: &str = "Here's an example of a strong response:

Situation: I was part of a cross-functional team working on a critical project with tight deadlines.

Task: My responsibility was to coordinate between different departments and ensure alignment on project goals and timelines.

Action: I established clear communication protocols, created shared documentation, and held regular check-in meetings to track progress and address issues proactively.

Result: As a result, we completed the project two weeks ahead of schedule with a 95% satisfaction rate from stakeholders. The approach I developed became a best practice for future cross-functional projects.";

/// Hosted scoring boundary.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn analyze_response(&self, question: &str, answer: &str) -> Result<Evaluation>;

    async fn generate_example_answer(
        &self,
        question: &str,
        answer: &str,
        evaluation: &Evaluation,
    ) -> Result<String>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalyzeError {
    #[error("no valid answer to analyze")]
    EmptyAnswer,
}

struct AnalyzerShared {
    feedback: Option<Evaluation>,
    analyzing: bool,
    generation: u64,
}

/// Holds the single active evaluation and absorbs every scoring failure into
/// a degraded result. A generation counter bumped on `reset` guards against a
/// late-arriving result overwriting fresher state.
pub struct ResponseAnalyzer {
    api: Arc<dyn AnalysisApi>,
    shared: Arc<Mutex<AnalyzerShared>>,
}

impl ResponseAnalyzer {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            shared: Arc::new(Mutex::new(AnalyzerShared {
                feedback: None,
                analyzing: false,
                generation: 0,
            })),
        }
    }

    pub fn feedback(&self) -> Option<Evaluation> {
        self.shared.lock().feedback.clone()
    }

    pub fn is_analyzing(&self) -> bool {
        self.shared.lock().analyzing
    }

    /// Score `answer` against `question`. Empty and still-transcribing
    /// answers are rejected synchronously, before any network call.
    pub async fn analyze(&self, question: &str, answer: &str) -> Result<(), AnalyzeError> {
        if answer.trim().is_empty() || answer == TRANSCRIBING_PLACEHOLDER {
            return Err(AnalyzeError::EmptyAnswer);
        }

        let generation = {
            let mut shared = self.shared.lock();
            shared.analyzing = true;
            shared.generation
        };

        let evaluation = match self.api.analyze_response(question, answer).await {
            Ok(mut evaluation) => {
                let example = match self
                    .api
                    .generate_example_answer(question, answer, &evaluation)
                    .await
                {
                    Ok(text) => text,
                    Err(e) => {
                        error!("example answer generation failed, using generic example: {e:#}");
                        GENERIC_EXAMPLE_ANSWER.to_string()
                    }
                };
                evaluation.example_answer = Some(example);
                evaluation
            }
            Err(e) => {
                error!("analysis failed, substituting degraded evaluation: {e:#}");
                Evaluation::degraded()
            }
        };

        let mut shared = self.shared.lock();
        shared.analyzing = false;
        if shared.generation != generation {
            info!("discarding stale analysis result");
            return Ok(());
        }
        shared.feedback = Some(evaluation);
        Ok(())
    }

    /// Clear the current evaluation; any in-flight result is discarded.
    pub fn reset(&self) {
        let mut shared = self.shared.lock();
        shared.generation += 1;
        shared.feedback = None;
        shared.analyzing = false;
    }
}
