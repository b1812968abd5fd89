use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use tempfile::TempDir;

use starprep::analysis::{AnalysisApi, Evaluation, MetricFeedback};
use starprep::avatar::ImageApi;
use starprep::history::{best_score, FileHistoryRepository};
use starprep::questions::{default_questions, QuestionApi, Topic};
use starprep::recorder::{AudioClip, MicrophoneSource, RecorderError, TranscriptionApi};
use starprep::session::PracticeSession;

/// Scripted hosted side: question fetches fail (network error), scoring
/// returns a fixed well-formed evaluation.
struct ScriptedApi;

#[async_trait]
impl QuestionApi for ScriptedApi {
    async fn fetch_questions(&self, _topic: Topic) -> Result<Vec<String>> {
        anyhow::bail!("network unreachable")
    }
}

#[async_trait]
impl AnalysisApi for ScriptedApi {
    async fn analyze_response(&self, _question: &str, _answer: &str) -> Result<Evaluation> {
        let mut categories = IndexMap::new();
        for (name, score) in [("situation", 70), ("task", 68), ("action", 75), ("result", 74)] {
            categories.insert(
                name.to_string(),
                MetricFeedback { score, feedback: format!("{name} feedback") },
            );
        }
        Ok(Evaluation {
            overall_score: 72,
            categories,
            general_feedback: "A reasonable answer.".to_string(),
            improvement_suggestions: vec!["Quantify the result.".to_string()],
            ..Evaluation::default()
        })
    }

    async fn generate_example_answer(
        &self,
        _question: &str,
        _answer: &str,
        _evaluation: &Evaluation,
    ) -> Result<String> {
        Ok("Situation: ... Task: ... Action: ... Result: ...".to_string())
    }
}

#[async_trait]
impl TranscriptionApi for ScriptedApi {
    async fn transcribe(&self, _clip: AudioClip) -> Result<String> {
        anyhow::bail!("not used in this flow")
    }
}

#[async_trait]
impl ImageApi for ScriptedApi {
    async fn generate_person_image(&self) -> Result<String> {
        anyhow::bail!("not used in this flow")
    }
}

/// Capture is not exercised here; the answer is typed.
struct NoMicrophone;

impl MicrophoneSource for NoMicrophone {
    fn start(&mut self) -> Result<(), RecorderError> {
        Err(RecorderError::Microphone("no device in tests".to_string()))
    }

    fn stop(&mut self) -> Result<AudioClip, RecorderError> {
        Err(RecorderError::Microphone("no device in tests".to_string()))
    }
}

#[tokio::test]
async fn typed_answer_flow_with_offline_question_bank() {
    let dir = TempDir::new().unwrap();
    let repo = Box::new(FileHistoryRepository::new(
        dir.path().join("interview_history.json"),
    ));
    let mut session = PracticeSession::new(Arc::new(ScriptedApi), repo, Box::new(NoMicrophone));

    // Question fetch fails, so the built-in Leadership list must be used.
    session.change_topic(Topic::Leadership).await;
    let question = session
        .questions
        .current_question()
        .expect("a fallback question is selected")
        .to_string();
    assert!(default_questions(Topic::Leadership).contains(&question.as_str()));

    // Typed answer, scored 72 by the scripted endpoint.
    session.submit_typed_answer("I led my team.");
    session.analyze_answer().await.unwrap();
    let feedback = session.feedback().expect("evaluation present");
    assert_eq!(feedback.overall_score, 72);
    assert!(feedback.example_answer.is_some());

    // Saving produces exactly one entry under History["Leadership"][question].
    session.save_result().unwrap();
    let entries = session.history.entries("Leadership", &question);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, 72);
    assert_eq!(entries[0].answer, "I led my team.");
    assert_eq!(best_score(entries), 72);

    // The persisted blob reloads to the same state.
    let reloaded = starprep::history::HistoryStore::new(Box::new(FileHistoryRepository::new(
        dir.path().join("interview_history.json"),
    )));
    assert_eq!(reloaded.entries("Leadership", &question).len(), 1);
}

#[tokio::test]
async fn analyze_without_answer_is_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    let repo = Box::new(FileHistoryRepository::new(dir.path().join("history.json")));
    let mut session = PracticeSession::new(Arc::new(ScriptedApi), repo, Box::new(NoMicrophone));

    session.change_topic(Topic::Teamwork).await;
    assert!(session.analyze_answer().await.is_err());
    assert!(session.feedback().is_none());
}

#[tokio::test]
async fn microphone_failure_keeps_session_usable() {
    let dir = TempDir::new().unwrap();
    let repo = Box::new(FileHistoryRepository::new(dir.path().join("history.json")));
    let mut session = PracticeSession::new(Arc::new(ScriptedApi), repo, Box::new(NoMicrophone));

    session.change_topic(Topic::Teamwork).await;
    assert!(session.start_recording().is_err());

    // Falling back to a typed answer still works end to end.
    session.submit_typed_answer("We shipped on time.");
    session.analyze_answer().await.unwrap();
    assert!(session.feedback().is_some());
}
