use std::sync::Arc;

use crate::analysis::{AnalysisApi, AnalyzeError, Evaluation, ResponseAnalyzer};
use crate::avatar::{AvatarSelector, ImageApi};
use crate::history::{HistoryError, HistoryRepository, HistoryStore};
use crate::questions::{QuestionApi, QuestionManager, Topic};
use crate::recorder::{
    MicrophoneSource, RecorderError, ResponseRecorder, TranscriptionApi,
};

/// Everything the hosted side must provide for one practice session.
pub trait InterviewApi:
    QuestionApi + AnalysisApi + TranscriptionApi + ImageApi + 'static
{
}

impl<T> InterviewApi for T where
    T: QuestionApi + AnalysisApi + TranscriptionApi + ImageApi + 'static
{
}

/// One practice session: question supply, answer capture, evaluation and
/// history, wired in the user-gesture order. Every transition here is an
/// explicit call; nothing runs autonomously besides the recorder's timers.
pub struct PracticeSession<A: InterviewApi> {
    api: Arc<A>,
    pub questions: QuestionManager,
    pub recorder: ResponseRecorder,
    pub analyzer: ResponseAnalyzer,
    pub history: HistoryStore,
    pub avatar: AvatarSelector,
}

impl<A: InterviewApi> PracticeSession<A> {
    pub fn new(
        api: Arc<A>,
        repo: Box<dyn HistoryRepository>,
        mic: Box<dyn MicrophoneSource>,
    ) -> Self {
        Self {
            questions: QuestionManager::new(Topic::Teamwork),
            recorder: ResponseRecorder::new(api.clone(), mic),
            analyzer: ResponseAnalyzer::new(api.clone()),
            history: HistoryStore::new(repo),
            avatar: AvatarSelector::new(),
            api,
        }
    }

    /// Load the initial topic's questions and pick the first one.
    pub async fn start(&mut self) {
        let topic = self.questions.topic();
        self.questions.load_questions(self.api.as_ref(), topic).await;
    }

    pub async fn change_topic(&mut self, topic: Topic) {
        self.discard_answer();
        self.questions.change_topic(self.api.as_ref(), topic).await;
    }

    pub async fn next_question(&mut self) {
        self.discard_answer();
        self.questions.select_random_question(self.api.as_ref()).await;
    }

    /// Replay a question saved in history, outside the random flow.
    pub fn replay_question(&mut self, question: &str) {
        self.discard_answer();
        self.questions.set_custom_question(question);
    }

    pub fn submit_typed_answer(&mut self, text: &str) {
        self.recorder.set_typed_answer(text);
    }

    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        self.recorder.start_recording()
    }

    pub fn stop_recording(&mut self) -> Result<(), RecorderError> {
        self.recorder.stop_recording()
    }

    /// Score the current answer against the displayed question.
    pub async fn analyze_answer(&mut self) -> Result<(), AnalyzeError> {
        let question = self
            .questions
            .current_question()
            .unwrap_or_default()
            .to_string();
        let answer = self.recorder.answer_text();
        self.analyzer.analyze(&question, &answer).await
    }

    pub fn feedback(&self) -> Option<Evaluation> {
        self.analyzer.feedback()
    }

    /// Persist the evaluated attempt. Requires a question, an answer and a
    /// completed evaluation.
    pub fn save_result(&mut self) -> Result<(), HistoryError> {
        let evaluation = self.analyzer.feedback().ok_or(HistoryError::MissingField)?;
        let topic = self.questions.topic().as_str().to_string();
        let question = self
            .questions
            .current_question()
            .unwrap_or_default()
            .to_string();
        let answer = self.recorder.answer_text();
        self.history
            .save_result(&topic, &question, &answer, &evaluation)?;
        Ok(())
    }

    /// Clear the current answer and evaluation, back to a blank slate for
    /// the displayed question.
    pub fn discard_answer(&mut self) {
        self.recorder.reset_recording();
        self.analyzer.reset();
    }

    pub async fn refresh_avatar(&mut self) -> String {
        let api = Arc::clone(&self.api);
        self.avatar.refresh(api.as_ref()).await.to_string()
    }
}
