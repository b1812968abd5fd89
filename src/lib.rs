pub mod analysis;
pub mod avatar;
pub mod config;
pub mod history;
pub mod openai;
pub mod questions;
pub mod recorder;
pub mod session;

pub use analysis::{Evaluation, MetricFeedback, ResponseAnalyzer};
pub use config::AppConfig;
pub use history::{best_score, score_color, HistoryStore, ScoreBand};
pub use openai::OpenAiClient;
pub use questions::{QuestionManager, Topic};
pub use recorder::{RecorderState, ResponseRecorder};
pub use session::PracticeSession;
