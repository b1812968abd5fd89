use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{Evaluation, MetricFeedback};

/// Topic label -> question text -> attempts, oldest first.
pub type History = IndexMap<String, IndexMap<String, Vec<HistoryEntry>>>;

/// Stored evaluation shape: the scored feedback minus the overall score,
/// which lives on the entry itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryFeedback {
    pub general_feedback: String,
    pub categories: IndexMap<String, MetricFeedback>,
    pub additional_metrics: IndexMap<String, MetricFeedback>,
    pub improvement_suggestions: Vec<String>,
    pub example_answer: String,
}

impl From<&Evaluation> for EntryFeedback {
    fn from(evaluation: &Evaluation) -> Self {
        EntryFeedback {
            general_feedback: evaluation.general_feedback.clone(),
            categories: evaluation.categories.clone(),
            additional_metrics: evaluation.additional_metrics.clone(),
            improvement_suggestions: evaluation.improvement_suggestions.clone(),
            example_answer: evaluation.example_answer.clone().unwrap_or_default(),
        }
    }
}

/// One persisted practice attempt. Immutable once created; only deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryEntry {
    /// Creation timestamp (RFC 3339); doubles as the sort key.
    pub id: String,
    pub question: String,
    pub answer: String,
    pub date: String,
    pub score: i32,
    pub feedback: EntryFeedback,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("missing required information")]
    MissingField,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Persistence boundary for the whole history structure. The store always
/// writes the full blob; the medium behind this trait is swappable.
pub trait HistoryRepository: Send {
    /// A missing or corrupt blob loads as empty history, never an error.
    fn load(&self) -> History;
    fn save(&self, history: &History) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// JSON file under the user data directory.
pub struct FileHistoryRepository {
    path: PathBuf,
}

impl FileHistoryRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("starprep")
            .join("interview_history.json")
    }
}

impl HistoryRepository for FileHistoryRepository {
    fn load(&self) -> History {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("no saved history at {}", self.path.display());
                return History::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(e) => {
                warn!("saved history is unreadable, starting empty: {e}");
                History::default()
            }
        }
    }

    fn save(&self, history: &History) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(history)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session-spanning record of evaluated attempts, loaded once at startup and
/// persisted in full on every mutation.
pub struct HistoryStore {
    history: History,
    repo: Box<dyn HistoryRepository>,
}

impl HistoryStore {
    pub fn new(repo: Box<dyn HistoryRepository>) -> Self {
        let history = repo.load();
        Self { history, repo }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn entries(&self, topic: &str, question: &str) -> &[HistoryEntry] {
        self.history
            .get(topic)
            .and_then(|questions| questions.get(question))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append one evaluated attempt under `topic`/`question` and persist.
    /// All arguments must be non-empty.
    pub fn save_result(
        &mut self,
        topic: &str,
        question: &str,
        answer: &str,
        evaluation: &Evaluation,
    ) -> Result<HistoryEntry, HistoryError> {
        if topic.trim().is_empty() || question.trim().is_empty() || answer.trim().is_empty() {
            return Err(HistoryError::MissingField);
        }

        let now = Utc::now();
        let entry = HistoryEntry {
            id: now.to_rfc3339(),
            question: question.to_string(),
            answer: answer.to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            score: evaluation.overall_score,
            feedback: EntryFeedback::from(evaluation),
        };

        self.history
            .entry(topic.to_string())
            .or_insert_with(IndexMap::new)
            .entry(question.to_string())
            .or_insert_with(Vec::new)
            .push(entry.clone());
        self.persist()?;

        info!("saved attempt for {topic:?} / {question:?} (score {})", entry.score);
        Ok(entry)
    }

    /// Remove the matching entry, pruning question and topic containers that
    /// become empty. Returns whether anything was removed.
    pub fn delete_entry(
        &mut self,
        topic: &str,
        question: &str,
        entry_id: &str,
    ) -> Result<bool, HistoryError> {
        let mut removed = false;
        if let Some(questions) = self.history.get_mut(topic) {
            if let Some(entries) = questions.get_mut(question) {
                let before = entries.len();
                entries.retain(|entry| entry.id != entry_id);
                removed = entries.len() != before;
                if entries.is_empty() {
                    questions.shift_remove(question);
                }
            }
            if questions.is_empty() {
                self.history.shift_remove(topic);
            }
        }

        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Drop everything and remove the persisted copy.
    pub fn clear_all(&mut self) -> Result<(), HistoryError> {
        self.history.clear();
        self.repo.clear().map_err(HistoryError::Storage)
    }

    fn persist(&self) -> Result<(), HistoryError> {
        if self.history.is_empty() {
            self.repo.clear().map_err(HistoryError::Storage)
        } else {
            self.repo.save(&self.history).map_err(HistoryError::Storage)
        }
    }
}

/// Best score across a question's attempts; 0 when there are none.
pub fn best_score(entries: &[HistoryEntry]) -> i32 {
    entries.iter().map(|entry| entry.score).max().unwrap_or(0)
}

/// Severity band for a score. Monotonic: a higher score never maps to a
/// worse band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScoreBand {
    Weak,
    Moderate,
    Strong,
}

pub fn score_color(score: i32) -> ScoreBand {
    if score >= 80 {
        ScoreBand::Strong
    } else if score >= 60 {
        ScoreBand::Moderate
    } else {
        ScoreBand::Weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn evaluation(score: i32) -> Evaluation {
        Evaluation {
            overall_score: score,
            general_feedback: "solid".to_string(),
            ..Evaluation::default()
        }
    }

    fn entry(score: i32) -> HistoryEntry {
        HistoryEntry {
            score,
            ..HistoryEntry::default()
        }
    }

    fn file_store(dir: &TempDir) -> HistoryStore {
        let path = dir.path().join("interview_history.json");
        HistoryStore::new(Box::new(FileHistoryRepository::new(path)))
    }

    #[test]
    fn best_score_handles_empty_and_picks_max() {
        assert_eq!(best_score(&[]), 0);
        assert_eq!(best_score(&[entry(40), entry(95), entry(70)]), 95);
    }

    #[test]
    fn score_color_bands_are_monotonic() {
        let mut previous = score_color(0);
        for score in 1..=100 {
            let band = score_color(score);
            assert!(band >= previous, "band regressed at score {score}");
            previous = band;
        }
        assert_eq!(score_color(59), ScoreBand::Weak);
        assert_eq!(score_color(60), ScoreBand::Moderate);
        assert_eq!(score_color(80), ScoreBand::Strong);
    }

    #[test]
    fn save_result_validates_arguments() {
        let dir = TempDir::new().unwrap();
        let mut store = file_store(&dir);
        let result = store.save_result("Teamwork", "", "answer", &evaluation(50));
        assert!(matches!(result, Err(HistoryError::MissingField)));
        assert!(store.history().is_empty());
    }

    #[test]
    fn save_then_delete_leaves_no_orphan_containers() {
        let dir = TempDir::new().unwrap();
        let mut store = file_store(&dir);

        let entry = store
            .save_result("Teamwork", "Q1?", "my answer", &evaluation(72))
            .unwrap();
        assert_eq!(store.entries("Teamwork", "Q1?").len(), 1);

        let removed = store.delete_entry("Teamwork", "Q1?", &entry.id).unwrap();
        assert!(removed);
        assert!(store.history().is_empty(), "containers not pruned");
    }

    #[test]
    fn history_survives_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interview_history.json");

        {
            let mut store =
                HistoryStore::new(Box::new(FileHistoryRepository::new(path.clone())));
            store
                .save_result("Leadership", "Q1?", "led the team", &evaluation(85))
                .unwrap();
            store
                .save_result("Leadership", "Q1?", "second try", &evaluation(91))
                .unwrap();
        }

        let store = HistoryStore::new(Box::new(FileHistoryRepository::new(path)));
        let entries = store.entries("Leadership", "Q1?");
        assert_eq!(entries.len(), 2);
        assert_eq!(best_score(entries), 91);
    }

    #[test]
    fn corrupt_blob_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interview_history.json");
        fs::write(&path, "{not json").unwrap();

        let store = HistoryStore::new(Box::new(FileHistoryRepository::new(path)));
        assert!(store.history().is_empty());
    }

    #[test]
    fn clear_all_removes_the_persisted_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interview_history.json");
        let mut store = HistoryStore::new(Box::new(FileHistoryRepository::new(path.clone())));

        store
            .save_result("Teamwork", "Q1?", "answer", &evaluation(50))
            .unwrap();
        assert!(path.exists());

        store.clear_all().unwrap();
        assert!(store.history().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn deleting_one_of_two_entries_keeps_the_other() {
        let dir = TempDir::new().unwrap();
        let mut store = file_store(&dir);

        let first = store
            .save_result("Teamwork", "Q1?", "first", &evaluation(40))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store
            .save_result("Teamwork", "Q1?", "second", &evaluation(60))
            .unwrap();
        assert_ne!(first.id, second.id);

        store.delete_entry("Teamwork", "Q1?", &first.id).unwrap();
        let entries = store.entries("Teamwork", "Q1?");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, second.id);
    }
}
