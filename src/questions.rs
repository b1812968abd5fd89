use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use rand::seq::SliceRandom;
use serde_json::Value;

/// Fixed set of behavioral interview topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Teamwork,
    Communication,
    Leadership,
    ProblemSolving,
    TimeManagement,
    ConflictResolution,
    Adaptability,
    CustomerService,
    Initiative,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Topic::Teamwork,
        Topic::Communication,
        Topic::Leadership,
        Topic::ProblemSolving,
        Topic::TimeManagement,
        Topic::ConflictResolution,
        Topic::Adaptability,
        Topic::CustomerService,
        Topic::Initiative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Teamwork => "Teamwork",
            Topic::Communication => "Communication",
            Topic::Leadership => "Leadership",
            Topic::ProblemSolving => "Problem-solving",
            Topic::TimeManagement => "Time Management",
            Topic::ConflictResolution => "Conflict Resolution",
            Topic::Adaptability => "Adaptability",
            Topic::CustomerService => "Customer Service",
            Topic::Initiative => "Initiative",
        }
    }

    pub fn parse(label: &str) -> Option<Topic> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in question bank used whenever the hosted generation call fails.
pub fn default_questions(topic: Topic) -> &'static [&'static str] {
    match topic {
        Topic::Teamwork => &[
            "Tell me about a time when you had to deal with conflict within your team.",
            "Describe a situation where you had to collaborate with a difficult team member.",
            "Share an example of how you've contributed to a team success.",
            "Tell me about a time when you had to step up to help your team meet a deadline.",
            "Describe how you've successfully worked with diverse team members with different working styles.",
        ],
        Topic::Communication => &[
            "Tell me about a time when you had to explain a complex concept to someone.",
            "Describe a situation where your communication skills helped resolve a problem.",
            "Share an example of how you've effectively communicated in a challenging situation.",
            "Tell me about a time when you had to deliver difficult news to a colleague or client.",
            "Describe how you've tailored your communication style for different audiences.",
        ],
        Topic::Leadership => &[
            "Tell me about a time when you demonstrated leadership skills without having a formal title.",
            "Describe a situation where you had to motivate a team through a difficult period.",
            "Share an example of how you've developed or mentored someone.",
            "Tell me about a time when you had to make an unpopular decision as a leader.",
            "Describe how you've delegated responsibilities effectively.",
        ],
        Topic::ProblemSolving => &[
            "Tell me about a time when you had to solve a complex problem.",
            "Describe a situation where you had to think creatively to overcome an obstacle.",
            "Share an example of how you've used data or analytics to solve a problem.",
            "Tell me about a time when you anticipated a problem before it occurred.",
            "Describe how you've implemented a solution that improved a process or outcome.",
        ],
        Topic::TimeManagement => &[
            "Tell me about a time when you had to manage multiple priorities.",
            "Describe a situation where you had to meet a tight deadline.",
            "Share an example of how you organize your work to maximize productivity.",
            "Tell me about a time when you had to delegate tasks to meet deadlines.",
            "Describe how you've improved a process to save time.",
        ],
        Topic::ConflictResolution => &[
            "Tell me about a time when you had to address a conflict between team members.",
            "Describe a situation where you successfully resolved a disagreement with a colleague.",
            "Share an example of how you've turned a negative interaction into a positive outcome.",
            "Tell me about a time when you had to find a compromise between different stakeholders.",
            "Describe how you've maintained professional relationships after a conflict.",
        ],
        Topic::Adaptability => &[
            "Tell me about a time when you had to quickly adapt to a significant change.",
            "Describe a situation where you had to learn a new skill or technology quickly.",
            "Share an example of how you've successfully worked in an ambiguous environment.",
            "Tell me about a time when your initial approach didn't work and you had to change course.",
            "Describe how you've remained effective during organizational changes.",
        ],
        Topic::CustomerService => &[
            "Tell me about a time when you had to deal with a difficult customer.",
            "Describe a situation where you went above and beyond for a customer.",
            "Share an example of how you've turned an unhappy customer into a satisfied one.",
            "Tell me about a time when you had to say no to a customer request.",
            "Describe how you've improved a customer-facing process.",
        ],
        Topic::Initiative => &[
            "Tell me about a time when you identified an opportunity that others missed.",
            "Describe a situation where you took on responsibilities outside your job description.",
            "Share an example of how you've implemented a new idea or process.",
            "Tell me about a time when you proactively solved a problem before being asked.",
            "Describe how you've pursued professional development on your own initiative.",
        ],
    }
}

/// Hosted question-generation boundary.
#[async_trait]
pub trait QuestionApi: Send + Sync {
    async fn fetch_questions(&self, topic: Topic) -> Result<Vec<String>>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("could not extract valid questions from response")]
pub struct ParseError;

/// Coerce the free-form generation payload into a question list.
///
/// The hosted endpoint is asked for a JSON array of strings but routinely
/// returns wrapped or degenerate shapes. Decoding strategies are tried in a
/// fixed order; only when all of them come up empty is the payload rejected.
pub fn parse_questions_response(content: &str) -> Result<Vec<String>, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        match value {
            Value::Array(items) => {
                let questions = collect_strings(&items);
                if !questions.is_empty() {
                    return Ok(questions);
                }
            }
            Value::Object(map) => {
                if let Some(Value::Array(items)) = map.get("questions") {
                    return Ok(collect_strings(items));
                }

                // Any other array-valued property, in object key order.
                for value in map.values() {
                    if let Value::Array(items) = value {
                        if !items.is_empty() {
                            return Ok(collect_strings(items));
                        }
                    }
                }

                // Last resort within JSON: long string-valued properties.
                let strings: Vec<String> = map
                    .values()
                    .filter_map(Value::as_str)
                    .filter(|s| s.trim().len() > 10)
                    .map(str::to_string)
                    .collect();
                if !strings.is_empty() {
                    return Ok(strings);
                }
            }
            _ => {}
        }
    }

    // Not JSON (or nothing usable in it): treat the raw text as prose.
    if content.len() > 10 {
        if content.contains('\n') || content.split('.').count() > 3 {
            let fragments = split_into_sentences(content);
            if !fragments.is_empty() {
                return Ok(fragments);
            }
        } else {
            return Ok(vec![content.to_string()]);
        }
    }

    Err(ParseError)
}

fn collect_strings(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Split prose on newlines and on sentence boundaries (a period followed by
/// whitespace and a capital letter), keeping at most 5 fragments longer than
/// 15 characters.
fn split_into_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut fragments: Vec<&str> = Vec::new();
    let mut start = 0;

    for (i, &(pos, c)) in chars.iter().enumerate() {
        if c == '\n' {
            fragments.push(&text[start..pos]);
            start = pos + c.len_utf8();
        } else if c == '.' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j < chars.len() && chars[j].1.is_uppercase() {
                let end = pos + c.len_utf8();
                fragments.push(&text[start..end]);
                start = end;
            }
        }
    }
    fragments.push(&text[start..]);

    fragments
        .into_iter()
        .map(str::trim)
        .filter(|fragment| fragment.len() > 15)
        .take(5)
        .map(str::to_string)
        .collect()
}

/// Per-topic question supply with session-scoped "already shown" tracking.
///
/// Fetched lists are cached per topic for the session. Used indices reset on
/// every (re)load, and exhausting a list triggers a fresh fetch rather than a
/// repeat. Any fetch or parse failure falls back to the built-in bank and is
/// never surfaced to the caller.
pub struct QuestionManager {
    topic: Topic,
    current: Option<String>,
    api_questions: HashMap<Topic, Vec<String>>,
    used_indices: HashMap<Topic, HashSet<usize>>,
    loading: bool,
}

impl QuestionManager {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            current: None,
            api_questions: HashMap::new(),
            used_indices: HashMap::new(),
            loading: false,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn current_question(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Questions currently active for the selected topic: the fetched list if
    /// one is cached and non-empty, the built-in bank otherwise.
    fn active_questions(&self) -> Vec<String> {
        if let Some(cached) = self.api_questions.get(&self.topic) {
            if !cached.is_empty() {
                return cached.clone();
            }
        }
        default_questions(self.topic)
            .iter()
            .map(|q| q.to_string())
            .collect()
    }

    /// Fetch a fresh question list for `topic`, falling back to the built-in
    /// bank on any failure, then select a question if `topic` is still active.
    pub async fn load_questions(&mut self, api: &dyn QuestionApi, topic: Topic) {
        // Clear immediately so stale text is never shown during the fetch.
        self.current = None;
        self.loading = true;

        match api.fetch_questions(topic).await {
            Ok(questions) => {
                info!("loaded {} questions for {}", questions.len(), topic);
                self.api_questions.insert(topic, questions);
            }
            Err(e) => {
                error!("fetching {topic} questions failed, using built-in list: {e:#}");
                self.api_questions.insert(
                    topic,
                    default_questions(topic).iter().map(|q| q.to_string()).collect(),
                );
            }
        }
        self.used_indices.insert(topic, HashSet::new());
        self.loading = false;

        if topic == self.topic {
            self.pick_unused();
        }
    }

    /// Select uniformly among not-yet-shown questions for the active topic,
    /// reloading a fresh list instead of repeating once all have been shown.
    pub async fn select_random_question(&mut self, api: &dyn QuestionApi) {
        self.current = None;

        let questions = self.active_questions();
        let used = self
            .used_indices
            .get(&self.topic)
            .map(HashSet::len)
            .unwrap_or(0);
        if questions.is_empty() || used >= questions.len() {
            self.load_questions(api, self.topic).await;
            return;
        }

        self.pick_unused();
    }

    /// Switch the active topic, fetching its list on first use.
    pub async fn change_topic(&mut self, api: &dyn QuestionApi, new_topic: Topic) {
        self.current = None;
        self.topic = new_topic;

        let cached = self
            .api_questions
            .get(&new_topic)
            .map(|qs| !qs.is_empty())
            .unwrap_or(false);
        if cached {
            self.select_random_question(api).await;
        } else {
            self.load_questions(api, new_topic).await;
        }
    }

    /// Force-set the displayed question outside the random-selection flow
    /// (used when replaying a question from history).
    pub fn set_custom_question(&mut self, question: &str) {
        self.current = Some(question.to_string());
    }

    fn pick_unused(&mut self) {
        let questions = self.active_questions();
        if questions.is_empty() {
            return;
        }

        let used = self.used_indices.entry(self.topic).or_default();
        let unused: Vec<usize> = (0..questions.len()).filter(|i| !used.contains(i)).collect();
        if let Some(&index) = unused.choose(&mut rand::thread_rng()) {
            used.insert(index);
            self.current = Some(questions[index].clone());
        }
    }
}
