use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{error, info};
use reqwest::multipart;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::analysis::{weak_areas, AnalysisApi, Evaluation};
use crate::avatar::ImageApi;
use crate::config::AppConfig;
use crate::questions::{parse_questions_response, QuestionApi, Topic};
use crate::recorder::{AudioClip, TranscriptionApi};

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert interviewer and coach. Analyze the following interview response using the STAR method.
Your analysis should include:
1. Overall score (out of 100)
2. Score and feedback for each component (each out of 100): Situation, Task, Action, Result
3. Additional metrics (each out of 100): Relevance, Clarity, Structure
4. General feedback and improvement suggestions.
Return your analysis in JSON format with the structure:
{
  "overallScore": number,
  "categories": {
    "situation": { "score": number, "feedback": string },
    "task": { "score": number, "feedback": string },
    "action": { "score": number, "feedback": string },
    "result": { "score": number, "feedback": string }
  },
  "additionalMetrics": {
    "relevance": { "score": number, "feedback": string },
    "clarity": { "score": number, "feedback": string },
    "structure": { "score": number, "feedback": string }
  },
  "generalFeedback": string,
  "improvementSuggestions": [string, string, string]
}"#;

const EXAMPLE_SYSTEM_PROMPT: &str = "You are an expert interview coach. Create an example of an excellent answer \
to a behavioral interview question using the STAR (Situation, Task, Action, Result) method. \
The example should address the weaknesses in the user's original answer while being concise, \
specific, and including measurable results. Format the response with clear \"Situation:\", \"Task:\", \
\"Action:\", and \"Result:\" sections. IMPORTANT: Do not use any special formatting like bold, italic, or Markdown syntax. \
Do not use asterisks (*) or other special characters to emphasize text. \
Simply use plain text with the section labels.";

const AVATAR_PROMPT: &str = "Professional headshot portrait of a person in business casual attire \
with neutral background, looking friendly and approachable. Diverse appearance, high quality, photorealistic.";

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: String,
}

/// Client for the hosted OpenAI-compatible endpoints: chat completions for
/// question generation and scoring, Whisper for transcription, image
/// generation for the interviewer avatar.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: AppConfig,
}

impl OpenAiClient {
    pub fn new(config: AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    async fn chat(&self, system: String, user: String, json_object: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            response_format: json_object.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("chat completion failed: HTTP {status}: {body}");
            return Err(anyhow!("chat completion failed: HTTP {status}"));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("no response choices"))
    }
}

#[async_trait]
impl QuestionApi for OpenAiClient {
    async fn fetch_questions(&self, topic: Topic) -> Result<Vec<String>> {
        let system = format!(
            "You are an expert interviewer. Generate behavioral interview questions for the \
             STAR method (Situation, Task, Action, Result) related to the topic: {topic}."
        );
        let user = format!(
            "Generate 5 behavioral interview questions for the topic \"{topic}\" that are ideal \
             for the STAR method. Each question should be a single concise sentence, without \
             additional sub-questions or guidance. Return only the questions as a simple JSON \
             array of strings."
        );

        let content = self.chat(system, user, true).await?;
        Ok(parse_questions_response(&content)?)
    }
}

#[async_trait]
impl AnalysisApi for OpenAiClient {
    async fn analyze_response(&self, question: &str, answer: &str) -> Result<Evaluation> {
        let user = format!("Interview Question: {question}\n\nCandidate's Response: {answer}");
        let content = self
            .chat(ANALYSIS_SYSTEM_PROMPT.to_string(), user, true)
            .await?;
        let evaluation: Evaluation = serde_json::from_str(&content)?;
        info!("received evaluation, overall score {}", evaluation.overall_score);
        Ok(evaluation)
    }

    async fn generate_example_answer(
        &self,
        question: &str,
        answer: &str,
        evaluation: &Evaluation,
    ) -> Result<String> {
        let areas = weak_areas(evaluation);
        let areas_text = if areas.is_empty() {
            "Overall structure and content could be improved.".to_string()
        } else {
            areas.join("\n")
        };

        let user = format!(
            "Interview Question: {question}\n\n\
             User's Answer: {answer}\n\n\
             Analysis Feedback:\n\
             Overall Score: {}/100\n\
             General Feedback: {}\n\n\
             Areas for improvement:\n{areas_text}\n\n\
             Improvement Suggestions:\n{}\n\n\
             Create an excellent example answer that:\n\
             1. Follows the STAR format explicitly with labeled sections\n\
             2. Addresses the weaknesses identified above\n\
             3. Demonstrates best practices for answering this type of question\n\
             4. Includes specific details and quantifiable results\n\
             5. Is realistic and professional",
            evaluation.overall_score,
            evaluation.general_feedback,
            evaluation.improvement_suggestions.join("\n"),
        );

        self.chat(EXAMPLE_SYSTEM_PROMPT.to_string(), user, false)
            .await
    }
}

#[async_trait]
impl TranscriptionApi for OpenAiClient {
    async fn transcribe(&self, clip: AudioClip) -> Result<String> {
        let file = multipart::Part::bytes(clip.wav_bytes)
            .file_name(clip.file_name)
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", file);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("transcription failed: HTTP {status}: {body}");
            return Err(anyhow!("transcription failed: HTTP {status}"));
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl ImageApi for OpenAiClient {
    async fn generate_person_image(&self) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.config.image_model,
            "prompt": AVATAR_PROMPT,
            "n": 1,
            "size": "512x512",
        });

        let response = self
            .client
            .post(format!("{}/images/generations", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("image generation failed: HTTP {status}"));
        }

        let parsed: ImageResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|datum| datum.url)
            .ok_or_else(|| anyhow!("no image in response"))
    }
}
