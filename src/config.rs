use log::warn;

/// Runtime configuration for the hosted OpenAI-compatible endpoints.
///
/// Values come from the process environment (a `.env` file is honored in
/// development). A missing API key is not fatal: every hosted call will fail
/// authentication and each component falls back to its offline behavior.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub transcription_model: String,
    pub image_model: String,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let api_key = env_or("OPENAI_API_KEY", "");
        if api_key.is_empty() {
            warn!("OPENAI_API_KEY is not set; hosted calls will fail and built-in fallbacks will be used");
        }

        Self {
            api_key,
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            chat_model: env_or("STARPREP_CHAT_MODEL", "gpt-4o"),
            transcription_model: env_or("STARPREP_TRANSCRIPTION_MODEL", "whisper-1"),
            image_model: env_or("STARPREP_IMAGE_MODEL", "dall-e-2"),
            request_timeout_secs: env_or("STARPREP_REQUEST_TIMEOUT_SECS", "30")
                .parse()
                .unwrap_or(30),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
