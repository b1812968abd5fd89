use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use rand::seq::SliceRandom;

/// Hosted image-generation boundary (decorative interviewer portrait).
#[async_trait]
pub trait ImageApi: Send + Sync {
    /// Returns a URL to a generated headshot.
    async fn generate_person_image(&self) -> Result<String>;
}

/// Bundled portraits used whenever generation is unavailable.
const BUILTIN_AVATARS: [&str; 5] = [
    "avatars/avatar-1.jpg",
    "avatars/avatar-2.jpg",
    "avatars/avatar-3.jpg",
    "avatars/avatar-4.jpg",
    "avatars/avatar-5.jpg",
];

/// Picks the interviewer portrait: a generated image when the hosted call
/// succeeds, a random bundled one otherwise.
#[derive(Default)]
pub struct AvatarSelector {
    current: Option<String>,
}

impl AvatarSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn select_random(&mut self) -> &str {
        let pick = BUILTIN_AVATARS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(BUILTIN_AVATARS[0]);
        self.current = Some(pick.to_string());
        self.current.as_deref().unwrap_or_default()
    }

    /// Request a generated portrait, falling back to the bundled set.
    pub async fn refresh(&mut self, api: &dyn ImageApi) -> &str {
        match api.generate_person_image().await {
            Ok(url) => {
                self.current = Some(url);
                self.current.as_deref().unwrap_or_default()
            }
            Err(e) => {
                warn!("avatar generation failed, using bundled portrait: {e:#}");
                self.select_random()
            }
        }
    }
}
