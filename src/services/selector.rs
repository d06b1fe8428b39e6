use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no interactive input available")]
    NoInteractiveInput,
}

/// Source of the answer when a page offers several player iframes
#[async_trait]
pub trait IframeSelector: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, SelectError>;
}

/// Used when nobody can answer; resolution falls back to the first iframe
pub struct NonInteractive;

#[async_trait]
impl IframeSelector for NonInteractive {
    async fn ask(&self, _prompt: &str) -> Result<String, SelectError> {
        Err(SelectError::NoInteractiveInput)
    }
}

/// Fixed answer supplied up front, e.g. the `choice` query parameter
pub struct PresetAnswer(String);

impl PresetAnswer {
    pub fn new(answer: impl Into<String>) -> Self {
        Self(answer.into())
    }
}

#[async_trait]
impl IframeSelector for PresetAnswer {
    async fn ask(&self, _prompt: &str) -> Result<String, SelectError> {
        Ok(self.0.clone())
    }
}

/// 0-based index for a 1-based answer; only the first word counts
pub fn parse_selection(answer: &str, count: usize) -> Option<usize> {
    let first = answer.trim().split_whitespace().next()?;
    match first.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}
