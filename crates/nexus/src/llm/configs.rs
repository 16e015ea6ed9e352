use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8084/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama3.1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct ModelClientConfig {
    /// Full URL of the chat-completions endpoint
    pub endpoint: String,
    pub model: String,
    /// Bound on one request, and on each read of a streamed reply
    pub timeout: Duration,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl Default for ModelClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            api_key: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ModelClientConfig {
    pub fn new<E: Into<String>, M: Into<String>>(endpoint: E, model: M) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}
