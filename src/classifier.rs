//! Intent classification over a closed label set.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::external::bounded;
use crate::providers::{LlmProvider, ProviderRequest};

const SYSTEM_PROMPT: &str = "You are an assistant that classifies user messages into categories. \
The categories are:\n\
1. 'food': If the message is related to food, recipes, or cooking.\n\
2. 'weather': If the message is related to weather or forecasts.\n\
3. 'unknown': If the message does not fit into the above categories.";

const MAX_TOKENS: usize = 5;

/// Closed set of routing intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Food, recipes or cooking; answered from indexed documents.
    Food,
    /// Weather or forecasts; answered from the weather provider.
    Weather,
    /// Anything else, including every classification failure.
    Unknown,
}

impl Intent {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Food => "food",
            Intent::Weather => "weather",
            Intent::Unknown => "unknown",
        }
    }

    /// Maps a raw model reply onto the label set; anything unexpected is `Unknown`.
    pub fn from_reply(reply: &str) -> Self {
        let label = reply
            .trim()
            .trim_matches(|ch: char| ch == '\'' || ch == '"' || ch == '.' || ch == '`')
            .trim()
            .to_lowercase();
        match label.as_str() {
            "food" => Intent::Food,
            "weather" => Intent::Weather,
            _ => Intent::Unknown,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total classifier backed by a single deterministic LLM call.
#[derive(Clone)]
pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl Classifier {
    /// Builds a classifier; `timeout` bounds each provider call.
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Never fails: errors and out-of-set replies become [`Intent::Unknown`].
    pub async fn classify(&self, text: &str) -> Intent {
        let prompt = format!(
            "Classify this message: {text}\n\
             Respond with only one word: 'food', 'weather', or 'unknown'."
        );
        let request = ProviderRequest {
            system: SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
        };
        let reply = bounded(
            self.timeout,
            self.provider.complete(&request),
            GenerationError::Timeout,
        )
        .await;
        match reply {
            Ok(reply) => {
                let intent = Intent::from_reply(&reply);
                debug!(%intent, reply = reply.trim(), "message classified");
                intent
            }
            Err(err) => {
                warn!(error = %err, "classification failed; treating as unknown");
                Intent::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted(Result<String, ()>);

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn complete(&self, request: &ProviderRequest<'_>) -> Result<String, GenerationError> {
            assert_eq!(request.temperature, 0.0);
            assert_eq!(request.max_tokens, MAX_TOKENS);
            self.0
                .clone()
                .map_err(|_| GenerationError::Provider("boom".into()))
        }
    }

    struct Hangs;

    #[async_trait]
    impl LlmProvider for Hangs {
        async fn complete(&self, _: &ProviderRequest<'_>) -> Result<String, GenerationError> {
            std::future::pending().await
        }
    }

    fn classifier(provider: impl LlmProvider + 'static) -> Classifier {
        Classifier::new(Arc::new(provider), Duration::from_secs(5))
    }

    #[test]
    fn replies_are_normalized() {
        assert_eq!(Intent::from_reply(" Food\n"), Intent::Food);
        assert_eq!(Intent::from_reply("'weather'."), Intent::Weather);
        assert_eq!(Intent::from_reply("UNKNOWN"), Intent::Unknown);
        assert_eq!(Intent::from_reply("recipes"), Intent::Unknown);
        assert_eq!(Intent::from_reply(""), Intent::Unknown);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Intent::Weather).unwrap(), "\"weather\"");
    }

    #[tokio::test]
    async fn known_labels_pass_through() {
        assert_eq!(
            classifier(Scripted(Ok("food".into()))).classify("soup?").await,
            Intent::Food
        );
        assert_eq!(
            classifier(Scripted(Ok("weather".into()))).classify("rain?").await,
            Intent::Weather
        );
    }

    #[tokio::test]
    async fn provider_errors_become_unknown() {
        let intent = classifier(Scripted(Err(()))).classify("soup?").await;
        assert_eq!(intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn off_list_replies_become_unknown() {
        let intent = classifier(Scripted(Ok("cooking".into()))).classify("soup?").await;
        assert_eq!(intent, Intent::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_becomes_unknown() {
        let intent = classifier(Hangs).classify("soup?").await;
        assert_eq!(intent, Intent::Unknown);
    }
}
