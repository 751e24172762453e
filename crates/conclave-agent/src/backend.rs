use crate::config::ProviderKind;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use conclave_core::ConclaveResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A single text-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Persona / system instructions, if the backend supports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Result of a text-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

impl GenerateResponse {
    /// Plain text response without token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_count: None,
        }
    }
}

/// Trait for model backends.
///
/// Both the tiered remote service and the local runtime are driven through
/// this one shape; which backend and which model id a call goes to is the
/// [`crate::ProviderRouter`]'s decision.
///
/// To add a backend:
/// 1. Implement `ModelBackend` for your client.
/// 2. Register it with [`crate::ProviderRouter::register`] under its [`ProviderKind`].
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Which provider family this backend belongs to.
    fn kind(&self) -> ProviderKind;

    /// Non-streaming generation.
    async fn generate(&self, request: &GenerateRequest) -> ConclaveResult<GenerateResponse>;

    /// Streaming generation.
    ///
    /// Returns a receiver for incremental events and a join handle that
    /// resolves to the final aggregated response. The default implementation
    /// runs [`ModelBackend::generate`] and replays it as one delta.
    async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> ConclaveResult<(
        mpsc::Receiver<StreamEvent>,
        JoinHandle<ConclaveResult<GenerateResponse>>,
    )> {
        let response = self.generate(request).await?;
        let (tx, rx) = mpsc::channel(2);
        let handle = tokio::spawn(async move {
            let _ = tx
                .send(StreamEvent::TextDelta {
                    text: response.text.clone(),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            Ok(response)
        });
        Ok((rx, handle))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct FixedBackend;

    #[async_trait]
    impl ModelBackend for FixedBackend {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }

        async fn generate(&self, request: &GenerateRequest) -> ConclaveResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: format!("{}@{}", request.prompt, request.model),
                token_count: Some(3),
            })
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            prompt: "hello".into(),
            system: None,
            model: "llama3.2:3b".into(),
            temperature: 0.4,
            max_tokens: 128,
        }
    }

    #[tokio::test]
    async fn test_default_stream_replays_generate() {
        let backend = FixedBackend;
        let (mut rx, handle) = backend.generate_stream(&request()).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::TextDelta {
                text: "hello@llama3.2:3b".into()
            })
        );
        assert_eq!(rx.recv().await, Some(StreamEvent::Done));
        assert_eq!(rx.recv().await, None);

        let final_resp = handle.await.unwrap().unwrap();
        assert_eq!(final_resp.token_count, Some(3));
    }

    #[test]
    fn test_request_omits_empty_system() {
        let json = serde_json::to_string(&request()).unwrap();
        assert!(!json.contains("system"));
    }
}
