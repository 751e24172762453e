use serde::{Deserialize, Serialize};

/// Events emitted during a streaming generation.
///
/// Consumers receive partial text as it arrives from the backend; the final
/// aggregated response is delivered separately through the join handle
/// returned by [`crate::ModelBackend::generate_stream`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A chunk of generated text.
    TextDelta {
        /// The incremental text.
        text: String,
    },

    /// The stream has finished successfully.
    Done,

    /// An error occurred during streaming.
    Error {
        /// Human-readable description.
        message: String,
    },
}
