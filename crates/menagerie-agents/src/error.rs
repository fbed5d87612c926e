//! Error types for the menagerie-agents crate.
//!
//! All operations that can fail return typed errors rather than panicking.

/// Errors that can occur while creating or mutating agents.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// An agent needs a non-empty owner.
    #[error("owner must not be empty")]
    EmptyOwner,

    /// An arithmetic overflow occurred in a counter that must not saturate.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },
}
