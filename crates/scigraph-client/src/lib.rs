//! Scigraph Client: guarded outbound endpoint plumbing
//!
//! Every call to a chat-completion or embedding endpoint takes the same
//! path:
//!
//! ```text
//!   caller ──► rate limiter ──► circuit breaker ──► HTTP endpoint
//! ```
//!
//! One limiter/breaker pair exists per outbound endpoint and is shared
//! across all tasks. State is process-local; there is no cluster-wide
//! coordination.

pub mod breaker;
pub mod chat;
pub mod embeddings;
pub mod guard;
pub mod limiter;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use chat::{ChatClientConfig, HttpChatModel};
pub use embeddings::{EmbeddingClientConfig, HttpEmbedder};
pub use guard::{GuardedChatModel, GuardedEmbedder};
pub use limiter::RateLimiter;
