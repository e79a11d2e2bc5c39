//! Scribe: Resilient Asynchronous Generation Pipeline
//!
//! Job-based text generation against an unreliable provider: durable job
//! records with a monotonic status lifecycle, tiered credentials with
//! quarantine, payload extraction from noisy responses, bounded retry with
//! credential rotation, and a broker-fed worker pool with an inline fallback
//! so submission never loses work.

pub mod broker;
pub mod client;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod job;
pub mod logging;
pub mod provider;
pub mod retry;
pub mod store;
pub mod worker;
