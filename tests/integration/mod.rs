//! Integration tests for the scribe generation pipeline

mod config_loading;
mod pipeline;
mod provider_http;
