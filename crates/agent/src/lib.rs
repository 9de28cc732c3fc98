//! Embedding host for the tiering engine: configuration and HTTP API

pub mod api;
pub mod config;
