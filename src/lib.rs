//! tunnelforge: a self-hosted reverse HTTP tunnel with a programmable
//! request-interception pipeline.
//!
//! A public [`relay`] accepts inbound HTTP and forwards each request, over a
//! single persistent duplex channel, to a developer-side [`agent`] process
//! that re-issues the request locally and streams the response back. Between
//! arrival and local dispatch, the agent runs each request through an
//! ordered [`agent::pipeline`] that can mock it, inject chaos, or re-route it.

pub mod agent;
pub mod error;
pub mod matcher;
pub mod protocol;
pub mod relay;
pub mod rules;

pub use error::{Error, Result};
