//! Shared test utilities for pact-provider.
//!
//! This crate provides:
//! - A scripted verification engine that drives the proxy over HTTP
//! - An output writer that keeps every line
//! - Proptest generators for state-change and message payloads
//! - Fixtures with sample handlers and requests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{CollectingOutput, EngineRecord, ScriptStep, ScriptedEngine, StepOutcome};
