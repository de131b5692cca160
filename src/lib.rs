//! Chat-model client toolkit for OpenAI-compatible endpoints, with an
//! LLM-as-judge evaluation harness on top.

pub mod commands;
pub mod config;
pub mod eval;
pub mod rchain;
pub mod telemetry;
