//! Closed set of error kinds for the engine, per the error handling design.
//!
//! Scene-load errors (`Config`, `Translation`, `CompileLink`, `ResourceAlloc`)
//! are meant to be propagated with `?` out of `Scene::compile` and abort the
//! run. `DataIncomplete` is recorded on the `Scene` instead of propagated.
//! `Readback`, `EncoderPipe` and `AudioSource` are per-frame/per-device errors
//! whose handling differs by running mode; see `scheduler` and `audio`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("shader translation failed for pass '{pass}': {reason}")]
    Translation { pass: String, reason: String },

    #[error("shader compile/link failed for pass '{pass}': {reason}")]
    CompileLink { pass: String, reason: String },

    #[error("GPU resource allocation failed: {0}")]
    ResourceAlloc(String),

    #[error("referenced buffer or asset '{0}' could not be resolved")]
    DataIncomplete(String),

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("encoder pipe error: {0}")]
    EncoderPipe(String),

    #[error("audio source '{0}' could not be opened")]
    AudioSource(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
