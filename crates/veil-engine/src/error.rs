use std::path::PathBuf;

use crate::gpu::{ResourceKind, UniformKind};

pub type EngineResult<T> = Result<T, EngineError>;

/// Broad classes of engine failure.
///
/// Every class is fatal for the engine lifecycle; shader diagnostics are never
/// errors and are only logged.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorCategory {
    ContextLoss,
    ResourceCreation,
    ContractViolation,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("graphics context lost")]
    ContextLost,

    #[error("failed to create {0}")]
    ResourceCreation(ResourceKind),

    #[error("failed to load image {path}: {source}")]
    AssetLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("asset loader stopped before delivering every image")]
    AssetLoaderDisconnected,

    #[error("program link failed: {log}")]
    LinkFailed { log: String },

    #[error("uniform `{name}` is declared {kind} but was given {arity} component(s)")]
    UniformArity {
        name: String,
        kind: UniformKind,
        arity: usize,
    },

    #[error("attribute `{name}` has no valid location in its program")]
    AttributeLocation { name: &'static str },

    #[error("unknown package `{0}`")]
    UnknownPackage(String),

    #[error("package `{package}` has no uniform `{uniform}`")]
    UnknownUniform { package: String, uniform: String },

    #[error("vertex data for `{name}` has odd length {len}; expected 2 components per vertex")]
    OddVertexData { name: &'static str, len: usize },

    #[error("position has {position} vertices but normal has {normal}")]
    VertexCountMismatch { position: u32, normal: u32 },

    #[error("engine is not running yet")]
    NotRunning,
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::ContextLost => ErrorCategory::ContextLoss,
            EngineError::ResourceCreation(_)
            | EngineError::AssetLoad { .. }
            | EngineError::AssetLoaderDisconnected
            | EngineError::LinkFailed { .. } => ErrorCategory::ResourceCreation,
            EngineError::UniformArity { .. }
            | EngineError::AttributeLocation { .. }
            | EngineError::UnknownPackage(_)
            | EngineError::UnknownUniform { .. }
            | EngineError::OddVertexData { .. }
            | EngineError::VertexCountMismatch { .. }
            | EngineError::NotRunning => ErrorCategory::ContractViolation,
        }
    }
}
