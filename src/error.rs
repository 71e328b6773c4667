use thiserror::Error;

/// Crate-wide error type. Stage failures carry a message; decode and load
/// distribution failures carry their own kinds so callers can decide which
/// are fatal and which are skippable.
#[derive(Error, Debug)]
pub enum GraniteError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Mesher error: {0}")]
    Mesher(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Post Processor error: {0}")]
    PostProcessor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("surface has zero total area")]
    ZeroArea,

    #[error("load direction vector has zero magnitude")]
    ZeroDirection,
}
