use thiserror::Error;

/// Unified error type for the entire Chariot runtime.
#[derive(Error, Debug)]
pub enum ChariotError {
    // ── Resolution errors ──────────────────────────────────────
    #[error("variable '{0}' not defined")]
    UndefinedVariable(String),

    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    // ── Dispatch errors ────────────────────────────────────────
    #[error("{function}: expected {expected} argument(s) ({usage}), got {got}")]
    Arity {
        function: String,
        expected: String,
        usage: String,
        got: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("index out of bounds: {0}")]
    OutOfBounds(String),

    #[error("property '{property}' not found in {target}")]
    PropertyNotFound { property: String, target: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("evaluation error: {0}")]
    Eval(String),

    // ── Plan / agent errors ────────────────────────────────────
    #[error("plan error: {0}")]
    Plan(String),

    #[error("agent error: {0}")]
    Agent(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Persistence errors ─────────────────────────────────────
    #[error("persistence error: {0}")]
    Persistence(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable classification of a [`ChariotError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UndefinedVariable,
    UndefinedFunction,
    Arity,
    TypeMismatch,
    OutOfBounds,
    PropertyNotFound,
    InvalidArgument,
    Eval,
    Plan,
    Agent,
    Config,
    Persistence,
    Io,
}

impl ChariotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UndefinedVariable(_) => ErrorKind::UndefinedVariable,
            Self::UndefinedFunction(_) => ErrorKind::UndefinedFunction,
            Self::Arity { .. } => ErrorKind::Arity,
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::OutOfBounds(_) => ErrorKind::OutOfBounds,
            Self::PropertyNotFound { .. } => ErrorKind::PropertyNotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Eval(_) => ErrorKind::Eval,
            Self::Plan(_) => ErrorKind::Plan,
            Self::Agent(_) => ErrorKind::Agent,
            Self::Config(_) => ErrorKind::Config,
            Self::Persistence(_) | Self::Serialization(_) => ErrorKind::Persistence,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for a type mismatch raised by a named function.
    pub fn type_mismatch(function: &str, detail: impl std::fmt::Display) -> Self {
        Self::TypeMismatch(format!("{function}: {detail}"))
    }
}

pub type Result<T> = std::result::Result<T, ChariotError>;
