use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
    #[error("Call to {0} expects {1} arguments, but {2} were given")]
    CallArity(String, usize, usize),
    #[error("Error: {0}")]
    Custom(String),
    #[error("Executor can not find a function named {0}")]
    ExecutorFunctionNotFound(String),
    #[error("Executor attempted to access invalid address 0x{0:x}")]
    ExecutorInvalidAddress(u64),
    #[error("Executor could not find a valid successor")]
    ExecutorNoValidLocation,
    #[error("Executor has no value for scalar {0}")]
    ExecutorScalar(String),
    #[error("Executor exceeded its step limit")]
    ExecutorStepLimit,
    #[error("Executor does not know how to call {0}")]
    ExecutorUnhandledCall(String),
    #[error("Function {0} not found")]
    FunctionNotFound(String),
    #[error("Global variable {0} not found")]
    GlobalNotFound(String),
    #[error("The vertex id {0} does not exist in the graph")]
    GraphVertexNotFound(usize),
    #[error("The edge with head {0} and tail {1} does not exist in the graph")]
    GraphEdgeNotFound(usize, usize),
    #[error("Function main must take 0, 2 or 3 arguments, but takes {0}")]
    InvalidMain(usize),
    #[error("Storage node {0} does not exist in the points-to graph")]
    NodeNotFound(usize),
    #[error("Failed to parse type signature `{0}`: {1}")]
    Signature(String, String),
    #[error("Sort error, invalid types between expressions")]
    Sort,
    #[error("Struct type {0} is not defined")]
    UnknownStruct(String),
    #[error("Type {0} does not have a size")]
    Unsized(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
