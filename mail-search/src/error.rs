use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query parse error: {message} (query: {query}, token: '{token}', column: {column})")]
    QueryParse {
        /// Raw query text as submitted
        query: String,
        /// Parser error code, or "PARSER_ERROR" for token-sequence diagnostics
        code: String,
        /// Image of the offending token, empty when unknown
        token: String,
        /// Column of the offending token, -1 when unknown
        column: i32,
        /// Human readable message
        message: String,
    },

    #[error("Service failure: {0}")]
    Failure(String),

    #[error("Unknown document type: {0}")]
    UnknownDocument(String),

    #[error("Remote mailbox error: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
