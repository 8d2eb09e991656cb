//! Query engine contract and execution
//!
//! The engine parses the query text and returns a cursor over hits.
//! [`QueryExecutor`] invokes it and translates engine failures into
//! [`SearchError`] values the caller can surface.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::stream::{ResultStream, ResultsHandle};
use super::types::SearchRequest;
use crate::error::{Result, SearchError};

/// Offending token reported by a query parser
#[derive(Debug, Clone, PartialEq)]
pub struct ParseToken {
    pub image: String,
    pub column: i32,
}

/// Failures raised by a query engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{message}")]
    Parse {
        /// Parser-specific error code, if the parser assigns one
        code: Option<String>,
        /// Offending token, if known
        token: Option<ParseToken>,
        /// True when the parser only produced an "expected one of" diagnostic
        expected_tokens: bool,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Full-text / structured query engine
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run the request's query and return a cursor over its hits
    async fn execute(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<Box<dyn ResultStream>, EngineError>;
}

/// Runs requests against the engine
pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Execute the request, returning a handle that releases the stream on drop
    pub async fn execute(&self, request: &SearchRequest) -> Result<ResultsHandle> {
        debug!("Executing query: {}", request.query);
        match self.engine.execute(request).await {
            Ok(stream) => Ok(ResultsHandle::new(stream)),
            Err(e) => Err(Self::translate(request, e)),
        }
    }

    fn translate(request: &SearchRequest, error: EngineError) -> SearchError {
        match error {
            EngineError::Io(e) => SearchError::Failure(format!("IO error: {}", e)),
            EngineError::Parse {
                code,
                token,
                expected_tokens,
                message,
            } => {
                // Token-sequence diagnostics are too long to use as a code
                let code = if expected_tokens {
                    "PARSER_ERROR".to_string()
                } else {
                    code.unwrap_or_else(|| message.clone())
                };
                let (token, column) = match token {
                    Some(t) => (t.image, t.column),
                    None => (String::new(), -1),
                };
                SearchError::QueryParse {
                    query: request.query.clone(),
                    code,
                    token,
                    column,
                    message,
                }
            }
        }
    }
}
