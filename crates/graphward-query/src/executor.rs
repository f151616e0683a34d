//! The boundary to a graph storage engine.

use std::sync::Arc;

use crate::error::ExecutorError;
use crate::value::{Params, QueryResult};

/// A backend that runs Cypher text with bound parameters.
///
/// Implementations own their timeout and cancellation behavior; callers pass
/// errors through unchanged.
pub trait GraphExecutor {
    fn execute(&self, query: &str, params: &Params) -> Result<QueryResult, ExecutorError>;
}

impl<E: GraphExecutor + ?Sized> GraphExecutor for &E {
    fn execute(&self, query: &str, params: &Params) -> Result<QueryResult, ExecutorError> {
        (**self).execute(query, params)
    }
}

impl<E: GraphExecutor + ?Sized> GraphExecutor for Box<E> {
    fn execute(&self, query: &str, params: &Params) -> Result<QueryResult, ExecutorError> {
        (**self).execute(query, params)
    }
}

impl<E: GraphExecutor + ?Sized> GraphExecutor for Arc<E> {
    fn execute(&self, query: &str, params: &Params) -> Result<QueryResult, ExecutorError> {
        (**self).execute(query, params)
    }
}
