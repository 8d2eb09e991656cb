//! Result streams and paging
//!
//! A [`ResultStream`] is the engine's cursor over hits. It owns engine-side
//! resources and must be released exactly once; [`ResultsHandle`] enforces
//! that by releasing on drop. [`ResultsPager`] layers offset skipping and a
//! one-hit lookahead on top of a stream.

use std::collections::VecDeque;

use tracing::debug;

use super::element::Element;
use super::types::{Hit, SortBy};
use crate::error::Result;

/// Auxiliary information reported by the engine alongside hits
#[derive(Debug, Clone, PartialEq)]
pub struct QueryInfo {
    element: Element,
}

impl QueryInfo {
    pub fn new(element: Element) -> Self {
        Self { element }
    }

    /// e.g. a spelling suggestion for a term with no matches
    pub fn suggestion(term: &str, suggestion: &str) -> Self {
        Self::new(
            Element::new("suggest")
                .with_attr("term", term)
                .with_content(suggestion),
        )
    }

    pub fn to_element(&self) -> Element {
        self.element.clone()
    }
}

/// Forward-only cursor over engine hits
pub trait ResultStream: Send {
    /// The order hits are actually returned in
    fn sort_by(&self) -> SortBy;

    /// Next hit, `None` once exhausted
    fn next_hit(&mut self) -> Option<Hit>;

    /// Auxiliary info entries, in engine order
    fn result_info(&self) -> Vec<QueryInfo> {
        Vec::new()
    }

    /// Best-effort estimate of the total result size
    fn estimate_size(&self) -> Result<u64>;

    /// Free engine-side resources. Called exactly once by [`ResultsHandle`].
    fn release(&mut self);
}

/// Owns a stream for the lifetime of one search and releases it on drop
pub struct ResultsHandle {
    stream: Box<dyn ResultStream>,
}

impl ResultsHandle {
    pub fn new(stream: Box<dyn ResultStream>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &dyn ResultStream {
        self.stream.as_ref()
    }

    pub fn stream_mut(&mut self) -> &mut dyn ResultStream {
        self.stream.as_mut()
    }
}

impl Drop for ResultsHandle {
    fn drop(&mut self) {
        self.stream.release();
        debug!("Released search results");
    }
}

/// Offset/lookahead wrapper over a stream
pub struct ResultsPager<'a> {
    stream: &'a mut dyn ResultStream,
    sort_by: SortBy,
    to_skip: usize,
    peeked: Option<Hit>,
}

impl<'a> ResultsPager<'a> {
    pub fn new(stream: &'a mut dyn ResultStream, offset: usize) -> Self {
        let sort_by = stream.sort_by();
        Self {
            stream,
            sort_by,
            to_skip: offset,
            peeked: None,
        }
    }

    /// Sort order of the underlying stream
    pub fn sort_order(&self) -> SortBy {
        self.sort_by
    }

    fn skip_offset(&mut self) {
        while self.to_skip > 0 {
            self.to_skip -= 1;
            if self.stream.next_hit().is_none() {
                self.to_skip = 0;
                break;
            }
        }
    }

    /// Whether at least one unconsumed hit remains
    pub fn has_next(&mut self) -> bool {
        self.skip_offset();
        if self.peeked.is_none() {
            self.peeked = self.stream.next_hit();
        }
        self.peeked.is_some()
    }

    pub fn next_hit(&mut self) -> Option<Hit> {
        self.skip_offset();
        self.peeked.take().or_else(|| self.stream.next_hit())
    }
}

/// In-memory stream over an already materialized hit list
pub struct VecResultStream {
    hits: VecDeque<Hit>,
    sort_by: SortBy,
    info: Vec<QueryInfo>,
    total: u64,
}

impl VecResultStream {
    pub fn new(hits: Vec<Hit>, sort_by: SortBy) -> Self {
        let total = hits.len() as u64;
        Self {
            hits: hits.into(),
            sort_by,
            info: Vec::new(),
            total,
        }
    }

    pub fn with_info(mut self, info: Vec<QueryInfo>) -> Self {
        self.info = info;
        self
    }

    /// Report a total other than the number of materialized hits
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }
}

impl ResultStream for VecResultStream {
    fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    fn next_hit(&mut self) -> Option<Hit> {
        self.hits.pop_front()
    }

    fn result_info(&self) -> Vec<QueryInfo> {
        self.info.clone()
    }

    fn estimate_size(&self) -> Result<u64> {
        Ok(self.total)
    }

    fn release(&mut self) {
        self.hits.clear();
    }
}
