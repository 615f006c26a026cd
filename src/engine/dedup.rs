//! Deduplication keys for documentation queries.
//!
//! Several rules may ask the same question (every `A8-*` rule emits id `A8`,
//! on different axes). Within one run a query is emitted at most once per
//! `(id, axis)`; the first emitter's message is kept.

use crate::{Axis, DocumentationQuery};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct QueryKey {
    pub(crate) id: String,
    pub(crate) axis: Axis,
}

impl QueryKey {
    pub(crate) fn from_query(query: &DocumentationQuery) -> Self {
        QueryKey { id: query.id.clone(), axis: query.axis }
    }
}
