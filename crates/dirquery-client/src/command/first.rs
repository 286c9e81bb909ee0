//! First / FirstOrDefault.

use std::sync::Arc;

use crate::error::Error;
use crate::options::{ObjectMapping, QueryOptions};

use super::{
    attach_limit_page, build_request, ExecutionContext, LoopOutcome, Prepared, QueryCommand,
    QueryOutcome, SearchLoop,
};

/// Returns the first matching entry, asking the server for a one-entry page.
pub struct FirstCommand<M> {
    options: QueryOptions,
    mapping: Arc<M>,
    or_default: bool,
}

impl<M: ObjectMapping> FirstCommand<M> {
    /// `or_default` answers `None` instead of failing when nothing matches.
    pub fn new(options: QueryOptions, mapping: Arc<M>, or_default: bool) -> Self {
        Self {
            options,
            mapping,
            or_default,
        }
    }

    fn empty(&self, base_dn: &str) -> Result<QueryOutcome<M::Object>, Error> {
        if self.or_default {
            Ok(QueryOutcome::Object(None))
        } else {
            Err(Error::Cardinality {
                expected: "at least one entry",
                found: 0,
                filter: self.options.filter.clone(),
                base_dn: base_dn.to_string(),
            })
        }
    }
}

impl<M: ObjectMapping + 'static> QueryCommand<M::Object> for FirstCommand<M> {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<M::Object>, Error> {
        if self.options.yield_no_results {
            let base_dn = context
                .naming_context
                .as_deref()
                .unwrap_or(self.mapping.naming_context());
            return self.empty(base_dn).map(Prepared::Done);
        }

        let mut request = build_request(&self.options, self.mapping.naming_context(), context)?;
        attach_limit_page(&mut request, 1, context)?;
        Ok(Prepared::Search(SearchLoop::single(request)?))
    }

    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<M::Object>, Error> {
        match outcome.entries.into_iter().next() {
            Some(entry) => Ok(QueryOutcome::Object(Some(self.mapping.transform(entry)?))),
            None => self.empty(&outcome.request.base_dn),
        }
    }
}
