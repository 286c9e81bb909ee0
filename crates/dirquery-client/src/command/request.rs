//! Request-only command.

use std::sync::Arc;

use crate::error::Error;
use crate::options::{ObjectMapping, QueryOptions};

use super::{
    attach_skip_window, build_request, ExecutionContext, LoopOutcome, Prepared, QueryCommand,
    QueryOutcome,
};

/// Builds the search request a list query would send, without sending it.
pub struct GetRequestCommand<M> {
    options: QueryOptions,
    mapping: Arc<M>,
}

impl<M: ObjectMapping> GetRequestCommand<M> {
    pub fn new(options: QueryOptions, mapping: Arc<M>) -> Self {
        Self { options, mapping }
    }
}

impl<M: ObjectMapping + 'static> QueryCommand<M::Object> for GetRequestCommand<M> {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<M::Object>, Error> {
        let mut request = build_request(&self.options, self.mapping.naming_context(), context)?;
        attach_skip_window(&mut request, &self.options, context)?;
        Ok(Prepared::Done(QueryOutcome::Request(request)))
    }

    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<M::Object>, Error> {
        Ok(QueryOutcome::Request(outcome.request))
    }
}
