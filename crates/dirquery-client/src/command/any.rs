//! Existence check.

use std::sync::Arc;

use crate::error::Error;
use crate::options::{ObjectMapping, QueryOptions};

use super::{
    attach_limit_page, build_request, ExecutionContext, LoopOutcome, Prepared, QueryCommand,
    QueryOutcome, SearchLoop, MINIMAL_ATTRIBUTE,
};

/// Answers whether any entry matches, without materializing attributes.
pub struct AnyCommand<M> {
    options: QueryOptions,
    mapping: Arc<M>,
}

impl<M: ObjectMapping> AnyCommand<M> {
    pub fn new(options: QueryOptions, mapping: Arc<M>) -> Self {
        Self { options, mapping }
    }
}

impl<M: ObjectMapping + 'static> QueryCommand<M::Object> for AnyCommand<M> {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<M::Object>, Error> {
        if self.options.yield_no_results {
            return Ok(Prepared::Done(QueryOutcome::Exists(false)));
        }

        let mut request = build_request(&self.options, self.mapping.naming_context(), context)?;
        request.types_only = true;
        request.attributes = vec![MINIMAL_ATTRIBUTE.to_string()];
        attach_limit_page(&mut request, 1, context)?;

        Ok(Prepared::Search(SearchLoop::single(request)?.tally_only()))
    }

    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<M::Object>, Error> {
        Ok(QueryOutcome::Exists(outcome.tally > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mapping, MockDirectory};

    #[test]
    fn test_exists() {
        let directory = MockDirectory::with_users(50);
        let context = ExecutionContext::default();

        let found = AnyCommand::new(QueryOptions::new("(cn=user01*)"), mapping())
            .execute(&directory, &context)
            .unwrap();
        assert_eq!(found, QueryOutcome::Exists(true));

        let missing = AnyCommand::new(QueryOptions::new("(cn=admin)"), mapping())
            .execute(&directory, &context)
            .unwrap();
        assert_eq!(missing, QueryOutcome::Exists(false));
    }

    #[test]
    fn test_exists_request_is_minimal() {
        let directory = MockDirectory::with_users(50);
        AnyCommand::new(QueryOptions::new("(cn=*)").with_attributes(["mail"]), mapping())
            .execute(&directory, &ExecutionContext::default())
            .unwrap();

        let requests = directory.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].types_only);
        assert_eq!(requests[0].attributes, vec![MINIMAL_ATTRIBUTE]);
        assert_eq!(requests[0].paging_control().map(|p| p.size), Some(1));
    }

    #[test]
    fn test_yield_no_results() {
        let directory = MockDirectory::with_users(5);
        let outcome = AnyCommand::new(QueryOptions::new("(cn=*)").yielding_no_results(), mapping())
            .execute(&directory, &ExecutionContext::default())
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Exists(false));
        assert_eq!(directory.round_trips(), 0);
    }
}
