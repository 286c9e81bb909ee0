//! Counting.

use std::sync::Arc;

use crate::error::Error;
use crate::options::{ObjectMapping, QueryOptions};

use super::{
    attach_skip_window, build_request, plan, search_for_plan, ExecutionContext, LoopOutcome,
    Prepared, QueryCommand, QueryOutcome, MINIMAL_ATTRIBUTE,
};

/// Counts matching entries across every page without materializing them.
///
/// A skip size turns the count into a count of the VLV window after the
/// skipped entries, so it needs a sort like any other skip.
pub struct CountCommand<M> {
    options: QueryOptions,
    mapping: Arc<M>,
}

impl<M: ObjectMapping> CountCommand<M> {
    pub fn new(options: QueryOptions, mapping: Arc<M>) -> Self {
        Self { options, mapping }
    }

    fn outcome(&self, count: usize) -> QueryOutcome<M::Object> {
        if self.options.is_long_count {
            QueryOutcome::LongCount(count as u64)
        } else {
            QueryOutcome::Count(count)
        }
    }
}

impl<M: ObjectMapping + 'static> QueryCommand<M::Object> for CountCommand<M> {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<M::Object>, Error> {
        if self.options.yield_no_results || self.options.take_size == Some(0) {
            return Ok(Prepared::Done(self.outcome(0)));
        }

        let mut request = build_request(&self.options, self.mapping.naming_context(), context)?;
        request.types_only = true;
        request.attributes = vec![MINIMAL_ATTRIBUTE.to_string()];
        attach_skip_window(&mut request, &self.options, context)?;

        let plan = plan(&self.options, &request, context)?;
        let search = search_for_plan(plan, request, &self.options, context)?;
        Ok(Prepared::Search(search.tally_only()))
    }

    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<M::Object>, Error> {
        let count = match self.options.take_size {
            Some(take) => outcome.tally.min(take as usize),
            None => outcome.tally,
        };
        Ok(self.outcome(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mapping, MockDirectory};
    use dirquery_proto::{SortKey, VlvTarget};

    #[test]
    fn test_counts_across_pages() {
        let directory = MockDirectory::with_users(23);
        let outcome = CountCommand::new(QueryOptions::new("(cn=*)").with_page_size(5), mapping())
            .execute(&directory, &ExecutionContext::default())
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Count(23));
        assert_eq!(directory.round_trips(), 5);
        assert!(directory.requests().iter().all(|r| r.types_only));
    }

    #[test]
    fn test_long_count() {
        let directory = MockDirectory::with_users(7);
        let outcome = CountCommand::new(QueryOptions::new("(cn=*)").long_count(), mapping())
            .execute(&directory, &ExecutionContext::default())
            .unwrap();
        assert_eq!(outcome, QueryOutcome::LongCount(7));
        assert_eq!(outcome.count(), Some(7));
    }

    #[test]
    fn test_take_bounds_count() {
        let directory = MockDirectory::with_users(23);
        let outcome = CountCommand::new(
            QueryOptions::new("(cn=*)").with_page_size(5).with_take(7),
            mapping(),
        )
        .execute(&directory, &ExecutionContext::default())
        .unwrap();
        assert_eq!(outcome, QueryOutcome::Count(7));
        assert_eq!(directory.round_trips(), 2);
    }

    #[test]
    fn test_skip_counts_window_after_skipped_entries() {
        let directory = MockDirectory::with_users(10);
        let sorted = || QueryOptions::new("(cn=*)").with_sort(SortKey::ascending("cn"));
        let context = ExecutionContext::default();

        let outcome = CountCommand::new(sorted().with_skip(3).with_take(4), mapping())
            .execute(&directory, &context)
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Count(4));
        let vlv = directory.requests()[0].vlv_control().cloned().unwrap();
        assert!(matches!(vlv.target, VlvTarget::Offset { offset: 4, .. }));

        let outcome = CountCommand::new(sorted().with_skip(8).with_take(4), mapping())
            .execute(&directory, &context)
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Count(2));

        let outcome = CountCommand::new(sorted().with_skip(3), mapping())
            .execute(&directory, &context)
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Count(7));
    }

    #[test]
    fn test_skip_without_sort_rejected() {
        let directory = MockDirectory::with_users(5);
        let err = CountCommand::new(QueryOptions::new("(cn=*)").with_skip(2), mapping())
            .execute(&directory, &ExecutionContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(directory.round_trips(), 0);
    }

    #[test]
    fn test_zero_without_network() {
        let directory = MockDirectory::with_users(5);
        let context = ExecutionContext::default();
        for options in [
            QueryOptions::new("(cn=*)").yielding_no_results(),
            QueryOptions::new("(cn=*)").with_take(0),
        ] {
            let outcome = CountCommand::new(options, mapping())
                .execute(&directory, &context)
                .unwrap();
            assert_eq!(outcome.count(), Some(0));
        }
        assert_eq!(directory.round_trips(), 0);
    }
}
