//! Single / SingleOrDefault.

use std::sync::Arc;

use crate::error::Error;
use crate::options::{ObjectMapping, QueryOptions};

use super::{
    attach_limit_page, build_request, ExecutionContext, LoopOutcome, Prepared, QueryCommand,
    QueryOutcome, SearchLoop,
};

/// Returns the only matching entry.
///
/// Asks for a two-entry page so a second match is seen without fetching the
/// whole result set.
pub struct SingleCommand<M> {
    options: QueryOptions,
    mapping: Arc<M>,
    or_default: bool,
}

impl<M: ObjectMapping> SingleCommand<M> {
    /// `or_default` answers `None` instead of failing when nothing matches.
    pub fn new(options: QueryOptions, mapping: Arc<M>, or_default: bool) -> Self {
        Self {
            options,
            mapping,
            or_default,
        }
    }

    fn cardinality(&self, found: usize, base_dn: &str) -> Error {
        Error::Cardinality {
            expected: "exactly one entry",
            found,
            filter: self.options.filter.clone(),
            base_dn: base_dn.to_string(),
        }
    }
}

impl<M: ObjectMapping + 'static> QueryCommand<M::Object> for SingleCommand<M> {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<M::Object>, Error> {
        if self.options.yield_no_results {
            if self.or_default {
                return Ok(Prepared::Done(QueryOutcome::Object(None)));
            }
            let base_dn = context
                .naming_context
                .as_deref()
                .unwrap_or(self.mapping.naming_context());
            return Err(self.cardinality(0, base_dn));
        }

        let mut request = build_request(&self.options, self.mapping.naming_context(), context)?;
        attach_limit_page(&mut request, 2, context)?;
        Ok(Prepared::Search(SearchLoop::single(request)?))
    }

    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<M::Object>, Error> {
        let found = outcome.entries.len();
        match found {
            1 => {
                let entry = outcome.entries.into_iter().next();
                match entry {
                    Some(entry) => Ok(QueryOutcome::Object(Some(self.mapping.transform(entry)?))),
                    None => Err(self.cardinality(0, &outcome.request.base_dn)),
                }
            }
            0 if self.or_default => Ok(QueryOutcome::Object(None)),
            _ => Err(self.cardinality(found, &outcome.request.base_dn)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mapping, MockDirectory};

    fn single(filter: &str, or_default: bool) -> Result<QueryOutcome<dirquery_proto::SearchEntry>, Error> {
        let directory = MockDirectory::with_users(30);
        SingleCommand::new(QueryOptions::new(filter), mapping(), or_default)
            .execute(&directory, &ExecutionContext::default())
    }

    #[test]
    fn test_exactly_one() {
        let entry = single("(cn=user004)", false)
            .unwrap()
            .into_object()
            .unwrap()
            .unwrap();
        assert_eq!(entry.dn, "CN=user004,OU=Users,DC=test");
    }

    #[test]
    fn test_none_or_many_fail() {
        match single("(cn=admin)", false).unwrap_err() {
            Error::Cardinality { found, .. } => assert_eq!(found, 0),
            other => panic!("unexpected error: {:?}", other),
        }
        match single("(cn=user00*)", false).unwrap_err() {
            Error::Cardinality { found, filter, .. } => {
                assert_eq!(found, 2);
                assert_eq!(filter, "(cn=user00*)");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_or_default() {
        assert_eq!(single("(cn=admin)", true).unwrap(), QueryOutcome::Object(None));
        assert!(matches!(
            single("(cn=user00*)", true),
            Err(Error::Cardinality { .. })
        ));
    }

    #[test]
    fn test_two_entry_limit() {
        let directory = MockDirectory::with_users(5);
        SingleCommand::new(QueryOptions::new("(cn=user001)"), mapping(), false)
            .execute(&directory, &ExecutionContext::default())
            .unwrap();
        assert_eq!(directory.requests()[0].paging_control().map(|p| p.size), Some(2));
    }

    #[test]
    fn test_yield_no_results() {
        let directory = MockDirectory::with_users(5);
        let context = ExecutionContext::default();
        let options = QueryOptions::new("(cn=*)").yielding_no_results();

        let outcome = SingleCommand::new(options.clone(), mapping(), true)
            .execute(&directory, &context)
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Object(None));
        assert!(SingleCommand::new(options, mapping(), false)
            .execute(&directory, &context)
            .is_err());
        assert_eq!(directory.round_trips(), 0);
    }
}
