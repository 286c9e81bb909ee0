//! The general list query.

use std::sync::Arc;

use dirquery_proto::VlvTarget;

use crate::error::Error;
use crate::options::{LdapPage, ObjectMapping, QueryOptions, VirtualListView};

use super::{
    attach_skip_window, build_request, plan, search_for_plan, transform_all, ExecutionContext,
    LoopMode, LoopOutcome, Prepared, QueryCommand, QueryOutcome,
};

/// Returns every matching entry, a caller-driven page, or a VLV window.
///
/// With paging enabled the server is walked page by page until its cookie
/// comes back empty or the take size is reached. A server that never empties
/// its cookie keeps the loop going, so callers expecting huge result sets
/// should bound the query with a take size.
pub struct StandardQueryCommand<M> {
    options: QueryOptions,
    mapping: Arc<M>,
}

impl<M: ObjectMapping> StandardQueryCommand<M> {
    pub fn new(options: QueryOptions, mapping: Arc<M>) -> Self {
        Self { options, mapping }
    }

    fn empty(&self) -> QueryOutcome<M::Object> {
        if let Some(paging) = &self.options.paging_options {
            return QueryOutcome::Page(LdapPage {
                items: Vec::new(),
                page_size: paging.page_size,
                next_page: Vec::new(),
                filter: self.options.filter.clone(),
            });
        }
        if let Some(vlv) = self.options.vlv_control() {
            let target_position = match vlv.target {
                VlvTarget::Offset { offset, .. } => offset,
                VlvTarget::GreaterOrEqual(_) => 0,
            };
            return QueryOutcome::Window(VirtualListView {
                items: Vec::new(),
                content_count: 0,
                context_id: None,
                target_position,
            });
        }
        QueryOutcome::List(Vec::new())
    }
}

impl<M: ObjectMapping + 'static> QueryCommand<M::Object> for StandardQueryCommand<M> {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<M::Object>, Error> {
        if self.options.yield_no_results || self.options.take_size == Some(0) {
            return Ok(Prepared::Done(self.empty()));
        }

        let mut request = build_request(&self.options, self.mapping.naming_context(), context)?;
        attach_skip_window(&mut request, &self.options, context)?;

        let plan = plan(&self.options, &request, context)?;
        let search = search_for_plan(plan, request, &self.options, context)?;
        Ok(Prepared::Search(search))
    }

    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<M::Object>, Error> {
        let LoopOutcome {
            request,
            mode,
            mut entries,
            next_cookie,
            vlv,
            ..
        } = outcome;

        if mode == LoopMode::ManualPage {
            let page_size = request.paging_control().map(|page| page.size).unwrap_or(0);
            return Ok(QueryOutcome::Page(LdapPage {
                items: transform_all(self.mapping.as_ref(), entries)?,
                page_size,
                next_page: next_cookie,
                filter: request.filter,
            }));
        }

        if self.options.vlv_control().is_some() {
            if let Some(vlv) = vlv {
                return Ok(QueryOutcome::Window(VirtualListView {
                    items: transform_all(self.mapping.as_ref(), entries)?,
                    content_count: vlv.content_count,
                    context_id: vlv.context_id,
                    target_position: vlv.target_position,
                }));
            }
        }

        // Pages need not divide the take size evenly.
        if let Some(take) = self.options.take_size {
            entries.truncate(take as usize);
        }
        Ok(QueryOutcome::List(transform_all(self.mapping.as_ref(), entries)?))
    }
}
