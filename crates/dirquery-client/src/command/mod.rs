//! Query commands.
//!
//! One command per query intent. Every command builds a [`SearchLoop`] (or
//! answers without touching the network) in [`QueryCommand::prepare`] and
//! turns the loop's output into its result in [`QueryCommand::complete`]; the
//! provided `execute` / `execute_async` methods only differ in which runner
//! performs the round trips.

mod any;
mod count;
pub mod engine;
mod first;
mod request;
mod single;
mod standard;

use std::sync::Arc;

use async_trait::async_trait;

use dirquery_proto::controls::{PAGED_RESULTS_OID, VLV_REQUEST_OID};
use dirquery_proto::{
    Control, PageControl, SearchRequest, SearchScope, SortControl, VlvControl,
};

use crate::connection::DirectoryConnection;
use crate::error::Error;
use crate::options::{LdapPage, ObjectMapping, PagingOptions, QueryOptions, VirtualListView};

pub use any::AnyCommand;
pub use count::CountCommand;
pub use engine::{run_async, run_blocking, LoopMode, LoopOutcome, SearchLoop, Step};
pub use first::FirstCommand;
pub use request::GetRequestCommand;
pub use single::SingleCommand;
pub use standard::StandardQueryCommand;

/// Default server-side page size limit.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 500;

/// Attribute requested when only the presence of entries matters.
pub const MINIMAL_ATTRIBUTE: &str = "cn";

/// Per-execution settings supplied by whoever owns the connection.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub scope: SearchScope,
    /// Largest page the server will return.
    pub max_page_size: u32,
    /// Whether the engine may drive a paged results loop.
    pub paging_enabled: bool,
    /// Search base overriding the mapping's naming context.
    pub naming_context: Option<String>,
}

impl ExecutionContext {
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn with_paging(mut self, enabled: bool) -> Self {
        self.paging_enabled = enabled;
        self
    }

    pub fn with_naming_context(mut self, naming_context: impl Into<String>) -> Self {
        self.naming_context = Some(naming_context.into());
        self
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            scope: SearchScope::Subtree,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            paging_enabled: true,
            naming_context: None,
        }
    }
}

/// Result of executing a command, before any downstream mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<T> {
    Exists(bool),
    Count(usize),
    LongCount(u64),
    Object(Option<T>),
    List(Vec<T>),
    Page(LdapPage<T>),
    Window(VirtualListView<T>),
    Request(SearchRequest),
}

impl<T> QueryOutcome<T> {
    /// Count as 64 bits, for either count variant.
    pub fn count(&self) -> Option<u64> {
        match self {
            QueryOutcome::Count(n) => Some(*n as u64),
            QueryOutcome::LongCount(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<T>> {
        match self {
            QueryOutcome::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Option<T>> {
        match self {
            QueryOutcome::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn into_page(self) -> Option<LdapPage<T>> {
        match self {
            QueryOutcome::Page(page) => Some(page),
            _ => None,
        }
    }

    pub fn into_window(self) -> Option<VirtualListView<T>> {
        match self {
            QueryOutcome::Window(window) => Some(window),
            _ => None,
        }
    }
}

/// What `prepare` decided.
#[derive(Debug)]
pub enum Prepared<T> {
    /// Answered without any round trip.
    Done(QueryOutcome<T>),
    /// Run this loop, then call `complete`.
    Search(SearchLoop),
}

/// A query strategy.
#[async_trait]
pub trait QueryCommand<T: Send + 'static>: Send + Sync {
    /// Options the command was built from.
    fn options(&self) -> &QueryOptions;

    /// Build the request and loop, or answer immediately.
    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared<T>, Error>;

    /// Turn the loop's output into this command's result.
    fn complete(&self, outcome: LoopOutcome) -> Result<QueryOutcome<T>, Error>;

    /// Execute, blocking the calling thread for each round trip.
    fn execute(
        &self,
        connection: &dyn DirectoryConnection,
        context: &ExecutionContext,
    ) -> Result<QueryOutcome<T>, Error> {
        match self.prepare(context)? {
            Prepared::Done(outcome) => Ok(outcome),
            Prepared::Search(search) => self.complete(run_blocking(connection, search)?),
        }
    }

    /// Execute without blocking.
    async fn execute_async(
        &self,
        connection: &dyn DirectoryConnection,
        context: &ExecutionContext,
    ) -> Result<QueryOutcome<T>, Error> {
        match self.prepare(context)? {
            Prepared::Done(outcome) => Ok(outcome),
            Prepared::Search(search) => self.complete(run_async(connection, search).await?),
        }
    }
}

/// Query intents a translator can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Any,
    Count,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    List,
    GetRequest,
}

impl CommandKind {
    /// Build the command for this intent.
    pub fn build<M>(self, options: QueryOptions, mapping: Arc<M>) -> Box<dyn QueryCommand<M::Object>>
    where
        M: ObjectMapping + 'static,
    {
        match self {
            CommandKind::Any => Box::new(AnyCommand::new(options, mapping)),
            CommandKind::Count => Box::new(CountCommand::new(options, mapping)),
            CommandKind::First => Box::new(FirstCommand::new(options, mapping, false)),
            CommandKind::FirstOrDefault => Box::new(FirstCommand::new(options, mapping, true)),
            CommandKind::Single => Box::new(SingleCommand::new(options, mapping, false)),
            CommandKind::SingleOrDefault => Box::new(SingleCommand::new(options, mapping, true)),
            CommandKind::List => Box::new(StandardQueryCommand::new(options, mapping)),
            CommandKind::GetRequest => Box::new(GetRequestCommand::new(options, mapping)),
        }
    }
}

/// Attach a control, treating a duplicate as a usage error.
pub(crate) fn attach(request: &mut SearchRequest, control: Control) -> Result<(), Error> {
    request.add_control(control).map_err(|e| match e {
        dirquery_proto::Error::DuplicateControl(kind) => Error::Configuration(format!(
            "only one {} control may be attached to a query",
            kind
        )),
        other => Error::Protocol(other),
    })
}

/// Common request setup: base, scope, sort and caller controls.
pub(crate) fn build_request(
    options: &QueryOptions,
    naming_context: &str,
    context: &ExecutionContext,
) -> Result<SearchRequest, Error> {
    let base_dn = context.naming_context.as_deref().unwrap_or(naming_context);
    let mut request = SearchRequest::new(options.filter.clone(), options.attributes.clone())
        .with_base_dn(base_dn)
        .with_scope(context.scope);

    if !options.sort_keys.is_empty() {
        attach(
            &mut request,
            Control::Sort(SortControl {
                keys: options.sort_keys.clone(),
            }),
        )?;
    }
    for control in &options.controls {
        attach(&mut request, control.clone())?;
    }
    Ok(request)
}

/// Page size for an engine-driven loop.
///
/// The requested size capped by the server maximum, or the take size when
/// that is smaller.
pub(crate) fn effective_page_size(options: &QueryOptions, context: &ExecutionContext) -> u32 {
    let max = context.max_page_size.max(1);
    let size = options.page_size.unwrap_or(max).clamp(1, max);
    match options.take_size {
        Some(take) if take > 0 && take < size => take,
        _ => size,
    }
}

/// Translate a skip count into a VLV window starting right after it.
pub(crate) fn attach_skip_window(
    request: &mut SearchRequest,
    options: &QueryOptions,
    context: &ExecutionContext,
) -> Result<(), Error> {
    if let Some(skip) = options.skip_size {
        let window = options
            .take_size
            .unwrap_or_else(|| effective_page_size(options, context))
            .max(1);
        attach(
            request,
            Control::Vlv(VlvControl::at_offset(skip.saturating_add(1), window - 1)),
        )?;
    }
    Ok(())
}

/// Attach a small page so the server stops after `size` entries, unless
/// paging is off or the request already carries a paging or VLV control.
pub(crate) fn attach_limit_page(
    request: &mut SearchRequest,
    size: u32,
    context: &ExecutionContext,
) -> Result<(), Error> {
    if context.paging_enabled
        && !request.has_control(PAGED_RESULTS_OID)
        && !request.has_control(VLV_REQUEST_OID)
    {
        attach(request, Control::Paging(PageControl::new(size)))?;
    }
    Ok(())
}

/// How a list or count query reaches the server.
pub(crate) enum Plan {
    Single,
    Paged,
    ManualPage(PagingOptions),
}

/// Pick single request, engine paging or caller paging.
///
/// Controls are recognized by OID, so raw controls count as their kind.
/// Caller paging (`PagingOptions`) wins when present and cannot be combined
/// with a caller paging or VLV control. Otherwise a VLV window, disabled
/// paging or an explicit opt-out send a single request. A caller paging
/// control while the engine is paging is rejected.
pub(crate) fn plan(
    options: &QueryOptions,
    request: &SearchRequest,
    context: &ExecutionContext,
) -> Result<Plan, Error> {
    if let Some(paging) = &options.paging_options {
        if request.has_control(PAGED_RESULTS_OID) {
            return Err(Error::Configuration(
                "paging options cannot be combined with a paged results control".to_string(),
            ));
        }
        if request.has_control(VLV_REQUEST_OID) {
            return Err(Error::Configuration(
                "paging options cannot be combined with a virtual list view".to_string(),
            ));
        }
        return Ok(Plan::ManualPage(paging.clone()));
    }

    if !context.paging_enabled
        || options.without_paging
        || request.has_control(VLV_REQUEST_OID)
    {
        return Ok(Plan::Single);
    }

    if request.has_control(PAGED_RESULTS_OID) {
        return Err(Error::Configuration(
            "a paged results control was supplied while the engine is paging; use paging options for manual paging"
                .to_string(),
        ));
    }
    Ok(Plan::Paged)
}

/// Build the loop for a plan.
pub(crate) fn search_for_plan(
    plan: Plan,
    mut request: SearchRequest,
    options: &QueryOptions,
    context: &ExecutionContext,
) -> Result<SearchLoop, Error> {
    match plan {
        Plan::Single => SearchLoop::single(request),
        Plan::Paged => {
            let size = effective_page_size(options, context);
            attach(&mut request, Control::Paging(PageControl::new(size)))?;
            SearchLoop::paged(request, options.take_size.map(|take| take as usize))
        }
        Plan::ManualPage(paging) => {
            let size = paging.page_size.clamp(1, context.max_page_size.max(1));
            attach(
                &mut request,
                Control::Paging(PageControl::new(size).with_cookie(paging.next_page)),
            )?;
            SearchLoop::manual_page(request)
        }
    }
}

/// Materialize entries through the mapping.
pub(crate) fn transform_all<M: ObjectMapping>(
    mapping: &M,
    entries: Vec<dirquery_proto::SearchEntry>,
) -> Result<Vec<M::Object>, Error> {
    entries
        .into_iter()
        .map(|entry| mapping.transform(entry))
        .collect()
}
