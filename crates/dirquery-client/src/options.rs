//! Query options and materialized result shapes.

use dirquery_proto::{Control, SearchEntry, SortKey};

use crate::error::Error;

/// Caller-driven pagination: resume a paged search from a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingOptions {
    pub page_size: u32,
    /// Cookie returned by the previous page; empty for the first page.
    pub next_page: Vec<u8>,
}

impl PagingOptions {
    pub fn first_page(page_size: u32) -> Self {
        Self {
            page_size,
            next_page: Vec::new(),
        }
    }

    pub fn resume(page_size: u32, cookie: Vec<u8>) -> Self {
        Self {
            page_size,
            next_page: cookie,
        }
    }
}

/// Everything one execution of a command needs, fixed at translation time.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: String,
    pub attributes: Vec<String>,
    pub sort_keys: Vec<SortKey>,
    pub take_size: Option<u32>,
    pub skip_size: Option<u32>,
    pub paging_options: Option<PagingOptions>,
    /// Preferred page size; capped by the server maximum.
    pub page_size: Option<u32>,
    /// Extra protocol controls supplied by the caller.
    pub controls: Vec<Control>,
    /// Run as a single request even when paging is enabled.
    pub without_paging: bool,
    /// Widen counts to 64 bits.
    pub is_long_count: bool,
    /// The predicate can never match; skip the network entirely.
    pub yield_no_results: bool,
}

impl QueryOptions {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    pub fn with_take(mut self, take: u32) -> Self {
        self.take_size = Some(take);
        self
    }

    pub fn with_skip(mut self, skip: u32) -> Self {
        self.skip_size = Some(skip);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_paging_options(mut self, paging: PagingOptions) -> Self {
        self.paging_options = Some(paging);
        self
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn without_paging(mut self) -> Self {
        self.without_paging = true;
        self
    }

    pub fn long_count(mut self) -> Self {
        self.is_long_count = true;
        self
    }

    pub fn yielding_no_results(mut self) -> Self {
        self.yield_no_results = true;
        self
    }

    /// Caller-attached VLV control, if any.
    pub fn vlv_control(&self) -> Option<&dirquery_proto::VlvControl> {
        self.controls.iter().find_map(|c| match c {
            Control::Vlv(vlv) => Some(vlv),
            _ => None,
        })
    }
}

/// One page of a caller-driven paged search.
#[derive(Debug, Clone, PartialEq)]
pub struct LdapPage<T> {
    pub items: Vec<T>,
    pub page_size: u32,
    pub next_page: Vec<u8>,
    pub filter: String,
}

impl<T> LdapPage<T> {
    /// True when the server handed back a cookie to continue from.
    pub fn has_next_page(&self) -> bool {
        !self.next_page.is_empty()
    }

    /// Options resuming from this page.
    pub fn next_paging_options(&self) -> Option<PagingOptions> {
        self.has_next_page()
            .then(|| PagingOptions::resume(self.page_size, self.next_page.clone()))
    }
}

/// A positioned window over a sorted result set.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualListView<T> {
    pub items: Vec<T>,
    /// Total number of matches on the server.
    pub content_count: u32,
    /// Server session token to pass back on the next window.
    pub context_id: Option<Vec<u8>>,
    /// Server-confirmed offset of the target entry.
    pub target_position: u32,
}

/// Turns raw entries into typed objects.
///
/// Also supplies the naming context searched when no override is given.
pub trait ObjectMapping: Send + Sync {
    type Object: Send + 'static;

    /// Default search base.
    fn naming_context(&self) -> &str;

    /// Materialize one entry.
    fn transform(&self, entry: SearchEntry) -> Result<Self::Object, Error>;
}

/// Mapping that hands back raw entries unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntryMapping {
    naming_context: String,
}

impl EntryMapping {
    pub fn new(naming_context: impl Into<String>) -> Self {
        Self {
            naming_context: naming_context.into(),
        }
    }
}

impl ObjectMapping for EntryMapping {
    type Object = SearchEntry;

    fn naming_context(&self) -> &str {
        &self.naming_context
    }

    fn transform(&self, entry: SearchEntry) -> Result<SearchEntry, Error> {
        Ok(entry)
    }
}
