//! In-memory directory used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use dirquery_proto::{
    PageResponse, ResponseControl, ResultCode, SearchEntry, SearchRequest, SearchResponse,
    SearchScope, SortResponse, VlvResponse, VlvTarget,
};

use crate::connection::{ConnectionBuilder, ConnectionId, DirectoryConnection};
use crate::error::Error;
use crate::options::EntryMapping;

const DEFAULT_RANGE_SLICE: usize = 1500;

/// Identity mapping rooted at `DC=test`.
pub(crate) fn mapping() -> Arc<EntryMapping> {
    Arc::new(EntryMapping::new("DC=test"))
}

/// A directory answering searches from a fixed entry list.
///
/// Honors paged results (decimal offset cookies), server-side sort on the
/// first key, VLV offset windows and attribute range retrieval.
pub(crate) struct MockDirectory {
    id: ConnectionId,
    entries: Vec<SearchEntry>,
    range_slice: usize,
    vlv_supported: bool,
    sort_failure: Option<ResultCode>,
    fail_after: Option<(usize, ResultCode)>,
    round_trips: AtomicUsize,
    requests: Mutex<Vec<SearchRequest>>,
    disposed: AtomicBool,
    disposals: Arc<AtomicUsize>,
}

impl MockDirectory {
    pub(crate) fn new(entries: Vec<SearchEntry>) -> Self {
        Self {
            id: ConnectionId::next(),
            entries,
            range_slice: DEFAULT_RANGE_SLICE,
            vlv_supported: true,
            sort_failure: None,
            fail_after: None,
            round_trips: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            disposals: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` users `CN=user000..` under `OU=Users,DC=test`, each with a
    /// `cn` and a `sn` running in reverse order.
    pub(crate) fn with_users(count: usize) -> Self {
        let entries = (0..count)
            .map(|i| {
                let cn = format!("user{:03}", i);
                SearchEntry::new(format!("CN={},OU=Users,DC=test", cn))
                    .with_attribute("objectClass", ["user"])
                    .with_attribute("cn", [cn])
                    .with_attribute("sn", [format!("{:03}", count - i)])
            })
            .collect();
        Self::new(entries)
    }

    /// Count disposals in a counter shared with the test.
    pub(crate) fn counting_disposals(mut self, disposals: Arc<AtomicUsize>) -> Self {
        self.disposals = disposals;
        self
    }

    pub(crate) fn with_range_slice(mut self, slice: usize) -> Self {
        self.range_slice = slice.max(1);
        self
    }

    pub(crate) fn without_vlv(mut self) -> Self {
        self.vlv_supported = false;
        self
    }

    pub(crate) fn with_sort_failure(mut self, code: ResultCode) -> Self {
        self.sort_failure = Some(code);
        self
    }

    /// Answer `code` to every request after the first `successes`.
    pub(crate) fn fail_after(mut self, successes: usize, code: ResultCode) -> Self {
        self.fail_after = Some((successes, code));
        self
    }

    pub(crate) fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Every request received, as sent.
    pub(crate) fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }

    fn search(&self, request: &SearchRequest) -> SearchResponse {
        let served = self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some((successes, code)) = self.fail_after {
            if served >= successes {
                return SearchResponse::failure(code, "injected failure");
            }
        }

        let mut matches: Vec<SearchEntry> = self
            .entries
            .iter()
            .filter(|entry| in_scope(entry, request) && matches_filter(entry, &request.filter))
            .cloned()
            .collect();

        if let Some(range) = request.attributes.iter().find(|a| a.contains(";range=")) {
            let entries = matches
                .into_iter()
                .map(|entry| self.range_slice_of(entry, range))
                .collect();
            return SearchResponse::success(entries);
        }

        let mut controls = Vec::new();

        if let Some(sort) = request.sort_control() {
            if let Some(code) = self.sort_failure {
                controls.push(ResponseControl::Sort(SortResponse {
                    result: code,
                    attribute: sort.keys.first().map(|k| k.attribute.clone()),
                }));
            } else if let Some(key) = sort.keys.first() {
                matches.sort_by(|a, b| {
                    let left = a.first_value(&key.attribute).unwrap_or_default();
                    let right = b.first_value(&key.attribute).unwrap_or_default();
                    left.cmp(right)
                });
                if key.reverse {
                    matches.reverse();
                }
                controls.push(ResponseControl::Sort(SortResponse {
                    result: ResultCode::SUCCESS,
                    attribute: None,
                }));
            }
        }

        let total = matches.len();
        let window = match request.vlv_control() {
            Some(vlv) if self.vlv_supported => {
                let offset = match &vlv.target {
                    VlvTarget::Offset { offset, .. } => (*offset).max(1) as usize,
                    VlvTarget::GreaterOrEqual(value) => {
                        let key = request
                            .sort_control()
                            .and_then(|s| s.keys.first())
                            .map(|k| k.attribute.clone())
                            .unwrap_or_default();
                        matches
                            .iter()
                            .position(|e| e.first_value(&key).unwrap_or_default() >= value.as_str())
                            .map(|p| p + 1)
                            .unwrap_or(total + 1)
                    }
                };
                let start = (offset - 1).saturating_sub(vlv.before_count as usize).min(total);
                let end = (offset + vlv.after_count as usize).min(total).max(start);
                controls.push(ResponseControl::Vlv(VlvResponse {
                    target_position: offset as u32,
                    content_count: total as u32,
                    result: ResultCode::SUCCESS,
                    context_id: Some(b"mock-context".to_vec()),
                }));
                Some((start, end))
            }
            _ => None,
        };

        let (start, end) = match (window, request.paging_control()) {
            (Some(window), _) => window,
            (None, Some(page)) => {
                let start = std::str::from_utf8(&page.cookie)
                    .ok()
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(0)
                    .min(total);
                let end = (start + page.size.max(1) as usize).min(total);
                let cookie = if end < total {
                    end.to_string().into_bytes()
                } else {
                    Vec::new()
                };
                controls.push(ResponseControl::Paging(PageResponse {
                    size_estimate: total as u32,
                    cookie,
                }));
                (start, end)
            }
            (None, None) => (0, total),
        };

        let entries = matches[start..end]
            .iter()
            .map(|entry| project(entry, request))
            .collect();

        let mut response = SearchResponse::success(entries);
        response.controls = controls;
        response
    }

    fn range_slice_of(&self, entry: SearchEntry, requested: &str) -> SearchEntry {
        let (attribute, range) = requested.split_once(";range=").unwrap_or((requested, "0-*"));
        let low = range
            .split('-')
            .next()
            .and_then(|l| l.parse::<usize>().ok())
            .unwrap_or(0);

        let values = entry.attribute(attribute).map(<[String]>::to_vec).unwrap_or_default();
        let total = values.len();
        let start = low.min(total);
        let end = (start + self.range_slice).min(total);

        let name = if end >= total {
            format!("{};range={}-*", attribute, start)
        } else {
            format!("{};range={}-{}", attribute, start, end - 1)
        };
        SearchEntry::new(entry.dn).with_attribute(name, values[start..end].to_vec())
    }
}

fn in_scope(entry: &SearchEntry, request: &SearchRequest) -> bool {
    let dn = entry.dn.to_ascii_lowercase();
    let base = request.base_dn.to_ascii_lowercase();
    match request.scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel | SearchScope::Subtree => base.is_empty() || dn.ends_with(&base),
    }
}

/// `(attr=*)`, `(attr=prefix*)` and `(attr=value)`; anything else matches.
fn matches_filter(entry: &SearchEntry, filter: &str) -> bool {
    let Some(inner) = filter.strip_prefix('(').and_then(|f| f.strip_suffix(')')) else {
        return true;
    };
    if inner.starts_with(['&', '|', '!']) {
        return true;
    }
    let Some((attribute, value)) = inner.split_once('=') else {
        return true;
    };
    let Some(values) = entry.attribute(attribute) else {
        return attribute.eq_ignore_ascii_case("objectClass") && value == "*";
    };
    if value == "*" {
        return true;
    }
    let value = value.to_ascii_lowercase();
    match value.strip_suffix('*') {
        Some(prefix) => values.iter().any(|v| v.to_ascii_lowercase().starts_with(prefix)),
        None => values.iter().any(|v| v.to_ascii_lowercase() == value),
    }
}

fn project(entry: &SearchEntry, request: &SearchRequest) -> SearchEntry {
    let everything = request.attributes.is_empty() || request.attributes.iter().any(|a| a == "*");
    let mut projected = SearchEntry::new(entry.dn.clone());
    for (name, values) in &entry.attributes {
        let wanted =
            everything || request.attributes.iter().any(|a| a.eq_ignore_ascii_case(name));
        if wanted {
            let values = if request.types_only {
                Vec::new()
            } else {
                values.clone()
            };
            projected.attributes.insert(name.clone(), values);
        }
    }
    projected
}

#[async_trait]
impl DirectoryConnection for MockDirectory {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_request(&self, request: &SearchRequest) -> Result<SearchResponse, Error> {
        if self.is_disposed() {
            return Err(Error::Disposed(self.id.to_string()));
        }
        Ok(self.search(request))
    }

    async fn send_request_async(&self, request: &SearchRequest) -> Result<SearchResponse, Error> {
        tokio::task::yield_now().await;
        self.send_request(request)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Builds empty [`MockDirectory`] connections and counts them.
#[derive(Clone, Default)]
pub(crate) struct MockDirectoryBuilder {
    built: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
    fail_at: Option<usize>,
}

impl MockDirectoryBuilder {
    /// Fail the `n`th build (one-based); every other build succeeds.
    pub(crate) fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::default()
        }
    }

    /// Build attempts so far, failed ones included.
    pub(crate) fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    /// Connections from this builder that have been disposed.
    pub(crate) fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl ConnectionBuilder for MockDirectoryBuilder {
    type Connection = MockDirectory;

    fn build(&self) -> Result<MockDirectory, Error> {
        let attempt = self.built.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(attempt) {
            return Err(Error::Connection(format!("build {} refused", attempt)));
        }
        Ok(MockDirectory::new(Vec::new()).counting_disposals(self.disposed.clone()))
    }
}
