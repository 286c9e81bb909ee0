//! Search loop shared by every command.
//!
//! [`SearchLoop`] holds no I/O. It owns the request, folds each response into
//! its state through [`SearchLoop::on_response`] and says whether another
//! round trip is needed. [`run_blocking`] and [`run_async`] are the only
//! places that touch the connection, so both execution paths share the same
//! paging, VLV and error handling.

use tracing::debug;

use dirquery_proto::controls::{SORT_REQUEST_OID, VLV_REQUEST_OID};
use dirquery_proto::{SearchEntry, SearchRequest, SearchResponse, VlvResponse};

use crate::connection::DirectoryConnection;
use crate::error::Error;

/// What the loop wants after folding in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Send the (updated) request again.
    Send,
    /// No more round trips.
    Done,
}

/// How the loop drives the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Exactly one request.
    Single,
    /// One request resuming from a caller-supplied cookie.
    ManualPage,
    /// Engine-driven cookie loop, optionally stopping once `take` entries arrived.
    Paged { take: Option<usize> },
}

/// Accumulated result of a finished loop.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The request as last sent.
    pub request: SearchRequest,
    pub mode: LoopMode,
    /// Collected entries; empty when only tallying.
    pub entries: Vec<SearchEntry>,
    /// Number of entries seen across all pages.
    pub tally: usize,
    /// Cookie returned by the last response; empty when the server is done.
    pub next_cookie: Vec<u8>,
    /// VLV response from the last round trip, when the request carried a VLV control.
    pub vlv: Option<VlvResponse>,
    pub round_trips: usize,
}

/// Step machine for one command execution.
#[derive(Debug)]
pub struct SearchLoop {
    request: SearchRequest,
    mode: LoopMode,
    collect: bool,
    entries: Vec<SearchEntry>,
    tally: usize,
    next_cookie: Vec<u8>,
    vlv: Option<VlvResponse>,
    round_trips: usize,
}

impl SearchLoop {
    fn new(request: SearchRequest, mode: LoopMode) -> Result<Self, Error> {
        if request.has_control(VLV_REQUEST_OID) && !request.has_control(SORT_REQUEST_OID) {
            return Err(Error::Configuration(
                "a virtual list view request requires a sort".to_string(),
            ));
        }
        Ok(Self {
            request,
            mode,
            collect: true,
            entries: Vec::new(),
            tally: 0,
            next_cookie: Vec::new(),
            vlv: None,
            round_trips: 0,
        })
    }

    /// One request, sent as built.
    pub fn single(request: SearchRequest) -> Result<Self, Error> {
        Self::new(request, LoopMode::Single)
    }

    /// One request carrying a caller-supplied cookie.
    pub fn manual_page(request: SearchRequest) -> Result<Self, Error> {
        if request.paging_control().is_none() {
            return Err(Error::Configuration(
                "manual paging requires a paged results control".to_string(),
            ));
        }
        Self::new(request, LoopMode::ManualPage)
    }

    /// Cookie loop. The request must already carry a paging control.
    pub fn paged(request: SearchRequest, take: Option<usize>) -> Result<Self, Error> {
        if request.paging_control().is_none() {
            return Err(Error::Configuration(
                "engine paging requires a paged results control".to_string(),
            ));
        }
        Self::new(request, LoopMode::Paged { take })
    }

    /// Count entries without keeping them.
    pub fn tally_only(mut self) -> Self {
        self.collect = false;
        self
    }

    /// Request to send next.
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Fold a response into the loop state.
    pub fn on_response(&mut self, response: SearchResponse) -> Result<Step, Error> {
        self.round_trips += 1;
        check_response(&response)?;

        if self.request.has_control(VLV_REQUEST_OID) {
            let vlv = response
                .vlv_response()
                .cloned()
                .ok_or_else(|| Error::Unsupported("Virtual List Views".to_string()))?;
            self.vlv = Some(vlv);
        }

        let cookie = response
            .paging_response()
            .map(|page| page.cookie.clone())
            .unwrap_or_default();

        let received = response.entries.len();
        self.tally += received;
        if self.collect {
            self.entries.extend(response.entries);
        }

        debug!(
            round_trip = self.round_trips,
            received,
            total = self.tally,
            has_cookie = !cookie.is_empty(),
            filter = %self.request.filter,
            "Search response received"
        );

        match self.mode {
            LoopMode::Single | LoopMode::ManualPage => {
                self.next_cookie = cookie;
                Ok(Step::Done)
            }
            LoopMode::Paged { take } => {
                let reached = take.is_some_and(|take| self.tally >= take);
                if cookie.is_empty() || reached {
                    self.next_cookie = cookie;
                    Ok(Step::Done)
                } else {
                    self.request.set_paging_cookie(cookie)?;
                    Ok(Step::Send)
                }
            }
        }
    }

    /// Consume the loop and return what it accumulated.
    pub fn finish(self) -> LoopOutcome {
        LoopOutcome {
            request: self.request,
            mode: self.mode,
            entries: self.entries,
            tally: self.tally,
            next_cookie: self.next_cookie,
            vlv: self.vlv,
            round_trips: self.round_trips,
        }
    }
}

/// Reject non-success responses and failed sorts.
pub(crate) fn check_response(response: &SearchResponse) -> Result<(), Error> {
    if !response.is_success() {
        return Err(Error::server(
            response.result_code,
            response.diagnostic_message.clone(),
        ));
    }
    if let Some(sort) = response.sort_response() {
        if !sort.result.is_success() {
            return Err(Error::SortFailed {
                code: sort.result,
                attribute: sort.attribute.clone(),
            });
        }
    }
    Ok(())
}

/// Drive a loop to completion on the calling thread.
pub fn run_blocking(
    connection: &dyn DirectoryConnection,
    mut search: SearchLoop,
) -> Result<LoopOutcome, Error> {
    loop {
        let response = connection.send_request(search.request())?;
        if search.on_response(response)? == Step::Done {
            return Ok(search.finish());
        }
    }
}

/// Drive a loop to completion without blocking.
pub async fn run_async(
    connection: &dyn DirectoryConnection,
    mut search: SearchLoop,
) -> Result<LoopOutcome, Error> {
    loop {
        let response = connection.send_request_async(search.request()).await?;
        if search.on_response(response)? == Step::Done {
            return Ok(search.finish());
        }
    }
}
