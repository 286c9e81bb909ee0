//! Range retrieval of large multi-valued attributes.
//!
//! Servers cap how many values of one attribute a single response carries.
//! Asking for `member;range=0-*` returns a slice named after what was actually
//! served (`member;range=0-1499`); the last slice ends in `*`.

use tracing::debug;

use dirquery_proto::{SearchRequest, SearchResponse, SearchScope};

use crate::command::Step;
use crate::connection::DirectoryConnection;
use crate::error::Error;

const RANGE_FILTER: &str = "(objectClass=*)";

/// Step machine pulling every value of one attribute, slice by slice.
#[derive(Debug)]
pub struct RangeRetrieval {
    attribute: String,
    index: usize,
    step: usize,
    values: Vec<String>,
    request: SearchRequest,
}

impl RangeRetrieval {
    /// Start at value offset `start` of `attribute` on the entry `dn`.
    pub fn new(dn: &str, attribute: &str, start: usize) -> Self {
        let request = SearchRequest::new(RANGE_FILTER, vec![range_attribute(attribute, start, None)])
            .with_base_dn(dn)
            .with_scope(SearchScope::Base);
        Self {
            attribute: attribute.to_string(),
            index: start,
            step: 0,
            values: Vec::new(),
            request,
        }
    }

    /// Request to send next.
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Fold one slice into the accumulated values.
    pub fn on_response(&mut self, response: SearchResponse) -> Result<Step, Error> {
        if !response.is_success() {
            return Err(Error::RangeRetrieval {
                attribute: self.attribute.clone(),
                range: self.request.attributes.join(","),
                code: response.result_code,
                message: response.diagnostic_message,
            });
        }

        let Some(entry) = response.entries.into_iter().next() else {
            return Ok(Step::Done);
        };

        let prefix = format!("{};range=", self.attribute.to_ascii_lowercase());
        let mut plain = None;
        let mut slice = None;
        for (name, values) in entry.attributes {
            let lower = name.to_ascii_lowercase();
            if lower.starts_with(&prefix) {
                slice = Some((name, values));
                break;
            }
            if name.eq_ignore_ascii_case(&self.attribute) {
                plain = Some(values);
            }
        }

        let Some((name, values)) = slice else {
            // Small enough to come back whole, without a range.
            if let Some(values) = plain {
                self.values.extend(values.into_iter().skip(self.index));
            }
            return Ok(Step::Done);
        };

        let count = values.len();
        let terminal = name.ends_with('*');
        self.values.extend(values);

        debug!(
            attribute = %self.attribute,
            slice = %name,
            count,
            total = self.values.len(),
            "Range slice received"
        );

        if terminal || count == 0 {
            return Ok(Step::Done);
        }

        self.step = count;
        self.index += count;
        self.request.attributes = vec![range_attribute(
            &self.attribute,
            self.index,
            Some(self.index + self.step),
        )];
        Ok(Step::Send)
    }

    /// Values retrieved so far, in server order.
    pub fn finish(self) -> Vec<String> {
        self.values
    }
}

fn range_attribute(attribute: &str, low: usize, high: Option<usize>) -> String {
    match high {
        Some(high) => format!("{};range={}-{}", attribute, low, high),
        None => format!("{};range={}-*", attribute, low),
    }
}

/// Retrieve every value of `attribute` on `dn` from offset `start`, blocking.
pub fn retrieve_ranges(
    connection: &dyn DirectoryConnection,
    dn: &str,
    attribute: &str,
    start: usize,
) -> Result<Vec<String>, Error> {
    let mut retrieval = RangeRetrieval::new(dn, attribute, start);
    loop {
        let response = connection.send_request(retrieval.request())?;
        if retrieval.on_response(response)? == Step::Done {
            return Ok(retrieval.finish());
        }
    }
}

/// Retrieve every value of `attribute` on `dn` from offset `start`.
pub async fn retrieve_ranges_async(
    connection: &dyn DirectoryConnection,
    dn: &str,
    attribute: &str,
    start: usize,
) -> Result<Vec<String>, Error> {
    let mut retrieval = RangeRetrieval::new(dn, attribute, start);
    loop {
        let response = connection.send_request_async(retrieval.request()).await?;
        if retrieval.on_response(response)? == Step::Done {
            return Ok(retrieval.finish());
        }
    }
}
