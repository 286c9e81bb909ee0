//! Search request and response messages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::controls::{
    Control, PageControl, PageResponse, ResponseControl, SortControl, SortResponse, VlvControl,
    VlvResponse,
};
use crate::Error;

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and its whole subtree.
    #[default]
    Subtree,
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchScope::Base => write!(f, "base"),
            SearchScope::OneLevel => write!(f, "onelevel"),
            SearchScope::Subtree => write!(f, "subtree"),
        }
    }
}

/// LDAP result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const OPERATIONS_ERROR: ResultCode = ResultCode(1);
    pub const PROTOCOL_ERROR: ResultCode = ResultCode(2);
    pub const TIME_LIMIT_EXCEEDED: ResultCode = ResultCode(3);
    pub const SIZE_LIMIT_EXCEEDED: ResultCode = ResultCode(4);
    pub const UNAVAILABLE_CRITICAL_EXTENSION: ResultCode = ResultCode(12);
    pub const NO_SUCH_ATTRIBUTE: ResultCode = ResultCode(16);
    pub const INAPPROPRIATE_MATCHING: ResultCode = ResultCode(18);
    pub const NO_SUCH_OBJECT: ResultCode = ResultCode(32);
    pub const INVALID_CREDENTIALS: ResultCode = ResultCode(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: ResultCode = ResultCode(50);
    pub const BUSY: ResultCode = ResultCode(51);
    pub const UNAVAILABLE: ResultCode = ResultCode(52);
    pub const UNWILLING_TO_PERFORM: ResultCode = ResultCode(53);
    pub const OTHER: ResultCode = ResultCode(80);

    /// True for `success`.
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Symbolic name for well-known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "success",
            1 => "operationsError",
            2 => "protocolError",
            3 => "timeLimitExceeded",
            4 => "sizeLimitExceeded",
            12 => "unavailableCriticalExtension",
            16 => "noSuchAttribute",
            18 => "inappropriateMatching",
            32 => "noSuchObject",
            49 => "invalidCredentials",
            50 => "insufficientAccessRights",
            51 => "busy",
            52 => "unavailable",
            53 => "unwillingToPerform",
            80 => "other",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// One entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Textual attribute values keyed by attribute description.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Values that were not valid UTF-8.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary_attributes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl SearchEntry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    /// Add values for an attribute.
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Values of an attribute, matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// First value of an attribute, matched case-insensitively.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// A search request.
///
/// Built once per query and updated in place between paging iterations; only
/// the paging or VLV control changes from one round trip to the next.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attributes: Vec<String>,
    pub types_only: bool,
    controls: Vec<Control>,
}

impl SearchRequest {
    /// Create a subtree search with the given filter and attribute list.
    pub fn new(filter: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            filter: filter.into(),
            attributes,
            ..Self::default()
        }
    }

    /// Set the base DN.
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = base_dn.into();
        self
    }

    /// Set the scope.
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Controls in the order they were added.
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Attach a control.
    ///
    /// Controls are matched by OID, typed or raw, so at most one paging, one
    /// sort and one VLV control may be attached.
    pub fn add_control(&mut self, control: Control) -> Result<(), Error> {
        if self.has_control(control.oid()) {
            return Err(Error::DuplicateControl(control.kind()));
        }
        self.controls.push(control);
        Ok(())
    }

    /// True when a control with this OID is attached, typed or raw.
    pub fn has_control(&self, oid: &str) -> bool {
        self.controls.iter().any(|c| c.oid() == oid)
    }

    /// Attached paging control, if any.
    pub fn paging_control(&self) -> Option<&PageControl> {
        self.controls.iter().find_map(|c| match c {
            Control::Paging(page) => Some(page),
            _ => None,
        })
    }

    /// Attached sort control, if any.
    pub fn sort_control(&self) -> Option<&SortControl> {
        self.controls.iter().find_map(|c| match c {
            Control::Sort(sort) => Some(sort),
            _ => None,
        })
    }

    /// Attached VLV control, if any.
    pub fn vlv_control(&self) -> Option<&VlvControl> {
        self.controls.iter().find_map(|c| match c {
            Control::Vlv(vlv) => Some(vlv),
            _ => None,
        })
    }

    /// Replace the cookie on the attached paging control.
    pub fn set_paging_cookie(&mut self, cookie: Vec<u8>) -> Result<(), Error> {
        for control in &mut self.controls {
            if let Control::Paging(page) = control {
                page.cookie = cookie;
                return Ok(());
            }
        }
        Err(Error::InvalidMessage(
            "no paged results control to update".to_string(),
        ))
    }

    /// Remove and return the paging control.
    pub fn take_paging_control(&mut self) -> Option<PageControl> {
        let index = self
            .controls
            .iter()
            .position(|c| matches!(c, Control::Paging(_)))?;
        match self.controls.remove(index) {
            Control::Paging(page) => Some(page),
            _ => None,
        }
    }
}

/// The answer to a search request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResponse {
    pub result_code: ResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
    pub entries: Vec<SearchEntry>,
    pub controls: Vec<ResponseControl>,
}

impl Default for ResultCode {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl SearchResponse {
    /// Successful response carrying `entries`.
    pub fn success(entries: Vec<SearchEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Failed response.
    pub fn failure(result_code: ResultCode, diagnostic_message: impl Into<String>) -> Self {
        Self {
            result_code,
            diagnostic_message: diagnostic_message.into(),
            ..Self::default()
        }
    }

    /// Attach a returned control.
    pub fn with_control(mut self, control: ResponseControl) -> Self {
        self.controls.push(control);
        self
    }

    /// True when the result code is `success`.
    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }

    /// Returned paging control, if any.
    pub fn paging_response(&self) -> Option<&PageResponse> {
        self.controls.iter().find_map(|c| match c {
            ResponseControl::Paging(page) => Some(page),
            _ => None,
        })
    }

    /// Returned sort control, if any.
    pub fn sort_response(&self) -> Option<&SortResponse> {
        self.controls.iter().find_map(|c| match c {
            ResponseControl::Sort(sort) => Some(sort),
            _ => None,
        })
    }

    /// Returned VLV control, if any.
    pub fn vlv_response(&self) -> Option<&VlvResponse> {
        self.controls.iter().find_map(|c| match c {
            ResponseControl::Vlv(vlv) => Some(vlv),
            _ => None,
        })
    }
}
