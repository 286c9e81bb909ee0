//! Search request and response controls.
//!
//! Controls are kept typed while a request is being built and executed. They
//! are only lowered to [`RawControl`] (OID, criticality and BER-encoded value)
//! at the transport boundary.

use serde::{Deserialize, Serialize};

use ldap3::asn1::Tag;
use ldap3::controls::PagedResults;

use crate::ber::{self, Components};
use crate::message::ResultCode;
use crate::Error;

/// Simple paged results (RFC 2696).
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
/// Server-side sort request (RFC 2891).
pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";
/// Server-side sort response (RFC 2891).
pub const SORT_RESPONSE_OID: &str = "1.2.840.113556.1.4.474";
/// Virtual list view request.
pub const VLV_REQUEST_OID: &str = "2.16.840.1.113730.3.4.9";
/// Virtual list view response.
pub const VLV_RESPONSE_OID: &str = "2.16.840.1.113730.3.4.10";

/// A control in its wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawControl {
    /// Control type OID.
    pub oid: String,
    /// Whether the server must reject the operation if it does not support the control.
    pub critical: bool,
    /// BER-encoded control value.
    pub value: Option<Vec<u8>>,
}

/// Paged results request: page size plus the cookie to resume from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageControl {
    pub size: u32,
    pub cookie: Vec<u8>,
}

impl PageControl {
    /// First page of the given size.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            cookie: Vec::new(),
        }
    }

    /// Resume from a cookie returned by an earlier page.
    pub fn with_cookie(mut self, cookie: impl Into<Vec<u8>>) -> Self {
        self.cookie = cookie.into();
        self
    }
}

/// One server-side sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub attribute: String,
    pub ordering_rule: Option<String>,
    pub reverse: bool,
}

impl SortKey {
    /// Ascending sort on `attribute`.
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ordering_rule: None,
            reverse: false,
        }
    }

    /// Descending sort on `attribute`.
    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            reverse: true,
            ..Self::ascending(attribute)
        }
    }
}

/// Server-side sort request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortControl {
    pub keys: Vec<SortKey>,
}

/// Where a virtual list view window is anchored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VlvTarget {
    /// One-based offset into the sorted result set.
    Offset { offset: u32, content_count: u32 },
    /// First entry whose primary sort key is >= the assertion value.
    GreaterOrEqual(String),
}

/// Virtual list view request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlvControl {
    pub before_count: u32,
    pub after_count: u32,
    pub target: VlvTarget,
    pub context_id: Option<Vec<u8>>,
}

impl VlvControl {
    /// Window of `after_count + 1` entries starting at the one-based `offset`.
    pub fn at_offset(offset: u32, after_count: u32) -> Self {
        Self {
            before_count: 0,
            after_count,
            target: VlvTarget::Offset {
                offset,
                content_count: 0,
            },
            context_id: None,
        }
    }
}

/// A request control attached to a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Paging(PageControl),
    Sort(SortControl),
    Vlv(VlvControl),
    Raw(RawControl),
}

impl Control {
    /// OID of the control.
    pub fn oid(&self) -> &str {
        match self {
            Control::Paging(_) => PAGED_RESULTS_OID,
            Control::Sort(_) => SORT_REQUEST_OID,
            Control::Vlv(_) => VLV_REQUEST_OID,
            Control::Raw(raw) => &raw.oid,
        }
    }

    /// Short human-readable name, used in error messages.
    ///
    /// A raw control carrying a known OID is named after that kind.
    pub fn kind(&self) -> &'static str {
        match self.oid() {
            PAGED_RESULTS_OID => "paged results",
            SORT_REQUEST_OID => "sort",
            VLV_REQUEST_OID => "virtual list view",
            _ => "raw",
        }
    }

    /// Lower to the wire representation.
    pub fn encode(&self) -> Result<RawControl, Error> {
        match self {
            Control::Paging(page) => Ok(paged_results(page.size, &page.cookie, true)),
            Control::Sort(sort) => {
                let keys = sort
                    .keys
                    .iter()
                    .map(|key| {
                        let mut fields = vec![ber::octets(key.attribute.as_bytes())];
                        if let Some(rule) = &key.ordering_rule {
                            fields.push(ber::context_octets(0, rule.as_bytes()));
                        }
                        if key.reverse {
                            fields.push(ber::context_boolean(1, true));
                        }
                        ber::sequence(fields)
                    })
                    .collect();
                encoded(SORT_REQUEST_OID, true, ber::sequence(keys))
            }
            Control::Vlv(vlv) => {
                let target = match &vlv.target {
                    VlvTarget::Offset {
                        offset,
                        content_count,
                    } => ber::context_sequence(
                        0,
                        vec![ber::integer(*offset), ber::integer(*content_count)],
                    ),
                    VlvTarget::GreaterOrEqual(value) => ber::context_octets(1, value.as_bytes()),
                };
                let mut fields = vec![
                    ber::integer(vlv.before_count),
                    ber::integer(vlv.after_count),
                    target,
                ];
                if let Some(context_id) = &vlv.context_id {
                    fields.push(ber::octets(context_id.clone()));
                }
                encoded(VLV_REQUEST_OID, true, ber::sequence(fields))
            }
            Control::Raw(raw) => Ok(raw.clone()),
        }
    }
}

/// Paged results request or response value, encoded by `ldap3`.
fn paged_results(size: u32, cookie: &[u8], critical: bool) -> RawControl {
    let raw: ldap3::controls::RawControl = PagedResults {
        size: i32::try_from(size).unwrap_or(i32::MAX),
        cookie: cookie.to_vec(),
    }
    .into();
    RawControl {
        oid: raw.ctype,
        critical,
        value: raw.val,
    }
}

fn encoded(oid: &str, critical: bool, value: Tag) -> Result<RawControl, Error> {
    Ok(RawControl {
        oid: oid.to_string(),
        critical,
        value: Some(ber::encode(value)?),
    })
}

/// Paged results response: size estimate and the cookie for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageResponse {
    pub size_estimate: u32,
    pub cookie: Vec<u8>,
}

/// Server-side sort response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortResponse {
    pub result: ResultCode,
    pub attribute: Option<String>,
}

/// Virtual list view response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlvResponse {
    pub target_position: u32,
    pub content_count: u32,
    pub result: ResultCode,
    pub context_id: Option<Vec<u8>>,
}

/// A control returned by the server alongside a search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseControl {
    Paging(PageResponse),
    Sort(SortResponse),
    Vlv(VlvResponse),
    Raw(RawControl),
}

impl ResponseControl {
    /// Decode a wire control. Unknown OIDs are kept raw.
    ///
    /// Malformed values of known controls are reported as decoding errors.
    pub fn decode(raw: RawControl) -> Result<Self, Error> {
        let value = raw.value.as_deref().unwrap_or_default();
        match raw.oid.as_str() {
            PAGED_RESULTS_OID => {
                let mut c = Components::parse(value, "paged results")?;
                let size_estimate = c.integer("size estimate")?;
                let cookie = c.octets("cookie")?;
                Ok(ResponseControl::Paging(PageResponse {
                    size_estimate,
                    cookie,
                }))
            }
            SORT_RESPONSE_OID => {
                let mut c = Components::parse(value, "sort response")?;
                let result = ResultCode(c.enumerated("sort result")?);
                let attribute = if c.next_is_context(0) {
                    let bytes = c.context_octets(0, "attribute type")?;
                    Some(String::from_utf8_lossy(&bytes).into_owned())
                } else {
                    None
                };
                Ok(ResponseControl::Sort(SortResponse { result, attribute }))
            }
            VLV_RESPONSE_OID => {
                let mut c = Components::parse(value, "virtual list view response")?;
                let target_position = c.integer("target position")?;
                let content_count = c.integer("content count")?;
                let result = ResultCode(c.enumerated("result")?);
                let context_id = if c.is_empty() {
                    None
                } else {
                    Some(c.octets("context id")?)
                };
                Ok(ResponseControl::Vlv(VlvResponse {
                    target_position,
                    content_count,
                    result,
                    context_id,
                }))
            }
            _ => Ok(ResponseControl::Raw(raw)),
        }
    }

    /// Encode back to the wire shape. Used by servers and test doubles.
    pub fn encode(&self) -> Result<RawControl, Error> {
        match self {
            ResponseControl::Paging(page) => {
                Ok(paged_results(page.size_estimate, &page.cookie, false))
            }
            ResponseControl::Sort(sort) => {
                let mut fields = vec![ber::enumerated(sort.result.0)];
                if let Some(attribute) = &sort.attribute {
                    fields.push(ber::context_octets(0, attribute.as_bytes()));
                }
                encoded(SORT_RESPONSE_OID, false, ber::sequence(fields))
            }
            ResponseControl::Vlv(vlv) => {
                let mut fields = vec![
                    ber::integer(vlv.target_position),
                    ber::integer(vlv.content_count),
                    ber::enumerated(vlv.result.0),
                ];
                if let Some(context_id) = &vlv.context_id {
                    fields.push(ber::octets(context_id.clone()));
                }
                encoded(VLV_RESPONSE_OID, false, ber::sequence(fields))
            }
            ResponseControl::Raw(raw) => Ok(raw.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_request_is_critical() {
        let raw = Control::Paging(PageControl::new(50).with_cookie(b"c".to_vec()))
            .encode()
            .unwrap();
        assert_eq!(raw.oid, PAGED_RESULTS_OID);
        assert!(raw.critical);
        assert_eq!(
            raw.value.unwrap(),
            vec![0x30, 0x06, 0x02, 0x01, 0x32, 0x04, 0x01, b'c']
        );
    }

    #[test]
    fn test_paging_response_decode() {
        let encoded = ResponseControl::Paging(PageResponse {
            size_estimate: 0,
            cookie: b"abc".to_vec(),
        })
        .encode()
        .unwrap();
        match ResponseControl::decode(encoded).unwrap() {
            ResponseControl::Paging(page) => assert_eq!(page.cookie, b"abc"),
            other => panic!("unexpected control: {:?}", other),
        }
    }

    #[test]
    fn test_sort_request_keys() {
        let control = Control::Sort(SortControl {
            keys: vec![SortKey::ascending("sn"), SortKey::descending("gn")],
        });
        let raw = control.encode().unwrap();
        assert_eq!(raw.oid, SORT_REQUEST_OID);

        // SEQUENCE { SEQUENCE { "sn" }, SEQUENCE { "gn", [1] TRUE } }
        let value = raw.value.unwrap();
        assert_eq!(value.len(), 17);
        assert_eq!(&value[..8], &[0x30, 0x0f, 0x30, 0x04, 0x04, 0x02, b's', b'n']);
        assert_eq!(&value[8..14], &[0x30, 0x07, 0x04, 0x02, b'g', b'n']);
        assert_eq!(&value[14..16], &[0x81, 0x01]);
    }

    #[test]
    fn test_vlv_offset_encoding() {
        let raw = Control::Vlv(VlvControl::at_offset(11, 4)).encode().unwrap();
        // SEQUENCE { 0, 4, [0] { 11, 0 } }
        assert_eq!(
            raw.value.unwrap(),
            vec![0x30, 0x0e, 0x02, 0x01, 0x00, 0x02, 0x01, 0x04, 0xa0, 0x06, 0x02, 0x01, 0x0b, 0x02, 0x01, 0x00]
        );
    }

    #[test]
    fn test_vlv_response_without_context() {
        let control = ResponseControl::Vlv(VlvResponse {
            target_position: 3,
            content_count: 42,
            result: ResultCode::SUCCESS,
            context_id: None,
        });
        let decoded = ResponseControl::decode(control.encode().unwrap()).unwrap();
        assert_eq!(decoded, control);
    }

    #[test]
    fn test_sort_response_names_attribute() {
        let control = ResponseControl::Sort(SortResponse {
            result: ResultCode::INAPPROPRIATE_MATCHING,
            attribute: Some("jpegPhoto".to_string()),
        });
        let decoded = ResponseControl::decode(control.encode().unwrap()).unwrap();
        assert_eq!(decoded, control);
    }

    #[test]
    fn test_raw_control_named_by_oid() {
        let raw = Control::Raw(RawControl {
            oid: VLV_REQUEST_OID.to_string(),
            critical: true,
            value: None,
        });
        assert_eq!(raw.kind(), "virtual list view");
        assert_eq!(raw.encode().unwrap().oid, VLV_REQUEST_OID);
    }

    #[test]
    fn test_unknown_oid_stays_raw() {
        let raw = RawControl {
            oid: "1.3.6.1.4.1.42.2.27.8.5.1".to_string(),
            critical: false,
            value: None,
        };
        assert_eq!(
            ResponseControl::decode(raw.clone()).unwrap(),
            ResponseControl::Raw(raw)
        );
    }

    #[test]
    fn test_malformed_paging_value() {
        let raw = RawControl {
            oid: PAGED_RESULTS_OID.to_string(),
            critical: false,
            value: Some(vec![0x30, 0x03, 0x02, 0x01]),
        };
        assert!(ResponseControl::decode(raw).is_err());
    }
}
