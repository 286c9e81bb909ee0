//! dirquery protocol types.
//!
//! This crate defines the wire-level model a directory search goes through:
//! the request that is sent, the response that comes back and the typed
//! controls that ride along with both.
//!
//! # Modules
//!
//! - [`message`] - Search requests, responses, entries and result codes
//! - [`controls`] - Paged results, server-side sort and virtual list view controls
//! - [`ber`] - BER encoding used for control values
//! - [`error`] - Protocol error types

pub mod ber;
pub mod controls;
pub mod error;
pub mod message;

pub use error::Error;

pub use controls::{
    Control, PageControl, PageResponse, RawControl, ResponseControl, SortControl, SortKey,
    SortResponse, VlvControl, VlvResponse, VlvTarget,
};
pub use message::{ResultCode, SearchEntry, SearchRequest, SearchResponse, SearchScope};

/// LDAP protocol version spoken by default.
pub const PROTOCOL_VERSION: u8 = 3;
