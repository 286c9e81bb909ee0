//! BER helpers for control values, built on `ldap3::asn1`.
//!
//! Every control value is a universal SEQUENCE. Encoding goes through
//! `ldap3`'s tag structures and writer; decoding walks the parsed
//! [`StructureTag`] tree one component at a time.

use std::iter::Peekable;
use std::vec;

use bytes::BytesMut;
use ldap3::asn1::{
    parse_tag, parse_uint, write, ASNTag, Boolean, Enumerated, Integer, OctetString, Sequence,
    StructureTag, Tag, TagClass, Types,
};

use crate::Error;

/// Encode one value to bytes.
pub fn encode(tag: Tag) -> Result<Vec<u8>, Error> {
    let mut buf = BytesMut::new();
    write::encode_into(&mut buf, tag.into_structure())
        .map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(buf.to_vec())
}

/// Universal SEQUENCE.
pub fn sequence(inner: Vec<Tag>) -> Tag {
    Tag::Sequence(Sequence {
        inner,
        ..Default::default()
    })
}

/// Constructed `[id]` with implicit SEQUENCE contents.
pub fn context_sequence(id: u64, inner: Vec<Tag>) -> Tag {
    Tag::Sequence(Sequence {
        id,
        class: TagClass::Context,
        inner,
    })
}

/// Universal INTEGER.
pub fn integer(value: u32) -> Tag {
    Tag::Integer(Integer {
        inner: i64::from(value),
        ..Default::default()
    })
}

/// Universal ENUMERATED.
pub fn enumerated(value: u32) -> Tag {
    Tag::Enumerated(Enumerated {
        inner: i64::from(value),
        ..Default::default()
    })
}

/// Universal OCTET STRING.
pub fn octets(value: impl Into<Vec<u8>>) -> Tag {
    Tag::OctetString(OctetString {
        inner: value.into(),
        ..Default::default()
    })
}

/// Primitive `[id]` with OCTET STRING contents.
pub fn context_octets(id: u64, value: impl Into<Vec<u8>>) -> Tag {
    Tag::OctetString(OctetString {
        id,
        class: TagClass::Context,
        inner: value.into(),
    })
}

/// Primitive `[id]` with BOOLEAN contents.
pub fn context_boolean(id: u64, value: bool) -> Tag {
    Tag::Boolean(Boolean {
        id,
        class: TagClass::Context,
        inner: value,
    })
}

/// Components of a decoded control value, read front to back.
pub struct Components {
    what: &'static str,
    inner: Peekable<vec::IntoIter<StructureTag>>,
}

impl Components {
    /// Parse `value` as a SEQUENCE. `what` names the control in errors.
    pub fn parse(value: &[u8], what: &'static str) -> Result<Self, Error> {
        let (_, tag) = parse_tag(value)
            .map_err(|_| Error::Decoding(format!("malformed {} value", what)))?;
        let inner = tag
            .match_class(TagClass::Universal)
            .and_then(|tag| tag.match_id(Types::Sequence as u64))
            .and_then(StructureTag::expect_constructed)
            .ok_or_else(|| Error::Decoding(format!("{} value is not a sequence", what)))?;
        Ok(Self {
            what,
            inner: inner.into_iter().peekable(),
        })
    }

    /// True when every component has been read.
    pub fn is_empty(&mut self) -> bool {
        self.inner.peek().is_none()
    }

    /// True when the next component is tagged `[id]`.
    pub fn next_is_context(&mut self, id: u64) -> bool {
        matches!(
            self.inner.peek(),
            Some(tag) if matches!(tag.class, TagClass::Context) && tag.id == id
        )
    }

    fn primitive(&mut self, class: TagClass, id: u64, field: &str) -> Result<Vec<u8>, Error> {
        let what = self.what;
        self.inner
            .next()
            .and_then(|tag| tag.match_class(class))
            .and_then(|tag| tag.match_id(id))
            .and_then(StructureTag::expect_primitive)
            .ok_or_else(|| Error::Decoding(format!("{}: missing or malformed {}", what, field)))
    }

    fn unsigned(&self, bytes: &[u8], field: &str) -> Result<u32, Error> {
        let (_, value) = parse_uint(bytes)
            .map_err(|_| Error::Decoding(format!("{}: malformed {}", self.what, field)))?;
        u32::try_from(value)
            .map_err(|_| Error::Decoding(format!("{}: {} out of range: {}", self.what, field, value)))
    }

    /// Next component as a universal INTEGER.
    pub fn integer(&mut self, field: &str) -> Result<u32, Error> {
        let bytes = self.primitive(TagClass::Universal, Types::Integer as u64, field)?;
        self.unsigned(&bytes, field)
    }

    /// Next component as a universal ENUMERATED.
    pub fn enumerated(&mut self, field: &str) -> Result<u32, Error> {
        let bytes = self.primitive(TagClass::Universal, Types::Enumerated as u64, field)?;
        self.unsigned(&bytes, field)
    }

    /// Next component as a universal OCTET STRING.
    pub fn octets(&mut self, field: &str) -> Result<Vec<u8>, Error> {
        self.primitive(TagClass::Universal, Types::OctetString as u64, field)
    }

    /// Next component as a primitive `[id]`.
    pub fn context_octets(&mut self, id: u64, field: &str) -> Result<Vec<u8>, Error> {
        self.primitive(TagClass::Context, id, field)
    }
}
