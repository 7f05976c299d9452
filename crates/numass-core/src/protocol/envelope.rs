//! Envelope model and codec.
//!
//! Wire form: `tag | meta bytes (meta_length) | data bytes (data_length)`.
//! Lengths are always taken from the serialized buffers, never estimated,
//! and readers never consume past them.

use std::io::{Read, Write};

use bytes::{Buf, Bytes, BytesMut};

use super::meta_type::MetaType;
use super::tag::{self, Dialect, Tag, TagDecode, TagFields, DEFAULT_PROTOCOL_CODE};
use crate::error::{NumassError, Result};
use crate::meta::{Meta, Value};

/// Default cap on each declared section length (256 MiB).
pub const DEFAULT_MAX_SECTION_LEN: u32 = 256 * 1024 * 1024;

/// Largest single buffer reservation made while waiting for a body.
const RESERVE_STEP: usize = 64 * 1024;

/// Unit of exchange and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Framing dialect/version code carried in the tag.
    pub protocol_code: i32,
    /// Codec used for `meta` on the wire.
    pub meta_type: MetaType,
    pub meta: Meta,
    /// Opaque payload.
    pub data: Bytes,
}

impl Envelope {
    pub fn new(meta: Meta) -> Self {
        Self {
            protocol_code: DEFAULT_PROTOCOL_CODE,
            meta_type: MetaType::default(),
            meta,
            data: Bytes::new(),
        }
    }

    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    pub fn data_length(&self) -> usize {
        self.data.len()
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Request/response domain (`meta.type`).
    pub fn ty(&self) -> Option<String> {
        self.meta.get_string(super::message::TYPE_KEY)
    }
}

/// Fluent envelope construction.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl Default for EnvelopeBuilder {
    fn default() -> Self {
        Self {
            envelope: Envelope::new(Meta::new()),
        }
    }
}

impl EnvelopeBuilder {
    /// Start from an existing envelope.
    pub fn from_envelope(envelope: Envelope) -> Self {
        Self { envelope }
    }

    pub fn meta(mut self, meta: Meta) -> Self {
        self.envelope.meta = meta;
        self
    }

    pub fn set_meta_value(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.envelope.meta.set_value(path, value);
        self
    }

    pub fn put_meta_node(mut self, name: &str, node: Meta) -> Self {
        self.envelope.meta.put_node(name, node);
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.envelope.data = data.into();
        self
    }

    pub fn meta_type(mut self, meta_type: MetaType) -> Self {
        self.envelope.meta_type = meta_type;
        self
    }

    pub fn protocol_code(mut self, code: i32) -> Self {
        self.envelope.protocol_code = code;
        self
    }

    /// Borrow the meta under construction.
    pub fn meta_ref(&self) -> &Meta {
        &self.envelope.meta
    }

    pub fn build(self) -> Envelope {
        self.envelope
    }
}

/// A decoded envelope together with the tag it arrived with.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tag: Tag,
    pub envelope: Envelope,
}

/// Envelope encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    /// Dialect used when writing.
    pub dialect: Dialect,
    /// Largest accepted declared meta or data length.
    pub max_section_len: u32,
    /// Reject unknown meta-type codes instead of falling back to the default.
    pub strict_meta_type: bool,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(Dialect::default())
    }
}

impl EnvelopeCodec {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            max_section_len: DEFAULT_MAX_SECTION_LEN,
            strict_meta_type: false,
        }
    }

    pub fn with_max_section_len(mut self, max: u32) -> Self {
        self.max_section_len = max;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_meta_type = strict;
        self
    }

    /// Serialize an envelope in this codec's dialect.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let meta = envelope.meta_type.encode(&envelope.meta)?;
        let fields = TagFields {
            protocol_code: envelope.protocol_code,
            meta_type: envelope.meta_type.code(),
            meta_length: section_len(meta.len(), "meta")?,
            data_length: section_len(envelope.data.len(), "data")?,
        };
        let tag = Tag::new(self.dialect, fields);

        let mut out = BytesMut::with_capacity(
            tag::modern_tag_len(&fields).max(tag::LEGACY_TAG_LEN) + meta.len() + envelope.data.len(),
        );
        tag.encode_into(&mut out);
        out.extend_from_slice(&meta);
        out.extend_from_slice(&envelope.data);
        Ok(out.to_vec())
    }

    /// Write one envelope and flush.
    pub fn write<W: Write>(&self, writer: &mut W, envelope: &Envelope) -> Result<()> {
        let bytes = self.encode(envelope)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Decode one envelope from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched until the whole envelope
    /// is buffered; on success the envelope's bytes are split off.
    pub fn try_decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        let (tag, tag_len) = match tag::try_decode_tag(&buf[..])? {
            TagDecode::Complete { tag, len } => (tag, len),
            TagDecode::NeedMore(_) => return Ok(None),
        };
        let fields = *tag.fields();
        self.check_lengths(&fields)?;

        let total = tag_len + fields.meta_length as usize + fields.data_length as usize;
        if buf.len() < total {
            // Grow with the bytes actually arriving, not the declared size.
            buf.reserve((total - buf.len()).min(RESERVE_STEP));
            return Ok(None);
        }

        let mut raw = buf.split_to(total).freeze();
        raw.advance(tag_len);
        let meta_bytes = raw.split_to(fields.meta_length as usize);
        let envelope = self.assemble(&fields, &meta_bytes, raw)?;
        Ok(Some(Frame { tag, envelope }))
    }

    /// Decode a complete buffer holding exactly one envelope.
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame> {
        let mut buf = BytesMut::from(bytes);
        match self.try_decode(&mut buf)? {
            Some(frame) if buf.is_empty() => Ok(frame),
            Some(_) => Err(NumassError::Framing(format!(
                "{} trailing bytes after envelope",
                buf.len()
            ))),
            None => Err(NumassError::IncompleteEnvelope {
                needed: declared_total(bytes)?.unwrap_or(bytes.len() + 1),
                available: bytes.len(),
            }),
        }
    }

    /// Read exactly one envelope from a stream.
    pub fn read<R: Read>(&self, reader: &mut R) -> Result<Envelope> {
        self.read_frame(reader).map(|f| f.envelope)
    }

    /// Read exactly one envelope from a stream, keeping its tag.
    pub fn read_frame<R: Read>(&self, reader: &mut R) -> Result<Frame> {
        let tag = tag::decode_tag(reader)?;
        let fields = *tag.fields();
        self.check_lengths(&fields)?;

        let mut meta_bytes = vec![0u8; fields.meta_length as usize];
        tag::read_full(reader, &mut meta_bytes, 0)?;
        let mut data = vec![0u8; fields.data_length as usize];
        tag::read_full(reader, &mut data, meta_bytes.len())?;

        let envelope = self.assemble(&fields, &meta_bytes, Bytes::from(data))?;
        Ok(Frame { tag, envelope })
    }

    fn check_lengths(&self, fields: &TagFields) -> Result<()> {
        for (what, len) in [("meta", fields.meta_length), ("data", fields.data_length)] {
            if len > self.max_section_len {
                return Err(NumassError::Framing(format!(
                    "declared {what} length {len} exceeds limit {}",
                    self.max_section_len
                )));
            }
        }
        Ok(())
    }

    fn assemble(&self, fields: &TagFields, meta_bytes: &[u8], data: Bytes) -> Result<Envelope> {
        let meta_type = if self.strict_meta_type {
            MetaType::resolve(fields.meta_type)?
        } else {
            MetaType::resolve_or_default(fields.meta_type)
        };
        let meta = meta_type.decode(meta_bytes)?;
        tracing::trace!(
            meta_len = meta_bytes.len(),
            data_len = data.len(),
            meta_type = meta_type.name(),
            "envelope decoded"
        );
        Ok(Envelope {
            protocol_code: fields.protocol_code,
            meta_type,
            meta,
            data,
        })
    }
}

fn section_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| NumassError::Framing(format!("{what} section of {len} bytes exceeds u32")))
}

/// Total declared envelope size, `None` until the tag is fully present.
pub fn declared_total(bytes: &[u8]) -> Result<Option<usize>> {
    Ok(match tag::try_decode_tag(bytes)? {
        TagDecode::Complete { tag, len } => {
            let f = tag.fields();
            Some(len + f.meta_length as usize + f.data_length as usize)
        }
        TagDecode::NeedMore(_) => None,
    })
}
