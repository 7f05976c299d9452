//! Envelope tag parsing and emission.
//!
//! Legacy layout (big-endian, 30 bytes):
//! ```text
//! 0      2         6        10         12       14           18       22           26        30
//! ┌──────┬─────────┬────────┬──────────┬────────┬────────────┬────────┬────────────┬─────────┐
//! │ "#!" │ code i32│reserved│ meta i16 │reserved│ meta_len u32│reserved│ data_len u32│"!#\r\n" │
//! └──────┴─────────┴────────┴──────────┴────────┴────────────┴────────┴────────────┴─────────┘
//! ```
//! Reserved bytes are written as zero and never validated on read.
//!
//! Modern layout:
//! ```text
//! "#~" version:u8 flags:u8 code:varint meta:varint meta_len:varint data_len:varint
//!      ext_len:varint ext:[u8; ext_len] "~#\r\n"
//! ```
//! Varints are unsigned LEB128, at most 5 bytes. Signed fields travel as
//! their two's complement bit pattern.

use std::io::Read;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{NumassError, Result};

pub const LEGACY_START: [u8; 2] = *b"#!";
pub const LEGACY_END: [u8; 4] = *b"!#\r\n";
pub const LEGACY_TAG_LEN: usize = 30;

pub const MODERN_START: [u8; 2] = *b"#~";
pub const MODERN_END: [u8; 4] = *b"~#\r\n";
pub const MODERN_VERSION: u8 = 1;
/// Version, flags and the two markers.
const MODERN_FIXED_LEN: usize = 2 + 2 + 4;
const MAX_VARINT_LEN: usize = 5;
/// Upper bound on the reserved extension block.
pub const MAX_EXTENSION_LEN: u32 = 64 * 1024;

/// Default envelope protocol code ("DF02").
pub const DEFAULT_PROTOCOL_CODE: i32 = 0x4446_3032;

/// Tag dialect selected by the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Legacy,
    #[default]
    Modern,
}

/// Logical fields shared by both dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagFields {
    pub protocol_code: i32,
    pub meta_type: i16,
    pub meta_length: u32,
    pub data_length: u32,
}

/// Parsed tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Legacy(TagFields),
    Modern { version: u8, flags: u8, fields: TagFields },
}

/// Outcome of an incremental tag parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDecode {
    /// Tag parsed; `len` bytes belong to it.
    Complete { tag: Tag, len: usize },
    /// At least `needed` more bytes are required.
    NeedMore(usize),
}

impl Tag {
    /// Build a tag of the given dialect.
    pub fn new(dialect: Dialect, fields: TagFields) -> Self {
        match dialect {
            Dialect::Legacy => Tag::Legacy(fields),
            Dialect::Modern => Tag::Modern {
                version: MODERN_VERSION,
                flags: 0,
                fields,
            },
        }
    }

    pub fn fields(&self) -> &TagFields {
        match self {
            Tag::Legacy(fields) => fields,
            Tag::Modern { fields, .. } => fields,
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Tag::Legacy(_) => Dialect::Legacy,
            Tag::Modern { .. } => Dialect::Modern,
        }
    }

    /// Serialize the tag.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(LEGACY_TAG_LEN);
        self.encode_into(&mut out);
        out.to_vec()
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        match self {
            Tag::Legacy(f) => {
                out.put_slice(&LEGACY_START);
                out.put_i32(f.protocol_code);
                out.put_u32(0);
                out.put_i16(f.meta_type);
                out.put_u16(0);
                out.put_u32(f.meta_length);
                out.put_u32(0);
                out.put_u32(f.data_length);
                out.put_slice(&LEGACY_END);
            }
            Tag::Modern { version, flags, fields } => {
                out.put_slice(&MODERN_START);
                out.put_u8(*version);
                out.put_u8(*flags);
                put_varint(out, fields.protocol_code as u32);
                put_varint(out, u32::from(fields.meta_type as u16));
                put_varint(out, fields.meta_length);
                put_varint(out, fields.data_length);
                // no extension block
                put_varint(out, 0);
                out.put_slice(&MODERN_END);
            }
        }
    }
}

/// Serialize tag fields in the requested dialect.
pub fn encode_tag(fields: TagFields, dialect: Dialect) -> Vec<u8> {
    Tag::new(dialect, fields).encode()
}

/// Identify the dialect from the first two bytes; `None` when fewer are buffered.
pub fn peek_dialect(buf: &[u8]) -> Result<Option<Dialect>> {
    let Some(lead) = buf.get(..2) else {
        return Ok(None);
    };
    if lead == LEGACY_START {
        Ok(Some(Dialect::Legacy))
    } else if lead == MODERN_START {
        Ok(Some(Dialect::Modern))
    } else {
        Err(NumassError::Framing(format!(
            "unrecognized dialect: start marker {lead:02x?}"
        )))
    }
}

/// Parse a tag from the front of `buf` without consuming it.
pub fn try_decode_tag(buf: &[u8]) -> Result<TagDecode> {
    match peek_dialect(buf)? {
        None => Ok(TagDecode::NeedMore(2 - buf.len())),
        Some(Dialect::Legacy) => decode_legacy(buf),
        Some(Dialect::Modern) => decode_modern(buf),
    }
}

/// Read exactly one tag from a stream, never consuming bytes past its end.
pub fn decode_tag<R: Read>(reader: &mut R) -> Result<Tag> {
    let mut buf = Vec::with_capacity(LEGACY_TAG_LEN);
    loop {
        match try_decode_tag(&buf)? {
            TagDecode::Complete { tag, .. } => return Ok(tag),
            TagDecode::NeedMore(n) => {
                let start = buf.len();
                buf.resize(start + n, 0);
                read_full(reader, &mut buf[start..], start)?;
            }
        }
    }
}

/// Fill `buf` from `reader`; `already` counts bytes consumed before this call
/// and is only used for the error report.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8], already: usize) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(NumassError::IncompleteEnvelope {
                    needed: already + buf.len(),
                    available: already + filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(NumassError::Transport(e)),
        }
    }
    Ok(())
}

fn decode_legacy(buf: &[u8]) -> Result<TagDecode> {
    if buf.len() < LEGACY_TAG_LEN {
        return Ok(TagDecode::NeedMore(LEGACY_TAG_LEN - buf.len()));
    }
    let mut b = buf;
    b.advance(2);
    let protocol_code = b.get_i32();
    b.advance(4);
    let meta_type = b.get_i16();
    b.advance(2);
    let meta_length = b.get_u32();
    b.advance(4);
    let data_length = b.get_u32();

    if b.get(..4) != Some(&LEGACY_END[..]) {
        return Err(NumassError::Framing("wrong end sequence for legacy tag".into()));
    }

    Ok(TagDecode::Complete {
        tag: Tag::Legacy(TagFields {
            protocol_code,
            meta_type,
            meta_length,
            data_length,
        }),
        len: LEGACY_TAG_LEN,
    })
}

fn decode_modern(buf: &[u8]) -> Result<TagDecode> {
    if buf.len() < 4 {
        return Ok(TagDecode::NeedMore(4 - buf.len()));
    }
    let mut b = &buf[2..];
    let version = b.get_u8();
    if version != MODERN_VERSION {
        return Err(NumassError::Framing(format!(
            "unsupported modern tag version {version}"
        )));
    }
    let flags = b.get_u8();

    let mut raw = [0u32; 5];
    for slot in raw.iter_mut() {
        match get_varint(&mut b)? {
            Some(v) => *slot = v,
            None => return Ok(TagDecode::NeedMore(1)),
        }
    }
    let [code, meta_type, meta_length, data_length, ext_len] = raw;

    let meta_type = u16::try_from(meta_type)
        .map_err(|_| NumassError::Framing(format!("meta type code {meta_type} exceeds 16 bits")))?;
    if ext_len > MAX_EXTENSION_LEN {
        return Err(NumassError::Framing(format!(
            "modern tag extension of {ext_len} bytes exceeds {MAX_EXTENSION_LEN}"
        )));
    }

    let tail = ext_len as usize + MODERN_END.len();
    if b.remaining() < tail {
        return Ok(TagDecode::NeedMore(tail - b.remaining()));
    }
    b.advance(ext_len as usize);
    if b.get(..4) != Some(&MODERN_END[..]) {
        return Err(NumassError::Framing("wrong end sequence for modern tag".into()));
    }
    b.advance(4);

    Ok(TagDecode::Complete {
        tag: Tag::Modern {
            version,
            flags,
            fields: TagFields {
                protocol_code: code as i32,
                meta_type: meta_type as i16,
                meta_length,
                data_length,
            },
        },
        len: buf.len() - b.remaining(),
    })
}

fn put_varint(out: &mut BytesMut, mut v: u32) {
    while v >= 0x80 {
        out.put_u8((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.put_u8(v as u8);
}

/// `Ok(None)` when the buffer ends inside the varint.
fn get_varint(b: &mut &[u8]) -> Result<Option<u32>> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        if !b.has_remaining() {
            return Ok(None);
        }
        let byte = b.get_u8();
        if i == MAX_VARINT_LEN - 1 && byte > 0x0f {
            return Err(NumassError::Framing("varint overflows 32 bits".into()));
        }
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
    Err(NumassError::Framing("varint overflows 32 bits".into()))
}

/// Length of the modern tag for the given fields.
pub fn modern_tag_len(fields: &TagFields) -> usize {
    let varint_len = |v: u32| -> usize {
        match v {
            0..=0x7f => 1,
            0x80..=0x3fff => 2,
            0x4000..=0x1f_ffff => 3,
            0x20_0000..=0x0fff_ffff => 4,
            _ => 5,
        }
    };
    MODERN_FIXED_LEN
        + varint_len(fields.protocol_code as u32)
        + varint_len(u32::from(fields.meta_type as u16))
        + varint_len(fields.meta_length)
        + varint_len(fields.data_length)
        + varint_len(0)
}
