//! Frame types exchanged on a call, and their binary codec.
//!
//! Single-mode frames carry exactly one of an identifier or a chunk.
//! Multiplex frames carry a sequence of `{identifier, chunk}` values.

use bytes::{Bytes, BytesMut};
use zerocopy::{AsBytes, FromBytes};

use crate::wire::{
    EntryHeader, FrameHeader, FrameKind, WireError, CHUNK_SIZE, ENTRY_HEADER_SIZE,
    FRAME_HEADER_SIZE, MAX_FRAME_BODY, TAG_CHUNK, TAG_ID,
};

/// Names a logical transfer. Zero is reserved for "unset".
pub type TransferId = i64;

/// The reserved "no identifier in this frame" value.
pub const UNSET_ID: TransferId = 0;

/// Store key for a single-mode transfer.
pub fn single_key(id: TransferId) -> String {
    format!("single_{id}")
}

/// Store key for one identifier of a multiplex transfer.
pub fn multiple_key(id: TransferId) -> String {
    format!("multiple_{id}")
}

/// Number of chunks needed to emit `len` bytes.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

/// Split a byte sequence into [`CHUNK_SIZE`] chunks. The last chunk is
/// shorter when `data.len()` is not a multiple of the chunk size, and its
/// position declares exactly its valid bytes. Slices share `data`'s buffer.
pub fn split_chunks(data: &Bytes) -> impl Iterator<Item = Chunk> + '_ {
    (0..data.len())
        .step_by(CHUNK_SIZE)
        .map(move |start| Chunk::new(data.slice(start..data.len().min(start + CHUNK_SIZE))))
}

// ── Chunk ─────────────────────────────────────────────────────────────────────

/// A payload plus the declared count of valid bytes in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub position: i64,
}

impl Chunk {
    /// A chunk whose whole payload is valid.
    pub fn new(data: Bytes) -> Self {
        let position = data.len() as i64;
        Self { data, position }
    }

    /// The first `position` bytes of the payload, clamped to its length.
    pub fn valid(&self) -> Bytes {
        let declared = self.position.clamp(0, self.data.len() as i64) as usize;
        self.data.slice(..declared)
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// Inbound single-mode frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleRequest {
    Id(TransferId),
    Chunk(Chunk),
}

/// Outbound single-mode frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleResponse {
    Id(TransferId),
    Chunk(Chunk),
}

/// One `{identifier, chunk}` pair of a multiplex frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub id: TransferId,
    pub chunk: Option<Chunk>,
}

/// Inbound multiplex frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipleRequest {
    pub values: Vec<Value>,
}

/// Outbound multiplex frame. The server sends one value per frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipleResponse {
    pub values: Vec<Value>,
}

/// A message that can travel as one frame.
///
/// Frames are built from and flattened into entries; the codec below does
/// the byte work once for every frame kind.
pub trait Frame: Sized {
    const KIND: FrameKind;

    fn to_entries(&self) -> Vec<Entry>;

    fn from_entries(entries: Vec<Entry>) -> Result<Self, WireError>;

    /// Encode header and body into one contiguous buffer.
    fn encode(&self) -> Result<Bytes, WireError> {
        encode_entries(Self::KIND, &self.to_entries())
    }

    /// Decode a body whose header has already been parsed.
    fn decode(header: &FrameHeader, body: Bytes) -> Result<Self, WireError> {
        Self::from_entries(decode_entries(header, body)?)
    }
}

/// Flattened form of a frame record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: TransferId,
    pub chunk: Option<Chunk>,
}

impl Frame for SingleRequest {
    const KIND: FrameKind = FrameKind::SingleRequest;

    fn to_entries(&self) -> Vec<Entry> {
        match self {
            SingleRequest::Id(id) => vec![Entry { id: *id, chunk: None }],
            SingleRequest::Chunk(c) => vec![Entry {
                id: UNSET_ID,
                chunk: Some(c.clone()),
            }],
        }
    }

    fn from_entries(entries: Vec<Entry>) -> Result<Self, WireError> {
        match single_entry(entries)? {
            Entry { chunk: Some(c), .. } => Ok(SingleRequest::Chunk(c)),
            Entry { id, chunk: None } => Ok(SingleRequest::Id(id)),
        }
    }
}

impl Frame for SingleResponse {
    const KIND: FrameKind = FrameKind::SingleResponse;

    fn to_entries(&self) -> Vec<Entry> {
        match self {
            SingleResponse::Id(id) => vec![Entry { id: *id, chunk: None }],
            SingleResponse::Chunk(c) => vec![Entry {
                id: UNSET_ID,
                chunk: Some(c.clone()),
            }],
        }
    }

    fn from_entries(entries: Vec<Entry>) -> Result<Self, WireError> {
        match single_entry(entries)? {
            Entry { chunk: Some(c), .. } => Ok(SingleResponse::Chunk(c)),
            Entry { id, chunk: None } => Ok(SingleResponse::Id(id)),
        }
    }
}

impl Frame for MultipleRequest {
    const KIND: FrameKind = FrameKind::MultipleRequest;

    fn to_entries(&self) -> Vec<Entry> {
        values_to_entries(&self.values)
    }

    fn from_entries(entries: Vec<Entry>) -> Result<Self, WireError> {
        Ok(Self {
            values: entries_to_values(entries),
        })
    }
}

impl Frame for MultipleResponse {
    const KIND: FrameKind = FrameKind::MultipleResponse;

    fn to_entries(&self) -> Vec<Entry> {
        values_to_entries(&self.values)
    }

    fn from_entries(entries: Vec<Entry>) -> Result<Self, WireError> {
        Ok(Self {
            values: entries_to_values(entries),
        })
    }
}

fn single_entry(entries: Vec<Entry>) -> Result<Entry, WireError> {
    let mut entries = entries.into_iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        (None, _) => Err(WireError::Malformed("single frame has no entry")),
        (Some(_), Some(_)) => Err(WireError::Malformed("single frame has more than one entry")),
    }
}

fn values_to_entries(values: &[Value]) -> Vec<Entry> {
    values
        .iter()
        .map(|v| Entry {
            id: v.id,
            chunk: v.chunk.clone(),
        })
        .collect()
}

fn entries_to_values(entries: Vec<Entry>) -> Vec<Value> {
    entries
        .into_iter()
        .map(|e| Value {
            id: e.id,
            chunk: e.chunk,
        })
        .collect()
}

// ── Codec ─────────────────────────────────────────────────────────────────────

fn encode_entries(kind: FrameKind, entries: &[Entry]) -> Result<Bytes, WireError> {
    let body_len: usize = entries
        .iter()
        .map(|e| ENTRY_HEADER_SIZE + e.chunk.as_ref().map_or(0, |c| c.data.len()))
        .sum();
    if body_len > MAX_FRAME_BODY {
        return Err(WireError::FrameTooLarge(body_len));
    }

    let header = FrameHeader::new(kind, entries.len() as u32, body_len as u32);
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body_len);
    buf.extend_from_slice(header.as_bytes());

    for entry in entries {
        let record = match &entry.chunk {
            Some(c) => EntryHeader::new(TAG_CHUNK, entry.id, c.position, c.data.len() as u32),
            None => EntryHeader::new(TAG_ID, entry.id, 0, 0),
        };
        buf.extend_from_slice(record.as_bytes());
        if let Some(c) = &entry.chunk {
            buf.extend_from_slice(&c.data);
        }
    }

    Ok(buf.freeze())
}

fn decode_entries(header: &FrameHeader, body: Bytes) -> Result<Vec<Entry>, WireError> {
    if body.len() != header.body_len() {
        return Err(WireError::Truncated {
            expected: header.body_len(),
            actual: body.len(),
        });
    }

    // Every entry needs at least a header; bound the allocation by the body.
    let count = header.entries();
    if count > body.len() / ENTRY_HEADER_SIZE {
        return Err(WireError::Malformed("entry count exceeds body length"));
    }

    let mut entries = Vec::with_capacity(count);
    let mut offset = 0;

    for _ in 0..count {
        let end = offset + ENTRY_HEADER_SIZE;
        let record = body
            .get(offset..end)
            .and_then(EntryHeader::read_from)
            .ok_or(WireError::Truncated {
                expected: end,
                actual: body.len(),
            })?;
        offset = end;

        let data_len = record.data_len.get() as usize;
        match record.tag {
            TAG_ID => {
                if data_len != 0 {
                    return Err(WireError::Malformed("identifier entry carries payload"));
                }
                entries.push(Entry {
                    id: record.id.get(),
                    chunk: None,
                });
            }
            TAG_CHUNK => {
                let end = offset + data_len;
                if end > body.len() {
                    return Err(WireError::Truncated {
                        expected: end,
                        actual: body.len(),
                    });
                }
                entries.push(Entry {
                    id: record.id.get(),
                    chunk: Some(Chunk {
                        data: body.slice(offset..end),
                        position: record.position.get(),
                    }),
                });
                offset = end;
            }
            other => return Err(WireError::UnknownTag(other)),
        }
    }

    if offset != body.len() {
        return Err(WireError::Malformed("trailing bytes after last entry"));
    }

    Ok(entries)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
