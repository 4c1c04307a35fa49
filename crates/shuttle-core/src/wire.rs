//! Shuttle wire format: fixed-layout headers for every call and frame.
//!
//! A call is one TCP connection. The client opens it with a [`CallHeader`]
//! naming the method, then both sides exchange frames. Every frame is a
//! [`FrameHeader`] followed by `entries` records, each an [`EntryHeader`]
//! plus `data_len` payload bytes.
//!
//! All integers are little-endian. Headers use zerocopy byte-order types so
//! the layout has alignment 1 and no padding; there is no unsafe code here.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, I64, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current wire format version, carried by calls and frames.
pub const WIRE_VERSION: u8 = 0x01;

/// Magic bytes opening every call.
pub const CALL_MAGIC: [u8; 4] = *b"SHTL";

/// Payload bytes per chunk, both for storage reads and emitted frames.
pub const CHUNK_SIZE: usize = 1024;

/// Upper bound on a decoded frame body. Larger frames are rejected before
/// the body is read.
pub const MAX_FRAME_BODY: usize = 16 * 1024 * 1024;

pub const CALL_HEADER_SIZE: usize = std::mem::size_of::<CallHeader>();
pub const FRAME_HEADER_SIZE: usize = std::mem::size_of::<FrameHeader>();
pub const ENTRY_HEADER_SIZE: usize = std::mem::size_of::<EntryHeader>();

/// Entry carries only an identifier.
pub const TAG_ID: u8 = 0x01;
/// Entry carries a chunk (and, in multiplex frames, its identifier).
pub const TAG_CHUNK: u8 = 0x02;

// ── Call Header ───────────────────────────────────────────────────────────────

/// Duplex-streaming RPC methods served by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Method {
    /// One identifier, one byte sequence.
    Single = 0x01,
    /// Many identifiers interleaved on one stream.
    Multiple = 0x02,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Single => "single",
            Method::Multiple => "multiple",
        }
    }
}

impl TryFrom<u8> for Method {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Method::Single),
            0x02 => Ok(Method::Multiple),
            other => Err(WireError::UnknownMethod(other)),
        }
    }
}

impl From<Method> for u8 {
    fn from(m: Method) -> u8 {
        m as u8
    }
}

/// Sent once by the client before its first frame.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct CallHeader {
    /// Always [`CALL_MAGIC`].
    pub magic: [u8; 4],
    /// Wire format version. Currently 0x01.
    pub version: u8,
    /// [`Method`] byte.
    pub method: u8,
    /// Reserved, must be zero.
    pub reserved: [u8; 2],
}

assert_eq_size!(CallHeader, [u8; 8]);

impl CallHeader {
    pub fn new(method: Method) -> Self {
        Self {
            magic: CALL_MAGIC,
            version: WIRE_VERSION,
            method: method.into(),
            reserved: [0; 2],
        }
    }

    pub fn to_bytes(&self) -> [u8; CALL_HEADER_SIZE] {
        let mut out = [0u8; CALL_HEADER_SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Parse and validate a call header, returning the requested method.
    pub fn parse(bytes: &[u8]) -> Result<Method, WireError> {
        let header = CallHeader::read_from(bytes).ok_or(WireError::Truncated {
            expected: CALL_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        if header.magic != CALL_MAGIC {
            return Err(WireError::BadMagic(header.magic));
        }
        if header.version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(header.version));
        }
        Method::try_from(header.method)
    }
}

// ── Frame Header ──────────────────────────────────────────────────────────────

/// Which message shape a frame body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    SingleRequest = 0x01,
    SingleResponse = 0x02,
    MultipleRequest = 0x03,
    MultipleResponse = 0x04,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::SingleRequest),
            0x02 => Ok(FrameKind::SingleResponse),
            0x03 => Ok(FrameKind::MultipleRequest),
            0x04 => Ok(FrameKind::MultipleResponse),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// Precedes every frame body.
///
/// Wire size: 12 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FrameHeader {
    /// Wire format version. Currently 0x01.
    pub version: u8,
    /// [`FrameKind`] byte.
    pub kind: u8,
    /// Reserved, must be zero.
    pub flags: u8,
    /// Reserved, must be zero.
    pub reserved: u8,
    /// Number of entries in the body.
    pub entries: U32<LittleEndian>,
    /// Body length in bytes, not including this header.
    pub body_len: U32<LittleEndian>,
}

assert_eq_size!(FrameHeader, [u8; 12]);

impl FrameHeader {
    pub fn new(kind: FrameKind, entries: u32, body_len: u32) -> Self {
        Self {
            version: WIRE_VERSION,
            kind: kind as u8,
            flags: 0,
            reserved: 0,
            entries: U32::new(entries),
            body_len: U32::new(body_len),
        }
    }

    /// Parse a header and check it against the kind the reader expects.
    pub fn parse(bytes: &[u8], expected: FrameKind) -> Result<Self, WireError> {
        let header = FrameHeader::read_from(bytes).ok_or(WireError::Truncated {
            expected: FRAME_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        if header.version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(header.version));
        }
        if header.flags != 0 {
            return Err(WireError::ReservedFlagsSet(header.flags));
        }
        let kind = FrameKind::try_from(header.kind)?;
        if kind != expected {
            return Err(WireError::UnexpectedKind {
                expected,
                actual: kind,
            });
        }
        if header.body_len() > MAX_FRAME_BODY {
            return Err(WireError::FrameTooLarge(header.body_len()));
        }
        Ok(header)
    }

    pub fn entries(&self) -> usize {
        self.entries.get() as usize
    }

    pub fn body_len(&self) -> usize {
        self.body_len.get() as usize
    }
}

// ── Entry Header ──────────────────────────────────────────────────────────────

/// One `{identifier, chunk}` record inside a frame body.
///
/// Wire size: 24 bytes, followed by `data_len` payload bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct EntryHeader {
    /// Transfer identifier. Zero means unset.
    pub id: I64<LittleEndian>,
    /// Declared number of valid bytes in the payload. Not a stream offset.
    pub position: I64<LittleEndian>,
    /// Payload bytes that follow this header.
    pub data_len: U32<LittleEndian>,
    /// [`TAG_ID`] or [`TAG_CHUNK`].
    pub tag: u8,
    /// Reserved, must be zero.
    pub reserved: [u8; 3],
}

assert_eq_size!(EntryHeader, [u8; 24]);

impl EntryHeader {
    pub fn new(tag: u8, id: i64, position: i64, data_len: u32) -> Self {
        Self {
            id: I64::new(id),
            position: I64::new(position),
            data_len: U32::new(data_len),
            tag,
            reserved: [0; 3],
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("bad call magic: {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown method byte: 0x{0:02x}")]
    UnknownMethod(u8),

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("expected {expected:?} frame, got {actual:?}")]
    UnexpectedKind {
        expected: FrameKind,
        actual: FrameKind,
    },

    #[error("unknown entry tag: 0x{0:02x}")]
    UnknownTag(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("frame body of {0} bytes exceeds maximum {}", MAX_FRAME_BODY)]
    FrameTooLarge(usize),

    #[error("truncated: needed {expected} bytes, had {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
