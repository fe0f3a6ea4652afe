//! Fixed-layout record codec.
//!
//! Every participant encodes its local records into one contribution. All
//! integers and floats are little-endian; nothing depends on the host's
//! struct layout.
//!
//! # Wire Format
//!
//! ```text
//! contribution := ε | header record{count}
//! header       := magic:u32  record_len:u32  count:u32        (12 bytes)
//! record       := gid:u64  payload[record_len - 8]
//! ```
//!
//! `magic` is `0x56434B47` ("GKCV" read as little-endian bytes). A
//! zero-byte contribution is legal and carries no records; it is what an
//! empty local set encodes to.

use crate::ViewError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use gridkernel_types::{Gid, Rank};

/// Leading tag of every non-empty contribution.
pub const MAGIC: u32 = 0x5643_4B47;

/// Bytes before the first record.
pub const HEADER_LEN: usize = 12;

/// Bytes taken by the GID at the start of each record.
pub const GID_LEN: usize = 8;

/// A value that can travel in a consistent-view record.
///
/// `ENCODED_LEN` is fixed per type; two participants using payload types of
/// different lengths is a protocol violation.
pub trait Payload: Sized + Clone {
    const ENCODED_LEN: usize;

    fn encode(&self, buf: &mut impl BufMut);

    /// Decode from exactly `ENCODED_LEN` bytes.
    fn decode(buf: &mut impl Buf) -> Self;
}

impl Payload for () {
    const ENCODED_LEN: usize = 0;

    fn encode(&self, _buf: &mut impl BufMut) {}

    fn decode(_buf: &mut impl Buf) -> Self {}
}

impl Payload for u64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        buf.get_u64_le()
    }
}

impl Payload for f64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        buf.get_f64_le()
    }
}

/// Positions and other fixed-arity coordinate vectors.
impl<const D: usize> Payload for [f64; D] {
    const ENCODED_LEN: usize = 8 * D;

    fn encode(&self, buf: &mut impl BufMut) {
        for x in self {
            buf.put_f64_le(*x);
        }
    }

    fn decode(buf: &mut impl Buf) -> Self {
        std::array::from_fn(|_| buf.get_f64_le())
    }
}

/// One (GID, payload) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRecord<P> {
    pub gid: Gid,
    pub payload: P,
}

impl<P> ViewRecord<P> {
    pub fn new(gid: Gid, payload: P) -> Self {
        Self { gid, payload }
    }
}

/// Length of one encoded record carrying `P`.
pub const fn record_len<P: Payload>() -> usize {
    GID_LEN + P::ENCODED_LEN
}

/// Encode local records into one contribution.
///
/// An empty slice encodes to zero bytes.
pub fn encode_contribution<P: Payload>(records: &[ViewRecord<P>]) -> Result<Bytes, ViewError> {
    if records.is_empty() {
        return Ok(Bytes::new());
    }
    let count =
        u32::try_from(records.len()).map_err(|_| ViewError::TooManyRecords(records.len()))?;
    let record_len = record_len::<P>();

    let mut buf = BytesMut::with_capacity(HEADER_LEN + records.len() * record_len);
    buf.put_u32_le(MAGIC);
    buf.put_u32_le(record_len as u32);
    buf.put_u32_le(count);
    for record in records {
        buf.put_u64_le(record.gid.0);
        record.payload.encode(&mut buf);
    }
    Ok(buf.freeze())
}

/// A decoded record that still remembers who sent it and its raw bytes.
///
/// Canonicalization compares payloads by their encoded bytes, so equality
/// never depends on `P` implementing `PartialEq`.
#[derive(Debug, Clone)]
pub(crate) struct Contributed<'a, P> {
    pub gid: Gid,
    pub rank: Rank,
    pub raw: &'a [u8],
    pub payload: P,
}

/// Decode one rank's contribution.
pub(crate) fn decode_contribution<P: Payload>(
    rank: Rank,
    bytes: &[u8],
) -> Result<Vec<Contributed<'_, P>>, ViewError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let malformed = |reason: String| ViewError::MalformedContribution { rank, reason };

    if bytes.len() < HEADER_LEN {
        return Err(malformed(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    let (mut header, body) = bytes.split_at(HEADER_LEN);
    let magic = header.get_u32_le();
    if magic != MAGIC {
        return Err(malformed(format!("bad magic {magic:#010x}")));
    }

    let expected = record_len::<P>();
    let found = header.get_u32_le() as usize;
    if found != expected {
        return Err(ViewError::RecordSizeMismatch {
            rank,
            expected,
            found,
        });
    }

    let count = header.get_u32_le() as usize;
    if count.checked_mul(expected) != Some(body.len()) {
        return Err(malformed(format!(
            "header announces {count} records but {} body bytes follow",
            body.len()
        )));
    }

    let mut records = Vec::with_capacity(count);
    for mut chunk in body.chunks_exact(expected) {
        let gid = Gid(chunk.get_u64_le());
        if !gid.is_assignable() {
            return Err(malformed("record carries the reserved GID".to_string()));
        }
        let raw = chunk;
        let payload = P::decode(&mut chunk);
        records.push(Contributed {
            gid,
            rank,
            raw,
            payload,
        });
    }
    Ok(records)
}
