//! Hand-rolled canonical binary primitives.
//!
//! Nothing here routes through a generic derive-based serializer: spec.md
//! §4.1 requires arrays-only framing, explicit length prefixes, and a hash
//! preimage with no IEEE-754-typed tokens, none of which a general-purpose
//! format (msgpack, bincode, …) lets us control precisely enough. `bytes`
//! gives us cursor-style `BytesMut`/`Buf` access; everything else is ours.

use bytes::{Buf, BufMut, BytesMut};

use crate::CodecError;

/// Marker byte opening every composite (struct or list). Chosen so it can
/// never be mistaken for a map-type tag — this codec never emits maps, so
/// there is no map tag to collide with, but `0xDD` keeps the byte firmly
/// outside the `0x80..=0x8f` range a MessagePack-literate reader would
/// recognise as "map" if these bytes ever ended up compared side by side.
pub const ARRAY_TAG: u8 = 0xDD;

/// Marker byte opening a raw-bytes geometry blob (a tagged array of f64
/// bit patterns). Distinct from any floating-point type tag: a reader sees
/// "opaque bytes", not "float", which is what spec.md §4.1/§8 property 3
/// requires of anything that ends up in a hash preimage.
pub const GEOMETRY_BLOB_TAG: u8 = 0xC4;

/// Writes the array-framing header (tag + element count) for a composite.
pub fn write_array_header(buf: &mut BytesMut, count: u32) {
    buf.put_u8(ARRAY_TAG);
    buf.put_u32(count);
}

/// Reads and validates an array-framing header, returning the element count.
pub fn read_array_header(buf: &mut impl Buf) -> Result<u32, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Truncated);
    }
    let tag = buf.get_u8();
    if tag != ARRAY_TAG {
        return Err(CodecError::UnexpectedTag { expected: ARRAY_TAG, actual: tag });
    }
    require(buf, 4)?;
    Ok(buf.get_u32())
}

/// Writes an unsigned integer as an explicit length byte followed by that
/// many big-endian bytes (the minimal encoding; `0` is written as length 0).
pub fn write_uvarint(buf: &mut BytesMut, value: u64) {
    let be = value.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0).unwrap_or(8);
    let trimmed = &be[first_nonzero..];
    buf.put_u8(trimmed.len() as u8);
    buf.put_slice(trimmed);
}

/// Reads a length-prefixed unsigned integer written by [`write_uvarint`].
pub fn read_uvarint(buf: &mut impl Buf) -> Result<u64, CodecError> {
    require(buf, 1)?;
    let len = buf.get_u8() as usize;
    if len > 8 {
        return Err(CodecError::InvalidVarint);
    }
    require(buf, len)?;
    let mut be = [0u8; 8];
    buf.copy_to_slice(&mut be[8 - len..]);
    Ok(u64::from_be_bytes(be))
}

/// Zigzag-encodes a signed integer, then writes it with [`write_uvarint`].
pub fn write_ivarint(buf: &mut BytesMut, value: i64) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    write_uvarint(buf, zigzag);
}

/// Reads a value written by [`write_ivarint`].
pub fn read_ivarint(buf: &mut impl Buf) -> Result<i64, CodecError> {
    let zigzag = read_uvarint(buf)?;
    Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
}

/// Writes a length-prefixed blob of raw bytes.
pub fn write_blob(buf: &mut BytesMut, bytes: &[u8]) {
    write_uvarint(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

/// Reads a length-prefixed blob of raw bytes written by [`write_blob`].
pub fn read_blob(buf: &mut impl Buf) -> Result<Vec<u8>, CodecError> {
    let len = read_uvarint(buf)? as usize;
    require(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Writes a UTF-8 string as a length-prefixed blob.
pub fn write_str(buf: &mut BytesMut, s: &str) {
    write_blob(buf, s.as_bytes());
}

/// Reads a UTF-8 string written by [`write_str`].
pub fn read_str(buf: &mut impl Buf) -> Result<String, CodecError> {
    let bytes = read_blob(buf)?;
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}

/// Writes a 128-bit identifier as 16 raw bytes in its native (RFC-4122
/// big-endian) byte order — never the platform's native mixed-endian form.
pub fn write_guid(buf: &mut BytesMut, id: &uuid::Uuid) {
    buf.put_slice(id.as_bytes());
}

/// Reads a 128-bit identifier written by [`write_guid`].
pub fn read_guid(buf: &mut impl Buf) -> Result<uuid::Uuid, CodecError> {
    require(buf, 16)?;
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(uuid::Uuid::from_bytes(raw))
}

/// Writes a 32-byte hash.
pub fn write_hash32(buf: &mut BytesMut, hash: &[u8; 32]) {
    buf.put_slice(hash);
}

/// Reads a 32-byte hash written by [`write_hash32`].
pub fn read_hash32(buf: &mut impl Buf) -> Result<[u8; 32], CodecError> {
    require(buf, 32)?;
    let mut raw = [0u8; 32];
    buf.copy_to_slice(&mut raw);
    Ok(raw)
}

/// Writes an `Option<bool-ish presence>` discriminant: `0x00` absent,
/// `0x01` present. Callers write the payload themselves after a `true`
/// return from the paired read, so no sentinel value (e.g. NaN) is ever
/// needed for "absent" — spec.md §9 explicitly calls this out.
pub fn write_presence(buf: &mut BytesMut, present: bool) {
    buf.put_u8(if present { 0x01 } else { 0x00 });
}

/// Reads a presence discriminant written by [`write_presence`].
pub fn read_presence(buf: &mut impl Buf) -> Result<bool, CodecError> {
    require(buf, 1)?;
    match buf.get_u8() {
        0x00 => Ok(false),
        0x01 => Ok(true),
        other => Err(CodecError::UnexpectedTag { expected: 0x01, actual: other }),
    }
}

/// Writes a tagged blob of raw IEEE-754 bit patterns — explicitly framed as
/// opaque bytes, never as a native float type, per spec.md §8 property 3.
pub fn write_f64_blob(buf: &mut BytesMut, values: &[f64]) {
    buf.put_u8(GEOMETRY_BLOB_TAG);
    write_uvarint(buf, values.len() as u64);
    for v in values {
        buf.put_slice(&v.to_bits().to_be_bytes());
    }
}

/// Reads a blob written by [`write_f64_blob`].
pub fn read_f64_blob(buf: &mut impl Buf) -> Result<Vec<f64>, CodecError> {
    require(buf, 1)?;
    let tag = buf.get_u8();
    if tag != GEOMETRY_BLOB_TAG {
        return Err(CodecError::UnexpectedTag { expected: GEOMETRY_BLOB_TAG, actual: tag });
    }
    let count = read_uvarint(buf)? as usize;
    require(buf, count * 8)?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut raw = [0u8; 8];
        buf.copy_to_slice(&mut raw);
        out.push(f64::from_bits(u64::from_be_bytes(raw)));
    }
    Ok(out)
}

fn require(buf: &impl Buf, n: usize) -> Result<(), CodecError> {
    if buf.remaining() < n {
        Err(CodecError::Truncated)
    } else {
        Ok(())
    }
}
