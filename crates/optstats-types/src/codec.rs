//! Order-preserving key codec.
//!
//! `encode_key` maps a tuple of datums to bytes whose lexicographic order
//! matches the tuple order. The encoded bytes are the lookup key for TopN
//! lists and frequency sketches and the bound type of index histograms.
//!
//! Layout: one flag byte per value followed by its body.
//! - integers: 8 big-endian bytes, sign bit flipped;
//! - unsigned: 8 big-endian bytes;
//! - floats: 8 bytes, sign bit set for non-negative values, all bits
//!   inverted for negative values;
//! - strings and bytes: groups of 8 bytes, each followed by a marker byte
//!   `0xFF - padding`.

use optstats_error::{Result, StatsError};

use crate::datum::Datum;

pub const NIL_FLAG: u8 = 0;
pub const BYTES_FLAG: u8 = 1;
pub const INT_FLAG: u8 = 3;
pub const UINT_FLAG: u8 = 4;
pub const FLOAT_FLAG: u8 = 5;
pub const MAX_FLAG: u8 = 250;

/// Encoded form of a single NULL.
pub const NULL_KEY: [u8; 1] = [NIL_FLAG];

const SIGN_MASK: u64 = 0x8000_0000_0000_0000;
const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xFF;
const ENC_PAD: u8 = 0x00;

/// Append the key encoding of `values` to `buf`.
///
/// # Errors
///
/// Fails for NaN floats, which have no position in the key order. `buf` may
/// hold a partial encoding on error.
pub fn encode_key(buf: &mut Vec<u8>, values: &[Datum]) -> Result<()> {
    for value in values {
        encode_one(buf, value)?;
    }
    Ok(())
}

/// Encode `values` into a fresh buffer.
///
/// # Errors
///
/// See [`encode_key`].
pub fn encode_key_to_vec(values: &[Datum]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(values.len() * 9);
    encode_key(&mut buf, values)?;
    Ok(buf)
}

fn encode_one(buf: &mut Vec<u8>, value: &Datum) -> Result<()> {
    match value {
        Datum::Null => buf.push(NIL_FLAG),
        Datum::MinNotNull => buf.push(BYTES_FLAG),
        Datum::MaxValue => buf.push(MAX_FLAG),
        Datum::Int(v) => {
            buf.push(INT_FLAG);
            buf.extend_from_slice(&((*v as u64) ^ SIGN_MASK).to_be_bytes());
        }
        Datum::Uint(v) => {
            buf.push(UINT_FLAG);
            buf.extend_from_slice(&v.to_be_bytes());
        }
        Datum::Float(v) => {
            if v.is_nan() {
                return Err(StatsError::encode("float", "NaN has no key order"));
            }
            buf.push(FLOAT_FLAG);
            buf.extend_from_slice(&encode_float(*v).to_be_bytes());
        }
        Datum::String(s) => {
            buf.push(BYTES_FLAG);
            encode_bytes(buf, s.as_bytes());
        }
        Datum::Bytes(b) => {
            buf.push(BYTES_FLAG);
            encode_bytes(buf, b);
        }
    }
    Ok(())
}

fn encode_float(v: f64) -> u64 {
    let bits = v.to_bits();
    if v >= 0.0 { bits | SIGN_MASK } else { !bits }
}

fn decode_float(u: u64) -> f64 {
    if u & SIGN_MASK > 0 {
        f64::from_bits(u & !SIGN_MASK)
    } else {
        f64::from_bits(!u)
    }
}

fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let groups = data.len() / ENC_GROUP_SIZE + 1;
    buf.reserve(groups * (ENC_GROUP_SIZE + 1));
    let mut idx = 0;
    loop {
        let remain = data.len() - idx;
        if remain >= ENC_GROUP_SIZE {
            buf.extend_from_slice(&data[idx..idx + ENC_GROUP_SIZE]);
            buf.push(ENC_MARKER);
            idx += ENC_GROUP_SIZE;
        } else {
            let pad = ENC_GROUP_SIZE - remain;
            buf.extend_from_slice(&data[idx..]);
            buf.extend(std::iter::repeat_n(ENC_PAD, pad));
            buf.push(ENC_MARKER - pad as u8);
            return;
        }
    }
}

fn decode_bytes(input: &[u8], base: usize) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let group = input
            .get(pos..pos + ENC_GROUP_SIZE + 1)
            .ok_or_else(|| StatsError::decode(base + pos, "truncated bytes group"))?;
        let marker = group[ENC_GROUP_SIZE];
        let pad = usize::from(ENC_MARKER - marker);
        if pad > ENC_GROUP_SIZE {
            return Err(StatsError::decode(
                base + pos + ENC_GROUP_SIZE,
                format!("invalid group marker {marker:#04x}"),
            ));
        }
        let real = ENC_GROUP_SIZE - pad;
        out.extend_from_slice(&group[..real]);
        pos += ENC_GROUP_SIZE + 1;
        if pad != 0 {
            if group[real..ENC_GROUP_SIZE].iter().any(|&b| b != ENC_PAD) {
                return Err(StatsError::decode(base + pos, "non-zero padding"));
            }
            return Ok((out, pos));
        }
    }
}

fn read_u64(input: &[u8], base: usize) -> Result<u64> {
    let raw: [u8; 8] = input
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| StatsError::decode(base, "truncated 8-byte value"))?;
    Ok(u64::from_be_bytes(raw))
}

/// Decode the first value of `key`, returning it and the unread suffix.
///
/// Strings come back as [`Datum::Bytes`].
///
/// # Errors
///
/// Fails on an unknown flag or a truncated body.
pub fn decode_one(key: &[u8]) -> Result<(Datum, &[u8])> {
    let (&flag, body) = key
        .split_first()
        .ok_or_else(|| StatsError::decode(0, "empty key"))?;
    match flag {
        NIL_FLAG => Ok((Datum::Null, body)),
        MAX_FLAG => Ok((Datum::MaxValue, body)),
        INT_FLAG => Ok((Datum::Int((read_u64(body, 1)? ^ SIGN_MASK) as i64), &body[8..])),
        UINT_FLAG => Ok((Datum::Uint(read_u64(body, 1)?), &body[8..])),
        FLOAT_FLAG => Ok((Datum::Float(decode_float(read_u64(body, 1)?)), &body[8..])),
        BYTES_FLAG if body.is_empty() => Ok((Datum::MinNotNull, body)),
        BYTES_FLAG => {
            let (bytes, used) = decode_bytes(body, 1)?;
            Ok((Datum::Bytes(bytes), &body[used..]))
        }
        other => Err(StatsError::decode(0, format!("unknown flag {other}"))),
    }
}

/// Decode every value of `key`.
///
/// # Errors
///
/// See [`decode_one`].
pub fn decode_all(mut key: &[u8]) -> Result<Vec<Datum>> {
    let mut values = Vec::new();
    while !key.is_empty() {
        let (value, rest) = decode_one(key)?;
        values.push(value);
        key = rest;
    }
    Ok(values)
}

/// Smallest key greater than every key prefixed by `key`.
#[must_use]
pub fn prefix_next(key: &[u8]) -> Vec<u8> {
    let mut buf = key.to_vec();
    for i in (0..buf.len()).rev() {
        buf[i] = buf[i].wrapping_add(1);
        if buf[i] != 0 {
            return buf;
        }
    }
    // All bytes were 0xFF.
    let mut buf = key.to_vec();
    buf.push(0);
    buf
}
