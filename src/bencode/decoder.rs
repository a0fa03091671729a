use super::{BencodeDict, BencodeValue};
use crate::error::{BittorrentError, Result};

/// Deepest list/dictionary nesting accepted
pub const MAX_DEPTH: usize = 512;

/// Decode one bencoded value from the front of `data`.
///
/// Returns the value and the number of bytes it occupied; anything after
/// that is left untouched.
pub fn decode(data: &[u8]) -> Result<(BencodeValue, usize)> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    Ok((value, pos))
}

/// Decode a buffer that must hold exactly one bencoded value
pub fn decode_all(data: &[u8]) -> Result<BencodeValue> {
    let (value, consumed) = decode(data)?;
    if consumed != data.len() {
        return Err(BittorrentError::malformed(
            consumed,
            format!("{} trailing byte(s) after value", data.len() - consumed),
        ));
    }
    Ok(value)
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    if *pos >= data.len() {
        return Err(BittorrentError::malformed(*pos, "unexpected end of input"));
    }

    match data[*pos] {
        b'i' => decode_integer(data, pos),
        b'l' | b'd' if depth >= MAX_DEPTH => Err(BittorrentError::malformed(
            *pos,
            format!("nesting deeper than {} levels", MAX_DEPTH),
        )),
        b'l' => decode_list(data, pos, depth + 1),
        b'd' => decode_dict(data, pos, depth + 1),
        b'0'..=b'9' => decode_string(data, pos).map(BencodeValue::String),
        c => Err(BittorrentError::malformed(
            *pos,
            format!("unrecognized token {:?}", c as char),
        )),
    }
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<BencodeValue> {
    let token_start = *pos;
    *pos += 1; // Skip 'i'

    let start = *pos;
    while *pos < data.len() && data[*pos] != b'e' {
        *pos += 1;
    }

    if *pos >= data.len() {
        return Err(BittorrentError::malformed(token_start, "unterminated integer"));
    }

    let digits = &data[start..*pos];
    let magnitude = digits.strip_prefix(b"-").unwrap_or(digits);
    let canonical = is_canonical_number(magnitude) && digits != &b"-0"[..];

    let num = std::str::from_utf8(digits)
        .ok()
        .filter(|_| canonical)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| BittorrentError::malformed(start, "invalid integer"))?;

    *pos += 1; // Skip 'e'

    Ok(BencodeValue::Integer(num))
}

fn decode_string(data: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let start = *pos;
    while *pos < data.len() && data[*pos].is_ascii_digit() {
        *pos += 1;
    }

    if *pos >= data.len() || data[*pos] != b':' {
        return Err(BittorrentError::malformed(*pos, "expected ':' after string length"));
    }

    let digits = &data[start..*pos];
    let len = std::str::from_utf8(digits)
        .ok()
        .filter(|_| is_canonical_number(digits))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| BittorrentError::malformed(start, "invalid string length"))?;

    *pos += 1; // Skip ':'

    let remaining = data.len() - *pos;
    if len > remaining {
        return Err(BittorrentError::malformed(
            start,
            format!("string length {} exceeds remaining {} byte(s)", len, remaining),
        ));
    }

    let string = data[*pos..*pos + len].to_vec();
    *pos += len;

    Ok(string)
}

/// Plain decimal digits with no leading zero, other than "0" itself
fn is_canonical_number(digits: &[u8]) -> bool {
    match digits {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        _ => digits.iter().all(u8::is_ascii_digit),
    }
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    let token_start = *pos;
    *pos += 1; // Skip 'l'

    let mut list = Vec::new();

    while *pos < data.len() && data[*pos] != b'e' {
        list.push(decode_value(data, pos, depth)?);
    }

    if *pos >= data.len() {
        return Err(BittorrentError::malformed(token_start, "unterminated list"));
    }

    *pos += 1; // Skip 'e'

    Ok(BencodeValue::List(list))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    let token_start = *pos;
    *pos += 1; // Skip 'd'

    let mut dict = BencodeDict::new();

    while *pos < data.len() && data[*pos] != b'e' {
        let key_start = *pos;
        if !data[*pos].is_ascii_digit() {
            return Err(BittorrentError::malformed(
                key_start,
                "dictionary key must be a byte string",
            ));
        }
        let key = decode_string(data, pos)?;

        if dict.contains_key(&key) {
            return Err(BittorrentError::malformed(
                key_start,
                format!("duplicate dictionary key {:?}", String::from_utf8_lossy(&key)),
            ));
        }

        let value = decode_value(data, pos, depth)?;
        dict.insert(key, value);
    }

    if *pos >= data.len() {
        return Err(BittorrentError::malformed(token_start, "unterminated dictionary"));
    }

    *pos += 1; // Skip 'e'

    Ok(BencodeValue::Dict(dict))
}
