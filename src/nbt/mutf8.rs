//! Java "modified UTF-8" as used by NBT string payloads.
//!
//! Differs from standard UTF-8 in two ways: U+0000 is written as the two-byte
//! sequence `C0 80`, and characters outside the BMP are written as a pair of
//! three-byte surrogate encodings instead of one four-byte sequence.
//!
//! Strings read from a file keep their exact bytes in [`Mutf8String`]. Java
//! writers emit lone surrogates, and other writers emit four-byte sequences,
//! overlong forms or raw NUL bytes. None of these survive a trip through a
//! Rust `String`, so the decoded text is only used for lookups and display.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mutf8Error {
    pub offset: usize,
    pub reason: &'static str,
}

impl fmt::Display for Mutf8Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.reason, self.offset)
    }
}

impl std::error::Error for Mutf8Error {}

/// A string as stored on disk, together with its decoded text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mutf8String {
    bytes: Vec<u8>,
    text: String,
}

impl Mutf8String {
    /// Keeps `bytes` verbatim. Fails only on sequences no writer produces:
    /// truncated sequences, stray continuation bytes and invalid lead bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Mutf8Error> {
        let text = decode(&bytes)?;
        Ok(Self { bytes, text })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decoded text. Lone surrogates read as U+FFFD.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<&str> for Mutf8String {
    fn from(text: &str) -> Self {
        Self {
            bytes: encode(text),
            text: text.to_string(),
        }
    }
}

impl From<String> for Mutf8String {
    fn from(text: String) -> Self {
        Self {
            bytes: encode(&text),
            text,
        }
    }
}

impl fmt::Display for Mutf8String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Decodes leniently: NUL bytes, overlong two-byte forms and four-byte UTF-8
/// are accepted, and unpaired surrogates become U+FFFD.
pub fn decode(bytes: &[u8]) -> Result<String, Mutf8Error> {
    if bytes.iter().all(|&b| b < 0x80) {
        return Ok(bytes.iter().map(|&b| b as char).collect());
    }

    let mut out = String::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            out.push(b0 as char);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            let cp = (u32::from(b0 & 0x1F) << 6) | u32::from(b1);
            out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let unit = three_byte_unit(bytes, i)?;
            i += 3;
            if (0xD800..=0xDBFF).contains(&unit) && starts_low_surrogate(bytes, i) {
                let low = three_byte_unit(bytes, i)?;
                let cp = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
                i += 3;
            } else {
                // Lone surrogates have no `char`.
                out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
        } else if b0 & 0xF8 == 0xF0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            let b3 = continuation(bytes, i + 3)?;
            let cp = (u32::from(b0 & 0x07) << 18)
                | (u32::from(b1) << 12)
                | (u32::from(b2) << 6)
                | u32::from(b3);
            out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
            i += 4;
        } else {
            return Err(Mutf8Error {
                offset: i,
                reason: "invalid lead byte",
            });
        }
    }
    Ok(out)
}

pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let cp = ch as u32;
        match cp {
            0x01..=0x7F => out.push(cp as u8),
            0x00 | 0x80..=0x7FF => {
                out.push(0xC0 | (cp >> 6) as u8);
                out.push(0x80 | (cp & 0x3F) as u8);
            }
            0x800..=0xFFFF => push_three_byte_unit(&mut out, cp),
            _ => {
                let v = cp - 0x10000;
                push_three_byte_unit(&mut out, 0xD800 + (v >> 10));
                push_three_byte_unit(&mut out, 0xDC00 + (v & 0x3FF));
            }
        }
    }
    out
}

fn continuation(bytes: &[u8], at: usize) -> Result<u8, Mutf8Error> {
    match bytes.get(at) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        Some(_) => Err(Mutf8Error {
            offset: at,
            reason: "expected continuation byte",
        }),
        None => Err(Mutf8Error {
            offset: at,
            reason: "truncated sequence",
        }),
    }
}

fn starts_low_surrogate(bytes: &[u8], at: usize) -> bool {
    matches!(bytes.get(at..at + 2), Some([0xED, b1]) if (0xB0..=0xBF).contains(b1))
}

fn three_byte_unit(bytes: &[u8], at: usize) -> Result<u32, Mutf8Error> {
    let b0 = bytes[at];
    let b1 = continuation(bytes, at + 1)?;
    let b2 = continuation(bytes, at + 2)?;
    Ok((u32::from(b0 & 0x0F) << 12) | (u32::from(b1) << 6) | u32::from(b2))
}

fn push_three_byte_unit(out: &mut Vec<u8>, unit: u32) {
    out.push(0xE0 | (unit >> 12) as u8);
    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
    out.push(0x80 | (unit & 0x3F) as u8);
}
