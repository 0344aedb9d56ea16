//! Named Binary Tag (NBT) documents.
//!
//! A [`Document`] is one named root compound plus the compression envelope it
//! was stored in. Compound entries keep their on-disk order and lists keep
//! their declared element type, so encoding a decoded tree reproduces the
//! original payload exactly. Saving a document whose payload has not changed
//! writes the original file bytes back verbatim, including the compressed
//! envelope.

pub mod mutf8;

pub use mutf8::Mutf8String;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TAG_END: u8 = 0;
pub const TAG_BYTE: u8 = 1;
pub const TAG_SHORT: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_LONG: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_BYTE_ARRAY: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_LIST: u8 = 9;
pub const TAG_COMPOUND: u8 = 10;
pub const TAG_INT_ARRAY: u8 = 11;
pub const TAG_LONG_ARRAY: u8 = 12;

const MAX_DEPTH: usize = 512;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZLIB_CMF: u8 = 0x78;

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("failed to access {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("corrupt NBT data at byte {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    #[error("cannot encode NBT: {0}")]
    Encode(String),
}

impl NbtError {
    fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        NbtError::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        NbtError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(Mutf8String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn id(&self) -> u8 {
        match self {
            Tag::Byte(_) => TAG_BYTE,
            Tag::Short(_) => TAG_SHORT,
            Tag::Int(_) => TAG_INT,
            Tag::Long(_) => TAG_LONG,
            Tag::Float(_) => TAG_FLOAT,
            Tag::Double(_) => TAG_DOUBLE,
            Tag::ByteArray(_) => TAG_BYTE_ARRAY,
            Tag::String(_) => TAG_STRING,
            Tag::List(_) => TAG_LIST,
            Tag::Compound(_) => TAG_COMPOUND,
            Tag::IntArray(_) => TAG_INT_ARRAY,
            Tag::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Integer value of any of the integral scalar tags.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Tag::Byte(v) => Some(i64::from(v)),
            Tag::Short(v) => Some(i64::from(v)),
            Tag::Int(v) => Some(i64::from(v)),
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        match self {
            Tag::Compound(compound) => Some(compound),
            _ => None,
        }
    }
}

/// A homogeneous list. The element id is kept even when the list is empty.
#[derive(Clone, Debug, PartialEq)]
pub struct List {
    element_id: u8,
    items: Vec<Tag>,
}

impl List {
    pub fn empty(element_id: u8) -> Self {
        Self {
            element_id,
            items: Vec::new(),
        }
    }

    pub fn new(items: Vec<Tag>) -> Result<Self, NbtError> {
        let element_id = items.first().map(Tag::id).unwrap_or(TAG_END);
        if items.iter().any(|item| item.id() != element_id) {
            return Err(NbtError::Encode("list items have mixed tag types".into()));
        }
        Ok(Self { element_id, items })
    }

    pub fn element_id(&self) -> u8 {
        self.element_id
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Named entries in on-disk order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Compound {
    entries: Vec<(Mutf8String, Tag)>,
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.entries
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, tag)| tag)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tag> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, tag)| tag)
    }

    /// Replaces an existing entry in place, or appends a new one.
    pub fn insert(&mut self, name: impl Into<Mutf8String>, tag: Tag) -> Option<Tag> {
        let name = name.into();
        match self.get_mut(name.as_str()) {
            Some(existing) => Some(std::mem::replace(existing, tag)),
            None => {
                self.entries.push((name, tag));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Tag> {
        let index = self.entries.iter().position(|(key, _)| key.as_str() == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Follows a path of nested compound names.
    pub fn path(&self, path: &[&str]) -> Option<&Tag> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for name in parents {
            current = current.get(name)?.as_compound()?;
        }
        current.get(last)
    }

    pub fn path_mut(&mut self, path: &[&str]) -> Option<&mut Tag> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for name in parents {
            current = current.get_mut(name)?.as_compound_mut()?;
        }
        current.get_mut(last)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Envelope {
    Gzip,
    Zlib,
    Uncompressed,
}

#[derive(Clone, Debug)]
struct Original {
    payload: Vec<u8>,
    raw: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Document {
    pub root_name: Mutf8String,
    pub root: Compound,
    pub envelope: Envelope,
    original: Option<Original>,
}

impl Document {
    pub fn new(root_name: impl Into<Mutf8String>, root: Compound, envelope: Envelope) -> Self {
        Self {
            root_name: root_name.into(),
            root,
            envelope,
            original: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, NbtError> {
        let raw = std::fs::read(path).map_err(|error| NbtError::io(path, error))?;
        Self::from_bytes(raw)
    }

    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, NbtError> {
        let envelope = detect_envelope(&raw)?;
        let payload = decompress(envelope, &raw)?;
        let (root_name, root) = decode_payload(&payload)?;
        Ok(Self {
            root_name,
            root,
            envelope,
            original: Some(Original { payload, raw }),
        })
    }

    /// Uncompressed binary form of the tree.
    pub fn encode_payload(&self) -> Result<Vec<u8>, NbtError> {
        let mut out = Vec::new();
        out.push(TAG_COMPOUND);
        write_string(&mut out, &self.root_name)?;
        write_compound(&mut out, &self.root, 0)?;
        Ok(out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NbtError> {
        let payload = self.encode_payload()?;
        if let Some(original) = &self.original {
            if original.payload == payload {
                return Ok(original.raw.clone());
            }
        }
        compress(self.envelope, &payload).map_err(|error| NbtError::Encode(error.to_string()))
    }

    /// Writes to a temporary sibling first so a failed write never truncates
    /// the existing file.
    pub fn save(&self, path: &Path) -> Result<(), NbtError> {
        let bytes = self.to_bytes()?;
        let tmp_path = PathBuf::from(format!("{}.tmp", path.to_string_lossy()));
        write_file_synced(&tmp_path, &bytes).map_err(|error| NbtError::io(&tmp_path, error))?;
        std::fs::rename(&tmp_path, path).map_err(|error| {
            let _ = std::fs::remove_file(&tmp_path);
            NbtError::io(path, error)
        })
    }
}

fn write_file_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
    file.sync_all()
}

fn detect_envelope(raw: &[u8]) -> Result<Envelope, NbtError> {
    match raw {
        [a, b, ..] if [*a, *b] == GZIP_MAGIC => Ok(Envelope::Gzip),
        [ZLIB_CMF, ..] => Ok(Envelope::Zlib),
        [TAG_COMPOUND, ..] => Ok(Envelope::Uncompressed),
        [] => Err(NbtError::corrupt(0, "empty file")),
        [other, ..] => Err(NbtError::corrupt(
            0,
            format!("unrecognised envelope starting with byte {other:#04x}"),
        )),
    }
}

fn decompress(envelope: Envelope, raw: &[u8]) -> Result<Vec<u8>, NbtError> {
    let mut payload = Vec::new();
    let result = match envelope {
        Envelope::Gzip => GzDecoder::new(raw).read_to_end(&mut payload),
        Envelope::Zlib => ZlibDecoder::new(raw).read_to_end(&mut payload),
        Envelope::Uncompressed => return Ok(raw.to_vec()),
    };
    result.map_err(|error| NbtError::corrupt(0, format!("{envelope:?} envelope: {error}")))?;
    Ok(payload)
}

fn compress(envelope: Envelope, payload: &[u8]) -> io::Result<Vec<u8>> {
    match envelope {
        Envelope::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            encoder.finish()
        }
        Envelope::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            encoder.finish()
        }
        Envelope::Uncompressed => Ok(payload.to_vec()),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], NbtError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| NbtError::corrupt(self.pos, "unexpected end of data"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], NbtError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, NbtError> {
        Ok(self.array::<1>()?[0])
    }

    fn i16(&mut self) -> Result<i16, NbtError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, NbtError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, NbtError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn length(&mut self) -> Result<usize, NbtError> {
        let at = self.pos;
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| NbtError::corrupt(at, format!("negative length {len}")))
    }

    fn string(&mut self) -> Result<Mutf8String, NbtError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        let at = self.pos;
        let bytes = self.take(len)?;
        Mutf8String::from_bytes(bytes.to_vec())
            .map_err(|error| NbtError::corrupt(at + error.offset, error.reason.to_string()))
    }
}

fn decode_payload(payload: &[u8]) -> Result<(Mutf8String, Compound), NbtError> {
    let mut reader = Reader {
        bytes: payload,
        pos: 0,
    };
    let root_id = reader.u8()?;
    if root_id != TAG_COMPOUND {
        return Err(NbtError::corrupt(
            0,
            format!("root tag must be a compound, found id {root_id}"),
        ));
    }
    let root_name = reader.string()?;
    let root = read_compound(&mut reader, 0)?;
    if reader.pos != payload.len() {
        return Err(NbtError::corrupt(
            reader.pos,
            format!("{} trailing bytes after root", payload.len() - reader.pos),
        ));
    }
    Ok((root_name, root))
}

fn read_compound(reader: &mut Reader<'_>, depth: usize) -> Result<Compound, NbtError> {
    let mut compound = Compound::new();
    loop {
        let id = reader.u8()?;
        if id == TAG_END {
            return Ok(compound);
        }
        let name = reader.string()?;
        let tag = read_tag(reader, id, depth + 1)?;
        compound.entries.push((name, tag));
    }
}

fn read_tag(reader: &mut Reader<'_>, id: u8, depth: usize) -> Result<Tag, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::corrupt(reader.pos, "nesting too deep"));
    }
    let tag = match id {
        TAG_BYTE => Tag::Byte(reader.u8()? as i8),
        TAG_SHORT => Tag::Short(reader.i16()?),
        TAG_INT => Tag::Int(reader.i32()?),
        TAG_LONG => Tag::Long(reader.i64()?),
        TAG_FLOAT => Tag::Float(f32::from_bits(u32::from_be_bytes(reader.array()?))),
        TAG_DOUBLE => Tag::Double(f64::from_bits(u64::from_be_bytes(reader.array()?))),
        TAG_BYTE_ARRAY => {
            let len = reader.length()?;
            Tag::ByteArray(reader.take(len)?.iter().map(|&b| b as i8).collect())
        }
        TAG_STRING => Tag::String(reader.string()?),
        TAG_LIST => {
            let element_id = reader.u8()?;
            let len = reader.length()?;
            if element_id == TAG_END && len > 0 {
                return Err(NbtError::corrupt(reader.pos, "non-empty list of end tags"));
            }
            // Every element needs at least one byte; reject absurd lengths
            // before allocating.
            if len > reader.bytes.len() - reader.pos {
                return Err(NbtError::corrupt(reader.pos, "list longer than data"));
            }
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_tag(reader, element_id, depth + 1)?);
            }
            Tag::List(List { element_id, items })
        }
        TAG_COMPOUND => Tag::Compound(read_compound(reader, depth)?),
        TAG_INT_ARRAY => {
            let len = reader.length()?;
            let bytes = reader.take(len.saturating_mul(4))?;
            Tag::IntArray(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            )
        }
        TAG_LONG_ARRAY => {
            let len = reader.length()?;
            let bytes = reader.take(len.saturating_mul(8))?;
            Tag::LongArray(
                bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            )
        }
        other => {
            return Err(NbtError::corrupt(
                reader.pos.saturating_sub(1),
                format!("unknown tag id {other}"),
            ))
        }
    };
    Ok(tag)
}

fn write_string(out: &mut Vec<u8>, text: &Mutf8String) -> Result<(), NbtError> {
    let bytes = text.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| NbtError::Encode(format!("string of {} bytes is too long", bytes.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_length(out: &mut Vec<u8>, len: usize) -> Result<(), NbtError> {
    let len = i32::try_from(len)
        .map_err(|_| NbtError::Encode(format!("array of {len} elements is too long")))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_compound(out: &mut Vec<u8>, compound: &Compound, depth: usize) -> Result<(), NbtError> {
    for (name, tag) in &compound.entries {
        out.push(tag.id());
        write_string(out, name)?;
        write_tag(out, tag, depth + 1)?;
    }
    out.push(TAG_END);
    Ok(())
}

fn write_tag(out: &mut Vec<u8>, tag: &Tag, depth: usize) -> Result<(), NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::Encode("nesting too deep".into()));
    }
    match tag {
        Tag::Byte(v) => out.push(*v as u8),
        Tag::Short(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Tag::Double(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Tag::ByteArray(values) => {
            write_length(out, values.len())?;
            out.extend(values.iter().map(|&b| b as u8));
        }
        Tag::String(text) => write_string(out, text)?,
        Tag::List(list) => {
            if list.items.iter().any(|item| item.id() != list.element_id) {
                return Err(NbtError::Encode("list items have mixed tag types".into()));
            }
            out.push(list.element_id);
            write_length(out, list.items.len())?;
            for item in &list.items {
                write_tag(out, item, depth + 1)?;
            }
        }
        Tag::Compound(compound) => write_compound(out, compound, depth)?,
        Tag::IntArray(values) => {
            write_length(out, values.len())?;
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        Tag::LongArray(values) => {
            write_length(out, values.len())?;
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    Ok(())
}
