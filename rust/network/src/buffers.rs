// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary record codec over raw byte buffers.
//!
//! Mutable structures are serialized into compact, immutable byte buffers
//! that can be handed to other threads without copying object graphs.
//!
//! Layouts (all integers little-endian `u32`, coordinates `f64`):
//!
//! - fixed-size: `[count][custom header][record 0]..[record count-1]`
//! - variable-size: a data buffer `[count][record 0][record 1]..` plus an
//!   offset table (no header) holding one `u32` byte offset per record.
//!
//! [`BufferKind`] selects the allocator for every builder. `Array` buffers are
//! plain heap slices; `Shared` buffers are reference-counted [`Bytes`] whose
//! clones all point at the same memory.

use std::marker::PhantomData;
use std::ops::Deref;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::geometry::{Bounds, Position};

/// Size of an encoded `u32`.
pub const U32_SIZE: usize = 4;
/// Size of an encoded type code.
pub const U8_SIZE: usize = 1;
/// Size of an encoded `f64`.
pub const F64_SIZE: usize = 8;

// --- Raw storage ---

/// Allocation strategy for encoded buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Ordinary heap memory owned by one thread at a time.
    Array,
    /// Reference-counted memory that many workers can read at once.
    #[default]
    Shared,
}

impl BufferKind {
    /// Parses `"array"` or `"shared"` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "array" => Some(BufferKind::Array),
            "shared" => Some(BufferKind::Shared),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BufferKind::Array => "array",
            BufferKind::Shared => "shared",
        }
    }
}

/// An encoded, immutable byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryData {
    Array(Box<[u8]>),
    Shared(Bytes),
}

impl BinaryData {
    pub fn kind(&self) -> BufferKind {
        match self {
            BinaryData::Array(_) => BufferKind::Array,
            BinaryData::Shared(_) => BufferKind::Shared,
        }
    }
}

impl Deref for BinaryData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            BinaryData::Array(bytes) => bytes,
            BinaryData::Shared(bytes) => bytes,
        }
    }
}

/// Zero-filled writable storage, frozen into [`BinaryData`] on finalize.
#[derive(Debug)]
pub(crate) enum RawBuffer {
    Array(Vec<u8>),
    Shared(BytesMut),
}

impl RawBuffer {
    pub(crate) fn zeroed(size: usize, kind: BufferKind) -> Self {
        match kind {
            BufferKind::Array => RawBuffer::Array(vec![0; size]),
            BufferKind::Shared => RawBuffer::Shared(BytesMut::zeroed(size)),
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            RawBuffer::Array(bytes) => bytes,
            RawBuffer::Shared(bytes) => bytes,
        }
    }

    pub(crate) fn freeze(self) -> BinaryData {
        match self {
            RawBuffer::Array(bytes) => BinaryData::Array(bytes.into_boxed_slice()),
            RawBuffer::Shared(bytes) => BinaryData::Shared(bytes.freeze()),
        }
    }
}

/// Reads the little-endian `u32` at `offset`.
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut slot = &bytes[offset..offset + U32_SIZE];
    slot.get_u32_le()
}

/// Writes `value` as a little-endian `u32` at `offset`.
pub fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    let mut slot = &mut bytes[offset..offset + U32_SIZE];
    slot.put_u32_le(value);
}

/// Reads the little-endian `f64` at `offset`.
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    let mut slot = &bytes[offset..offset + F64_SIZE];
    slot.get_f64_le()
}

pub(crate) fn require_len(bytes: &[u8], needed: usize, what: &str) -> Result<()> {
    if bytes.len() < needed {
        return Err(Error::MalformedBuffer(format!(
            "{what} needs {needed} bytes, buffer holds {}",
            bytes.len()
        )));
    }
    Ok(())
}

// --- Record codecs ---

/// A record with a constant encoded size.
pub trait FixedRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn encode<B: BufMut>(&self, buf: &mut B);

    fn decode<B: Buf>(buf: &mut B) -> Self;
}

/// A record whose encoded size depends on its content.
pub trait VariableRecord: Sized {
    /// Encoded size in bytes, computed before the record is written.
    fn encoded_size(&self) -> usize;

    /// Size claimed by the record stored at the start of `bytes`, or `None`
    /// when its own header does not fit.
    fn stored_size(bytes: &[u8]) -> Option<usize>;

    fn encode<B: BufMut>(&self, buf: &mut B);

    fn decode<B: Buf>(buf: &mut B) -> Self;
}

impl FixedRecord for u32 {
    const SIZE: usize = U32_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(*self);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        buf.get_u32_le()
    }
}

impl FixedRecord for u8 {
    const SIZE: usize = U8_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(*self);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        buf.get_u8()
    }
}

impl FixedRecord for [u32; 2] {
    const SIZE: usize = 2 * U32_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self[0]);
        buf.put_u32_le(self[1]);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        [buf.get_u32_le(), buf.get_u32_le()]
    }
}

impl FixedRecord for Position {
    const SIZE: usize = 2 * F64_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.x);
        buf.put_f64_le(self.y);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        let x = buf.get_f64_le();
        let y = buf.get_f64_le();
        Position::new(x, y)
    }
}

impl FixedRecord for Bounds {
    const SIZE: usize = 4 * F64_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.min_x);
        buf.put_f64_le(self.min_y);
        buf.put_f64_le(self.max_x);
        buf.put_f64_le(self.max_y);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        let min_x = buf.get_f64_le();
        let min_y = buf.get_f64_le();
        let max_x = buf.get_f64_le();
        let max_y = buf.get_f64_le();
        Bounds::new(min_x, min_y, max_x, max_y)
    }
}

/// A list of ids encoded as `[len][id 0]..[id len-1]`.
impl VariableRecord for Vec<u32> {
    fn encoded_size(&self) -> usize {
        U32_SIZE * (1 + self.len())
    }

    fn stored_size(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < U32_SIZE {
            return None;
        }
        let len = read_u32(bytes, 0) as usize;
        len.checked_add(1)?.checked_mul(U32_SIZE)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.len() as u32);
        for id in self {
            buf.put_u32_le(*id);
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        let len = buf.get_u32_le() as usize;
        (0..len).map(|_| buf.get_u32_le()).collect()
    }
}

// --- Fixed-size buffers ---

/// Writes `count` fixed-size records after a count header and an optional
/// custom header.
#[derive(Debug)]
pub struct FixedSizeBufferBuilder<T> {
    raw: RawBuffer,
    count: usize,
    header_size: usize,
    next: usize,
    _record: PhantomData<fn(&T)>,
}

impl<T: FixedRecord> FixedSizeBufferBuilder<T> {
    /// Allocates a zeroed buffer for `count` records.
    pub fn new(count: usize, kind: BufferKind) -> Self {
        Self::with_header(count, kind, &[])
    }

    /// Allocates a zeroed buffer for `count` records, writing `header`
    /// right after the count.
    pub fn with_header(count: usize, kind: BufferKind, header: &[u8]) -> Self {
        let header_size = header.len();
        let total = U32_SIZE + header_size + count * T::SIZE;
        let mut raw = RawBuffer::zeroed(total, kind);
        let bytes = raw.as_mut_slice();
        write_u32(bytes, 0, count as u32);
        bytes[U32_SIZE..U32_SIZE + header_size].copy_from_slice(header);
        Self {
            raw,
            count,
            header_size,
            next: 0,
            _record: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Appends a record after the last appended one.
    pub fn add(&mut self, record: &T) -> Result<()> {
        self.add_at_index(self.next, record)?;
        self.next += 1;
        Ok(())
    }

    /// Writes a record at `index`. Unwritten slots stay zeroed.
    pub fn add_at_index(&mut self, index: usize, record: &T) -> Result<()> {
        if index >= self.count {
            return Err(Error::out_of_bounds(index, self.count));
        }
        let offset = U32_SIZE + self.header_size + index * T::SIZE;
        let mut slot = &mut self.raw.as_mut_slice()[offset..offset + T::SIZE];
        record.encode(&mut slot);
        Ok(())
    }

    pub fn finalize(self) -> BinaryData {
        self.raw.freeze()
    }
}

/// Read-only access to a buffer written by [`FixedSizeBufferBuilder`].
#[derive(Debug, Clone)]
pub struct FixedSizeBufferView<T> {
    data: BinaryData,
    count: usize,
    header_size: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: FixedRecord> FixedSizeBufferView<T> {
    pub fn new(data: BinaryData) -> Result<Self> {
        Self::with_header(data, 0)
    }

    /// Opens a buffer carrying a custom header of `header_size` bytes.
    pub fn with_header(data: BinaryData, header_size: usize) -> Result<Self> {
        require_len(&data, U32_SIZE + header_size, "fixed-size buffer header")?;
        let count = read_u32(&data, 0) as usize;
        require_len(
            &data,
            U32_SIZE + header_size + count * T::SIZE,
            "fixed-size buffer records",
        )?;
        Ok(Self {
            data,
            count,
            header_size,
            _record: PhantomData,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The custom header bytes.
    pub fn header(&self) -> &[u8] {
        &self.data[U32_SIZE..U32_SIZE + self.header_size]
    }

    /// Decodes the record at `index`.
    pub fn get_by_id(&self, index: usize) -> Result<T> {
        if index >= self.count {
            return Err(Error::out_of_bounds(index, self.count));
        }
        let offset = U32_SIZE + self.header_size + index * T::SIZE;
        let mut slot = &self.data[offset..offset + T::SIZE];
        Ok(T::decode(&mut slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.enumerate().map(|(_, record)| record)
    }

    pub fn enumerate(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        (0..self.count).filter_map(move |i| self.get_by_id(i).ok().map(|r| (i, r)))
    }

    pub fn data(&self) -> &BinaryData {
        &self.data
    }
}

// --- Variable-size buffers ---

/// Data buffer and offset table produced by [`VariableSizeBufferBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedBuffer {
    pub data: BinaryData,
    pub index: BinaryData,
}

/// Writes `count` variable-size records plus an offset table.
#[derive(Debug)]
pub struct VariableSizeBufferBuilder<T> {
    data: RawBuffer,
    index: RawBuffer,
    count: usize,
    next: usize,
    offset: usize,
    _record: PhantomData<fn(&T)>,
}

impl<T: VariableRecord> VariableSizeBufferBuilder<T> {
    /// Allocates buffers for `count` records totalling `data_size` bytes.
    pub fn new(count: usize, data_size: usize, kind: BufferKind) -> Self {
        let mut data = RawBuffer::zeroed(U32_SIZE + data_size, kind);
        write_u32(data.as_mut_slice(), 0, count as u32);
        Self {
            data,
            index: RawBuffer::zeroed(count * U32_SIZE, kind),
            count,
            next: 0,
            offset: U32_SIZE,
            _record: PhantomData,
        }
    }

    /// Sizes the buffers for exactly these records.
    pub fn for_records<'a>(records: impl IntoIterator<Item = &'a T>, kind: BufferKind) -> Self
    where
        T: 'a,
    {
        let (count, size) = records
            .into_iter()
            .fold((0, 0), |(count, size), r| (count + 1, size + r.encoded_size()));
        Self::new(count, size, kind)
    }

    /// Appends a record and records its offset.
    pub fn add(&mut self, record: &T) -> Result<()> {
        if self.next >= self.count {
            return Err(Error::out_of_bounds(self.next, self.count));
        }
        let size = record.encoded_size();
        let data = self.data.as_mut_slice();
        if self.offset + size > data.len() {
            return Err(Error::MalformedBuffer(format!(
                "record {} needs {size} bytes at offset {}, data buffer holds {}",
                self.next,
                self.offset,
                data.len()
            )));
        }
        let mut slot = &mut data[self.offset..self.offset + size];
        record.encode(&mut slot);
        write_u32(
            self.index.as_mut_slice(),
            self.next * U32_SIZE,
            self.offset as u32,
        );
        self.offset += size;
        self.next += 1;
        Ok(())
    }

    pub fn finalize(self) -> IndexedBuffer {
        IndexedBuffer {
            data: self.data.freeze(),
            index: self.index.freeze(),
        }
    }
}

/// Read-only access to buffers written by [`VariableSizeBufferBuilder`].
#[derive(Debug, Clone)]
pub struct VariableSizeBufferView<T> {
    buffer: IndexedBuffer,
    count: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: VariableRecord> VariableSizeBufferView<T> {
    pub fn new(buffer: IndexedBuffer) -> Result<Self> {
        require_len(&buffer.data, U32_SIZE, "variable-size buffer header")?;
        let count = read_u32(&buffer.data, 0) as usize;
        require_len(&buffer.index, count * U32_SIZE, "variable-size offset table")?;
        let data_len = buffer.data.len();
        for i in 0..count {
            let offset = read_u32(&buffer.index, i * U32_SIZE) as usize;
            if offset < U32_SIZE || offset > data_len {
                return Err(Error::MalformedBuffer(format!(
                    "record offset {offset} outside data buffer of {data_len} bytes"
                )));
            }
            let fits = T::stored_size(&buffer.data[offset..])
                .and_then(|size| offset.checked_add(size))
                .is_some_and(|end| end <= data_len);
            if !fits {
                return Err(Error::MalformedBuffer(format!(
                    "record {i} at offset {offset} runs past data buffer of {data_len} bytes"
                )));
            }
        }
        Ok(Self {
            buffer,
            count,
            _record: PhantomData,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Decodes the record at `index`.
    pub fn get_by_id(&self, index: usize) -> Result<T> {
        if index >= self.count {
            return Err(Error::out_of_bounds(index, self.count));
        }
        let offset = read_u32(&self.buffer.index, index * U32_SIZE) as usize;
        let mut slot = &self.buffer.data[offset..];
        Ok(T::decode(&mut slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.enumerate().map(|(_, record)| record)
    }

    pub fn enumerate(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        (0..self.count).filter_map(move |i| self.get_by_id(i).ok().map(|r| (i, r)))
    }

    pub fn buffer(&self) -> &IndexedBuffer {
        &self.buffer
    }
}
