//! Cursor-based little-endian reader over an immutable byte buffer.
//!
//! Every read is bounds-checked; running off the end of the buffer yields
//! [`DecodeError::TruncatedData`] carrying the absolute file offset, never a
//! panic.

use winnow::Parser;
use winnow::binary::{le_f32, le_f64, le_i16, le_i32, le_i64, le_u8, le_u16, le_u32, le_u64};
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;

use crate::error::{DecodeError, DecodeResult};

type WResult<T> = Result<T, ErrMode<ContextError>>;

#[derive(Debug, Clone, Copy)]
pub struct BinaryStream<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` within the file this stream was cut from.
    base: usize,
}

impl<'a> BinaryStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position, relative to the start of this stream.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Absolute file offset of the cursor.
    pub fn absolute_offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    fn truncated(&self, at: usize, need: usize) -> DecodeError {
        DecodeError::TruncatedData {
            offset: self.base + at,
            need,
            available: self.data.len().saturating_sub(at),
        }
    }

    pub fn seek(&mut self, offset: usize) -> DecodeResult<()> {
        if offset > self.data.len() {
            return Err(self.truncated(offset, 0));
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> DecodeResult<()> {
        if count > self.remaining() {
            return Err(self.truncated(self.pos, count));
        }
        self.pos += count;
        Ok(())
    }

    /// A new stream over `len` bytes starting at `offset` of this stream.
    pub fn sub_stream(&self, offset: usize, len: usize) -> DecodeResult<BinaryStream<'a>> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.truncated(offset, len))?;
        Ok(BinaryStream::with_base(
            &self.data[offset..end],
            self.base + offset,
        ))
    }

    /// A new stream over everything from `offset` to the end of this stream.
    pub fn tail(&self, offset: usize) -> DecodeResult<BinaryStream<'a>> {
        if offset > self.data.len() {
            return Err(self.truncated(offset, 0));
        }
        Ok(BinaryStream::with_base(&self.data[offset..], self.base + offset))
    }

    fn read_with<T>(
        &mut self,
        need: usize,
        parser: impl FnOnce(&mut &'a [u8]) -> WResult<T>,
    ) -> DecodeResult<T> {
        let mut input = &self.data[self.pos..];
        let before = input.len();
        match parser(&mut input) {
            Ok(value) => {
                self.pos += before - input.len();
                Ok(value)
            }
            Err(_) => Err(self.truncated(self.pos, need)),
        }
    }

    fn peek_with<T>(
        &mut self,
        need: usize,
        parser: impl FnOnce(&mut &'a [u8]) -> WResult<T>,
    ) -> DecodeResult<T> {
        let saved = self.pos;
        let value = self.read_with(need, parser);
        self.pos = saved;
        value
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        self.read_with(1, |i| le_u8.parse_next(i))
    }

    pub fn read_i8(&mut self) -> DecodeResult<i8> {
        self.read_u8().map(|v| v as i8)
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.read_with(2, |i| le_u16.parse_next(i))
    }

    pub fn read_i16(&mut self) -> DecodeResult<i16> {
        self.read_with(2, |i| le_i16.parse_next(i))
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.read_with(4, |i| le_u32.parse_next(i))
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.read_with(4, |i| le_i32.parse_next(i))
    }

    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        self.read_with(8, |i| le_u64.parse_next(i))
    }

    pub fn read_i64(&mut self) -> DecodeResult<i64> {
        self.read_with(8, |i| le_i64.parse_next(i))
    }

    pub fn read_f32(&mut self) -> DecodeResult<f32> {
        self.read_with(4, |i| le_f32.parse_next(i))
    }

    pub fn read_f64(&mut self) -> DecodeResult<f64> {
        self.read_with(8, |i| le_f64.parse_next(i))
    }

    /// IEEE 754 half-precision float.
    pub fn read_f16(&mut self) -> DecodeResult<f32> {
        let bits = self.read_u16()?;
        Ok(half::f16::from_bits(bits).to_f32())
    }

    /// Signed normalized 16-bit value mapped to `[-1.0, 1.0]`.
    pub fn read_sn16(&mut self) -> DecodeResult<f32> {
        Ok(self.read_i16()? as f32 / 32767.0)
    }

    /// Unsigned normalized 16-bit value mapped to `[0.0, 1.0]`.
    pub fn read_un16(&mut self) -> DecodeResult<f32> {
        Ok(self.read_u16()? as f32 / 65535.0)
    }

    /// Unsigned normalized 8-bit value mapped to `[0.0, 1.0]`.
    pub fn read_un8(&mut self) -> DecodeResult<f32> {
        Ok(self.read_u8()? as f32 / 255.0)
    }

    pub fn peek_u8(&mut self) -> DecodeResult<u8> {
        self.peek_with(1, |i| le_u8.parse_next(i))
    }

    pub fn peek_u32(&mut self) -> DecodeResult<u32> {
        self.peek_with(4, |i| le_u32.parse_next(i))
    }

    pub fn read_bytes(&mut self, count: usize) -> DecodeResult<&'a [u8]> {
        self.read_with(count, |i| take(count).parse_next(i))
    }

    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Everything from the cursor to the end of the stream.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    fn decode_utf8(&self, start: usize, bytes: &'a [u8]) -> DecodeResult<String> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidString {
                offset: self.base + start,
            })
    }

    /// String prefixed by a `u32` byte length.
    pub fn read_string(&mut self) -> DecodeResult<String> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        self.decode_utf8(start, bytes)
    }

    /// LEB128-style variable-length unsigned integer (7 bits per byte).
    pub fn read_7bit(&mut self) -> DecodeResult<u32> {
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 32 {
                value |= ((byte & 0x7F) as u32) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// String prefixed by a 7-bit encoded byte length.
    pub fn read_7bit_string(&mut self) -> DecodeResult<String> {
        let start = self.pos;
        let len = self.read_7bit()? as usize;
        let bytes = self.read_bytes(len)?;
        self.decode_utf8(start, bytes)
    }
}
