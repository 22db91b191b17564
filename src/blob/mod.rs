//! Pooled binary buffers with a read/write cursor.
//!
//! [`BinaryBlob`] is the unit every codec writes into and reads from: a
//! growable byte buffer backed by `bytes::BytesMut` with an independent read
//! cursor. Writes always append; reads advance the cursor and fail cleanly
//! when they would run past the end.
//!
//! Blobs are normally leased from a [`BlobPool`] and return their storage to
//! the pool when dropped, so release happens exactly once without any manual
//! bookkeeping on the consuming side.
//!
//! All multi-byte integers are Big Endian. Strings are a 4-byte length prefix
//! followed by UTF-8 bytes.

mod pool;

pub use pool::BlobPool;

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, WirebusError};
use pool::PoolShared;

/// A growable byte buffer with separate read and write positions.
///
/// Created standalone via [`BinaryBlob::with_capacity`] or leased from a
/// [`BlobPool`]. Pool-leased blobs give their storage back on drop.
pub struct BinaryBlob {
    buf: BytesMut,
    read_pos: usize,
    home: Option<Arc<PoolShared>>,
}

impl BinaryBlob {
    /// Create a standalone blob that is not attached to any pool.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            read_pos: 0,
            home: None,
        }
    }

    pub(crate) fn pooled(buf: BytesMut, home: Arc<PoolShared>) -> Self {
        Self {
            buf,
            read_pos: 0,
            home: Some(home),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left between the read cursor and the end of the written data.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.read_pos
    }

    /// All written bytes, independent of the read cursor.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Reset the read cursor to the first byte.
    pub fn jump_to_begin(&mut self) {
        self.read_pos = 0;
    }

    fn take(&mut self, needed: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if available < needed {
            return Err(WirebusError::BlobExhausted { needed, available });
        }
        let slice = &self.buf[self.read_pos..self.read_pos + needed];
        self.read_pos += needed;
        Ok(slice)
    }

    /// Append raw bytes.
    pub fn add_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Read `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&[u8]> {
        self.take(count)
    }

    /// Append an unsigned byte.
    pub fn add_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    /// Read an unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Append a signed byte.
    pub fn add_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    /// Read a signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Append an unsigned 16-bit integer (Big Endian).
    pub fn add_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Read an unsigned 16-bit integer (Big Endian).
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Append a signed 16-bit integer (Big Endian).
    pub fn add_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    /// Read a signed 16-bit integer (Big Endian).
    pub fn read_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Append an unsigned 32-bit integer (Big Endian).
    pub fn add_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Read an unsigned 32-bit integer (Big Endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Append a signed 32-bit integer (Big Endian).
    pub fn add_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    /// Read a signed 32-bit integer (Big Endian).
    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Append an unsigned 64-bit integer (Big Endian).
    pub fn add_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    /// Read an unsigned 64-bit integer (Big Endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Append a signed 64-bit integer (Big Endian).
    pub fn add_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// Read a signed 64-bit integer (Big Endian).
    pub fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Append a single-precision float (Big Endian bit pattern).
    pub fn add_f32(&mut self, v: f32) {
        self.buf.put_f32(v);
    }

    /// Read a single-precision float (Big Endian bit pattern).
    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Append a string as a 4-byte length prefix plus UTF-8 bytes.
    pub fn add_string(&mut self, v: &str) {
        self.buf.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| WirebusError::Decode(format!("invalid UTF-8 in string field: {e}")))
    }
}

impl std::fmt::Debug for BinaryBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryBlob")
            .field("len", &self.buf.len())
            .field("read_pos", &self.read_pos)
            .field("pooled", &self.home.is_some())
            .finish()
    }
}

impl Drop for BinaryBlob {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            home.put_back(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip() {
        let mut blob = BinaryBlob::with_capacity(64);
        blob.add_u8(0xAB);
        blob.add_i8(-3);
        blob.add_u16(0x0102);
        blob.add_i16(-512);
        blob.add_u32(0xDEAD_BEEF);
        blob.add_i32(i32::MIN);
        blob.add_u64(u64::MAX);
        blob.add_i64(-1);

        assert_eq!(blob.read_u8().unwrap(), 0xAB);
        assert_eq!(blob.read_i8().unwrap(), -3);
        assert_eq!(blob.read_u16().unwrap(), 0x0102);
        assert_eq!(blob.read_i16().unwrap(), -512);
        assert_eq!(blob.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(blob.read_i32().unwrap(), i32::MIN);
        assert_eq!(blob.read_u64().unwrap(), u64::MAX);
        assert_eq!(blob.read_i64().unwrap(), -1);
        assert_eq!(blob.remaining(), 0);
    }

    #[test]
    fn test_big_endian_byte_order() {
        let mut blob = BinaryBlob::with_capacity(8);
        blob.add_u32(0x0102_0304);
        assert_eq!(blob.bytes(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_float_round_trip() {
        let mut blob = BinaryBlob::with_capacity(8);
        blob.add_f32(3.5);
        assert_eq!(blob.read_f32().unwrap(), 3.5);
    }

    #[test]
    fn test_string_round_trip() {
        let mut blob = BinaryBlob::with_capacity(32);
        blob.add_string("hello");
        blob.add_string("");
        assert_eq!(blob.read_string().unwrap(), "hello");
        assert_eq!(blob.read_string().unwrap(), "");
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut blob = BinaryBlob::with_capacity(4);
        blob.add_u16(7);
        blob.read_u16().unwrap();

        let err = blob.read_u32().unwrap_err();
        assert!(matches!(
            err,
            WirebusError::BlobExhausted {
                needed: 4,
                available: 0
            }
        ));
    }

    #[test]
    fn test_jump_to_begin_rewinds_reads() {
        let mut blob = BinaryBlob::with_capacity(8);
        blob.add_u32(42);
        assert_eq!(blob.read_u32().unwrap(), 42);
        blob.jump_to_begin();
        assert_eq!(blob.read_u32().unwrap(), 42);
    }

    #[test]
    fn test_writes_interleaved_with_reads_append() {
        let mut blob = BinaryBlob::with_capacity(8);
        blob.add_u16(1);
        assert_eq!(blob.read_u16().unwrap(), 1);
        blob.add_u16(2);
        assert_eq!(blob.read_u16().unwrap(), 2);
        assert_eq!(blob.len(), 4);
    }
}
