// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write cursors over wire buffers.
//!
//! The wire is network order, so every multi-byte accessor is big-endian.
//! Both cursors are bounds-checked and never allocate.

use super::{WireError, WireResult};

/// Generate big-endian write methods for primitive types.
macro_rules! impl_write_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> WireResult<()> {
            if self.offset + $size > self.buffer.len() {
                return Err(WireError::Truncated {
                    offset: self.offset,
                });
            }
            self.buffer[self.offset..self.offset + $size].copy_from_slice(&value.to_be_bytes());
            self.offset += $size;
            Ok(())
        }
    };
}

/// Generate big-endian read methods for primitive types.
macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> WireResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(WireError::Truncated {
                    offset: self.offset,
                });
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

/// Mutable cursor for encoding.
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_write_be!(write_u8, u8, 1);
    impl_write_be!(write_u16, u16, 2);
    impl_write_be!(write_u32, u32, 4);
    impl_write_be!(write_u64, u64, 8);

    pub fn write_bytes(&mut self, data: &[u8]) -> WireResult<()> {
        if self.offset + data.len() > self.buffer.len() {
            return Err(WireError::Truncated {
                offset: self.offset,
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Immutable cursor for decoding.
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_be!(read_u8, u8, 1);
    impl_read_be!(read_u16, u16, 2);
    impl_read_be!(read_u32, u32, 4);
    impl_read_be!(read_u64, u64, 8);

    pub fn read_bytes(&mut self, len: usize) -> WireResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(WireError::Truncated {
                offset: self.offset,
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Remaining bytes without advancing. Used by length-implied fields.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buffer[self.offset..];
        self.offset = self.buffer.len();
        slice
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrip_across_numeric_types() {
        let mut buffer = [0u8; 32];
        let mut writer = CursorMut::new(&mut buffer);
        writer.write_u8(0xAB).expect("write u8 should succeed");
        writer.write_u16(0xCDEF).expect("write u16 should succeed");
        writer
            .write_u32(0x1234_5678)
            .expect("write u32 should succeed");
        writer
            .write_u64(0x1122_3344_5566_7788)
            .expect("write u64 should succeed");
        writer
            .write_bytes(&[1, 2, 3, 4])
            .expect("write bytes should succeed");
        let written = writer.offset();
        assert_eq!(written, 19);

        let mut reader = Cursor::new(&buffer);
        assert_eq!(reader.read_u8().expect("read u8 should succeed"), 0xAB);
        assert_eq!(reader.read_u16().expect("read u16 should succeed"), 0xCDEF);
        assert_eq!(
            reader.read_u32().expect("read u32 should succeed"),
            0x1234_5678
        );
        assert_eq!(
            reader.read_u64().expect("read u64 should succeed"),
            0x1122_3344_5566_7788
        );
        assert_eq!(
            reader.read_bytes(4).expect("read bytes should succeed"),
            &[1, 2, 3, 4]
        );
        assert_eq!(reader.remaining(), buffer.len() - written);
    }

    #[test]
    fn test_wire_is_big_endian() {
        let mut buffer = [0u8; 4];
        let mut writer = CursorMut::new(&mut buffer);
        writer.write_u32(0x0102_0304).expect("write should succeed");
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_overflow_reports_offset() {
        let buffer = [0u8; 1];
        let mut cursor = Cursor::new(&buffer);
        assert_eq!(cursor.read_u8().expect("read u8 should succeed"), 0);

        let err = cursor.read_u16().unwrap_err();
        assert_eq!(err, WireError::Truncated { offset: 1 });
    }

    #[test]
    fn test_write_overflow_reports_offset() {
        let mut buffer = [0u8; 2];
        let mut cursor = CursorMut::new(&mut buffer);
        cursor.write_u16(7).expect("write u16 should succeed");

        let err = cursor.write_u8(0xFF).unwrap_err();
        assert_eq!(err, WireError::Truncated { offset: 2 });
    }

    #[test]
    fn test_rest_consumes_everything() {
        let buffer = [9u8, 8, 7];
        let mut cursor = Cursor::new(&buffer);
        cursor.read_u8().expect("read u8 should succeed");
        assert_eq!(cursor.rest(), &[8, 7]);
        assert!(cursor.is_eof());
        assert_eq!(cursor.rest(), &[] as &[u8]);
    }
}
