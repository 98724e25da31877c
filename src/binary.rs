//! Fixed-width binary primitives at an explicit byte order.
//!
//! Every codec reads and writes arrays of `i16`/`i32`/`f32`/`f64` values whose
//! byte order is only known at runtime (TRK and TCK files may be either). The
//! helpers here dispatch once on [`Endianness`] and then use `byteorder`'s
//! bulk conversions.

use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::Result;

/// Byte order of a binary section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl Endianness {
    /// Byte order of the running machine.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Name used in headers and summaries.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Little => "little",
            Self::Big => "big",
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar with a fixed on-disk width.
pub trait BinaryValue: Copy + Default {
    /// Width in bytes.
    const SIZE: usize;

    /// Decode `dst.len()` values from `src`.
    fn decode_into<E: ByteOrder>(src: &[u8], dst: &mut [Self]);

    /// Encode `src` into `dst`, which must hold `src.len() * SIZE` bytes.
    fn encode_into<E: ByteOrder>(src: &[Self], dst: &mut [u8]);
}

macro_rules! binary_value {
    ($ty:ty, $size:expr, $read:ident, $write:ident) => {
        impl BinaryValue for $ty {
            const SIZE: usize = $size;

            fn decode_into<E: ByteOrder>(src: &[u8], dst: &mut [Self]) {
                E::$read(src, dst);
            }

            fn encode_into<E: ByteOrder>(src: &[Self], dst: &mut [u8]) {
                E::$write(src, dst);
            }
        }
    };
}

binary_value!(i16, 2, read_i16_into, write_i16_into);
binary_value!(i32, 4, read_i32_into, write_i32_into);
binary_value!(f32, 4, read_f32_into, write_f32_into);
binary_value!(f64, 8, read_f64_into, write_f64_into);

/// Decode as many whole values as `bytes` holds.
///
/// Trailing bytes that do not form a complete value are ignored.
pub fn decode_array<T: BinaryValue>(bytes: &[u8], endian: Endianness) -> Vec<T> {
    let count = bytes.len() / T::SIZE;
    let mut values = vec![T::default(); count];
    let bytes = &bytes[..count * T::SIZE];
    match endian {
        Endianness::Little => T::decode_into::<LittleEndian>(bytes, &mut values),
        Endianness::Big => T::decode_into::<BigEndian>(bytes, &mut values),
    }
    values
}

/// Encode `values` into a freshly allocated byte buffer.
pub fn encode_array<T: BinaryValue>(values: &[T], endian: Endianness) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * T::SIZE];
    match endian {
        Endianness::Little => T::encode_into::<LittleEndian>(values, &mut bytes),
        Endianness::Big => T::encode_into::<BigEndian>(values, &mut bytes),
    }
    bytes
}

/// Read exactly `count` values from `reader`.
///
/// A short read surfaces as `std::io::ErrorKind::UnexpectedEof`.
pub fn read_array<T: BinaryValue, R: Read + ?Sized>(
    reader: &mut R,
    count: usize,
    endian: Endianness,
) -> Result<Vec<T>> {
    let mut bytes = vec![0u8; count * T::SIZE];
    reader.read_exact(&mut bytes)?;
    Ok(decode_array(&bytes, endian))
}

/// Read a single value.
pub fn read_value<T: BinaryValue, R: Read + ?Sized>(reader: &mut R, endian: Endianness) -> Result<T> {
    let values = read_array::<T, R>(reader, 1, endian)?;
    Ok(values[0])
}

/// Write all of `values` to `writer`.
pub fn write_array<T: BinaryValue, W: Write + ?Sized>(
    writer: &mut W,
    values: &[T],
    endian: Endianness,
) -> Result<()> {
    writer.write_all(&encode_array(values, endian))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_big_endian_layout() {
        let bytes = encode_array(&[1i32], Endianness::Big);
        assert_eq!(bytes, vec![0, 0, 0, 1]);
        let bytes = encode_array(&[1i32], Endianness::Little);
        assert_eq!(bytes, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_decode_ignores_partial_tail() {
        let mut bytes = encode_array(&[1.5f32, -2.0], Endianness::Big);
        bytes.push(0xff);
        let values: Vec<f32> = decode_array(&bytes, Endianness::Big);
        assert_eq!(values, vec![1.5, -2.0]);
    }

    #[test]
    fn test_read_array_short_read() {
        let mut cursor = Cursor::new(vec![0u8; 6]);
        let result = read_array::<f32, _>(&mut cursor, 2, Endianness::Little);
        match result {
            Err(crate::Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_value_and_write_array() {
        let mut buf = Vec::new();
        write_array(&mut buf, &[7i16, -3], Endianness::Big).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_value::<i16, _>(&mut cursor, Endianness::Big).unwrap(), 7);
        assert_eq!(read_value::<i16, _>(&mut cursor, Endianness::Big).unwrap(), -3);
    }
}
