use core::num::NonZeroU32;

use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum VarintError {
    #[error("buffer too short")]
    BufferTooShort,
    #[error("non-minimal integer encoding")]
    NonMinimalIntegerEncoding,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    #[error("cannot decode TLV type: {err}")]
    CannotDecodeType { err: VarintError },
    #[error("TLV type {typ} is out of range")]
    InvalidType { typ: u64 },
    #[error("cannot decode length of TLV type {typ}: {err}")]
    CannotDecodeLength { typ: NonZeroU32, err: VarintError },
    #[error("TLV type {typ} declares {len} bytes, only {available} available")]
    CannotDecodeValue {
        typ: NonZeroU32,
        len: usize,
        available: usize,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TLV<'a> {
    pub typ: NonZeroU32,
    pub val: &'a [u8],
}

impl<'a> TLV<'a> {
    // This matters when the evolution of the protocol requires adding new types.
    // When an unknown type is critical we must signal error, otherwise we can ignore it.
    pub fn type_is_critical(&self) -> bool {
        let typ = self.typ.get();
        typ < 32 || typ & 1 == 1
    }

    pub fn val_as_u64(&self) -> Option<u64> {
        match self.val.len() {
            1 => Some(self.val[0] as u64),
            2 => Some(u16::from_be_bytes(self.val.try_into().ok()?) as u64),
            4 => Some(u32::from_be_bytes(self.val.try_into().ok()?) as u64),
            8 => Some(u64::from_be_bytes(self.val.try_into().ok()?)),
            _ => None,
        }
    }

    /// Decodes one element from the front of `bytes`, returning it along with
    ///  the number of bytes it occupied.
    pub fn try_decode(bytes: &'a [u8]) -> Result<(TLV<'a>, usize), TlvError> {
        let mut cursor = 0;
        let typ = parse_varint(bytes, &mut cursor)
            .map_err(|err| TlvError::CannotDecodeType { err })?;
        let typ = u32::try_from(typ)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or(TlvError::InvalidType { typ })?;

        let len = parse_varint(bytes, &mut cursor)
            .map_err(|err| TlvError::CannotDecodeLength { typ, err })?;

        let available = bytes.len() - cursor;
        let len = match usize::try_from(len) {
            Ok(len) if len <= available => len,
            _ => {
                return Err(TlvError::CannotDecodeValue {
                    typ,
                    len: len as usize,
                    available,
                })
            }
        };

        let val = &bytes[cursor..(cursor + len)];
        Ok((TLV { typ, val }, cursor + len))
    }
}

fn parse_varint(bytes: &[u8], cursor: &mut usize) -> Result<u64, VarintError> {
    let first = *bytes.get(*cursor).ok_or(VarintError::BufferTooShort)?;
    *cursor += 1;

    let (width, minimum) = match first {
        0..=252 => return Ok(first as u64),
        253 => (2, 253),
        254 => (4, 65536),
        255 => (8, 4294967296),
    };

    let next = bytes
        .get(*cursor..(*cursor + width))
        .ok_or(VarintError::BufferTooShort)?;
    *cursor += width;

    let val = next.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    if val < minimum {
        return Err(VarintError::NonMinimalIntegerEncoding);
    }
    Ok(val)
}

/// Iterates over a sequence of concatenated elements, stopping after the first error.
pub struct TlvIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

pub fn parse_tlvs(bytes: &[u8]) -> TlvIter<'_> {
    TlvIter {
        bytes,
        offset: 0,
        failed: false,
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<TLV<'a>, TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        match TLV::try_decode(&self.bytes[self.offset..]) {
            Ok((tlv, len)) => {
                self.offset += len;
                Some(Ok(tlv))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

pub trait Encode {
    fn encoded_length(&self) -> usize;
    fn encode(&self, buffer: &mut Vec<u8>);
}

impl Encode for u64 {
    fn encoded_length(&self) -> usize {
        if *self <= 252 {
            1
        } else if *self <= 65535 {
            3
        } else if *self <= 4294967295 {
            5
        } else {
            9
        }
    }

    fn encode(&self, buffer: &mut Vec<u8>) {
        if *self <= 252 {
            buffer.push(*self as u8)
        } else if *self <= 65535 {
            buffer.push(253);
            buffer.extend_from_slice(&(*self as u16).to_be_bytes())
        } else if *self <= 4294967295 {
            buffer.push(254);
            buffer.extend_from_slice(&(*self as u32).to_be_bytes())
        } else {
            buffer.push(255);
            buffer.extend_from_slice(&self.to_be_bytes())
        }
    }
}

impl<'a> Encode for TLV<'a> {
    fn encoded_length(&self) -> usize {
        let l = self.val.len();
        (self.typ.get() as u64).encoded_length() + (l as u64).encoded_length() + l
    }

    fn encode(&self, buffer: &mut Vec<u8>) {
        (self.typ.get() as u64).encode(buffer);
        (self.val.len() as u64).encode(buffer);
        buffer.extend_from_slice(self.val)
    }
}

/// Writes the type and length header of an element whose value follows.
pub fn encode_header(typ: u32, len: usize, buffer: &mut Vec<u8>) {
    (typ as u64).encode(buffer);
    (len as u64).encode(buffer);
}

pub fn encode_bytes(typ: u32, val: &[u8], buffer: &mut Vec<u8>) {
    encode_header(typ, val.len(), buffer);
    buffer.extend_from_slice(val);
}

/// Non-negative integers use the shortest of 1, 2, 4 or 8 big-endian bytes.
pub fn encode_non_negative(typ: u32, val: u64, buffer: &mut Vec<u8>) {
    if val <= u8::MAX as u64 {
        encode_bytes(typ, &[val as u8], buffer)
    } else if val <= u16::MAX as u64 {
        encode_bytes(typ, &(val as u16).to_be_bytes(), buffer)
    } else if val <= u32::MAX as u64 {
        encode_bytes(typ, &(val as u32).to_be_bytes(), buffer)
    } else {
        encode_bytes(typ, &val.to_be_bytes(), buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned() {
        for v in 0u64..252 {
            assert_eq!(v.encoded_length(), 1);
        }
        assert_eq!(253u64.encoded_length(), 3);
        assert_eq!(65535u64.encoded_length(), 3);
        assert_eq!(65536u64.encoded_length(), 5);
        assert_eq!(4294967295u64.encoded_length(), 5);
        assert_eq!(4294967296u64.encoded_length(), 9);
    }

    #[test]
    fn test_varint_decoding() {
        let mut buffer = Vec::new();
        for v in [0u64, 252, 253, 65535, 65536, 4294967296] {
            buffer.clear();
            v.encode(&mut buffer);
            assert_eq!(buffer.len(), v.encoded_length());
            let mut cursor = 0;
            assert_eq!(parse_varint(&buffer, &mut cursor), Ok(v));
            assert_eq!(cursor, buffer.len());
        }
    }

    #[test]
    fn test_varint_rejects_bad_input() {
        let mut cursor = 0;
        assert_eq!(
            parse_varint(&[], &mut cursor),
            Err(VarintError::BufferTooShort)
        );

        let mut cursor = 0;
        assert_eq!(
            parse_varint(&[253, 0], &mut cursor),
            Err(VarintError::BufferTooShort)
        );

        let mut cursor = 0;
        assert_eq!(
            parse_varint(&[253, 0, 12], &mut cursor),
            Err(VarintError::NonMinimalIntegerEncoding)
        );

        let mut cursor = 0;
        assert_eq!(
            parse_varint(&[254, 0, 0, 255, 255], &mut cursor),
            Err(VarintError::NonMinimalIntegerEncoding)
        );
    }

    #[test]
    fn test_tlv_decoding() {
        let bytes = [7, 3, 1, 2, 3, 9];
        let (tlv, len) = TLV::try_decode(&bytes).unwrap();
        assert_eq!(tlv.typ.get(), 7);
        assert_eq!(tlv.val, &[1, 2, 3]);
        assert_eq!(len, 5);

        assert!(matches!(
            TLV::try_decode(&[7, 4, 1, 2]),
            Err(TlvError::CannotDecodeValue { len: 4, available: 2, .. })
        ));
        assert!(matches!(
            TLV::try_decode(&[0, 0]),
            Err(TlvError::InvalidType { typ: 0 })
        ));
    }

    #[test]
    fn test_tlv_iteration_stops_on_error() {
        let bytes = [8, 1, b'a', 8, 0, 8, 5, b'b'];
        let items: Vec<_> = parse_tlvs(&bytes).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(items[2].is_err());
    }

    #[test]
    fn test_non_negative_integers() {
        let mut buffer = Vec::new();
        encode_non_negative(12, 4000, &mut buffer);
        assert_eq!(buffer, [12, 2, 0x0f, 0xa0]);

        let (tlv, _) = TLV::try_decode(&buffer).unwrap();
        assert_eq!(tlv.val_as_u64(), Some(4000));
        assert!(tlv.type_is_critical());

        let tlv = TLV {
            typ: NonZeroU32::new(34).unwrap(),
            val: &[1, 2, 3],
        };
        assert!(!tlv.type_is_critical());
        assert_eq!(tlv.val_as_u64(), None);
    }
}
