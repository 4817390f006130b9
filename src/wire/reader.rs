use bytes::{Buf, Bytes};

use crate::error::{data_loss, StoreError, StoreResult};
use crate::wire::WireType;

/// Consumes tag/value fields from an encoded buffer.
///
/// Malformed input never panics and never escapes mid-decode: the first
/// failure latches into the reader's status, every later read returns a
/// default, and the caller checks `status` once after its read loop.
pub struct Reader {
    buffer: Bytes,
    error: Option<StoreError>,
}

impl Reader {
    pub fn new(buffer: Bytes) -> Self {
        Self {
            buffer,
            error: None,
        }
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> StoreResult<()> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Records a decode failure. The first failure wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(data_loss(message));
        }
    }

    /// The next field's tag, or None once the input is exhausted or the
    /// reader has failed.
    pub fn read_tag(&mut self) -> Option<(u32, WireType)> {
        if self.error.is_some() || !self.buffer.has_remaining() {
            return None;
        }
        let tag = self.read_raw_varint();
        if self.error.is_some() {
            return None;
        }
        let field_number = (tag >> 3) as u32;
        if field_number == 0 {
            self.fail("Invalid field number 0 in tag");
            return None;
        }
        match WireType::from_bits(tag & 0x7) {
            Some(wire_type) => Some((field_number, wire_type)),
            None => {
                self.fail(format!("Unknown wire type {}", tag & 0x7));
                None
            }
        }
    }

    pub fn read_varint(&mut self) -> u64 {
        if self.error.is_some() {
            return 0;
        }
        self.read_raw_varint()
    }

    pub fn read_signed_varint(&mut self) -> i64 {
        self.read_varint() as i64
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_varint() != 0
    }

    pub fn read_double(&mut self) -> f64 {
        if self.error.is_some() {
            return 0.0;
        }
        if self.buffer.remaining() < 8 {
            self.fail("Unexpected end of input while reading a double");
            return 0.0;
        }
        f64::from_bits(self.buffer.get_u64_le())
    }

    pub fn read_bytes(&mut self) -> Bytes {
        if self.error.is_some() {
            return Bytes::new();
        }
        let length = self.read_raw_varint() as usize;
        if self.error.is_some() {
            return Bytes::new();
        }
        if self.buffer.remaining() < length {
            self.fail("Length-delimited field overruns the input");
            return Bytes::new();
        }
        self.buffer.split_to(length)
    }

    pub fn read_string(&mut self) -> String {
        let raw = self.read_bytes();
        match String::from_utf8(raw.to_vec()) {
            Ok(value) => value,
            Err(_) => {
                self.fail("Invalid UTF-8 in string field");
                String::new()
            }
        }
    }

    /// Decodes a length-prefixed nested message with the closure. A failure
    /// inside the nested reader propagates to this one.
    pub fn read_message<T>(&mut self, decode: impl FnOnce(&mut Reader) -> T) -> T {
        let payload = self.read_bytes();
        let mut nested = Reader::new(payload);
        let result = decode(&mut nested);
        if let Some(error) = nested.error {
            self.error.get_or_insert(error);
        }
        result
    }

    /// Skips over a field without decoding its payload structurally, which
    /// is what keeps unknown tags forward-compatible.
    pub fn skip_field(&mut self, wire_type: WireType) {
        if self.error.is_some() {
            return;
        }
        match wire_type {
            WireType::Varint => {
                self.read_raw_varint();
            }
            WireType::Fixed64 => {
                if self.buffer.remaining() < 8 {
                    self.fail("Unexpected end of input while skipping a fixed64 field");
                } else {
                    self.buffer.advance(8);
                }
            }
            WireType::LengthDelimited => {
                self.read_bytes();
            }
            WireType::Fixed32 => {
                if self.buffer.remaining() < 4 {
                    self.fail("Unexpected end of input while skipping a fixed32 field");
                } else {
                    self.buffer.advance(4);
                }
            }
        }
    }

    fn read_raw_varint(&mut self) -> u64 {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            if !self.buffer.has_remaining() {
                self.fail("Unexpected end of input while reading a varint");
                return 0;
            }
            let byte = self.buffer.get_u8();
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return result;
            }
            shift += 7;
            if shift >= 64 {
                self.fail("Malformed varint exceeds ten bytes");
                return 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorCode;
    use crate::wire::Writer;

    #[test]
    fn round_trips_every_field_shape() {
        let mut writer = Writer::new();
        writer.write_varint(1, 300);
        writer.write_signed_varint(2, -5);
        writer.write_double(3, 2.5);
        writer.write_string(4, "hello");
        writer.write_bytes(5, &[0xDE, 0xAD]);
        writer.write_message(6, |nested| nested.write_bool(1, true));

        let mut reader = Reader::new(writer.into_bytes());
        assert_eq!(reader.read_tag(), Some((1, WireType::Varint)));
        assert_eq!(reader.read_varint(), 300);
        assert_eq!(reader.read_tag(), Some((2, WireType::Varint)));
        assert_eq!(reader.read_signed_varint(), -5);
        assert_eq!(reader.read_tag(), Some((3, WireType::Fixed64)));
        assert_eq!(reader.read_double(), 2.5);
        assert_eq!(reader.read_tag(), Some((4, WireType::LengthDelimited)));
        assert_eq!(reader.read_string(), "hello");
        assert_eq!(reader.read_tag(), Some((5, WireType::LengthDelimited)));
        assert_eq!(reader.read_bytes().as_ref(), &[0xDE, 0xAD]);
        assert_eq!(reader.read_tag(), Some((6, WireType::LengthDelimited)));
        assert!(reader.read_message(|nested| {
            assert_eq!(nested.read_tag(), Some((1, WireType::Varint)));
            nested.read_bool()
        }));
        assert_eq!(reader.read_tag(), None);
        assert!(reader.status().is_ok());
    }

    #[test]
    fn unknown_fields_are_skippable() {
        let mut writer = Writer::new();
        writer.write_varint(9, 12);
        writer.write_double(10, 1.0);
        writer.write_bytes(11, b"ignored");
        writer.write_varint(1, 7);

        let mut reader = Reader::new(writer.into_bytes());
        let mut recognized = None;
        while let Some((field_number, wire_type)) = reader.read_tag() {
            match field_number {
                1 => recognized = Some(reader.read_varint()),
                _ => reader.skip_field(wire_type),
            }
        }
        assert!(reader.status().is_ok());
        assert_eq!(recognized, Some(7));
    }

    #[test]
    fn truncated_input_fails_with_data_loss() {
        let mut writer = Writer::new();
        writer.write_bytes(1, &[1, 2, 3, 4]);
        let encoded = writer.into_bytes();
        let truncated = encoded.slice(0..encoded.len() - 2);

        let mut reader = Reader::new(truncated);
        while let Some((_, wire_type)) = reader.read_tag() {
            reader.skip_field(wire_type);
        }
        let err = reader.status().unwrap_err();
        assert_eq!(err.code, StoreErrorCode::DataLoss);
    }

    #[test]
    fn reads_after_a_failure_return_defaults() {
        let mut reader = Reader::new(Bytes::from_static(&[0xFF]));
        assert_eq!(reader.read_tag(), None);
        assert!(reader.status().is_err());
        assert_eq!(reader.read_varint(), 0);
        assert_eq!(reader.read_bytes(), Bytes::new());
        assert_eq!(reader.read_double(), 0.0);
    }

    #[test]
    fn nested_failures_propagate_to_the_outer_reader() {
        let mut writer = Writer::new();
        // nested payload claims 5 bytes of field 1 but holds none
        writer.write_bytes(1, &[0x0A, 0x05]);
        let mut reader = Reader::new(writer.into_bytes());
        assert_eq!(reader.read_tag(), Some((1, WireType::LengthDelimited)));
        reader.read_message(|nested| {
            while let Some((_, wire_type)) = nested.read_tag() {
                nested.skip_field(wire_type);
            }
        });
        assert!(reader.status().is_err());
    }

    #[test]
    fn ten_byte_varint_limit() {
        let overlong = Bytes::from_static(&[
            0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01,
        ]);
        let mut reader = Reader::new(overlong);
        assert_eq!(reader.read_tag(), Some((1, WireType::Varint)));
        reader.read_varint();
        assert!(reader.status().is_err());

        let mut writer = Writer::new();
        writer.write_varint(1, u64::MAX);
        let mut reader = Reader::new(writer.into_bytes());
        assert_eq!(reader.read_tag(), Some((1, WireType::Varint)));
        assert_eq!(reader.read_varint(), u64::MAX);
        assert!(reader.status().is_ok());
    }
}
