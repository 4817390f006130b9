use bytes::{BufMut, Bytes, BytesMut};

use crate::wire::WireType;

/// Appends tag/value fields to a growing buffer. Encoding cannot fail: the
/// in-memory model is always representable.
#[derive(Default)]
pub struct Writer {
    buffer: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn write_varint(&mut self, field_number: u32, value: u64) {
        self.write_tag(field_number, WireType::Varint);
        self.write_raw_varint(value);
    }

    /// Signed integers ride the varint encoding via their two's complement
    /// bit pattern, so negative values occupy the full ten bytes.
    pub fn write_signed_varint(&mut self, field_number: u32, value: i64) {
        self.write_varint(field_number, value as u64);
    }

    pub fn write_bool(&mut self, field_number: u32, value: bool) {
        self.write_varint(field_number, u64::from(value));
    }

    pub fn write_double(&mut self, field_number: u32, value: f64) {
        self.write_tag(field_number, WireType::Fixed64);
        self.buffer.put_u64_le(value.to_bits());
    }

    pub fn write_bytes(&mut self, field_number: u32, value: &[u8]) {
        self.write_tag(field_number, WireType::LengthDelimited);
        self.write_raw_varint(value.len() as u64);
        self.buffer.put_slice(value);
    }

    pub fn write_string(&mut self, field_number: u32, value: &str) {
        self.write_bytes(field_number, value.as_bytes());
    }

    /// Writes a length-prefixed nested message produced by the closure.
    pub fn write_message(&mut self, field_number: u32, encode: impl FnOnce(&mut Writer)) {
        let mut nested = Writer::new();
        encode(&mut nested);
        self.write_bytes(field_number, &nested.buffer);
    }

    fn write_tag(&mut self, field_number: u32, wire_type: WireType) {
        self.write_raw_varint((u64::from(field_number) << 3) | wire_type.bits());
    }

    fn write_raw_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.put_u8(byte);
                return;
            }
            self.buffer.put_u8(byte | 0x80);
        }
    }
}
