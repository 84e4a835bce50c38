//! MSB-first bit I/O for re-framing bzip2 blocks

/// Bit writer that packs bits most-significant first, the order bzip2 uses
#[derive(Debug)]
pub struct BitWriter {
    buffer: Vec<u8>,
    current_byte: u8,
    bit_position: u8,
}

impl BitWriter {
    /// Create a new BitWriter
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with capacity hint
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_position: 0,
        }
    }

    /// Write a single bit
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Write the low `num_bits` bits of `value`
    #[inline]
    pub fn write_bits(&mut self, value: u64, num_bits: usize) {
        debug_assert!(num_bits <= 64);

        let mut remaining = num_bits;
        while remaining > 0 {
            let free = 8 - self.bit_position as usize;
            let take = free.min(remaining);
            let shift = remaining - take;
            let bits = ((value >> shift) & ((1u64 << take) - 1)) as u8;

            self.current_byte |= bits << (free - take);
            self.bit_position += take as u8;
            remaining -= take;

            if self.bit_position == 8 {
                self.buffer.push(self.current_byte);
                self.current_byte = 0;
                self.bit_position = 0;
            }
        }
    }

    /// Write whole bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_position == 0 {
            self.buffer.extend_from_slice(bytes);
            return;
        }
        for &b in bytes {
            self.write_bits(b as u64, 8);
        }
    }

    /// Copy `num_bits` bits from a reader; returns false if the reader ran dry
    pub fn copy_from(&mut self, reader: &mut BitReader<'_>, num_bits: u64) -> bool {
        let mut remaining = num_bits;
        while remaining > 0 {
            let take = remaining.min(32) as usize;
            match reader.read_bits(take) {
                Some(bits) => self.write_bits(bits, take),
                None => return false,
            }
            remaining -= take as u64;
        }
        true
    }

    /// Finish writing and return the buffer, zero-padding the last byte
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_position > 0 {
            self.buffer.push(self.current_byte);
        }
        self.buffer
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit reader over a borrowed byte slice, most-significant bit first
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_position: usize,
    bit_position: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new BitReader
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_position: 0,
            bit_position: 0,
        }
    }

    /// Read a single bit
    #[inline]
    pub fn read_bit(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b == 1)
    }

    /// Read multiple bits as a u64
    #[inline]
    pub fn read_bits(&mut self, num_bits: usize) -> Option<u64> {
        debug_assert!(num_bits <= 64);

        if (num_bits as u64) > self.remaining_bits() {
            return None;
        }

        let mut value = 0u64;
        let mut remaining = num_bits;
        while remaining > 0 {
            let avail = 8 - self.bit_position as usize;
            let take = avail.min(remaining);
            let byte = self.data[self.byte_position];
            let bits = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);

            value = (value << take) | bits as u64;
            self.bit_position += take as u8;
            remaining -= take;

            if self.bit_position == 8 {
                self.byte_position += 1;
                self.bit_position = 0;
            }
        }
        Some(value)
    }

    /// Skip bits without returning them
    pub fn skip_bits(&mut self, num_bits: u64) -> bool {
        if num_bits > self.remaining_bits() {
            return false;
        }
        let target = self.position() as u64 + num_bits;
        self.byte_position = (target / 8) as usize;
        self.bit_position = (target % 8) as u8;
        true
    }

    /// Number of unread bits
    pub fn remaining_bits(&self) -> u64 {
        (self.data.len() as u64 * 8).saturating_sub(self.position() as u64)
    }

    /// Get the current position in bits
    pub fn position(&self) -> usize {
        self.byte_position * 8 + self.bit_position as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_writer_reader() {
        let mut writer = BitWriter::new();

        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bit(true);
        writer.write_bits(0b1010_1010, 8);
        writer.write_bits(0xFF, 8);

        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bit(), Some(true));
        assert_eq!(reader.read_bit(), Some(false));
        assert_eq!(reader.read_bit(), Some(true));
        assert_eq!(reader.read_bits(8), Some(0b1010_1010));
        assert_eq!(reader.read_bits(8), Some(0xFF));
    }

    #[test]
    fn test_write_read_various_sizes() {
        let mut writer = BitWriter::new();

        writer.write_bits(0b111, 3);
        writer.write_bits(0b10101, 5);
        writer.write_bits(0xABCD, 16);
        writer.write_bits(0x3141_5926_5359, 48);

        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3), Some(0b111));
        assert_eq!(reader.read_bits(5), Some(0b10101));
        assert_eq!(reader.read_bits(16), Some(0xABCD));
        assert_eq!(reader.read_bits(48), Some(0x3141_5926_5359));
        assert_eq!(reader.read_bits(1), None);
    }

    #[test]
    fn test_copy_unaligned() {
        let source = [0b1011_0011u8, 0b0101_1100, 0b1111_0000];
        let mut reader = BitReader::new(&source);
        assert!(reader.skip_bits(3));

        let mut writer = BitWriter::new();
        writer.write_bytes(b"B");
        assert!(writer.copy_from(&mut reader, 13));
        let out = writer.finish();

        // 'B' then bits 3..16 of the source, zero padded
        assert_eq!(out, vec![b'B', 0b1001_1010, 0b1110_0000]);
        assert_eq!(reader.remaining_bits(), 8);
    }

    #[test]
    fn test_copy_past_end() {
        let source = [0u8; 2];
        let mut reader = BitReader::new(&source);
        assert!(!BitWriter::new().copy_from(&mut reader, 17));
    }
}
