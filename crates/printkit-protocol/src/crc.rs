//! Packet checksum.
//!
//! The wire protocol uses the Maxim/Dallas 1-Wire 8-bit CRC (reflected
//! polynomial 0x8C), computed over the length-counted payload bytes.
//! The per-byte update is table-driven; the table is built at compile
//! time.

const POLY: u8 = 0x8C;

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x01 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u8; 256] = build_table();

/// Running CRC over a byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc8 {
    value: u8,
}

impl Crc8 {
    pub fn new() -> Self {
        Crc8 { value: 0 }
    }

    pub fn update(&mut self, byte: u8) {
        self.value = CRC_TABLE[(self.value ^ byte) as usize];
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

/// CRC of a complete buffer.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = Crc8::new();
    for &b in data {
        crc.update(b);
    }
    crc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bitwise reference form of the same polynomial.
    fn crc8_bitwise(data: &[u8]) -> u8 {
        let mut crc: u8 = 0;
        for &b in data {
            crc ^= b;
            for _ in 0..8 {
                crc = if crc & 0x01 != 0 {
                    (crc >> 1) ^ POLY
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    #[test]
    fn table_matches_bitwise_form() {
        let samples: [&[u8]; 5] = [
            &[],
            &[0x00],
            &[0x01, 0x02, 0x03],
            &[0xff; 32],
            &[0x81, 0x00, 0x10, 0x27],
        ];
        for data in samples {
            assert_eq!(crc8(data), crc8_bitwise(data));
        }
    }

    #[test]
    fn known_vector() {
        // The canonical 1-Wire ROM example: family code + serial,
        // whose final byte is its own CRC.
        let rom = [0x02u8, 0x1c, 0xb8, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(crc8(&rom), 0xa2);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn single_bit_changes_crc() {
        let base = [0x81u8, 0x20, 0x00];
        let crc = crc8(&base);
        for i in 0..base.len() {
            for bit in 0..8 {
                let mut corrupt = base;
                corrupt[i] ^= 1 << bit;
                assert_ne!(crc8(&corrupt), crc, "byte {} bit {}", i, bit);
            }
        }
    }
}
