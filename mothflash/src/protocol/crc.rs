//! CRC16-XMODEM checksum.
//!
//! Bit-serial implementation: each input bit is shifted into the register
//! MSB first, and sixteen zero bits are appended at the end to flush it.
//! With an initial value of zero this yields the standard CRC-16/XMODEM.

/// Generator polynomial (x^16 + x^12 + x^5 + 1).
pub const CRC_POLY: u16 = 0x1021;

/// Shift one bit into the register.
#[inline]
fn crc_update(crc: u16, bit: bool) -> u16 {
    let carry = crc & 0x8000 != 0;
    let mut out = (crc << 1) | u16::from(bit);
    if carry {
        out ^= CRC_POLY;
    }
    out
}

/// Compute the CRC16 of a byte block.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = data.iter().fold(0u16, |crc, &byte| {
        (0..8)
            .rev()
            .fold(crc, |crc, shift| crc_update(crc, (byte >> shift) & 1 != 0))
    });

    for _ in 0..16 {
        crc = crc_update(crc, false);
    }

    crc
}
