//! The 8-bit linear-feedback shift register at the heart of the PnP protocol.
//!
//! The same circuit serves two purposes: shifting from the `0x6A` seed with a
//! zero serial input generates the 32-byte initiation key, and shifting with
//! the isolation read bits as serial input accumulates the checksum that the
//! card transmits as the 9th identifier byte.

/// Power-on LFSR state.
pub const LFSR_SEED: u8 = 0x6A;

/// One LFSR step: the register shifts right and the new MSB is
/// `input ^ bit0 ^ bit1` of the previous state.
///
/// Any non-zero `input` counts as a 1 on the serial line.
pub fn lfsr_shift(state: u8, input: u8) -> u8 {
    let input = u8::from(input != 0);
    let msb = (input ^ (state & 0x01) ^ ((state & 0x02) >> 1)) << 7;
    ((state >> 1) & 0x7F) | msb
}

/// The 32 byte values written to the address port to enable PnP logic.
pub fn initiation_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    let mut state = LFSR_SEED;
    for byte in &mut key {
        *byte = state;
        state = lfsr_shift(state, 0);
    }
    key
}
