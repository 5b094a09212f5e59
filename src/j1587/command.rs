//! Outbound J1587 frames and the two's complement checksum shared with the decoder.

use crate::j1587::constants::PID_CLEAR_DTCS;

/// Checksum byte that makes the frame sum to zero: `256 - (sum mod 256)`, truncated to a byte.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &x| acc.wrapping_add(x)).wrapping_neg()
}

/// A frame including its trailing checksum is valid when all bytes sum to 0 mod 256.
pub fn is_valid(frame: &[u8]) -> bool {
    frame.iter().fold(0u8, |acc, &x| acc.wrapping_add(x)) == 0
}

/// Build a frame addressed to `mid` carrying `pid` followed by the raw `payload`.
pub fn encode_frame(mid: u8, pid: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(mid);
    frame.push(pid);
    frame.extend(payload);
    frame.push(checksum(&frame));
    frame
}

/// Request for module `target_mid` to clear its active DTCs.
pub fn clear_active_dtcs(target_mid: u8) -> Vec<u8> {
    encode_frame(target_mid, PID_CLEAR_DTCS, &[])
}
