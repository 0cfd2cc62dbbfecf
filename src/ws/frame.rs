//! RFC 6455 frame subset codec.
//!
//! Incoming frames are masked client frames with FIN set; outgoing frames
//! are unmasked server frames. Payloads above [`MAX_PAYLOAD`] use the
//! 64-bit length form, which this device does not support.

/// Largest payload accepted or produced (the 16-bit length form's maximum).
pub const MAX_PAYLOAD: usize = 65535;

const FIN: u8 = 0x80;
const MASK: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
    Close,
}

impl Opcode {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Opcode::Text),
            2 => Some(Opcode::Binary),
            8 => Some(Opcode::Close),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Opcode::Text => 1,
            Opcode::Binary => 2,
            Opcode::Close => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// FIN was clear; continuation frames are not supported.
    Fragmented,
    /// Opcode other than text, binary, or close.
    BadOpcode,
    /// Client frame arrived without a masking key.
    Unmasked,
    /// 64-bit length form, or an outgoing payload above [`MAX_PAYLOAD`].
    Oversized,
}

/// A fully parsed frame header. `header_len` is how many bytes of the
/// stream the header consumed (6 for the short form, 8 for the 16-bit
/// extended form, masking key included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: Opcode,
    pub payload_len: usize,
    pub mask: [u8; 4],
    pub header_len: usize,
}

/// How many header bytes a frame starting with `buf` needs in total, once
/// at least the 2 fixed bytes are present.
pub fn header_len(buf: &[u8]) -> Result<usize, FrameError> {
    if buf.len() < 2 {
        return Ok(6); // lower bound until the length byte arrives
    }
    match buf[1] & 0x7F {
        127 => Err(FrameError::Oversized),
        126 => Ok(8),
        _ => Ok(6),
    }
}

/// Incremental header parse. `Ok(None)` means more bytes are needed;
/// `Ok(Some(h))` consumed exactly `h.header_len` bytes of `buf`.
pub fn parse_header(buf: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] & FIN == 0 {
        return Err(FrameError::Fragmented);
    }
    let opcode = Opcode::from_bits(buf[0] & 0x0F).ok_or(FrameError::BadOpcode)?;
    if buf[1] & MASK == 0 {
        return Err(FrameError::Unmasked);
    }

    let len7 = buf[1] & 0x7F;
    let (payload_len, mask_at) = match len7 {
        127 => return Err(FrameError::Oversized),
        126 => {
            if buf.len() < 8 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        n => {
            if buf.len() < 6 {
                return Ok(None);
            }
            (n as usize, 2)
        }
    };

    let mask = [
        buf[mask_at],
        buf[mask_at + 1],
        buf[mask_at + 2],
        buf[mask_at + 3],
    ];
    Ok(Some(FrameHeader {
        opcode,
        payload_len,
        mask,
        header_len: mask_at + 4,
    }))
}

/// In-place payload unmask; applying it twice restores the original.
pub fn unmask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Encodes one unmasked server frame with FIN set. Payloads above
/// [`MAX_PAYLOAD`] are rejected.
pub fn encode(opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::Oversized);
    }
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(FIN | opcode.bits());
    if payload.len() <= 125 {
        out.push(payload.len() as u8);
    } else {
        out.push(126);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        let mut buf = vec![FIN | opcode];
        if payload.len() <= 125 {
            buf.push(MASK | payload.len() as u8);
        } else {
            buf.push(MASK | 126);
            buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        buf.extend_from_slice(&mask);
        let mut body = payload.to_vec();
        unmask(&mut body, mask);
        buf.extend_from_slice(&body);
        buf
    }

    #[test]
    fn parse_short_text_header() {
        let frame = masked_frame(1, b"ping", [1, 2, 3, 4]);
        let h = parse_header(&frame).unwrap().unwrap();
        assert_eq!(h.opcode, Opcode::Text);
        assert_eq!(h.payload_len, 4);
        assert_eq!(h.mask, [1, 2, 3, 4]);
        assert_eq!(h.header_len, 6);
    }

    #[test]
    fn parse_needs_more_bytes() {
        let frame = masked_frame(2, &[0u8; 300], [9, 9, 9, 9]);
        assert_eq!(parse_header(&frame[..1]).unwrap(), None);
        assert_eq!(parse_header(&frame[..7]).unwrap(), None);
        let h = parse_header(&frame[..8]).unwrap().unwrap();
        assert_eq!(h.payload_len, 300);
        assert_eq!(h.header_len, 8);
    }

    #[test]
    fn boundary_selects_header_form() {
        let short = masked_frame(2, &[7u8; 125], [0, 0, 0, 0]);
        assert_eq!(parse_header(&short).unwrap().unwrap().header_len, 6);
        let medium = masked_frame(2, &[7u8; 126], [0, 0, 0, 0]);
        assert_eq!(parse_header(&medium).unwrap().unwrap().header_len, 8);
    }

    #[test]
    fn rejects_fragmented_and_bad_opcode() {
        assert_eq!(
            parse_header(&[0x01, 0x81, 0, 0, 0, 0]),
            Err(FrameError::Fragmented)
        );
        assert_eq!(
            parse_header(&[FIN | 0x09, 0x81, 0, 0, 0, 0]),
            Err(FrameError::BadOpcode)
        );
    }

    #[test]
    fn rejects_unmasked_client_frame() {
        assert_eq!(
            parse_header(&[FIN | 1, 0x04, b'p', b'i', b'n', b'g']),
            Err(FrameError::Unmasked)
        );
    }

    #[test]
    fn rejects_64bit_length_form() {
        let buf = [FIN | 2, MASK | 127, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(parse_header(&buf), Err(FrameError::Oversized));
    }

    #[test]
    fn unmask_round_trips() {
        let original: Vec<u8> = (0u8..=255).collect();
        let mask = [0xA5, 0x3C, 0x99, 0x01];
        let mut data = original.clone();
        unmask(&mut data, mask);
        assert_ne!(data, original);
        unmask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn encode_decode_round_trip_boundaries() {
        for len in [0usize, 1, 125, 126, 65535] {
            let payload = vec![0x5Au8; len];
            let encoded = encode(Opcode::Binary, &payload).unwrap();
            // Server frames are unmasked; re-mask to parse as a client frame.
            let mask = [3, 1, 4, 1];
            let mut client = vec![encoded[0], encoded[1] | MASK];
            let header_end = if len <= 125 { 2 } else { 4 };
            client.extend_from_slice(&encoded[2..header_end]);
            client.extend_from_slice(&mask);
            let mut body = encoded[header_end..].to_vec();
            unmask(&mut body, mask);
            client.extend_from_slice(&body);

            let h = parse_header(&client).unwrap().unwrap();
            assert_eq!(h.payload_len, len, "length {len}");
            let mut decoded = client[h.header_len..].to_vec();
            unmask(&mut decoded, h.mask);
            assert_eq!(decoded, payload, "length {len}");
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert_eq!(encode(Opcode::Binary, &payload), Err(FrameError::Oversized));
    }
}
