//! Wire frame codec (C2): four tagged variants, encoded field-by-field in
//! declaration order with big-endian integers.
//!
//! No teacher analog — the teacher speaks JSON over WebSocket. This module's
//! explicit length-prefixed, tag-byte framing follows the byte-oriented style
//! in `other_examples/shranto27-WRAITH-Protocol`'s frame handling, adapted to
//! the four shapes in `SPEC_FULL.md` §3. Decoding never partially consumes
//! the buffer: any validation failure returns `Err` before any field is read
//! out to the caller.

use crate::error::FrameError;

pub const MAX_PAYLOAD: usize = 65_535;

const KIND_DATA: u8 = 0;
const KIND_ACK: u8 = 1;
const KIND_CONTROL: u8 = 2;
const KIND_HEARTBEAT: u8 = 3;

/// An owning, decoded frame. Produced by [`decode`]; encoded by [`encode_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Data {
        stream_id: u64,
        sequence: u64,
        fin: bool,
        payload: Vec<u8>,
    },
    Ack {
        stream_id: u64,
        ack: u64,
        bitmap: u32,
    },
    Control {
        kind: u8,
        payload: Vec<u8>,
    },
    Heartbeat {
        timestamp: u64,
        sequence: u64,
        payload: Vec<u8>,
    },
}

/// A zero-copy decoded frame: the payload is a slice borrowed from the
/// caller's buffer. The caller must keep that buffer alive for the view's
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrameView<'a> {
    Data {
        stream_id: u64,
        sequence: u64,
        fin: bool,
        payload: &'a [u8],
    },
    Ack {
        stream_id: u64,
        ack: u64,
        bitmap: u32,
    },
    Control {
        kind: u8,
        payload: &'a [u8],
    },
    Heartbeat {
        timestamp: u64,
        sequence: u64,
        payload: &'a [u8],
    },
}

impl WireFrame {
    /// Encodes into a caller-supplied buffer, returning the number of bytes
    /// written, or `0` if `out` is too small.
    pub fn encode_to(&self, out: &mut [u8]) -> usize {
        let len = self.encoded_len();
        if out.len() < len {
            return 0;
        }
        match self {
            WireFrame::Data {
                stream_id,
                sequence,
                fin,
                payload,
            } => {
                out[0] = KIND_DATA;
                out[1..9].copy_from_slice(&stream_id.to_be_bytes());
                out[9..17].copy_from_slice(&sequence.to_be_bytes());
                out[17] = *fin as u8;
                out[18..20].copy_from_slice(&(payload.len() as u16).to_be_bytes());
                out[20..20 + payload.len()].copy_from_slice(payload);
            }
            WireFrame::Ack {
                stream_id,
                ack,
                bitmap,
            } => {
                out[0] = KIND_ACK;
                out[1..9].copy_from_slice(&stream_id.to_be_bytes());
                out[9..17].copy_from_slice(&ack.to_be_bytes());
                out[17..21].copy_from_slice(&bitmap.to_be_bytes());
            }
            WireFrame::Control { kind, payload } => {
                out[0] = KIND_CONTROL;
                out[1] = *kind;
                out[2..4].copy_from_slice(&(payload.len() as u16).to_be_bytes());
                out[4..4 + payload.len()].copy_from_slice(payload);
            }
            WireFrame::Heartbeat {
                timestamp,
                sequence,
                payload,
            } => {
                out[0] = KIND_HEARTBEAT;
                out[1..9].copy_from_slice(&timestamp.to_be_bytes());
                out[9..17].copy_from_slice(&sequence.to_be_bytes());
                out[17..19].copy_from_slice(&(payload.len() as u16).to_be_bytes());
                out[19..19 + payload.len()].copy_from_slice(payload);
            }
        }
        len
    }

    fn encoded_len(&self) -> usize {
        match self {
            WireFrame::Data { payload, .. } => 20 + payload.len(),
            WireFrame::Ack { .. } => 21,
            WireFrame::Control { payload, .. } => 4 + payload.len(),
            WireFrame::Heartbeat { payload, .. } => 19 + payload.len(),
        }
    }

    /// Convenience: encode into a freshly allocated `Vec<u8>`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        let n = self.encode_to(&mut buf);
        debug_assert_eq!(n, buf.len());
        buf
    }
}

/// Owning decode: copies the payload into a new `Vec<u8>`.
pub fn decode(buf: &[u8]) -> Result<WireFrame, FrameError> {
    Ok(match decode_view(buf)? {
        WireFrameView::Data {
            stream_id,
            sequence,
            fin,
            payload,
        } => WireFrame::Data {
            stream_id,
            sequence,
            fin,
            payload: payload.to_vec(),
        },
        WireFrameView::Ack {
            stream_id,
            ack,
            bitmap,
        } => WireFrame::Ack {
            stream_id,
            ack,
            bitmap,
        },
        WireFrameView::Control { kind, payload } => WireFrame::Control {
            kind,
            payload: payload.to_vec(),
        },
        WireFrameView::Heartbeat {
            timestamp,
            sequence,
            payload,
        } => WireFrame::Heartbeat {
            timestamp,
            sequence,
            payload: payload.to_vec(),
        },
    })
}

/// Zero-copy decode: validates the buffer fully before returning a view
/// borrowing from it.
pub fn decode_view(buf: &[u8]) -> Result<WireFrameView<'_>, FrameError> {
    if buf.is_empty() {
        return Err(FrameError::Truncated);
    }
    match buf[0] {
        KIND_DATA => {
            if buf.len() < 20 {
                return Err(FrameError::Truncated);
            }
            let stream_id = u64::from_be_bytes(buf[1..9].try_into().unwrap());
            let sequence = u64::from_be_bytes(buf[9..17].try_into().unwrap());
            let fin = buf[17] != 0;
            let declared = u16::from_be_bytes(buf[18..20].try_into().unwrap()) as usize;
            if declared > MAX_PAYLOAD {
                return Err(FrameError::PayloadTooLarge);
            }
            if buf.len() - 20 != declared {
                return Err(FrameError::LengthMismatch);
            }
            Ok(WireFrameView::Data {
                stream_id,
                sequence,
                fin,
                payload: &buf[20..],
            })
        }
        KIND_ACK => {
            if buf.len() != 21 {
                return Err(if buf.len() < 21 {
                    FrameError::Truncated
                } else {
                    FrameError::LengthMismatch
                });
            }
            let stream_id = u64::from_be_bytes(buf[1..9].try_into().unwrap());
            let ack = u64::from_be_bytes(buf[9..17].try_into().unwrap());
            let bitmap = u32::from_be_bytes(buf[17..21].try_into().unwrap());
            Ok(WireFrameView::Ack {
                stream_id,
                ack,
                bitmap,
            })
        }
        KIND_CONTROL => {
            if buf.len() < 4 {
                return Err(FrameError::Truncated);
            }
            let kind = buf[1];
            let declared = u16::from_be_bytes(buf[2..4].try_into().unwrap()) as usize;
            if declared > MAX_PAYLOAD {
                return Err(FrameError::PayloadTooLarge);
            }
            if buf.len() - 4 != declared {
                return Err(FrameError::LengthMismatch);
            }
            Ok(WireFrameView::Control {
                kind,
                payload: &buf[4..],
            })
        }
        KIND_HEARTBEAT => {
            if buf.len() < 19 {
                return Err(FrameError::Truncated);
            }
            let timestamp = u64::from_be_bytes(buf[1..9].try_into().unwrap());
            let sequence = u64::from_be_bytes(buf[9..17].try_into().unwrap());
            let declared = u16::from_be_bytes(buf[17..19].try_into().unwrap()) as usize;
            if declared > MAX_PAYLOAD {
                return Err(FrameError::PayloadTooLarge);
            }
            if buf.len() - 19 != declared {
                return Err(FrameError::LengthMismatch);
            }
            Ok(WireFrameView::Heartbeat {
                timestamp,
                sequence,
                payload: &buf[19..],
            })
        }
        other => Err(FrameError::UnknownKind(other)),
    }
}

/// Control-frame type tags carried in `WireFrame::Control::kind`.
pub mod control_kind {
    pub const HANDSHAKE_RESPONSE: u8 = 0;
    pub const REKEY: u8 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrip() {
        let f = WireFrame::Data {
            stream_id: 1,
            sequence: 42,
            fin: false,
            payload: vec![1, 2, 3],
        };
        let encoded = f.encode();
        assert_eq!(decode(&encoded).unwrap(), f);
    }

    #[test]
    fn ack_roundtrip() {
        let f = WireFrame::Ack {
            stream_id: 7,
            ack: 100,
            bitmap: 0xDEAD_BEEF,
        };
        assert_eq!(decode(&f.encode()).unwrap(), f);
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        assert!(matches!(
            decode(&[255, 0, 0]),
            Err(FrameError::UnknownKind(255))
        ));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let f = WireFrame::Control {
            kind: 0,
            payload: vec![1, 2, 3, 4],
        };
        let mut encoded = f.encode();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            decode(&encoded),
            Err(FrameError::LengthMismatch)
        ));
    }

    #[test]
    fn encode_to_reports_too_small_buffer() {
        let f = WireFrame::Heartbeat {
            timestamp: 1,
            sequence: 2,
            payload: vec![0; 10],
        };
        let mut tiny = [0u8; 4];
        assert_eq!(f.encode_to(&mut tiny), 0);
    }
}
