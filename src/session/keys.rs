//! `SessionKeys`: the four fixed-size byte arrays derived at handshake time
//! and re-derived on rekey (§3, §4.5). Zeroed on drop.

use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SESSION_KEY_MATERIAL_LEN: usize = 32 + 32 + 12 + 12; // 88 bytes

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub send_key: [u8; 32],
    pub recv_key: [u8; 32],
    pub send_nonce_base: [u8; 12],
    pub recv_nonce_base: [u8; 12],
}

impl SessionKeys {
    /// Splits 88 bytes of HKDF output into the four fields, in declaration
    /// order, with directions assigned so that the initiator's `send` half
    /// matches the responder's `recv` half and vice versa.
    ///
    /// `material` must be exactly [`SESSION_KEY_MATERIAL_LEN`] bytes, laid
    /// out as `first_key(32) || second_key(32) || first_nonce(12) ||
    /// second_nonce(12)`. `is_initiator` selects which half becomes `send`.
    pub fn from_material(material: &[u8], is_initiator: bool) -> Self {
        debug_assert_eq!(material.len(), SESSION_KEY_MATERIAL_LEN);
        let mut first_key = [0u8; 32];
        let mut second_key = [0u8; 32];
        let mut first_nonce = [0u8; 12];
        let mut second_nonce = [0u8; 12];
        first_key.copy_from_slice(&material[0..32]);
        second_key.copy_from_slice(&material[32..64]);
        first_nonce.copy_from_slice(&material[64..76]);
        second_nonce.copy_from_slice(&material[76..88]);

        if is_initiator {
            SessionKeys {
                send_key: first_key,
                recv_key: second_key,
                send_nonce_base: first_nonce,
                recv_nonce_base: second_nonce,
            }
        } else {
            SessionKeys {
                send_key: second_key,
                recv_key: first_key,
                send_nonce_base: second_nonce,
                recv_nonce_base: first_nonce,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiator_and_responder_see_opposite_directions() {
        let material: Vec<u8> = (0..SESSION_KEY_MATERIAL_LEN as u8).collect();
        let initiator = SessionKeys::from_material(&material, true);
        let responder = SessionKeys::from_material(&material, false);
        assert_eq!(initiator.send_key, responder.recv_key);
        assert_eq!(initiator.recv_key, responder.send_key);
        assert_eq!(initiator.send_nonce_base, responder.recv_nonce_base);
    }
}
