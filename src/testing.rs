//! Producer-side test double
//!
//! Seals chunks exactly as libsodium's `crypto_secretstream_xchacha20poly1305_push`
//! does, driving the same state machine as [`PullStream`] so both ends stay
//! in lockstep.

use crate::format::{StreamHeader, TagKind, KEY_SIZE};
use crate::secret::DerivedKey;
use crate::stream::{compute_mac, PullStream};
use chacha20::cipher::StreamCipher;
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;

pub(crate) struct PushStream {
    state: PullStream,
}

impl PushStream {
    pub(crate) fn new(key: &[u8; KEY_SIZE], header: &StreamHeader) -> Self {
        let key = DerivedKey::new(*key);
        Self {
            state: PullStream::init(&key, header),
        }
    }

    pub(crate) fn push(&mut self, message: &[u8], ad: &[u8], tag: TagKind) -> Vec<u8> {
        self.push_raw_tag(message, ad, tag.as_byte())
    }

    /// Seal with an arbitrary tag byte, including ones a conforming
    /// producer never emits
    pub(crate) fn push_raw_tag(&mut self, message: &[u8], ad: &[u8], tag: u8) -> Vec<u8> {
        let mut cipher = self.state.cipher();

        let mut block = [0u8; 64];
        cipher.apply_keystream(&mut block);
        let mut poly = Poly1305::new(poly1305::Key::from_slice(&block[..KEY_SIZE]));
        poly.update_padded(ad);

        block = [0u8; 64];
        block[0] = tag;
        cipher.apply_keystream(&mut block);
        poly.update_padded(&block);

        let mut ciphertext = message.to_vec();
        cipher.apply_keystream(&mut ciphertext);

        let mac = compute_mac(poly, &ciphertext, ad.len());

        let mut chunk = Vec::with_capacity(1 + ciphertext.len() + mac.len());
        chunk.push(block[0]);
        chunk.extend_from_slice(&ciphertext);
        chunk.extend_from_slice(&mac);

        self.state.advance(&mac, tag & TagKind::Rekey.as_byte() != 0);
        chunk
    }

    pub(crate) fn rekey(&mut self) {
        self.state.ratchet();
    }

    pub(crate) fn set_counter(&mut self, counter: u32) {
        self.state.set_counter(counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ABYTES;

    #[test]
    fn test_chunk_layout() {
        let mut push = PushStream::new(&[1u8; KEY_SIZE], &StreamHeader::new([2u8; 24]));
        let chunk = push.push(b"twelve bytes", &[], TagKind::Message);
        assert_eq!(chunk.len(), 12 + ABYTES);
    }

    #[test]
    fn test_matches_libsodium_push() {
        // libsodium 1.0.18, see tests/libsodium_vectors.rs
        let key: [u8; KEY_SIZE] =
            hex::decode("2df47ede6358ed17a9976d4fcedb897a10036d432a4acef17d263bfc98bd20ac")
                .unwrap()
                .try_into()
                .unwrap();
        let header = StreamHeader::from_bytes(
            &hex::decode("29ba9a741c083a8bb7701a3c8c8b5c910ec4bf41a913c0ad").unwrap(),
        )
        .unwrap();

        let mut push = PushStream::new(&key, &header);
        assert_eq!(
            hex::encode(push.push(b"Hello, ", &[], TagKind::Message)),
            "923ebfcc0684af02d0e3465bf9d742975f371d17345842e9"
        );
        assert_eq!(
            hex::encode(push.push(b"streaming ", &[], TagKind::Push)),
            "a6347d498b6aa2439c81e2087fe0b3c01f569f0b03420e68c0bc40"
        );
        assert_eq!(
            hex::encode(push.push(b"world", &[], TagKind::Rekey)),
            "9608ebfad9fd2e7db742b842e06bcaeea3bb14b6467a"
        );
        assert_eq!(
            hex::encode(push.push(b"", &[], TagKind::Message)),
            "f0f0f9df6cd4d9c8612a3ed4ee5e5693ea"
        );
    }

    #[test]
    fn test_same_input_different_position() {
        let mut push = PushStream::new(&[1u8; KEY_SIZE], &StreamHeader::new([2u8; 24]));
        let first = push.push(b"repeat", &[], TagKind::Message);
        let second = push.push(b"repeat", &[], TagKind::Message);
        assert_ne!(first, second);
    }
}
