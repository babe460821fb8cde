//! Keyed salted hashing
//!
//! Computes the proof-of-knowledge digest for the `$challenge` login
//! handshake. Only the digest of password, server salt and server challenge
//! is transmitted, never the password itself.
//!
//! The pad construction is part of the wire contract: the hashed password is
//! XORed into the first `len(hashed)` bytes of each 64-byte pad only, the
//! rest keeps the fill byte. The server computes the same thing, so this must
//! stay byte-for-byte as is and is deliberately not routed through a generic
//! HMAC implementation.

use sha1::{Digest, Sha1};

/// Width of the inner and outer pads in bytes
pub const PAD_LEN: usize = 64;

const IPAD_BYTE: u8 = 0x36;
const OPAD_BYTE: u8 = 0x5C;

/// Hash primitive driven by [`KeyedSaltedHasher`]
pub trait HashPrimitive {
    /// Discard any absorbed input.
    fn reset(&mut self);

    /// Feed bytes into the running hash.
    fn absorb(&mut self, data: &[u8]);

    /// Return the digest of everything absorbed since the last reset, then reset.
    fn finalize(&mut self) -> Vec<u8>;
}

impl HashPrimitive for Sha1 {
    fn reset(&mut self) {
        Digest::reset(self);
    }

    fn absorb(&mut self, data: &[u8]) {
        Digest::update(self, data);
    }

    fn finalize(&mut self) -> Vec<u8> {
        self.finalize_reset().to_vec()
    }
}

/// Digest builder for challenge authentication
#[derive(Clone, Default)]
pub struct KeyedSaltedHasher<H = Sha1> {
    hash: H,
}

impl KeyedSaltedHasher<Sha1> {
    /// Hasher over SHA-1, the primitive the server expects
    pub fn sha1() -> Self {
        Self::new(Sha1::new())
    }
}

impl<H: HashPrimitive> KeyedSaltedHasher<H> {
    pub fn new(hash: H) -> Self {
        Self { hash }
    }

    /// Compute `H(opad || H(ipad || challenge))` keyed with `H(password || salt)`.
    ///
    /// Deterministic; empty inputs are valid.
    pub fn digest(&mut self, password: &[u8], salt: &[u8], challenge: &[u8]) -> Vec<u8> {
        self.hash.reset();
        self.hash.absorb(password);
        self.hash.absorb(salt);
        let hashed_pwd = self.hash.finalize();

        let (ipad, opad) = keyed_pads(&hashed_pwd);

        self.hash.absorb(&ipad);
        self.hash.absorb(challenge);
        let inner = self.hash.finalize();

        self.hash.absorb(&opad);
        self.hash.absorb(&inner);
        self.hash.finalize()
    }
}

/// Build the inner and outer pads for `key`.
///
/// Only `key.len()` leading bytes are touched; keys longer than the pad are
/// cut at [`PAD_LEN`].
pub fn keyed_pads(key: &[u8]) -> ([u8; PAD_LEN], [u8; PAD_LEN]) {
    let mut ipad = [IPAD_BYTE; PAD_LEN];
    let mut opad = [OPAD_BYTE; PAD_LEN];

    for (i, k) in key.iter().take(PAD_LEN).enumerate() {
        ipad[i] ^= k;
        opad[i] ^= k;
    }

    (ipad, opad)
}
