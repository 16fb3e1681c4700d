//! Signature collaborator for the state transition.
//!
//! This is the additive test scheme rather than real pairing cryptography:
//! signing a message under a domain embeds the message digest and the public
//! key into a 96-byte value, and aggregation is big-integer addition modulo
//! 2^384 on both halves. It is able to detect signatures made with the wrong
//! key, the wrong message or the wrong domain, which is all the consensus
//! logic observes; it offers no security whatsoever.

use core::fmt;

use ethereum_types::H256;
use hashing::TreeHash;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

pub const PUBLIC_KEY_BYTES: usize = 48;
pub const SIGNATURE_BYTES: usize = 96;

const ZERO_PUBLIC_KEY: [u8; PUBLIC_KEY_BYTES] = [0; PUBLIC_KEY_BYTES];

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_BYTES]);

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_BYTES]);

/// An aggregate is the same kind of value as a single signature in this scheme.
pub type AggregateSignature = Signature;
pub type AggregatePublicKey = PublicKey;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derives a deterministic public key. Any injective-enough mapping works
    /// here; the low 32 bytes carry the secret so distinct keys stay distinct.
    pub fn public_key(&self) -> PublicKey {
        let mut bytes = ZERO_PUBLIC_KEY;
        bytes[PUBLIC_KEY_BYTES - 32..].copy_from_slice(&self.0);
        PublicKey(bytes)
    }

    pub fn sign(&self, message: H256, domain: u64) -> Signature {
        sign(&self.public_key(), message, domain)
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_PUBLIC_KEY
    }
}

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        Self(ZERO_PUBLIC_KEY)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0; SIGNATURE_BYTES])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "PublicKey(0x{})", hex::encode(&self.0[..]))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "Signature(0x{})", hex::encode(&self.0[..]))
    }
}

fn map_message(message: H256, domain: u64) -> [u8; PUBLIC_KEY_BYTES] {
    let mut mapped = ZERO_PUBLIC_KEY;
    mapped[8..40].copy_from_slice(message.as_bytes());
    mapped[40..].copy_from_slice(&domain.to_le_bytes());
    mapped
}

/// Addition modulo 2^384 over big-endian 48-byte values.
fn sum_mod(a: &[u8; PUBLIC_KEY_BYTES], b: &[u8; PUBLIC_KEY_BYTES]) -> [u8; PUBLIC_KEY_BYTES] {
    let mut result = ZERO_PUBLIC_KEY;
    let mut carry = 0_u16;
    for position in (0..PUBLIC_KEY_BYTES).rev() {
        let sum = u16::from(a[position]) + u16::from(b[position]) + carry;
        result[position] = sum as u8;
        carry = sum >> 8;
    }
    result
}

fn combine(mapped: &[u8; PUBLIC_KEY_BYTES], key: &[u8; PUBLIC_KEY_BYTES]) -> Signature {
    if *key == ZERO_PUBLIC_KEY {
        return Signature::default();
    }
    let mut bytes = [0; SIGNATURE_BYTES];
    bytes[..PUBLIC_KEY_BYTES].copy_from_slice(mapped);
    bytes[PUBLIC_KEY_BYTES..].copy_from_slice(key);
    Signature(bytes)
}

pub fn sign(public_key: &PublicKey, message: H256, domain: u64) -> Signature {
    combine(&map_message(message, domain), &public_key.0)
}

pub fn bls_verify(
    public_key: &PublicKey,
    message: H256,
    signature: &Signature,
    domain: u64,
) -> bool {
    sign(public_key, message, domain) == *signature
}

/// Verifies an aggregate built by [`aggregate_signatures`] against one message
/// per public key. Zero public keys contribute nothing, so an empty set of
/// signers verifies against the default signature.
pub fn bls_verify_multiple(
    public_keys: &[PublicKey],
    messages: &[H256],
    signature: &Signature,
    domain: u64,
) -> bool {
    if public_keys.len() != messages.len() {
        return false;
    }
    let mut message_acc = ZERO_PUBLIC_KEY;
    let mut key_acc = ZERO_PUBLIC_KEY;
    for (public_key, message) in public_keys.iter().zip(messages) {
        if !public_key.is_zero() {
            message_acc = sum_mod(&message_acc, &map_message(*message, domain));
            key_acc = sum_mod(&key_acc, &public_key.0);
        }
    }
    combine(&message_acc, &key_acc) == *signature
}

pub fn bls_aggregate_pubkeys(public_keys: &[PublicKey]) -> AggregatePublicKey {
    let mut accumulator = ZERO_PUBLIC_KEY;
    for public_key in public_keys {
        accumulator = sum_mod(&accumulator, &public_key.0);
    }
    PublicKey(accumulator)
}

pub fn aggregate_signatures<'signatures>(
    signatures: impl IntoIterator<Item = &'signatures Signature>,
) -> AggregateSignature {
    let mut message_acc = ZERO_PUBLIC_KEY;
    let mut key_acc = ZERO_PUBLIC_KEY;
    for signature in signatures {
        let mut message_half = ZERO_PUBLIC_KEY;
        let mut key_half = ZERO_PUBLIC_KEY;
        message_half.copy_from_slice(&signature.0[..PUBLIC_KEY_BYTES]);
        key_half.copy_from_slice(&signature.0[PUBLIC_KEY_BYTES..]);
        message_acc = sum_mod(&message_acc, &message_half);
        key_acc = sum_mod(&key_acc, &key_half);
    }
    combine(&message_acc, &key_acc)
}

impl TreeHash for PublicKey {
    fn tree_hash_root(&self) -> H256 {
        hashing::merkleize(&bytes_to_chunks(&self.0))
    }
}

impl TreeHash for Signature {
    fn tree_hash_root(&self) -> H256 {
        hashing::merkleize(&bytes_to_chunks(&self.0))
    }
}

fn bytes_to_chunks(bytes: &[u8]) -> Vec<H256> {
    bytes
        .chunks(32)
        .map(|chunk| {
            let mut padded = H256::zero();
            padded.as_bytes_mut()[..chunk.len()].copy_from_slice(chunk);
            padded
        })
        .collect()
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut bytes = ZERO_PUBLIC_KEY;
        deserialize_hex(&mut bytes, deserializer)?;
        Ok(Self(bytes))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut bytes = [0; SIGNATURE_BYTES];
        deserialize_hex(&mut bytes, deserializer)?;
        Ok(Self(bytes))
    }
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn deserialize_hex<'de, D: Deserializer<'de>>(
    output: &mut [u8],
    deserializer: D,
) -> Result<(), D::Error> {
    let string = String::deserialize(deserializer)?;
    let digits = string.trim_start_matches("0x");
    let bytes = hex::decode(digits).map_err(D::Error::custom)?;
    if bytes.len() != output.len() {
        return Err(D::Error::custom(format!(
            "expected {} bytes, got {}",
            output.len(),
            bytes.len(),
        )));
    }
    output.copy_from_slice(&bytes);
    Ok(())
}
