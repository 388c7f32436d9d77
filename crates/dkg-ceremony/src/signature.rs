//! Authorship proofs for disputed data
//!
//! Identities are 20-byte addresses: the last 20 bytes of the keccak-256
//! hash of an uncompressed secp256k1 public key. A signature proves
//! authorship when the key recovered from `(keccak256(message), signature)`
//! hashes to the claimed address.

use crate::types::{Address, Digest, Signature};
use crate::{Error, Result};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use tiny_keccak::{Hasher, Keccak};

/// Checks that a claimed signer produced a signature over a message
pub trait SignatureVerifier {
    /// True iff `signature` over `message` was made by `claimed_signer`
    fn verify(&self, claimed_signer: &Address, message: &[u8], signature: &Signature) -> bool;
}

/// secp256k1 public-key recovery verifier
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn verify(&self, claimed_signer: &Address, message: &[u8], signature: &Signature) -> bool {
        match recover_signer(message, signature) {
            Ok(signer) => signer == *claimed_signer,
            Err(_) => false,
        }
    }
}

/// keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> Digest {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Address of a secp256k1 public key
pub fn address_of(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// Recover the address that signed `message`
pub fn recover_signer(message: &[u8], signature: &Signature) -> Result<Address> {
    let prehash = keccak256(message);

    // Accept both raw (0/1) and Ethereum-style (27/28) recovery ids
    let v = if signature.recovery_id >= 27 {
        signature.recovery_id - 27
    } else {
        signature.recovery_id
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| Error::InvalidProof(format!("Invalid recovery id {}", signature.recovery_id)))?;

    let sig = EcdsaSignature::from_scalars(
        *k256::FieldBytes::from_slice(&signature.r),
        *k256::FieldBytes::from_slice(&signature.s),
    )
    .map_err(|e| Error::InvalidProof(e.to_string()))?;

    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|e| Error::InvalidProof(e.to_string()))?;

    Ok(address_of(&key))
}

/// Sign `message` so that [`recover_signer`] returns the signer's address
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Result<Signature> {
    let prehash = keccak256(message);
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(&prehash)
        .map_err(|e| Error::Internal(e.to_string()))?;

    let bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);

    Ok(Signature::new(r, s, recovery_id.to_byte()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let key = SigningKey::random(&mut rng);
        let signer = address_of(key.verifying_key());

        let sig = sign_message(&key, b"encrypted share").unwrap();
        assert_eq!(recover_signer(b"encrypted share", &sig).unwrap(), signer);
        assert!(EcdsaVerifier.verify(&signer, b"encrypted share", &sig));
    }

    #[test]
    fn test_rejects_other_signer_or_message() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let alice = SigningKey::random(&mut rng);
        let bob = SigningKey::random(&mut rng);
        let bob_address = address_of(bob.verifying_key());

        let sig = sign_message(&alice, b"share").unwrap();
        assert!(!EcdsaVerifier.verify(&bob_address, b"share", &sig));

        let sig = sign_message(&bob, b"share").unwrap();
        assert!(!EcdsaVerifier.verify(&bob_address, b"forged share", &sig));
    }

    #[test]
    fn test_ethereum_recovery_id() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let key = SigningKey::random(&mut rng);
        let signer = address_of(key.verifying_key());

        let mut sig = sign_message(&key, b"payload").unwrap();
        sig.recovery_id += 27;
        assert!(EcdsaVerifier.verify(&signer, b"payload", &sig));

        sig.recovery_id = 9;
        assert!(!EcdsaVerifier.verify(&signer, b"payload", &sig));
    }

    #[test]
    fn test_zero_signature_rejected() {
        let sig = Signature::new([0u8; 32], [0u8; 32], 0);
        assert!(recover_signer(b"payload", &sig).is_err());
    }
}
