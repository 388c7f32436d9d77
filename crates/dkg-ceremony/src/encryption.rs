//! Pairwise share encryption
//!
//! Each participant enrolls a G1 encryption key `pk = sk · g`. A dealer
//! encrypts the share for recipient `j` with a one-time pad derived from the
//! Diffie-Hellman point `sk_dealer · pk_j`, which the recipient recomputes as
//! `sk_j · pk_dealer`. Revealing `sk_j` therefore lets anyone decrypt the
//! shares addressed to `j`, which is what a private-commitment complaint does.

use crate::curve::CurveBackend;
use crate::types::{EncryptedShare, G1Point, Scalar};
use sha2::{Digest, Sha256};

const PAD_DOMAIN: &[u8] = b"DKG_SHARE_PAD_V1";

/// Pad shared by `my_secret` and the holder of `their_key`
fn shared_pad<B: CurveBackend + ?Sized>(
    backend: &B,
    their_key: &G1Point,
    my_secret: &Scalar,
) -> Option<[u8; 32]> {
    let shared = backend.g1_mul(their_key, my_secret)?;
    let digest = Sha256::new()
        .chain_update(PAD_DOMAIN)
        .chain_update(shared.as_bytes())
        .finalize();
    let mut pad = [0u8; 32];
    pad.copy_from_slice(&digest);
    Some(pad)
}

fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Encrypt `share` from the dealer to the owner of `recipient_key`
pub fn encrypt_share<B: CurveBackend + ?Sized>(
    backend: &B,
    share: &Scalar,
    dealer_secret: &Scalar,
    recipient_key: &G1Point,
) -> Option<EncryptedShare> {
    let pad = shared_pad(backend, recipient_key, dealer_secret)?;
    Some(EncryptedShare(xor(&share.0, &pad)))
}

/// Decrypt a share addressed to the holder of `recipient_secret`
///
/// The result is raw bytes: callers must check it is a canonical scalar
/// before treating it as a share.
pub fn decrypt_share<B: CurveBackend + ?Sized>(
    backend: &B,
    encrypted: &EncryptedShare,
    recipient_secret: &Scalar,
    dealer_key: &G1Point,
) -> Option<Scalar> {
    let pad = shared_pad(backend, dealer_key, recipient_secret)?;
    Some(Scalar(xor(&encrypted.0, &pad)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{g1_base_mul, Bls12381};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_recipient_recovers_share() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let dealer_sk = backend.random_scalar(&mut rng);
        let recipient_sk = backend.random_scalar(&mut rng);
        let dealer_pk = g1_base_mul(&backend, &dealer_sk).unwrap();
        let recipient_pk = g1_base_mul(&backend, &recipient_sk).unwrap();

        let share = backend.random_scalar(&mut rng);
        let encrypted = encrypt_share(&backend, &share, &dealer_sk, &recipient_pk).unwrap();
        assert_ne!(encrypted.0, share.0);

        let decrypted = decrypt_share(&backend, &encrypted, &recipient_sk, &dealer_pk).unwrap();
        assert_eq!(decrypted, share);
    }

    #[test]
    fn test_wrong_key_yields_other_bytes() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let dealer_sk = backend.random_scalar(&mut rng);
        let recipient_sk = backend.random_scalar(&mut rng);
        let stranger_sk = backend.random_scalar(&mut rng);
        let dealer_pk = g1_base_mul(&backend, &dealer_sk).unwrap();
        let recipient_pk = g1_base_mul(&backend, &recipient_sk).unwrap();

        let share = backend.random_scalar(&mut rng);
        let encrypted = encrypt_share(&backend, &share, &dealer_sk, &recipient_pk).unwrap();
        let decrypted = decrypt_share(&backend, &encrypted, &stranger_sk, &dealer_pk).unwrap();
        assert_ne!(decrypted, share);
    }

    #[test]
    fn test_invalid_dealer_key() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let sk = backend.random_scalar(&mut rng);
        let garbage = G1Point(vec![0u8; 48]);
        assert!(decrypt_share(&backend, &EncryptedShare([0u8; 32]), &sk, &garbage).is_none());
    }
}
