//! Participant-side toolkit
//!
//! Everything a participant computes off-line: its identity and encryption
//! keys, a random secret polynomial, the commitments and encrypted shares it
//! posts, the aggregates it reveals during a dispute, and the signatures that
//! make its shares attributable.

use crate::commitments::Commitment;
use crate::complaint::dispute::share_message;
use crate::curve::{
    evaluate_polynomial, g1_base_mul, g2_base_mul, prefix_evaluations, CurveBackend,
};
use crate::encryption::encrypt_share;
use crate::signature::{address_of, sign_message};
use crate::types::{
    Address, Digest, EncryptedShare, G1Point, G2Point, ParticipantIndex, Scalar, Signature,
};
use crate::{Error, Result};
use k256::ecdsa::SigningKey;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

/// A participant's secrets and the public data derived from them
pub struct Dealer {
    signing_key: SigningKey,
    decryption_key: Scalar,
    encryption_key: G1Point,
    coefficients: Vec<Scalar>,
    g1: Vec<G1Point>,
    g2: Vec<G2Point>,
}

impl Dealer {
    /// Generate fresh keys and a random polynomial of degree `t`
    pub fn new<B, R>(backend: &B, t: usize, rng: &mut R) -> Result<Self>
    where
        B: CurveBackend + ?Sized,
        R: RngCore + CryptoRng,
    {
        let signing_key = SigningKey::random(&mut *rng);
        let decryption_key = backend.random_scalar(&mut *rng);
        let encryption_key = g1_base_mul(backend, &decryption_key)
            .ok_or_else(|| Error::Internal("Failed to derive encryption key".into()))?;

        let coefficients: Vec<Scalar> = (0..=t)
            .map(|_| backend.random_scalar(&mut *rng))
            .collect();
        let g1 = coefficients
            .iter()
            .map(|c| g1_base_mul(backend, c))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Internal("Failed to commit in G1".into()))?;
        let g2 = coefficients
            .iter()
            .map(|c| g2_base_mul(backend, c))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Internal("Failed to commit in G2".into()))?;

        Ok(Self {
            signing_key,
            decryption_key,
            encryption_key,
            coefficients,
            g1,
            g2,
        })
    }

    /// Address this participant enrolls with
    pub fn identity(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    pub fn encryption_key(&self) -> &G1Point {
        &self.encryption_key
    }

    pub fn decryption_key(&self) -> &Scalar {
        &self.decryption_key
    }

    /// Coefficient commitments in G1
    pub fn commitments_g1(&self) -> &[G1Point] {
        &self.g1
    }

    /// Coefficient commitments in G2
    pub fn commitments_g2(&self) -> &[G2Point] {
        &self.g2
    }

    /// Digest to post at enrollment
    pub fn commitment_digest(&self) -> Digest {
        Commitment::digest(&self.g1, &self.g2)
    }

    /// Share for the participant at `recipient`: `f(recipient)`
    pub fn share_for<B: CurveBackend + ?Sized>(
        &self,
        backend: &B,
        recipient: ParticipantIndex,
    ) -> Result<Scalar> {
        evaluate_polynomial(backend, &self.coefficients, recipient as u64)
            .ok_or_else(|| Error::Internal(format!("Failed to evaluate share for {recipient}")))
    }

    /// Encrypted shares for every participant, given their encryption keys
    /// in index order
    pub fn encrypted_shares<B: CurveBackend + ?Sized>(
        &self,
        backend: &B,
        recipient_keys: &[G1Point],
    ) -> Result<Vec<EncryptedShare>> {
        recipient_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let mut share = self.share_for(backend, i + 1)?;
                let encrypted = encrypt_share(backend, &share, &self.decryption_key, key);
                share.zeroize();
                encrypted.ok_or_else(|| {
                    Error::Internal(format!("Encryption key of participant {} is invalid", i + 1))
                })
            })
            .collect()
    }

    /// Aggregates `A_k` of the committed polynomial at `recipient`, as the
    /// accused reveals them in a dispute
    pub fn prefix_aggregates<B: CurveBackend + ?Sized>(
        &self,
        backend: &B,
        recipient: ParticipantIndex,
    ) -> Result<Vec<G1Point>> {
        prefix_evaluations(backend, &self.g1, recipient as u64)
            .ok_or_else(|| Error::Internal("Failed to aggregate commitments".into()))
    }

    /// Sign the share this dealer (at `dealer`) sent to `recipient`
    pub fn sign_share(
        &self,
        dealer: ParticipantIndex,
        recipient: ParticipantIndex,
        share: &EncryptedShare,
    ) -> Result<Signature> {
        sign_message(&self.signing_key, &share_message(dealer, recipient, share))
    }
}

impl Drop for Dealer {
    fn drop(&mut self) {
        self.decryption_key.zeroize();
        for coefficient in &mut self.coefficients {
            coefficient.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{evaluate_commitment, Bls12381};
    use crate::encryption::decrypt_share;
    use crate::signature::{EcdsaVerifier, SignatureVerifier};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_shares_verify_against_commitments() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let dealers: Vec<Dealer> = (0..3)
            .map(|_| Dealer::new(&backend, 1, &mut rng).unwrap())
            .collect();
        let keys: Vec<G1Point> = dealers.iter().map(|d| d.encryption_key().clone()).collect();

        let shares = dealers[0].encrypted_shares(&backend, &keys).unwrap();
        assert_eq!(shares.len(), 3);
        for (j, recipient) in dealers.iter().enumerate() {
            let share = decrypt_share(
                &backend,
                &shares[j],
                recipient.decryption_key(),
                dealers[0].encryption_key(),
            )
            .unwrap();
            let actual = g1_base_mul(&backend, &share).unwrap();
            let expected =
                evaluate_commitment(&backend, dealers[0].commitments_g1(), j as u64 + 1).unwrap();
            assert!(backend.g1_equal(&actual, &expected));
        }
    }

    #[test]
    fn test_commitments_pair() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(32);
        let dealer = Dealer::new(&backend, 2, &mut rng).unwrap();
        assert_eq!(dealer.commitments_g1().len(), 3);
        for (g1, g2) in dealer.commitments_g1().iter().zip(dealer.commitments_g2()) {
            assert!(backend.pairing_matches(g1, g2));
        }
        assert_eq!(
            dealer.commitment_digest(),
            Commitment::digest(dealer.commitments_g1(), dealer.commitments_g2())
        );
    }

    #[test]
    fn test_signed_share_is_attributable() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(33);
        let dealer = Dealer::new(&backend, 1, &mut rng).unwrap();
        let other = Dealer::new(&backend, 1, &mut rng).unwrap();

        let share = EncryptedShare([5u8; 32]);
        let signature = dealer.sign_share(1, 2, &share).unwrap();
        let message = share_message(1, 2, &share);
        assert!(EcdsaVerifier.verify(&dealer.identity(), &message, &signature));
        assert!(!EcdsaVerifier.verify(&other.identity(), &message, &signature));
    }
}
