//! Curve arithmetic consumed by the ceremony
//!
//! The protocol never touches curve internals. It hands encoded points to a
//! [`CurveBackend`] and reads back encoded results, the same way a contract
//! calls add/multiply/pairing precompiles. Any operation on bytes that do not
//! describe a group element yields `None`.

use crate::types::{G1Point, G2Point, Scalar};
use rand_core::RngCore;

mod bls12381;

pub use bls12381::Bls12381;

/// Pure-function curve library with two pairing-friendly groups
pub trait CurveBackend {
    /// Generator of G1
    fn g1_generator(&self) -> G1Point;

    /// Generator of G2
    fn g2_generator(&self) -> G2Point;

    /// Whether the bytes encode an element of G1
    fn g1_is_member(&self, point: &G1Point) -> bool;

    /// Whether the bytes encode an element of G2
    fn g2_is_member(&self, point: &G2Point) -> bool;

    /// Group equality of two encodings (false if either is not a member)
    fn g1_equal(&self, a: &G1Point, b: &G1Point) -> bool {
        self.g1_is_member(a) && self.g1_is_member(b) && a == b
    }

    /// `a + b` in G1
    fn g1_add(&self, a: &G1Point, b: &G1Point) -> Option<G1Point>;

    /// `s · p` in G1
    fn g1_mul(&self, point: &G1Point, scalar: &Scalar) -> Option<G1Point>;

    /// `a + b` in G2
    fn g2_add(&self, a: &G2Point, b: &G2Point) -> Option<G2Point>;

    /// `s · p` in G2
    fn g2_mul(&self, point: &G2Point, scalar: &Scalar) -> Option<G2Point>;

    /// Whether `g1` and `g2` share a discrete log: `e(g1, h) == e(g, g2)`
    fn pairing_matches(&self, g1: &G1Point, g2: &G2Point) -> bool;

    /// Whether the bytes are a reduced element of the scalar field
    fn scalar_is_canonical(&self, scalar: &Scalar) -> bool;

    /// Embed a small integer into the scalar field
    fn scalar_from_u64(&self, value: u64) -> Scalar;

    /// `a + b` in the scalar field
    fn scalar_add(&self, a: &Scalar, b: &Scalar) -> Option<Scalar>;

    /// `a · b` in the scalar field
    fn scalar_mul(&self, a: &Scalar, b: &Scalar) -> Option<Scalar>;

    /// Uniformly random scalar
    fn random_scalar(&self, rng: &mut dyn RngCore) -> Scalar;
}

/// `s · g` for the G1 generator
pub fn g1_base_mul<B: CurveBackend + ?Sized>(backend: &B, scalar: &Scalar) -> Option<G1Point> {
    backend.g1_mul(&backend.g1_generator(), scalar)
}

/// `s · h` for the G2 generator
pub fn g2_base_mul<B: CurveBackend + ?Sized>(backend: &B, scalar: &Scalar) -> Option<G2Point> {
    backend.g2_mul(&backend.g2_generator(), scalar)
}

/// Running sums `A_k = Σ_{i≤k} C_i · x^i` of a committed polynomial at `x`
///
/// The last element is the commitment to the polynomial's value at `x`.
/// Returns `None` if any coefficient commitment is not in G1 or the slice
/// is empty.
pub fn prefix_evaluations<B: CurveBackend + ?Sized>(
    backend: &B,
    commitments: &[G1Point],
    x: u64,
) -> Option<Vec<G1Point>> {
    let x = backend.scalar_from_u64(x);
    let mut power = backend.scalar_from_u64(1);
    let mut sums: Vec<G1Point> = Vec::with_capacity(commitments.len());

    for commitment in commitments {
        let term = backend.g1_mul(commitment, &power)?;
        let sum = match sums.last() {
            Some(previous) => backend.g1_add(previous, &term)?,
            None => term,
        };
        sums.push(sum);
        power = backend.scalar_mul(&power, &x)?;
    }

    if sums.is_empty() {
        None
    } else {
        Some(sums)
    }
}

/// `Σ C_k · x^k`: the commitment to the polynomial's value at `x`
pub fn evaluate_commitment<B: CurveBackend + ?Sized>(
    backend: &B,
    commitments: &[G1Point],
    x: u64,
) -> Option<G1Point> {
    prefix_evaluations(backend, commitments, x)?.pop()
}

/// `C_k · x^k`: the single term of index `k`
pub fn commitment_term<B: CurveBackend + ?Sized>(
    backend: &B,
    commitment: &G1Point,
    x: u64,
    k: usize,
) -> Option<G1Point> {
    let x = backend.scalar_from_u64(x);
    let mut power = backend.scalar_from_u64(1);
    for _ in 0..k {
        power = backend.scalar_mul(&power, &x)?;
    }
    backend.g1_mul(commitment, &power)
}

/// Evaluate a scalar polynomial (coefficients low degree first) at `x`
pub fn evaluate_polynomial<B: CurveBackend + ?Sized>(
    backend: &B,
    coefficients: &[Scalar],
    x: u64,
) -> Option<Scalar> {
    let x = backend.scalar_from_u64(x);
    let mut result = backend.scalar_from_u64(0);
    let mut power = backend.scalar_from_u64(1);

    for coefficient in coefficients {
        let term = backend.scalar_mul(coefficient, &power)?;
        result = backend.scalar_add(&result, &term)?;
        power = backend.scalar_mul(&power, &x)?;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_prefix_evaluations_match_share() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let coefficients: Vec<Scalar> = (0..4).map(|_| backend.random_scalar(&mut rng)).collect();
        let commitments: Vec<G1Point> = coefficients
            .iter()
            .map(|c| g1_base_mul(&backend, c).unwrap())
            .collect();

        let x = 5;
        let sums = prefix_evaluations(&backend, &commitments, x).unwrap();
        assert_eq!(sums.len(), 4);

        let share = evaluate_polynomial(&backend, &coefficients, x).unwrap();
        let expected = g1_base_mul(&backend, &share).unwrap();
        assert!(backend.g1_equal(&sums[3], &expected));

        // Every partial sum differs from the next by exactly one term
        for k in 1..4 {
            let term = commitment_term(&backend, &commitments[k], x, k).unwrap();
            let stepped = backend.g1_add(&sums[k - 1], &term).unwrap();
            assert!(backend.g1_equal(&stepped, &sums[k]));
        }
    }

    #[test]
    fn test_prefix_evaluations_reject_garbage() {
        let backend = Bls12381;
        let garbage = G1Point(vec![0x11; 48]);
        assert!(prefix_evaluations(&backend, &[garbage], 1).is_none());
        assert!(prefix_evaluations(&backend, &[], 1).is_none());
    }
}
