//! BLS12-381 backend over `blst`
//!
//! Points travel as compressed encodings (48 bytes in G1, 96 in G2).
//! Decoding checks both curve and subgroup membership and rejects the
//! point at infinity, so anything that decodes is a usable group element.

use super::CurveBackend;
use crate::types::{G1Point, G2Point, Scalar};
use blst::{
    blst_bendian_from_scalar, blst_final_exp, blst_fp12, blst_fp12_is_equal, blst_fr,
    blst_fr_add, blst_fr_from_scalar, blst_fr_from_uint64, blst_fr_mul, blst_keygen_v3,
    blst_miller_loop, blst_p1, blst_p1_add_or_double, blst_p1_affine, blst_p1_compress,
    blst_p1_from_affine, blst_p1_in_g1, blst_p1_is_inf, blst_p1_mult, blst_p1_to_affine,
    blst_p1_uncompress, blst_p2, blst_p2_add_or_double, blst_p2_affine, blst_p2_compress,
    blst_p2_from_affine, blst_p2_in_g2, blst_p2_is_inf, blst_p2_mult, blst_p2_to_affine,
    blst_p2_uncompress, blst_scalar, blst_scalar_fr_check, blst_scalar_from_bendian,
    blst_scalar_from_fr, BLS12_381_G1, BLS12_381_G2, BLST_ERROR,
};
use rand_core::RngCore;
use std::ptr;

/// Compressed size of a G1 element
pub const G1_LENGTH: usize = 48;

/// Compressed size of a G2 element
pub const G2_LENGTH: usize = 96;

const SCALAR_LENGTH: usize = 32;

/// BLS12-381 curve backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Bls12381;

/// Size in bits of a little-endian `blst_scalar`
fn bits(scalar: &blst_scalar) -> usize {
    let mut bits: usize = SCALAR_LENGTH * 8;
    for i in scalar.b.iter().rev() {
        let leading = i.leading_zeros();
        bits -= leading as usize;
        if leading < 8 {
            break;
        }
    }
    bits
}

fn decode_scalar(scalar: &Scalar) -> Option<blst_scalar> {
    let mut ret = blst_scalar::default();
    unsafe {
        blst_scalar_from_bendian(&mut ret, scalar.0.as_ptr());
        if !blst_scalar_fr_check(&ret) {
            return None;
        }
    }
    Some(ret)
}

fn decode_fr(scalar: &Scalar) -> Option<blst_fr> {
    let decoded = decode_scalar(scalar)?;
    let mut ret = blst_fr::default();
    unsafe { blst_fr_from_scalar(&mut ret, &decoded) };
    Some(ret)
}

fn encode_fr(fr: &blst_fr) -> Scalar {
    let mut bytes = [0u8; SCALAR_LENGTH];
    unsafe {
        let mut scalar = blst_scalar::default();
        blst_scalar_from_fr(&mut scalar, fr);
        blst_bendian_from_scalar(bytes.as_mut_ptr(), &scalar);
    }
    Scalar(bytes)
}

fn decode_p1(point: &G1Point) -> Option<blst_p1> {
    if point.0.len() != G1_LENGTH {
        return None;
    }
    let mut ret = blst_p1::default();
    unsafe {
        let mut affine = blst_p1_affine::default();
        if blst_p1_uncompress(&mut affine, point.0.as_ptr()) != BLST_ERROR::BLST_SUCCESS {
            return None;
        }
        blst_p1_from_affine(&mut ret, &affine);
        if blst_p1_is_inf(&ret) {
            return None;
        }
        if !blst_p1_in_g1(&ret) {
            return None;
        }
    }
    Some(ret)
}

fn encode_p1(point: &blst_p1) -> G1Point {
    let mut bytes = [0u8; G1_LENGTH];
    unsafe {
        blst_p1_compress(bytes.as_mut_ptr(), point);
    }
    G1Point(bytes.to_vec())
}

fn decode_p2(point: &G2Point) -> Option<blst_p2> {
    if point.0.len() != G2_LENGTH {
        return None;
    }
    let mut ret = blst_p2::default();
    unsafe {
        let mut affine = blst_p2_affine::default();
        if blst_p2_uncompress(&mut affine, point.0.as_ptr()) != BLST_ERROR::BLST_SUCCESS {
            return None;
        }
        blst_p2_from_affine(&mut ret, &affine);
        if blst_p2_is_inf(&ret) {
            return None;
        }
        if !blst_p2_in_g2(&ret) {
            return None;
        }
    }
    Some(ret)
}

fn encode_p2(point: &blst_p2) -> G2Point {
    let mut bytes = [0u8; G2_LENGTH];
    unsafe {
        blst_p2_compress(bytes.as_mut_ptr(), point);
    }
    G2Point(bytes.to_vec())
}

fn pairing(p: &blst_p1, q: &blst_p2) -> blst_fp12 {
    let mut pa = blst_p1_affine::default();
    let mut qa = blst_p2_affine::default();
    let mut res = blst_fp12::default();
    unsafe {
        blst_p1_to_affine(&mut pa, p);
        blst_p2_to_affine(&mut qa, q);
        blst_miller_loop(&mut res, &qa, &pa);
        blst_final_exp(&mut res, &res);
    }
    res
}

fn p1_generator() -> blst_p1 {
    let mut ret = blst_p1::default();
    unsafe {
        blst_p1_from_affine(&mut ret, &BLS12_381_G1);
    }
    ret
}

fn p2_generator() -> blst_p2 {
    let mut ret = blst_p2::default();
    unsafe {
        blst_p2_from_affine(&mut ret, &BLS12_381_G2);
    }
    ret
}

impl CurveBackend for Bls12381 {
    fn g1_generator(&self) -> G1Point {
        encode_p1(&p1_generator())
    }

    fn g2_generator(&self) -> G2Point {
        encode_p2(&p2_generator())
    }

    fn g1_is_member(&self, point: &G1Point) -> bool {
        decode_p1(point).is_some()
    }

    fn g2_is_member(&self, point: &G2Point) -> bool {
        decode_p2(point).is_some()
    }

    fn g1_equal(&self, a: &G1Point, b: &G1Point) -> bool {
        match (decode_p1(a), decode_p1(b)) {
            (Some(a), Some(b)) => encode_p1(&a) == encode_p1(&b),
            _ => false,
        }
    }

    fn g1_add(&self, a: &G1Point, b: &G1Point) -> Option<G1Point> {
        let a = decode_p1(a)?;
        let b = decode_p1(b)?;
        let mut ret = blst_p1::default();
        unsafe {
            blst_p1_add_or_double(&mut ret, &a, &b);
        }
        Some(encode_p1(&ret))
    }

    fn g1_mul(&self, point: &G1Point, scalar: &Scalar) -> Option<G1Point> {
        let point = decode_p1(point)?;
        let scalar = decode_scalar(scalar)?;
        let mut ret = blst_p1::default();
        unsafe {
            blst_p1_mult(&mut ret, &point, scalar.b.as_ptr(), bits(&scalar));
        }
        Some(encode_p1(&ret))
    }

    fn g2_add(&self, a: &G2Point, b: &G2Point) -> Option<G2Point> {
        let a = decode_p2(a)?;
        let b = decode_p2(b)?;
        let mut ret = blst_p2::default();
        unsafe {
            blst_p2_add_or_double(&mut ret, &a, &b);
        }
        Some(encode_p2(&ret))
    }

    fn g2_mul(&self, point: &G2Point, scalar: &Scalar) -> Option<G2Point> {
        let point = decode_p2(point)?;
        let scalar = decode_scalar(scalar)?;
        let mut ret = blst_p2::default();
        unsafe {
            blst_p2_mult(&mut ret, &point, scalar.b.as_ptr(), bits(&scalar));
        }
        Some(encode_p2(&ret))
    }

    fn pairing_matches(&self, g1: &G1Point, g2: &G2Point) -> bool {
        let (Some(p), Some(q)) = (decode_p1(g1), decode_p2(g2)) else {
            return false;
        };
        let left = pairing(&p, &p2_generator());
        let right = pairing(&p1_generator(), &q);
        unsafe { blst_fp12_is_equal(&left, &right) }
    }

    fn scalar_is_canonical(&self, scalar: &Scalar) -> bool {
        decode_scalar(scalar).is_some()
    }

    fn scalar_from_u64(&self, value: u64) -> Scalar {
        // blst reads four limbs; a shorter buffer would be read past its end
        let buffer = [value, 0, 0, 0];
        let mut ret = blst_fr::default();
        unsafe { blst_fr_from_uint64(&mut ret, buffer.as_ptr()) };
        encode_fr(&ret)
    }

    fn scalar_add(&self, a: &Scalar, b: &Scalar) -> Option<Scalar> {
        let a = decode_fr(a)?;
        let b = decode_fr(b)?;
        let mut ret = blst_fr::default();
        unsafe { blst_fr_add(&mut ret, &a, &b) };
        Some(encode_fr(&ret))
    }

    fn scalar_mul(&self, a: &Scalar, b: &Scalar) -> Option<Scalar> {
        let a = decode_fr(a)?;
        let b = decode_fr(b)?;
        let mut ret = blst_fr::default();
        unsafe { blst_fr_mul(&mut ret, &a, &b) };
        Some(encode_fr(&ret))
    }

    fn random_scalar(&self, rng: &mut dyn RngCore) -> Scalar {
        let mut ikm = [0u8; 64];
        rng.fill_bytes(&mut ikm);

        let mut ret = blst_fr::default();
        unsafe {
            let mut sc = blst_scalar::default();
            blst_keygen_v3(&mut sc, ikm.as_ptr(), ikm.len(), ptr::null(), 0);
            blst_fr_from_scalar(&mut ret, &sc);
        }
        encode_fr(&ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{g1_base_mul, g2_base_mul};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_generators_are_members() {
        let backend = Bls12381;
        assert!(backend.g1_is_member(&backend.g1_generator()));
        assert!(backend.g2_is_member(&backend.g2_generator()));
        assert_eq!(backend.g1_generator().0.len(), G1_LENGTH);
        assert_eq!(backend.g2_generator().0.len(), G2_LENGTH);
    }

    #[test]
    fn test_scalar_arithmetic() {
        let backend = Bls12381;
        let two = backend.scalar_from_u64(2);
        let three = backend.scalar_from_u64(3);
        assert_eq!(backend.scalar_add(&two, &three).unwrap(), backend.scalar_from_u64(5));
        assert_eq!(backend.scalar_mul(&two, &three).unwrap(), backend.scalar_from_u64(6));
        assert!(backend.scalar_is_canonical(&two));
        assert!(!backend.scalar_is_canonical(&Scalar([0xff; 32])));
    }

    #[test]
    fn test_group_law() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let s = backend.random_scalar(&mut rng);

        // sG + sG == (s + s)G
        let p = g1_base_mul(&backend, &s).unwrap();
        let doubled = backend.g1_add(&p, &p).unwrap();
        let s2 = backend.scalar_add(&s, &s).unwrap();
        assert!(backend.g1_equal(&doubled, &g1_base_mul(&backend, &s2).unwrap()));

        let q = g2_base_mul(&backend, &s).unwrap();
        let doubled = backend.g2_add(&q, &q).unwrap();
        assert_eq!(doubled, g2_base_mul(&backend, &s2).unwrap());
    }

    #[test]
    fn test_pairing_consistency() {
        let backend = Bls12381;
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let a = backend.random_scalar(&mut rng);
        let b = backend.random_scalar(&mut rng);

        let g1 = g1_base_mul(&backend, &a).unwrap();
        assert!(backend.pairing_matches(&g1, &g2_base_mul(&backend, &a).unwrap()));
        assert!(!backend.pairing_matches(&g1, &g2_base_mul(&backend, &b).unwrap()));
    }

    #[test]
    fn test_rejects_malformed_points() {
        let backend = Bls12381;
        assert!(!backend.g1_is_member(&G1Point(vec![0u8; G1_LENGTH])));
        assert!(!backend.g1_is_member(&G1Point(vec![0x80; 12])));
        assert!(!backend.g2_is_member(&G2Point(vec![0x11; G2_LENGTH])));

        let mut off_curve = backend.g1_generator();
        off_curve.0[G1_LENGTH - 1] ^= 0x01;
        assert!(!backend.g1_is_member(&off_curve));
        assert!(backend.g1_add(&off_curve, &backend.g1_generator()).is_none());
    }
}
