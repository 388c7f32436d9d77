//! Core types for the DKG ceremony

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// 1-based position of a participant, assigned in join order
pub type ParticipantIndex = usize;

/// Value of the external round counter
pub type Round = u64;

/// Deposit and payout amounts, in the smallest ledger unit
pub type Amount = u128;

/// Identifier of a raised complaint
pub type ComplaintId = u64;

/// 32-byte keccak-256 digest
pub type Digest = [u8; 32];

/// 20-byte participant identity derived from a secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_serde")] pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Encoded G1 point, stored exactly as posted
///
/// Nothing guarantees the bytes describe a group element; that is checked
/// through a [`CurveBackend`](crate::curve::CurveBackend) when it matters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct G1Point(#[serde(with = "hex_serde")] pub Vec<u8>);

/// Encoded G2 point, stored exactly as posted
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct G2Point(#[serde(with = "hex_serde")] pub Vec<u8>);

impl G1Point {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl G2Point {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for G1Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G1({})", hex::encode(&self.0))
    }
}

impl fmt::Debug for G2Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G2({})", hex::encode(&self.0))
    }
}

/// Big-endian scalar encoding
///
/// Used for secret polynomial coefficients, shares and decryption keys,
/// so the bytes are wiped on request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Scalar(#[serde(with = "hex_serde")] pub [u8; 32]);

impl Scalar {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scalar(..)")
    }
}

/// A share encrypted under the dealer/recipient Diffie-Hellman pad
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare(#[serde(with = "hex_serde")] pub [u8; 32]);

impl fmt::Debug for EncryptedShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedShare({})", hex::encode(self.0))
    }
}

/// Recoverable ECDSA signature (r, s, v)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    #[serde(with = "hex_serde")]
    pub r: [u8; 32],
    /// S component
    #[serde(with = "hex_serde")]
    pub s: [u8; 32],
    /// Recovery ID (0/1, or 27/28)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to bytes (r || s || v)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.recovery_id;
        bytes
    }
}

/// Phase deadlines, in rounds of the external counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Enrollment window
    pub enrollment: Round,
    /// Commitment submission window
    pub commit: Round,
    /// Window for complaints once all data is in
    pub complaint_window: Round,
    /// Window for posting the group key, and for challenging it once posted
    pub finalization: Round,
    /// Time each disputant has to make its move
    pub dispute_turn: Round,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            enrollment: 50,
            commit: 50,
            complaint_window: 20,
            finalization: 20,
            dispute_turn: 10,
        }
    }
}

/// Configuration for a ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeremonyConfig {
    /// Number of participants
    pub n: usize,

    /// Polynomial degree; any `t + 1` shares reconstruct the key
    pub t: usize,

    /// Deposit every participant escrows at enrollment
    pub deposit: Amount,

    /// Phase deadlines
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl CeremonyConfig {
    /// Create a validated configuration with default timeouts
    pub fn new(n: usize, t: usize, deposit: Amount) -> crate::Result<Self> {
        let config = Self {
            n,
            t,
            deposit,
            timeouts: Timeouts::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the timeouts
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Check the structural constraints of a configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.t >= self.n {
            return Err(crate::Error::InvalidConfig(
                "Threshold must be below the number of participants".into(),
            ));
        }
        if self.n < 2 {
            return Err(crate::Error::InvalidConfig(
                "A ceremony needs at least 2 participants".into(),
            ));
        }
        if self.deposit == 0 {
            return Err(crate::Error::InvalidConfig(
                "Deposit must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Hex (de)serialization for byte containers
pub(crate) mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        T::try_from(bytes).map_err(|_| serde::de::Error::custom("Invalid byte length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(CeremonyConfig::new(3, 1, 100).is_ok());
        assert!(CeremonyConfig::new(3, 0, 100).is_ok());
        assert!(matches!(
            CeremonyConfig::new(3, 3, 100),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert!(matches!(
            CeremonyConfig::new(1, 0, 100),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert!(matches!(
            CeremonyConfig::new(3, 1, 0),
            Err(crate::Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_from_json_uses_default_timeouts() {
        let config: CeremonyConfig =
            serde_json::from_str(r#"{"n": 4, "t": 2, "deposit": 1000}"#).unwrap();
        assert_eq!(config.timeouts, Timeouts::default());

        let config: CeremonyConfig = serde_json::from_str(
            r#"{"n": 4, "t": 2, "deposit": 1000, "timeouts": {"commit": 7}}"#,
        )
        .unwrap();
        assert_eq!(config.timeouts.commit, 7);
        assert_eq!(config.timeouts.enrollment, Timeouts::default().enrollment);
    }

    #[test]
    fn test_hex_round_trip() {
        let address = Address([0xab; 20]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);

        let short: std::result::Result<Address, _> = serde_json::from_str("\"abcd\"");
        assert!(short.is_err());
    }

    #[test]
    fn test_signature_bytes() {
        let sig = Signature::new([1u8; 32], [2u8; 32], 1);
        let bytes = sig.to_bytes();
        assert_eq!(&bytes[..32], &[1u8; 32]);
        assert_eq!(&bytes[32..64], &[2u8; 32]);
        assert_eq!(bytes[64], 1);
    }
}
