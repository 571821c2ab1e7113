// Identifier translation between local ids, public ids and contract addresses

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DirectoryError;

/// A checksummed (EIP-55) address. Equality is exact on the checksummed form,
/// so two inputs that differ only in casing compare equal once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedAddress(String);

impl NormalizedAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form, which is how the indexer keys its entities.
    pub fn to_indexer_id(&self) -> String {
        self.0.to_lowercase()
    }
}

/// Normalizes any-case hex input to its checksummed form.
pub fn to_checksum(address: &str) -> Result<NormalizedAddress, DirectoryError> {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| DirectoryError::InvalidAddress(address.to_string()))?;

    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DirectoryError::InvalidAddress(address.to_string()));
    }

    let lower = body.to_ascii_lowercase();
    let hash = hex::encode(Keccak256::digest(lower.as_bytes()));

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (c, h) in lower.chars().zip(hash.chars()) {
        // every hash char is a hex digit, so the fallback never triggers
        let nibble = h.to_digit(16).unwrap_or(0);
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Ok(NormalizedAddress(out))
}

/// Cheap shape check used by the search classifier.
pub fn looks_like_address(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.len() == 42
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

impl FromStr for NormalizedAddress {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        to_checksum(s)
    }
}

impl TryFrom<String> for NormalizedAddress {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        to_checksum(&value)
    }
}

impl From<NormalizedAddress> for String {
    fn from(value: NormalizedAddress) -> Self {
        value.0
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three coordinate systems a community can be addressed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommunityLookup {
    Id(i64),
    PublicId(Uuid),
    ContractAddress(NormalizedAddress),
}

impl CommunityLookup {
    pub fn parse(key: &str) -> Result<Self, DirectoryError> {
        let key = key.trim();
        if let Ok(id) = key.parse::<i64>() {
            return Ok(CommunityLookup::Id(id));
        }
        if let Ok(public_id) = Uuid::parse_str(key) {
            return Ok(CommunityLookup::PublicId(public_id));
        }
        if key.starts_with("0x") || key.starts_with("0X") {
            return to_checksum(key).map(CommunityLookup::ContractAddress);
        }
        Err(DirectoryError::CommunityNotFound(key.to_string()))
    }
}

impl fmt::Display for CommunityLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityLookup::Id(id) => write!(f, "{}", id),
            CommunityLookup::PublicId(public_id) => write!(f, "{}", public_id),
            CommunityLookup::ContractAddress(address) => write!(f, "{}", address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_known_vectors() {
        // EIP-55 reference vectors
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert_eq!(to_checksum(&expected.to_lowercase()).unwrap().as_str(), expected);
            assert_eq!(to_checksum(&expected.to_uppercase().replacen("0X", "0x", 1)).unwrap().as_str(), expected);
        }
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(matches!(
            to_checksum("0x1234"),
            Err(DirectoryError::InvalidAddress(_))
        ));
        assert!(to_checksum("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
        assert!(to_checksum("0xZZAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
    }

    #[test]
    fn indexer_id_is_lower_case() {
        let address = to_checksum("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(
            address.to_indexer_id(),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
    }

    #[test]
    fn parses_lookup_keys() {
        assert_eq!(CommunityLookup::parse("42").unwrap(), CommunityLookup::Id(42));
        let public_id = Uuid::new_v4();
        assert_eq!(
            CommunityLookup::parse(&public_id.to_string()).unwrap(),
            CommunityLookup::PublicId(public_id)
        );
        assert!(matches!(
            CommunityLookup::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap(),
            CommunityLookup::ContractAddress(_)
        ));
        assert!(CommunityLookup::parse("somewhere").is_err());
    }
}
