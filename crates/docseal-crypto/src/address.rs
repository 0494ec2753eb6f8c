//! Ethereum-style addresses: parsing, lowercase normalization, EIP-55 checksum

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use sha3::{Digest, Keccak256};

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// True if `addr` is `0x` followed by 40 hex digits (any case).
pub fn is_address(addr: &str) -> bool {
    strip_0x(addr).is_some_and(|body| body.len() == 40 && body.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Lowercase form used as the `wrapped_deks` map key.
pub fn to_lowercase(addr: &str) -> String {
    addr.to_ascii_lowercase()
}

/// EIP-55 mixed-case checksum form. Fails if `addr` is not a 20-byte hex address.
pub fn to_checksum(addr: &str) -> anyhow::Result<String> {
    if !is_address(addr) {
        anyhow::bail!("invalid address: {addr:?}");
    }
    let lower = addr[2..].to_ascii_lowercase();
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Checksummed address of a secp256k1 public key: last 20 bytes of
/// `keccak256(uncompressed point without the 0x04 tag)`.
pub fn from_public_key(public_key: &PublicKey) -> String {
    let point = public_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let raw = format!("0x{}", hex::encode(&hash[12..]));
    // Well-formed by construction
    to_checksum(&raw).unwrap_or(raw)
}

fn strip_0x(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}
