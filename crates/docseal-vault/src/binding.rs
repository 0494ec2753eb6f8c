//! Address binding of the metachunk and the candidate-address search order
//!
//! ```text
//! chunk_a = ciphertext ^ address ^ timestamp ^ counter
//! chunk_b = sha256(plaintext) ^ hmac_sha256(address || timestamp, ciphertext)
//! ```

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::{address, ct_eq, divide, hmac_sha256, sha256, to_u8};

/// XOR the ciphertext with the binding operands.
pub fn bind_ciphertext(ciphertext: &[u8], address: &str, timestamp: &str, counter: &str) -> Vec<u8> {
    let a = divide(ciphertext, &to_u8(address));
    let b = divide(&a, &to_u8(timestamp));
    divide(&b, &to_u8(counter))
}

/// Reverse [`bind_ciphertext`] (XOR is self-inverse).
pub fn unbind_ciphertext(chunk_a: &[u8], address: &str, timestamp: &str, counter: &str) -> Vec<u8> {
    bind_ciphertext(chunk_a, address, timestamp, counter)
}

/// Build `chunk_b` for a sealed document.
pub fn integrity_chunk(
    plaintext: &[u8],
    address: &str,
    timestamp: &str,
    ciphertext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mac = hmac_sha256(&to_u8(&format!("{address}{timestamp}")), ciphertext)?;
    Ok(divide(&sha256(plaintext), &mac))
}

/// Check `chunk_b` against the decrypted plaintext and the exact ciphertext
/// bytes and address that produced it.
pub fn verify_integrity(
    chunk_b: &[u8],
    plaintext: &[u8],
    address: &str,
    timestamp: &str,
    ciphertext: &[u8],
) -> DocsealResult<()> {
    let a_hash = sha256(plaintext);
    let b_hash = hmac_sha256(&to_u8(&format!("{address}{timestamp}")), ciphertext)?;
    let expected = divide(chunk_b, &b_hash);
    if ct_eq(&a_hash, &expected) {
        Ok(())
    } else {
        Err(DocsealError::IntegrityCheckFailed)
    }
}

/// Candidate binding addresses in trial order, duplicates removed:
/// the recorded binding address, the caller (lowercase, checksummed), then
/// every holder (lowercase, checksummed). Addresses that cannot be
/// checksummed contribute their lowercase form only.
pub fn candidate_addresses(caller: &str, bound: Option<&str>, holders: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    if let Some(bound) = bound {
        push(bound.to_string());
        push(bound.to_ascii_lowercase());
    }
    for addr in std::iter::once(caller).chain(holders.iter().map(String::as_str)) {
        push(addr.to_ascii_lowercase());
        if let Ok(checksummed) = address::to_checksum(addr) {
            push(checksummed);
        }
    }
    out
}
