//! Metachunk byte codec: envelope, piece framing, and XOR binding
//!
//! Metachunk layout (binary):
//! ```text
//! ESSENTIALIS[ chunk_a |SPLIT| chunk_b ]
//! ```
//!
//! `chunk_a` is the AES-GCM ciphertext XOR-bound to the holder address, the
//! mint timestamp and the counter. `chunk_b` is `sha256(plaintext)` XOR-bound
//! to an HMAC over the ciphertext. The XOR layer ties the ciphertext to mint
//! metadata; it does not provide confidentiality.

/// Envelope prefix written by [`encode`]
pub const ENVELOPE_PREFIX: &[u8] = b"ESSENTIALIS[";

/// Envelope suffix written by [`encode`]
pub const ENVELOPE_SUFFIX: &[u8] = b"]";

/// Piece separator written by [`join`]
pub const DELIMITER: &[u8] = b"|SPLIT|";

/// UTF-8 encode a string operand.
pub fn to_u8(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Wrap a joined chunk in the metachunk envelope.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_PREFIX.len() + data.len() + ENVELOPE_SUFFIX.len());
    out.extend_from_slice(ENVELOPE_PREFIX);
    out.extend_from_slice(data);
    out.extend_from_slice(ENVELOPE_SUFFIX);
    out
}

/// Strip the metachunk envelope. Fails if the prefix or suffix is absent.
pub fn decode(metachunk: &[u8]) -> anyhow::Result<Vec<u8>> {
    if metachunk.len() < ENVELOPE_PREFIX.len() + ENVELOPE_SUFFIX.len() {
        anyhow::bail!(
            "metachunk too short: {} bytes (minimum {})",
            metachunk.len(),
            ENVELOPE_PREFIX.len() + ENVELOPE_SUFFIX.len()
        );
    }
    let inner = metachunk
        .strip_prefix(ENVELOPE_PREFIX)
        .and_then(|rest| rest.strip_suffix(ENVELOPE_SUFFIX))
        .ok_or_else(|| anyhow::anyhow!("metachunk envelope missing or malformed"))?;
    Ok(inner.to_vec())
}

/// Join pieces with [`DELIMITER`].
///
/// Pieces that [`split`] could not recover exactly (a piece containing the
/// delimiter, or ending in a prefix of it) are rejected.
pub fn join(pieces: &[&[u8]]) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(
        pieces.iter().map(|p| p.len()).sum::<usize>()
            + DELIMITER.len() * pieces.len().saturating_sub(1),
    );
    for (i, piece) in pieces.iter().enumerate() {
        if find(piece, DELIMITER).is_some() {
            anyhow::bail!("piece {i} contains the chunk delimiter and cannot be joined");
        }
        if i > 0 {
            out.extend_from_slice(DELIMITER);
        }
        out.extend_from_slice(piece);
    }
    // A piece ending in a delimiter prefix can still shift the split point.
    let reparsed = split(&out);
    if reparsed.len() != pieces.len() || reparsed.iter().zip(pieces).any(|(a, b)| a.as_slice() != *b) {
        anyhow::bail!("pieces overlap the chunk delimiter and cannot be joined unambiguously");
    }
    Ok(out)
}

/// Split a joined chunk on [`DELIMITER`]. Always yields at least one piece.
pub fn split(merged: &[u8]) -> Vec<Vec<u8>> {
    let mut parts = Vec::new();
    let mut rest = merged;
    while let Some(pos) = find(rest, DELIMITER) {
        parts.push(rest[..pos].to_vec());
        rest = &rest[pos + DELIMITER.len()..];
    }
    parts.push(rest.to_vec());
    parts
}

/// XOR `product` against `known`, zero-padding or truncating `known` to the
/// length of `product`. The output has the length of `product`.
///
/// XOR is self-inverse, so this both binds and unbinds.
pub fn divide(product: &[u8], known: &[u8]) -> Vec<u8> {
    product
        .iter()
        .enumerate()
        .map(|(i, &p)| p ^ known.get(i).copied().unwrap_or(0))
        .collect()
}

/// Encode-time name for [`divide`].
pub fn combine(data: &[u8], operand: &[u8]) -> Vec<u8> {
    divide(data, operand)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
