//! PEM armor handling.

use base64::Engine;

/// Extracts DER data from a PEM block with the given label.
///
/// Returns `None` if the block is missing or its body is not valid base64.
#[must_use]
pub fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = pem[start..].find(&end)? + start;

    let b64_data: String = pem[start..end_pos]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64_data).ok()
}
