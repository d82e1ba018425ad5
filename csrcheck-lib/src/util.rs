//! Shared encoding utilities.

/// Format bytes as colon-separated uppercase hex (e.g., "AB:CD:EF").
pub fn hex_colon_upper(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Whether the input looks like PEM (first non-whitespace bytes are `-----BEGIN`).
pub fn is_pem(input: &[u8]) -> bool {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    input
        .get(start..)
        .is_some_and(|rest| rest.starts_with(b"-----BEGIN"))
}

/// Strip leading zero bytes from a big-endian integer, keeping at least one byte.
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b != 0) {
        Some(pos) => bytes.get(pos..).unwrap_or(bytes),
        None => bytes.get(bytes.len().saturating_sub(1)..).unwrap_or(bytes),
    }
}

/// Exact bit length of a big-endian unsigned integer.
pub fn bit_length(bytes: &[u8]) -> u32 {
    let significant = strip_leading_zeros(bytes);
    match significant.first() {
        Some(&first) if first != 0 => {
            (significant.len() as u32 - 1) * 8 + (8 - first.leading_zeros())
        }
        _ => 0,
    }
}
