//! Line-oriented `key=value` parsing shared by the wire types in this
//! crate. Not a general-purpose codec: spec.md scopes that out of the
//! core, so this stays a handful of small, strict helpers colocated with
//! the types that use them, matching each type owning its own
//! `to_ascii`/`from_ascii` pair rather than routing through one generic
//! serializer.

use sigsum_crypto::Hash;

/// Split `text` into its `\n`-terminated lines, rejecting a missing final
/// newline and any line carrying trailing whitespace.
pub(crate) fn strict_lines(text: &str) -> Option<Vec<&str>> {
    if text.is_empty() {
        return Some(Vec::new());
    }
    let body = text.strip_suffix('\n')?;
    let lines: Vec<&str> = body.split('\n').collect();
    if lines.iter().any(|l| l.ends_with(' ') || l.ends_with('\t')) {
        return None;
    }
    Some(lines)
}

/// Split a `key=value` line on the first `=`.
pub(crate) fn split_kv(line: &str) -> Option<(&str, &str)> {
    line.split_once('=')
}

/// Parse a decimal `u64`: no leading `+`, no leading zeros except the
/// literal `"0"`, and strictly less than 2^63.
pub(crate) fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    let value: u64 = s.parse().ok()?;
    if value >= 1u64 << 63 {
        return None;
    }
    Some(value)
}

/// Parse a lower-case hex string into exactly `N` bytes.
pub(crate) fn parse_hex_exact<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.bytes().any(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Parse a lower-case hex string into a [`Hash`].
pub(crate) fn parse_hash(s: &str) -> Option<Hash> {
    Hash::from_hex(s).ok()
}
