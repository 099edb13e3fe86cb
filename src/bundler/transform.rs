//! Line-ending normalization for entry payloads.
//!
//! Text payloads are rewritten to `\n` line endings. A payload is treated as
//! binary as soon as it contains a control byte that never appears in text,
//! and binary payloads come back untouched. Refusing a payload is not an
//! error.

use std::borrow::Cow;

/// Control bytes allowed in text: tab, line feed, form feed, carriage return.
const TEXT_CONTROLS: [u8; 4] = [b'\t', b'\n', 0x0C, b'\r'];

/// Returns true when `data` contains a control byte that text never holds.
pub fn is_binary(data: &[u8]) -> bool {
    data.iter()
        .any(|byte| *byte < 0x20 && !TEXT_CONTROLS.contains(byte))
}

/// Converts `\r\n` and lone `\r` to `\n`.
///
/// Returns the input borrowed when it is binary or already uses `\n`, so
/// normalizing twice yields identical bytes.
pub fn normalize_line_endings(data: &[u8]) -> Cow<'_, [u8]> {
    if !data.contains(&b'\r') || is_binary(data) {
        return Cow::Borrowed(data);
    }

    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter().peekable();
    while let Some(&byte) = bytes.next() {
        if byte == b'\r' {
            if bytes.peek() == Some(&&b'\n') {
                bytes.next();
            }
            out.push(b'\n');
        } else {
            out.push(byte);
        }
    }

    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_blob(len: usize, mut seed: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (seed >> 33) as u8
            })
            .collect()
    }

    #[test]
    fn test_crlf_and_lone_cr_become_lf() {
        assert_eq!(
            normalize_line_endings(b"line1\r\nline2\r\n").as_ref(),
            b"line1\nline2\n"
        );
        assert_eq!(normalize_line_endings(b"a\rb\r\r\nc").as_ref(), b"a\nb\n\nc");
    }

    #[test]
    fn test_unix_text_is_idempotent() {
        let text = b"#!/bin/sh\n\texec java \"$@\"\n\x0C\n";
        let once = normalize_line_endings(text);
        assert!(matches!(once, Cow::Borrowed(_)));
        let twice = normalize_line_endings(&once);
        assert_eq!(once.as_ref(), twice.as_ref());
        assert_eq!(twice.as_ref(), text);
    }

    #[test]
    fn test_normalized_output_is_stable() {
        let once = normalize_line_endings(b"one\r\ntwo\rthree").into_owned();
        let twice = normalize_line_endings(&once);
        assert_eq!(once, twice.as_ref());
    }

    #[test]
    fn test_binary_blob_is_untouched() {
        for seed in [1, 42, 0xDEAD_BEEF] {
            let mut blob = pseudo_random_blob(4096, seed);
            blob[17] = b'\r';
            blob[18] = b'\n';
            blob[100] = 0;
            assert!(is_binary(&blob));
            assert_eq!(normalize_line_endings(&blob).as_ref(), blob.as_slice());
        }
    }

    #[test]
    fn test_class_file_header_is_binary() {
        let class = b"\xCA\xFE\xBA\xBE\x00\x00\x00\x37\r\n";
        assert!(is_binary(class));
        assert_eq!(normalize_line_endings(class).as_ref(), class);
    }

    #[test]
    fn test_empty_payload() {
        assert!(!is_binary(b""));
        assert!(normalize_line_endings(b"").is_empty());
    }
}
