//! Content digests for deployment archives.
//!
//! Object metadata records the SHA-256 of an archive as URL-safe base64 without padding, which is what the code
//! uploader writes. Lambda's `source_code_hash` wants the same digest in the standard alphabet with padding, so the
//! value read off the object has to be translated before it is compared.

use {
    log::{trace, warn},
    sha2::{Digest, Sha256},
};

/// The placeholder archive a function is created with before any real code has been uploaded: a ZIP file with no
/// entries, consisting solely of the end-of-central-directory record.
pub const EMPTY_ARCHIVE: &[u8] = &[
    0x50, 0x4b, 0x05, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00,
];

/// SHA-256 of `data`, URL-safe base64 encoded with the trailing `=` removed.
pub fn compute_digest(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    base64::encode_config(hash, base64::URL_SAFE_NO_PAD)
}

/// Number of `=` characters needed to pad a base64 string of length `len`: `ceil(len / 4) * 4 - len`.
#[inline]
pub fn padding_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Translate an unpadded URL-safe digest into the padded standard-alphabet form Lambda compares against.
///
/// `-` becomes `+`, `_` becomes `/`, everything else is copied as is, and `padding_len` of `=` are appended. Values
/// that don't look like a digest are translated all the same; the mismatch then shows up as a plan change.
pub fn to_source_code_hash(digest: &str) -> String {
    if !is_url_safe_digest(digest) {
        warn!("to_source_code_hash: {:?} is not unpadded URL-safe base64", digest);
    }

    let mut result: String = digest
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            _ => c,
        })
        .collect();
    result.extend(std::iter::repeat('=').take(padding_len(digest.len())));

    trace!("to_source_code_hash: {} -> {}", digest, result);
    result
}

/// Whether `digest` is unpadded URL-safe base64 whose length could come out of an encoder.
pub fn is_url_safe_digest(digest: &str) -> bool {
    digest.len() % 4 != 1 && digest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use {
        super::{compute_digest, is_url_safe_digest, padding_len, to_source_code_hash, EMPTY_ARCHIVE},
        pretty_assertions::assert_eq,
        sha2::{Digest, Sha256},
    };

    #[test_log::test]
    fn test_padding_len() {
        assert_eq!(padding_len(0), 0);
        assert_eq!(padding_len(3), 1);
        assert_eq!(padding_len(4), 0);
        assert_eq!(padding_len(6), 2);
        assert_eq!(padding_len(43), 1);
        for len in 0..64 {
            let pad = padding_len(len);
            assert!(pad <= 3);
            assert_eq!(pad, ((len + 3) / 4) * 4 - len);
            assert_eq!((len + pad) % 4, 0);
        }
    }

    #[test_log::test]
    fn test_examples() {
        assert_eq!(to_source_code_hash("abc"), "abc=");
        assert_eq!(to_source_code_hash("abcd"), "abcd");
        assert_eq!(to_source_code_hash("ab"), "ab==");
        assert_eq!(to_source_code_hash("a-_b"), "a+/b");
        assert_eq!(to_source_code_hash(""), "");
    }

    #[test_log::test]
    fn test_any_length_is_padded() {
        assert_eq!(to_source_code_hash("abcde"), "abcde===");
        assert_eq!(to_source_code_hash("a"), "a===");
        for len in 0..16 {
            let hash = to_source_code_hash(&"x".repeat(len));
            assert_eq!(hash.len() % 4, 0);
            assert_eq!(hash.len() - len, padding_len(len));
        }
        assert!(!is_url_safe_digest("abcde"));
    }

    #[test_log::test]
    fn test_padded_input_passes_through() {
        assert_eq!(to_source_code_hash("abc="), "abc=");
        assert_eq!(to_source_code_hash("ab=="), "ab==");
        assert_eq!(to_source_code_hash("a-b="), "a+b=");
        assert_eq!(to_source_code_hash("a b"), "a b=");
        assert!(!is_url_safe_digest("abc="));
        assert!(!is_url_safe_digest("a b"));
        assert!(is_url_safe_digest("a-_b"));
        assert!(is_url_safe_digest(""));
    }

    #[test_log::test]
    fn test_recovers_original_bytes() {
        let inputs: [&[u8]; 5] = [b"", b"x", b"hello world", EMPTY_ARCHIVE, &[0xfb, 0xff, 0xfe, 0x3e, 0x3f]];
        for input in inputs {
            let digest = compute_digest(input);
            assert!(!digest.ends_with('='));

            let hash = to_source_code_hash(&digest);
            assert_eq!(hash.len() % 4, 0);
            assert_eq!(base64::decode(&hash).unwrap(), Sha256::digest(input).to_vec());
            assert_eq!(hash, base64::encode(Sha256::digest(input)));
        }

        // Raw bytes that hit both of the alphabet differences.
        let raw: [u8; 5] = [0xfb, 0xef, 0xbe, 0xff, 0xff];
        let url_safe = base64::encode_config(raw, base64::URL_SAFE_NO_PAD);
        assert!(url_safe.contains('-') && url_safe.contains('_'));
        let hash = to_source_code_hash(&url_safe);
        assert_eq!(base64::decode(&hash).unwrap(), raw.to_vec());
    }

    #[test_log::test]
    fn test_empty_archive() {
        assert_eq!(EMPTY_ARCHIVE.len(), 22);
        assert_eq!(&EMPTY_ARCHIVE[..4], b"PK\x05\x06");
        let digest = compute_digest(EMPTY_ARCHIVE);
        assert_eq!(digest.len(), 43);
        assert_eq!(to_source_code_hash(&digest).len(), 44);
    }
}
