//! Length-preserving edits over raw binary buffers.
//!
//! Nothing in here touches the filesystem. Callers read the target, edit the
//! buffer, and hand the result to [`write_atomic`](crate::disk::write_atomic).

use std::ops::Range;

use memchr::memmem;

use crate::error::EditError;

/// Replaces **every** occurrence of `search` with `replacement`.
///
/// The two slices must have the same length: offsets elsewhere in the file
/// depend on the layout, so the buffer length never changes. Occurrences are
/// matched left to right without overlap.
pub fn replace_fixed_length(
    bytes: &[u8],
    search: &[u8],
    replacement: &[u8],
) -> Result<Vec<u8>, EditError> {
    if search.len() != replacement.len() {
        return Err(EditError::LengthMismatch {
            expected: search.len(),
            actual: replacement.len(),
        });
    }
    if search.is_empty() {
        return Err(EditError::PatternNotFound);
    }

    let mut patched = bytes.to_vec();
    let mut hits = 0usize;
    for offset in memmem::find_iter(bytes, search) {
        patched[offset..offset + search.len()].copy_from_slice(replacement);
        hits += 1;
    }

    match hits {
        0 => Err(EditError::PatternNotFound),
        _ => {
            log::trace!("replaced {hits} occurrence(s) of a {} byte pattern", search.len());
            Ok(patched)
        }
    }
}

/// Number of non-overlapping occurrences of `needle` in `bytes`.
pub fn count_occurrences(bytes: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    memmem::find_iter(bytes, needle).count()
}

/// A variable-length blob made of a fixed prefix followed by at least one byte
/// of a restricted charset.
#[derive(Debug, Clone, Copy)]
pub struct BlobPattern {
    pub prefix: &'static [u8],
    pub charset: fn(u8) -> bool,
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}

impl BlobPattern {
    /// Base64 encoded `PUBLICKEYBLOB` (header bytes `06 02 00 00` encode to `BgIAA`).
    pub const KEY_BLOB: BlobPattern = BlobPattern {
        prefix: b"BgIAA",
        charset: is_base64_byte,
    };
}

/// Lazy iterator over the spans matched by a [`BlobPattern`]. See [`find_blobs`].
#[derive(Debug, Clone)]
pub struct BlobSpans<'a> {
    bytes: &'a [u8],
    pattern: BlobPattern,
    pos: usize,
}

impl Iterator for BlobSpans<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        let prefix_len = self.pattern.prefix.len();
        loop {
            let start = self.pos + memmem::find(self.bytes.get(self.pos..)?, self.pattern.prefix)?;
            let body_start = start + prefix_len;
            let body_len = self.bytes[body_start..]
                .iter()
                .take_while(|&&b| (self.pattern.charset)(b))
                .count();

            let end = body_start + body_len;
            self.pos = end.max(start + 1);
            if body_len > 0 {
                return Some(start..end);
            }
        }
    }
}

/// Finds every blob matching `pattern`. Spans never overlap and each one
/// extends as far as the charset allows.
pub fn find_blobs(bytes: &[u8], pattern: BlobPattern) -> BlobSpans<'_> {
    BlobSpans {
        bytes,
        pattern,
        pos: 0,
    }
}

/// Pads `replacement` with `pad` or truncates it so that it is exactly
/// `span_len` bytes long.
pub fn fit_to_span(replacement: &[u8], span_len: usize, pad: u8) -> Vec<u8> {
    let mut fitted = replacement[..replacement.len().min(span_len)].to_vec();
    fitted.resize(span_len, pad);
    fitted
}

/// Result of [`replace_blobs`].
#[derive(Debug)]
pub struct BlobRewrite {
    pub bytes: Vec<u8>,
    /// Spans that were rewritten, in file order.
    pub spans: Vec<Range<usize>>,
    /// At least one span was shorter than the replacement, which had to be cut.
    pub truncated: bool,
}

/// Rewrites every blob matched by `pattern` with `replacement`, fitted to the
/// original span's length so the buffer length is preserved.
pub fn replace_blobs(
    bytes: &[u8],
    pattern: BlobPattern,
    replacement: &[u8],
    pad: u8,
) -> Result<BlobRewrite, EditError> {
    let spans: Vec<_> = find_blobs(bytes, pattern).collect();
    if spans.is_empty() {
        return Err(EditError::PatternNotFound);
    }

    let mut patched = bytes.to_vec();
    let mut truncated = false;
    for span in &spans {
        truncated |= span.len() < replacement.len();
        patched[span.clone()].copy_from_slice(&fit_to_span(replacement, span.len(), pad));
    }

    Ok(BlobRewrite {
        bytes: patched,
        spans,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_occurrence() {
        let bytes = b"\x00roblox.com\x00http://www.roblox.com/\x00roblox.com";
        let patched = replace_fixed_length(bytes, b"roblox.com", b"revive.net").unwrap();

        assert_eq!(patched.len(), bytes.len());
        assert_eq!(count_occurrences(&patched, b"revive.net"), 3);
        assert_eq!(count_occurrences(&patched, b"roblox.com"), 0);
    }

    #[test]
    fn second_pass_is_detectable() {
        let bytes = b"aaXYZbbXYZcc";
        let once = replace_fixed_length(bytes, b"XYZ", b"QRS").unwrap();
        assert_eq!(once, b"aaQRSbbQRScc");
        assert_eq!(
            replace_fixed_length(&once, b"XYZ", b"QRS"),
            Err(EditError::PatternNotFound)
        );
    }

    #[test]
    fn length_mismatch_is_rejected_before_searching() {
        let cases: [(&[u8], &[u8]); 4] = [
            (b"abc", b"ab"),
            (b"a", b"abcd"),
            (b"", b"x"),
            (b"missing", b"nope"),
        ];
        for (search, replacement) in cases {
            assert_eq!(
                replace_fixed_length(b"abc abc", search, replacement),
                Err(EditError::LengthMismatch {
                    expected: search.len(),
                    actual: replacement.len()
                })
            );
        }
    }

    #[test]
    fn empty_pattern_is_not_found() {
        assert_eq!(
            replace_fixed_length(b"abc", b"", b""),
            Err(EditError::PatternNotFound)
        );
    }

    #[test]
    fn blob_spans_stop_at_charset_boundary() {
        let bytes = b"xxBgIAAQAB+/==\x00yyBgIAA\x00zzBgIAAabc\"";
        let spans: Vec<_> = find_blobs(bytes, BlobPattern::KEY_BLOB).collect();

        // The bare prefix in the middle has no body and does not count
        assert_eq!(spans, vec![2..14, 25..33]);
        assert_eq!(&bytes[spans[0].clone()], b"BgIAAQAB+/==");
        assert_eq!(&bytes[spans[1].clone()], b"BgIAAabc");
    }

    #[test]
    fn fit_pads_and_truncates() {
        assert_eq!(fit_to_span(b"abc", 5, 0), b"abc\0\0");
        assert_eq!(fit_to_span(b"abcdef", 4, 0), b"abcd");
        assert_eq!(fit_to_span(b"abcd", 4, 0), b"abcd");
    }

    #[test]
    fn blob_rewrite_preserves_length() {
        let bytes = b"..BgIAAoldkeyoldkey==..BgIAAshort..";
        let rewrite = replace_blobs(bytes, BlobPattern::KEY_BLOB, b"BgIAAnewkey", 0).unwrap();

        assert_eq!(rewrite.bytes.len(), bytes.len());
        assert_eq!(rewrite.spans.len(), 2);
        assert!(rewrite.truncated);
        assert_eq!(&rewrite.bytes[2..21], b"BgIAAnewkey\0\0\0\0\0\0\0\0");
        assert_eq!(&rewrite.bytes[23..33], b"BgIAAnewke");
    }

    #[test]
    fn blob_rewrite_without_match_fails() {
        assert!(matches!(
            replace_blobs(b"no keys here", BlobPattern::KEY_BLOB, b"BgIAAx", 0),
            Err(EditError::PatternNotFound)
        ));
    }
}
