//! `Range` header parsing for artifact delivery.
//!
//! Only single `bytes` ranges are served. Every window is resolved against
//! the real size of the stored blob, never a recorded one.

use crate::error::{ApiError, ApiResult};

/// Resolved inclusive byte window within a blob of `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ByteRange {
    /// Number of bytes in the window; never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Parse a `Range` header value against a blob of `size` bytes.
///
/// Accepts `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`. An end
/// past the last byte is clamped, as is a suffix longer than the blob.
pub fn parse_range(header: &str, size: u64) -> ApiResult<ByteRange> {
    let invalid = |reason: &str| ApiError::invalid_range(reason, size);

    let ranges = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| invalid("only byte ranges are supported"))?
        .trim();

    if ranges.contains(',') {
        return Err(invalid("multiple ranges are not supported"));
    }

    let (first, last) = ranges
        .split_once('-')
        .ok_or_else(|| invalid("malformed range"))?;
    let (first, last) = (first.trim(), last.trim());

    if size == 0 {
        return Err(invalid("artifact is empty"));
    }

    let (start, end) = if first.is_empty() {
        let suffix = position(last).ok_or_else(|| invalid("malformed suffix length"))?;
        if suffix == 0 {
            return Err(invalid("empty suffix range"));
        }
        (size.saturating_sub(suffix), size - 1)
    } else {
        let start = position(first).ok_or_else(|| invalid("malformed range start"))?;
        let end = if last.is_empty() {
            size - 1
        } else {
            let end = position(last).ok_or_else(|| invalid("malformed range end"))?;
            end.min(size - 1)
        };
        if start >= size {
            return Err(invalid("range start beyond end of artifact"));
        }
        if !last.is_empty() && start > end {
            return Err(invalid("range start after range end"));
        }
        (start, end)
    };

    Ok(ByteRange { start, end, size })
}

/// Decimal byte position. `u64::from_str` alone would let a leading `+` through.
fn position(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(header: &str, size: u64) -> (u64, u64) {
        let r = parse_range(header, size).unwrap();
        (r.start, r.end)
    }

    fn is_invalid(header: &str, size: u64) -> bool {
        matches!(parse_range(header, size), Err(ApiError::InvalidRange { .. }))
    }

    #[test]
    fn test_closed_and_open_ranges() {
        assert_eq!(range("bytes=0-99", 1000), (0, 99));
        assert_eq!(range("bytes=500-", 1000), (500, 999));
        assert_eq!(range("bytes=0-0", 1), (0, 0));

        let r = parse_range("bytes=0-99", 1000).unwrap();
        assert_eq!(r.length(), 100);
        assert_eq!(r.content_range(), "bytes 0-99/1000");
    }

    #[test]
    fn test_end_is_clamped() {
        assert_eq!(range("bytes=900-5000", 1000), (900, 999));
    }

    #[test]
    fn test_suffix_ranges() {
        assert_eq!(range("bytes=-100", 1000), (900, 999));
        assert_eq!(range("bytes=-5000", 1000), (0, 999));
        assert!(is_invalid("bytes=-0", 1000));
    }

    #[test]
    fn test_unsatisfiable() {
        assert!(is_invalid("bytes=1000-", 1000));
        assert!(is_invalid("bytes=1500-1600", 1000));
        assert!(is_invalid("bytes=10-5", 1000));
        assert!(is_invalid("bytes=0-", 0));
    }

    #[test]
    fn test_malformed() {
        assert!(is_invalid("items=0-10", 1000));
        assert!(is_invalid("bytes=abc-", 1000));
        assert!(is_invalid("bytes=0-x", 1000));
        assert!(is_invalid("bytes=5", 1000));
        assert!(is_invalid("bytes=-", 1000));
        assert!(is_invalid("bytes=0-1,5-6", 1000));
    }

    #[test]
    fn test_signed_positions_are_rejected() {
        assert!(is_invalid("bytes=+5-+9", 1000));
        assert!(is_invalid("bytes=+5-", 1000));
        assert!(is_invalid("bytes=5-+9", 1000));
        assert!(is_invalid("bytes=-+5", 1000));
        assert!(is_invalid("bytes=-5-9", 1000));
    }
}
