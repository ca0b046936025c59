//! Single byte-range parsing for partial-content responses.
//!
//! Supported `Range` forms (bytes unit only, one range):
//!
//! - `bytes=start-end`: clamped to the file
//! - `bytes=start-`: from `start` to the end of the file
//! - `bytes=-suffix`: the last `suffix` bytes
//!
//! Anything else (missing header, other units, multiple ranges, non-numeric
//! bounds, `end < start`) falls back to the whole file. Out-of-range starts are
//! clamped to the last byte rather than rejected.

/// The byte window a response will carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub offset: u64,
    pub length: u64,
}

impl RangeSpec {
    /// The whole file.
    pub fn full(total: u64) -> Self {
        Self {
            offset: 0,
            length: total,
        }
    }

    /// Resolves a `Range` header value against a file of `total` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypoint::static_content::RangeSpec;
    ///
    /// let range = RangeSpec::parse(Some("bytes=5-"), 20);
    /// assert_eq!((range.offset, range.length), (5, 15));
    /// assert_eq!(range.content_range(20), "bytes 5-19/20");
    ///
    /// assert_eq!(RangeSpec::parse(None, 20), RangeSpec::full(20));
    /// ```
    pub fn parse(header: Option<&str>, total: u64) -> Self {
        if total == 0 {
            return Self::full(0);
        }
        header
            .and_then(|value| parse_bytes(value, total))
            .unwrap_or_else(|| Self::full(total))
    }

    /// `true` when this is a strict sub-range of the file (answer with 206).
    pub fn is_partial(&self, total: u64) -> bool {
        self.offset > 0 || self.length < total
    }

    /// Inclusive index of the last byte.
    pub fn last(&self) -> u64 {
        (self.offset + self.length).saturating_sub(1)
    }

    /// `Content-Range` header value.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.offset, self.last())
    }
}

fn parse_bytes(value: &str, total: u64) -> Option<RangeSpec> {
    let set = value.trim().strip_prefix("bytes=")?;
    if set.contains(',') {
        return None;
    }
    let (start, end) = set.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let suffix = end.parse::<u64>().ok().filter(|&n| n > 0)?;
        let length = suffix.min(total);
        return Some(RangeSpec {
            offset: total - length,
            length,
        });
    }

    let offset = start.parse::<u64>().ok()?.min(total - 1);
    let remaining = total - offset;
    let length = if end.is_empty() {
        remaining
    } else {
        let end = end.parse::<u64>().ok()?;
        end.checked_sub(offset)?.saturating_add(1).min(remaining)
    };

    Some(RangeSpec { offset, length })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_ended_range_runs_to_the_end() {
        let range = RangeSpec::parse(Some("bytes=5-"), 100);
        assert_eq!(range, RangeSpec { offset: 5, length: 95 });
        assert!(range.is_partial(100));
        assert_eq!(range.content_range(100), "bytes 5-99/100");
    }

    #[test]
    fn single_byte_range() {
        let range = RangeSpec::parse(Some("bytes=0-0"), 100);
        assert_eq!(range, RangeSpec { offset: 0, length: 1 });
        assert!(range.is_partial(100));
        assert_eq!(range.content_range(100), "bytes 0-0/100");
    }

    #[test]
    fn closed_range_is_inclusive() {
        let range = RangeSpec::parse(Some("bytes=10-19"), 100);
        assert_eq!(range, RangeSpec { offset: 10, length: 10 });
        assert_eq!(range.last(), 19);
    }

    #[test]
    fn end_past_the_file_is_clamped() {
        let range = RangeSpec::parse(Some("bytes=90-500"), 100);
        assert_eq!(range, RangeSpec { offset: 90, length: 10 });
    }

    #[test]
    fn start_past_the_file_is_clamped_to_the_last_byte() {
        let range = RangeSpec::parse(Some("bytes=250-"), 100);
        assert_eq!(range, RangeSpec { offset: 99, length: 1 });
    }

    #[test]
    fn suffix_range_takes_the_tail() {
        assert_eq!(
            RangeSpec::parse(Some("bytes=-10"), 100),
            RangeSpec { offset: 90, length: 10 }
        );
        assert_eq!(RangeSpec::parse(Some("bytes=-500"), 100), RangeSpec::full(100));
    }

    #[test]
    fn whole_file_range_is_not_partial() {
        let range = RangeSpec::parse(Some("bytes=0-"), 100);
        assert_eq!(range, RangeSpec::full(100));
        assert!(!range.is_partial(100));
    }

    #[test]
    fn malformed_headers_fall_back_to_the_whole_file() {
        for header in [
            "items=0-5",
            "bytes=abc-",
            "bytes=5",
            "bytes=0-5,10-15",
            "bytes=-0",
            "bytes=-",
            "bytes=20-10",
            "bytes=5-x",
        ] {
            assert_eq!(RangeSpec::parse(Some(header), 100), RangeSpec::full(100), "{header}");
        }
        assert_eq!(RangeSpec::parse(None, 100), RangeSpec::full(100));
    }

    #[test]
    fn empty_file_is_always_served_whole() {
        let range = RangeSpec::parse(Some("bytes=0-0"), 0);
        assert_eq!(range, RangeSpec::full(0));
        assert!(!range.is_partial(0));
    }
}
