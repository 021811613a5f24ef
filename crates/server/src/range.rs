#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn full(size: u64) -> Option<Self> {
        if size == 0 {
            None
        } else {
            Some(Self {
                start: 0,
                end: size - 1,
            })
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Unsatisfiable,
}

/// Resolves a `bytes=<start>-<end>` header against a file of `size` bytes.
///
/// An empty start means 0 and an empty end means the last byte. Values that
/// cannot be parsed select the whole file. The end is clamped to the last
/// byte; a start at or past the end of the file is unsatisfiable.
pub fn parse_range_header(value: &str, size: u64) -> Result<ByteRange, RangeError> {
    let full = ByteRange::full(size).ok_or(RangeError::Unsatisfiable)?;
    let (start, end) = match parse_bounds(value) {
        Some(bounds) => bounds,
        None => return Ok(full),
    };

    let start = start.unwrap_or(0);
    if start >= size {
        return Err(RangeError::Unsatisfiable);
    }
    let end = match end {
        Some(end) if end < size => end,
        _ => size - 1,
    };

    Ok(ByteRange { start, end })
}

fn parse_bounds(value: &str) -> Option<(Option<u64>, Option<u64>)> {
    let range = value.trim().strip_prefix("bytes=")?;
    if range.contains(',') {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;
    let start = parse_bound(start_str)?;
    let end = parse_bound(end_str)?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return None;
        }
    }
    Some((start, end))
}

// `Some(None)` for an empty bound, `None` when it is not a number.
fn parse_bound(value: &str) -> Option<Option<u64>> {
    let value = value.trim();
    if value.is_empty() {
        return Some(None);
    }
    value.parse().ok().map(Some)
}
