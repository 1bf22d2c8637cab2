//! Single byte-range resolution for source streaming.

use crate::common::error::{AppError, AppResult};

/// An inclusive byte range already clamped to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Resolves a `Range` header value against a file of `file_len` bytes.
///
/// Only `bytes=<start>-[<end>]` is accepted. An open-ended request is capped
/// at `chunk_size` bytes so a player cannot pull the whole file in one
/// response.
pub fn resolve_range(header: &str, file_len: u64, chunk_size: u64) -> AppResult<ByteRange> {
    let (start, explicit_end) = parse_range(header)?;

    if start >= file_len {
        return Err(AppError::RangeNotSatisfiable { length: file_len });
    }

    let last = file_len - 1;
    let end = match explicit_end {
        Some(end) => end.min(last),
        None => start
            .saturating_add(chunk_size.max(1) - 1)
            .min(last),
    };

    let range = ByteRange { start, end };
    if range.is_empty() {
        return Err(AppError::RangeNotSatisfiable { length: file_len });
    }
    Ok(range)
}

fn parse_range(header: &str) -> AppResult<(u64, Option<u64>)> {
    let malformed = || AppError::MalformedRange(header.to_string());

    let set = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(malformed)?
        .trim();

    if set.contains(',') {
        return Err(malformed());
    }

    let (start, end) = set.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    // Suffix ranges (`bytes=-500`) are not supported.
    let start = parse_offset(start).ok_or_else(malformed)?;
    let end = if end.is_empty() {
        None
    } else {
        Some(parse_offset(end).ok_or_else(malformed)?)
    };

    Ok((start, end))
}

fn parse_offset(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
