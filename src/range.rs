use axum::http::header::RANGE;
use axum::http::{HeaderMap, HeaderValue};

use crate::error::{ParseError, RangeNotSatisfiable};

/// The byte window a client asked for, resolved against a resource length.
///
/// `end` is the upper bound exactly as requested. When the client leaves the
/// upper bound open (`bytes=100-`) or sends no header at all, `end` is the
/// resource length. `start <= end` holds for every explicit range; an
/// open-ended range may start past the length, which [`Range::window`]
/// rejects as not satisfiable. The scale fields carry fractional bounds for sources
/// whose length is unknown up front and stay `0.0` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
    pub low_scale: f64,
    pub high_scale: f64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Self {
        Range { start, end, low_scale: 0.0, high_scale: 0.0 }
    }

    /// The whole resource, `[0, length)`.
    pub fn full(length: u64) -> Self {
        Range::new(0, length)
    }

    pub fn with_scale(self, low_scale: f64, high_scale: f64) -> Self {
        Range { low_scale, high_scale, ..self }
    }

    /// Clamps this range to a resource of `total_bytes`, yielding the
    /// concrete span to send. Fails when the window starts at or past the end.
    pub fn window(&self, total_bytes: u64) -> Result<ByteRange, RangeNotSatisfiable> {
        if total_bytes == 0 && self.start == 0 {
            return Ok(ByteRange::new(0, 0));
        }
        if self.start >= total_bytes {
            return Err(RangeNotSatisfiable::for_length(total_bytes));
        }
        // an explicit end is the inclusive last byte, an open end is the length
        let last = self.end.min(total_bytes - 1);
        Ok(ByteRange::new(self.start, last + 1))
    }
}

/// Represents a single byte range with start and end positions (exclusive end).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end_exclusive: u64,
}

impl ByteRange {
    /// Create a new byte range with inclusive start and exclusive end.
    pub fn new(start: u64, end_exclusive: u64) -> Self {
        ByteRange { start, end_exclusive }
    }

    pub fn len(&self) -> u64 {
        self.end_exclusive - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this span covers an entire resource of `total_bytes`.
    pub fn is_full(&self, total_bytes: u64) -> bool {
        self.start == 0 && self.end_exclusive == total_bytes
    }
}

/// Resolves the `Range` header of a request. A missing header map or a
/// missing header both mean the full resource.
pub fn parse_range(headers: Option<&HeaderMap>, length: u64) -> Result<Range, ParseError> {
    match headers {
        Some(headers) => resolve(headers.get_all(RANGE), length),
        None => Ok(Range::full(length)),
    }
}

/// Resolves a set of `Range` header values. Only the first value, and within
/// it only the first byte-range-spec, is honored.
pub fn resolve<'a, I>(values: I, length: u64) -> Result<Range, ParseError>
where
    I: IntoIterator<Item = &'a HeaderValue>,
{
    match values.into_iter().next() {
        None => Ok(Range::full(length)),
        Some(value) => {
            let text = value.to_str().map_err(|_| ParseError::NotText)?;
            parse_range_header(text, length)
        }
    }
}

fn parse_range_header(text: &str, length: u64) -> Result<Range, ParseError> {
    let (_unit, spec) = text
        .split_once('=')
        .ok_or_else(|| ParseError::MissingUnit(text.to_string()))?;
    let spec = spec.split(',').next().unwrap_or_default();

    let (start, end) = match spec.split_once('-') {
        Some((start, end)) => (start, end.trim()),
        None => (spec, ""),
    };
    let start = parse_u64(text, start)?;
    if end.is_empty() {
        return Ok(Range::new(start, length));
    }

    let end = parse_u64(text, end)?;
    if start > end {
        return Err(ParseError::Inverted { start, end });
    }
    Ok(Range::new(start, end))
}

fn parse_u64(input: &str, value: &str) -> Result<u64, ParseError> {
    value.trim().parse::<u64>().map_err(|_| ParseError::InvalidNumber {
        input: input.to_string(),
        value: value.to_string(),
    })
}
