//! Range request and size headers.

use hyper::header::{CONTENT_LENGTH, CONTENT_RANGE};
use hyper::{HeaderMap, StatusCode};

/// `Range` value for `[from, to)`, or everything from `from` on.
pub fn range_header(from: u64, to: Option<u64>) -> String {
    match to {
        Some(to) if to > from => format!("bytes={}-{}", from, to - 1),
        _ => format!("bytes={}-", from),
    }
}

/// Parsed `Content-Range: bytes <first>-<last>/<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    /// `None` when the server sent `*`.
    pub total: Option<u64>,
}

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (first, last) = span.split_once('-')?;
    let first = first.trim().parse().ok()?;
    let last = last.trim().parse().ok()?;
    if last < first {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange { first, last, total })
}

fn header_str<'a>(headers: &'a HeaderMap, name: hyper::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Total object size implied by a response opened at `cursor`.
///
/// A 206 carries the total in `Content-Range`; otherwise the body length is
/// what is left past the cursor.
pub fn object_size(status: StatusCode, headers: &HeaderMap, cursor: u64) -> Option<u64> {
    if status == StatusCode::PARTIAL_CONTENT {
        if let Some(total) = header_str(headers, CONTENT_RANGE)
            .and_then(parse_content_range)
            .and_then(|r| r.total)
        {
            return Some(total);
        }
    }
    header_str(headers, CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|len| cursor + len)
}
