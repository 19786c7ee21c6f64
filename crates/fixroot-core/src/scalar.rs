//! Single-value fixture files.
//!
//! Each reader takes the first whitespace-delimited token of the file and
//! ignores anything after it. Numeric readers accept the longest leading run
//! of digits (after an optional sign), the way `scanf` would, and fail if
//! there is none. Signed values detect their base like `%i`: `0x` is hex and
//! a leading `0` is octal. Unsigned values are decimal, like `%lu`.

use std::path::Path;

use crate::error::{FixtureError, Result};

fn first_token(path: &Path, expected: &'static str) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| FixtureError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = || FixtureError::Malformed {
        path: path.to_path_buf(),
        expected,
    };
    let text = std::str::from_utf8(&bytes).map_err(|_| malformed())?;
    text.split_ascii_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(malformed)
}

fn split_sign(token: &str) -> (bool, &str) {
    match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    }
}

/// Longest leading run of digits in `radix`.
fn digit_run(s: &str, radix: u32) -> &str {
    let end = s
        .char_indices()
        .find(|&(_, c)| !c.is_digit(radix))
        .map_or(s.len(), |(i, _)| i);
    &s[..end]
}

/// Base and digits of an unsigned token, with `%i` base detection.
fn detect_radix(s: &str) -> (u32, &str) {
    let bytes = s.as_bytes();
    if bytes.len() > 2
        && bytes[0] == b'0'
        && (bytes[1] == b'x' || bytes[1] == b'X')
        && bytes[2].is_ascii_hexdigit()
    {
        (16, digit_run(&s[2..], 16))
    } else if bytes.first() == Some(&b'0') {
        (8, digit_run(s, 8))
    } else {
        (10, digit_run(s, 10))
    }
}

/// Read one signed 64-bit integer.
pub fn read_signed(path: &Path) -> Result<i64> {
    const EXPECTED: &str = "integer value";
    let token = first_token(path, EXPECTED)?;
    let malformed = || FixtureError::Malformed {
        path: path.to_path_buf(),
        expected: EXPECTED,
    };
    let (negative, unsigned) = split_sign(&token);
    let (radix, digits) = detect_radix(unsigned);
    if digits.is_empty() {
        return Err(malformed());
    }
    let magnitude = i128::from_str_radix(digits, radix).map_err(|_| malformed())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| malformed())
}

/// Read one unsigned 64-bit integer. Negative values are rejected.
pub fn read_unsigned(path: &Path) -> Result<u64> {
    const EXPECTED: &str = "unsigned integer value";
    let token = first_token(path, EXPECTED)?;
    let malformed = || FixtureError::Malformed {
        path: path.to_path_buf(),
        expected: EXPECTED,
    };
    let (negative, unsigned) = split_sign(&token);
    let digits = digit_run(unsigned, 10);
    if negative || digits.is_empty() {
        return Err(malformed());
    }
    digits.parse().map_err(|_| malformed())
}

/// Read one whitespace-delimited token.
pub fn read_token(path: &Path) -> Result<String> {
    first_token(path, "token")
}
