//! Small helpers for integration scripts: string formatting, version checks
//! and time parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Replace `{n}` placeholders with the n-th argument, counting from 1.
///
/// `{-1}` and `{-2}` produce a literal `{` and `}`. Any other index, and an
/// index past the end of `args`, produces nothing.
///
/// ```
/// use core_service::utils::format;
///
/// assert_eq!(
///     format("My name is {2}. {1} {2}!", &["James", "Bond"]),
///     "My name is Bond. James Bond!"
/// );
/// assert_eq!(format("{-1}{1}{-2}", &["x"]), "{x}");
/// ```
pub fn format<T: fmt::Display>(template: &str, args: &[T]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open..];
        match placeholder(candidate) {
            Some((index, len)) => {
                match index {
                    -1 => out.push('{'),
                    -2 => out.push('}'),
                    n if n > 0 => {
                        if let Some(arg) = usize::try_from(n - 1).ok().and_then(|i| args.get(i)) {
                            out.push_str(&arg.to_string());
                        }
                    }
                    _ => {}
                }
                rest = &candidate[len..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse `{-?[0-9]+}` at the start of `s`. Returns the index and the length
/// of the placeholder.
fn placeholder(s: &str) -> Option<(i64, usize)> {
    let body = s.strip_prefix('{')?;
    let close = body.find('}')?;
    let inner = &body[..close];
    let digits = inner.strip_prefix('-').unwrap_or(inner);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Overlong indices still match; they just never name an argument.
    let index = inner.parse::<i64>().unwrap_or(i64::MAX);
    Some((index, close + 2))
}

/// Host application version. The default, `0.0.0`, means "unknown" and
/// satisfies no version check except `0.0.0` itself.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl HostVersion {
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self { major, minor, micro }
    }

    pub fn encode(&self) -> u64 {
        encode_version(self.major, self.minor, self.micro)
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Encode a version as a single comparable number.
pub fn encode_version(major: u32, minor: u32, micro: u32) -> u64 {
    u64::from(major) * 100_000 + u64::from(minor) * 1_000 + u64::from(micro)
}

/// Render a compact version number `major * 10000 + minor * 100 + micro`,
/// the two-digit form hosts report for component versions.
///
/// ```
/// assert_eq!(core_service::utils::format_version(40_512), "4.5.12");
/// ```
pub fn format_version(encoded: u64) -> String {
    let micro = encoded % 100;
    let rest = encoded / 100;
    let minor = rest % 100;
    let major = rest / 100;
    format!("{major}.{minor}.{micro}")
}

/// Whether `host` is at least `major.minor.micro`.
pub fn check_version(host: HostVersion, major: u32, minor: u32, micro: u32) -> bool {
    host.encode() >= encode_version(major, minor, micro)
}

/// Parse `[[HH:]MM:]SS` into microseconds.
///
/// A leading minus on the first component makes the whole value negative.
/// Empty or unparsable input yields 0.
pub fn parse_time_usec(time: &str) -> i64 {
    let time = time.trim();
    if time.is_empty() {
        return 0;
    }

    let parts: Vec<&str> = time.split(':').collect();
    let sign = match parts.first().and_then(|p| time_component(p)) {
        Some(first) if first < 0.0 => -1.0,
        _ => 1.0,
    };

    let mut seconds = 0.0;
    for (part, scale) in parts.iter().rev().zip([1.0, 60.0, 3600.0]) {
        match time_component(part) {
            Some(n) => seconds += (n * scale).abs(),
            None => return 0,
        }
    }
    (sign * seconds * 1_000_000.0).round() as i64
}

/// One `:`-separated component. Blank counts as zero.
fn time_component(part: &str) -> Option<f64> {
    let part = part.trim();
    if part.is_empty() {
        return Some(0.0);
    }
    part.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Keys of `a` that are missing from `b` or hold a different value there.
pub fn object_diff(a: &Map<String, Value>, b: &Map<String, Value>) -> Vec<String> {
    a.iter()
        .filter(|(key, value)| b.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_placeholders() {
        assert_eq!(format("{1} and {3}", &["a", "b"]), "a and ");
        assert_eq!(format("{0}|{-3}", &["a"]), "|");
        assert_eq!(format("{-1}1{-2}", &[] as &[&str]), "{1}");
        assert_eq!(format("{x} {1", &["a"]), "{x} {1");
        assert_eq!(format("{{1}}", &[7]), "{7}");
        assert_eq!(format("{99999999999999999999}", &["a"]), "");
    }

    #[test]
    fn test_versions() {
        assert_eq!(encode_version(4, 5, 0), 405_000);
        assert_eq!(format_version(30_201), "3.2.1");

        let host = HostVersion::new(4, 8, 1);
        assert_eq!(host.to_string(), "4.8.1");
        assert!(check_version(host, 4, 5, 0));
        assert!(check_version(host, 4, 8, 1));
        assert!(!check_version(host, 4, 9, 0));
        assert!(!check_version(host, 5, 0, 0));
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time_usec(""), 0);
        assert_eq!(parse_time_usec("45"), 45_000_000);
        assert_eq!(parse_time_usec("3:07"), 187_000_000);
        assert_eq!(parse_time_usec("1:02:03"), 3_723_000_000);
        assert_eq!(parse_time_usec("-1:30"), -90_000_000);
        assert_eq!(parse_time_usec("0:01.5"), 1_500_000);
        assert_eq!(parse_time_usec("live"), 0);
        assert_eq!(parse_time_usec("1::2"), 3_602_000_000);
    }

    #[test]
    fn test_object_diff() {
        let a = json!({"title": "A", "artist": "B", "album": null});
        let b = json!({"title": "A", "artist": "C"});
        let diff = object_diff(a.as_object().unwrap(), b.as_object().unwrap());
        assert_eq!(diff, vec!["album".to_string(), "artist".to_string()]);
    }
}
