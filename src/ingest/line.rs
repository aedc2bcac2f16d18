use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("no bracketed nginx timestamp")]
    NoTimestamp,

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// A received access-log line with its embedded request time.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessLine<'a> {
    pub raw: &'a str,
    /// Wall-clock time as written by nginx; any UTC offset after it is ignored.
    pub timestamp: NaiveDateTime,
}

impl<'a> AccessLine<'a> {
    pub fn parse(raw: &'a str) -> Result<Self, LineError> {
        let captures = timestamp_pattern()
            .captures(raw)
            .ok_or(LineError::NoTimestamp)?;
        let value = &captures[1];

        let timestamp = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .map_err(|_| LineError::InvalidTimestamp(value.to_string()))?;

        Ok(Self { raw, timestamp })
    }

    /// First `"{...}"` fragment that decodes to JSON, if any.
    pub fn json_fragment(&self) -> Option<serde_json::Value> {
        json_pattern()
            .captures_iter(self.raw)
            .filter_map(|caps| {
                let decoded = unescape(&caps[1]);
                serde_json::from_str(&decoded).ok()
            })
            .next()
    }
}

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[(\d{2}/[A-Za-z]+/\d{4}:\d{2}:\d{2}:\d{2})").expect("static regex")
    })
}

fn json_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""(\{.*?\})""#).expect("static regex"))
}

/// Reverses nginx `escape=default` quoting (`\xHH`, `\"`, `\\`).
fn unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'x' if i + 3 < bytes.len() => {
                    let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).ok();
                    if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                }
                b'"' | b'\\' => {
                    out.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
