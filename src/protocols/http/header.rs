//! HTTP response header.

use crate::runtime::{DecodeError, Encode};
use bytes::BufMut;
use std::collections::BTreeMap;
use std::fmt;

/// Parsed status line plus header fields.
///
/// Field names are stored as received; a name that appears more than once
/// keeps all values joined with `"; "`. The derived accessors look names up
/// ignoring ASCII case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    status_line: String,
    version: String,
    code: u16,
    fields: BTreeMap<String, String>,
}

impl HttpHeader {
    /// Validate `status_line` and build the header.
    pub fn new(status_line: String, fields: BTreeMap<String, String>) -> Result<Self, DecodeError> {
        let (version, code) = parse_status_line(&status_line)?;
        Ok(Self {
            version: version.to_string(),
            code,
            status_line,
            fields,
        })
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Protocol version, e.g. `1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Value of `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.get("Content-Length")?.trim().parse().ok()
    }

    /// `charset` parameter of `Content-Type`.
    pub fn charset(&self) -> Option<&str> {
        let content_type = self.get("Content-Type")?;
        content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }

    /// Whether the body uses chunked transfer-encoding.
    pub fn is_chunked(&self) -> bool {
        self.get("Transfer-Encoding").is_some_and(|te| {
            te.split([',', ';'])
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        })
    }
}

impl fmt::Display for HttpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.status_line)?;
        for (name, value) in &self.fields {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

/// Header text is ISO-8859-1 on the wire: one byte per char. Chars above
/// U+00FF have no encoding and are sent as `?`.
impl Encode for HttpHeader {
    fn encoded_len(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .map(|(name, value)| latin1_len(name) + 2 + latin1_len(value) + 2)
            .sum();
        latin1_len(&self.status_line) + 2 + fields + 2
    }

    fn encode<B: BufMut>(&self, dst: &mut B) {
        put_latin1(dst, &self.status_line);
        dst.put_slice(b"\r\n");
        for (name, value) in &self.fields {
            put_latin1(dst, name);
            dst.put_slice(b": ");
            put_latin1(dst, value);
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }
}

fn latin1_len(s: &str) -> usize {
    s.chars().count()
}

fn put_latin1<B: BufMut>(dst: &mut B, s: &str) {
    for c in s.chars() {
        dst.put_u8(u8::try_from(c).unwrap_or(b'?'));
    }
}

/// `GET` request for `path` on `host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub host: String,
    pub path: String,
}

impl GetRequest {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

impl Encode for GetRequest {
    fn encoded_len(&self) -> usize {
        "GET ".len() + self.path.len() + " HTTP/1.1\r\nHost: ".len() + self.host.len() + 4
    }

    fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(b"GET ");
        dst.put_slice(self.path.as_bytes());
        dst.put_slice(b" HTTP/1.1\r\nHost: ");
        dst.put_slice(self.host.as_bytes());
        dst.put_slice(b"\r\n\r\n");
    }
}

/// Split `HTTP/<version> <code>[ <reason>]` into version and code.
pub fn parse_status_line(line: &str) -> Result<(&str, u16), DecodeError> {
    let malformed = || DecodeError::MalformedStatusLine(line.to_string());

    let rest = line.strip_prefix("HTTP/").ok_or_else(malformed)?;
    let (version, rest) = rest.split_once(' ').ok_or_else(malformed)?;
    if version.is_empty() {
        return Err(malformed());
    }

    // Reason phrase is optional and free-form
    let code = rest.split_once(' ').map_or(rest, |(code, _)| code);
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let code = code.parse().map_err(|_| malformed())?;
    Ok((version, code))
}

/// Split a field line on the first `": "`.
pub fn split_field(line: &str) -> Result<(&str, &str), DecodeError> {
    line.split_once(": ")
        .ok_or_else(|| DecodeError::MissingSeparator(line.to_string()))
}

/// Insert a field, joining repeated names with `"; "`.
pub fn merge_field(fields: &mut BTreeMap<String, String>, name: &str, value: &str) {
    fields
        .entry(name.to_string())
        .and_modify(|existing| {
            existing.push_str("; ");
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}
