//! Two-tier HTTP header container.
//!
//! Well-known header names resolve to fixed slots without any dictionary
//! lookup; everything else lands in a lazily-allocated overflow list that
//! preserves insertion order. A map travels with the request or response head
//! that owns it; [`HeaderMap::reset`] clears one for reuse without dropping
//! the overflow allocation, and [`HeaderMap::set_read_only`] locks it down
//! once response production begins.

use http::HeaderName;
use http::HeaderValue;
use thiserror::Error;

/// Validation and mutation errors for [`HeaderMap`].
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("headers are read-only, response has started")]
    HeadersReadOnly,

    #[error("invalid header name")]
    InvalidHeaderName,

    #[error("invalid character in header value")]
    InvalidHeaderCharacter,

    #[error("invalid header value: {reason}")]
    InvalidHeaderValue { reason: String },
}

impl HeaderError {
    pub fn invalid_value<S: ToString>(reason: S) -> Self {
        Self::InvalidHeaderValue { reason: reason.to_string() }
    }
}

/// Header names with dedicated storage slots.
///
/// Resolution is a length bucket plus a case-insensitive byte comparison, so
/// the hot parse path never touches a hash map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(usize)]
pub enum KnownHeaderName {
    Host,
    Connection,
    ContentLength,
    ContentType,
    TransferEncoding,
    Date,
    Server,
    Upgrade,
    Expect,
    UserAgent,
    Accept,
}

const KNOWN_COUNT: usize = 11;

/// Slot order used for iteration; matches the discriminants above.
const KNOWN_HEADERS: [KnownHeaderName; KNOWN_COUNT] = [
    KnownHeaderName::Host,
    KnownHeaderName::Connection,
    KnownHeaderName::ContentLength,
    KnownHeaderName::ContentType,
    KnownHeaderName::TransferEncoding,
    KnownHeaderName::Date,
    KnownHeaderName::Server,
    KnownHeaderName::Upgrade,
    KnownHeaderName::Expect,
    KnownHeaderName::UserAgent,
    KnownHeaderName::Accept,
];

impl KnownHeaderName {
    /// Canonical wire spelling of the header name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Connection => "Connection",
            Self::ContentLength => "Content-Length",
            Self::ContentType => "Content-Type",
            Self::TransferEncoding => "Transfer-Encoding",
            Self::Date => "Date",
            Self::Server => "Server",
            Self::Upgrade => "Upgrade",
            Self::Expect => "Expect",
            Self::UserAgent => "User-Agent",
            Self::Accept => "Accept",
        }
    }

    /// Resolves a raw header name to its slot, case-insensitively.
    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        match name.len() {
            4 => match_known(name, &[Self::Host, Self::Date]),
            6 => match_known(name, &[Self::Server, Self::Expect, Self::Accept]),
            7 => match_known(name, &[Self::Upgrade]),
            10 => match_known(name, &[Self::Connection, Self::UserAgent]),
            12 => match_known(name, &[Self::ContentType]),
            14 => match_known(name, &[Self::ContentLength]),
            17 => match_known(name, &[Self::TransferEncoding]),
            _ => None,
        }
    }
}

fn match_known(name: &[u8], candidates: &[KnownHeaderName]) -> Option<KnownHeaderName> {
    candidates.iter().copied().find(|c| name.eq_ignore_ascii_case(c.as_str().as_bytes()))
}

/// One or more values for a single header name.
///
/// The common case is a single value; additional values from repeated header
/// lines go into an overflow vector.
#[derive(Debug, Clone)]
pub struct HeaderValues {
    first: HeaderValue,
    rest: Vec<HeaderValue>,
}

impl HeaderValues {
    fn one(value: HeaderValue) -> Self {
        Self { first: value, rest: Vec::new() }
    }

    fn push(&mut self, value: HeaderValue) {
        self.rest.push(value);
    }

    /// The first (usually only) value.
    pub fn first(&self) -> &HeaderValue {
        &self.first
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderValue> + '_ {
        std::iter::once(&self.first).chain(self.rest.iter())
    }
}

/// Ordered, case-insensitive, multi-value header container.
#[derive(Debug)]
pub struct HeaderMap {
    known: [Option<HeaderValues>; KNOWN_COUNT],
    overflow: Option<Box<Vec<(HeaderName, HeaderValues)>>>,
    content_length: Option<u64>,
    read_only: bool,
}

impl Default for HeaderMap {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderMap {
    pub fn new() -> Self {
        Self { known: Default::default(), overflow: None, content_length: None, read_only: false }
    }

    /// Clears all values and the read-only flag.
    ///
    /// The overflow allocation, if any, is kept so a reused map does not
    /// re-allocate.
    pub fn reset(&mut self) {
        for slot in self.known.iter_mut() {
            *slot = None;
        }
        if let Some(overflow) = &mut self.overflow {
            overflow.clear();
        }
        self.content_length = None;
        self.read_only = false;
    }

    /// Locks the map; every later mutation fails with [`HeaderError::HeadersReadOnly`].
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn len(&self) -> usize {
        let known = self.known.iter().flatten().map(HeaderValues::len).sum::<usize>();
        let overflow =
            self.overflow.iter().flat_map(|o| o.iter()).map(|(_, v)| v.len()).sum::<usize>();
        known + overflow
    }

    pub fn is_empty(&self) -> bool {
        self.known.iter().all(Option::is_none)
            && self.overflow.as_ref().is_none_or(|o| o.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValues> {
        match KnownHeaderName::from_bytes(name.as_bytes()) {
            Some(known) => self.known[known as usize].as_ref(),
            None => self
                .overflow
                .as_ref()?
                .iter()
                .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
                .map(|(_, v)| v),
        }
    }

    pub fn get_known(&self, name: KnownHeaderName) -> Option<&HeaderValues> {
        self.known[name as usize].as_ref()
    }

    /// Replaces all values of `name`. An empty value list removes the header.
    pub fn set(&mut self, name: &str, values: &[&str]) -> Result<(), HeaderError> {
        if values.is_empty() {
            return self.remove(name);
        }
        self.ensure_mutable()?;
        let mut parsed = values.iter().map(|v| parse_value(v.as_bytes()));
        // First value replaces, the rest append.
        let first = parsed.next().ok_or(HeaderError::InvalidHeaderCharacter)??;
        self.remove(name)?;
        self.insert_value(name.as_bytes(), first)?;
        for value in parsed {
            self.insert_value(name.as_bytes(), value?)?;
        }
        Ok(())
    }

    /// Replaces `name` with a single value.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.set(name, &[value])
    }

    /// Appends one more value for `name`.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.ensure_mutable()?;
        let value = parse_value(value.as_bytes())?;
        self.insert_value(name.as_bytes(), value)
    }

    /// Replaces a known header with a pre-validated value. Fast path for the
    /// response pipeline.
    pub fn insert_known(
        &mut self,
        name: KnownHeaderName,
        value: HeaderValue,
    ) -> Result<(), HeaderError> {
        self.ensure_mutable()?;
        if name == KnownHeaderName::ContentLength {
            self.content_length = parse_content_length(value.as_bytes())?;
        }
        self.known[name as usize] = Some(HeaderValues::one(value));
        Ok(())
    }

    /// Appends a header coming out of the wire parser.
    ///
    /// The name/value bytes were already validated by `httparse`, so only the
    /// slot routing and the Content-Length invariant are enforced here.
    pub(crate) fn append_parsed(
        &mut self,
        name: &[u8],
        value: HeaderValue,
    ) -> Result<(), HeaderError> {
        debug_assert!(!self.read_only);
        if KnownHeaderName::from_bytes(name) == Some(KnownHeaderName::ContentLength)
            && self.content_length.is_some()
        {
            return Err(HeaderError::invalid_value("duplicate content-length header"));
        }
        self.insert_value(name, value)
    }

    pub fn remove(&mut self, name: &str) -> Result<(), HeaderError> {
        self.ensure_mutable()?;
        match KnownHeaderName::from_bytes(name.as_bytes()) {
            Some(known) => {
                if known == KnownHeaderName::ContentLength {
                    self.content_length = None;
                }
                self.known[known as usize] = None;
            }
            None => {
                if let Some(overflow) = &mut self.overflow {
                    overflow.retain(|(n, _)| !n.as_str().eq_ignore_ascii_case(name));
                }
            }
        }
        Ok(())
    }

    /// The cached `Content-Length` value, when one was set and parsed.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Sets `Content-Length`; negative lengths are rejected.
    pub fn set_content_length(&mut self, len: i64) -> Result<(), HeaderError> {
        self.ensure_mutable()?;
        if len < 0 {
            return Err(HeaderError::invalid_value(format!("content-length {len} is negative")));
        }
        self.content_length = Some(len as u64);
        self.known[KnownHeaderName::ContentLength as usize] =
            Some(HeaderValues::one(HeaderValue::from(len as u64)));
        Ok(())
    }

    /// Iterates every (name, value) pair: known slots first in a fixed order,
    /// then overflow headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> + '_ {
        let known = KNOWN_HEADERS
            .iter()
            .filter_map(|name| self.known[*name as usize].as_ref().map(|v| (name.as_str(), v)))
            .flat_map(|(name, values)| values.iter().map(move |v| (name, v)));
        let overflow = self
            .overflow
            .iter()
            .flat_map(|o| o.iter())
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v)));
        known.chain(overflow)
    }

    fn ensure_mutable(&self) -> Result<(), HeaderError> {
        if self.read_only { Err(HeaderError::HeadersReadOnly) } else { Ok(()) }
    }

    fn insert_value(&mut self, name: &[u8], value: HeaderValue) -> Result<(), HeaderError> {
        match KnownHeaderName::from_bytes(name) {
            Some(known) => {
                if known == KnownHeaderName::ContentLength {
                    self.content_length = parse_content_length(value.as_bytes())?;
                }
                match &mut self.known[known as usize] {
                    Some(values) => values.push(value),
                    slot @ None => *slot = Some(HeaderValues::one(value)),
                }
            }
            None => {
                let name =
                    HeaderName::from_bytes(name).map_err(|_| HeaderError::InvalidHeaderName)?;
                let overflow = self.overflow.get_or_insert_with(|| Box::new(Vec::new()));
                match overflow.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, values)) => values.push(value),
                    None => overflow.push((name, HeaderValues::one(value))),
                }
            }
        }
        Ok(())
    }
}

fn parse_value(bytes: &[u8]) -> Result<HeaderValue, HeaderError> {
    HeaderValue::from_bytes(bytes).map_err(|_| HeaderError::InvalidHeaderCharacter)
}

fn parse_content_length(bytes: &[u8]) -> Result<Option<u64>, HeaderError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| HeaderError::invalid_value("content-length is not ascii"))?
        .trim();
    if text.starts_with('-') {
        return Err(HeaderError::invalid_value(format!("content-length {text} is negative")));
    }
    let length = text
        .parse::<u64>()
        .map_err(|_| HeaderError::invalid_value(format!("content-length {text} is not a u64")))?;
    Ok(Some(length))
}

/// Parsed `Connection` header tokens.
///
/// Unrecognized tokens are ignored.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub keep_alive: bool,
    pub upgrade: bool,
    pub close: bool,
}

impl ConnectionOptions {
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut options = Self::default();
        let Some(values) = headers.get_known(KnownHeaderName::Connection) else {
            return options;
        };
        for value in values.iter() {
            for token in tokens(value.as_bytes()) {
                if token.eq_ignore_ascii_case(b"keep-alive") {
                    options.keep_alive = true;
                } else if token.eq_ignore_ascii_case(b"upgrade") {
                    options.upgrade = true;
                } else if token.eq_ignore_ascii_case(b"close") {
                    options.close = true;
                }
            }
        }
        options
    }
}

/// Parsed `Transfer-Encoding` classification.
///
/// Only the final coding is validated: when a value is assigned and its last
/// token is not exactly `chunked`, the whole header is classified as `Other`,
/// which downstream treats as a protocol error. Intermediate codings are not
/// inspected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferCoding {
    None,
    Chunked,
    Other,
}

impl TransferCoding {
    pub fn parse(headers: &HeaderMap) -> Self {
        let Some(values) = headers.get_known(KnownHeaderName::TransferEncoding) else {
            return Self::None;
        };
        // Repeated header lines concatenate; only the last token of the last
        // line decides the final coding.
        let last_value = values.iter().last().map(|v| v.as_bytes()).unwrap_or(b"");
        match last_value.rsplit(|b| *b == b',').next() {
            Some(token) if token.trim_ascii().eq_ignore_ascii_case(b"chunked") => Self::Chunked,
            _ => Self::Other,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked)
    }
}

fn tokens(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value.split(|b| *b == b',').map(|t| t.trim_ascii()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(name, value).unwrap();
        }
        headers
    }

    #[test]
    fn known_name_resolution() {
        assert_eq!(KnownHeaderName::from_bytes(b"host"), Some(KnownHeaderName::Host));
        assert_eq!(KnownHeaderName::from_bytes(b"HOST"), Some(KnownHeaderName::Host));
        assert_eq!(
            KnownHeaderName::from_bytes(b"content-length"),
            Some(KnownHeaderName::ContentLength)
        );
        assert_eq!(
            KnownHeaderName::from_bytes(b"Transfer-Encoding"),
            Some(KnownHeaderName::TransferEncoding)
        );
        assert_eq!(KnownHeaderName::from_bytes(b"x-custom"), None);
    }

    #[test]
    fn set_get_remove_round_trip() {
        let mut headers = map_with(&[("Host", "example.com"), ("X-Custom", "a")]);
        assert_eq!(headers.get("host").unwrap().first(), "example.com");
        assert_eq!(headers.get("x-custom").unwrap().first(), "a");

        headers.append("X-Custom", "b").unwrap();
        assert_eq!(headers.get("X-Custom").unwrap().len(), 2);

        headers.remove("X-Custom").unwrap();
        assert!(headers.get("X-Custom").is_none());
    }

    #[test]
    fn empty_value_list_removes() {
        let mut headers = map_with(&[("X-Custom", "a")]);
        headers.set("X-Custom", &[]).unwrap();
        assert!(headers.get("X-Custom").is_none());
    }

    #[test]
    fn read_only_rejects_mutation() {
        let mut headers = map_with(&[("Host", "example.com")]);
        headers.set_read_only();
        assert!(matches!(
            headers.insert("Host", "other"),
            Err(HeaderError::HeadersReadOnly)
        ));
        assert!(matches!(headers.remove("Host"), Err(HeaderError::HeadersReadOnly)));
        assert!(matches!(
            headers.set_content_length(1),
            Err(HeaderError::HeadersReadOnly)
        ));
        // still readable
        assert_eq!(headers.get("Host").unwrap().first(), "example.com");
    }

    #[test]
    fn reset_clears_read_only_and_values() {
        let mut headers = map_with(&[("Host", "example.com"), ("X-Custom", "a")]);
        headers.set_read_only();
        headers.reset();
        assert!(headers.is_empty());
        assert!(!headers.is_read_only());
        headers.insert("Host", "again").unwrap();
    }

    #[test]
    fn negative_content_length_rejected() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            headers.set_content_length(-1),
            Err(HeaderError::InvalidHeaderValue { .. })
        ));
        assert!(headers.append("Content-Length", "-1").is_err());
    }

    #[test]
    fn content_length_cached() {
        let mut headers = HeaderMap::new();
        headers.set_content_length(42).unwrap();
        assert_eq!(headers.content_length(), Some(42));
        headers.remove("Content-Length").unwrap();
        assert_eq!(headers.content_length(), None);
    }

    #[test]
    fn duplicate_content_length_rejected() {
        let mut headers = HeaderMap::new();
        headers
            .append_parsed(b"Content-Length", HeaderValue::from_static("5"))
            .unwrap();
        assert!(
            headers
                .append_parsed(b"Content-Length", HeaderValue::from_static("5"))
                .is_err()
        );
    }

    #[test]
    fn control_characters_rejected() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            headers.insert("X-Custom", "bad\r\nvalue"),
            Err(HeaderError::InvalidHeaderCharacter)
        ));
    }

    #[test]
    fn iteration_order_known_then_overflow() {
        let headers = map_with(&[("X-B", "2"), ("Host", "h"), ("X-A", "1")]);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "x-b", "x-a"]);
    }

    #[test]
    fn connection_options_tokens() {
        let headers = map_with(&[("Connection", "keep-alive, Upgrade")]);
        let options = ConnectionOptions::parse(&headers);
        assert!(options.keep_alive);
        assert!(options.upgrade);
        assert!(!options.close);

        let headers = map_with(&[("Connection", "close, x-unknown")]);
        let options = ConnectionOptions::parse(&headers);
        assert!(options.close);
        assert!(!options.keep_alive);
    }

    #[test]
    fn transfer_coding_final_token() {
        let headers = map_with(&[("Transfer-Encoding", "chunked")]);
        assert_eq!(TransferCoding::parse(&headers), TransferCoding::Chunked);

        let headers = map_with(&[("Transfer-Encoding", "gzip, chunked")]);
        assert_eq!(TransferCoding::parse(&headers), TransferCoding::Chunked);

        let headers = map_with(&[("Transfer-Encoding", "chunked, gzip")]);
        assert_eq!(TransferCoding::parse(&headers), TransferCoding::Other);

        let headers = map_with(&[("Transfer-Encoding", "gzip")]);
        assert_eq!(TransferCoding::parse(&headers), TransferCoding::Other);

        let headers = HeaderMap::new();
        assert_eq!(TransferCoding::parse(&headers), TransferCoding::None);
    }
}
