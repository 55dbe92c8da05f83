//! Parsed request head and the request surface handed to applications.

use http::{Method, Uri, Version};

use crate::protocol::headers::{ConnectionOptions, HeaderMap, KnownHeaderName};

/// The parsed request line and header section of one HTTP request.
///
/// Built by the header decoder; the request target's path component has
/// already been canonicalized (dot segments removed) by the time the head is
/// constructed.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    raw_target: String,
    version: Version,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn new(
        method: Method,
        uri: Uri,
        raw_target: String,
        version: Version,
        headers: HeaderMap,
    ) -> Self {
        Self { method, uri, raw_target, version, headers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The canonicalized path component of the request target.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// The request target exactly as it appeared on the request line.
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Keep-alive as requested by the client, from the HTTP version and the
    /// `Connection` header. Protocol violations may still force the
    /// connection closed later.
    pub fn keep_alive_requested(&self) -> bool {
        let options = ConnectionOptions::parse(&self.headers);
        if options.close {
            return false;
        }
        match self.version {
            Version::HTTP_11 => true,
            Version::HTTP_10 => options.keep_alive,
            _ => false,
        }
    }

    /// Whether the client requested a protocol upgrade.
    pub fn upgrade_requested(&self) -> bool {
        self.version == Version::HTTP_11 && ConnectionOptions::parse(&self.headers).upgrade
    }

    /// Whether the client sent `Expect: 100-continue`.
    pub fn expect_continue(&self) -> bool {
        match self.headers.get_known(KnownHeaderName::Expect) {
            Some(values) => {
                let bytes = values.first().as_bytes();
                bytes.len() >= 4 && bytes[..4].eq_ignore_ascii_case(b"100-")
            }
            None => false,
        }
    }
}

/// One HTTP request: head plus a body of type `B`.
///
/// The connection hands applications a `Request<ReqBody>`; the body streams
/// chunks as they are decoded from the transport.
pub struct Request<B> {
    head: RequestHead,
    body: B,
}

impl<B> Request<B> {
    pub fn from_parts(head: RequestHead, body: B) -> Self {
        Self { head, body }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.head.query()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    pub fn into_body(self) -> B {
        self.body
    }

    pub fn into_parts(self) -> (RequestHead, B) {
        (self.head, self.body)
    }
}
