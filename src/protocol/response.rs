//! Response surface exposed to applications.
//!
//! Status, reason and headers stay mutable until the first byte of the head
//! is produced; the connection locks the header map at that point and any
//! later mutation fails with `HeadersReadOnly`.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use http::{StatusCode, Version};

use crate::protocol::headers::HeaderMap;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Hook run right before the response head is serialized, in LIFO
/// registration order. May still mutate status, reason and headers; an error
/// turns into a 500 response while the head is unsent.
pub type StartingHook = Box<dyn FnOnce(&mut ResponseHead) -> Result<(), BoxError> + Send>;

/// Hook run after the response has been fully produced, in LIFO registration
/// order. Best-effort: errors are logged, never propagated.
pub type CompletedHook =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> + Send>;

/// The status line and header section of a response.
pub struct ResponseHead {
    status: StatusCode,
    reason: Option<&'static str>,
    version: Version,
    headers: HeaderMap,
    on_starting: Vec<StartingHook>,
    on_completed: Vec<CompletedHook>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            on_starting: Vec::new(),
            on_completed: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The reason phrase: an explicit override, or the canonical phrase for
    /// the status code.
    pub fn reason(&self) -> &'static str {
        self.reason.or_else(|| self.status.canonical_reason()).unwrap_or("")
    }

    pub fn set_reason(&mut self, reason: &'static str) {
        self.reason = Some(reason);
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

    /// Registers an on-starting hook; hooks run LIFO.
    pub fn on_starting(&mut self, hook: StartingHook) {
        self.on_starting.push(hook);
    }

    /// Registers an on-completed hook; hooks run LIFO.
    pub fn on_completed(&mut self, hook: CompletedHook) {
        self.on_completed.push(hook);
    }

    /// Takes the registered on-starting hooks in LIFO execution order.
    pub(crate) fn take_on_starting(&mut self) -> Vec<StartingHook> {
        let mut hooks = std::mem::take(&mut self.on_starting);
        hooks.reverse();
        hooks
    }

    /// Takes the registered on-completed hooks in LIFO execution order.
    pub(crate) fn take_on_completed(&mut self) -> Vec<CompletedHook> {
        let mut hooks = std::mem::take(&mut self.on_completed);
        hooks.reverse();
        hooks
    }

    /// Whether this status forbids a message body (RFC 9110: 1xx, 204, 304;
    /// 205 additionally must be empty).
    pub fn bodyless_status(&self) -> bool {
        self.status.is_informational()
            || matches!(
                self.status,
                StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
            )
    }
}

impl fmt::Debug for ResponseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hooks are opaque closures.
        f.debug_struct("ResponseHead")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// One HTTP response: head plus a body implementing `http_body::Body`.
pub struct Response<B> {
    head: ResponseHead,
    body: B,
}

impl<B> Response<B> {
    pub fn new(status: StatusCode, body: B) -> Self {
        Self { head: ResponseHead::new(status), body }
    }

    pub fn from_parts(head: ResponseHead, body: B) -> Self {
        Self { head, body }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.head.headers_mut()
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn into_parts(self) -> (ResponseHead, B) {
        (self.head, self.body)
    }

    pub fn map_body<F, T>(self, f: F) -> Response<T>
    where
        F: FnOnce(B) -> T,
    {
        Response { head: self.head, body: f(self.body) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_run_lifo() {
        let mut head = ResponseHead::new(StatusCode::OK);
        head.on_starting(Box::new(|head: &mut ResponseHead| {
            head.headers_mut().append("X-Order", "first-registered")?;
            Ok(())
        }));
        head.on_starting(Box::new(|head: &mut ResponseHead| {
            head.headers_mut().append("X-Order", "last-registered")?;
            Ok(())
        }));

        let hooks = head.take_on_starting();
        for hook in hooks {
            hook(&mut head).unwrap();
        }

        let values: Vec<&str> = head
            .headers()
            .get("X-Order")
            .unwrap()
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["last-registered", "first-registered"]);
    }

    #[test]
    fn bodyless_statuses() {
        assert!(ResponseHead::new(StatusCode::NO_CONTENT).bodyless_status());
        assert!(ResponseHead::new(StatusCode::RESET_CONTENT).bodyless_status());
        assert!(ResponseHead::new(StatusCode::NOT_MODIFIED).bodyless_status());
        assert!(ResponseHead::new(StatusCode::CONTINUE).bodyless_status());
        assert!(!ResponseHead::new(StatusCode::OK).bodyless_status());
    }

    #[test]
    fn reason_defaults_to_canonical() {
        let mut head = ResponseHead::new(StatusCode::OK);
        assert_eq!(head.reason(), "OK");
        head.set_reason("Fine");
        assert_eq!(head.reason(), "Fine");
    }
}
