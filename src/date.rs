//! Cached `Date` header production.
//!
//! Formatting an RFC 9110 date per response is measurable overhead under
//! load, so a background task refreshes a preformatted value on a sub-second
//! interval and the encoder grabs the current one lock-free.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

static DATE_SERVICE: Lazy<DateService> =
    Lazy::new(|| DateService::new_with_update_interval(Duration::from_millis(800)));

/// Periodically refreshed, shareable HTTP date value.
pub struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    handle: tokio::task::JoinHandle<()>,
}

impl DateService {
    /// The process-wide instance. First access must happen inside a tokio
    /// runtime, since it spawns the refresh task.
    pub fn global() -> &'static DateService {
        &DATE_SERVICE
    }

    fn new_with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(format_now()));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(update_interval).await;
                current_arc.store(Arc::new(format_now()));
            }
        });

        DateService { current, handle }
    }

    /// The current date as a ready-to-emit header value.
    pub fn header_value(&self) -> HeaderValue {
        let date = self.current.load().as_ref().clone();
        // SAFE: the buffer was produced by faf_http_date and contains only
        // visible ASCII.
        unsafe { HeaderValue::from_maybe_shared_unchecked(date) }
    }
}

fn format_now() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
