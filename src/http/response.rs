//! Response observation.
//!
//! # Responsibilities
//! - Record the response status exactly once
//! - Count the body bytes actually written to the client
//! - Expose the raw-connection upgrade when the transport offers one
//!
//! # Design Decisions
//! - One observer per request, shared by every link of the chain through
//!   request extensions; the first status recorded is authoritative
//! - A body frame written before any status implies 200
//! - Counting happens while the body streams; nothing is buffered

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
    response::Response,
};
use http_body::{Body as HttpBody, Frame, SizeHint};
use hyper::upgrade::OnUpgrade;

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("the underlying connection does not support upgrades")]
    UnsupportedOperation,
}

/// Write-once record of a response's status and size.
#[derive(Debug, Default)]
pub struct ResponseObserver {
    /// 0 while unset.
    code: AtomicU16,
    size: AtomicU64,
    body_attached: AtomicBool,
}

impl ResponseObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The observer shared by every link handling `req`, created on first use.
    pub fn attach<B>(req: &mut Request<B>) -> Arc<Self> {
        if let Some(observer) = req.extensions().get::<Arc<Self>>() {
            return Arc::clone(observer);
        }
        let observer = Arc::new(Self::new());
        req.extensions_mut().insert(Arc::clone(&observer));
        observer
    }

    /// Record `status` unless one is already recorded. Returns whether it took effect.
    pub fn set_status(&self, status: StatusCode) -> bool {
        self.code
            .compare_exchange(0, status.as_u16(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Account for `len` body bytes, implying 200 if no status was recorded.
    pub fn write(&self, len: usize) {
        self.set_status(StatusCode::OK);
        self.size.fetch_add(len as u64, Ordering::AcqRel);
    }

    /// A flush also commits the status.
    pub fn flush(&self) {
        self.set_status(StatusCode::OK);
    }

    /// Recorded status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self.code() {
            0 => None,
            code => StatusCode::from_u16(code).ok(),
        }
    }

    /// Recorded status code, 0 while unset.
    pub fn code(&self) -> u16 {
        self.code.load(Ordering::Acquire)
    }

    /// Body bytes written so far.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Take over the raw connection of `req`.
    pub fn hijack<B>(&self, req: &mut Request<B>) -> Result<OnUpgrade, ObserverError> {
        req.extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(ObserverError::UnsupportedOperation)
    }

    /// Commit the status of `response` and start counting its body.
    ///
    /// When a status was recorded earlier, it is the one sent. The body is
    /// wrapped only once per request, however many links observe it.
    pub fn observe(self: &Arc<Self>, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        if !self.set_status(parts.status) {
            if let Some(status) = self.status() {
                parts.status = status;
            }
        }

        if self.body_attached.swap(true, Ordering::AcqRel) {
            return Response::from_parts(parts, body);
        }
        let body = Body::new(ObservedBody {
            inner: body,
            observer: Arc::clone(self),
            done: false,
        });
        Response::from_parts(parts, body)
    }
}

/// Response body that reports every data frame to its observer.
pub struct ObservedBody {
    inner: Body,
    observer: Arc<ResponseObserver>,
    done: bool,
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    self.observer.write(data.len());
                }
            }
            Poll::Ready(None) if !self.done => {
                self.done = true;
                self.observer.flush();
                tracing::trace!(
                    status = self.observer.code(),
                    bytes = self.observer.size(),
                    "response body complete"
                );
            }
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let observer = ResponseObserver::new();
        assert_eq!(observer.code(), 0);
        assert!(observer.set_status(StatusCode::CREATED));
        assert!(!observer.set_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(observer.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn writes_imply_ok_and_accumulate() {
        for writes in [0usize, 1, 5] {
            let observer = ResponseObserver::new();
            for _ in 0..writes {
                observer.write(10);
            }
            observer.flush();
            assert_eq!(observer.status(), Some(StatusCode::OK));
            assert_eq!(observer.size(), 10 * writes as u64);
        }
    }

    #[test]
    fn explicit_status_survives_writes() {
        let observer = ResponseObserver::new();
        observer.set_status(StatusCode::ACCEPTED);
        observer.write(3);
        observer.write(4);
        assert_eq!(observer.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(observer.size(), 7);
    }

    #[test]
    fn attach_shares_one_observer() {
        let mut req = Request::new(Body::empty());
        let first = ResponseObserver::attach(&mut req);
        let second = ResponseObserver::attach(&mut req);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn hijack_without_upgrade_is_unsupported() {
        let mut req = Request::new(Body::empty());
        let observer = ResponseObserver::attach(&mut req);
        assert!(matches!(
            observer.hijack(&mut req),
            Err(ObserverError::UnsupportedOperation)
        ));
    }

    #[tokio::test]
    async fn observe_counts_streamed_bytes_once() {
        let observer = Arc::new(ResponseObserver::new());
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("missing"))
            .unwrap();

        let response = observer.observe(response);
        let response = observer.observe(response);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"missing");
        assert_eq!(observer.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(observer.size(), 7);
    }

    #[test]
    fn earlier_status_overrides_response_head() {
        let observer = Arc::new(ResponseObserver::new());
        observer.set_status(StatusCode::SERVICE_UNAVAILABLE);

        let response = observer.observe(Response::new(Body::empty()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
