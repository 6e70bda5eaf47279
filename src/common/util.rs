use std::{
    borrow::Cow,
    future::Future,
    sync::Arc,
    task::{Context, Poll},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use crossbeam_utils::sync::Parker;
use futures_util::{pin_mut, task::ArcWake};
use serde::{Deserialize, Serialize};

// ===============================================================================================
// Futures
// ===============================================================================================
/// Extension trait for blocking on a future from a plain thread, without a runtime.
pub(crate) trait Join: Future {
    fn join(self) -> <Self as Future>::Output;
}

impl<F: Future> Join for F {
    fn join(self) -> <Self as Future>::Output {
        struct ThreadWaker(crossbeam_utils::sync::Unparker);

        impl ArcWake for ThreadWaker {
            fn wake_by_ref(arc_self: &Arc<Self>) {
                arc_self.0.unpark();
            }
        }

        let parker = Parker::new();
        let waker = futures_util::task::waker(Arc::new(ThreadWaker(parker.unparker().clone())));
        let mut context = Context::from_waker(&waker);

        let future = self;
        pin_mut!(future);

        loop {
            match future.as_mut().poll(&mut context) {
                Poll::Ready(output) => return output,
                Poll::Pending => parker.park(),
            }
        }
    }
}

// ===============================================================================================
// Bodies
// ===============================================================================================
/// A wrapper around `bytes::Bytes` used for request and answer bodies.
///
/// Bodies are raw byte sequences; a text body is never assumed. The `Display`
/// implementation falls back to base64 for content that is not valid UTF-8.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StubBytes(pub Bytes);

impl StubBytes {
    /// Cheaply clones the underlying `Bytes`.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Converts the bytes to a UTF-8 string, potentially lossy. Borrows when the
    /// content is valid UTF-8 and only copies when replacement characters are
    /// required.
    pub fn to_maybe_lossy_str(&self) -> Cow<str> {
        match std::str::from_utf8(&self.0) {
            Ok(valid_str) => Cow::Borrowed(valid_str),
            Err(_) => Cow::Owned(String::from_utf8_lossy(&self.0).to_string()),
        }
    }
}

impl From<Bytes> for StubBytes {
    fn from(value: Bytes) -> Self {
        StubBytes(value)
    }
}

impl From<Vec<u8>> for StubBytes {
    fn from(value: Vec<u8>) -> Self {
        StubBytes(Bytes::from(value))
    }
}

impl PartialEq for StubBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl AsRef<[u8]> for StubBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Display for StubBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(result) => write!(f, "{}", result),
            Err(_) => write!(f, "{}", BASE64.encode(&self.0)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Join, StubBytes};
    use bytes::Bytes;

    #[test]
    fn join_returns_future_output() {
        let result = async { 42 }.join();
        assert_eq!(result, 42);
    }

    #[test]
    fn displays_binary_content_as_base64() {
        let bytes = StubBytes(Bytes::from_static(&[0x00, 0xFF, 0x80]));
        assert_eq!(format!("{}", bytes), "AP+A");
    }

    #[test]
    fn lossy_str_borrows_valid_utf8() {
        let bytes = StubBytes(Bytes::from_static(b"hello"));
        assert_eq!(bytes.to_maybe_lossy_str(), "hello");
    }
}
