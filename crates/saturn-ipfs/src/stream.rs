//! Streaming response bodies

use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::TransportError;

/// Cap on the up-front allocation in [`ContentStream::into_bytes`]
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// Content body handed to the caller after a successful retrieval.
///
/// The stream is finite and can be read once. It stays bound to the
/// cancellation token of the fetch that produced it: once the token fires,
/// every further poll yields an error wrapping [`TransportError::Cancelled`]
/// (see [`is_cancellation`]). Dropping it releases the upstream connection.
pub struct ContentStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    content_length: Option<u64>,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Cancelled,
    Done,
}

fn cancellation_error() -> io::Error {
    io::Error::other(TransportError::Cancelled)
}

/// Whether an I/O error from a [`ContentStream`] (or a reader over it)
/// reports cancellation of the fetch
pub fn is_cancellation(err: &io::Error) -> bool {
    matches!(
        err.get_ref().and_then(|e| e.downcast_ref::<TransportError>()),
        Some(TransportError::Cancelled)
    )
}

impl ContentStream {
    pub(crate) fn new(response: reqwest::Response, cancel: CancellationToken) -> Self {
        let content_length = response.content_length();
        Self {
            body: response.bytes_stream().boxed(),
            cancelled: Box::pin(cancel.cancelled_owned()),
            content_length,
            state: State::Reading,
        }
    }

    /// Size announced by the upstream, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Adapt into an [`tokio::io::AsyncRead`]
    pub fn into_reader(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }

    /// Drain the whole body into memory
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        let capacity = self.content_length.unwrap_or(0).min(MAX_PREALLOC) as usize;
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for ContentStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.state {
            State::Done => return Poll::Ready(None),
            State::Cancelled => return Poll::Ready(Some(Err(cancellation_error()))),
            State::Reading => {}
        }

        if self.cancelled.as_mut().poll(cx).is_ready() {
            self.state = State::Cancelled;
            return Poll::Ready(Some(Err(cancellation_error())));
        }

        match self.body.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                self.state = State::Done;
                Poll::Ready(Some(Err(io::Error::other(e))))
            }
            Poll::Ready(None) => {
                self.state = State::Done;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("content_length", &self.content_length)
            .field("state", &self.state)
            .finish()
    }
}
