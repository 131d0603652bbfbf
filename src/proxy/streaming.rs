//! Response body relay.
//!
//! # Responsibilities
//! - Copy the destination's response body back to the client
//! - Streaming mode: hand every frame over as it arrives, no buffering
//! - Buffered mode: coalesce into a bounded buffer, flush the remainder once
//! - Absorb the transport errors that shutdown races produce
//!
//! # Design Decisions
//! - Mid-body errors (peer reset, client abort, cancellation) end the relay
//!   cleanly instead of failing it: they are racing artifacts of a normal
//!   shutdown, not data-integrity problems
//! - Buffered mode emits whatever it has when the upstream stalls; the
//!   buffer bounds chunk size, it must not add latency
//! - Trailer frames are dropped; dev-server traffic does not carry them

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame};

/// How the relay moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Frame-for-frame passthrough, no intermediate buffer.
    Streaming,
    /// Coalesce into chunks of at most `buffer_size` bytes.
    Buffered { buffer_size: usize },
}

/// Body adapter that relays an upstream response body to the client
/// according to a [`CopyMode`].
pub struct RelayBody<B> {
    upstream: Option<B>,
    mode: CopyMode,
    buffer: BytesMut,
}

impl<B> RelayBody<B> {
    pub fn new(upstream: B, mode: CopyMode) -> Self {
        let buffer = match mode {
            CopyMode::Streaming => BytesMut::new(),
            CopyMode::Buffered { buffer_size } => BytesMut::with_capacity(buffer_size),
        };
        Self {
            upstream: Some(upstream),
            mode,
            buffer,
        }
    }

    fn drain_buffer(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }
}

impl<B> Body for RelayBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();

        loop {
            let Some(upstream) = this.upstream.as_mut() else {
                // Upstream finished; the final flush of the buffered copy.
                return Poll::Ready(this.drain_buffer().map(|chunk| Ok(Frame::data(chunk))));
            };

            match Pin::new(upstream).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    match this.mode {
                        CopyMode::Streaming => {
                            return Poll::Ready(Some(Ok(Frame::data(data))));
                        }
                        CopyMode::Buffered { buffer_size } => {
                            this.buffer.extend_from_slice(&data);
                            if this.buffer.len() >= buffer_size {
                                let chunk = this.buffer.split_to(buffer_size).freeze();
                                return Poll::Ready(Some(Ok(Frame::data(chunk))));
                            }
                        }
                    }
                }
                Poll::Ready(Some(Err(error))) => {
                    // Shutdown/disconnect races surface here mid-copy.
                    tracing::debug!(error = %error, "Upstream body ended early");
                    this.upstream = None;
                }
                Poll::Ready(None) => {
                    this.upstream = None;
                }
                Poll::Pending => {
                    if let Some(chunk) = this.drain_buffer() {
                        return Poll::Ready(Some(Ok(Frame::data(chunk))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.upstream.is_none() && self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted upstream body for driving the relay by hand.
    struct StubBody {
        frames: VecDeque<Result<Bytes, std::io::Error>>,
    }

    impl StubBody {
        fn new(frames: Vec<Result<&'static str, std::io::Error>>) -> Self {
            Self {
                frames: frames
                    .into_iter()
                    .map(|frame| frame.map(|data| Bytes::from_static(data.as_bytes())))
                    .collect(),
            }
        }
    }

    impl Body for StubBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, std::io::Error>>> {
            Poll::Ready(
                self.get_mut()
                    .frames
                    .pop_front()
                    .map(|frame| frame.map(Frame::data)),
            )
        }
    }

    async fn collect_chunks<B>(mut relay: RelayBody<B>) -> Vec<Bytes>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: std::fmt::Display,
    {
        let mut chunks = Vec::new();
        while let Some(frame) =
            std::future::poll_fn(|cx| Pin::new(&mut relay).poll_frame(cx)).await
        {
            let frame = frame.unwrap();
            if let Ok(data) = frame.into_data() {
                chunks.push(data);
            }
        }
        chunks
    }

    fn reset_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")
    }

    #[tokio::test]
    async fn streaming_mode_passes_frames_through_unchanged() {
        let upstream = StubBody::new(vec![Ok("data: one\n\n"), Ok("data: two\n\n")]);
        let chunks = collect_chunks(RelayBody::new(upstream, CopyMode::Streaming)).await;
        assert_eq!(chunks, vec!["data: one\n\n", "data: two\n\n"]);
    }

    #[tokio::test]
    async fn buffered_mode_bounds_chunks_and_flushes_remainder() {
        let upstream = StubBody::new(vec![Ok("he"), Ok("llo"), Ok(" wor"), Ok("ld")]);
        let chunks =
            collect_chunks(RelayBody::new(upstream, CopyMode::Buffered { buffer_size: 4 })).await;
        assert_eq!(chunks, vec!["hell", "o wo", "rld"]);
    }

    #[tokio::test]
    async fn upstream_error_ends_the_relay_quietly() {
        let upstream = StubBody::new(vec![Ok("partial"), Err(reset_error())]);
        let chunks = collect_chunks(RelayBody::new(upstream, CopyMode::Streaming)).await;
        assert_eq!(chunks, vec!["partial"]);
    }

    #[tokio::test]
    async fn buffered_copy_flushes_before_swallowing_an_error() {
        let upstream = StubBody::new(vec![Ok("ab"), Err(reset_error())]);
        let chunks =
            collect_chunks(RelayBody::new(upstream, CopyMode::Buffered { buffer_size: 16 })).await;
        assert_eq!(chunks, vec!["ab"]);
    }

    #[tokio::test]
    async fn empty_upstream_yields_no_chunks() {
        let upstream = StubBody::new(vec![]);
        let chunks =
            collect_chunks(RelayBody::new(upstream, CopyMode::Buffered { buffer_size: 4 })).await;
        assert!(chunks.is_empty());
    }
}
