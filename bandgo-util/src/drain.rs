use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Reads a body to the end without keeping any of it.
    ///
    /// Resolves to the number of data bytes thrown away. Trailers are ignored.
    pub struct DiscardBodyFuture<B: Body> {
        #[pin]
        body: B,
        discarded: u64,
    }
}

impl<B> DiscardBodyFuture<B>
where
    B: Body,
{
    #[inline]
    #[must_use]
    pub fn new(body: B) -> Self {
        Self { body, discarded: 0 }
    }
}

impl<B> Future for DiscardBodyFuture<B>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Output = Result<u64, anyhow::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            let Some(next_res) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(*slf.discarded));
            };
            let frame = match next_res {
                Ok(frame) => frame,
                Err(e) => {
                    return Poll::Ready(Err(
                        anyhow::Error::new(e).context("Failed to poll next frame")
                    ));
                }
            };
            if let Ok(data) = frame.into_data() {
                *slf.discarded += data.remaining() as u64;
            }
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(*slf.discarded));
            }
        }
    }
}
