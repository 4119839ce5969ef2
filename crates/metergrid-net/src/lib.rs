//! metergrid-net — instrumented byte streams.
//!
//! Wraps any `AsyncRead + AsyncWrite` transport and reports
//! per-connection metrics to a [`Recorder`]: open/close counters,
//! per-operation byte-size histograms, and an error counter that
//! skips the noise of ordinary connection teardown.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use metergrid_core::{Observation, Recorder};

/// Byte-size histogram bounds: 100 B, 1 KB, 10 KB, 100 KB, +Inf.
pub const BYTE_BUCKETS: [f64; 5] = [1e2, 1e3, 1e4, 1e5, f64::INFINITY];

/// A transport wrapper that produces connection metrics.
///
/// Every successful read and write observes its byte count on
/// `conn.read.bytes` / `conn.write.bytes`; construction bumps
/// `conn.open.count` and shutdown (or drop) bumps `conn.close.count`
/// exactly once. All series carry a `protocol` label.
#[derive(Debug)]
pub struct MeteredStream<S, R: Recorder> {
    inner: S,
    recorder: R,
    protocol: String,
    closed: bool,
}

impl<S, R: Recorder> MeteredStream<S, R> {
    pub fn new(inner: S, recorder: R, protocol: impl Into<String>) -> Self {
        let stream = MeteredStream {
            inner,
            recorder,
            protocol: protocol.into(),
            closed: false,
        };
        stream.incr("conn.open.count");
        stream
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    fn incr(&self, name: &'static str) {
        self.recorder.record(
            Observation::counter(name, 1.0).with_tag("protocol", self.protocol.clone()),
        );
    }

    fn observe_bytes(&self, name: &'static str, n: usize) {
        self.recorder.record(
            Observation::histogram(name, n as f64, BYTE_BUCKETS.to_vec())
                .with_tag("protocol", self.protocol.clone()),
        );
    }

    /// Reports an I/O failure. Errors that are part of ordinary
    /// connection teardown, and temporary conditions the caller will
    /// retry, are suppressed.
    fn record_error(&self, operation: &'static str, error: &io::Error) {
        if is_expected_close(error.kind()) || is_temporary(error.kind()) {
            return;
        }
        self.recorder.record(
            Observation::counter("conn.error.count", 1.0)
                .with_tag("protocol", self.protocol.clone())
                .with_tag("operation", operation),
        );
    }

    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.incr("conn.close.count");
        }
    }
}

fn is_expected_close(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

fn is_temporary(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

impl<S, R> AsyncRead for MeteredStream<S, R>
where
    S: AsyncRead + Unpin,
    R: Recorder + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                self.observe_bytes("conn.read.bytes", n);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(error)) => {
                self.record_error("read", &error);
                Poll::Ready(Err(error))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S, R> AsyncWrite for MeteredStream<S, R>
where
    S: AsyncWrite + Unpin,
    R: Recorder + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match Pin::new(&mut self.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                self.observe_bytes("conn.write.bytes", n);
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(error)) => {
                self.record_error("write", &error);
                Poll::Ready(Err(error))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::new(&mut self.inner).poll_flush(cx) {
            Poll::Ready(Err(error)) => {
                self.record_error("flush", &error);
                Poll::Ready(Err(error))
            }
            other => other,
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::new(&mut self.inner).poll_shutdown(cx) {
            Poll::Ready(Ok(())) => {
                self.mark_closed();
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(error)) => {
                self.record_error("close", &error);
                self.mark_closed();
                Poll::Ready(Err(error))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S, R: Recorder> Drop for MeteredStream<S, R> {
    fn drop(&mut self) {
        // Streams dropped without an explicit shutdown still count as
        // closed.
        self.mark_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[derive(Default)]
    struct Capture(Mutex<Vec<Observation>>);

    impl Recorder for Capture {
        fn record(&self, observation: Observation) {
            self.0.lock().unwrap().push(observation);
        }
    }

    impl Capture {
        fn names(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|o| o.name.clone()).collect()
        }

        fn count(&self, name: &str) -> usize {
            self.0.lock().unwrap().iter().filter(|o| o.name == name).count()
        }

        fn observed(&self, name: &str) -> Vec<f64> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|o| o.name == name)
                .map(|o| o.value)
                .collect()
        }
    }

    #[tokio::test]
    async fn reads_and_writes_feed_histograms() {
        let capture = Arc::new(Capture::default());
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = MeteredStream::new(client, capture.clone(), "duplex");

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        server.write_all(b"pong!").await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 5);

        assert_eq!(capture.count("conn.open.count"), 1);
        assert_eq!(capture.observed("conn.write.bytes"), vec![4.0]);
        assert_eq!(capture.observed("conn.read.bytes"), vec![5.0]);

        // Histogram observations carry the shared byte bounds and the
        // protocol label.
        let obs = capture.0.lock().unwrap();
        let read = obs.iter().find(|o| o.name == "conn.read.bytes").unwrap();
        assert_eq!(read.buckets, BYTE_BUCKETS.to_vec());
        assert!(read
            .tags
            .iter()
            .any(|t| t.name == "protocol" && t.value == "duplex"));
    }

    #[tokio::test]
    async fn shutdown_counts_close_once() {
        let capture = Arc::new(Capture::default());
        let (client, _server) = tokio::io::duplex(64);
        let mut stream = MeteredStream::new(client, capture.clone(), "duplex");

        stream.shutdown().await.unwrap();
        drop(stream);
        assert_eq!(capture.count("conn.close.count"), 1);
    }

    #[tokio::test]
    async fn expected_close_errors_are_suppressed() {
        let capture = Arc::new(Capture::default());
        let broken = FailingWriter(io::ErrorKind::BrokenPipe);
        let mut stream = MeteredStream::new(broken, capture.clone(), "tcp");

        assert!(stream.write_all(b"x").await.is_err());
        assert_eq!(capture.count("conn.error.count"), 0);
    }

    #[tokio::test]
    async fn serious_errors_are_counted_with_operation() {
        let capture = Arc::new(Capture::default());
        let denied = FailingWriter(io::ErrorKind::PermissionDenied);
        let mut stream = MeteredStream::new(denied, capture.clone(), "tcp");

        assert!(stream.write_all(b"x").await.is_err());
        assert_eq!(capture.count("conn.error.count"), 1);

        let obs = capture.0.lock().unwrap();
        let err = obs.iter().find(|o| o.name == "conn.error.count").unwrap();
        assert!(err
            .tags
            .iter()
            .any(|t| t.name == "operation" && t.value == "write"));
        drop(obs);
        assert_eq!(capture.names().first().map(String::as_str), Some("conn.open.count"));
    }

    struct FailingWriter(io::ErrorKind);

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(self.0, "stub failure")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
