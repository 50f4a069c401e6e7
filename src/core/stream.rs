//! Streaming plumbing for drive-mirror
//!
//! `DownloadStream` wraps whatever the source hands back as a plain
//! `AsyncRead`. `StreamBridge` couples one download to one upload through a
//! bounded queue of chunks, so the destination reads at its own pace and a slow
//! upload suspends the download instead of buffering the whole file.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;

use crate::core::error::{Error, Result};

/// Byte stream of one file's content from the source
pub struct DownloadStream {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl DownloadStream {
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            inner: Box::new(reader),
        }
    }
}

impl AsyncRead for DownloadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Creates a DownloadStream from an HTTP response
pub fn create_http_stream(response: reqwest::Response) -> DownloadStream {
    let stream = tokio_util::io::StreamReader::new(
        response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
    );
    DownloadStream::from_reader(stream)
}

/// Progress callback: (completed files, submitted files)
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

enum Frame {
    Chunk(Bytes),
    End,
    Fail(io::Error),
}

/// Private, bounded hand-off between one download and one upload
pub struct StreamBridge;

impl StreamBridge {
    /// Create a bridge holding at most `capacity` chunks in flight
    pub fn new(capacity: usize) -> (BridgeWriter, BridgeReader) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            BridgeWriter { tx, sent: 0 },
            BridgeReader {
                rx,
                pending: Bytes::new(),
                finished: false,
            },
        )
    }
}

/// Producer half of a stream bridge
pub struct BridgeWriter {
    tx: mpsc::Sender<Frame>,
    sent: u64,
}

impl BridgeWriter {
    /// Queue one chunk; suspends while the bridge is full
    pub async fn send(&mut self, chunk: Bytes) -> Result<()> {
        let len = chunk.len() as u64;
        self.tx
            .send(Frame::Chunk(chunk))
            .await
            .map_err(|_| reader_gone())?;
        self.sent += len;
        Ok(())
    }

    /// Signal end of data; the reader sees a clean EOF after draining
    pub async fn close(self) -> Result<u64> {
        self.tx.send(Frame::End).await.map_err(|_| reader_gone())?;
        Ok(self.sent)
    }

    /// Deliver an error to the reader instead of EOF
    pub async fn fail(self, err: io::Error) {
        // the reader may already be gone, in which case nobody needs the error
        let _ = self.tx.send(Frame::Fail(err)).await;
    }

}

fn reader_gone() -> Error {
    Error::IoError(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "destination stopped reading from stream bridge",
    ))
}

/// Consumer half of a stream bridge
///
/// Yields EOF only after the writer called `close()`. A writer dropped without
/// closing surfaces as `UnexpectedEof`, so an interrupted download can never be
/// committed as a complete object.
pub struct BridgeReader {
    rx: mpsc::Receiver<Frame>,
    pending: Bytes,
    finished: bool,
}

impl AsyncRead for BridgeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if !self.pending.is_empty() {
                let n = std::cmp::min(buf.remaining(), self.pending.len());
                let chunk = self.pending.split_to(n);
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            }

            if self.finished {
                return Poll::Ready(Ok(()));
            }

            match ready!(self.rx.poll_recv(cx)) {
                Some(Frame::Chunk(bytes)) => self.pending = bytes,
                Some(Frame::End) => self.finished = true,
                Some(Frame::Fail(err)) => {
                    self.finished = true;
                    return Poll::Ready(Err(err));
                }
                None => {
                    self.finished = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream bridge writer dropped before close",
                    )));
                }
            }
        }
    }
}

/// Copy a download into a bridge until EOF, then close it
///
/// Read failures, and reads that produce nothing for `idle_timeout`, are
/// forwarded to the bridge reader and reported as transient.
pub async fn pump(
    mut source: DownloadStream,
    mut writer: BridgeWriter,
    buffer_size: usize,
    idle_timeout: Duration,
) -> Result<u64> {
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        let read = tokio::time::timeout(idle_timeout, source.read(&mut buffer)).await;
        let bytes_read = match read {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                let message = format!("Stream read error: {e}");
                writer.fail(io::Error::new(e.kind(), message.clone())).await;
                return Err(Error::Transient(message));
            }
            Err(_) => {
                let message = format!("Download stalled: no data for {}s", idle_timeout.as_secs());
                writer.fail(io::Error::new(io::ErrorKind::TimedOut, message.clone())).await;
                return Err(Error::Transient(message));
            }
        };

        if bytes_read == 0 {
            break;
        }

        writer.send(Bytes::copy_from_slice(&buffer[..bytes_read])).await?;
    }

    let sent = writer.close().await?;
    debug!("Bridge closed after {sent} bytes");
    Ok(sent)
}
