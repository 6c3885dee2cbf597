//! # Streaming I/O
//!
//! [`ReadStream`] and [`WriteStream`] turn one-shot native reads and writes
//! on an open handle into a flow-controlled [`Stream`] and [`Sink`].
//!
//! ```text
//!            poll_next                  chunk (non-empty)
//!   Idle ──────────────▶ Reading ────────────────────────▶ Idle
//!                           │ empty chunk / error
//!                           ▼
//!                    release handle ──▶ Done
//! ```
//!
//! At most one native operation is outstanding per stream. Polling again
//! while it is pending polls the same request; no second call is issued.
//! The next read is only requested when the consumer polls again, so a
//! consumer that stops polling pauses the producer.
//!
//! Opening never fails synchronously. A stream whose handle could not be
//! acquired reports the error from its first poll, after yielding once, so
//! the failure is never observed in the same turn as construction.
//!
//! The handle is released exactly once, on end-of-stream, on error, on
//! [`ReadStream::close`] / [`Sink::poll_close`], or on drop. Closing or
//! dropping a stream with a request outstanding does not abort it: the
//! request is driven to completion on the current tokio runtime (or a
//! helper thread when there is none) and the handle is released after it
//! settles.

use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::FusedStream;
use futures::{Future, Sink, Stream};

use crate::FsError;

/// Default chunk size: 4 MiB.
pub const DEFAULT_HIGH_WATER_MARK: usize = 4 * 1024 * 1024;

/// Stream tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamOptions {
    /// Most bytes requested from, or handed to, one native call.
    pub high_water_mark: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl StreamOptions {
    /// Options with the given chunk size (at least one byte).
    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        Self {
            high_water_mark: high_water_mark.max(1),
        }
    }
}

/// An open handle that can be read from.
pub trait InputStream: Send + Sync {
    /// Read up to `len` bytes. An empty result means end of file.
    fn read(self: Arc<Self>, len: usize) -> BoxFuture<'static, Result<Bytes, FsError>>;

    /// Release the handle. Calls after the first are no-ops.
    fn release(&self);
}

/// An open handle that can be written to.
pub trait OutputStream: Send + Sync {
    /// Write all of `chunk`, retrying partial writes until it is drained.
    fn write_all(self: Arc<Self>, chunk: Bytes) -> BoxFuture<'static, Result<(), FsError>>;

    /// Release the handle. Calls after the first are no-ops.
    fn release(&self);
}

/// Drive an abandoned request to completion, then run `release`.
fn release_when_settled<T: Send + 'static>(
    path: &Path,
    request: BoxFuture<'static, T>,
    release: impl FnOnce() + Send + 'static,
) {
    let settle = async move {
        let _ = request.await;
        release();
    };
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(settle);
        }
        Err(_) => {
            tracing::trace!(path = %path.display(), "no runtime, settling pending request on a helper thread");
            std::thread::spawn(move || futures::executor::block_on(settle));
        }
    }
}

enum ReadState {
    Failed { error: FsError, deferred: bool },
    Idle(Arc<dyn InputStream>),
    Reading(Arc<dyn InputStream>, BoxFuture<'static, Result<Bytes, FsError>>),
    Done,
}

/// A file read as a stream of chunks.
///
/// Created by [`create_read_stream`](crate::create_read_stream).
///
/// # Example
///
/// ```rust,no_run
/// use futures::TryStreamExt;
///
/// # async fn run() -> Result<(), rawfs::FsError> {
/// let chunks: Vec<_> = rawfs::create_read_stream("/etc/hostname").try_collect().await?;
/// let total: usize = chunks.iter().map(|c| c.len()).sum();
/// println!("{total} bytes");
/// # Ok(())
/// # }
/// ```
pub struct ReadStream {
    path: PathBuf,
    chunk_size: usize,
    state: ReadState,
}

impl ReadStream {
    /// Stream the contents of an open input handle.
    pub fn new(path: impl Into<PathBuf>, input: Arc<dyn InputStream>, options: &StreamOptions) -> Self {
        Self {
            path: path.into(),
            chunk_size: options.high_water_mark.max(1),
            state: ReadState::Idle(input),
        }
    }

    /// A stream that reports `error`, the reason its handle could not be
    /// acquired, on its first poll.
    pub fn failed(path: impl Into<PathBuf>, error: FsError) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_HIGH_WATER_MARK,
            state: ReadState::Failed {
                error,
                deferred: false,
            },
        }
    }

    /// Path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` while a native read is outstanding.
    pub fn is_reading(&self) -> bool {
        matches!(self.state, ReadState::Reading(..))
    }

    /// Stop reading and release the handle.
    ///
    /// A pending read is left to finish in the background and the handle is
    /// released once it settles. Further polls yield `None`.
    pub fn close(&mut self) {
        match mem::replace(&mut self.state, ReadState::Done) {
            ReadState::Idle(input) => input.release(),
            ReadState::Reading(input, request) => release_when_settled(&self.path, request, move || input.release()),
            ReadState::Failed { .. } | ReadState::Done => {}
        }
    }
}

impl Stream for ReadStream {
    type Item = Result<Bytes, FsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match mem::replace(&mut this.state, ReadState::Done) {
                ReadState::Failed {
                    error,
                    deferred: false,
                } => {
                    this.state = ReadState::Failed {
                        error,
                        deferred: true,
                    };
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                ReadState::Failed { error, .. } => {
                    tracing::debug!(path = %this.path.display(), %error, "read stream failed to open");
                    return Poll::Ready(Some(Err(error)));
                }
                ReadState::Idle(input) => {
                    let request = Arc::clone(&input).read(this.chunk_size);
                    this.state = ReadState::Reading(input, request);
                }
                ReadState::Reading(input, mut request) => match request.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.state = ReadState::Reading(input, request);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(chunk)) if chunk.is_empty() => {
                        input.release();
                        return Poll::Ready(None);
                    }
                    Poll::Ready(Ok(chunk)) => {
                        this.state = ReadState::Idle(input);
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    Poll::Ready(Err(error)) => {
                        input.release();
                        return Poll::Ready(Some(Err(error)));
                    }
                },
                ReadState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl FusedStream for ReadStream {
    fn is_terminated(&self) -> bool {
        matches!(self.state, ReadState::Done)
    }
}

impl Drop for ReadStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            ReadState::Failed { .. } => "failed",
            ReadState::Idle(_) => "idle",
            ReadState::Reading(..) => "reading",
            ReadState::Done => "done",
        };
        f.debug_struct("ReadStream")
            .field("path", &self.path)
            .field("chunk_size", &self.chunk_size)
            .field("state", &state)
            .finish()
    }
}

enum WriteState {
    Failed { error: FsError, deferred: bool },
    Idle(Arc<dyn OutputStream>),
    Writing {
        output: Arc<dyn OutputStream>,
        request: BoxFuture<'static, Result<(), FsError>>,
        rest: Bytes,
    },
    Closed,
}

/// A file written as a sink of chunks.
///
/// Each chunk handed to [`Sink::start_send`] is written completely, in
/// pieces of at most the high water mark, before the sink is ready again.
/// Closing the sink releases the handle.
///
/// Created by [`create_write_stream`](crate::create_write_stream).
pub struct WriteStream {
    path: PathBuf,
    chunk_size: usize,
    state: WriteState,
}

impl WriteStream {
    /// Write into an open output handle.
    pub fn new(path: impl Into<PathBuf>, output: Arc<dyn OutputStream>, options: &StreamOptions) -> Self {
        Self {
            path: path.into(),
            chunk_size: options.high_water_mark.max(1),
            state: WriteState::Idle(output),
        }
    }

    /// A sink that reports `error` from its first readiness check.
    pub fn failed(path: impl Into<PathBuf>, error: FsError) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_HIGH_WATER_MARK,
            state: WriteState::Failed {
                error,
                deferred: false,
            },
        }
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` while a native write is outstanding.
    pub fn is_writing(&self) -> bool {
        matches!(self.state, WriteState::Writing { .. })
    }

    fn issue(&mut self, output: Arc<dyn OutputStream>, mut rest: Bytes) {
        let piece = rest.split_to(rest.len().min(self.chunk_size));
        let request = Arc::clone(&output).write_all(piece);
        self.state = WriteState::Writing {
            output,
            request,
            rest,
        };
    }

    /// Drive the outstanding write, if any, to completion.
    fn poll_settled(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), FsError>> {
        loop {
            match mem::replace(&mut self.state, WriteState::Closed) {
                WriteState::Failed {
                    error,
                    deferred: false,
                } => {
                    self.state = WriteState::Failed {
                        error,
                        deferred: true,
                    };
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                WriteState::Failed { error, .. } => {
                    tracing::debug!(path = %self.path.display(), %error, "write stream failed to open");
                    return Poll::Ready(Err(error));
                }
                WriteState::Idle(output) => {
                    self.state = WriteState::Idle(output);
                    return Poll::Ready(Ok(()));
                }
                WriteState::Writing {
                    output,
                    mut request,
                    rest,
                } => match request.as_mut().poll(cx) {
                    Poll::Pending => {
                        self.state = WriteState::Writing {
                            output,
                            request,
                            rest,
                        };
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(())) if rest.is_empty() => self.state = WriteState::Idle(output),
                    Poll::Ready(Ok(())) => self.issue(output, rest),
                    Poll::Ready(Err(error)) => {
                        output.release();
                        return Poll::Ready(Err(error));
                    }
                },
                WriteState::Closed => return Poll::Ready(Err(FsError::StreamClosed)),
            }
        }
    }
}

impl Sink<Bytes> for WriteStream {
    type Error = FsError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), FsError>> {
        self.poll_settled(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), FsError> {
        match mem::replace(&mut self.state, WriteState::Closed) {
            WriteState::Idle(output) if item.is_empty() => {
                self.state = WriteState::Idle(output);
                Ok(())
            }
            WriteState::Idle(output) => {
                self.issue(output, item);
                Ok(())
            }
            busy @ WriteState::Writing { .. } => {
                self.state = busy;
                Err(FsError::StreamBusy)
            }
            WriteState::Failed { error, .. } => Err(error),
            WriteState::Closed => Err(FsError::StreamClosed),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), FsError>> {
        self.poll_settled(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), FsError>> {
        if matches!(self.state, WriteState::Closed) {
            return Poll::Ready(Ok(()));
        }
        match self.poll_settled(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(error)) => Poll::Ready(Err(error)),
            Poll::Ready(Ok(())) => {
                if let WriteState::Idle(output) = mem::replace(&mut self.state, WriteState::Closed) {
                    output.release();
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}

impl Drop for WriteStream {
    fn drop(&mut self) {
        match mem::replace(&mut self.state, WriteState::Closed) {
            WriteState::Idle(output) => output.release(),
            WriteState::Writing { output, request, .. } => {
                release_when_settled(&self.path, request, move || output.release());
            }
            WriteState::Failed { .. } | WriteState::Closed => {}
        }
    }
}

impl fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            WriteState::Failed { .. } => "failed",
            WriteState::Idle(_) => "idle",
            WriteState::Writing { .. } => "writing",
            WriteState::Closed => "closed",
        };
        f.debug_struct("WriteStream")
            .field("path", &self.path)
            .field("chunk_size", &self.chunk_size)
            .field("state", &state)
            .finish()
    }
}
