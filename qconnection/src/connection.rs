use std::{
    borrow::Cow,
    future::poll_fn,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use qbase::{
    config::Config,
    error::{AppError, Error},
    role::Role,
    sid::Dir,
    varint::VarInt,
};
use qrecovery::streams::{StreamError, StreamKey};
use tokio::sync::Notify;

use crate::{
    builder::ConnectionBuilder,
    conn::{ConnectionStats, RawConnection},
    error::ConnectionError,
    stream::{Reader, Stream, Writer},
};

/// The engine and the signal that wakes its driver.
///
/// Every handle mutating the engine notifies the driver, which then
/// flushes whatever the change produced.
#[derive(Debug)]
pub(crate) struct Shared {
    engine: Mutex<RawConnection>,
    pub(crate) notify: Notify,
}

impl Shared {
    pub(crate) fn new(engine: RawConnection) -> Self {
        Self {
            engine: Mutex::new(engine),
            notify: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RawConnection> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` on the engine, then let the driver know.
    pub(crate) fn with_engine<T>(&self, op: impl FnOnce(&mut RawConnection) -> T) -> T {
        let result = op(&mut self.lock());
        self.notify.notify_one();
        result
    }
}

/// Get the current time from tokio, so that paused time in tests applies.
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// A connection, driven by a task of its own.
///
/// Handles are cheap to clone; the connection lives on while its driver
/// runs, until it is closed or times out.
#[derive(Debug, Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Start building the client end of a connection.
    pub fn new_client(config: Config) -> ConnectionBuilder {
        ConnectionBuilder::new(Role::Client, config)
    }

    /// Start building the server end of a connection.
    pub fn new_server(config: Config) -> ConnectionBuilder {
        ConnectionBuilder::new(Role::Server, config)
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn role(&self) -> Role {
        self.shared.lock().role()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.lock().stats()
    }

    /// Whether the connection neither closed nor timed out yet.
    pub fn is_active(&self) -> bool {
        self.shared.lock().error().is_none()
    }

    fn open(&self, dir: Dir) -> Result<StreamKey, StreamError> {
        self.shared.with_engine(|engine| engine.streams_mut().open(dir))
    }

    async fn open_sync(&self, dir: Dir) -> Result<StreamKey, StreamError> {
        poll_fn(|cx| {
            self.shared
                .with_engine(|engine| engine.streams_mut().poll_open(cx, dir))
        })
        .await
    }

    async fn accept(&self, dir: Dir) -> Result<StreamKey, StreamError> {
        poll_fn(|cx| {
            self.shared
                .with_engine(|engine| engine.streams_mut().poll_accept(cx, dir))
        })
        .await
    }

    /// Open a bidirectional stream, failing with
    /// [`StreamError::TooManyStreams`] at the peer's limit.
    pub fn open_bi_stream(&self) -> Result<Stream, StreamError> {
        let key = self.open(Dir::Bi)?;
        Ok(Stream::new(&self.shared, key))
    }

    /// Open a unidirectional stream, failing with
    /// [`StreamError::TooManyStreams`] at the peer's limit.
    pub fn open_uni_stream(&self) -> Result<Writer, StreamError> {
        let key = self.open(Dir::Uni)?;
        Ok(Writer::new(self.shared.clone(), key))
    }

    /// Open a bidirectional stream, waiting for the peer to allow one more.
    pub async fn open_bi_stream_sync(&self) -> Result<Stream, StreamError> {
        let key = self.open_sync(Dir::Bi).await?;
        Ok(Stream::new(&self.shared, key))
    }

    /// Open a unidirectional stream, waiting for the peer to allow one more.
    pub async fn open_uni_stream_sync(&self) -> Result<Writer, StreamError> {
        let key = self.open_sync(Dir::Uni).await?;
        Ok(Writer::new(self.shared.clone(), key))
    }

    pub async fn accept_bi_stream(&self) -> Result<Stream, StreamError> {
        let key = self.accept(Dir::Bi).await?;
        Ok(Stream::new(&self.shared, key))
    }

    pub async fn accept_uni_stream(&self) -> Result<Reader, StreamError> {
        let key = self.accept(Dir::Uni).await?;
        Ok(Reader::new(self.shared.clone(), key))
    }

    /// Close the connection with an application error.
    ///
    /// Every stream fails, the peer learns `code` and `reason`.
    pub fn close_with_error(&self, code: VarInt, reason: impl Into<Cow<'static, str>>) {
        let error = Error::from(AppError::new(code, reason));
        self.shared.with_engine(|engine| engine.close(error, now()));
    }

    /// Close the connection without error.
    pub fn close(&self) {
        self.close_with_error(VarInt::from_u32(0), "");
    }

    /// Wait for the handshake to complete, streams can carry data from then on.
    pub async fn handshake_complete(&self) -> Result<(), ConnectionError> {
        poll_fn(|cx| self.shared.lock().poll_handshake(cx)).await
    }

    /// Wait for the connection to terminate, returning why it did.
    pub async fn closed(&self) -> ConnectionError {
        poll_fn(|cx| self.shared.lock().poll_closed(cx)).await
    }
}
