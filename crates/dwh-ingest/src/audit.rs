//! Per-delivery audit sink.
//!
//! # Design
//! - A sink is bound to one delivery at a time; writing or flushing while unbound is an
//!   explicit [`AuditError::NotBound`], never a silent drop.
//! - `flush` detaches the buffer and unbinds before persisting, so a failed upload still
//!   leaves the sink ready for the next delivery.
//! - Workers own one [`SharedAuditSink`] each; the telemetry layer reaches it through an
//!   [`AuditWriter`] scoped on the worker's task.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dwh_storage::{DeliveryFile, StorageProvider};
use dwh_telemetry::AuditTarget;

use crate::error::{AuditError, AuditResult};

struct BoundLog {
    name: String,
    buffer: Vec<u8>,
}

/// Buffers diagnostic output for the delivery it is bound to and persists it as
/// `<name>.log` in the outbox.
pub struct AuditSink {
    storage: Arc<dyn StorageProvider>,
    bound: Option<BoundLog>,
}

impl AuditSink {
    /// Unbound sink persisting through `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            storage,
            bound: None,
        }
    }

    /// Associate the sink with `file`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyBound`] while a previous delivery has not been flushed.
    pub fn bind(&mut self, file: &DeliveryFile) -> AuditResult<()> {
        if let Some(current) = &self.bound {
            return Err(AuditError::AlreadyBound {
                current: current.name.clone(),
                requested: file.name.clone(),
            });
        }
        self.bound = Some(BoundLog {
            name: file.name.clone(),
            buffer: Vec::new(),
        });
        Ok(())
    }

    /// Whether a delivery is bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Name of the bound delivery.
    #[must_use]
    pub fn bound_name(&self) -> Option<&str> {
        self.bound.as_ref().map(|log| log.name.as_str())
    }

    /// Append `bytes` to the bound delivery's log.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotBound`] when no delivery is bound.
    pub fn write(&mut self, bytes: &[u8]) -> AuditResult<usize> {
        let log = self
            .bound
            .as_mut()
            .ok_or(AuditError::NotBound { operation: "write" })?;
        log.buffer.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Persist the buffered log to the outbox and unbind; returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotBound`] when no delivery is bound and
    /// [`AuditError::Persist`] when the upload fails. The sink is unbound in both
    /// the success and the upload failure case.
    pub async fn flush(&mut self) -> AuditResult<usize> {
        let log = self.detach()?;
        persist(self.storage.as_ref(), log).await
    }

    fn detach(&mut self) -> AuditResult<BoundLog> {
        self.bound
            .take()
            .ok_or(AuditError::NotBound { operation: "flush" })
    }
}

impl Write for AuditSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Self::write(self, buf).map_err(|err| io::Error::new(io::ErrorKind::NotConnected, err))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn persist(storage: &dyn StorageProvider, log: BoundLog) -> AuditResult<usize> {
    let BoundLog { name, buffer } = log;
    storage
        .write_log(&name, &buffer)
        .await
        .map_err(|source| AuditError::Persist { name, source })?;
    Ok(buffer.len())
}

/// Cloneable handle to one worker's [`AuditSink`].
#[derive(Clone)]
pub struct SharedAuditSink {
    inner: Arc<Mutex<AuditSink>>,
}

impl SharedAuditSink {
    /// Unbound sink persisting through `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuditSink::new(storage))),
        }
    }

    /// See [`AuditSink::bind`].
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyBound`] while a previous delivery has not been flushed.
    pub fn bind(&self, file: &DeliveryFile) -> AuditResult<()> {
        self.lock().bind(file)
    }

    /// See [`AuditSink::is_bound`].
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.lock().is_bound()
    }

    /// See [`AuditSink::write`].
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotBound`] when no delivery is bound.
    pub fn write(&self, bytes: &[u8]) -> AuditResult<usize> {
        self.lock().write(bytes)
    }

    /// See [`AuditSink::flush`]. The lock is released before the upload starts.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotBound`] or [`AuditError::Persist`].
    pub async fn flush(&self) -> AuditResult<usize> {
        let (storage, log) = {
            let mut sink = self.lock();
            let log = sink.detach()?;
            (Arc::clone(&sink.storage), log)
        };
        persist(storage.as_ref(), log).await
    }

    /// Telemetry target feeding this sink.
    #[must_use]
    pub fn writer(&self) -> Arc<dyn AuditTarget> {
        Arc::new(AuditWriter { sink: self.clone() })
    }

    fn lock(&self) -> MutexGuard<'_, AuditSink> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`AuditTarget`] adapter handed to the telemetry task-local.
pub struct AuditWriter {
    sink: SharedAuditSink,
}

impl AuditTarget for AuditWriter {
    fn append(&self, line: &[u8]) {
        if self.sink.write(line).is_err() {
            // Unbound sink: keep the line visible on stderr.
            let _ = io::stderr().write_all(line);
        }
    }
}
