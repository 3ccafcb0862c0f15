//! Per-delivery audit capture.
//!
//! # Design
//! - A plain-text fmt layer renders every event once and hands the line to whichever
//!   [`AuditTarget`] is scoped on the current task.
//! - Targets are task-local, so concurrent workers each capture only their own delivery.
//! - Events emitted outside a scope are discarded by the audit layer; the console layer
//!   still sees them.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

tokio::task_local! {
    static ACTIVE_AUDIT: Arc<dyn AuditTarget>;
}

/// Destination for audit lines produced while a delivery is processed.
pub trait AuditTarget: Send + Sync {
    /// Append one rendered log line (including its trailing newline).
    fn append(&self, line: &[u8]);
}

/// Run `fut` with `target` receiving every audit line emitted on this task.
pub async fn with_audit_target<Fut, T>(target: Arc<dyn AuditTarget>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    ACTIVE_AUDIT.scope(target, fut).await
}

/// Build the fmt layer that feeds scoped audit targets.
///
/// Lines are rendered without ANSI colouring and include level, timestamp and span
/// context so the persisted log reads the same as the console in pretty mode.
pub fn audit_layer<S>() -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(AuditMakeWriter)
        .with_filter(LevelFilter::INFO)
}

/// `tracing_subscriber` writer factory that routes output to the scoped audit target.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditMakeWriter;

impl<'a> MakeWriter<'a> for AuditMakeWriter {
    type Writer = AuditLineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        AuditLineWriter::default()
    }
}

/// Buffers one formatted event and forwards it on flush or drop.
#[derive(Debug, Default)]
pub struct AuditLineWriter {
    buffer: Vec<u8>,
}

impl AuditLineWriter {
    fn forward(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if !self.buffer.ends_with(b"\n") {
            self.buffer.push(b'\n');
        }
        let line = std::mem::take(&mut self.buffer);
        let _ = ACTIVE_AUDIT.try_with(|target| target.append(&line));
    }
}

impl Write for AuditLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.forward();
        Ok(())
    }
}

impl Drop for AuditLineWriter {
    fn drop(&mut self) {
        self.forward();
    }
}
