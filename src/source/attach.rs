//! Producer loop and attach lifecycle
//!
//! One [`Producer`] is created fresh per attach and owns the dedicated
//! thread driving the read → unpack → fill loop. Cancellation is
//! cooperative: the stop flag is checked between reads and inside every
//! backoff sleep, and [`Producer::stop_and_join`] blocks until the thread
//! has fully exited, so no unpack call is in flight once it returns.
//!
//! Loop behavior per source kind:
//!
//! - **File**: `Ok(None)` means current end-of-data. With `stop_at_end` the
//!   run completes cleanly; without it the loop backs off and re-reads,
//!   tolerating a live logger appending to the same file. Read errors
//!   follow the same split: clean completion with `stop_at_end`, transient
//!   retry without.
//! - **Online**: `Ok(None)` is backpressure — poll, don't spin. A read
//!   error is unrecoverable and returns the machine to idle.
//! - **List**: each manifest entry runs as a file source with
//!   `stop_at_end`; unopenable entries are skipped with a warning.

use crate::config::EngineConfig;
use crate::event::EventSet;
use crate::pipeline::{MonitorHandle, SourceEvent};
use crate::source::{DataSource, FileSource};
use crate::types::SourceKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared context of one producer thread
#[derive(Clone)]
pub(crate) struct LoopCtx {
    pub events: Arc<EventSet>,
    pub monitor: MonitorHandle,
    pub config: EngineConfig,
    pub stop: Arc<AtomicBool>,
}

impl LoopCtx {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sleep in cancellation-check slices
    fn sleep(&self, total: Duration) {
        let slice = self.config.stop_poll();
        let mut remaining = total;
        while !self.stopped() && !remaining.is_zero() {
            let nap = remaining.min(slice);
            std::thread::sleep(nap);
            remaining = remaining.saturating_sub(nap);
        }
    }
}

/// Handle to a running (or finished) producer thread
pub(crate) struct Producer {
    kind: SourceKind,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Producer {
    pub(crate) fn kind(&self) -> SourceKind {
        self.kind
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop to stop and block until the thread has exited
    pub(crate) fn stop_and_join(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            tracing::error!("Producer thread panicked");
        }
    }

    /// Spawn a file producer over an already opened source
    pub(crate) fn spawn_file(source: FileSource, stop_at_end: bool, ctx: LoopCtx) -> Self {
        let stop = ctx.stop.clone();
        let handle = std::thread::spawn(move || {
            let path = PathBuf::from(source.path());
            ctx.monitor.emit(SourceEvent::Attached {
                kind: SourceKind::File,
            });
            tracing::info!("Attached to file {}", path.display());
            let mut source = source;
            if run_file(&mut source, stop_at_end, &ctx) == RunEnd::Completed {
                tracing::info!("Done reading {}", path.display());
                ctx.monitor.emit(SourceEvent::Completed { path });
            } else {
                tracing::info!("Connection aborted");
            }
            source.close();
        });
        Self {
            kind: SourceKind::File,
            stop,
            handle,
        }
    }

    /// Spawn an online producer over an already negotiated connection
    pub(crate) fn spawn_online(mut source: Box<dyn DataSource>, ctx: LoopCtx) -> Self {
        let stop = ctx.stop.clone();
        let handle = std::thread::spawn(move || {
            ctx.monitor.emit(SourceEvent::Attached {
                kind: SourceKind::Online,
            });
            tracing::info!("Attached to online source {}", source.describe());
            loop {
                if ctx.stopped() {
                    tracing::info!("Connection aborted");
                    break;
                }
                match source.read_next() {
                    Ok(Some(buffer)) => ctx.events.dispatch(&buffer, &ctx.monitor),
                    Ok(None) => ctx.sleep(ctx.config.online_poll()),
                    Err(e) => {
                        tracing::error!("Unrecoverable read error on online source: {}", e);
                        ctx.monitor.emit(SourceEvent::ReadError {
                            detail: e.to_string(),
                        });
                        break;
                    }
                }
            }
            source.close();
        });
        Self {
            kind: SourceKind::Online,
            stop,
            handle,
        }
    }

    /// Spawn a list producer over manifest entries
    pub(crate) fn spawn_list(paths: Vec<PathBuf>, ctx: LoopCtx) -> Self {
        let stop = ctx.stop.clone();
        let handle = std::thread::spawn(move || {
            ctx.monitor.emit(SourceEvent::Attached {
                kind: SourceKind::List,
            });
            for path in paths {
                if ctx.stopped() {
                    tracing::info!("Connection aborted");
                    break;
                }
                let mut source = match FileSource::open(&path) {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", path.display(), e);
                        ctx.monitor.emit(SourceEvent::SkippedFile { path });
                        continue;
                    }
                };
                tracing::info!("Attached to file {}", path.display());
                let end = run_file(&mut source, true, &ctx);
                source.close();
                if end == RunEnd::Completed {
                    tracing::info!("Done reading {}", path.display());
                    ctx.monitor.emit(SourceEvent::Completed { path });
                } else {
                    tracing::info!("Connection aborted");
                    break;
                }
            }
        });
        Self {
            kind: SourceKind::List,
            stop,
            handle,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RunEnd {
    Completed,
    Aborted,
}

fn run_file(source: &mut FileSource, stop_at_end: bool, ctx: &LoopCtx) -> RunEnd {
    loop {
        if ctx.stopped() {
            return RunEnd::Aborted;
        }
        match source.read_next() {
            Ok(Some(buffer)) => ctx.events.dispatch(&buffer, &ctx.monitor),
            Ok(None) if stop_at_end => return RunEnd::Completed,
            Ok(None) => ctx.sleep(ctx.config.file_retry()),
            Err(e) if stop_at_end => {
                tracing::warn!("Read error at end of {}: {}", source.describe(), e);
                return RunEnd::Completed;
            }
            Err(e) => {
                tracing::warn!("Transient read error on {}: {}", source.describe(), e);
                ctx.monitor.emit(SourceEvent::ReadError {
                    detail: e.to_string(),
                });
                ctx.sleep(ctx.config.file_retry());
            }
        }
    }
}
