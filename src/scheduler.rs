//! Bounded-rate polling loop and shutdown signalling.

use crate::Result;
use log::{debug, info, warn};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Calls a tick function at most once per `interval`, re-arming after each tick.
///
/// A tick that overruns the interval is followed immediately by the next one;
/// missed ticks are not replayed.
#[derive(Debug, Clone, Copy)]
pub struct PacedLoop {
    interval: Duration,
}

impl PacedLoop {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `tick` until it breaks, fails, or `shutdown` is raised.
    ///
    /// Returns the number of ticks executed.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `tick`.
    pub fn run<F>(&self, shutdown: &AtomicBool, mut tick: F) -> Result<u64>
    where
        F: FnMut() -> Result<ControlFlow<()>>,
    {
        let mut ticks = 0;
        while !shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();
            let flow = tick()?;
            ticks += 1;

            if flow.is_break() {
                debug!("Loop stopped by tick after {ticks} ticks");
                return Ok(ticks);
            }

            if let Some(remaining) = self.interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        info!("Shutdown requested after {ticks} ticks");
        Ok(ticks)
    }
}

/// Raise `shutdown` on Ctrl-C or SIGTERM.
///
/// The signals are awaited on a dedicated thread with its own small runtime,
/// so the polling loops stay synchronous.
///
/// # Errors
///
/// Returns an error if the watcher thread or its runtime cannot be created.
pub fn install_interrupt_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            runtime.block_on(async {
                let ctrl_c = tokio::signal::ctrl_c();

                #[cfg(unix)]
                let sigterm = async {
                    use tokio::signal::unix::{signal, SignalKind};
                    match signal(SignalKind::terminate()) {
                        Ok(mut sigterm) => {
                            sigterm.recv().await;
                        }
                        Err(e) => {
                            warn!("Failed to install SIGTERM handler: {e}");
                            std::future::pending::<()>().await;
                        }
                    }
                };

                #[cfg(not(unix))]
                let sigterm = std::future::pending::<()>();

                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm => {},
                }
            });

            info!("Interrupt received, shutting down");
            shutdown.store(true, Ordering::Relaxed);
        })?;

    Ok(())
}
