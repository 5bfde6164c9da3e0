//! Progress Emitter.
//!
//! Purely cosmetic percentage shown while an analysis request is
//! outstanding. It climbs from a floor toward a ceiling below 100 in small
//! random steps and never decides when the request is done.
//!
//! The ticker is a scoped resource: the pipeline holds it for exactly the
//! `Analyzing` phase and dropping it aborts the timer task, so no stray tick
//! can land after a reset.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use super::events::{EventSink, ScanEvent};
use crate::config::ProgressSettings;

/// Handle to a running ticker. Dropping it cancels the task.
pub struct ProgressTicker {
    generation: u64,
    percent: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// Start ticking for `generation`. Must be called inside a tokio runtime.
    pub fn start(settings: ProgressSettings, generation: u64, sink: Arc<dyn EventSink>) -> Self {
        let percent = Arc::new(AtomicU8::new(settings.floor));
        let shared = percent.clone();

        sink.emit(ScanEvent::Progress {
            generation,
            percent: settings.floor,
        });

        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut interval = tokio::time::interval(settings.tick);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                let current = shared.load(Ordering::Relaxed);
                let step = rng.gen_range(settings.min_step..=settings.max_step.max(settings.min_step));
                let next = next_percent(current, step, settings.ceiling);
                if next != current {
                    shared.store(next, Ordering::Relaxed);
                    sink.emit(ScanEvent::Progress {
                        generation,
                        percent: next,
                    });
                }
            }
        });

        Self {
            generation,
            percent,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::trace!(generation = self.generation, "Progress ticker stopped");
    }
}

/// Advance by `step`, saturating at `ceiling`. Never moves backwards.
pub fn next_percent(current: u8, step: u8, ceiling: u8) -> u8 {
    if current >= ceiling {
        return current;
    }
    current.saturating_add(step).min(ceiling)
}
