//! Fixed-rate streaming pipeline
//!
//! Drives capture -> convert -> deliver -> sleep on a single thread.
//! Each iteration is paced against a monotonic clock with no drift
//! compensation: an overrun shortens only that iteration's sleep, so a
//! persistently slow stage lowers the effective rate instead of
//! bursting frames later.

use crate::capture::FrameSource;
use crate::convert::{bgra_to_i420, i420_size};
use crate::sink::{FrameOutput, FramePayload, SinkKind};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Delay before retrying after a recoverable capture failure.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Cooperative cancellation flag, checked once per loop iteration.
/// Never pre-empts an in-flight capture or write.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals reported when the loop stops.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Frames handed to the sink successfully.
    pub frames_delivered: u64,
}

/// Sleep needed to finish out one frame interval; zero once the
/// interval has already elapsed.
pub fn remaining_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// The capture/convert/deliver pacing loop.
pub struct Pipeline {
    fps: u32,
    interval: Duration,
}

impl Pipeline {
    /// `fps` must be nonzero; config validation enforces 1..=60 before
    /// the binary reaches this point.
    ///
    /// # Panics
    ///
    /// Panics if `fps` is zero.
    pub fn new(fps: u32) -> Self {
        assert!(fps > 0, "fps must be nonzero");
        Self { fps, interval: Duration::from_secs(1) / fps }
    }

    /// Target time budget per frame.
    pub fn frame_interval(&self) -> Duration {
        self.interval
    }

    /// Run until cancelled or a fatal capture/sink condition. Always
    /// returns the totals; failure reasons have been logged by then.
    pub fn run<C, S>(&self, source: &mut C, sink: &mut S, cancel: &CancelToken) -> PipelineStats
    where
        C: FrameSource,
        S: FrameOutput,
    {
        let (width, height) = source.dimensions();
        let mut yuv = vec![0u8; i420_size(width, height)];
        let mut stats = PipelineStats::default();

        while !cancel.is_cancelled() {
            let start = Instant::now();

            let frame = match source.grab() {
                Ok(frame) => frame,
                Err(e) if !e.is_fatal() => {
                    warn!("capture failed, retrying: {}", e);
                    thread::sleep(RETRY_DELAY);
                    continue;
                }
                Err(e) => {
                    error!("{}", e);
                    break;
                }
            };

            let delivered = match sink.kind() {
                SinkKind::PlanarI420 => {
                    bgra_to_i420(frame.data, frame.stride, width, height, &mut yuv);
                    sink.deliver(FramePayload::I420(&yuv))
                }
                SinkKind::PackedBgra => sink.deliver(FramePayload::Bgra(&frame)),
            };
            if let Err(e) = delivered {
                if e.is_disconnect() {
                    info!("stopping: {}", e);
                } else {
                    error!("delivery failed: {}", e);
                }
                break;
            }

            stats.frames_delivered += 1;
            if stats.frames_delivered % u64::from(self.fps) == 0 {
                debug!("{} frames sent", stats.frames_delivered);
            }

            let sleep = remaining_sleep(self.interval, start.elapsed());
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }

        stats
    }
}
