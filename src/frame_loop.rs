//! Owned per-frame scheduler.
//!
//! The loop pulls frame timestamps from a [`FrameSource`] and calls the
//! per-frame callback until the source runs dry, the callback fails, or a
//! [`StopHandle`] is triggered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::clock::{Clock, ManualClock};

/// Cancels a running loop from anywhere, including from inside its own callback.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Frame number and timestamp handed to the per-frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub index: u64,
    pub time: Duration,
}

/// Produces the timestamp of each frame, or `None` once there are no more.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Duration>;
}

/// Fixed-rate frames on a [`ManualClock`], advancing it by one interval per
/// frame. Anything else reading the same clock sees simulated time.
#[derive(Debug)]
pub struct SimulatedFrames {
    clock: Arc<ManualClock>,
    interval: Duration,
    remaining: Option<u64>,
}

impl SimulatedFrames {
    /// `limit` of `None` runs until stopped.
    pub fn new(clock: Arc<ManualClock>, interval: Duration, limit: Option<u64>) -> Self {
        Self {
            clock,
            interval,
            remaining: limit,
        }
    }

    /// Frames at `rate` per second.
    pub fn at_rate(clock: Arc<ManualClock>, rate: u32, limit: Option<u64>) -> Self {
        let interval = Duration::from_secs(1) / rate.max(1);
        Self::new(clock, interval, limit)
    }
}

impl FrameSource for SimulatedFrames {
    fn next_frame(&mut self) -> Option<Duration> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        self.clock.advance(self.interval);
        Some(self.clock.now())
    }
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    stop: StopHandle,
    frames: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Frames delivered so far across all runs.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs until the source is exhausted or the loop is stopped, returning
    /// the number of frames delivered by this call.
    pub fn run<S, F, E>(&mut self, source: &mut S, mut on_frame: F) -> Result<u64, E>
    where
        S: FrameSource + ?Sized,
        F: FnMut(FrameInfo) -> Result<(), E>,
    {
        debug!("frame loop started");
        let mut delivered = 0;
        while !self.stop.is_stopped() {
            let Some(time) = source.next_frame() else {
                break;
            };
            on_frame(FrameInfo {
                index: self.frames,
                time,
            })?;
            self.frames += 1;
            delivered += 1;
        }
        debug!("frame loop finished after {delivered} frame(s)");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_frames_advance_the_clock() {
        let clock = Arc::new(ManualClock::new());
        let mut frames = SimulatedFrames::new(clock.clone(), Duration::from_millis(10), Some(3));
        let times: Vec<_> = std::iter::from_fn(|| frames.next_frame()).collect();
        assert_eq!(
            times,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30)
            ]
        );
        assert_eq!(clock.now(), Duration::from_millis(30));
    }

    #[test]
    fn loop_runs_until_source_is_exhausted() {
        let clock = Arc::new(ManualClock::new());
        let mut frames = SimulatedFrames::at_rate(clock, 60, Some(5));
        let mut seen = Vec::new();
        let mut frame_loop = FrameLoop::new();
        let count = frame_loop
            .run(&mut frames, |info| {
                seen.push(info.index);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(count, 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(frame_loop.frames(), 5);
    }

    #[test]
    fn stop_handle_ends_an_unbounded_loop() {
        let clock = Arc::new(ManualClock::new());
        let mut frames = SimulatedFrames::at_rate(clock, 60, None);
        let mut frame_loop = FrameLoop::new();
        let stop = frame_loop.stop_handle();
        let count = frame_loop
            .run(&mut frames, |info| {
                if info.index == 9 {
                    stop.stop();
                }
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(count, 10);
        assert!(frame_loop.stop_handle().is_stopped());
    }

    #[test]
    fn callback_errors_abort_the_loop() {
        let clock = Arc::new(ManualClock::new());
        let mut frames = SimulatedFrames::at_rate(clock, 60, Some(10));
        let mut frame_loop = FrameLoop::new();
        let result = frame_loop.run(&mut frames, |info| {
            if info.index == 2 {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(frame_loop.frames(), 2);
    }
}
