// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::sync::{ Arc, OnceLock };
use std::time::{ Duration, Instant };
use futures_intrusive::sync::ManualResetEvent;
use parking_lot::{ Condvar, Mutex };

use crate::vision::{ Point, TrackStatus };

/// Output of one tick. Immutable once published.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct TrackingResult {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub rgb: Vec<u8>,
    pub prev_corners: Vec<Point>,
    pub curr_corners: Vec<Point>,
    pub corner_count: usize,
    pub status: Vec<TrackStatus>,
    pub error: Vec<f32>,
    pub prev_timestamp: f64,
    pub curr_timestamp: f64,
}

impl TrackingResult {
    pub fn tracked_count(&self) -> usize { self.status.iter().filter(|s| s.is_tracked()).count() }

    /// (from, to) pairs of the corners that were tracked
    pub fn tracked_pairs(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.prev_corners.iter().zip(&self.curr_corners).zip(&self.status)
            .filter(|(_, s)| s.is_tracked())
            .map(|((a, b), _)| (*a, *b))
    }

    pub fn elapsed(&self) -> f64 { self.curr_timestamp - self.prev_timestamp }
}

pub(crate) struct CompletionSlot {
    value: OnceLock<Arc<TrackingResult>>,
    // Async waiters
    event: ManualResetEvent,
    // Blocking waiters
    done: Mutex<bool>,
    cond: Condvar,
}

impl CompletionSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { value: OnceLock::new(), event: ManualResetEvent::new(false), done: Mutex::new(false), cond: Condvar::new() })
    }
    /// Publishes the result. Only the first call has any effect.
    pub(crate) fn complete(&self, result: TrackingResult) {
        if self.value.set(Arc::new(result)).is_ok() {
            *self.done.lock() = true;
            self.cond.notify_all();
            self.event.set();
        } else {
            log::warn!("Tracking result published twice, ignoring");
        }
    }
}

/// Handle to a tick running in the background.
#[derive(Clone)]
pub struct PendingResult {
    slot: Arc<CompletionSlot>,
    prev_timestamp: f64,
    curr_timestamp: f64,
}

impl PendingResult {
    pub(crate) fn new(slot: Arc<CompletionSlot>, prev_timestamp: f64, curr_timestamp: f64) -> Self {
        Self { slot, prev_timestamp, curr_timestamp }
    }

    pub fn is_complete(&self) -> bool { self.slot.value.get().is_some() }

    pub fn try_read(&self) -> Option<Arc<TrackingResult>> { self.slot.value.get().cloned() }

    /// Blocks until the tick has finished. Never returns if the tick failed, see `wait_timeout`.
    pub fn read(&self) -> Arc<TrackingResult> {
        loop {
            if let Some(v) = self.try_read() { return v; }
            pollster::block_on(self.slot.event.wait());
        }
    }

    /// Blocks until the tick has finished or `timeout` has passed, woken by the completion itself.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Arc<TrackingResult>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut done = self.slot.done.lock();
        while !*done {
            match deadline {
                Some(deadline) => if self.slot.cond.wait_until(&mut done, deadline).timed_out() { break; },
                None => self.slot.cond.wait(&mut done),
            }
        }
        drop(done);
        self.try_read()
    }

    pub async fn completed(&self) -> Arc<TrackingResult> {
        loop {
            if let Some(v) = self.try_read() { return v; }
            self.slot.event.wait().await;
        }
    }

    /// Timestamps are fixed when the tick is issued, before it completes.
    pub fn timestamps(&self) -> (f64, f64) { (self.prev_timestamp, self.curr_timestamp) }
}

impl std::fmt::Debug for PendingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("complete", &self.is_complete())
            .field("prev_timestamp", &self.prev_timestamp)
            .field("curr_timestamp", &self.curr_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::TrackStatus::*;

    #[test]
    fn completion_is_monotonic() {
        let slot = CompletionSlot::new();
        let pending = PendingResult::new(slot.clone(), 0.0, 1.0);
        assert!(!pending.is_complete());
        assert!(pending.wait_timeout(Duration::from_millis(5)).is_none());

        slot.complete(TrackingResult { corner_count: 3, ..Default::default() });
        assert!(pending.is_complete());
        slot.complete(TrackingResult { corner_count: 7, ..Default::default() });
        assert!(pending.is_complete());
        assert_eq!(pending.read().corner_count, 3);
    }

    #[test]
    fn read_blocks_until_published() {
        let slot = CompletionSlot::new();
        let pending = PendingResult::new(slot.clone(), 0.0, 1.0);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slot.complete(TrackingResult { width: 4, ..Default::default() });
        });
        assert_eq!(pending.read().width, 4);
        assert_eq!(pollster::block_on(pending.completed()).width, 4);
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_wakes_on_completion() {
        let slot = CompletionSlot::new();
        let pending = PendingResult::new(slot.clone(), 0.0, 1.0);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slot.complete(TrackingResult { height: 9, ..Default::default() });
        });
        let start = Instant::now();
        assert_eq!(pending.wait_timeout(Duration::from_secs(30)).map(|r| r.height), Some(9));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_gives_up() {
        let pending = PendingResult::new(CompletionSlot::new(), 0.0, 1.0);
        let start = Instant::now();
        assert!(pending.wait_timeout(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn tracked_pairs_skip_lost() {
        let r = TrackingResult {
            prev_corners: vec![(1.0, 1.0), (2.0, 2.0)],
            curr_corners: vec![(1.5, 1.0), (9.0, 9.0)],
            corner_count: 2,
            status: vec![Tracked, Lost],
            error: vec![0.1, f32::MAX],
            ..Default::default()
        };
        assert_eq!(r.tracked_count(), 1);
        assert_eq!(r.tracked_pairs().collect::<Vec<_>>(), vec![((1.0, 1.0), (1.5, 1.0))]);
    }
}
