use std::{
    fmt::Display,
    sync::{atomic::AtomicU64, atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use crate::util::{RollingTimeSeries, SizeUnit, WriteLockArc};

/// A point-in-time snapshot of [`UploadStats`], suitable for display in a
/// progress bar.
#[derive(Debug, Clone)]
pub struct CurrentUploadStats {
    pub bps: SizeUnit,
    pub eta: Duration,
    pub percentage: f64,
    pub done: SizeUnit,
    pub total: SizeUnit,
    pub elapsed: Duration,
}

impl Display for CurrentUploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match f.precision() {
            Some(precision) => f.write_fmt(format_args!(
                "Speed: {:.precision$}PS | ETA: {:.precision$?} | Progress: {:.precision$}/{:.precision$} ({:.precision$}%) | Elapsed: {:.precision$?}",
                self.bps, self.eta, self.done, self.total, self.percentage * 100.0, self.elapsed, precision = precision
            )),
            None => f.write_fmt(format_args!(
                "Speed: {}PS | ETA: {:?} | Progress: {}/{} ({}%) | Elapsed: {:?}",
                self.bps, self.eta, self.done, self.total, self.percentage * 100.0, self.elapsed
            )),
        }
    }
}

/// Per-task progress tracking: `bytes_uploaded`, a 1 Hz instantaneous speed
/// sample, and the richer rolling-window stats
/// needed to report an ETA.
#[derive(Debug)]
pub struct UploadStats {
    done: Arc<AtomicU64>,
    last_sample_point: Arc<AtomicU64>,
    last_speed: Arc<AtomicU64>,
    speed_buffer: WriteLockArc<RollingTimeSeries<u64, 64>>,
    total: Arc<AtomicU64>,
    start_time: WriteLockArc<Instant>,
}

impl UploadStats {
    pub fn new(total: u64) -> Self {
        Self {
            total: Arc::new(AtomicU64::new(total)),
            done: Arc::new(AtomicU64::new(0)),
            last_sample_point: Arc::new(AtomicU64::new(0)),
            last_speed: Arc::new(AtomicU64::new(0)),
            speed_buffer: WriteLockArc::new(RollingTimeSeries::new(Duration::from_secs(10))),
            start_time: WriteLockArc::new(Instant::now()),
        }
    }

    pub async fn start_timer(&self) {
        self.start_time.set(Instant::now()).await;
    }

    /// Content length is only known once hashing completes; called once,
    /// right after the hashing phase, to give `current_stats` a meaningful
    /// denominator.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// `bytes_uploaded`, monotonic within a run.
    pub fn bytes_uploaded(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Sets `bytes_uploaded` to an absolute value. Used both mid-slice (the
    /// cumulative count within the current slice, plus the bytes of all
    /// previously accepted slices) and on `Pause`, where it is reset to
    /// `4 MiB × len(accepted_slices)` so the progress bar does not
    /// back-extrapolate an in-flight, abandoned slice.
    pub fn set_bytes_uploaded(&self, bytes: u64) {
        self.done.store(bytes, Ordering::Relaxed);
    }

    /// `instantaneous_speed = max(0, current - previous_sample)`, sampled
    /// once per second by [`crate::uploader::Uploader`]'s speed sampler
    /// task, which also feeds the rolling window `current_stats` derives
    /// its ETA from.
    pub async fn sample_instantaneous_speed(&self) -> u64 {
        let current = self.done.load(Ordering::Relaxed);
        let previous = self.last_sample_point.swap(current, Ordering::Relaxed);
        let speed = current.saturating_sub(previous);
        self.last_speed.store(speed, Ordering::Relaxed);

        let mut buffer = self.speed_buffer.lock_write().await;
        buffer.add_value(speed);

        speed
    }

    /// The last sampled instantaneous speed, without taking a new sample.
    pub fn instantaneous_speed(&self) -> u64 {
        self.last_speed.load(Ordering::Relaxed)
    }

    pub fn current_stats(&self) -> CurrentUploadStats {
        let done = self.done.load(Ordering::Relaxed) as f64;
        let total = self.total.load(Ordering::Relaxed) as f64;

        CurrentUploadStats {
            bps: self.bytes_per_second().into(),
            eta: Duration::from_secs_f64(self.estimated_time(done, total).max(0.0)),
            percentage: if total > 0.0 { done / total } else { 1.0 },
            done: done.into(),
            total: total.into(),
            elapsed: self.start_time.elapsed(),
        }
    }

    fn bytes_per_second(&self) -> f64 {
        let points = self.speed_buffer.get_valid_points();
        let mut total = 0.0;

        let oldest = points
            .iter()
            .map(|dp| {
                total += dp.data as f64;
                dp.time.elapsed()
            })
            .max();

        match oldest {
            Some(dur) if dur.as_secs_f64() > 0.0 => total / dur.as_secs_f64(),
            _ => 0.0,
        }
    }

    fn estimated_time(&self, done: f64, total: f64) -> f64 {
        let mut bps = self.bytes_per_second();

        if bps == 0.0 {
            bps = 1.0;
        }

        (total - done) / bps
    }
}
