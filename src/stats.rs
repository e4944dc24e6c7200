//! Run timing and throughput reporting.

use std::time::Duration;

/// Timing of one epoch's three phases on this rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochTiming {
    /// Time spent issuing this rank's appends
    pub write: Duration,
    /// Time spent waiting at the epoch barrier
    pub barrier: Duration,
    /// Time spent flushing/sealing the epoch
    pub flush: Duration,
}

/// Counters and timings collected over one run on one rank.
#[derive(Debug, Default)]
pub struct RunReport {
    epochs: Vec<EpochTiming>,
    appends: u64,
    total_bytes: u64,
    total_time: Duration,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_append(&mut self, bytes: u64) {
        self.appends += 1;
        self.total_bytes += bytes;
    }

    pub fn record_epoch(&mut self, timing: EpochTiming) {
        self.epochs.push(timing);
    }

    pub fn finalize(&mut self, total_time: Duration) {
        self.total_time = total_time;
    }

    pub fn epochs(&self) -> &[EpochTiming] {
        &self.epochs
    }

    pub fn appends(&self) -> u64 {
        self.appends
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    fn phase_total(&self, phase: fn(&EpochTiming) -> Duration) -> Duration {
        self.epochs.iter().map(phase).sum()
    }

    pub fn write_time(&self) -> Duration {
        self.phase_total(|e| e.write)
    }

    pub fn barrier_time(&self) -> Duration {
        self.phase_total(|e| e.barrier)
    }

    pub fn flush_time(&self) -> Duration {
        self.phase_total(|e| e.flush)
    }

    pub fn throughput_mbps(&self) -> f64 {
        if self.total_time.as_secs_f64() == 0.0 {
            return 0.0;
        }
        (self.total_bytes as f64 / 1024.0 / 1024.0) / self.total_time.as_secs_f64()
    }

    pub fn appends_per_sec(&self) -> f64 {
        if self.total_time.as_secs_f64() == 0.0 {
            return 0.0;
        }
        self.appends as f64 / self.total_time.as_secs_f64()
    }

    pub fn print_report(&self) {
        println!("\n===== Write Results =====");
        println!("Epochs:       {}", self.epochs.len());
        println!("Appends:      {}", self.appends);
        println!(
            "Value bytes:  {} bytes ({:.2} MB)",
            self.total_bytes,
            self.total_bytes as f64 / 1024.0 / 1024.0
        );
        println!("Total time:   {:.3} ms", self.total_time.as_secs_f64() * 1000.0);
        println!("Throughput:   {:.2} MB/s", self.throughput_mbps());
        println!("Appends/s:    {:.2}", self.appends_per_sec());
        println!(
            "Write time:   {:.3} ms",
            self.write_time().as_secs_f64() * 1000.0
        );
        println!(
            "Barrier time: {:.3} ms",
            self.barrier_time().as_secs_f64() * 1000.0
        );
        println!(
            "Flush time:   {:.3} ms",
            self.flush_time().as_secs_f64() * 1000.0
        );
    }
}
