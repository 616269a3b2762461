use std::time::{Duration, Instant};
use log::info;

/// Accumulated wall-clock time for one pipeline stage
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub name: String,
    pub total_time: Duration,
    pub count: u32,
}

impl TimingStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_time: Duration::from_secs(0),
            count: 0,
        }
    }

    pub fn add_measurement(&mut self, duration: Duration) {
        self.total_time += duration;
        self.count += 1;

        info!("{} took {:.2}ms", self.name, duration.as_secs_f64() * 1000.0);
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_time.as_secs_f64() * 1000.0) / self.count as f64
        }
    }
}

/// Records the time between creation and drop into a [`TimingStats`]
pub struct ScopedTimer<'a> {
    start: Instant,
    stats: &'a mut TimingStats,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(stats: &'a mut TimingStats) -> Self {
        Self {
            start: Instant::now(),
            stats,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.stats.add_measurement(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_timer_records_once() {
        let mut stats = TimingStats::new("stage");
        {
            let _timer = ScopedTimer::new(&mut stats);
        }
        assert_eq!(stats.count, 1);

        stats.add_measurement(Duration::from_millis(4));
        assert_eq!(stats.count, 2);
        assert!(stats.average_ms() >= 2.0);
    }
}
