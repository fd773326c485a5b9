//! Wall-clock timer adapter.

use crate::ports::timer_port::TimerPort;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTimer;

impl TimerPort for ThreadTimer {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleeps_at_least_requested_duration() {
        let start = Instant::now();
        ThreadTimer.sleep(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
