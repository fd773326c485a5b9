//! Delay port used by polling loops.

use std::time::Duration;

pub trait TimerPort {
    fn sleep(&self, duration: Duration);
}
