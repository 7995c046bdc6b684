//! Frame sampling decision.

/// Decision for one incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Send,
    Skip,
}

/// Sends one frame out of every `interval`.
///
/// The decision depends only on the frame's sequence number, so a skipped
/// frame never shifts later sends.
#[derive(Debug, Clone, Copy)]
pub struct SendSchedule {
    interval: u64,
}

impl SendSchedule {
    /// An interval of 0 is treated as 1.
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Decide for the frame with 1-based sequence number `frame_number`.
    pub fn decide(&self, frame_number: u64) -> ScheduleDecision {
        if frame_number % self.interval == 0 {
            ScheduleDecision::Send
        } else {
            ScheduleDecision::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sends(schedule: SendSchedule, frames: u64) -> u64 {
        (1..=frames)
            .filter(|n| schedule.decide(*n) == ScheduleDecision::Send)
            .count() as u64
    }

    #[test]
    fn test_interval_one_sends_every_frame() {
        let schedule = SendSchedule::new(1);
        assert!((1..=20).all(|n| schedule.decide(n) == ScheduleDecision::Send));
    }

    #[test]
    fn test_every_nth_frame() {
        let schedule = SendSchedule::new(3);
        assert_eq!(schedule.decide(1), ScheduleDecision::Skip);
        assert_eq!(schedule.decide(2), ScheduleDecision::Skip);
        assert_eq!(schedule.decide(3), ScheduleDecision::Send);
        assert_eq!(schedule.decide(6), ScheduleDecision::Send);
    }

    #[test]
    fn test_send_count_is_floor_k_over_n() {
        for interval in 1..=7 {
            for frames in [0, 1, 5, 13, 100] {
                assert_eq!(
                    sends(SendSchedule::new(interval), frames),
                    frames / interval,
                    "interval={interval} frames={frames}"
                );
            }
        }
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(SendSchedule::new(0).interval(), 1);
    }
}
