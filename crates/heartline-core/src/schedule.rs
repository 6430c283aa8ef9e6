//! Pulse schedule: turns a bpm into a drift-free sequence of target instants.
//!
//! The schedule never reads a clock. The driver passes the current monotonic
//! instant to [`PulseSchedule::poll`] whenever its timer wakes; a due pulse
//! advances the target by exactly one interval so wake-up jitter does not
//! accumulate.

use std::time::{Duration, Instant};

/// Lowest bpm the schedule will honor; slower or invalid values clamp here.
pub const MIN_BPM: f64 = 1.0;
/// Highest bpm the schedule will honor.
pub const MAX_BPM: f64 = 600.0;

/// Interval between beats: `60 / bpm` seconds.
///
/// This is the single bpm-to-duration formula; audio pulses and the visual
/// animation both derive from it. Non-finite or out-of-range bpm values are
/// clamped to `MIN_BPM..=MAX_BPM`.
#[must_use]
pub fn beat_interval(bpm: f64) -> Duration {
    let bpm = if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        MIN_BPM
    };
    Duration::from_secs_f64(60.0 / bpm)
}

/// Duration of one cycle of the visual heartbeat animation.
#[must_use]
pub fn animation_duration(bpm: f64) -> Duration {
    beat_interval(bpm)
}

/// Animation duration as a CSS-style seconds string, e.g. `"0.83s"`.
#[must_use]
pub fn format_animation_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// Target times for upcoming pulses at the current tempo.
#[derive(Debug, Clone)]
pub struct PulseSchedule {
    interval: Duration,
    next_pulse_at: Instant,
}

impl PulseSchedule {
    /// Anchor a new schedule: the first pulse is one interval after `now`.
    #[must_use]
    pub fn new(bpm: f64, now: Instant) -> Self {
        let interval = beat_interval(bpm);
        Self {
            interval,
            next_pulse_at: now + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_pulse_at(&self) -> Instant {
        self.next_pulse_at
    }

    /// Restart the schedule from `now`, discarding any overdue target.
    pub fn anchor(&mut self, now: Instant) {
        self.next_pulse_at = now + self.interval;
    }

    /// Switch tempo. The pending target is replaced by `now + new interval`;
    /// pulses already emitted are unaffected.
    pub fn set_bpm(&mut self, bpm: f64, now: Instant) {
        self.interval = beat_interval(bpm);
        self.anchor(now);
    }

    /// Returns `true` when a pulse is due at `now`, advancing the target by
    /// one interval.
    ///
    /// If the host stalled for longer than an interval, the target skips
    /// forward along the original grid to the first slot after `now`: one
    /// pulse fires for the stall, never a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_pulse_at {
            return false;
        }

        self.next_pulse_at += self.interval;
        if self.next_pulse_at <= now {
            let behind = now.duration_since(self.next_pulse_at).as_nanos();
            let slots = behind / self.interval.as_nanos().max(1) + 1;
            let skip = self
                .interval
                .as_nanos()
                .saturating_mul(slots);
            let skip = Duration::from_nanos(u64::try_from(skip).unwrap_or(u64::MAX));
            self.next_pulse_at = self
                .next_pulse_at
                .checked_add(skip)
                .unwrap_or(now + self.interval);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn interval_follows_bpm() {
        assert_eq!(beat_interval(60.0), ms(1_000));
        assert_eq!(beat_interval(120.0), ms(500));
        assert_eq!(beat_interval(0.0), beat_interval(MIN_BPM));
        assert_eq!(beat_interval(f64::NAN), beat_interval(MIN_BPM));
        assert_eq!(beat_interval(10_000.0), beat_interval(MAX_BPM));
    }

    #[test]
    fn animation_matches_interval() {
        assert_eq!(animation_duration(72.0), beat_interval(72.0));
        assert_eq!(format_animation_duration(animation_duration(72.0)), "0.83s");
        assert_eq!(format_animation_duration(animation_duration(60.0)), "1.00s");
    }

    #[test]
    fn first_pulse_is_one_interval_after_anchor() {
        let t0 = Instant::now();
        let mut s = PulseSchedule::new(60.0, t0);
        assert!(!s.poll(t0));
        assert!(!s.poll(t0 + ms(999)));
        assert!(s.poll(t0 + ms(1_000)));
        assert!(!s.poll(t0 + ms(1_001)));
    }

    #[test]
    fn late_tick_does_not_shift_grid() {
        let t0 = Instant::now();
        let mut s = PulseSchedule::new(60.0, t0);
        assert!(s.poll(t0 + ms(1_007)));
        assert_eq!(s.next_pulse_at(), t0 + ms(2_000));
    }

    #[test]
    fn bpm_change_moves_only_the_next_pulse() {
        let t0 = Instant::now();
        let mut s = PulseSchedule::new(60.0, t0);
        assert!(s.poll(t0 + ms(1_000)));
        assert_eq!(s.next_pulse_at(), t0 + ms(2_000));

        s.set_bpm(120.0, t0 + ms(1_200));
        assert_eq!(s.interval(), ms(500));
        assert_eq!(s.next_pulse_at(), t0 + ms(1_700));

        assert!(s.poll(t0 + ms(1_700)));
        assert_eq!(s.next_pulse_at(), t0 + ms(2_200));
    }

    #[test]
    fn reanchor_after_silence_resumes_on_tempo() {
        let t0 = Instant::now();
        let mut s = PulseSchedule::new(60.0, t0);
        // Ten seconds pass without polling (muted), then the driver re-anchors.
        let resume = t0 + ms(10_000);
        s.anchor(resume);
        assert!(!s.poll(resume));
        assert!(!s.poll(resume + ms(500)));
        assert!(s.poll(resume + ms(1_000)));
        assert!(!s.poll(resume + ms(1_001)));
    }

    #[test]
    fn stall_fires_once_then_realigns() {
        let t0 = Instant::now();
        let mut s = PulseSchedule::new(60.0, t0);
        // Host stalls for 4.5 intervals.
        assert!(s.poll(t0 + ms(4_500)));
        assert!(!s.poll(t0 + ms(4_501)));
        assert_eq!(s.next_pulse_at(), t0 + ms(5_000));
    }

    #[test]
    fn stall_of_exact_multiple_does_not_burst() {
        let t0 = Instant::now();
        let mut s = PulseSchedule::new(60.0, t0);
        assert!(s.poll(t0 + ms(2_000)));
        assert!(!s.poll(t0 + ms(2_000)));
        assert_eq!(s.next_pulse_at(), t0 + ms(3_000));
    }

    proptest! {
        /// Every pulse lands within one polling period of its ideal grid
        /// slot, so the mean interval converges to `60000 / bpm`.
        #[test]
        fn drift_is_bounded_under_jitter(
            bpm in 30.0f64..240.0,
            jitter in prop::collection::vec(0u64..4, 1..64),
        ) {
            let t0 = Instant::now();
            let mut s = PulseSchedule::new(bpm, t0);
            let interval = s.interval();
            let max_tick = ms(4);

            let mut now = t0;
            let mut fired = Vec::new();
            let mut i = 0usize;
            while fired.len() < 200 {
                now += ms(1 + jitter[i % jitter.len()]);
                i += 1;
                if s.poll(now) {
                    fired.push(now);
                }
            }

            for (k, at) in fired.iter().enumerate() {
                let ideal = t0 + interval * (k as u32 + 1);
                prop_assert!(*at >= ideal);
                prop_assert!(at.duration_since(ideal) < max_tick);
            }

            let span = fired[fired.len() - 1].duration_since(fired[0]).as_secs_f64();
            let mean = span / (fired.len() - 1) as f64;
            let tolerance = max_tick.as_secs_f64() / (fired.len() - 1) as f64;
            prop_assert!((mean - interval.as_secs_f64()).abs() <= tolerance);
        }
    }
}
