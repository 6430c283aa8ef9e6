//! Pulse driver: plays the heartbeat at the current bpm.
//!
//! The driver sleeps on tokio's timer until the schedule's next target
//! instant. tokio timers keep firing regardless of terminal focus or window
//! visibility, so no frame-callback fallback is needed. bpm, mute and
//! liveness arrive on `watch` channels and take effect from the next pulse.

use std::io::Write;
use std::time::Duration;

use heartline_core::Heartbeat;
use heartline_core::liveness::LivenessSnapshot;
use heartline_core::schedule::{PulseSchedule, animation_duration};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;

/// Output for one audible pulse.
pub trait PulseSink: Send + 'static {
    fn pulse(&mut self) -> Result<(), SinkError>;
}

/// Rings the terminal bell on a writer (stdout by default).
pub struct BellSink<W> {
    out: W,
}

impl BellSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send + 'static> BellSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send + 'static> PulseSink for BellSink<W> {
    fn pulse(&mut self) -> Result<(), SinkError> {
        self.out.write_all(b"\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Inputs the driver follows.
pub struct PulseDriver<S> {
    sink: S,
    heartbeat_rx: watch::Receiver<Heartbeat>,
    liveness_rx: watch::Receiver<LivenessSnapshot>,
    mute_rx: watch::Receiver<bool>,
}

/// Handle to a running driver.
pub struct PulseHandle {
    animation_rx: watch::Receiver<Duration>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PulseHandle {
    /// Current visual animation duration, derived from the same bpm formula
    /// as the pulse interval.
    pub fn animation(&self) -> watch::Receiver<Duration> {
        self.animation_rx.clone()
    }

    /// Stop the driver. No pulse is emitted once this returns.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "pulse task panicked");
        }
    }
}

impl<S: PulseSink> PulseDriver<S> {
    pub fn new(
        sink: S,
        heartbeat_rx: watch::Receiver<Heartbeat>,
        liveness_rx: watch::Receiver<LivenessSnapshot>,
        mute_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sink,
            heartbeat_rx,
            liveness_rx,
            mute_rx,
        }
    }

    /// Spawn the driver. It stops when `cancel` fires or the handle is shut down.
    pub fn spawn(self, cancel: CancellationToken) -> PulseHandle {
        let bpm = self.heartbeat_rx.borrow().bpm;
        let (animation_tx, animation_rx) = watch::channel(animation_duration(bpm));
        let task_cancel = cancel.child_token();
        let handle = tokio::spawn(self.run(animation_tx, task_cancel.clone()));
        PulseHandle {
            animation_rx,
            cancel: task_cancel,
            handle,
        }
    }

    async fn run(mut self, animation_tx: watch::Sender<Duration>, cancel: CancellationToken) {
        let mut bpm = self.heartbeat_rx.borrow_and_update().bpm;
        let mut dead = self.liveness_rx.borrow_and_update().dead;
        let mut muted = *self.mute_rx.borrow_and_update();
        let mut schedule = PulseSchedule::new(bpm, Instant::now().into_std());

        let mut heartbeat_open = true;
        let mut liveness_open = true;
        let mut mute_open = true;

        tracing::debug!(bpm, muted, dead, "pulse driver started");

        loop {
            let active = !muted && !dead;
            let deadline = Instant::from_std(schedule.next_pulse_at());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = self.heartbeat_rx.changed(), if heartbeat_open => {
                    if changed.is_err() {
                        heartbeat_open = false;
                        continue;
                    }
                    let next = self.heartbeat_rx.borrow_and_update().bpm;
                    if next != bpm {
                        bpm = next;
                        schedule.set_bpm(bpm, Instant::now().into_std());
                        animation_tx.send_replace(animation_duration(bpm));
                        tracing::debug!(bpm, interval_ms = schedule.interval().as_millis() as u64, "tempo changed");
                    }
                }
                changed = self.liveness_rx.changed(), if liveness_open => {
                    if changed.is_err() {
                        liveness_open = false;
                        continue;
                    }
                    let now_dead = self.liveness_rx.borrow_and_update().dead;
                    if dead && !now_dead {
                        schedule.anchor(Instant::now().into_std());
                    }
                    dead = now_dead;
                }
                changed = self.mute_rx.changed(), if mute_open => {
                    if changed.is_err() {
                        mute_open = false;
                        continue;
                    }
                    let now_muted = *self.mute_rx.borrow_and_update();
                    if muted && !now_muted {
                        schedule.anchor(Instant::now().into_std());
                    }
                    muted = now_muted;
                }
                _ = tokio::time::sleep_until(deadline), if active => {
                    if schedule.poll(Instant::now().into_std()) {
                        if let Err(e) = self.sink.pulse() {
                            tracing::warn!(error = %e, "pulse playback failed");
                        }
                    }
                }
            }
        }

        tracing::debug!("pulse driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const NOW: i64 = 1_700_000_000_000;

    #[derive(Clone)]
    struct Recorder {
        origin: Instant,
        pulses: Arc<Mutex<Vec<Instant>>>,
        fail_first: bool,
    }

    impl Recorder {
        fn new(fail_first: bool) -> Self {
            Self {
                origin: Instant::now(),
                pulses: Arc::default(),
                fail_first,
            }
        }

        fn times(&self) -> Vec<Duration> {
            self.pulses
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.duration_since(self.origin))
                .collect()
        }

        fn count(&self) -> usize {
            self.pulses.lock().unwrap().len()
        }
    }

    impl PulseSink for Recorder {
        fn pulse(&mut self) -> Result<(), SinkError> {
            let mut pulses = self.pulses.lock().unwrap();
            pulses.push(Instant::now());
            if self.fail_first && pulses.len() == 1 {
                return Err(SinkError::Rejected("device busy".into()));
            }
            Ok(())
        }
    }

    struct Inputs {
        heartbeat: watch::Sender<Heartbeat>,
        liveness: watch::Sender<LivenessSnapshot>,
        mute: watch::Sender<bool>,
    }

    fn snapshot(dead: bool) -> LivenessSnapshot {
        LivenessSnapshot {
            now_ms: NOW,
            dead,
            ago: "0s".into(),
        }
    }

    fn start(recorder: Recorder, bpm: f64, muted: bool, dead: bool) -> (Inputs, PulseHandle) {
        let (heartbeat, hb_rx) = watch::channel(Heartbeat { bpm, timestamp: NOW });
        let (liveness, live_rx) = watch::channel(snapshot(dead));
        let (mute, mute_rx) = watch::channel(muted);
        let handle =
            PulseDriver::new(recorder, hb_rx, live_rx, mute_rx).spawn(CancellationToken::new());
        (Inputs { heartbeat, liveness, mute }, handle)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    async fn advance(n: u64) {
        tokio::time::sleep(ms(n)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn pulses_at_tempo() {
        let rec = Recorder::new(false);
        let (_inputs, handle) = start(rec.clone(), 60.0, false, false);

        advance(3_500).await;
        assert_eq!(rec.times(), vec![ms(1_000), ms(2_000), ms(3_000)]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn tempo_change_applies_from_next_pulse() {
        let rec = Recorder::new(false);
        let (inputs, handle) = start(rec.clone(), 60.0, false, false);

        advance(1_200).await;
        inputs.heartbeat.send_replace(Heartbeat { bpm: 120.0, timestamp: NOW + 1 });
        advance(1_100).await;

        assert_eq!(rec.times(), vec![ms(1_000), ms(1_700), ms(2_200)]);
        assert_eq!(*handle.animation().borrow(), ms(500));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmute_resumes_on_tempo_without_burst() {
        let rec = Recorder::new(false);
        let (inputs, handle) = start(rec.clone(), 60.0, true, false);

        advance(5_000).await;
        assert_eq!(rec.count(), 0);

        inputs.mute.send_replace(false);
        advance(2_500).await;
        assert_eq!(rec.times(), vec![ms(6_000), ms(7_000)]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dead_heartbeat_is_silent_until_alive() {
        let rec = Recorder::new(false);
        let (inputs, handle) = start(rec.clone(), 60.0, false, true);

        advance(3_000).await;
        assert_eq!(rec.count(), 0);

        inputs.liveness.send_replace(snapshot(false));
        advance(1_500).await;
        assert_eq!(rec.times(), vec![ms(4_000)]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pulse_does_not_stop_schedule() {
        let rec = Recorder::new(true);
        let (_inputs, handle) = start(rec.clone(), 60.0, false, false);

        advance(3_500).await;
        assert_eq!(rec.count(), 3);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_pulses_after_shutdown() {
        let rec = Recorder::new(false);
        let (_inputs, handle) = start(rec.clone(), 60.0, false, false);

        advance(1_500).await;
        handle.shutdown().await;
        advance(5_000).await;
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn bell_sink_writes_bel() {
        let mut sink = BellSink::new(Vec::new());
        sink.pulse().unwrap();
        sink.pulse().unwrap();
        assert_eq!(sink.out, b"\x07\x07");
    }
}
