//! `heartline watch`: follow the live heartbeat in the terminal.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use heartline_core::Heartbeat;
use heartline_core::heartbeat::format_bpm;
use heartline_core::liveness::LivenessSnapshot;
use heartline_core::schedule::format_animation_duration;
use heartline_core::session::ConnectionStatus;
use heartline_session::liveness::REFRESH_PERIOD;
use heartline_session::seed::fetch_latest;
use heartline_session::{BellSink, PulseDriver, Session, SessionConfig, SystemClock, spawn_liveness};
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cli::WatchOpts;
use crate::shutdown::cancel_on_signal;

/// Seed used when the gateway cannot be reached. Its epoch-zero timestamp
/// renders as dead until the first live publication arrives.
const PLACEHOLDER_SEED: Heartbeat = Heartbeat {
    bpm: 60.0,
    timestamp: 0,
};

/// Entry point for `heartline watch`.
pub async fn cmd_watch(opts: WatchOpts) -> anyhow::Result<()> {
    let seed = match fetch_latest(&opts.api_url).await {
        Ok(hb) => hb,
        Err(e) => {
            tracing::warn!(error = %e, url = %opts.api_url, "seed fetch failed, starting from placeholder");
            PLACEHOLDER_SEED
        }
    };

    let cancel = CancellationToken::new();
    let session = Session::connect(
        SessionConfig {
            url: opts.gateway_url.clone(),
            channel: opts.channel.clone(),
        },
        seed,
    );

    let (liveness_rx, liveness_task) = spawn_liveness(
        session.heartbeat(),
        Arc::new(SystemClock),
        REFRESH_PERIOD,
        cancel.clone(),
    );

    let (mute_tx, mute_rx) = watch::channel(!opts.sound);
    let pulse = PulseDriver::new(
        BellSink::stdout(),
        session.heartbeat(),
        liveness_rx.clone(),
        mute_rx.clone(),
    )
    .spawn(cancel.clone());

    spawn_mute_toggle(mute_tx);
    let signal_task = tokio::spawn(cancel_on_signal(cancel.clone()));

    let animation_rx = pulse.animation();
    let mut redraw = RedrawTrigger::new(session.heartbeat(), session.status(), liveness_rx, mute_rx);

    eprintln!("heartline watch: Enter toggles sound, Ctrl-C quits");

    while redraw.next(&cancel).await {
        let line = render_line(
            &redraw.heartbeat.borrow_and_update(),
            &redraw.liveness.borrow_and_update(),
            *animation_rx.borrow(),
            *redraw.status.borrow_and_update(),
            *redraw.muted.borrow_and_update(),
        );
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "\r\x1b[K{line}")?;
        stdout.flush()?;
    }
    println!();

    pulse.shutdown().await;
    session.close().await;
    if let Err(e) = liveness_task.await {
        tracing::warn!(error = %e, "liveness task panicked");
    }
    match signal_task.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!(error = %e, "signal task panicked"),
    }
    Ok(())
}

/// Wakes the render loop every refresh period, and at once when any
/// rendered input changes.
struct RedrawTrigger {
    ticker: Interval,
    heartbeat: watch::Receiver<Heartbeat>,
    status: watch::Receiver<ConnectionStatus>,
    liveness: watch::Receiver<LivenessSnapshot>,
    muted: watch::Receiver<bool>,
}

impl RedrawTrigger {
    fn new(
        heartbeat: watch::Receiver<Heartbeat>,
        status: watch::Receiver<ConnectionStatus>,
        liveness: watch::Receiver<LivenessSnapshot>,
        muted: watch::Receiver<bool>,
    ) -> Self {
        let mut ticker = tokio::time::interval(REFRESH_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            heartbeat,
            status,
            liveness,
            muted,
        }
    }

    /// Wait for the next redraw. `false` once `cancel` has fired.
    async fn next(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            Ok(()) = self.heartbeat.changed() => true,
            Ok(()) = self.status.changed() => true,
            Ok(()) = self.liveness.changed() => true,
            Ok(()) = self.muted.changed() => true,
            _ = self.ticker.tick() => true,
        }
    }
}

/// Toggle mute on every line read from stdin. Runs on its own thread so a
/// pending read never holds up runtime shutdown.
fn spawn_mute_toggle(mute_tx: watch::Sender<bool>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if let Err(e) = line {
                tracing::debug!(error = %e, "stdin closed");
                break;
            }
            mute_tx.send_modify(|muted| *muted = !*muted);
            tracing::debug!(muted = *mute_tx.borrow(), "sound toggled");
        }
    });
}

/// One status line: `72 bpm · 45s ago · beat 0.83s`, with markers for the
/// dead state, mute and a connection that is not open.
fn render_line(
    heartbeat: &Heartbeat,
    liveness: &LivenessSnapshot,
    animation: Duration,
    status: ConnectionStatus,
    muted: bool,
) -> String {
    let mut line = format!(
        "{} bpm · {} ago · beat {}",
        format_bpm(heartbeat.bpm),
        liveness.ago,
        format_animation_duration(animation)
    );
    if liveness.dead {
        line.push_str(" · I am possibly dead..?");
    }
    if muted {
        line.push_str(" · muted");
    }
    if status != ConnectionStatus::Open {
        line.push_str(" · ");
        line.push_str(status.as_str());
    }
    line
}
