use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::sound::{PlaybackError, SoundPlayer};

/// Shared generation counter. Requests tagged with an older generation are
/// dropped before each individual bell.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate everything issued so far. Returns the new generation.
    pub fn cancel(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_stale(&self, generation: u64) -> bool {
        generation != self.current()
    }
}

#[derive(Debug)]
enum Request {
    Play {
        repeat: u32,
        gap: Duration,
        generation: u64,
    },
    Shutdown,
}

/// Completion of one queued cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub generation: u64,
    pub repeat: u32,
    /// Bells actually rung before finishing, failing or being cancelled.
    pub played: u32,
    pub cancelled: bool,
    pub result: Result<(), PlaybackError>,
}

/// Runs a `SoundPlayer` on its own thread so a slow or failing bell never
/// delays the session clock. Playing only enqueues; outcomes come back
/// through `drain_reports`.
pub struct BackgroundPlayer {
    tx: Sender<Request>,
    reports: Receiver<PlaybackReport>,
    token: CancelToken,
}

impl BackgroundPlayer {
    pub fn spawn<P>(player: P) -> Self
    where
        P: SoundPlayer + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let (report_tx, reports) = mpsc::channel();
        let token = CancelToken::default();
        let worker_token = token.clone();

        thread::spawn(move || run_worker(player, rx, report_tx, worker_token));

        Self { tx, reports, token }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Collect every report that has arrived so far without blocking.
    pub fn drain_reports(&self) -> Vec<PlaybackReport> {
        self.reports.try_iter().collect()
    }

    /// Block up to `timeout` for the next report.
    pub fn recv_report(&self, timeout: Duration) -> Option<PlaybackReport> {
        self.reports.recv_timeout(timeout).ok()
    }

    fn enqueue(&self, repeat: u32, gap: Duration) -> Result<(), PlaybackError> {
        self.tx
            .send(Request::Play {
                repeat,
                gap,
                generation: self.token.current(),
            })
            .map_err(|_| PlaybackError::WorkerGone)
    }
}

impl SoundPlayer for BackgroundPlayer {
    fn play_once(&mut self) -> Result<(), PlaybackError> {
        self.enqueue(1, Duration::ZERO)
    }

    fn play_repeated(&mut self, n: u32, gap: Duration) -> Result<(), PlaybackError> {
        self.enqueue(n, gap)
    }

    fn cancel_pending(&mut self) {
        let generation = self.token.cancel();
        tracing::debug!(generation, "cancelled pending cues");
    }
}

impl Drop for BackgroundPlayer {
    fn drop(&mut self) {
        self.token.cancel();
        let _ = self.tx.send(Request::Shutdown);
    }
}

fn run_worker<P: SoundPlayer>(
    mut player: P,
    rx: Receiver<Request>,
    reports: Sender<PlaybackReport>,
    token: CancelToken,
) {
    let policy = player.policy();

    while let Ok(request) = rx.recv() {
        let (repeat, gap, generation) = match request {
            Request::Play {
                repeat,
                gap,
                generation,
            } => (repeat, gap, generation),
            Request::Shutdown => break,
        };

        let mut report = PlaybackReport {
            generation,
            repeat,
            played: 0,
            cancelled: false,
            result: Ok(()),
        };

        for i in 0..repeat {
            if i > 0 && !gap.is_zero() {
                wait_gap(gap, &token, generation);
            }
            if token.is_stale(generation) {
                tracing::debug!(generation, played = report.played, "dropped stale cue");
                report.cancelled = true;
                break;
            }
            match player.play_once() {
                Ok(()) => report.played += 1,
                Err(err) => {
                    tracing::warn!(error = %err, attempt = i + 1, of = repeat, "bell failed");
                    if report.result.is_ok() {
                        report.result = Err(err);
                    }
                    if policy.stop_on_first_failure {
                        break;
                    }
                }
            }
        }

        if reports.send(report).is_err() {
            break;
        }
    }
}

const CANCEL_CHECK: Duration = Duration::from_millis(20);

// Sleeps out `gap` in short slices, returning early once `generation` is stale.
fn wait_gap(gap: Duration, token: &CancelToken, generation: u64) {
    let deadline = Instant::now() + gap;
    loop {
        if token.is_stale(generation) {
            return;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return;
        }
        thread::sleep(left.min(CANCEL_CHECK));
    }
}
