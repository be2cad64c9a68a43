use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// What the front-end loop reacts to.
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

pub trait EventSource: Send + 'static {
    /// Wait at most `timeout` for the next input event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Keyboard and resize events read from the terminal on a helper thread.
pub struct CrosstermEventSource {
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || forward_terminal_events(tx));
        Self { rx }
    }
}

fn forward_terminal_events(tx: Sender<AppEvent>) {
    loop {
        let ev = match event::read() {
            Ok(CtEvent::Key(key)) => AppEvent::Key(key),
            Ok(CtEvent::Resize(_, _)) => AppEvent::Resize,
            Ok(_) => continue,
            Err(err) => {
                tracing::error!(error = %err, "terminal event reader stopped");
                return;
            }
        };
        if tx.send(ev).is_err() {
            return;
        }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// How long the runner waits for input before emitting a `Tick`.
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Scripted input: whatever the test pushes into the paired sender.
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Drives the session loop without owning a terminal, so a whole session can
/// run headless.
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Next input event, or `Tick` once the ticker interval passes. A closed
    /// source keeps ticking so the session clock never stalls.
    pub fn step(&self) -> AppEvent {
        self.event_source
            .recv_timeout(self.ticker.interval())
            .unwrap_or(AppEvent::Tick)
    }
}

/// Fixed-period schedule on a monotonic clock. The runner loop wakes far more
/// often than any period, so callers ask how many periods have lapsed.
#[derive(Clone, Copy, Debug)]
pub struct Periodic {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Periodic {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restart the period so the first firing is one interval after `now`.
    pub fn reset(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    /// Drop the schedule; the next `due` call re-arms it.
    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Number of whole periods that lapsed since the last call. An unarmed
    /// schedule arms itself and reports zero. A zero interval is always due once.
    pub fn due(&mut self, now: Instant) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let Some(mut next) = self.next_due else {
            self.reset(now);
            return 0;
        };

        let mut count = 0;
        while now >= next {
            count += 1;
            next += self.interval;
        }
        self.next_due = Some(next);
        count
    }
}
