use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::ThreadRng;
use rand::Rng;
use thiserror::Error;

use crate::runtime::Periodic;

/// Detection probability of the placeholder detectors (a uniform draw above 0.92).
pub const DEFAULT_DETECTION_PROBABILITY: f64 = 0.08;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum TriggerKind {
    Clap,
    Hand,
    Manual,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 3] = [TriggerKind::Clap, TriggerKind::Hand, TriggerKind::Manual];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub timestamp: Instant,
}

impl TriggerEvent {
    pub fn new(kind: TriggerKind, timestamp: Instant) -> Self {
        Self { kind, timestamp }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
pub enum Permission {
    #[default]
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("{0} trigger is unavailable: permission denied")]
    PermissionDenied(TriggerKind),
}

/// Anything that can report discrete "detected" events.
pub trait TriggerSource {
    fn kind(&self) -> TriggerKind;

    fn poll(&mut self, now: Instant) -> Option<TriggerEvent>;

    fn permission(&self) -> Permission {
        Permission::Granted
    }
}

/// Which detector-driven kinds the user has switched on. Manual is always on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerToggles {
    pub clap: bool,
    pub hand: bool,
}

impl TriggerToggles {
    pub fn get(&self, kind: TriggerKind) -> bool {
        match kind {
            TriggerKind::Clap => self.clap,
            TriggerKind::Hand => self.hand,
            TriggerKind::Manual => true,
        }
    }

    pub fn set(&mut self, kind: TriggerKind, on: bool) {
        match kind {
            TriggerKind::Clap => self.clap = on,
            TriggerKind::Hand => self.hand = on,
            TriggerKind::Manual => {}
        }
    }
}

/// Fires once per `press`. Clones share the same queue, so the UI can keep a
/// handle while the source sits in a `TriggerSet`.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    pending: Arc<AtomicU32>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }
}

impl TriggerSource for ManualTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Manual
    }

    fn poll(&mut self, now: Instant) -> Option<TriggerEvent> {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| TriggerEvent::new(TriggerKind::Manual, now))
    }
}

/// Placeholder detector: every poll succeeds with a fixed probability. No
/// audio or image analysis happens here; a real detector implements
/// `TriggerSource` directly.
#[derive(Debug)]
pub struct SimulatedDetector<R: Rng = ThreadRng> {
    kind: TriggerKind,
    probability: f64,
    permission: Permission,
    rng: R,
}

impl SimulatedDetector<ThreadRng> {
    pub fn new(kind: TriggerKind, probability: f64) -> Self {
        Self::with_rng(kind, probability, rand::thread_rng())
    }
}

impl<R: Rng> SimulatedDetector<R> {
    /// Probabilities are clamped to `0.0..=1.0`; NaN never fires.
    pub fn with_rng(kind: TriggerKind, probability: f64, rng: R) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            kind,
            probability,
            permission: Permission::Granted,
            rng,
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl<R: Rng> TriggerSource for SimulatedDetector<R> {
    fn kind(&self) -> TriggerKind {
        self.kind
    }

    fn poll(&mut self, now: Instant) -> Option<TriggerEvent> {
        if self.permission == Permission::Denied {
            return None;
        }
        self.rng
            .gen_bool(self.probability)
            .then(|| TriggerEvent::new(self.kind, now))
    }

    fn permission(&self) -> Permission {
        self.permission
    }
}

struct Polled {
    source: Box<dyn TriggerSource>,
    cadence: Periodic,
}

/// The poll loop: each source is polled on its own cadence.
#[derive(Default)]
pub struct TriggerSet {
    sources: Vec<Polled>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero cadence polls the source on every call to `poll`.
    pub fn add<S>(&mut self, source: S, cadence: Duration)
    where
        S: TriggerSource + 'static,
    {
        self.sources.push(Polled {
            source: Box::new(source),
            cadence: Periodic::new(cadence),
        });
    }

    pub fn with<S>(mut self, source: S, cadence: Duration) -> Self
    where
        S: TriggerSource + 'static,
    {
        self.add(source, cadence);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Denied if any registered source of that kind is denied.
    pub fn permission(&self, kind: TriggerKind) -> Permission {
        let denied = self
            .sources
            .iter()
            .any(|p| p.source.kind() == kind && p.source.permission() == Permission::Denied);
        if denied {
            Permission::Denied
        } else {
            Permission::Granted
        }
    }

    /// Poll every source whose cadence is due. Lapsed periods are coalesced
    /// into a single poll.
    pub fn poll(&mut self, now: Instant) -> Vec<TriggerEvent> {
        let mut events = Vec::new();
        for polled in &mut self.sources {
            if polled.cadence.due(now) == 0 {
                continue;
            }
            if polled.source.permission() == Permission::Denied {
                continue;
            }
            while let Some(event) = polled.source.poll(now) {
                events.push(event);
                if polled.source.kind() != TriggerKind::Manual {
                    break;
                }
            }
        }
        events
    }
}
