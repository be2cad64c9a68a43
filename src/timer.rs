use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cue_plan::{CueEntry, CuePlan};
use crate::session::{SessionState, SessionStatus};
use crate::sound::{PlaybackError, SoundPlayer, DEFAULT_REPEAT_GAP};
use crate::trigger::{Permission, TriggerError, TriggerEvent, TriggerKind, TriggerToggles};

pub const DEFAULT_TRIGGER_COOLDOWN: Duration = Duration::from_secs(3);
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// A bell that could not be played. Never stops the session clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cue failed: {0}")]
pub struct CueFailed(pub PlaybackError);

#[derive(Debug, Clone)]
pub struct TimerSettings {
    pub plan: CuePlan,
    pub repeat_gap: Duration,
    pub cooldown: Duration,
    pub message_ttl: Duration,
    pub toggles: TriggerToggles,
}

impl TimerSettings {
    pub fn new(plan: CuePlan) -> Self {
        Self {
            plan,
            repeat_gap: DEFAULT_REPEAT_GAP,
            cooldown: DEFAULT_TRIGGER_COOLDOWN,
            message_ttl: DEFAULT_MESSAGE_TTL,
            toggles: TriggerToggles::default(),
        }
    }
}

/// What a single `tick` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub elapsed: u64,
    pub cue: Option<CueEntry>,
    pub completed: bool,
    pub failure: Option<CueFailed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted {
        kind: TriggerKind,
        message: String,
        failure: Option<CueFailed>,
    },
    CoolingDown,
    Disabled,
}

#[derive(Debug, Clone)]
struct TriggerMessage {
    text: String,
    expires_at: Instant,
}

/// Drives one session's timeline and turns it (and accepted trigger events)
/// into bell requests on the injected player.
pub struct SessionTimer<P: SoundPlayer> {
    state: SessionState,
    plan: CuePlan,
    repeat_gap: Duration,
    cooldown: Duration,
    message_ttl: Duration,
    toggles: TriggerToggles,
    denied: HashSet<TriggerKind>,
    last_accepted: HashMap<TriggerKind, Instant>,
    message: Option<TriggerMessage>,
    player: P,
}

impl<P: SoundPlayer> SessionTimer<P> {
    pub fn new(settings: TimerSettings, player: P) -> Self {
        Self {
            state: SessionState::new(settings.plan.session_length_secs()),
            plan: settings.plan,
            repeat_gap: settings.repeat_gap,
            cooldown: settings.cooldown,
            message_ttl: settings.message_ttl,
            toggles: settings.toggles,
            denied: HashSet::new(),
            last_accepted: HashMap::new(),
            message: None,
            player,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.state.elapsed_seconds
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.state.remaining_seconds()
    }

    pub fn plan(&self) -> &CuePlan {
        &self.plan
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    /// Start a session. While one is already running this is a restart.
    pub fn start(&mut self) {
        if self.state.is_running() {
            self.restart();
        } else {
            self.begin();
        }
    }

    pub fn restart(&mut self) {
        tracing::debug!(elapsed = self.state.elapsed_seconds, "restarting session");
        self.stop();
        self.begin();
    }

    /// Back to idle. Cues not yet rung are cancelled; nothing is played.
    pub fn stop(&mut self) {
        self.player.cancel_pending();
        if self.state.is_running() {
            tracing::info!(
                generation = self.state.generation,
                elapsed = self.state.elapsed_seconds,
                "session stopped"
            );
        }
        self.state.reset();
    }

    fn begin(&mut self) {
        self.player.cancel_pending();
        self.state.begin();
        tracing::info!(
            generation = self.state.generation,
            length = self.state.session_length_seconds,
            "session started"
        );
    }

    /// Advance the session clock by one second. Ignored while idle.
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !self.state.advance() {
            return outcome;
        }

        let elapsed = self.state.elapsed_seconds;
        outcome.elapsed = elapsed;

        if let Some(cue) = self.plan.cue_at(elapsed) {
            tracing::debug!(elapsed, repeat = cue.repeat_count, "cue due");
            outcome.failure = self.ring(cue.repeat_count).err().map(CueFailed);
            outcome.cue = Some(cue);
        }

        if self.state.is_complete() {
            // The terminal cue was just requested; let it ring out.
            tracing::info!(generation = self.state.generation, "session complete");
            self.state.reset();
            outcome.completed = true;
        }

        outcome
    }

    fn ring(&mut self, repeat: u32) -> Result<(), PlaybackError> {
        let result = if repeat == 1 {
            self.player.play_once()
        } else {
            self.player.play_repeated(repeat, self.repeat_gap)
        };
        if let Err(err) = &result {
            tracing::warn!(error = %err, repeat, "bell failed, session continues");
        }
        result
    }

    pub fn is_enabled(&self, kind: TriggerKind) -> bool {
        kind == TriggerKind::Manual || (self.toggles.get(kind) && !self.denied.contains(&kind))
    }

    pub fn toggles(&self) -> TriggerToggles {
        self.toggles
    }

    pub fn enable(&mut self, kind: TriggerKind) -> Result<(), TriggerError> {
        if kind != TriggerKind::Manual && self.denied.contains(&kind) {
            tracing::warn!(%kind, "cannot enable trigger without permission");
            return Err(TriggerError::PermissionDenied(kind));
        }
        self.toggles.set(kind, true);
        Ok(())
    }

    pub fn disable(&mut self, kind: TriggerKind) {
        self.toggles.set(kind, false);
    }

    /// Flip a detector kind on or off. Returns the new enabled state.
    pub fn toggle(&mut self, kind: TriggerKind) -> Result<bool, TriggerError> {
        if self.is_enabled(kind) && kind != TriggerKind::Manual {
            self.disable(kind);
            Ok(false)
        } else {
            self.enable(kind).map(|()| true)
        }
    }

    /// A denied kind is switched off and stays non-firing until granted again.
    pub fn set_permission(&mut self, kind: TriggerKind, permission: Permission) {
        if kind == TriggerKind::Manual {
            return;
        }
        match permission {
            Permission::Granted => {
                self.denied.remove(&kind);
            }
            Permission::Denied => {
                tracing::warn!(%kind, "trigger permission denied");
                self.denied.insert(kind);
                self.toggles.set(kind, false);
            }
        }
    }

    pub fn permission(&self, kind: TriggerKind) -> Permission {
        if self.denied.contains(&kind) {
            Permission::Denied
        } else {
            Permission::Granted
        }
    }

    /// Accept an event if its kind is enabled and out of cooldown: ring one
    /// bell and post a short-lived message. Everything else is dropped.
    pub fn on_trigger_event(&mut self, event: TriggerEvent) -> TriggerOutcome {
        if !self.is_enabled(event.kind) {
            return TriggerOutcome::Disabled;
        }

        if let Some(last) = self.last_accepted.get(&event.kind) {
            if event.timestamp.saturating_duration_since(*last) < self.cooldown {
                tracing::trace!(kind = %event.kind, "trigger dropped during cooldown");
                return TriggerOutcome::CoolingDown;
            }
        }
        self.last_accepted.insert(event.kind, event.timestamp);

        let text = format!("{} detected", event.kind);
        tracing::info!(kind = %event.kind, elapsed = self.state.elapsed_seconds, "trigger accepted");
        self.message = Some(TriggerMessage {
            text: text.clone(),
            expires_at: event.timestamp + self.message_ttl,
        });

        TriggerOutcome::Accepted {
            kind: event.kind,
            message: text,
            failure: self.ring(1).err().map(CueFailed),
        }
    }

    pub fn trigger_message(&self, now: Instant) -> Option<&str> {
        self.message
            .as_ref()
            .filter(|m| now < m.expires_at)
            .map(|m| m.text.as_str())
    }

    pub fn expire_message(&mut self, now: Instant) {
        if self.message.as_ref().is_some_and(|m| now >= m.expires_at) {
            self.message = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Once,
        Repeated(u32, Duration),
        Cancel,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        fail: bool,
    }

    impl Recorder {
        fn plays(&self) -> Vec<&Call> {
            self.calls.iter().filter(|c| **c != Call::Cancel).collect()
        }
    }

    impl SoundPlayer for Recorder {
        fn play_once(&mut self) -> Result<(), PlaybackError> {
            self.calls.push(Call::Once);
            if self.fail {
                Err(PlaybackError::Output("muted".into()))
            } else {
                Ok(())
            }
        }

        fn play_repeated(&mut self, n: u32, gap: Duration) -> Result<(), PlaybackError> {
            self.calls.push(Call::Repeated(n, gap));
            Ok(())
        }

        fn cancel_pending(&mut self) {
            self.calls.push(Call::Cancel);
        }
    }

    fn timer(length: u64) -> SessionTimer<Recorder> {
        let plan = CuePlan::standard(length).unwrap();
        SessionTimer::new(TimerSettings::new(plan), Recorder::default())
    }

    #[test]
    fn starts_idle() {
        let t = timer(120);
        assert_eq!(t.status(), SessionStatus::Idle);
        assert_eq!(t.elapsed_seconds(), 0);
        assert_eq!(t.remaining_seconds(), 120);
    }

    #[test]
    fn tick_while_idle_does_nothing() {
        let mut t = timer(10);
        assert_eq!(t.tick(), TickOutcome::default());
        assert_eq!(t.elapsed_seconds(), 0);
        assert!(t.player().plays().is_empty());
    }

    #[test]
    fn opening_and_closing_bells() {
        let mut t = timer(10);
        t.start();
        let outcomes: Vec<TickOutcome> = (0..10).map(|_| t.tick()).collect();

        assert_eq!(outcomes[6].cue, Some(CueEntry::new(7, 1)));
        assert_eq!(outcomes[9].cue, Some(CueEntry::new(10, 2)));
        assert!(outcomes[9].completed);
        assert!(outcomes[..9].iter().all(|o| !o.completed));
        assert_eq!(
            t.player().plays(),
            vec![&Call::Once, &Call::Repeated(2, Duration::from_secs(1))]
        );
        assert_eq!(t.status(), SessionStatus::Idle);
        assert_eq!(t.elapsed_seconds(), 0);
    }

    #[test]
    fn completion_does_not_cancel_the_terminal_cue() {
        let mut t = timer(3);
        t.start();
        for _ in 0..3 {
            t.tick();
        }
        assert_eq!(t.player().calls.last(), Some(&Call::Repeated(2, DEFAULT_REPEAT_GAP)));
    }

    #[test]
    fn start_while_running_restarts() {
        let mut t = timer(60);
        t.start();
        for _ in 0..5 {
            t.tick();
        }
        let generation = t.state().generation;
        t.start();
        assert_eq!(t.status(), SessionStatus::Running);
        assert_eq!(t.elapsed_seconds(), 0);
        assert_eq!(t.state().generation, generation + 1);
    }

    #[test]
    fn stop_cancels_and_plays_nothing() {
        let mut t = timer(60);
        t.start();
        t.tick();
        t.stop();
        assert_eq!(t.status(), SessionStatus::Idle);
        assert_eq!(t.player().calls.last(), Some(&Call::Cancel));
        for _ in 0..60 {
            assert_eq!(t.tick(), TickOutcome::default());
        }
        assert!(t.player().plays().is_empty());
    }

    #[test]
    fn failed_bell_is_reported_and_session_continues() {
        let plan = CuePlan::standard(10).unwrap();
        let mut t = SessionTimer::new(
            TimerSettings::new(plan),
            Recorder {
                fail: true,
                ..Recorder::default()
            },
        );
        t.start();
        let outcomes: Vec<TickOutcome> = (0..10).map(|_| t.tick()).collect();
        assert_matches!(
            &outcomes[6].failure,
            Some(CueFailed(PlaybackError::Output(_)))
        );
        assert!(outcomes[9].completed);
    }

    #[test]
    fn disabled_kinds_are_dropped() {
        let mut t = timer(60);
        let now = Instant::now();
        assert_eq!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Hand, now)),
            TriggerOutcome::Disabled
        );
        assert!(t.player().plays().is_empty());
        assert_eq!(t.trigger_message(now), None);
    }

    #[test]
    fn manual_is_always_enabled() {
        let mut t = timer(60);
        let now = Instant::now();
        assert_matches!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Manual, now)),
            TriggerOutcome::Accepted { kind: TriggerKind::Manual, failure: None, .. }
        );
        assert_eq!(t.trigger_message(now), Some("Manual detected"));
    }

    #[test]
    fn cooldown_is_per_kind() {
        let mut t = timer(60);
        t.enable(TriggerKind::Clap).unwrap();
        t.enable(TriggerKind::Hand).unwrap();
        let t0 = Instant::now();

        assert_matches!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Clap, t0)),
            TriggerOutcome::Accepted { .. }
        );
        assert_matches!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Hand, t0 + Duration::from_millis(500))),
            TriggerOutcome::Accepted { .. }
        );
        assert_eq!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Clap, t0 + Duration::from_secs(2))),
            TriggerOutcome::CoolingDown
        );
        assert_matches!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Clap, t0 + Duration::from_secs(3))),
            TriggerOutcome::Accepted { .. }
        );
        assert_eq!(t.player().plays().len(), 3);
    }

    #[test]
    fn message_expires() {
        let mut t = timer(60);
        let t0 = Instant::now();
        t.on_trigger_event(TriggerEvent::new(TriggerKind::Manual, t0));
        assert_eq!(
            t.trigger_message(t0 + Duration::from_millis(2999)),
            Some("Manual detected")
        );
        assert_eq!(t.trigger_message(t0 + Duration::from_secs(3)), None);

        t.expire_message(t0 + Duration::from_secs(1));
        assert!(t.message.is_some());
        t.expire_message(t0 + Duration::from_secs(3));
        assert!(t.message.is_none());
    }

    #[test]
    fn denied_permission_disables_and_blocks_enable() {
        let mut t = timer(60);
        t.enable(TriggerKind::Hand).unwrap();
        t.set_permission(TriggerKind::Hand, Permission::Denied);

        assert!(!t.is_enabled(TriggerKind::Hand));
        assert_eq!(
            t.enable(TriggerKind::Hand),
            Err(TriggerError::PermissionDenied(TriggerKind::Hand))
        );
        assert_eq!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Hand, Instant::now())),
            TriggerOutcome::Disabled
        );

        t.set_permission(TriggerKind::Hand, Permission::Granted);
        assert_eq!(t.permission(TriggerKind::Hand), Permission::Granted);
        assert!(!t.is_enabled(TriggerKind::Hand));
        assert_eq!(t.toggle(TriggerKind::Hand), Ok(true));
        assert!(t.is_enabled(TriggerKind::Hand));
        assert_eq!(t.toggle(TriggerKind::Hand), Ok(false));
    }

    #[test]
    fn manual_permission_cannot_be_denied() {
        let mut t = timer(60);
        t.set_permission(TriggerKind::Manual, Permission::Denied);
        assert!(t.is_enabled(TriggerKind::Manual));
    }

    #[test]
    fn trigger_bell_failure_is_non_fatal() {
        let plan = CuePlan::standard(60).unwrap();
        let mut t = SessionTimer::new(
            TimerSettings::new(plan),
            Recorder {
                fail: true,
                ..Recorder::default()
            },
        );
        t.start();
        assert_matches!(
            t.on_trigger_event(TriggerEvent::new(TriggerKind::Manual, Instant::now())),
            TriggerOutcome::Accepted { failure: Some(_), .. }
        );
        assert_eq!(t.tick().elapsed, 1);
    }
}
