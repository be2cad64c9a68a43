use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use gong::cue_plan::{CueEntry, CuePlan};
use gong::session::SessionStatus;
use gong::sound::{PlaybackError, SoundPlayer};
use gong::timer::{CueFailed, SessionTimer, TimerSettings, TriggerOutcome};
use gong::trigger::{TriggerEvent, TriggerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Play {
    Once { at: u64 },
    Repeated { at: u64, n: u32, gap: Duration },
}

/// Records plays against the elapsed second the test says it is.
#[derive(Default)]
struct Log {
    now: u64,
    plays: Vec<Play>,
    fail_once: bool,
}

impl SoundPlayer for Log {
    fn play_once(&mut self) -> Result<(), PlaybackError> {
        self.plays.push(Play::Once { at: self.now });
        if self.fail_once {
            return Err(PlaybackError::Decode {
                path: "bell.wav".into(),
            });
        }
        Ok(())
    }

    fn play_repeated(&mut self, n: u32, gap: Duration) -> Result<(), PlaybackError> {
        self.plays.push(Play::Repeated {
            at: self.now,
            n,
            gap,
        });
        Ok(())
    }
}

fn timer_with(plan: CuePlan, player: Log) -> SessionTimer<Log> {
    SessionTimer::new(TimerSettings::new(plan), player)
}

fn tick(timer: &mut SessionTimer<Log>) -> gong::timer::TickOutcome {
    timer.player_mut().now += 1;
    timer.tick()
}

#[test]
fn every_length_completes_after_exactly_that_many_ticks() {
    for length in [1u64, 2, 7, 8, 30, 120] {
        let mut timer = timer_with(CuePlan::standard(length).unwrap(), Log::default());
        timer.start();

        let mut terminal_cues = 0;
        for i in 1..=length {
            assert_eq!(timer.status(), SessionStatus::Running, "length {length}");
            let outcome = tick(&mut timer);
            if outcome.cue.is_some_and(|c| c.offset_secs == length) {
                terminal_cues += 1;
            }
            assert_eq!(outcome.completed, i == length);
        }

        assert_eq!(timer.status(), SessionStatus::Idle);
        assert_eq!(terminal_cues, 1);
        let repeated = timer
            .player()
            .plays
            .iter()
            .filter(|p| matches!(p, Play::Repeated { n: 2, .. }))
            .count();
        assert_eq!(repeated, 1, "length {length}");
    }
}

#[test]
fn standard_two_minute_session() {
    let mut timer = timer_with(CuePlan::standard(120).unwrap(), Log::default());
    timer.start();
    for _ in 0..120 {
        tick(&mut timer);
    }

    assert_eq!(
        timer.player().plays,
        vec![
            Play::Once { at: 7 },
            Play::Repeated {
                at: 120,
                n: 2,
                gap: Duration::from_secs(1)
            },
        ]
    );
    assert_eq!(timer.status(), SessionStatus::Idle);
    assert_eq!(timer.elapsed_seconds(), 0);
}

#[test]
fn restart_mid_session_resets_and_skips_the_current_offset() {
    let plan = CuePlan::new(120, [(7, 1), (50, 1), (120, 2)]).unwrap();
    let mut timer = timer_with(plan, Log::default());
    timer.start();
    for _ in 0..49 {
        tick(&mut timer);
    }
    assert_eq!(timer.elapsed_seconds(), 49);

    timer.restart();
    assert_eq!(timer.status(), SessionStatus::Running);
    assert_eq!(timer.elapsed_seconds(), 0);

    // Nothing rings for the cue that was about to fire at 50.
    let outcome = tick(&mut timer);
    assert_eq!(outcome.elapsed, 1);
    assert_eq!(outcome.cue, None);
    assert_eq!(timer.player().plays, vec![Play::Once { at: 7 }]);
}

#[test]
fn opening_bell_rings_again_only_after_seven_fresh_ticks() {
    let mut timer = timer_with(CuePlan::standard(120).unwrap(), Log::default());
    timer.start();
    for _ in 0..50 {
        tick(&mut timer);
    }
    timer.restart();

    for _ in 0..6 {
        assert_eq!(tick(&mut timer).cue, None);
    }
    assert_eq!(timer.player().plays.len(), 1);
    assert_eq!(tick(&mut timer).cue, Some(CueEntry::new(7, 1)));
    assert_eq!(
        timer.player().plays,
        vec![Play::Once { at: 7 }, Play::Once { at: 57 }]
    );
}

#[test]
fn nothing_rings_after_stop() {
    let mut timer = timer_with(CuePlan::standard(120).unwrap(), Log::default());
    timer.start();
    for _ in 0..3 {
        tick(&mut timer);
    }
    timer.stop();

    for _ in 0..200 {
        tick(&mut timer);
    }
    assert!(timer.player().plays.is_empty());
    assert_eq!(timer.elapsed_seconds(), 0);
}

#[test]
fn trigger_cooldown_accepts_again_after_three_seconds() {
    let mut timer = timer_with(CuePlan::standard(120).unwrap(), Log::default());
    timer.enable(TriggerKind::Clap).unwrap();
    let t0 = Instant::now();

    assert_matches!(
        timer.on_trigger_event(TriggerEvent::new(TriggerKind::Clap, t0)),
        TriggerOutcome::Accepted { .. }
    );
    assert_eq!(
        timer.on_trigger_event(TriggerEvent::new(
            TriggerKind::Clap,
            t0 + Duration::from_millis(2900)
        )),
        TriggerOutcome::CoolingDown
    );
    assert_matches!(
        timer.on_trigger_event(TriggerEvent::new(
            TriggerKind::Clap,
            t0 + Duration::from_millis(3100)
        )),
        TriggerOutcome::Accepted { .. }
    );
    assert_eq!(timer.player().plays.len(), 2);
}

#[test]
fn failing_bell_does_not_stall_the_clock() {
    let player = Log {
        fail_once: true,
        ..Log::default()
    };
    let mut timer = timer_with(CuePlan::standard(120).unwrap(), player);
    timer.start();

    let mut failures = Vec::new();
    let mut completed_at = None;
    for i in 1..=120u64 {
        let outcome = tick(&mut timer);
        if let Some(failure) = outcome.failure {
            failures.push((i, failure));
        }
        if outcome.completed {
            completed_at = Some(i);
        }
    }

    assert_eq!(completed_at, Some(120));
    assert_eq!(failures.len(), 1);
    assert_matches!(&failures[0], (7, CueFailed(PlaybackError::Decode { .. })));
    assert_eq!(timer.status(), SessionStatus::Idle);
}

#[test]
fn interval_plan_rings_throughout_the_session() {
    let plan = CuePlan::standard(60).unwrap().with_interval(15, 1).unwrap();
    let mut timer = timer_with(plan, Log::default());
    timer.start();
    for _ in 0..60 {
        tick(&mut timer);
    }
    let onces: Vec<u64> = timer
        .player()
        .plays
        .iter()
        .filter_map(|p| match p {
            Play::Once { at } => Some(*at),
            Play::Repeated { .. } => None,
        })
        .collect();
    assert_eq!(onces, vec![7, 15, 30, 45]);
}
