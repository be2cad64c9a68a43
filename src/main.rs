mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use gong::{
    app_dirs::AppDirs,
    config::{Config, ConfigError, ConfigStore, FileConfigStore},
    logging,
    playback::{BackgroundPlayer, PlaybackReport},
    runtime::{AppEvent, CrosstermEventSource, FixedTicker, Periodic, Runner},
    sound::{AssetBell, SoundPlayer, TerminalBell},
    timer::{SessionTimer, TriggerOutcome},
    trigger::{
        ManualTrigger, Permission, SimulatedDetector, TriggerKind, TriggerSet,
        DEFAULT_POLL_INTERVAL,
    },
    TICK_RATE_MS,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::{Duration, Instant},
};

/// terminal meditation timer with bell cues
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal meditation timer: an opening bell after a short delay, optional interval bells, a double bell at the end, and clap/hand triggers that ring on demand."
)]
pub struct Cli {
    /// session length in seconds
    #[clap(short = 'l', long)]
    length: Option<u64>,

    /// seconds before the opening bell (0 disables it)
    #[clap(short = 'd', long)]
    start_delay: Option<u64>,

    /// ring an extra bell every N seconds during the session
    #[clap(short = 'i', long)]
    interval: Option<u64>,

    /// start with the clap trigger enabled
    #[clap(long = "clap")]
    clap_trigger: bool,

    /// start with the hand trigger enabled
    #[clap(long = "hand")]
    hand_trigger: bool,

    /// detection probability per poll for the simulated clap/hand detectors
    #[clap(short = 'p', long)]
    probability: Option<f64>,

    /// bell asset to load for every cue (rings the terminal bell when omitted)
    #[clap(short = 'b', long)]
    bell: Option<PathBuf>,

    /// behave as if camera access was refused (hand trigger unavailable)
    #[clap(long)]
    deny_camera: bool,

    /// behave as if microphone access was refused (clap trigger unavailable)
    #[clap(long)]
    deny_microphone: bool,

    /// alternate config file
    #[clap(long)]
    config: Option<PathBuf>,

    /// write the effective preferences back to the config file on exit
    #[clap(long)]
    save: bool,

    /// debug-level logging
    #[clap(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    /// Flags override the stored preferences.
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(length) = self.length {
            cfg.session_length_secs = length;
        }
        if let Some(delay) = self.start_delay {
            cfg.start_delay_secs = delay;
        }
        if self.interval.is_some() {
            cfg.interval_secs = self.interval;
        }
        if self.clap_trigger {
            cfg.clap_trigger = true;
        }
        if self.hand_trigger {
            cfg.hand_trigger = true;
        }
        if let Some(p) = self.probability {
            cfg.detection_probability = p;
        }
        if self.bell.is_some() {
            cfg.bell_path = self.bell.clone();
        }
        cfg
    }

    fn permission(denied: bool) -> Permission {
        if denied {
            Permission::Denied
        } else {
            Permission::Granted
        }
    }

    fn triggers(&self, cfg: &Config) -> (TriggerSet, ManualTrigger) {
        let manual = ManualTrigger::new();
        let set = TriggerSet::new()
            .with(manual.clone(), Duration::ZERO)
            .with(
                SimulatedDetector::new(TriggerKind::Clap, cfg.detection_probability)
                    .with_permission(Self::permission(self.deny_microphone)),
                DEFAULT_POLL_INTERVAL,
            )
            .with(
                SimulatedDetector::new(TriggerKind::Hand, cfg.detection_probability)
                    .with_permission(Self::permission(self.deny_camera)),
                DEFAULT_POLL_INTERVAL,
            );
        (set, manual)
    }

    fn player(&self, cfg: &Config) -> Box<dyn SoundPlayer + Send> {
        match &cfg.bell_path {
            Some(path) => Box::new(AssetBell::stdout(path)),
            None => Box::new(TerminalBell::stdout()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Quit,
}

pub struct App<P: SoundPlayer> {
    pub timer: SessionTimer<P>,
    pub triggers: TriggerSet,
    pub manual: ManualTrigger,
    pub clock: Periodic,
    pub config: Config,
    /// Last non-fatal problem worth showing (failed bell, denied trigger).
    pub notice: Option<String>,
    pub now: Instant,
}

impl<P: SoundPlayer> App<P> {
    pub fn new(
        config: Config,
        player: P,
        triggers: TriggerSet,
        manual: ManualTrigger,
    ) -> Result<Self, ConfigError> {
        let mut timer = SessionTimer::new(config.timer_settings()?, player);
        for kind in TriggerKind::ALL {
            timer.set_permission(kind, triggers.permission(kind));
        }

        Ok(Self {
            timer,
            triggers,
            manual,
            clock: Periodic::new(Duration::from_secs(1)),
            config,
            notice: None,
            now: Instant::now(),
        })
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> KeyAction {
        if key.kind != KeyEventKind::Press {
            return KeyAction::Continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return KeyAction::Quit;
        }

        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return KeyAction::Quit,
            KeyCode::Enter | KeyCode::Char(' ') => {
                self.timer.start();
                self.clock.reset(now);
                self.notice = None;
            }
            KeyCode::Char('s') => {
                self.timer.stop();
                self.clock.cancel();
            }
            KeyCode::Char('c') => self.toggle(TriggerKind::Clap),
            KeyCode::Char('h') => self.toggle(TriggerKind::Hand),
            KeyCode::Char('m') => self.manual.press(),
            _ => {}
        }
        KeyAction::Continue
    }

    fn toggle(&mut self, kind: TriggerKind) {
        if let Err(err) = self.timer.toggle(kind) {
            self.notice = Some(err.to_string());
        }
    }

    /// Advance the session clock and the trigger poll loop to `now`.
    pub fn on_step(&mut self, now: Instant) {
        self.now = now;

        if self.timer.state().is_running() {
            for _ in 0..self.clock.due(now) {
                let outcome = self.timer.tick();
                if let Some(failure) = outcome.failure {
                    self.notice = Some(failure.to_string());
                }
                if outcome.completed {
                    self.clock.cancel();
                    break;
                }
            }
        }

        for event in self.triggers.poll(now) {
            if let TriggerOutcome::Accepted {
                failure: Some(failure),
                ..
            } = self.timer.on_trigger_event(event)
            {
                self.notice = Some(failure.to_string());
            }
        }

        self.timer.expire_message(now);
    }

    /// Startup config plus the toggles as they are now.
    pub fn effective_config(&self) -> Config {
        let toggles = self.timer.toggles();
        Config {
            clap_trigger: toggles.clap,
            hand_trigger: toggles.hand,
            ..self.config.clone()
        }
    }
}

impl App<BackgroundPlayer> {
    /// Surface failures of bells that belong to the current session.
    pub fn on_playback_reports(&mut self, reports: Vec<PlaybackReport>) {
        let token = self.timer.player().token();
        for report in reports {
            if let Err(err) = report.result {
                if !token.is_stale(report.generation) {
                    self.notice = Some(format!("cue failed: {err}"));
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Some(path) = AppDirs::log_path() {
        logging::init_file_logging(&path, cli.verbose)?;
    }

    let store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let config = cli.apply(store.load());
    tracing::debug!(?config, "loaded configuration");

    let (triggers, manual) = cli.triggers(&config);
    let player = BackgroundPlayer::spawn(cli.player(&config));
    let mut app = App::new(config, player, triggers, manual)?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if cli.save {
        if let Err(err) = store.save(&app.effective_config()) {
            tracing::warn!(path = ?store.path(), error = %err, "could not save preferences");
        }
    }

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<BackgroundPlayer>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        if let AppEvent::Key(key) = runner.step() {
            if app.handle_key(key, Instant::now()) == KeyAction::Quit {
                break;
            }
        }

        app.on_step(Instant::now());
        let reports = app.timer.player().drain_reports();
        app.on_playback_reports(reports);
    }

    app.timer.stop();
    Ok(())
}
