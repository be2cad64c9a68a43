// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod config;
pub mod cue_plan;
pub mod logging;
pub mod playback;
pub mod runtime;
pub mod session;
pub mod sound;
pub mod timer;
pub mod trigger;

/// How often the runner wakes when no terminal event arrives.
pub const TICK_RATE_MS: u64 = 100;
