#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionStatus {
    Idle,
    Running,
}

/// Timeline of a single session. Only `SessionTimer` mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub elapsed_seconds: u64,
    pub session_length_seconds: u64,
    /// Bumped on every start/restart; in-flight cue requests tagged with an
    /// older generation are stale.
    pub generation: u64,
}

impl SessionState {
    pub fn new(session_length_seconds: u64) -> Self {
        Self {
            status: SessionStatus::Idle,
            elapsed_seconds: 0,
            session_length_seconds,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.session_length_seconds.saturating_sub(self.elapsed_seconds)
    }

    pub(crate) fn begin(&mut self) {
        self.status = SessionStatus::Running;
        self.elapsed_seconds = 0;
        self.generation += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.status = SessionStatus::Idle;
        self.elapsed_seconds = 0;
    }

    /// Advance one second. Returns false (and does nothing) while idle.
    pub(crate) fn advance(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.elapsed_seconds += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed_seconds >= self.session_length_seconds
    }
}
