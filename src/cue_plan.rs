use thiserror::Error;

/// Seconds into the session at which the opening bell sounds.
pub const DEFAULT_START_DELAY_SECS: u64 = 7;
/// Number of bells rung when the session ends.
pub const TERMINAL_REPEAT: u32 = 2;

/// One scheduled cue: ring `repeat_count` bells once `offset_secs` have elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueEntry {
    pub offset_secs: u64,
    pub repeat_count: u32,
}

impl CueEntry {
    pub fn new(offset_secs: u64, repeat_count: u32) -> Self {
        Self {
            offset_secs,
            repeat_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("session length must be greater than zero")]
    ZeroLength,
    #[error("cue at offset {offset}s is outside the session (1..={length}s)")]
    OffsetOutOfRange { offset: u64, length: u64 },
    #[error("cue at offset {0}s has a repeat count of zero")]
    ZeroRepeat(u64),
    #[error("interval must be greater than zero")]
    ZeroInterval,
}

/// Ordered, immutable schedule of cues for one session length. Periodic
/// interval cues are resolved on lookup rather than stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuePlan {
    session_length_secs: u64,
    entries: Vec<CueEntry>,
    interval: Option<CueEntry>,
}

impl CuePlan {
    /// Build a plan from `(offset_secs, repeat_count)` pairs. Entries are
    /// sorted by offset and entries sharing an offset are merged, keeping the
    /// larger repeat count.
    pub fn new<I>(session_length_secs: u64, entries: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = (u64, u32)>,
    {
        if session_length_secs == 0 {
            return Err(PlanError::ZeroLength);
        }

        let mut plan = Self {
            session_length_secs,
            entries: Vec::new(),
            interval: None,
        };
        for (offset_secs, repeat_count) in entries {
            plan.insert(CueEntry::new(offset_secs, repeat_count))?;
        }
        Ok(plan)
    }

    /// Opening bell after the start delay, double bell at the end.
    pub fn standard(session_length_secs: u64) -> Result<Self, PlanError> {
        Self::with_start_delay(session_length_secs, DEFAULT_START_DELAY_SECS)
    }

    /// A start delay of zero, or one that lands at or past the end, drops the
    /// opening bell and keeps only the terminal cue.
    pub fn with_start_delay(
        session_length_secs: u64,
        start_delay_secs: u64,
    ) -> Result<Self, PlanError> {
        let mut entries = Vec::with_capacity(2);
        if start_delay_secs > 0 && start_delay_secs < session_length_secs {
            entries.push((start_delay_secs, 1));
        }
        entries.push((session_length_secs, TERMINAL_REPEAT));
        Self::new(session_length_secs, entries)
    }

    /// Ring at every multiple of `every_secs` strictly before the session end,
    /// replacing any earlier interval. Where an explicit entry shares the
    /// offset, the larger repeat count wins.
    pub fn with_interval(mut self, every_secs: u64, repeat_count: u32) -> Result<Self, PlanError> {
        if every_secs == 0 {
            return Err(PlanError::ZeroInterval);
        }
        if repeat_count == 0 {
            return Err(PlanError::ZeroRepeat(every_secs));
        }
        self.interval = Some(CueEntry::new(every_secs, repeat_count));
        Ok(self)
    }

    fn insert(&mut self, entry: CueEntry) -> Result<(), PlanError> {
        if entry.offset_secs == 0 || entry.offset_secs > self.session_length_secs {
            return Err(PlanError::OffsetOutOfRange {
                offset: entry.offset_secs,
                length: self.session_length_secs,
            });
        }
        if entry.repeat_count == 0 {
            return Err(PlanError::ZeroRepeat(entry.offset_secs));
        }

        match self
            .entries
            .binary_search_by_key(&entry.offset_secs, |e| e.offset_secs)
        {
            Ok(idx) => {
                let existing = &mut self.entries[idx];
                existing.repeat_count = existing.repeat_count.max(entry.repeat_count);
            }
            Err(idx) => self.entries.insert(idx, entry),
        }
        Ok(())
    }

    pub fn session_length_secs(&self) -> u64 {
        self.session_length_secs
    }

    /// Explicitly scheduled cues, without the periodic interval.
    pub fn entries(&self) -> &[CueEntry] {
        &self.entries
    }

    /// The periodic cue as `(every, repeat_count)` in `CueEntry` form.
    pub fn interval(&self) -> Option<CueEntry> {
        self.interval
    }

    pub fn cue_at(&self, offset_secs: u64) -> Option<CueEntry> {
        let explicit = self
            .entries
            .binary_search_by_key(&offset_secs, |e| e.offset_secs)
            .ok()
            .map(|idx| self.entries[idx].repeat_count);
        let periodic = self
            .interval
            .filter(|every| {
                offset_secs > 0
                    && offset_secs < self.session_length_secs
                    && offset_secs % every.offset_secs == 0
            })
            .map(|every| every.repeat_count);

        explicit
            .max(periodic)
            .map(|repeat_count| CueEntry::new(offset_secs, repeat_count))
    }

    pub fn terminal_cue(&self) -> Option<CueEntry> {
        self.cue_at(self.session_length_secs)
    }
}
