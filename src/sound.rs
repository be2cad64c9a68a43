use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Gap between bells of a repeated cue.
pub const DEFAULT_REPEAT_GAP: Duration = Duration::from_secs(1);

const BEL: &[u8] = b"\x07";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("bell asset not found: {0}")]
    AssetMissing(PathBuf),
    #[error("bell asset {path} could not be read: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("bell asset {path} is not a supported audio file")]
    Decode { path: PathBuf },
    #[error("audio output permission denied")]
    PermissionDenied,
    #[error("audio output failed: {0}")]
    Output(String),
    #[error("playback worker is no longer running")]
    WorkerGone,
}

impl From<io::Error> for PlaybackError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => PlaybackError::PermissionDenied,
            _ => PlaybackError::Output(err.to_string()),
        }
    }
}

/// How a repeated cue reacts to a failed bell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicy {
    pub stop_on_first_failure: bool,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            stop_on_first_failure: true,
        }
    }
}

/// Renders one-shot audio cues.
pub trait SoundPlayer {
    fn play_once(&mut self) -> Result<(), PlaybackError>;

    fn policy(&self) -> PlaybackPolicy {
        PlaybackPolicy::default()
    }

    /// Drop cues that were requested but have not rung yet.
    fn cancel_pending(&mut self) {}

    /// Ring `n` bells, waiting `gap` between them. Returns the first failure.
    fn play_repeated(&mut self, n: u32, gap: Duration) -> Result<(), PlaybackError> {
        let policy = self.policy();
        let mut first_err = None;

        for i in 0..n {
            if i > 0 && !gap.is_zero() {
                thread::sleep(gap);
            }
            if let Err(err) = self.play_once() {
                tracing::warn!(attempt = i + 1, of = n, error = %err, "bell failed");
                if policy.stop_on_first_failure {
                    return Err(err);
                }
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<P: SoundPlayer + ?Sized> SoundPlayer for Box<P> {
    fn play_once(&mut self) -> Result<(), PlaybackError> {
        (**self).play_once()
    }

    fn policy(&self) -> PlaybackPolicy {
        (**self).policy()
    }

    fn play_repeated(&mut self, n: u32, gap: Duration) -> Result<(), PlaybackError> {
        (**self).play_repeated(n, gap)
    }

    fn cancel_pending(&mut self) {
        (**self).cancel_pending()
    }
}

/// Rings the terminal bell on the wrapped writer.
pub struct TerminalBell<W: Write> {
    out: W,
    policy: PlaybackPolicy,
}

impl TerminalBell<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            policy: PlaybackPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PlaybackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SoundPlayer for TerminalBell<W> {
    fn play_once(&mut self) -> Result<(), PlaybackError> {
        self.out.write_all(BEL)?;
        self.out.flush()?;
        Ok(())
    }

    fn policy(&self) -> PlaybackPolicy {
        self.policy
    }
}

/// An audio asset held only for the duration of a single play.
struct LoadedCue<'a> {
    path: &'a Path,
    bytes: Vec<u8>,
}

impl<'a> LoadedCue<'a> {
    fn load(path: &'a Path) -> Result<Self, PlaybackError> {
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => PlaybackError::AssetMissing(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => PlaybackError::PermissionDenied,
            _ => PlaybackError::Unreadable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
        })?;

        if !looks_like_audio(&bytes) {
            return Err(PlaybackError::Decode {
                path: path.to_path_buf(),
            });
        }
        Ok(Self { path, bytes })
    }
}

impl Drop for LoadedCue<'_> {
    fn drop(&mut self) {
        tracing::trace!(path = ?self.path, bytes = self.bytes.len(), "released bell asset");
    }
}

// Container sniffing only; actual decoding happens outside this crate.
fn looks_like_audio(bytes: &[u8]) -> bool {
    let riff_wave = bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE";
    let ogg = bytes.starts_with(b"OggS");
    let flac = bytes.starts_with(b"fLaC");
    let id3 = bytes.starts_with(b"ID3");
    let mpeg_frame = bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0;
    riff_wave || ogg || flac || id3 || mpeg_frame
}

/// Loads the bell asset from disk for every play, then rings the terminal
/// bell. Missing or corrupt assets surface as playback errors.
pub struct AssetBell<W: Write> {
    path: PathBuf,
    bell: TerminalBell<W>,
}

impl AssetBell<io::Stdout> {
    pub fn stdout<P: AsRef<Path>>(path: P) -> Self {
        Self::new(path, io::stdout())
    }
}

impl<W: Write> AssetBell<W> {
    pub fn new<P: AsRef<Path>>(path: P, out: W) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            bell: TerminalBell::new(out),
        }
    }

    pub fn with_policy(mut self, policy: PlaybackPolicy) -> Self {
        self.bell = self.bell.with_policy(policy);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_inner(self) -> W {
        self.bell.into_inner()
    }
}

impl<W: Write> SoundPlayer for AssetBell<W> {
    fn play_once(&mut self) -> Result<(), PlaybackError> {
        let _cue = LoadedCue::load(&self.path)?;
        self.bell.play_once()
    }

    fn policy(&self) -> PlaybackPolicy {
        self.bell.policy()
    }
}
