use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{RenderError, RenderResult};

pub const FFPROBE_ENV: &str = "REELSMITH_FFPROBE";

/// Read-only questions asked about media files before compilation.
pub trait MediaProbe: Send + Sync {
    fn duration(&self, path: &Path) -> RenderResult<f64>;

    fn has_audio(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::from_env()
    }
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_env() -> Self {
        let binary = std::env::var_os(FFPROBE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffprobe"));
        Self { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, path: &Path, args: &[&str]) -> RenderResult<String> {
        let output = Command::new(&self.binary)
            .args(["-v", "error"])
            .args(args)
            .arg(path)
            .output()
            .map_err(|err| {
                RenderError::EngineUnavailable(format!("{}: {err}", self.binary.display()))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::probe(path, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MediaProbe for FfprobeProbe {
    fn duration(&self, path: &Path) -> RenderResult<f64> {
        let stdout = self.run(
            path,
            &[
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ],
        )?;
        let duration = parse_duration(&stdout)
            .ok_or_else(|| RenderError::probe(path, format!("unreadable duration {stdout:?}")))?;
        debug!(path = %path.display(), duration, "ffprobe duration");
        Ok(duration)
    }

    fn has_audio(&self, path: &Path) -> bool {
        match self.run(
            path,
            &[
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ],
        ) {
            Ok(stdout) => !stdout.trim().is_empty(),
            Err(err) => {
                warn!(path = %path.display(), "Audio stream check failed: {err}");
                false
            }
        }
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    let value: f64 = stdout.lines().next()?.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}
