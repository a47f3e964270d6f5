use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, error, info, warn};

use crate::compile::{CompiledProgram, ProgramInput};
use crate::error::{RenderError, RenderResult};
use crate::graph::seconds;

pub const FFMPEG_ENV: &str = "REELSMITH_FFMPEG";

/// Runs a compiled program to completion.
pub trait MediaEngine: Send + Sync {
    fn execute(&self, program: &CompiledProgram, output: &Path) -> RenderResult<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: PathBuf,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::from_env()
    }
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_env() -> Self {
        let binary = std::env::var_os(FFMPEG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        Self { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl MediaEngine for FfmpegEngine {
    fn execute(&self, program: &CompiledProgram, output: &Path) -> RenderResult<()> {
        ensure_parent_dir(output)?;
        let args = build_args(program, output);
        info!("Starting {}: {:?}", self.binary.display(), args);

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                RenderError::EngineUnavailable(format!("{}: {err}", self.binary.display()))
            })?;

        if !result.status.success() {
            let diagnostic = String::from_utf8_lossy(&result.stderr).into_owned();
            error!(status = %result.status, output = %output.display(), "Engine failed");
            discard_partial_output(output);
            return Err(RenderError::EngineExecution {
                status: result.status.to_string(),
                diagnostic,
            });
        }
        debug!(output = %output.display(), "Engine finished");
        Ok(())
    }
}

fn discard_partial_output(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => debug!(output = %output.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(output = %output.display(), "Failed to remove partial output: {err}"),
    }
}

/// Full ffmpeg argument list for `program`, ending with the output path.
pub fn build_args(program: &CompiledProgram, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into()];

    for input in &program.inputs {
        match input {
            ProgramInput::File { path } => {
                args.push("-i".into());
                args.push(path.clone().into_os_string());
            }
            ProgramInput::BlackCanvas {
                width,
                height,
                fps,
                duration,
            } => {
                args.extend(["-f".into(), "lavfi".into(), "-i".into()]);
                args.push(
                    format!(
                        "color=c=black:s={width}x{height}:r={fps}:d={}",
                        seconds(*duration)
                    )
                    .into(),
                );
            }
            ProgramInput::ImageSequence { pattern, framerate } => {
                args.push("-framerate".into());
                args.push(framerate.to_string().into());
                args.push("-i".into());
                args.push(pattern.clone().into_os_string());
            }
        }
    }

    if !program.graph.is_empty() {
        args.push("-filter_complex".into());
        args.push(program.filtergraph().into());
    }

    args.push("-map".into());
    args.push(program.video_output.map_arg().into());
    match &program.audio_output {
        Some(audio) => {
            args.push("-map".into());
            args.push(audio.map_arg().into());
        }
        None => args.push("-an".into()),
    }

    let encode = &program.encode;
    args.push("-c:v".into());
    args.push(encode.video_codec.clone().into());
    if let Some(format) = &encode.pixel_format {
        args.push("-pix_fmt".into());
        args.push(format.clone().into());
    }
    if let Some(preset) = &encode.preset {
        args.push("-preset".into());
        args.push(preset.clone().into());
    }
    args.push("-crf".into());
    args.push(encode.crf.to_string().into());
    if program.has_audio() {
        args.push("-c:a".into());
        args.push(encode.audio_codec.clone().into());
        args.push("-b:a".into());
        args.push(encode.audio_bitrate.clone().into());
    }
    if encode.faststart {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
    if encode.truncate_to_shortest {
        args.push("-shortest".into());
    }
    args.push(output.as_os_str().to_os_string());
    args
}

/// Shell-style rendering of an invocation, for `plan` output and logs.
pub fn command_line(binary: &Path, args: &[OsString]) -> String {
    std::iter::once(binary.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|arg| {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains([' ', ';', '[', '(', '\'', '"']) {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn ensure_parent_dir(path: &Path) -> RenderResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
