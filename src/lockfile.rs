use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::compile::{CompiledProgram, ProgramInput};
use crate::error::RenderResult;
use crate::graph::FilterStage;

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgramLock {
    pub timeline_version: u32,
    pub generated_at: DateTime<Utc>,
    pub fingerprint: String,
    pub total_duration: f64,
    pub inputs: Vec<String>,
    pub stages: Vec<StageLock>,
    pub filtergraph: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageLock {
    pub output: String,
    pub params_hash: String,
}

/// SHA-256 over the program's canonical JSON form.
pub fn fingerprint(program: &CompiledProgram) -> RenderResult<String> {
    let serialized = serde_json::to_vec(program)?;
    Ok(format!("{:x}", Sha256::digest(serialized)))
}

pub fn build_lock(timeline_version: u32, program: &CompiledProgram) -> RenderResult<ProgramLock> {
    let stages = program
        .stages()
        .iter()
        .map(|stage| {
            Ok(StageLock {
                output: stage.output.clone(),
                params_hash: hash_stage(stage)?,
            })
        })
        .collect::<RenderResult<Vec<_>>>()?;

    Ok(ProgramLock {
        timeline_version,
        generated_at: Utc::now(),
        fingerprint: fingerprint(program)?,
        total_duration: program.total_duration,
        inputs: program.inputs.iter().map(describe_input).collect(),
        stages,
        filtergraph: program.filtergraph(),
    })
}

pub fn write_lock(lock: &ProgramLock, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create lockfile: {}", path.display()))?;
    serde_yaml::to_writer(file, lock)
        .with_context(|| format!("Failed to write lockfile: {}", path.display()))?;
    Ok(())
}

pub fn read_lock(path: &Path) -> Result<ProgramLock> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lockfile: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse lockfile: {}", path.display()))
}

fn hash_stage(stage: &FilterStage) -> RenderResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(stage.output.as_bytes());
    hasher.update(serde_json::to_vec(&stage.inputs)?);
    hasher.update(serde_json::to_vec(&stage.ops)?);
    Ok(format!("{:x}", hasher.finalize()))
}

fn describe_input(input: &ProgramInput) -> String {
    match input {
        ProgramInput::File { path } => path.display().to_string(),
        ProgramInput::BlackCanvas {
            width,
            height,
            fps,
            duration,
        } => format!("black {width}x{height}@{fps} for {duration:.3}s"),
        ProgramInput::ImageSequence { pattern, framerate } => {
            format!("{} @ {framerate}fps", pattern.display())
        }
    }
}
