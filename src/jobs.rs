use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::pipeline::{RenderOptions, RenderPipeline};
use crate::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    #[serde(skip)]
    seq: u64,
    pub timeline: PathBuf,
    pub output: PathBuf,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Shared job table. Clones refer to the same jobs.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<BTreeMap<String, JobRecord>>>,
    counter: Arc<AtomicU64>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, timeline: &Path, output: &Path) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let created_at = Utc::now();
        let id = job_id(timeline, seq, created_at);
        let record = JobRecord {
            id: id.clone(),
            seq,
            timeline: timeline.to_path_buf(),
            output: output.to_path_buf(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Queued".into(),
            error: None,
            total_duration: None,
            created_at,
            completed_at: None,
        };
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(id.clone(), record);
        }
        id
    }

    pub fn update(&self, id: &str, progress: u8, message: impl Into<String>) {
        self.with_job(id, |job| {
            job.status = JobStatus::Processing;
            job.progress = progress.min(99);
            job.message = message.into();
        });
    }

    pub fn complete(&self, id: &str, total_duration: f64) {
        self.with_job(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.message = "Export complete".into();
            job.total_duration = Some(total_duration);
            job.completed_at = Some(Utc::now());
        });
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        let error = error.into();
        self.with_job(id, |job| {
            job.status = JobStatus::Failed;
            job.message = format!("Export failed: {error}");
            job.error = Some(error);
            job.completed_at = Some(Utc::now());
        });
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.lock().ok()?.get(id).cloned()
    }

    /// Jobs in submission order.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .lock()
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default();
        jobs.sort_by_key(|job| job.seq);
        jobs
    }

    fn with_job(&self, id: &str, apply: impl FnOnce(&mut JobRecord)) {
        match self.jobs.lock() {
            Ok(mut jobs) => match jobs.get_mut(id) {
                Some(job) => apply(job),
                None => warn!(job = id, "Unknown job"),
            },
            Err(_) => warn!(job = id, "Job table poisoned"),
        }
    }
}

fn job_id(timeline: &Path, seq: u64, created_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timeline.to_string_lossy().as_bytes());
    hasher.update(seq.to_le_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// `export_<timestamp>_<stem>.mp4`, used when only an output directory is given.
pub fn export_file_name(timeline: &Path, at: DateTime<Utc>) -> String {
    let stem = timeline
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "timeline".to_string());
    format!("export_{}_{stem}.mp4", at.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub timeline: PathBuf,
    pub output: PathBuf,
}

/// Render every request concurrently, one job and one thread each.
///
/// Returns the final job records in request order.
pub fn render_batch(
    pipeline: &RenderPipeline,
    store: &JobStore,
    requests: &[RenderRequest],
    options: &RenderOptions,
) -> Vec<JobRecord> {
    let ids: Vec<String> = requests
        .iter()
        .map(|request| store.submit(&request.timeline, &request.output))
        .collect();

    std::thread::scope(|scope| {
        for (request, id) in requests.iter().zip(&ids) {
            scope.spawn(move || run_job(pipeline, store, id, request, options));
        }
    });

    ids.iter().filter_map(|id| store.get(id)).collect()
}

fn run_job(
    pipeline: &RenderPipeline,
    store: &JobStore,
    id: &str,
    request: &RenderRequest,
    options: &RenderOptions,
) {
    store.update(id, 10, "Loading timeline");
    let timeline = match Timeline::load(&request.timeline) {
        Ok(timeline) => timeline,
        Err(err) => {
            store.fail(id, format!("{err:#}"));
            return;
        }
    };

    store.update(id, 30, "Rendering video");
    match pipeline.render(&timeline, &request.output, options) {
        Ok(outcome) => {
            info!(job = id, output = %outcome.output.display(), "Job complete");
            store.complete(id, outcome.total_duration);
        }
        Err(err) => store.fail(id, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward() {
        let store = JobStore::new();
        let id = store.submit(Path::new("a.yaml"), Path::new("a.mp4"));
        assert_eq!(id.len(), 12);
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Queued);

        store.update(&id, 150, "Rendering");
        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 99);

        store.complete(&id, 12.0);
        let job = store.get(&id).unwrap();
        assert!(job.status.is_finished());
        assert_eq!(job.progress, 100);
        assert_eq!(job.total_duration, Some(12.0));
    }

    #[test]
    fn failure_keeps_error_text() {
        let store = JobStore::new();
        let id = store.submit(Path::new("b.yaml"), Path::new("b.mp4"));
        store.fail(&id, "input not found: x.mp4");
        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("input not found: x.mp4"));
        assert!(job.message.contains("x.mp4"));
    }

    #[test]
    fn ids_are_unique_per_submission() {
        let store = JobStore::new();
        let a = store.submit(Path::new("same.yaml"), Path::new("out.mp4"));
        let b = store.submit(Path::new("same.yaml"), Path::new("out.mp4"));
        assert_ne!(a, b);
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn export_names_embed_timestamp_and_stem() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            export_file_name(Path::new("/x/promo.yaml"), at),
            "export_20240305_102030_promo.mp4"
        );
    }
}
