//! Transfer jobs
//!
//! Downloads `url` to `path`. Starting a transfer spawns a background task
//! and moves the job to `Running`; later passes ask the in-flight table how
//! the task is doing. The task never writes the store itself, so the poll
//! loop stays the only writer of transfer jobs.
//!
//! A `Running` job with no entry in the table belongs to a task that no
//! longer exists (for example after a restart) and is failed. Entries of
//! jobs that left the transfer queue some other way (cancelled, purged)
//! are dropped after the next pass and their downloads aborted.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::JobPlugin;

pub const NAME: &str = "http";

const SUPPORTED_SCHEMES: &[&str] = &["http://", "https://", "file://"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum TransferStatus {
    InFlight,
    Finished(u64),
    Failed(String),
}

struct Transfer {
    status: TransferStatus,
    task: AbortHandle,
}

pub struct HttpTransferPlugin {
    client: reqwest::Client,
    transfers: Arc<Mutex<HashMap<Uuid, Transfer>>>,
}

impl HttpTransferPlugin {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            transfers: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for HttpTransferPlugin {
    fn default() -> Self {
        Self::new()
    }
}

struct TransferRequest {
    url: String,
    path: PathBuf,
}

fn transfer_request(job: &Job) -> Result<TransferRequest, String> {
    let url = job
        .param_str("url")
        .ok_or_else(|| "url parameter is missing".to_string())?;
    if !SUPPORTED_SCHEMES.iter().any(|s| url.starts_with(s)) {
        return Err(format!("unsupported transfer url: {}", url));
    }

    let path = job
        .param_str("path")
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| "path parameter is missing".to_string())?;

    Ok(TransferRequest {
        url: url.to_string(),
        path: PathBuf::from(path),
    })
}

async fn download(client: &reqwest::Client, url: &str, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if let Some(source) = url.strip_prefix("file://") {
        return tokio::fs::copy(source, path)
            .await
            .with_context(|| format!("Failed to copy {}", source));
    }

    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to request {}", url))?
        .error_for_status()?;

    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut bytes = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(bytes)
}

#[async_trait]
impl JobPlugin for HttpTransferPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::Transfer
    }

    async fn check_job(&self, job: &Job) -> Result<CheckOutcome> {
        match job.state {
            JobState::New => Ok(match transfer_request(job) {
                Ok(_) => CheckOutcome::Ready,
                Err(reason) => CheckOutcome::Failed(reason),
            }),
            JobState::Running => {
                let mut transfers = self.transfers.lock().await;
                let status = transfers.get(&job.id).map(|t| t.status.clone());
                Ok(match status {
                    Some(TransferStatus::InFlight) => CheckOutcome::NotReady,
                    Some(TransferStatus::Finished(_)) => CheckOutcome::Ready,
                    Some(TransferStatus::Failed(reason)) => {
                        transfers.remove(&job.id);
                        CheckOutcome::Failed(reason)
                    }
                    None => CheckOutcome::failed("transfer process is gone"),
                })
            }
            other => Ok(CheckOutcome::failed(format!(
                "transfer job in unexpected state {}",
                other
            ))),
        }
    }

    async fn run_job(&self, job: &Job) -> Result<Transition> {
        match job.state {
            JobState::New => {
                let request = transfer_request(job).map_err(anyhow::Error::msg)?;
                let job_id = job.id;
                info!("Starting transfer {} from {}", job_id, request.url);

                // Held until the entry is in place so the task cannot report first
                let mut table = self.transfers.lock().await;

                let client = self.client.clone();
                let transfers = Arc::clone(&self.transfers);
                let task = tokio::spawn(async move {
                    let status = match download(&client, &request.url, &request.path).await {
                        Ok(bytes) => {
                            debug!("Transfer {} wrote {} bytes", job_id, bytes);
                            TransferStatus::Finished(bytes)
                        }
                        Err(e) => {
                            warn!("Transfer {} failed: {:#}", job_id, e);
                            TransferStatus::Failed(format!("{:#}", e))
                        }
                    };
                    if let Some(transfer) = transfers.lock().await.get_mut(&job_id) {
                        transfer.status = status;
                    }
                });

                let previous = table.insert(
                    job_id,
                    Transfer {
                        status: TransferStatus::InFlight,
                        task: task.abort_handle(),
                    },
                );
                if let Some(previous) = previous {
                    // The last start was never recorded as Running
                    previous.task.abort();
                }

                Ok(Transition::to(JobState::Running).with_info("transfer started"))
            }
            JobState::Running => {
                let removed = self.transfers.lock().await.remove(&job.id);
                match removed.map(|t| t.status) {
                    Some(TransferStatus::Finished(bytes)) => {
                        let mut params = job.params.clone();
                        params.insert("bytes".to_string(), serde_json::json!(bytes));
                        Ok(Transition::to(JobState::Done)
                            .with_params(params)
                            .with_info(format!("transferred {} bytes", bytes)))
                    }
                    other => bail!("transfer {} is not finished ({:?})", job.id, other),
                }
            }
            other => bail!("cannot run transfer job in state {}", other),
        }
    }

    async fn retain(&self, pending: &HashSet<Uuid>) {
        self.transfers.lock().await.retain(|id, transfer| {
            if pending.contains(id) {
                return true;
            }
            debug!("Dropping transfer {}, job is no longer queued", id);
            transfer.task.abort();
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_core::dto::job::CreateJob;
    use std::time::Duration;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("galaxy-transfer-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn job(url: &str, path: &Path) -> Job {
        CreateJob::new(JobKind::Transfer, NAME)
            .with_param("url", serde_json::json!(url))
            .with_param("path", serde_json::json!(path.to_string_lossy()))
            .into_job()
    }

    async fn wait_until_settled(plugin: &HttpTransferPlugin, job: &Job) -> CheckOutcome {
        for _ in 0..100 {
            let outcome = plugin.check_job(job).await.unwrap();
            if outcome != CheckOutcome::NotReady {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("transfer never settled");
    }

    #[tokio::test]
    async fn test_file_transfer_runs_to_done() {
        let dir = scratch_dir();
        let source = dir.join("source.txt");
        std::fs::write(&source, b"ACGTACGT").unwrap();
        let dest = dir.join("nested").join("dest.txt");

        let plugin = HttpTransferPlugin::new();
        let mut job = job(&format!("file://{}", source.display()), &dest);

        assert_eq!(plugin.check_job(&job).await.unwrap(), CheckOutcome::Ready);
        let started = plugin.run_job(&job).await.unwrap();
        assert_eq!(started.state, JobState::Running);

        job.state = JobState::Running;
        assert_eq!(wait_until_settled(&plugin, &job).await, CheckOutcome::Ready);

        let done = plugin.run_job(&job).await.unwrap();
        assert_eq!(done.state, JobState::Done);
        assert_eq!(done.params.unwrap()["bytes"], serde_json::json!(8));
        assert_eq!(std::fs::read(&dest).unwrap(), b"ACGTACGT");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_copy_is_reported() {
        let dir = scratch_dir();
        let plugin = HttpTransferPlugin::new();
        let mut job = job(
            &format!("file://{}", dir.join("missing.txt").display()),
            &dir.join("dest.txt"),
        );

        plugin.run_job(&job).await.unwrap();
        job.state = JobState::Running;

        assert!(matches!(
            wait_until_settled(&plugin, &job).await,
            CheckOutcome::Failed(reason) if reason.contains("Failed to copy")
        ));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_running_job_without_task_is_lost() {
        let plugin = HttpTransferPlugin::new();
        let mut job = job("https://example.org/data.fa", Path::new("/tmp/data.fa"));
        job.state = JobState::Running;

        assert_eq!(
            plugin.check_job(&job).await.unwrap(),
            CheckOutcome::failed("transfer process is gone")
        );
        assert!(plugin.run_job(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_transfers_of_dequeued_jobs_are_dropped() {
        let dir = scratch_dir();
        let source = dir.join("source.txt");
        std::fs::write(&source, b"ACGT").unwrap();

        let plugin = HttpTransferPlugin::new();
        let mut kept = job(&format!("file://{}", source.display()), &dir.join("kept.txt"));
        let mut cancelled = job(
            &format!("file://{}", source.display()),
            &dir.join("cancelled.txt"),
        );
        plugin.run_job(&kept).await.unwrap();
        plugin.run_job(&cancelled).await.unwrap();
        kept.state = JobState::Running;
        cancelled.state = JobState::Running;

        plugin.retain(&HashSet::from([kept.id])).await;

        assert_eq!(wait_until_settled(&plugin, &kept).await, CheckOutcome::Ready);
        assert_eq!(
            plugin.check_job(&cancelled).await.unwrap(),
            CheckOutcome::failed("transfer process is gone")
        );

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_restarting_unrecorded_transfer_replaces_entry() {
        let dir = scratch_dir();
        let source = dir.join("source.txt");
        std::fs::write(&source, b"ACGT").unwrap();
        let plugin = HttpTransferPlugin::new();
        let mut job = job(&format!("file://{}", source.display()), &dir.join("dest.txt"));

        // First start whose Running state never reached the store
        plugin.run_job(&job).await.unwrap();
        plugin.run_job(&job).await.unwrap();
        assert_eq!(plugin.transfers.lock().await.len(), 1);

        job.state = JobState::Running;
        assert_eq!(wait_until_settled(&plugin, &job).await, CheckOutcome::Ready);
        assert_eq!(plugin.run_job(&job).await.unwrap().state, JobState::Done);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_url_fails_check() {
        let plugin = HttpTransferPlugin::new();
        let job = job("ftp://example.org/data.fa", Path::new("/tmp/data.fa"));

        assert!(matches!(
            plugin.check_job(&job).await.unwrap(),
            CheckOutcome::Failed(reason) if reason.contains("unsupported")
        ));
    }
}
