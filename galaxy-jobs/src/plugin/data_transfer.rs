//! Deferred jobs that wait for transfers
//!
//! A deferred job names the transfer jobs it depends on in its
//! `transfer_job_ids` parameter. It becomes ready once every transfer is
//! done and fails as soon as one of them fails.

use anyhow::Result;
use async_trait::async_trait;
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use galaxy_store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::JobPlugin;

pub const NAME: &str = "data_transfer";

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub struct DataTransferPlugin {
    store: Arc<dyn JobStore>,
}

impl DataTransferPlugin {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

fn transfer_ids(job: &Job) -> Result<Vec<Uuid>, String> {
    let ids = job
        .params
        .get("transfer_job_ids")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "transfer_job_ids parameter is missing".to_string())?;

    if ids.is_empty() {
        return Err("transfer_job_ids parameter is empty".to_string());
    }

    ids.iter()
        .map(|v| {
            v.as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| format!("invalid transfer job id: {}", v))
        })
        .collect()
}

#[async_trait]
impl JobPlugin for DataTransferPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::Deferred
    }

    fn check_interval(&self) -> Option<Duration> {
        Some(CHECK_INTERVAL)
    }

    async fn check_job(&self, job: &Job) -> Result<CheckOutcome> {
        let ids = match transfer_ids(job) {
            Ok(ids) => ids,
            Err(reason) => return Ok(CheckOutcome::Failed(reason)),
        };

        let mut pending = 0;
        for id in ids {
            let Some(transfer) = self.store.find_by_id(id).await? else {
                return Ok(CheckOutcome::failed(format!(
                    "transfer job {} does not exist",
                    id
                )));
            };

            match transfer.state {
                JobState::Done => {}
                JobState::Error | JobState::Cancelled => {
                    return Ok(CheckOutcome::failed(format!(
                        "transfer job {} ended in state {}: {}",
                        id,
                        transfer.state,
                        transfer.info.as_deref().unwrap_or("no details")
                    )));
                }
                _ => pending += 1,
            }
        }

        if pending > 0 {
            Ok(CheckOutcome::NotReady)
        } else {
            Ok(CheckOutcome::Ready)
        }
    }

    async fn run_job(&self, job: &Job) -> Result<Transition> {
        let count = transfer_ids(job).map(|ids| ids.len()).unwrap_or_default();
        Ok(Transition::to(JobState::Done).with_info(format!("{} transfer(s) complete", count)))
    }
}
