//! Workflow invocation scheduling
//!
//! An invocation carries its steps in the `steps` parameter, each with the
//! names of the steps it depends on. Every run schedules the steps whose
//! dependencies are already scheduled, so a workflow advances one layer per
//! pass and stays `Ready` until nothing is left.

use anyhow::{Context, Result};
use async_trait::async_trait;
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::JobPlugin;

pub const NAME: &str = "core";

#[derive(Debug, Clone, Deserialize)]
struct Step {
    name: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

pub struct WorkflowSchedulerPlugin;

impl WorkflowSchedulerPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkflowSchedulerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn steps(job: &Job) -> Result<Vec<Step>> {
    match job.params.get("steps") {
        Some(value) => serde_json::from_value(value.clone()).context("invalid steps parameter"),
        None => Ok(Vec::new()),
    }
}

/// Names scheduled so far, in scheduling order
fn scheduled_steps(job: &Job) -> Vec<String> {
    job.params
        .get("scheduled_steps")
        .and_then(|v| v.as_array())
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Checks names are unique, dependencies exist and there is no cycle
fn validate_steps(steps: &[Step]) -> Result<(), String> {
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    for step in steps {
        if indegree.insert(step.name.as_str(), step.depends_on.len()).is_some() {
            return Err(format!("duplicate step '{}'", step.name));
        }
    }

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        for dep in &step.depends_on {
            if !indegree.contains_key(dep.as_str()) {
                return Err(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.name, dep
                ));
            }
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(step.name.as_str());
        }
    }

    let mut queue: Vec<&str> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0;

    while let Some(name) = queue.pop() {
        visited += 1;
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    queue.push(*dependent);
                }
            }
        }
    }

    if visited != steps.len() {
        return Err("workflow steps contain a dependency cycle".to_string());
    }
    Ok(())
}

/// Steps not yet scheduled whose dependencies all are, in declaration order
fn next_layer<'a>(steps: &'a [Step], scheduled: &HashSet<String>) -> Vec<&'a str> {
    steps
        .iter()
        .filter(|s| !scheduled.contains(&s.name))
        .filter(|s| s.depends_on.iter().all(|d| scheduled.contains(d)))
        .map(|s| s.name.as_str())
        .collect()
}

#[async_trait]
impl JobPlugin for WorkflowSchedulerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::WorkflowInvocation
    }

    async fn check_job(&self, job: &Job) -> Result<CheckOutcome> {
        let steps = match steps(job) {
            Ok(steps) => steps,
            Err(e) => return Ok(CheckOutcome::Failed(format!("{:#}", e))),
        };

        Ok(match validate_steps(&steps) {
            Ok(()) => CheckOutcome::Ready,
            Err(reason) => CheckOutcome::Failed(reason),
        })
    }

    async fn run_job(&self, job: &Job) -> Result<Transition> {
        let steps = steps(job)?;
        validate_steps(&steps).map_err(anyhow::Error::msg)?;

        let mut order = scheduled_steps(job);
        let mut scheduled: HashSet<String> = order.iter().cloned().collect();
        let layer = next_layer(&steps, &scheduled);
        debug!("Invocation {} scheduling {:?}", job.id, layer);

        for name in layer {
            scheduled.insert(name.to_string());
            order.push(name.to_string());
        }

        let done = steps.iter().filter(|s| scheduled.contains(&s.name)).count();
        let mut params = job.params.clone();
        params.insert("scheduled_steps".to_string(), serde_json::json!(order));

        let info = format!("scheduled {}/{} steps", done, steps.len());
        let state = if done == steps.len() {
            JobState::Scheduled
        } else {
            JobState::Ready
        };

        Ok(Transition::to(state).with_params(params).with_info(info))
    }
}
