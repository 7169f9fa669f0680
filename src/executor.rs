//! The Job Executor (§4.5): walks a [`Plan`] and drives it to completion
//! across cooperating subprocesses, honoring prerequisite ordering,
//! parallel-group clustering, and first-failure cancellation.
//!
//! Scheduling follows the "single cooperative orchestrator, N OS
//! processes" shape from §5: every `Call` in the plan gets exactly one
//! memoized slot (a [`tokio::sync::OnceCell`]) so a Call reachable from
//! two different parents still only runs once, and a counting semaphore
//! sized by `max_parallel` is the only throttle on real concurrency.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::time::Instant;

use crate::attrs::Attrs;
use crate::error::{Result, RunzError};
use crate::planner::{Call, CallKey, Plan};
use crate::shell::{ExecParams, Killer, Shell};
use crate::spec::Action;

/// Runtime state of a Call's Job (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    DoneOk,
    DoneErr,
    Cancelled,
}

#[derive(Clone, Debug)]
struct JobRecord {
    state: JobState,
    started_at: Option<Instant>,
}

/// Memoized per-Call outcome. `Arc<RunzError>` rather than `RunzError`
/// itself so a Call reached from several parents can hand every awaiter
/// its own (cheap) clone of the same failure.
#[derive(Clone)]
enum JobOutcome {
    Ok,
    Failed(Arc<RunzError>),
}

pub struct ExecutorConfig {
    pub max_parallel: usize,
    /// How long cancellation waits after signalling running processes
    /// before the executor reports the entry's failure regardless (§5).
    pub grace_period: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_parallel: num_cpus::get().max(1), grace_period: Duration::from_secs(5) }
    }
}

struct RunState {
    cells: HashMap<CallKey, Arc<OnceCell<JobOutcome>>>,
    jobs: Mutex<HashMap<CallKey, JobRecord>>,
    killers: Mutex<HashMap<CallKey, Killer>>,
    semaphore: Arc<Semaphore>,
    cancelled: AtomicBool,
}

impl RunState {
    fn new(plan: &Plan, max_parallel: usize) -> Self {
        let cells = plan.calls.keys().cloned().map(|key| (key, Arc::new(OnceCell::new()))).collect();
        let jobs = plan
            .calls
            .keys()
            .cloned()
            .map(|key| (key, JobRecord { state: JobState::Pending, started_at: None }))
            .collect();
        Self {
            cells,
            jobs: Mutex::new(jobs),
            killers: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            cancelled: AtomicBool::new(false),
        }
    }

    fn cell(&self, key: &CallKey) -> Arc<OnceCell<JobOutcome>> {
        self.cells.get(key).cloned().unwrap_or_default()
    }

    fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn mark(&self, key: &CallKey, state: JobState) {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.entry(key.clone()).or_insert(JobRecord { state: JobState::Pending, started_at: None });
        if matches!(state, JobState::Running) {
            entry.started_at = Some(Instant::now());
        }
        entry.state = state;
    }

    async fn register_killer(&self, key: &CallKey, killer: Killer) {
        self.killers.lock().await.insert(key.clone(), killer);
    }

    async fn elapsed(&self, key: &CallKey) -> Option<Duration> {
        self.jobs.lock().await.get(key).and_then(|r| r.started_at).map(|s| s.elapsed())
    }

    /// Cooperative cancellation (§5): signal every tracked running
    /// process, then give them `grace` before returning regardless. No
    /// pending Job is ever started once `cancelled` is set — callers
    /// check it at the top of `run_call`.
    async fn cancel_all(&self, grace: Duration) {
        self.cancelled.store(true, Ordering::SeqCst);
        let killers: Vec<Killer> = self.killers.lock().await.values().cloned().collect();
        if killers.is_empty() {
            return;
        }
        warn!(target: "run_z::executor", "cancelling {} in-flight job(s)", killers.len());
        for killer in &killers {
            killer.kill();
        }
        tokio::time::sleep(grace).await;
    }
}

/// Reconstructs an owned `RunzError` from a shared one at the one place
/// (`Executor::execute`'s return) where the caller actually needs to own
/// it rather than just clone the `Arc`.
fn unwrap_error(err: &RunzError) -> RunzError {
    match err {
        RunzError::InvalidTask { message, command_line, position } => {
            RunzError::InvalidTask { message: message.clone(), command_line: command_line.clone(), position: *position }
        }
        RunzError::UnknownOption { name } => RunzError::UnknownOption { name: name.clone() },
        RunzError::UnknownTask { target, task_name } => {
            RunzError::UnknownTask { target: target.clone(), task_name: task_name.clone() }
        }
        RunzError::JobFailed { task_name, exit_code } => {
            RunzError::JobFailed { task_name: task_name.clone(), exit_code: *exit_code }
        }
        RunzError::Spawn { task_name, source } => RunzError::Spawn {
            task_name: task_name.clone(),
            source: std::io::Error::new(source.kind(), source.to_string()),
        },
    }
}

struct Inner<S: Shell + 'static> {
    shell: Arc<S>,
    config: ExecutorConfig,
}

/// Given a Plan, produces a process tree whose completion resolves when
/// the entry Call's Job is done, or fails on first failure (§4.5).
pub struct Executor<S: Shell + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: Shell + 'static> Clone for Executor<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S: Shell + 'static> Executor<S> {
    pub fn new(shell: Arc<S>, config: ExecutorConfig) -> Self {
        Self { inner: Arc::new(Inner { shell, config }) }
    }

    pub async fn execute(&self, plan: Plan) -> Result<()> {
        let grace = self.inner.config.grace_period;
        let max_parallel = self.inner.config.max_parallel;
        let plan = Arc::new(plan);
        let state = Arc::new(RunState::new(&plan, max_parallel));
        let entry = plan.entry.clone();

        let result = run_call(self.inner.clone(), plan, state.clone(), entry).await;
        if result.is_err() {
            state.cancel_all(grace).await;
        }
        result
    }
}

fn run_call<S: Shell + 'static>(
    inner: Arc<Inner<S>>,
    plan: Arc<Plan>,
    state: Arc<RunState>,
    key: CallKey,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        if state.cancelled() {
            return Ok(());
        }

        let cell = state.cell(&key);
        let outcome = cell
            .get_or_init(|| async {
                let key_for_err = key.clone();
                match execute_one(inner.clone(), plan.clone(), state.clone(), key.clone()).await {
                    Ok(()) => JobOutcome::Ok,
                    Err(err) => {
                        debug!(target: "run_z::executor", "job {}:{} failed: {err}", key_for_err.0, key_for_err.1);
                        JobOutcome::Failed(Arc::new(err))
                    }
                }
            })
            .await
            .clone();

        match outcome {
            JobOutcome::Ok => Ok(()),
            JobOutcome::Failed(err) => Err(unwrap_error(&err)),
        }
    })
}

async fn execute_one<S: Shell + 'static>(
    inner: Arc<Inner<S>>,
    plan: Arc<Plan>,
    state: Arc<RunState>,
    key: CallKey,
) -> Result<()> {
    let call = plan.calls.get(&key).expect("Call must be present for every planned key").clone();

    match call.task.action().clone() {
        Action::Group { .. } => run_group(inner, plan, state, key, call).await,
        Action::Command { command, .. } => run_leaf(inner, state, key, command, false, call).await,
        Action::Script => {
            let command_line = call
                .task
                .target
                .script(&call.task.name)
                .map(str::to_string)
                .ok_or_else(|| RunzError::UnknownTask {
                    target: call.task.target.location.as_str().to_string(),
                    task_name: call.task.name.clone(),
                })?;
            run_leaf(inner, state, key, command_line, true, call).await
        }
        Action::Unknown => {
            if call.task.if_present() {
                state.mark(&key, JobState::DoneOk).await;
                Ok(())
            } else {
                state.mark(&key, JobState::DoneErr).await;
                Err(RunzError::UnknownTask {
                    target: call.task.target.location.as_str().to_string(),
                    task_name: call.task.name.clone(),
                })
            }
        }
    }
}

/// Clusters `task`'s direct prerequisites by the plan's `parallel`
/// relation: a run of consecutive siblings chained by `areParallel` forms
/// one concurrent cluster; a sibling that isn't parallel with its
/// predecessor starts a new cluster that waits for the whole previous one
/// (§4.4 "Parallelism", §4.5 point 2).
fn cluster(plan: &Plan, key: &CallKey) -> Vec<Vec<CallKey>> {
    let children = plan.prerequisites.get(key).cloned().unwrap_or_default();
    let mut clusters: Vec<Vec<CallKey>> = Vec::new();
    let mut prev: Option<CallKey> = None;

    for child in children {
        let joins_previous = match (&prev, clusters.last()) {
            (Some(p), Some(_)) => plan.are_parallel(p, &child),
            _ => false,
        };
        if joins_previous {
            clusters.last_mut().unwrap().push(child.clone());
        } else {
            clusters.push(vec![child.clone()]);
        }
        prev = Some(child);
    }

    clusters
}

async fn run_group<S: Shell + 'static>(
    inner: Arc<Inner<S>>,
    plan: Arc<Plan>,
    state: Arc<RunState>,
    key: CallKey,
    _call: Call,
) -> Result<()> {
    state.mark(&key, JobState::Running).await;

    for group in cluster(&plan, &key) {
        if state.cancelled() {
            break;
        }

        let handles: Vec<_> = group
            .into_iter()
            .map(|child| {
                let inner = inner.clone();
                let plan = plan.clone();
                let state = state.clone();
                tokio::spawn(run_call(inner, plan, state, child))
            })
            .collect();

        let mut first_err = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => first_err.get_or_insert(err),
                Err(join_err) => first_err.get_or_insert(RunzError::JobFailed {
                    task_name: format!("{join_err}"),
                    exit_code: -1,
                }),
            };
        }
        if let Some(err) = first_err {
            state.mark(&key, JobState::DoneErr).await;
            return Err(err);
        }
    }

    state.mark(&key, JobState::DoneOk).await;
    Ok(())
}

async fn run_leaf<S: Shell + 'static>(
    inner: Arc<Inner<S>>,
    state: Arc<RunState>,
    key: CallKey,
    command_line: String,
    is_script: bool,
    call: Call,
) -> Result<()> {
    let permit = state.semaphore.clone().acquire_owned().await.expect("semaphore never closed");

    if state.cancelled() {
        drop(permit);
        return Ok(());
    }

    state.mark(&key, JobState::Running).await;

    let mut args = call.task.spec.args.clone();
    args.extend(call.args.clone());
    let mut attrs = call.task.spec.attrs.clone();
    attrs.merge(&call.attrs);

    let params = ExecParams { args, attrs, cwd: call.task.target.location.as_str().to_string() };

    info!(target: "run_z::executor", "starting {}:{}", key.0, key.1);
    let spawn_result = if is_script {
        inner.shell.exec_script(&call.task.name, &command_line, &params).await
    } else {
        inner.shell.exec_command(&call.task.name, &command_line, &params).await
    };

    let (handle, killer) = match spawn_result {
        Ok(pair) => pair,
        Err(err) => {
            drop(permit);
            state.mark(&key, JobState::DoneErr).await;
            return Err(err);
        }
    };
    state.register_killer(&key, killer).await;

    let exit_code = handle.wait().await;
    drop(permit);

    match exit_code {
        Ok(0) => {
            let elapsed = state.elapsed(&key).await;
            state.mark(&key, JobState::DoneOk).await;
            match elapsed {
                Some(d) => info!(target: "run_z::executor", "finished {}:{} in {:.2}s", key.0, key.1, d.as_secs_f64()),
                None => info!(target: "run_z::executor", "finished {}:{}", key.0, key.1),
            }
            Ok(())
        }
        Ok(code) => {
            state.mark(&key, JobState::DoneErr).await;
            Err(RunzError::JobFailed { task_name: call.task.name.clone(), exit_code: code })
        }
        Err(err) => {
            state.mark(&key, JobState::DoneErr).await;
            Err(err)
        }
    }
}
