//! The shell collaborator (§6): turns a resolved command line into a running
//! child process. `ProcessShell` is the real, `tokio::process`-backed
//! implementation; `MockShell` is the recording test double the executor's
//! own tests are built against.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::attrs::Attrs;
use crate::error::{Result, RunzError};

/// Joins multi-valued attrs for the `RUN_Z_ATTR_*` environment encoding (§6).
pub const ATTR_RECORD_SEPARATOR: char = '\u{1e}';

/// Everything a Job needs to hand a command line to the shell: the
/// resolved argv, the merged attrs (propagated as environment variables),
/// and the working directory (the target package's location).
#[derive(Clone, Debug, Default)]
pub struct ExecParams {
    pub args: Vec<String>,
    pub attrs: Attrs,
    pub cwd: String,
}

impl ExecParams {
    /// `RUN_Z_ATTR_<NAME>` environment pairs, multi-valued attrs joined by
    /// the ASCII record separator (§6 "Attribute propagation").
    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.attrs
            .iter()
            .map(|(name, values)| {
                let key = format!("RUN_Z_ATTR_{}", name.to_uppercase().replace('-', "_"));
                (key, values.join(&ATTR_RECORD_SEPARATOR.to_string()))
            })
            .collect()
    }
}

/// A running child process. `wait` consumes the handle so only the task
/// that spawned it can observe the exit code; cancellation goes through
/// the separate [`Killer`] instead, which stays cheaply cloneable so the
/// executor can hold one aside for its cancellation path.
#[async_trait]
pub trait ProcessHandle: Send {
    async fn wait(self: Box<Self>) -> Result<i32>;
}

/// A detached handle that can signal a running process without needing
/// exclusive access to it. Cloning shares the same underlying process.
#[derive(Clone)]
pub struct Killer(Arc<dyn Fn() + Send + Sync>);

impl Killer {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn kill(&self) {
        (self.0)();
    }
}

#[async_trait]
pub trait Shell: Send + Sync {
    async fn exec_command(
        &self,
        task_name: &str,
        command: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)>;

    async fn exec_script(
        &self,
        task_name: &str,
        command_line: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)>;
}

/// Real, OS-process-backed shell (§6). Both `exec_command` and
/// `exec_script` spawn the same way — a `sh -c` invocation of the
/// resolved command line plus argv — the distinction between "Command"
/// and "Script" actions is in what the caller already resolved the
/// command line from (a `run-z` task's own `command`, vs. a manifest
/// script's raw native line), not in how the shell runs it.
pub struct ProcessShell;

impl ProcessShell {
    pub fn new() -> Self {
        Self
    }

    async fn spawn(
        &self,
        task_name: &str,
        command_line: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)> {
        let full_line = if params.args.is_empty() {
            command_line.to_string()
        } else {
            format!("{command_line} {}", params.args.join(" "))
        };

        debug!(target: "run_z::shell", "spawning `{full_line}` for task `{task_name}` in {}", params.cwd);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&full_line)
            .current_dir(&params.cwd)
            .envs(params.env_vars())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = command.spawn().map_err(|source| RunzError::Spawn {
            task_name: task_name.to_string(),
            source,
        })?;

        let pid = child.id();
        let killer = Killer::new(move || {
            if let Some(pid) = pid {
                kill_pid(pid);
            }
        });

        Ok((Box::new(ChildHandle { task_name: task_name.to_string(), child }), killer))
    }
}

impl Default for ProcessShell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) {}

struct ChildHandle {
    task_name: String,
    child: tokio::process::Child,
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    async fn wait(mut self: Box<Self>) -> Result<i32> {
        let status = self.child.wait().await.map_err(|source| RunzError::Spawn {
            task_name: self.task_name.clone(),
            source,
        })?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[async_trait]
impl Shell for ProcessShell {
    async fn exec_command(
        &self,
        task_name: &str,
        command: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)> {
        self.spawn(task_name, command, params).await
    }

    async fn exec_script(
        &self,
        task_name: &str,
        command_line: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)> {
        self.spawn(task_name, command_line, params).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockKind {
    Command,
    Script,
}

#[derive(Clone, Debug)]
pub struct MockInvocation {
    pub task_name: String,
    pub command_line: String,
    pub args: Vec<String>,
    pub kind: MockKind,
}

/// In-memory `Shell` test double: records every invocation and returns a
/// configurable exit code per task name (default `0`), with no real
/// process ever spawned (§6).
#[derive(Clone, Default)]
pub struct MockShell {
    invocations: Arc<Mutex<Vec<MockInvocation>>>,
    exit_codes: Arc<Mutex<HashMap<String, i32>>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_exit_code(&self, task_name: impl Into<String>, code: i32) {
        self.exit_codes.lock().unwrap().insert(task_name.into(), code);
    }

    pub fn invocations(&self) -> Vec<MockInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn record(&self, task_name: &str, command_line: &str, args: &[String], kind: MockKind) -> i32 {
        self.invocations.lock().unwrap().push(MockInvocation {
            task_name: task_name.to_string(),
            command_line: command_line.to_string(),
            args: args.to_vec(),
            kind,
        });
        self.exit_codes.lock().unwrap().get(task_name).copied().unwrap_or(0)
    }
}

struct MockHandle {
    exit_code: i32,
}

#[async_trait]
impl ProcessHandle for MockHandle {
    async fn wait(self: Box<Self>) -> Result<i32> {
        Ok(self.exit_code)
    }
}

#[async_trait]
impl Shell for MockShell {
    async fn exec_command(
        &self,
        task_name: &str,
        command: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)> {
        let exit_code = self.record(task_name, command, &params.args, MockKind::Command);
        let killed = Arc::new(AtomicBool::new(false));
        let killer = Killer::new(move || killed.store(true, Ordering::SeqCst));
        Ok((Box::new(MockHandle { exit_code }), killer))
    }

    async fn exec_script(
        &self,
        task_name: &str,
        command_line: &str,
        params: &ExecParams,
    ) -> Result<(Box<dyn ProcessHandle>, Killer)> {
        let exit_code = self.record(task_name, command_line, &params.args, MockKind::Script);
        let killed = Arc::new(AtomicI32::new(0));
        let killer = Killer::new(move || {
            killed.store(1, Ordering::SeqCst);
        });
        Ok((Box::new(MockHandle { exit_code }), killer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_shell_records_invocations_and_honors_exit_codes() {
        let shell = MockShell::new();
        shell.set_exit_code("build", 3);

        let params = ExecParams { args: vec!["--release".to_string()], attrs: Attrs::new(), cwd: "/repo".to_string() };
        let (handle, _killer) = shell.exec_command("build", "cargo build", &params).await.unwrap();
        let code = handle.wait().await.unwrap();

        assert_eq!(code, 3);
        let invocations = shell.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].task_name, "build");
        assert_eq!(invocations[0].command_line, "cargo build");
        assert_eq!(invocations[0].args, vec!["--release".to_string()]);
        assert_eq!(invocations[0].kind, MockKind::Command);
    }

    #[test]
    fn env_vars_join_multivalued_attrs_with_record_separator() {
        let mut attrs = Attrs::new();
        attrs.append("tag", "a");
        attrs.append("tag", "b");
        let params = ExecParams { args: Vec::new(), attrs, cwd: ".".to_string() };
        let vars = params.env_vars();
        assert_eq!(vars, vec![("RUN_Z_ATTR_TAG".to_string(), format!("a{}b", ATTR_RECORD_SEPARATOR))]);
    }
}
