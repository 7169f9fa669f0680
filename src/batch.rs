//! Batching & targeting (§4.5 "Batching"): fans a single task invocation
//! out across more than one package. Each target gets its own entry
//! [`Plan`] and its own [`Executor`] run; failures are aggregated and the
//! batch fails if any target fails.

use std::sync::Arc;

use crate::attrs::Attrs;
use crate::error::{Result, RunzError};
use crate::executor::Executor;
use crate::planner::Planner;
use crate::shell::Shell;
use crate::task::Task;
use crate::workspace::PackageSet;

/// Resolves a task name against each of `locations` (materializing an
/// `Unknown` task, carrying `if-present`, for any package that doesn't
/// declare it) and runs every resulting plan concurrently.
pub struct Batcher<'a> {
    packages: &'a PackageSet,
}

impl<'a> Batcher<'a> {
    pub fn new(packages: &'a PackageSet) -> Self {
        Self { packages }
    }

    /// `locations`, defaulting to a single package when empty — the
    /// "default: the single given package" case from §4.5.
    pub async fn run<S: Shell + 'static>(
        &self,
        executor: &Executor<S>,
        task_name: &str,
        locations: &[String],
        attrs: Attrs,
        args: Vec<String>,
    ) -> Result<()> {
        if locations.is_empty() {
            return Err(RunzError::UnknownTask { target: String::new(), task_name: task_name.to_string() });
        }

        let mut handles = Vec::new();
        for location in locations {
            let task = self.resolve(location, task_name);
            let plan = Planner::new(self.packages).plan(task, attrs.clone(), args.clone())?;
            let executor = executor.clone();
            handles.push(tokio::spawn(async move { executor.execute(plan).await }));
        }

        let mut first_err = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => first_err.get_or_insert(err),
                Err(join_err) => {
                    first_err.get_or_insert(RunzError::JobFailed { task_name: format!("{join_err}"), exit_code: -1 })
                }
            };
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn resolve(&self, location: &str, task_name: &str) -> Task {
        if let Some(task) = self.packages.task(location, task_name) {
            return task.clone();
        }
        let package = self
            .packages
            .package(location)
            .unwrap_or_else(|| Arc::new(crate::workspace::Package::new(
                crate::workspace::Location(location.to_string()),
                Default::default(),
            )));
        Task::unknown(package, task_name.to_string(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::manifest::Manifest;
    use crate::shell::MockShell;
    use crate::workspace::Location;

    fn two_package_set() -> PackageSet {
        let mut set = PackageSet::new();
        let mut a = Manifest::default();
        a.scripts.insert("build".to_string(), "echo a".to_string());
        let mut b = Manifest::default();
        b.scripts.insert("build".to_string(), "echo b".to_string());
        set.insert(Location("/repo/a".to_string()), a).unwrap();
        set.insert(Location("/repo/b".to_string()), b).unwrap();
        set
    }

    #[tokio::test]
    async fn fans_out_across_every_target_package() {
        let set = two_package_set();
        let shell = Arc::new(MockShell::new());
        let executor = Executor::new(shell.clone(), ExecutorConfig { max_parallel: 4, grace_period: std::time::Duration::from_millis(1) });
        let batcher = Batcher::new(&set);

        batcher
            .run(&executor, "build", &["/repo/a".to_string(), "/repo/b".to_string()], Attrs::new(), Vec::new())
            .await
            .unwrap();

        let mut lines: Vec<String> = shell.invocations().into_iter().map(|i| i.command_line).collect();
        lines.sort();
        assert_eq!(lines, vec!["echo a".to_string(), "echo b".to_string()]);
    }

    #[tokio::test]
    async fn one_failing_target_fails_the_whole_batch() {
        let set = two_package_set();
        let shell = Arc::new(MockShell::new());
        shell.set_exit_code("build", 1);
        let executor = Executor::new(shell, ExecutorConfig { max_parallel: 4, grace_period: std::time::Duration::from_millis(1) });
        let batcher = Batcher::new(&set);

        let err = batcher
            .run(&executor, "build", &["/repo/a".to_string(), "/repo/b".to_string()], Attrs::new(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunzError::JobFailed { .. }));
    }
}
