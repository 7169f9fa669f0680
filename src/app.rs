//! The CLI front door (§2, §7): argv → entry task → plan → execute. This
//! module is intentionally thin — every nontrivial decision delegates
//! back into the library; it just wires the package registry, planner,
//! and executor together.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::attrs::Attrs;
use crate::batch::Batcher;
use crate::config::Cli;
use crate::error::{Result, RunzError};
use crate::executor::{Executor, ExecutorConfig};
use crate::grammar;
use crate::planner::Planner;
use crate::shell::ProcessShell;
use crate::spec::{Prerequisite, TaskSpec};
use crate::task::Task;
use crate::workspace::{FsLocator, Package, PackageSet};

/// Initialize the global logger from `RUN_Z_LOG`, falling back to the
/// level `-v`/`-vv` raised (§7 "Logging").
pub fn init_logging(cli: &Cli) {
    let env = env_logger::Env::default().filter_or("RUN_Z_LOG", cli.default_log_level());
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// The `[PACKAGES...]` prefix of the parsed spec's prerequisites — the
/// leading run of package selectors before the first task reference.
/// Two or more of them is a batch fan-out target list (§4.5 "Batching");
/// zero or one is the ordinary single-target retarget the planner
/// already performs for any `./sibling task` prerequisite.
fn leading_package_selectors(spec: &TaskSpec) -> Vec<String> {
    spec.pre
        .iter()
        .take_while(|p| matches!(p, Prerequisite::Package(_)))
        .map(|p| match p {
            Prerequisite::Package(sel) => sel.host.clone(),
            Prerequisite::Task(_) => unreachable!(),
        })
        .collect()
}

fn canonical_root(dir: &str) -> String {
    std::fs::canonicalize(dir).map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|_| dir.to_string())
}

fn virtual_root_package(location: &str) -> Arc<Package> {
    Arc::new(Package::new(crate::workspace::Location(location.to_string()), Default::default()))
}

/// "Did you mean" suggestions for a task name that resolved against
/// nothing, by edit distance against every task name known in the set.
fn suggest_similar_task_names(invalid_name: &str, valid_tasks: &[String]) -> Vec<String> {
    let mut suggestions: Vec<(String, usize)> = valid_tasks
        .iter()
        .map(|task| (task.clone(), levenshtein::levenshtein(invalid_name, task)))
        .filter(|(_, distance)| *distance <= 3)
        .collect();
    suggestions.sort_by_key(|(_, distance)| *distance);
    suggestions.into_iter().take(3).map(|(name, _)| name).collect()
}

fn warn_on_unknown_task(packages: &PackageSet, err: &RunzError) {
    if let RunzError::UnknownTask { task_name, .. } = err {
        let suggestions = suggest_similar_task_names(task_name, &packages.task_names());
        if !suggestions.is_empty() {
            use colored::Colorize;
            warn!(
                target: "run_z::app",
                "unknown task `{}` — did you mean: {}?",
                task_name.red(),
                suggestions.iter().map(|s| s.green().to_string()).collect::<Vec<_>>().join(", ")
            );
        }
    }
}

/// Run the whole CLI pipeline for one invocation: discover packages under
/// `cli.dir`, parse `cli.rest` as a `run-z` command line, plan it, and
/// execute it (or, for a multi-package target list, batch it).
pub async fn run(cli: Cli) -> Result<()> {
    init_logging(&cli);

    let root = canonical_root(&cli.dir);
    let locator = FsLocator::new();
    let packages = PackageSet::discover(&locator, &root).await?;

    let spec = grammar::parser::parse_argv(&cli.rest)?;
    let hosts = leading_package_selectors(&spec);

    let shell = Arc::new(ProcessShell::new());
    let config = ExecutorConfig { max_parallel: cli.max_parallel(), grace_period: Duration::from_secs(5) };
    let executor = Executor::new(shell, config);

    let result = if hosts.len() >= 2 {
        run_batch(&packages, &executor, &root, &hosts, &spec).await
    } else {
        run_single(&packages, &executor, &root, spec).await
    };

    if let Err(ref err) = result {
        warn_on_unknown_task(&packages, err);
    }
    result
}

async fn run_batch<S: crate::shell::Shell + 'static>(
    packages: &PackageSet,
    executor: &Executor<S>,
    root: &str,
    hosts: &[String],
    spec: &TaskSpec,
) -> Result<()> {
    let locations: Vec<String> = hosts.iter().filter_map(|h| packages.resolve_selector(root, h)).collect();
    let task_ref = spec
        .pre
        .iter()
        .skip(hosts.len())
        .find_map(|p| match p {
            Prerequisite::Task(t) => Some(t.clone()),
            Prerequisite::Package(_) => None,
        })
        .ok_or_else(|| RunzError::UnknownTask { target: root.to_string(), task_name: String::new() })?;

    let mut attrs = spec.attrs.clone();
    attrs.merge(&task_ref.attrs);
    let mut args = spec.args.clone();
    args.extend(task_ref.args.clone());

    info!(target: "run_z::app", "batching `{}` across {} package(s)", task_ref.task, locations.len());
    Batcher::new(packages).run(executor, &task_ref.task, &locations, attrs, args).await
}

async fn run_single<S: crate::shell::Shell + 'static>(
    packages: &PackageSet,
    executor: &Executor<S>,
    root: &str,
    spec: TaskSpec,
) -> Result<()> {
    let root_package = packages.package(root).unwrap_or_else(|| virtual_root_package(root));
    let entry = Task { target: root_package, name: "<cli>".to_string(), spec };

    debug!(target: "run_z::app", "planning entry from the command line");
    let plan = Planner::new(packages).plan(entry, Attrs::new(), Vec::new())?;
    executor.execute(plan).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_are_ranked_by_edit_distance() {
        let names = vec!["build".to_string(), "builder".to_string(), "test".to_string()];
        let suggestions = suggest_similar_task_names("buidl", &names);
        assert_eq!(suggestions.first(), Some(&"build".to_string()));
    }

    #[test]
    fn far_away_names_are_not_suggested() {
        let names = vec!["publish".to_string()];
        assert!(suggest_similar_task_names("x", &names).is_empty());
    }
}
