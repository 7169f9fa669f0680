//! Call Planner (§4.4): a transitive, deduplicating, reentrant walk of a
//! task's prerequisites into a `Plan` of `Call`s plus `prerequisites`/
//! `parallel` relations.
//!
//! Reentrancy follows the "(b)" option in §9 design notes — structured
//! recursion with an in-progress guard set keyed by `CallKey`, rather
//! than an explicit work queue — since the recursion depth here is
//! bounded by the manifest's own prerequisite depth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::attrs::Attrs;
use crate::error::Result;
use crate::spec::{Action, Prerequisite};
use crate::task::Task;
use crate::workspace::{Package, PackageSet};

/// Uniquely identifies a Task within one planning session: its package's
/// location plus its name (task names are unique within a package, §3).
pub type CallKey = (String, String);

fn key_of(task: &Task) -> CallKey {
    (task.target.location.as_str().to_string(), task.name.clone())
}

#[derive(Clone, Debug)]
pub struct Call {
    pub key: CallKey,
    pub task: Task,
    pub attrs: Attrs,
    pub args: Vec<String>,
}

#[derive(Default)]
pub struct Plan {
    pub entry: CallKey,
    pub calls: HashMap<CallKey, Call>,
    pub prerequisites: HashMap<CallKey, Vec<CallKey>>,
    parallel: HashSet<(CallKey, CallKey)>,
    pub order: Vec<CallKey>,
}

impl Plan {
    pub fn are_parallel(&self, a: &CallKey, b: &CallKey) -> bool {
        self.parallel.contains(&(a.clone(), b.clone())) || self.parallel.contains(&(b.clone(), a.clone()))
    }

    fn mark_parallel(&mut self, a: CallKey, b: CallKey) {
        self.parallel.insert((a, b));
    }
}

pub struct Planner<'a> {
    packages: &'a PackageSet,
    plan: Plan,
    in_progress: HashSet<CallKey>,
}

impl<'a> Planner<'a> {
    pub fn new(packages: &'a PackageSet) -> Self {
        Self { packages, plan: Plan::default(), in_progress: HashSet::new() }
    }

    pub fn plan(mut self, entry: Task, attrs: Attrs, args: Vec<String>) -> Result<Plan> {
        let key = key_of(&entry);
        self.plan.entry = key.clone();
        self.plan_task(entry, attrs, args)?;
        Ok(self.plan)
    }

    /// Look up an existing Call for this Task; if present, merge the new
    /// parameters and return. Otherwise create, register, and (for a
    /// Group action) recurse into its prerequisites (§4.4 step 1-2).
    fn plan_task(&mut self, task: Task, attrs: Attrs, args: Vec<String>) -> Result<CallKey> {
        let key = key_of(&task);

        if let Some(existing) = self.plan.calls.get_mut(&key) {
            debug!(target: "run_z::planner", "merging repeat call to {}:{}", key.0, key.1);
            existing.attrs.merge(&attrs);
            existing.args.extend(args);
            return Ok(key);
        }

        if self.in_progress.contains(&key) {
            // Second encounter of a Task while its first plan is still in
            // progress (a recursive reference): no-op, breaking the cycle.
            debug!(target: "run_z::planner", "recursion guard hit for {}:{}", key.0, key.1);
            return Ok(key);
        }

        debug!(target: "run_z::planner", "planning {}:{}", key.0, key.1);
        self.in_progress.insert(key.clone());
        self.plan.order.push(key.clone());
        self.plan
            .calls
            .insert(key.clone(), Call { key: key.clone(), task: task.clone(), attrs, args });
        self.plan.prerequisites.entry(key.clone()).or_default();

        if matches!(task.action(), Action::Group { .. }) {
            self.plan_group(&task, &key)?;
        }

        self.in_progress.remove(&key);
        Ok(key)
    }

    fn plan_group(&mut self, task: &Task, key: &CallKey) -> Result<()> {
        let mut current_target = task.target.location.as_str().to_string();
        let mut prev_child: Option<CallKey> = None;

        for prereq in &task.spec.pre {
            match prereq {
                Prerequisite::Package(selector) => {
                    if let Some(resolved) = self.packages.resolve_selector(&current_target, &selector.host) {
                        current_target = resolved;
                    }
                }
                Prerequisite::Task(task_ref) => {
                    let if_present =
                        task_ref.attrs.is_set("if-present") || task.spec.attrs.is_set("if-present");
                    let child_task = self.resolve(&current_target, &task_ref.task, if_present);
                    let child_key = self.plan_task(child_task, task_ref.attrs.clone(), task_ref.args.clone())?;

                    self.plan.prerequisites.entry(key.clone()).or_default().push(child_key.clone());

                    if task_ref.parallel {
                        if let Some(prev) = prev_child.clone() {
                            self.plan.mark_parallel(prev, child_key.clone());
                        }
                    }
                    prev_child = Some(child_key);
                }
            }
        }
        Ok(())
    }

    /// Resolve a task name against a package location: the package's own
    /// task of that name, or an `Unknown` task carrying `if-present`
    /// (§4.4 "Name resolution").
    fn resolve(&self, location: &str, name: &str, if_present: bool) -> Task {
        if let Some(task) = self.packages.task(location, name) {
            return task.clone();
        }
        let package = self.target_package(location);
        Task::unknown(package, name.to_string(), if_present)
    }

    fn target_package(&self, location: &str) -> Arc<Package> {
        self.packages
            .package(location)
            .unwrap_or_else(|| Arc::new(Package::new(crate::workspace::Location(location.to_string()), Default::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::workspace::Location;

    fn set_with(scripts: &[(&str, &str)]) -> PackageSet {
        let mut manifest = Manifest::default();
        for (name, line) in scripts {
            manifest.scripts.insert(name.to_string(), line.to_string());
        }
        let mut set = PackageSet::new();
        set.insert(Location("/repo/widget".to_string()), manifest).unwrap();
        set
    }

    #[test]
    fn repeated_task_merges_into_one_call() {
        let set = set_with(&[("test", "run-z unit, unit"), ("unit", "jest")]);
        let entry = set.task("/repo/widget", "test").unwrap().clone();
        let plan = Planner::new(&set).plan(entry, Attrs::new(), Vec::new()).unwrap();

        let unit_key = ("/repo/widget".to_string(), "unit".to_string());
        assert_eq!(plan.calls.len(), 2);
        assert!(plan.calls.contains_key(&unit_key));
    }

    #[test]
    fn comma_marks_parallel_relation() {
        let set = set_with(&[("test", "run-z a,b"), ("a", "echo a"), ("b", "echo b")]);
        let entry = set.task("/repo/widget", "test").unwrap().clone();
        let plan = Planner::new(&set).plan(entry, Attrs::new(), Vec::new()).unwrap();

        let a = ("/repo/widget".to_string(), "a".to_string());
        let b = ("/repo/widget".to_string(), "b".to_string());
        assert!(plan.are_parallel(&a, &b));
    }

    #[test]
    fn unresolved_task_becomes_unknown() {
        let set = set_with(&[("test", "run-z absent")]);
        let entry = set.task("/repo/widget", "test").unwrap().clone();
        let plan = Planner::new(&set).plan(entry, Attrs::new(), Vec::new()).unwrap();

        let absent = ("/repo/widget".to_string(), "absent".to_string());
        assert!(matches!(plan.calls[&absent].task.action(), Action::Unknown));
    }

    #[test]
    fn if_present_is_carried_onto_the_unknown_task() {
        let set = set_with(&[("test", "run-z absent =if-present")]);
        let entry = set.task("/repo/widget", "test").unwrap().clone();
        let plan = Planner::new(&set).plan(entry, Attrs::new(), Vec::new()).unwrap();

        let absent = ("/repo/widget".to_string(), "absent".to_string());
        assert!(plan.calls[&absent].task.if_present());
    }
}
