//! `Task` (§3): `(target: Package, name, spec)` with the one tagged-variant
//! dispatch point over `spec.action` (§9 design notes).

use std::sync::Arc;

use crate::attrs::Attrs;
use crate::error::Result;
use crate::spec::{Action, TaskSpec, TaskSpecBuilder};
use crate::workspace::Package;

#[derive(Clone, Debug)]
pub struct Task {
    pub target: Arc<Package>,
    pub name: String,
    pub spec: TaskSpec,
}

impl Task {
    /// Build a Task from a manifest script's `run-z`-or-native command
    /// line (§4.1, §4.3).
    pub fn from_script(target: Arc<Package>, name: String, command_line: &str) -> Result<Self> {
        let mut builder = TaskSpecBuilder::new();
        builder.parse(command_line)?;
        builder.finalize();
        Ok(Self { target, name, spec: builder.spec() })
    }

    /// Materialize an `Unknown` task for a name that resolved against no
    /// manifest script (§4.4 "Name resolution").
    pub fn unknown(target: Arc<Package>, name: String, if_present: bool) -> Self {
        let mut attrs = Attrs::new();
        if if_present {
            attrs.append("if-present", "");
        }
        Self {
            target,
            name,
            spec: TaskSpec { pre: Vec::new(), attrs, args: Vec::new(), action: Action::Unknown },
        }
    }

    pub fn if_present(&self) -> bool {
        self.spec.attrs.is_set("if-present")
    }

    pub fn action(&self) -> &Action {
        &self.spec.action
    }
}
