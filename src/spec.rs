use crate::attrs::Attrs;
use crate::error::Result;
use crate::grammar;
use crate::syntax::engine::Engine;

/// A reference to another task, with its own parallel flag, attrs and args.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskRef {
    pub task: String,
    pub parallel: bool,
    pub attrs: Attrs,
    pub args: Vec<String>,
}

impl TaskRef {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            parallel: false,
            attrs: Attrs::new(),
            args: Vec::new(),
        }
    }
}

/// A relative-path selector that retargets subsequent TaskRefs onto a
/// neighboring package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSelector {
    pub host: String,
}

/// Either half of a task's `pre` sequence (§3).
#[derive(Clone, Debug, PartialEq)]
pub enum Prerequisite {
    Task(TaskRef),
    Package(PackageSelector),
}

/// The execution kind of a task (§3, §9).
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Command { command: String, parallel: bool },
    Group { targets: Vec<String> },
    Script,
    Unknown,
}

impl Default for Action {
    fn default() -> Self {
        Action::Group { targets: Vec::new() }
    }
}

/// Immutable snapshot produced by [`TaskSpecBuilder`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskSpec {
    pub pre: Vec<Prerequisite>,
    pub attrs: Attrs,
    pub args: Vec<String>,
    pub action: Action,
}

impl TaskSpec {
    /// `true` if this spec originated from a line whose first token was
    /// not `run-z`, or that contained shell constructs the grammar does
    /// not model — see §4.1.
    pub fn is_native(&self) -> bool {
        matches!(self.action, Action::Script) && self.pre.is_empty() && self.attrs.is_empty()
    }
}

/// Mutable accumulator for a [`TaskSpec`] (§4.3). Collects prerequisites,
/// attrs, args and an action incrementally, then freezes into an
/// immutable spec once `.task()` or `.spec()` is called.
#[derive(Clone, Debug, Default)]
pub struct TaskSpecBuilder {
    pre: Vec<Prerequisite>,
    attrs: Attrs,
    args: Vec<String>,
    action: Action,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `run-z ...` (or native) command line and merge the
    /// resulting spec's fields into this builder (§4.1, §4.3).
    pub fn parse(&mut self, command_line: &str) -> Result<&mut Self> {
        let parsed = grammar::parser::parse(command_line)?;
        self.pre.extend(parsed.pre);
        self.attrs.merge(&parsed.attrs);
        self.args.extend(parsed.args);
        if !matches!(parsed.action, Action::Group { targets } if targets.is_empty()) {
            self.action = parsed.action;
        }
        Ok(self)
    }

    /// Run `args[from_index..]` through the option/syntax engine using
    /// the task-level supported options, merging recognized attrs/args
    /// back into this builder.
    pub fn apply_options(&mut self, engine: &mut Engine, args: &[String], from_index: usize) -> Result<&mut Self> {
        let tail = &args[from_index.min(args.len())..];
        let outcome = engine.run(tail)?;
        self.attrs.merge(&outcome.attrs());
        self.args.extend(outcome.positionals);
        Ok(self)
    }

    /// Apply an argv tail against a named manifest script: if the
    /// script's own tokens are a prefix of `argv[from_index..]`, the
    /// script's options are applied first and only the remainder is
    /// applied explicitly; otherwise the whole tail is applied as-is
    /// (§4.3).
    pub fn apply_argv(
        &mut self,
        engine: &mut Engine,
        script_command_line: Option<&str>,
        argv: &[String],
        from_index: usize,
    ) -> Result<&mut Self> {
        let tail = &argv[from_index.min(argv.len())..];
        if let Some(script_line) = script_command_line {
            let script_tokens = grammar::tokenize::tokenize(script_line).tokens;
            if tail.len() >= script_tokens.len() && tail[..script_tokens.len()] == script_tokens[..] {
                let outcome = engine.run(&script_tokens)?;
                self.attrs.merge(&outcome.attrs());
                self.args.extend(outcome.positionals);
                let remainder = &tail[script_tokens.len()..];
                let outcome = engine.run(remainder)?;
                self.attrs.merge(&outcome.attrs());
                self.args.extend(outcome.positionals);
                return Ok(self);
            }
        }
        let outcome = engine.run(tail)?;
        self.attrs.merge(&outcome.attrs());
        self.args.extend(outcome.positionals);
        Ok(self)
    }

    pub fn set_action(&mut self, action: Action) -> &mut Self {
        self.action = action;
        self
    }

    /// Resolve the final action once parsing/option-application is
    /// done: a `--then <command...>` surviving in `args` promotes the
    /// spec from the default empty `Group` to a `Command` action, the
    /// literal command being everything after `--then` (§4.1 "then"
    /// attribute, §6 "Recognized attributes", §8 scenario 2).
    pub fn finalize(&mut self) -> &mut Self {
        if matches!(self.action, Action::Group { ref targets } if targets.is_empty()) {
            if let Some(pos) = self.args.iter().position(|a| a == "--then") {
                let command = self.args[pos + 1..].join(" ");
                self.args.truncate(pos);
                self.action = Action::Command { command, parallel: false };
            }
        }
        self
    }

    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            pre: self.pre.clone(),
            attrs: self.attrs.clone(),
            args: self.args.clone(),
            action: self.action.clone(),
        }
    }
}
