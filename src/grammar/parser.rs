//! The `run-z` task grammar (§4.1): turns a command line into a
//! [`TaskSpec`]. The low-level quoting/escaping is handled by
//! [`super::tokenize`]; this module drives the stateful positional scan
//! (package selectors, attributes, comma/slash/`//` prerequisite syntax).

use crate::attrs::Attrs;
use crate::error::{Result, RunzError};
use crate::grammar::tokenize::tokenize;
use crate::spec::{Action, PackageSelector, Prerequisite, TaskRef, TaskSpec};

/// A `TaskRef` under construction: arguments are collected as raw strings
/// and only classified into `attrs` vs `args` once the ref commits (§4.1,
/// "Argument classification").
#[derive(Debug, Default)]
struct Building {
    task: String,
    parallel: bool,
    raw: Vec<String>,
}

fn invalid_task(command_line: &str, position: usize, message: &str) -> RunzError {
    RunzError::InvalidTask {
        message: message.to_string(),
        command_line: command_line.to_string(),
        position,
    }
}

fn is_package_selector(token: &str) -> bool {
    token == "." || token == ".." || token.starts_with("./") || token.starts_with("../")
}

/// A token is an attribute assignment if it contains `=` whose first
/// occurrence precedes any `/`, or it begins with `=` (the leading-`=`
/// form appends an empty value).
fn classify_attr(token: &str) -> Option<(String, String)> {
    if let Some(rest) = token.strip_prefix('=') {
        return Some((rest.to_string(), String::new()));
    }
    let eq_idx = token.find('=')?;
    let slash_idx = token.find('/');
    if slash_idx.map_or(true, |si| eq_idx < si) {
        Some((token[..eq_idx].to_string(), token[eq_idx + 1..].to_string()))
    } else {
        None
    }
}

fn offset_within(outer: &str, inner: &str) -> usize {
    (inner.as_ptr() as usize).saturating_sub(outer.as_ptr() as usize)
}

fn commit_building(b: Building) -> Prerequisite {
    let mut task_ref = TaskRef::new(b.task);
    task_ref.parallel = b.parallel;
    for raw in b.raw {
        if raw.starts_with('-') {
            task_ref.args.push(raw);
        } else if let Some((name, value)) = classify_attr(&raw) {
            task_ref.attrs.append(name, value);
        } else {
            task_ref.args.push(raw);
        }
    }
    Prerequisite::Task(task_ref)
}

/// Process the comma-separated fragments of a single task-name piece
/// (the even-indexed halves of a token's `//` split).
#[allow(clippy::too_many_arguments)]
fn process_task_name_piece(
    piece: &str,
    token: &str,
    token_start: usize,
    reconstructed: &str,
    pending_parallel: &mut bool,
    in_progress: &mut Option<Building>,
    pre: &mut Vec<Prerequisite>,
) -> Result<()> {
    let fragments: Vec<&str> = piece.split(',').collect();
    let last = fragments.len() - 1;
    for (k, fragment) in fragments.iter().enumerate() {
        let followed_by_comma = k != last;

        let mut split_iter = fragment.splitn(2, '/');
        let name_part = split_iter.next().unwrap_or("");
        let rest = split_iter.next();
        let shorthand_args: Vec<String> = match rest {
            Some(r) => r.split('/').map(|s| s.to_string()).collect(),
            None => Vec::new(),
        };

        if name_part.is_empty() {
            if rest.is_none() {
                // Empty fragment, no shorthand args at all: a no-op (e.g.
                // the trailing empty fragment after a trailing comma).
                continue;
            }
            if k != 0 {
                let fragment_offset = token_start + offset_within(token, fragment);
                return Err(invalid_task(
                    reconstructed,
                    fragment_offset + 1,
                    "Task argument specified, but not the task",
                ));
            }
            match in_progress {
                Some(building) => building.raw.extend(shorthand_args),
                None => {
                    return Err(invalid_task(
                        reconstructed,
                        token_start,
                        "Task argument specified, but not the task",
                    ));
                }
            }
        } else {
            if let Some(prev) = in_progress.take() {
                pre.push(commit_building(prev));
            }
            let building = Building {
                task: name_part.to_string(),
                parallel: *pending_parallel,
                raw: shorthand_args,
            };
            *pending_parallel = false;
            if followed_by_comma {
                pre.push(commit_building(building));
                *pending_parallel = true;
            } else {
                *in_progress = Some(building);
            }
        }
    }
    Ok(())
}

/// Process one prerequisite token: split on the `//` argument delimiter
/// and dispatch each piece as either a task-name piece or a raw argument
/// piece, per the persistent `in_args_mode` flag (§4.1).
fn process_prereq_token(
    token: &str,
    token_start: usize,
    reconstructed: &str,
    in_args_mode: &mut bool,
    pending_parallel: &mut bool,
    in_progress: &mut Option<Building>,
    pre: &mut Vec<Prerequisite>,
) -> Result<()> {
    for (j, piece) in token.split("//").enumerate() {
        if j > 0 {
            *in_args_mode = !*in_args_mode;
        }
        if *in_args_mode {
            if piece.is_empty() {
                continue;
            }
            match in_progress {
                Some(building) => building.raw.push(piece.to_string()),
                None => {
                    return Err(invalid_task(
                        reconstructed,
                        token_start,
                        "Task argument specified, but not the task",
                    ));
                }
            }
        } else {
            process_task_name_piece(
                piece,
                token,
                token_start,
                reconstructed,
                pending_parallel,
                in_progress,
                pre,
            )?;
        }
    }
    Ok(())
}

fn parse_positional(tokens: &[String]) -> Result<TaskSpec> {
    let reconstructed = tokens.join(" ");
    let mut token_starts = Vec::with_capacity(tokens.len());
    let mut offset = 0usize;
    for token in tokens {
        token_starts.push(offset);
        offset += token.chars().count() + 1;
    }

    let mut pre: Vec<Prerequisite> = Vec::new();
    let mut top_attrs = Attrs::new();
    let mut in_progress: Option<Building> = None;
    let mut pending_parallel = false;
    let mut in_args_mode = false;

    for (i, token) in tokens.iter().enumerate() {
        // These special-case classifications only apply outside an open
        // `//` argument region — inside one, every token is raw argument
        // content for the in-progress TaskRef until the closing `//`.
        if !in_args_mode {
            if token.starts_with('-') {
                if let Some(building) = in_progress.take() {
                    pre.push(commit_building(building));
                }
                return Ok(TaskSpec {
                    pre,
                    attrs: top_attrs,
                    args: tokens[i..].to_vec(),
                    action: Action::default(),
                });
            }

            if is_package_selector(token) {
                if let Some(building) = in_progress.take() {
                    pre.push(commit_building(building));
                }
                pre.push(Prerequisite::Package(PackageSelector { host: token.clone() }));
                continue;
            }

            if let Some((name, value)) = classify_attr(token) {
                if let Some(building) = in_progress.take() {
                    pre.push(commit_building(building));
                }
                top_attrs.append(name, value);
                continue;
            }
        }

        process_prereq_token(
            token,
            token_starts[i],
            &reconstructed,
            &mut in_args_mode,
            &mut pending_parallel,
            &mut in_progress,
            &mut pre,
        )?;
    }

    if let Some(building) = in_progress.take() {
        pre.push(commit_building(building));
    }

    Ok(TaskSpec {
        pre,
        attrs: top_attrs,
        args: Vec::new(),
        action: Action::default(),
    })
}

/// `parse(commandLine) → TaskSpec` (§4.1).
pub fn parse(command_line: &str) -> Result<TaskSpec> {
    let tokenized = tokenize(command_line);
    let is_native = tokenized.tokens.first().map(String::as_str) != Some("run-z")
        || tokenized.saw_env_expansion
        || tokenized.saw_shell_construct;

    if is_native {
        return Ok(TaskSpec {
            pre: Vec::new(),
            attrs: Attrs::new(),
            args: Vec::new(),
            action: Action::Script,
        });
    }

    parse_positional(&tokenized.tokens[1..])
}

/// Entry point for the CLI front door (§6 "Command-line surface"): the
/// top-level `run-z [PACKAGES...] TASK ...` invocation is already past
/// the literal `run-z` token (that's argv[0], stripped by the caller) so
/// it skips the native/`run-z`-prefix classification in [`parse`] and
/// goes straight into the same positional grammar a manifest script's
/// own command line uses.
pub fn parse_argv(argv: &[String]) -> Result<TaskSpec> {
    parse_positional(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_names(spec: &TaskSpec) -> Vec<(&str, bool, Vec<&str>)> {
        spec.pre
            .iter()
            .filter_map(|p| match p {
                Prerequisite::Task(t) => Some((t.task.as_str(), t.parallel, t.args.iter().map(String::as_str).collect())),
                Prerequisite::Package(_) => None,
            })
            .collect()
    }

    #[test]
    fn scenario_1_comma_parallel_groups() {
        let spec = parse("run-z dep1,dep2, dep3 dep4").unwrap();
        assert_eq!(
            task_names(&spec),
            vec![
                ("dep1", false, vec![]),
                ("dep2", true, vec![]),
                ("dep3", true, vec![]),
                ("dep4", false, vec![]),
            ]
        );
        assert!(spec.args.is_empty());
        assert!(!spec.is_native());
    }

    #[test]
    fn scenario_2_shorthand_args_and_trailing_options() {
        let spec = parse("run-z dep1 dep2/-a dep3 --then command").unwrap();
        assert_eq!(
            task_names(&spec),
            vec![("dep1", false, vec![]), ("dep2", false, vec!["-a"]), ("dep3", false, vec![])]
        );
        assert_eq!(spec.args, vec!["--then".to_string(), "command".to_string()]);
    }

    #[test]
    fn scenario_3_attribute_forms() {
        let spec = parse("run-z attr1=val1 attr2= =attr3 attr3=val3").unwrap();
        assert_eq!(spec.attrs.get("attr1"), Some(&["val1".to_string()][..]));
        assert_eq!(spec.attrs.get("attr2"), Some(&["".to_string()][..]));
        assert_eq!(
            spec.attrs.get("attr3"),
            Some(&["".to_string(), "val3".to_string()][..])
        );
        assert!(spec.pre.is_empty());
    }

    #[test]
    fn scenario_4_leading_arg_delimiter_is_an_error() {
        let err = parse("run-z //-a// task").unwrap_err();
        match err {
            RunzError::InvalidTask { command_line, position, .. } => {
                assert_eq!(command_line, "//-a// task");
                assert_eq!(position, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scenario_5_arg_delimiter_after_comma_commit_is_an_error() {
        let err = parse("run-z task1, //-a// task2").unwrap_err();
        match err {
            RunzError::InvalidTask { command_line, position, .. } => {
                assert_eq!(command_line, "task1, //-a// task2");
                assert_eq!(position, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn native_line_is_opaque() {
        let spec = parse("echo hello").unwrap();
        assert!(spec.is_native());
        assert_eq!(spec.action, Action::Script);
    }

    #[test]
    fn env_expansion_forces_native() {
        let spec = parse("run-z task attr=${HOME}").unwrap();
        assert!(spec.is_native());
    }

    #[test]
    fn package_selector_retargets() {
        let spec = parse("run-z ./sibling task").unwrap();
        assert!(matches!(spec.pre[0], Prerequisite::Package(PackageSelector { ref host }) if host == "./sibling"));
        assert!(matches!(&spec.pre[1], Prerequisite::Task(t) if t.task == "task"));
    }

    #[test]
    fn spanning_arg_delimiter_across_tokens() {
        let spec = parse("run-z dep //-a -b// dep2").unwrap();
        let names = task_names(&spec);
        assert_eq!(names[0].0, "dep");
        assert_eq!(names[0].2, vec!["-a", "-b"]);
        assert_eq!(names[1].0, "dep2");
    }
}
