//! The CLI's configuration surface (§7 "Configuration"): parallelism,
//! verbosity, and the discovery root, parsed with `clap`'s derive API
//! and fed straight into the executor's own configuration.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "run-z",
    version,
    about = "A multi-package task runner driven by a compact run-z command grammar"
)]
pub struct Cli {
    /// Max number of jobs to run in parallel (default: number of CPUs).
    #[arg(short = 'j', long = "jobs", env = "RUN_Z_JOBS")]
    pub jobs: Option<usize>,

    /// Raise the log level; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Root directory to discover packages under.
    #[arg(short = 'C', long = "dir", default_value = ".")]
    pub dir: String,

    /// `[PACKAGES...] TASK [...]` — the run-z command grammar itself,
    /// everything past the global options above.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

impl Cli {
    pub fn max_parallel(&self) -> usize {
        self.jobs.unwrap_or_else(|| num_cpus::get().max(1))
    }

    /// `RUN_Z_LOG`'s default when unset, driven by `-v` repeats.
    pub fn default_log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_defaults_to_cpu_count_when_unset() {
        let cli = Cli { jobs: None, verbose: 0, dir: ".".to_string(), rest: Vec::new() };
        assert_eq!(cli.max_parallel(), num_cpus::get().max(1));
    }

    #[test]
    fn verbosity_steps_up_the_default_log_level() {
        let mut cli = Cli { jobs: None, verbose: 0, dir: ".".to_string(), rest: Vec::new() };
        assert_eq!(cli.default_log_level(), "info");
        cli.verbose = 1;
        assert_eq!(cli.default_log_level(), "debug");
        cli.verbose = 2;
        assert_eq!(cli.default_log_level(), "trace");
    }
}
