//! The option/syntax engine (§4.2): recognizes `--long`, `-short` and
//! positional argv tokens against a reader table, with retry-driven
//! candidate replacement and a deferred-finalization pass.

pub mod engine;
pub mod types;

pub use engine::{Engine, EngineOutcome};
pub use types::{Candidate, Category, ReaderKind};
