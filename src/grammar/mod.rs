//! The `run-z` task grammar (§4.1): tokenizer + positional command-line
//! parser that together implement `parse(commandLine) → TaskSpec`.

pub mod parser;
pub mod tokenize;
