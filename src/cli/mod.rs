//! Command-line interface
//!
//! - init: create an empty index
//! - build: bulk-load JSON-line rows
//! - insert: insert JSON-line rows one at a time
//! - query: run one predicate, print matching TIDs
//! - inspect: dump the metapage and LOV entries
//! - recover: replay the WAL and verify pages

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{build, execute, init, insert, inspect, query, recover, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_query, parse_row, read_request, read_rows, write_error, write_response, Row};
