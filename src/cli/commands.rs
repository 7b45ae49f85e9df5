//! CLI command implementations
//!
//! Every command loads the config, opens the index (replaying its WAL),
//! does its work and closes the index again, leaving a clean shutdown
//! marker. Output is one JSON object.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use serde_json::{json, Value};

use crate::config::IndexConfig;
use crate::index::{BitmapIndex, IndexOptions};
use crate::observability::ObservationScope;
use crate::page::{FilePageStore, PageStore};
use crate::wal::WalWriter;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{parse_query, read_request, read_rows, write_error, write_response};

type DirIndex = BitmapIndex<FilePageStore, WalWriter>;

/// Main CLI entry point: parses arguments and runs the command on
/// stdin/stdout. Failures are also reported as a JSON error object.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let result = execute(cmd, stdin.lock(), &mut stdout);
    if let Err(e) = &result {
        write_error(&mut stdout, e.code_str(), e.message())?;
    }
    result
}

/// Runs one command against explicit input and output streams.
pub fn execute<R: BufRead, W: Write>(cmd: Command, input: R, output: &mut W) -> CliResult<()> {
    let scope = ObservationScope::with_fields("AEROBITMAP_CLI", &[("command", cmd.name())]);
    let result = match cmd {
        Command::Init { config } => init(&config, output),
        Command::Build { config } => build(&config, input, output),
        Command::Insert { config } => insert(&config, input, output),
        Command::Query { config } => query(&config, input, output),
        Command::Inspect { config } => inspect(&config, output),
        Command::Recover { config } => recover(&config, output),
    };
    match &result {
        Ok(()) => scope.complete(),
        Err(e) => scope.fail_with(e.code_str(), e.message(), false),
    }
    result
}

fn load_config(config_path: &Path) -> CliResult<IndexConfig> {
    IndexConfig::load(config_path).map_err(|e| CliError::config_error(e.to_string()))
}

/// An index exists once its page file holds the metapage.
fn is_initialized(data_dir: &Path) -> bool {
    fs::metadata(data_dir.join("index").join("bitmap.pages"))
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}

fn open_index(config: &IndexConfig) -> CliResult<DirIndex> {
    if !is_initialized(config.data_path()) {
        return Err(CliError::not_initialized());
    }
    Ok(BitmapIndex::open_dir(config)?)
}

/// Creates an empty index. Writes the metapage and nothing else.
pub fn init<W: Write>(config_path: &Path, output: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    if is_initialized(config.data_path()) {
        return Err(CliError::already_initialized());
    }
    let index = BitmapIndex::create_dir(&config)?;
    let data = json!({
        "initialized": true,
        "page_size": index.store().page_size(),
        "key_types": config.key_types,
        "lookup": index.lookup_name()?,
    });
    index.close()?;
    write_response(output, data)
}

/// Bulk-loads rows in increasing TID order through one build session.
pub fn build<R: BufRead, W: Write>(config_path: &Path, input: R, output: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;
    let schema = index.schema().clone();

    let mut session = index.build();
    for row in read_rows(input, &schema) {
        let row = row?;
        session.add(&row.key, row.tid)?;
    }
    let stats = session.finish()?;
    let data = json!({
        "tuples": stats.tuples,
        "distinct_keys": stats.distinct_keys,
        "words_written": stats.words_written,
        "pages_written": stats.pages_written,
        "flushes": stats.flushes,
        "lov_entries": index.key_count()?,
    });
    index.close()?;
    write_response(output, data)
}

/// Inserts rows one at a time, in any TID order.
pub fn insert<R: BufRead, W: Write>(config_path: &Path, input: R, output: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;
    let schema = index.schema().clone();

    let mut rows = 0u64;
    let mut changed = 0u64;
    for row in read_rows(input, &schema) {
        let row = row?;
        rows += 1;
        if index.insert(&row.key, row.tid)? {
            changed += 1;
        }
    }
    let data = json!({ "rows": rows, "changed": changed });
    index.close()?;
    write_response(output, data)
}

/// Runs one query; `"limit"` caps the TIDs returned.
pub fn query<R: BufRead, W: Write>(config_path: &Path, input: R, output: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;
    let request = read_request(input)?;
    let predicate = parse_query(&request, index.schema())?;
    let limit = request.get("limit").and_then(Value::as_u64);

    let tids = {
        let mut scan = index.scan(predicate);
        match limit {
            Some(k) => scan.next_batch(k as usize)?,
            None => scan.collect_bitmap()?,
        }
    };
    let data = json!({ "count": tids.len(), "tids": tids });
    index.close()?;
    write_response(output, data)
}

/// Dumps the metapage and every LOV entry.
pub fn inspect<W: Write>(config_path: &Path, output: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;
    let meta = index.meta()?;
    let entries: Vec<Value> = index
        .entries()?
        .into_iter()
        .map(|(location, entry)| {
            let item = entry.item;
            json!({
                "location": location.to_string(),
                "key": entry.key.to_json(),
                "start_tid": item.start_tid,
                "last_setbit": item.last_setbit,
                "words_covered": item.words_covered,
                "page_words": item.page_words,
                "head_page": item.head_page,
                "tail_page": item.tail_page,
            })
        })
        .collect();
    let data = json!({
        "page_size": index.store().page_size(),
        "page_count": index.store().page_count(),
        "words_per_page": index.words_per_page(),
        "lookup": index.lookup_name()?,
        "max_tid": meta.max_tid,
        "lov_entries": meta.lov_entries,
        "entries": entries,
    });
    index.close()?;
    write_response(output, data)
}

/// Replays the WAL, verifies the page file and marks a clean shutdown.
pub fn recover<W: Write>(config_path: &Path, output: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    if !is_initialized(config.data_path()) {
        return Err(CliError::not_initialized());
    }
    let (store, wal, state) = DirIndex::recover_dir(&config)?;
    let stats = &state.replay_stats;
    let mut data = json!({
        "was_clean_shutdown": state.was_clean_shutdown,
        "records_replayed": stats.records_replayed,
        "final_sequence": stats.final_sequence,
    });
    if let Some(verified) = &state.verification_stats {
        data["verified"] = json!({
            "lov_pages": verified.lov_pages,
            "lov_entries": verified.lov_entries,
            "bitmap_pages": verified.bitmap_pages,
            "stored_words": verified.stored_words,
        });
    }
    BitmapIndex::open(store, wal, IndexOptions::from_config(&config))?.close()?;
    write_response(output, data)
}
