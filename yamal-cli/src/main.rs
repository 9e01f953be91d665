//! yamal CLI - inspect and feed yamal log files.

mod commands;
mod observability;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use commands::{cp::CopyOptions, parse_list, tail::TailOptions, write::WriteOptions};
use yamal_core::ListIndex;
use observability::{LogFormat, LoggingConfig, init_logging};

/// yamal - memory-mapped append-only multi-list log.
#[derive(Parser)]
#[command(name = "yamal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format: compact, pretty or json
    #[arg(long, env = "YAMAL_LOG_FORMAT", default_value = "compact", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records of a list
    Tail {
        /// Path to the yamal file
        path: PathBuf,

        /// List index (0-7) or stream name
        #[arg(short, long, default_value = "data")]
        list: String,

        /// Keep waiting for new records
        #[arg(short, long)]
        follow: bool,

        /// Start at the current end of the list
        #[arg(long)]
        from_end: bool,

        /// Print raw payloads only
        #[arg(long)]
        raw: bool,

        /// Poll interval in milliseconds while following
        #[arg(long, default_value = "10")]
        poll_ms: u64,

        /// Stop after this many records
        #[arg(short = 'n', long)]
        limit: Option<u64>,
    },

    /// Show file and per-list statistics
    Stats {
        /// Path to the yamal file
        path: PathBuf,

        /// Output JSON
        #[arg(long, conflicts_with = "follow")]
        json: bool,

        /// Report appended records periodically until every list is closed
        #[arg(short, long)]
        follow: bool,

        /// Report interval in milliseconds while following
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Copy records into another yamal file
    Cp {
        /// Source yamal file
        src: PathBuf,

        /// Destination yamal file (created if missing)
        dest: PathBuf,

        /// Lists to copy, by index or stream name (default: all)
        #[arg(short, long)]
        list: Vec<String>,

        /// Number of records to copy
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Maximum amount of data to copy, in megabytes
        #[arg(short, long)]
        size: Option<u64>,
    },

    /// Append lines from stdin to a list
    Write {
        /// Path to the yamal file (created if missing)
        path: PathBuf,

        /// List index (0-7) or stream name
        #[arg(short, long, default_value = "data")]
        list: String,

        /// Create the file with closable lists
        #[arg(long)]
        closable: bool,

        /// Close the list after writing
        #[arg(long, requires = "closable")]
        close: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse().unwrap_or_default();
    init_logging(&LoggingConfig::from_verbosity(cli.verbose, format))?;

    match cli.command {
        Commands::Tail {
            path,
            list,
            follow,
            from_end,
            raw,
            poll_ms,
            limit,
        } => {
            let options = TailOptions {
                list: parse_list(&list)?,
                follow,
                from_end,
                raw,
                poll: Duration::from_millis(poll_ms.max(1)),
                limit,
            };
            commands::tail::run(&path, &options)
        }
        Commands::Stats {
            path,
            follow: true,
            interval_ms,
            ..
        } => commands::stats::follow(&path, Duration::from_millis(interval_ms.max(1))),
        Commands::Stats { path, json, .. } => commands::stats::run(&path, json),
        Commands::Cp {
            src,
            dest,
            list,
            count,
            size,
        } => {
            let lists = if list.is_empty() {
                ListIndex::all().collect()
            } else {
                list.iter()
                    .map(|l| parse_list(l))
                    .collect::<Result<Vec<_>>>()?
            };
            let options = CopyOptions {
                lists,
                max_count: count,
                max_bytes: size.map(|mb| mb.saturating_mul(1024 * 1024)),
            };
            commands::cp::run(&src, &dest, &options)
        }
        Commands::Write {
            path,
            list,
            closable,
            close,
        } => commands::write::run(
            &path,
            WriteOptions {
                list: parse_list(&list)?,
                closable,
                close,
            },
        ),
    }
}
