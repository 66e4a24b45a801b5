//! AtlasTx Journal Tool
//!
//! Inspects journal files: dumps records or reports what recovery would do.

use std::path::PathBuf;

use atlastx::journal::{JournalReader, JournalRecord, JournalRecovery};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasTx journal inspector
#[derive(Parser, Debug)]
#[command(name = "atlastx-journal")]
#[command(about = "Inspect AtlasTx write-ahead journal files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every record in a journal file
    Dump {
        /// Journal file
        file: PathBuf,

        /// Print key and value bytes in hex
        #[arg(short, long)]
        verbose: bool,
    },

    /// Scan a journal file and report what recovery would replay
    Verify {
        /// Journal file
        file: PathBuf,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlastx=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Dump { file, verbose } => dump(&file, verbose),
        Command::Verify { file } => verify(&file),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn dump(file: &PathBuf, verbose: bool) -> atlastx::Result<()> {
    tracing::info!("Dumping journal {}", file.display());

    for entry in JournalReader::open(file)?.records() {
        let (offset, decoded) = entry?;
        println!(
            "{:>10}  {}  len={:<6} ts={:<12} {}",
            offset,
            decoded.record.type_tag(),
            decoded.length,
            decoded.timestamp,
            describe(&decoded.record, verbose)
        );
    }
    Ok(())
}

fn verify(file: &PathBuf) -> atlastx::Result<()> {
    let result = JournalRecovery::verify(file)?;

    println!("records scanned:   {}", result.records_scanned);
    println!("records skipped:   {}", result.records_skipped);
    println!("last valid offset: {}", result.last_valid_offset);
    println!("torn tail:         {}", result.was_truncated);
    println!("max timestamp:     {}", result.max_timestamp);
    match result.last_checkpoint {
        Some(cp) => println!(
            "last checkpoint:   ts={} millis={} offset={}",
            cp.timestamp, cp.system_time_millis, cp.offset
        ),
        None => println!("last checkpoint:   none"),
    }
    println!("volumes:           {}", result.volumes.len());
    println!("trees:             {}", result.trees.len());
    println!("page images:       {}", result.page_images.len());
    println!("committed:         {}", result.committed.len());
    println!("rolled back:       {}", result.rolled_back.len());
    println!("in flight:         {}", result.in_flight.len());
    println!("mutations:         {}", result.mutations.len());
    Ok(())
}

fn describe(record: &JournalRecord, verbose: bool) -> String {
    match record {
        JournalRecord::IdentifyVolume {
            handle,
            volume_id,
            path,
        } => format!("volume handle={} id={} path={}", handle, volume_id, path),
        JournalRecord::IdentifyTree {
            handle,
            volume_handle,
            name,
        } => format!("tree handle={} volume={} name={}", handle, volume_handle, name),
        JournalRecord::PageImage(image) => format!(
            "page volume={} address={} left={} right={} size={}",
            image.volume_handle,
            image.page_address,
            image.left_size,
            image.right_size(),
            image.buffer_size
        ),
        JournalRecord::Checkpoint { system_time_millis } => {
            format!("checkpoint millis={}", system_time_millis)
        }
        JournalRecord::TransactionStart { transaction_id }
        | JournalRecord::TransactionCommit { transaction_id }
        | JournalRecord::TransactionRollback { transaction_id } => {
            format!("txn={}", transaction_id)
        }
        JournalRecord::StoreRecord {
            tree_handle,
            key,
            value,
        } => {
            if verbose {
                format!("tree={} key={} value={}", tree_handle, hex(key), hex(value))
            } else {
                format!("tree={} key={}B value={}B", tree_handle, key.len(), value.len())
            }
        }
        JournalRecord::DeleteRange {
            tree_handle,
            key1,
            key2,
        } => {
            if verbose {
                format!("tree={} from={} to={}", tree_handle, hex(key1), hex(key2))
            } else {
                format!("tree={} from={}B to={}B", tree_handle, key1.len(), key2.len())
            }
        }
        JournalRecord::DeleteTree { tree_handle } => format!("tree={}", tree_handle),
        JournalRecord::DeleteVolume { volume_handle } => format!("volume={}", volume_handle),
        JournalRecord::Unknown { payload, .. } => format!("unknown payload={}B", payload.len()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
