//! Maintenance commands: checkpoint and inspect.

use super::{print_json, CliError, CliResult, Context};
use qvstudy_core::wal::{WalEntry, WalRecord, WalRecordIterator};
use qvstudy_core::Database;
use qvstudy_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const WAL_FILE: &str = "wal.log";
const SNAPSHOT_FILE: &str = "snapshot.dat";

/// Snapshots the database and clears the WAL.
pub fn checkpoint(ctx: &Context) -> CliResult {
    let config = ctx.config.engine_config().create_if_missing(false);
    let db = Database::open_with_config(&ctx.config.data_dir, config)?;
    let before = db.wal_size()?;
    let seq = db.checkpoint()?;

    if ctx.json {
        #[derive(Serialize)]
        struct Output {
            sequence: u64,
            wal_bytes_cleared: u64,
        }
        return print_json(&Output {
            sequence: seq.as_u64(),
            wal_bytes_cleared: before,
        });
    }
    println!("Checkpoint written at sequence {}", seq);
    println!("  WAL cleared: {} bytes", before);
    Ok(())
}

/// Statistics for one log-framed file.
#[derive(Debug, Default, Serialize)]
pub struct LogStats {
    /// File size in bytes.
    pub size: u64,
    /// Records per type.
    pub record_counts: BTreeMap<String, usize>,
    /// Committed transactions.
    pub commits: usize,
    /// Highest committed sequence.
    pub last_sequence: u64,
    /// Bytes after the last complete record.
    pub trailing_bytes: u64,
    /// Decoding error that stopped the scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One record, for display.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the WAL file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction ID (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<u64>,
    /// Sequence number (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Bucket path (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Key (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Value size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// WAL statistics.
    pub wal: LogStats,
    /// Snapshot statistics, if a snapshot exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<LogStats>,
    /// WAL records (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<RecordInfo>>,
}

/// Reads the database files directly, without taking the lock.
pub fn inspect(ctx: &Context, show_records: bool, limit: Option<usize>) -> CliResult {
    let path = &ctx.config.data_dir;
    let wal_path = path.join(WAL_FILE);
    let snapshot_path = path.join(SNAPSHOT_FILE);

    if !wal_path.exists() && !snapshot_path.exists() {
        return Err(CliError::NoDatabase(path.clone()).into());
    }

    let wal_data = read_file(&wal_path)?;
    let mut records = Vec::new();
    let wal = scan(&wal_data, |entry| {
        if show_records && limit.map_or(true, |max| records.len() < max) {
            records.push(describe(entry));
        }
    });

    let snapshot = if snapshot_path.exists() {
        Some(scan(&read_file(&snapshot_path)?, |_| {}))
    } else {
        None
    };

    let result = InspectResult {
        path: path.display().to_string(),
        wal,
        snapshot,
        records: show_records.then_some(records),
    };

    if ctx.json {
        return print_json(&result);
    }
    print_text_output(&result);
    Ok(())
}

fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let backend = FileBackend::open(path)?;
    Ok(backend.read_all()?)
}

fn scan(data: &[u8], mut visit: impl FnMut(&WalEntry)) -> LogStats {
    let mut stats = LogStats {
        size: data.len() as u64,
        ..LogStats::default()
    };
    let mut end = 0;
    for entry in WalRecordIterator::new(data) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                stats.error = Some(e.to_string());
                break;
            }
        };
        *stats
            .record_counts
            .entry(format!("{:?}", entry.record.record_type()))
            .or_default() += 1;
        match &entry.record {
            WalRecord::Commit { sequence, .. } => {
                stats.commits += 1;
                stats.last_sequence = stats.last_sequence.max(sequence.as_u64());
            }
            WalRecord::Checkpoint { sequence } => {
                stats.last_sequence = stats.last_sequence.max(sequence.as_u64());
            }
            _ => {}
        }
        end = entry.end();
        visit(&entry);
    }
    stats.trailing_bytes = stats.size - end;
    stats
}

fn describe(entry: &WalEntry) -> RecordInfo {
    let mut info = RecordInfo {
        offset: entry.offset,
        record_type: format!("{:?}", entry.record.record_type()),
        txid: entry.record.txid().map(|t| t.as_u64()),
        sequence: None,
        bucket: None,
        key: None,
        value_size: None,
    };
    match &entry.record {
        WalRecord::CreateBucket { path, .. } | WalRecord::DeleteBucket { path, .. } => {
            info.bucket = Some(render_path(path));
        }
        WalRecord::Put {
            bucket, key, value, ..
        } => {
            info.bucket = Some(render_path(bucket));
            info.key = Some(String::from_utf8_lossy(key).into_owned());
            info.value_size = Some(value.len());
        }
        WalRecord::Delete { bucket, key, .. } => {
            info.bucket = Some(render_path(bucket));
            info.key = Some(String::from_utf8_lossy(key).into_owned());
        }
        WalRecord::Commit { sequence, .. } | WalRecord::Checkpoint { sequence } => {
            info.sequence = Some(sequence.as_u64());
        }
        WalRecord::Begin { .. } => {}
    }
    info
}

fn render_path(path: &[Vec<u8>]) -> String {
    let parts: Vec<String> = path
        .iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect();
    format!("/{}", parts.join("/"))
}

fn print_stats(name: &str, stats: &LogStats) {
    println!("{name}:");
    println!("  Size:          {} bytes", stats.size);
    println!("  Commits:       {}", stats.commits);
    println!("  Last sequence: {}", stats.last_sequence);
    for (kind, count) in &stats.record_counts {
        println!("  {:<14} {}", format!("{kind}:"), count);
    }
    if stats.trailing_bytes > 0 {
        println!("  Trailing:      {} bytes", stats.trailing_bytes);
    }
    if let Some(error) = &stats.error {
        println!("  Error:         {error}");
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Database: {}", result.path);
    println!();
    print_stats("WAL", &result.wal);
    if let Some(snapshot) = &result.snapshot {
        println!();
        print_stats("Snapshot", snapshot);
    }
    if let Some(records) = &result.records {
        println!();
        println!("{:>10}  {:<13} {:>6} DETAIL", "OFFSET", "TYPE", "TXID");
        for r in records {
            let txid = r.txid.map(|t| t.to_string()).unwrap_or_default();
            let detail = match (&r.bucket, &r.key, r.sequence) {
                (Some(b), Some(k), _) => match r.value_size {
                    Some(n) => format!("{b} {k} ({n} bytes)"),
                    None => format!("{b} {k}"),
                },
                (Some(b), None, _) => b.clone(),
                (_, _, Some(seq)) => format!("seq {seq}"),
                _ => String::new(),
            };
            println!(
                "{:>10}  {:<13} {:>6} {}",
                r.offset, r.record_type, txid, detail
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvstudy_core::{SequenceNumber, TransactionId};

    fn sample_log() -> Vec<u8> {
        let txid = TransactionId::new(1);
        let records = [
            WalRecord::Begin { txid },
            WalRecord::CreateBucket {
                txid,
                path: vec![b"study".to_vec()],
            },
            WalRecord::Put {
                txid,
                bucket: vec![b"study".to_vec()],
                key: b"alice".to_vec(),
                value: b"{}".to_vec(),
            },
            WalRecord::Commit {
                txid,
                sequence: SequenceNumber::new(4),
            },
        ];
        records.iter().flat_map(|r| r.encode().unwrap()).collect()
    }

    #[test]
    fn scan_counts_records_and_tail() {
        let mut data = sample_log();
        data.extend_from_slice(b"QV");
        let mut seen = 0;
        let stats = scan(&data, |_| seen += 1);
        assert_eq!(seen, 4);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.last_sequence, 4);
        assert_eq!(stats.trailing_bytes, 2);
        assert_eq!(stats.record_counts["Put"], 1);
        assert!(stats.error.is_none());
    }

    #[test]
    fn scan_reports_corruption() {
        let mut data = sample_log();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let stats = scan(&data, |_| {});
        assert!(stats.error.is_some());
        assert_eq!(stats.commits, 0);
    }

    #[test]
    fn describes_puts() {
        let data = sample_log();
        let entries: Vec<_> = WalRecordIterator::new(&data)
            .collect::<Result<_, _>>()
            .unwrap();
        let info = describe(&entries[2]);
        assert_eq!(info.bucket.as_deref(), Some("/study"));
        assert_eq!(info.key.as_deref(), Some("alice"));
        assert_eq!(info.value_size, Some(2));
        assert_eq!(describe(&entries[3]).sequence, Some(4));
    }
}
