// fraudsig/src/ingest.rs
//
// Transaction feed readers. One JSON record per line:
//   {"sender_account_id":..,"receiver_account_id":..,"amount":..,"booking_time":..}
//
//   load_jsonl — read a whole file, return the parsed records
//   tail_jsonl — follow a growing file, forward records over a channel
//
// Malformed lines are logged and skipped; they never abort a load.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;
use crate::events::Transaction;

fn parse_line(line: &str, lineno: usize) -> Option<Transaction> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Transaction>(line) {
        Ok(tx) => Some(tx),
        Err(e) => {
            warn!("Parse error at line {}: {}", lineno, e);
            None
        }
    }
}

pub async fn load_jsonl(path: &Path) -> Result<Vec<Transaction>> {
    let content = tokio::fs::read_to_string(path).await?;
    let txs: Vec<Transaction> = content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(line, i + 1))
        .collect();
    info!("Loaded {} transactions from {}", txs.len(), path.display());
    Ok(txs)
}

/// Follow `path`, sending each record as it appears. Returns when the
/// receiver is dropped.
pub async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<Transaction>, seek_end: bool) -> Result<()> {
    let file = tokio::fs::File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut lineno = 0usize;

    if seek_end {
        while lines.next_line().await?.is_some() {
            lineno += 1;
        }
    }

    info!("Tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                lineno += 1;
                if let Some(record) = parse_line(&line, lineno) {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
            }
            None => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
        }
    }
    Ok(())
}
