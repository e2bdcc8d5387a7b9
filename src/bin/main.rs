// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use till_ledger::{
    BalanceReport, Clock, EventError, EventId, FixedClock, IngestReport, Ledger, LedgerConfig,
    RawEvent, SystemClock, Window, WithdrawalEntry, WithdrawalReceipt, WithdrawalRequest,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Till Ledger - Cash balance for a retail till
///
/// Loads upstream events from a CSV file, then reports balances, lists
/// withdrawals, or authorizes a withdrawal against the loaded history.
/// Results are written to stdout as CSV; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "till-ledger")]
#[command(about = "Cash balance ledger for a retail till", long_about = None)]
struct Args {
    /// Path to CSV file with upstream events
    ///
    /// Expected format: kind,amount,occurred_at,memo
    /// Example: till-ledger --events events.csv balance --window today
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Evaluate windows as of this instant (RFC 3339) instead of the wall clock
    #[arg(long, value_name = "TIMESTAMP")]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the balance for a window
    Balance {
        /// today, week, month, year or all-time
        #[arg(long, default_value = "all-time")]
        window: Window,
    },
    /// List withdrawals, newest first
    Withdrawals {
        /// Only withdrawals inside this window
        #[arg(long)]
        window: Option<Window>,
    },
    /// Take cash out of the till
    Withdraw {
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        memo: Option<String>,
    },
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match LedgerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => LedgerConfig::default(),
    };

    let clock: Arc<dyn Clock> = match args.now {
        Some(now) => Arc::new(FixedClock::new(now)),
        None => Arc::new(SystemClock),
    };

    let ledger = match Ledger::with_clock(config, clock) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("Error in config: {}", e);
            process::exit(1);
        }
    };

    let mut report = LoadReport::default();
    if let Some(path) = &args.events {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error opening file '{}': {}", path.display(), e);
                process::exit(1);
            }
        };
        report = match load_events(&ledger, BufReader::new(file)) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("Error reading events: {}", e);
                process::exit(1);
            }
        };
        info!(
            accepted = report.ingest.accepted,
            malformed = report.ingest.skipped_malformed,
            unreadable = report.unreadable_rows,
            unknown_kinds = ?report.ingest.unknown_kinds,
            "events loaded"
        );
    }

    let stdout = std::io::stdout();
    let result = match args.command {
        Command::Balance { window } => match ledger.get_balance(window) {
            Ok(balance) => write_balance(&balance, report.unreadable_rows, stdout),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        Command::Withdrawals { window } => match ledger.list_withdrawals(window) {
            Ok(entries) => write_withdrawals(&entries, stdout),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        Command::Withdraw { amount, memo } => {
            let request = WithdrawalRequest { amount, memo };
            match ledger.withdraw(request) {
                Ok(receipt) => write_receipt(&receipt, stdout),
                Err(e) => {
                    eprintln!("Withdrawal rejected: {}", e);
                    process::exit(1);
                }
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Raw CSV record matching the input format.
///
/// Fields: `kind, amount, occurred_at, memo`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    kind: String,
    amount: Option<String>,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    memo: Option<String>,
}

impl CsvRecord {
    fn into_parts(self) -> (String, RawEvent) {
        let raw = RawEvent {
            amount: self.amount,
            occurred_at: self.occurred_at,
            memo: self.memo,
        };
        (self.kind, raw)
    }
}

/// Outcome of loading an events file.
#[derive(Debug, Default)]
struct LoadReport {
    ingest: IngestReport,
    /// Rows the CSV reader rejected before they reached the ledger.
    unreadable_rows: u64,
}

/// Loads upstream events from a CSV reader into the ledger.
///
/// Streams the input, so arbitrarily large files are never held in memory.
/// Rows that cannot be read at all (bad timestamp, wrong column count) never
/// reach the ledger and are counted separately from events it rejects.
///
/// # CSV Format
///
/// ```csv
/// kind,amount,occurred_at,memo
/// sale,500.00,2025-03-01T09:00:00Z,
/// expense,50.00,2025-03-01T10:00:00Z,Cleaning supplies
/// ```
///
/// # Errors
///
/// Returns a CSV error only if the header itself cannot be read.
fn load_events<R: Read>(ledger: &Ledger, reader: R) -> Result<LoadReport, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // memo column is optional
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut report = LoadReport::default();
    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let (kind, raw) = record.into_parts();
                let ingest = &mut report.ingest;
                match ledger.ingest(&raw, &kind) {
                    Ok(_) => ingest.accepted += 1,
                    Err(EventError::MalformedEvent(_)) => ingest.skipped_malformed += 1,
                    Err(EventError::UnknownEventKind(kind)) => ingest.unknown_kinds.push(kind),
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable row");
                report.unreadable_rows += 1;
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
    opening_balance: Decimal,
    net_movement: Decimal,
    closing_balance: Decimal,
    as_of: Option<EventId>,
    skipped: u64,
}

/// Writes one balance row.
///
/// `skipped` is the ledger's malformed-event count plus the rows the CSV
/// reader rejected before they reached the ledger.
fn write_balance<W: Write>(
    balance: &BalanceReport,
    unreadable_rows: u64,
    writer: W,
) -> Result<(), csv::Error> {
    let snapshot = &balance.snapshot;
    let mut wtr = Writer::from_writer(writer);
    wtr.serialize(BalanceRow {
        window_start: snapshot.window_start,
        window_end: snapshot.window_end,
        opening_balance: snapshot.opening_balance,
        net_movement: snapshot.net_movement,
        closing_balance: snapshot.closing_balance,
        as_of: snapshot.as_of_event_id,
        skipped: balance.skipped_count + unreadable_rows,
    })?;
    wtr.flush()?;
    Ok(())
}

fn write_withdrawals<W: Write>(entries: &[WithdrawalEntry], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in entries {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ReceiptRow<'a> {
    id: EventId,
    amount: Decimal,
    memo: &'a str,
    occurred_at: DateTime<Utc>,
    closing_balance: Decimal,
}

fn write_receipt<W: Write>(receipt: &WithdrawalReceipt, writer: W) -> Result<(), csv::Error> {
    let event = &receipt.event;
    let mut wtr = Writer::from_writer(writer);
    wtr.serialize(ReceiptRow {
        id: event.id(),
        amount: event.amount().abs(),
        memo: event.memo().unwrap_or_default(),
        occurred_at: event.occurred_at(),
        closing_balance: receipt.closing_balance,
    })?;
    wtr.flush()?;
    Ok(())
}
