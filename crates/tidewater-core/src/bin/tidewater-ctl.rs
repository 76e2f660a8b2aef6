// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tidewater Control CLI
//!
//! Read-only operator view of the per-table status store.
//!
//! Usage:
//!   tidewater-ctl <command> [options]
//!
//! Commands:
//!   list [--limit <n>] [--offset <n>]
//!   status <task_id> <table>
//!   cursor <task_id> <table>

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tidewater_core::persistence::{SqliteStatusStore, StatusStore};

const DATABASE_URL_VAR: &str = "TIDEWATER_STATUS_DATABASE_URL";

fn print_usage() {
    eprintln!(
        r#"Usage: tidewater-ctl <command> [options]

Inspect table replication status records.

COMMANDS:
    list                            List status records
    status <task_id> <table>        Show one table's status record
    cursor <task_id> <table>        Show the CDC files already consumed

LIST OPTIONS:
    --limit <n>                     Max results (default: 100)
    --offset <n>                    Records to skip (default: 0)

ENVIRONMENT:
    TIDEWATER_STATUS_DATABASE_URL   SQLite URL of the status store (required)
    RUST_LOG                        Log filter (default: tidewater_core=info)

EXAMPLES:
    tidewater-ctl list --limit 20
    tidewater-ctl status orders-fl ORDERS
"#
    );
}

#[derive(Debug, PartialEq)]
enum Command {
    List { limit: i64, offset: i64 },
    Status { task_id: String, table_name: String },
    Cursor { task_id: String, table_name: String },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            std::process::exit(0);
        }
        "list" => {
            let mut limit: i64 = 100;
            let mut offset: i64 = 0;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--limit" => {
                        i += 1;
                        limit = args
                            .get(i)
                            .ok_or("--limit requires a number")?
                            .parse()
                            .map_err(|_| "Invalid limit")?;
                    }
                    "--offset" => {
                        i += 1;
                        offset = args
                            .get(i)
                            .ok_or("--offset requires a number")?
                            .parse()
                            .map_err(|_| "Invalid offset")?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::List { limit, offset })
        }
        "status" => {
            let (task_id, table_name) = record_key(args)?;
            Ok(Command::Status { task_id, table_name })
        }
        "cursor" => {
            let (task_id, table_name) = record_key(args)?;
            Ok(Command::Cursor { task_id, table_name })
        }
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn record_key(args: &[String]) -> Result<(String, String), String> {
    let task_id = args.get(2).ok_or("Task ID required")?.clone();
    let table_name = args.get(3).ok_or("Table name required")?.clone();
    Ok((task_id, table_name))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tidewater_core=info")),
        )
        .init();

    let cmd = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match execute_command(cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute_command(cmd: Command) -> Result<()> {
    let url = std::env::var(DATABASE_URL_VAR).with_context(|| format!("{} is not set", DATABASE_URL_VAR))?;
    debug!(url = %url, "Connecting to status store");
    let store = SqliteStatusStore::connect(&url).await?;

    match cmd {
        Command::List { limit, offset } => {
            let records = store.list_items(limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Command::Status { task_id, table_name } => {
            let record = store
                .get_item(&task_id, &table_name)
                .await?
                .with_context(|| format!("No status record for {}/{}", task_id, table_name))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::Cursor { task_id, table_name } => {
            let record = store
                .get_item(&task_id, &table_name)
                .await?
                .with_context(|| format!("No status record for {}/{}", task_id, table_name))?;
            for file in &record.consumed_cdc_files {
                println!("{}", file);
            }
        }
    }

    Ok(())
}
