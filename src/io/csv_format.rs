//! CSV format handling for replay scripts and the transaction table
//!
//! This module centralizes all CSV format concerns:
//! - `CommandRecord` for deserializing script rows
//! - Conversion from script rows to [`Command`]s
//! - Serialization of the final transaction table
//!
//! All functions are pure (no I/O beyond the given writer).

use crate::core::ReplayRow;
use crate::types::{Action, Command, Role};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Script row as read from CSV
///
/// Every column except `action` and `actor` is optional; which ones an action
/// needs is decided by the replay engine.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct CommandRecord {
    pub action: String,
    pub actor: String,
    pub tx: Option<String>,
    pub target: Option<String>,
    pub amount: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub radius_km: Option<String>,
    pub name: Option<String>,
    pub account: Option<String>,
    pub holder: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub text: Option<String>,
}

/// Convert a script row into a [`Command`]
///
/// Empty cells become `None`. Numeric and enumerated columns are parsed here,
/// so a malformed row is rejected before it reaches the engine.
///
/// # Returns
///
/// * `Ok(Command)` - the parsed command
/// * `Err(String)` - a message naming the offending column
pub fn convert_command_record(record: CommandRecord) -> Result<Command, String> {
    let action = Action::from_str(&record.action).map_err(|e| e.to_string())?;
    let actor = record.actor.trim();
    if actor.is_empty() {
        return Err(format!("{} command has no actor", action));
    }

    let mut command = Command::new(action, actor);
    command.tx = non_empty(record.tx);
    command.target = non_empty(record.target);
    command.amount = parse_decimal(record.amount, "amount")?;
    command.min_amount = parse_decimal(record.min_amount, "min_amount")?;
    command.max_amount = parse_decimal(record.max_amount, "max_amount")?;
    command.latitude = parse_float(record.latitude, "latitude")?;
    command.longitude = parse_float(record.longitude, "longitude")?;
    command.radius_km = parse_float(record.radius_km, "radius_km")?;
    command.name = non_empty(record.name);
    command.account = non_empty(record.account);
    command.holder = non_empty(record.holder);
    command.email = non_empty(record.email);
    command.role = non_empty(record.role)
        .map(|role| Role::from_str(&role))
        .transpose()
        .map_err(|e| e.to_string())?;
    command.status = non_empty(record.status);
    command.text = non_empty(record.text);

    if action.is_transaction_scoped() && command.tx.is_none() {
        return Err(format!("{} command requires a 'tx' label", action));
    }

    Ok(command)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_decimal(value: Option<String>, column: &str) -> Result<Option<Decimal>, String> {
    non_empty(value)
        .map(|v| Decimal::from_str(&v).map_err(|_| format!("Invalid {} '{}'", column, v)))
        .transpose()
}

fn parse_float(value: Option<String>, column: &str) -> Result<Option<f64>, String> {
    non_empty(value)
        .map(|v| v.parse::<f64>().map_err(|_| format!("Invalid {} '{}'", column, v)))
        .transpose()
}

/// Write the final transaction table
///
/// Columns: tx, code, user, provider, status, requested, commission, total,
/// events, dispute. Rows are sorted by label and amounts carry two decimals.
pub fn write_transactions_csv(rows: &[ReplayRow], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "tx",
            "code",
            "user",
            "provider",
            "status",
            "requested",
            "commission",
            "total",
            "events",
            "dispute",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| a.label.cmp(&b.label));

    for row in sorted {
        writer
            .write_record(&[
                row.label,
                row.code,
                row.user,
                row.provider,
                row.status.to_string(),
                format!("{:.2}", row.requested),
                format!("{:.2}", row.commission),
                format!("{:.2}", row.total),
                row.events.to_string(),
                row.dispute.to_string(),
            ])
            .map_err(|e| format!("Failed to write transaction record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
