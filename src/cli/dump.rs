use crate::cli::{parse_username, CliContext};
use crate::core::Key;
use crate::models::credential::CredentialRecord;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use zeroize::Zeroizing;

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[arg(value_parser = parse_username)]
    pub username: String,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Allow verifier material on stdout (json format)
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(value_parser = parse_username)]
    pub username: String,
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn format_expiry(expiry: i64) -> String {
    match expiry {
        0 => "never".to_string(),
        e if e < 0 => "revoked".to_string(),
        e => match DateTime::<Utc>::from_timestamp(e, 0) {
            Some(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => e.to_string(),
        },
    }
}

pub fn run_dump(ctx: &CliContext, args: DumpArgs) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }
    if args.format == "json" && !args.confirm {
        bail!("refusing to print verifier material to stdout without --confirm");
    }

    let store = ctx.store()?;
    let records = store
        .dump(&args.username, &ctx.decrypt())
        .with_context(|| format!("dump credentials for '{}'", args.username))?;

    if args.format == "json" {
        let json = Zeroizing::new(serde_json::to_string_pretty(&records).context("serialize records")?);
        println!("{}", json.as_str());
        return Ok(());
    }

    print_records(&records);
    Ok(())
}

fn print_records(records: &[CredentialRecord]) {
    if records.is_empty() {
        println!("No credentials cached");
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header(&["ID", "User", "Algorithm", "Iterations", "Expires"]));
    for record in records {
        table.add_row(vec![
            Cell::new(record.record_id),
            Cell::new(&record.username),
            Cell::new(record.algorithm),
            Cell::new(record.iteration_count),
            Cell::new(format_expiry(record.expiry)),
        ]);
    }
    println!("{table}");
}

pub fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    let store = ctx.store()?;
    let keys = store
        .entries(&args.username)
        .with_context(|| format!("list credentials for '{}'", args.username))?;
    print_keys(&keys);
    Ok(())
}

fn print_keys(keys: &[Key]) {
    if keys.is_empty() {
        println!("No credentials cached");
        return;
    }
    let optional = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header(&["Serial", "Description", "UID", "GID", "Permissions"]));
    for key in keys {
        table.add_row(vec![
            Cell::new(key.serial()),
            Cell::new(key.description()),
            Cell::new(optional(key.uid())),
            Cell::new(optional(key.gid())),
            Cell::new(
                key.permissions()
                    .map(|p| format!("{:08x}", p))
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }
    println!("{table}");
}

pub fn run_users(ctx: &CliContext) -> Result<()> {
    let store = ctx.store()?;
    let users = store.users().context("list cached users")?;
    if users.is_empty() {
        println!("No users cached");
        return Ok(());
    }
    for user in users {
        println!("{}", user);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry(0), "never");
        assert_eq!(format_expiry(-1), "revoked");
        assert_eq!(format_expiry(1_700_000_000).len(), "2023-11-14 22:13:20".len());
    }
}
