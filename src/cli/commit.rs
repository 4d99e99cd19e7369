use crate::cli::{parse_username, CliContext};
use crate::constants;
use crate::models::credential::CredentialRecord;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// User whose credential set is replaced
    #[arg(value_parser = parse_username)]
    pub username: String,

    /// JSON array of records; `-` or omitted reads stdin
    #[arg(long, value_name = "PATH")]
    pub from: Option<PathBuf>,
}

pub fn run(ctx: &CliContext, args: CommitArgs) -> Result<()> {
    let raw = match args.from.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            read_bounded(file).with_context(|| format!("read {}", path.display()))?
        }
        _ => read_bounded(std::io::stdin().lock()).context("read records from stdin")?,
    };
    let records = parse_records(&raw)?;

    let store = ctx.store()?;
    let summary = store
        .commit(&args.username, &records, &ctx.encrypt())
        .with_context(|| format!("commit credentials for '{}'", args.username))?;

    println!(
        "Committed {} credential(s) for '{}' (skipped {} revoked, {} expired)",
        summary.stored, args.username, summary.skipped_revoked, summary.skipped_expired
    );
    Ok(())
}

fn read_bounded(reader: impl Read) -> Result<Zeroizing<String>> {
    let mut raw = Zeroizing::new(String::new());
    reader
        .take(constants::MAX_RECORDS_INPUT as u64 + 1)
        .read_to_string(&mut raw)?;
    if raw.len() > constants::MAX_RECORDS_INPUT {
        bail!("input exceeds {} bytes", constants::MAX_RECORDS_INPUT);
    }
    Ok(raw)
}

fn parse_records(raw: &str) -> Result<Vec<CredentialRecord>> {
    serde_json::from_str(raw).context("parse credential records (expected a JSON array)")
}
