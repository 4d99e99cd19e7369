use crate::cli::{parse_username, CliContext};
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct ClearArgs {
    #[arg(value_parser = parse_username)]
    pub username: String,
}

pub fn run_clear(ctx: &CliContext, args: ClearArgs) -> Result<()> {
    let store = ctx.store()?;
    store
        .clear_user(&args.username)
        .with_context(|| format!("clear credentials for '{}'", args.username))?;
    println!("Cleared cached credentials for '{}'", args.username);
    Ok(())
}

pub fn run_clear_all(ctx: &CliContext) -> Result<()> {
    let store = ctx.store()?;
    let cleared = store.clear_all().context("clear all cached credentials")?;
    println!("Cleared cached credentials for {} user(s)", cleared);
    Ok(())
}
