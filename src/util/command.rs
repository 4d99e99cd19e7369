//! Run external filter commands (e.g. `systemd-creds encrypt - -`).

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use zeroize::Zeroizing;

/// Feed `input` to `argv` on stdin and return its stdout.
///
/// Secrets never touch disk or the command line; the returned buffer is
/// zeroized on drop.
pub fn filter(argv: &[String], input: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let (program, args) = match argv.split_first() {
        Some(split) => split,
        None => bail!("empty filter command"),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {}", program))?;

    let mut stdin = child.stdin.take().context("open filter stdin")?;
    let mut stdout = child.stdout.take().context("open filter stdout")?;
    let mut stderr = child.stderr.take().context("open filter stderr")?;

    // stdin and stderr are pumped on their own threads so a filter that
    // fills either pipe cannot deadlock against the stdout read.
    let (output, diagnostics) = std::thread::scope(|scope| -> Result<(Zeroizing<Vec<u8>>, String)> {
        let writer = scope.spawn(move || -> std::io::Result<()> {
            stdin.write_all(input)?;
            stdin.flush()
        });
        let reader = scope.spawn(move || -> std::io::Result<String> {
            let mut text = String::new();
            stderr.read_to_string(&mut text)?;
            Ok(text)
        });
        let mut out = Zeroizing::new(Vec::new());
        stdout
            .read_to_end(&mut out)
            .with_context(|| format!("read output of {}", program))?;
        let diagnostics = match reader.join() {
            Ok(res) => res.with_context(|| format!("read diagnostics of {}", program))?,
            Err(_) => bail!("stderr reader for {} panicked", program),
        };
        match writer.join() {
            Ok(res) => res.with_context(|| format!("write input to {}", program))?,
            Err(_) => bail!("writer thread for {} panicked", program),
        }
        Ok((out, diagnostics))
    })?;

    let status = child.wait().with_context(|| format!("wait for {}", program))?;
    if !status.success() {
        bail!("command failed: {} ({}): {}", program, status, diagnostics.trim());
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filter_passes_through_cat() {
        let out = filter(&argv(&["cat"]), b"hello").unwrap();
        assert_eq!(out.as_slice(), b"hello");
    }

    #[test]
    fn test_filter_large_input() {
        let input = vec![b'a'; 256 * 1024];
        let out = filter(&argv(&["cat"]), &input).unwrap();
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn test_filter_failure_reports_stderr() {
        let err = filter(&argv(&["sh", "-c", "echo boom >&2; exit 3"]), b"").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_filter_survives_chatty_stderr() {
        let script = "head -c 200000 /dev/zero | tr '\\0' x >&2; cat";
        let out = filter(&argv(&["sh", "-c", script]), b"payload").unwrap();
        assert_eq!(out.as_slice(), b"payload");
    }

    #[test]
    fn test_filter_failure_after_chatty_stderr() {
        let script = "head -c 200000 /dev/zero | tr '\\0' x >&2; echo boom >&2; exit 1";
        let err = filter(&argv(&["sh", "-c", script]), b"").unwrap_err();
        assert!(err.to_string().ends_with("boom"));
    }

    #[test]
    fn test_empty_argv_rejected() {
        assert!(filter(&[], b"x").is_err());
    }
}
