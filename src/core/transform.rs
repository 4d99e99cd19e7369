//! Pluggable payload transforms applied around storage.
//!
//! `commit` runs the encrypt transform over each serialized record and
//! `dump` runs the decrypt transform over each stored payload. The two must
//! round-trip; a mismatched pair shows up as a corrupt payload on dump.

use crate::util::command;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

pub trait PayloadTransform {
    fn transform(&self, input: &str) -> Result<String, TransformError>;
}

impl<F> PayloadTransform for F
where
    F: Fn(&str) -> Result<String, TransformError>,
{
    fn transform(&self, input: &str) -> Result<String, TransformError> {
        self(input)
    }
}

/// Identity transform. Payloads are then protected only by key permissions.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl PayloadTransform for Plaintext {
    fn transform(&self, input: &str) -> Result<String, TransformError> {
        Ok(input.to_string())
    }
}

/// Pipes the payload through an external command.
#[derive(Clone)]
pub struct CommandTransform {
    argv: Vec<String>,
}

impl CommandTransform {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl fmt::Debug for CommandTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandTransform({})", self.argv.join(" "))
    }
}

impl PayloadTransform for CommandTransform {
    fn transform(&self, input: &str) -> Result<String, TransformError> {
        let out = command::filter(&self.argv, input.as_bytes())
            .map_err(|e| TransformError(format!("{:#}", e)))?;
        let text = std::str::from_utf8(&out)
            .map_err(|_| TransformError(format!("{} produced non-UTF-8 output", self.argv.join(" "))))?;
        Ok(text.to_string())
    }
}
