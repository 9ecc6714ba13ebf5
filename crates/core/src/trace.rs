use std::io::{BufRead, Lines};

use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::{error::DiftError, instruction::InstructionFacts};

/// One dynamically executed instruction together with the effective
/// addresses it accessed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionEvent {
    #[serde(flatten)]
    pub facts: InstructionFacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ea: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_ea: Option<u64>,
}

impl InstructionEvent {
    pub fn new(facts: InstructionFacts) -> Self {
        Self {
            facts,
            read_ea: None,
            write_ea: None,
        }
    }

    pub fn reading(mut self, ea: u64) -> Self {
        self.read_ea = Some(ea);
        self
    }

    pub fn writing(mut self, ea: u64) -> Self {
        self.write_ea = Some(ea);
        self
    }
}

/// A serialized stream of executed instructions.
#[automock]
pub trait InstructionSource {
    /// Returns the next executed instruction.
    /// None once the stream is exhausted.
    fn next_event(&mut self) -> Result<Option<InstructionEvent>, DiftError>;
}

/// Reads one JSON-encoded `InstructionEvent` per line.
/// Blank lines and lines starting with `#` are skipped.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> InstructionSource for JsonLinesSource<R> {
    fn next_event(&mut self) -> Result<Option<InstructionEvent>, DiftError> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event = serde_json::from_str(line).map_err(|e| {
                DiftError::Trace(format!("line {}: {}", self.line_no, e))
            })?;
            return Ok(Some(event));
        }
        Ok(None)
    }
}
