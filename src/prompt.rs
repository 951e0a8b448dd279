use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Input closed before {0:?} was answered")]
    Eof(String),

    #[error("No answer given to {0:?}")]
    Empty(String),

    #[error("Terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Writes `label`, then reads one line of input with surrounding whitespace removed.
pub fn prompt<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    label: &str,
) -> Result<String, PromptError> {
    write!(writer, "{label}")?;
    writer.flush()?;

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(PromptError::Eof(label.trim().to_string()));
    }

    let answer = line.trim();
    if answer.is_empty() {
        return Err(PromptError::Empty(label.trim().to_string()));
    }
    Ok(answer.to_string())
}
