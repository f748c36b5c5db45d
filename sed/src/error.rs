//! Error types shared by the script parser, execution engine, and CLI front
//! end.

use std::path::PathBuf;
use thiserror::Error;

/// Every way a run can fail, from a bad script to a runtime I/O error.
#[derive(Debug, Error)]
pub enum SedError {
    #[error("{offset}: {message}")]
    ScriptParse { offset: usize, message: String },

    #[error("undefined label: {0}")]
    UndefinedLabel(String),

    #[error("unknown command: `{0}`")]
    UnknownCommand(char),

    #[error("invalid regular expression `{pattern}`: {message}")]
    RegexCompile { pattern: String, message: String },

    #[error("can't read {path}: {source}")]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read error on {path}: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write error: {0}")]
    OutputWrite(#[from] std::io::Error),

    #[error("`{command}` is disabled in sandbox mode")]
    SandboxViolation { command: char },

    #[error("command execution failed: {0}")]
    ShellExec(String),

    #[error("in-place edit of {path} failed: {message}")]
    InPlace { path: PathBuf, message: String },
}

pub type SedResult<T> = Result<T, SedError>;
