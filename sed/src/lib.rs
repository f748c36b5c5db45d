//! An embeddable stream editor: a `sed`-compatible command language, an
//! execution engine that drives a pattern-space/hold-space state machine
//! over input records, and a small builder API (`Sed`) for callers that
//! want to run it without going through the command-line front end.

pub mod engine;
pub mod error;
pub mod reader;
pub mod regex_adapter;
pub mod script;
pub mod sink;

use std::io::Write;
use std::path::{Path, PathBuf};

pub use engine::{Engine, EngineConfig};
pub use error::{SedError, SedResult};
pub use reader::RecordReader;
pub use regex_adapter::Dialect;
pub use script::Program;
pub use sink::Sink;

/// Builder mirroring the CLI surface, for embedding the editor directly
/// rather than spawning the `sed` binary.
#[derive(Debug, Clone)]
pub struct Sed {
    pub suppress_default_print: bool,
    pub dialect: Dialect,
    pub posix: bool,
    pub sandbox: bool,
    pub separate: bool,
    pub unbuffered: bool,
    pub terminator: u8,
    pub list_width: usize,
    pub debug: bool,
    expressions: Vec<String>,
    files: Vec<PathBuf>,
}

impl Default for Sed {
    fn default() -> Self {
        Sed {
            suppress_default_print: false,
            dialect: Dialect::default(),
            posix: false,
            sandbox: false,
            separate: false,
            unbuffered: false,
            terminator: b'\n',
            list_width: 70,
            debug: false,
            expressions: Vec::new(),
            files: Vec::new(),
        }
    }
}

impl Sed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `script` to the program text, separated from any prior
    /// expression by the configured terminator.
    pub fn add_expression(&mut self, script: impl Into<String>) -> &mut Self {
        self.expressions.push(script.into());
        self
    }

    /// Reads `path` and appends its contents to the program text.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> SedResult<&mut Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| SedError::InputOpen {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        self.expressions.push(contents);
        Ok(self)
    }

    /// Appends one or more already-assembled command snippets.
    pub fn add_command(&mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        for c in commands {
            self.expressions.push(c.into());
        }
        self
    }

    pub fn clear_commands(&mut self) -> &mut Self {
        self.expressions.clear();
        self
    }

    pub fn clear_files(&mut self) -> &mut Self {
        self.files.clear();
        self
    }

    /// Queues an input file to read records from; if none are queued,
    /// `execute` reads standard input.
    pub fn add_input_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.files.push(path.into());
        self
    }

    fn assemble_script(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (i, expr) in self.expressions.iter().enumerate() {
            if i > 0 {
                bytes.push(self.terminator);
            }
            bytes.extend_from_slice(expr.as_bytes());
        }
        bytes
    }

    /// Parses the accumulated expressions into a `Program`, without
    /// running it. Useful for validating a script ahead of time.
    pub fn compile(&self) -> SedResult<Program> {
        script::parse(&self.assemble_script(), self.terminator)
    }

    /// Builds the program and runs it over the configured input files (or
    /// standard input), writing to `writer`. Returns the process exit code
    /// (0 unless a `q`/`Q` command supplied one).
    pub fn execute<W: Write>(&self, writer: W) -> SedResult<i32> {
        let mut program = self.compile()?;
        program.suppress_default_print |= self.suppress_default_print;

        let file_names: Vec<String> = self
            .files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let reader = RecordReader::new(file_names, self.terminator, self.separate);
        let sink = Sink::new(writer, self.unbuffered);
        let config = EngineConfig {
            terminator: self.terminator,
            suppress_default_print: program.suppress_default_print,
            dialect: self.dialect,
            posix: self.posix,
            sandbox: self.sandbox,
            separate: self.separate,
            unbuffered: self.unbuffered,
            list_width: self.list_width,
            debug: self.debug,
        };
        let mut engine = Engine::new(&program, reader, sink, config);
        engine.run()
    }
}
