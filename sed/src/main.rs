//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

extern crate clap;
extern crate plib;

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use gettextrs::{bind_textdomain_codeset, textdomain};
use plib::PROJECT_NAME;

use sed::regex_adapter::Dialect;
use sed::{Engine, EngineConfig, RecordReader, Sink};

/// sed - stream editor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Suppress the default output; only lines explicitly selected for
    /// output (via the `p` command or `s///p` flag) are written.
    #[arg(short = 'n', long = "quiet", visible_alias = "silent")]
    quiet: bool,

    /// Add the editing commands in script to the end of the script of
    /// editing commands. May be specified more than once.
    #[arg(short = 'e', long = "expression")]
    expression: Vec<String>,

    /// Add the editing commands contained in the file script_file to the
    /// end of the script of editing commands. May be specified more than
    /// once.
    #[arg(short = 'f', long = "file")]
    script_file: Vec<PathBuf>,

    /// Edit files in place, taking a backup if a suffix is given.
    #[arg(short = 'i', long = "in-place", num_args = 0..=1, default_missing_value = "")]
    in_place: Option<String>,

    /// When editing in place, follow symlinks rather than replacing them.
    #[arg(long = "follow-symlinks")]
    follow_symlinks: bool,

    /// Specify the default line-wrap length for the `l` command.
    #[arg(short = 'l', long = "line-length", default_value_t = 70)]
    line_length: usize,

    /// Disable all GNU extensions, for strict POSIX behavior.
    #[arg(long = "posix")]
    posix: bool,

    /// Match using extended regular expressions.
    #[arg(short = 'E', short_alias = 'r', long = "regexp-extended")]
    extended_regexp: bool,

    /// Consider files as separate rather than as a single, continuous
    /// stream: `$` matches the last line of each file, not just the last
    /// overall.
    #[arg(short = 's', long = "separate")]
    separate: bool,

    /// Operate in sandbox mode, disabling the `e`, `r`, `R`, `w`, and `W`
    /// commands.
    #[arg(long = "sandbox")]
    sandbox: bool,

    /// Flush the output stream after every line.
    #[arg(short = 'u', long = "unbuffered")]
    unbuffered: bool,

    /// Use NUL as the record separator instead of newline.
    #[arg(short = 'z', long = "null-data")]
    null_data: bool,

    /// Use the given byte as the record separator instead of newline
    /// (accepts `\n`, `\0`, `\t`, `\r`, or a single literal character).
    #[arg(long = "end")]
    end: Option<String>,

    /// Annotate the execution trace (which commands fired, on which line)
    /// on standard error as the script runs.
    #[arg(long = "debug")]
    debug: bool,

    /// Extend error messages with a context trail (script location for
    /// parse errors).
    #[arg(long = "verbose")]
    verbose: bool,

    /// The script of editing commands, if none was given via `-e`/`-f`.
    script: Option<String>,

    /// Input files to read and edit; `-` or no operand means standard
    /// input.
    input_files: Vec<String>,
}

impl Args {
    fn terminator(&self) -> Result<u8, Box<dyn Error>> {
        if self.null_data {
            return Ok(0);
        }
        match &self.end {
            None => Ok(b'\n'),
            Some(s) => parse_terminator(s),
        }
    }

    fn dialect(&self) -> Dialect {
        if self.extended_regexp {
            Dialect::Extended
        } else {
            Dialect::Basic
        }
    }

    /// Assembles the full script text and the list of input files,
    /// resolving the ambiguity between a bare positional script and a
    /// bare positional input file.
    fn resolve_script_and_files(&self) -> Result<(String, Vec<String>), Box<dyn Error>> {
        let have_explicit_script = !self.expression.is_empty() || !self.script_file.is_empty();

        let mut pieces: Vec<String> = Vec::new();
        for e in &self.expression {
            pieces.push(e.clone());
        }
        for f in &self.script_file {
            pieces.push(std::fs::read_to_string(f)?);
        }

        let mut input_files = self.input_files.clone();
        if have_explicit_script {
            if let Some(script) = &self.script {
                input_files.insert(0, script.clone());
            }
        } else {
            match &self.script {
                Some(script) => pieces.push(script.clone()),
                None => return Err("no script specified".into()),
            }
        }

        Ok((pieces.join("\n"), input_files))
    }
}

fn parse_terminator(s: &str) -> Result<u8, Box<dyn Error>> {
    match s {
        "\\n" | "n" => Ok(b'\n'),
        "\\0" | "0" => Ok(0),
        "\\t" | "t" => Ok(b'\t'),
        "\\r" | "r" => Ok(b'\r'),
        other if other.len() == 1 => Ok(other.as_bytes()[0]),
        other => Err(format!("invalid record terminator: {other}").into()),
    }
}

fn run(args: &Args) -> Result<i32, Box<dyn Error>> {
    let (script_text, input_files) = args.resolve_script_and_files()?;
    let terminator = args.terminator()?;

    let mut program = sed::script::parse(script_text.as_bytes(), terminator)?;
    program.suppress_default_print |= args.quiet;

    let config = EngineConfig {
        terminator,
        suppress_default_print: program.suppress_default_print,
        dialect: args.dialect(),
        posix: args.posix,
        sandbox: args.sandbox,
        separate: args.separate,
        unbuffered: args.unbuffered,
        list_width: args.line_length,
        debug: args.debug,
    };

    if args.in_place.is_some() {
        let suffix = args.in_place.clone().unwrap_or_default();
        let mut last_code = 0;
        for path in &input_files {
            last_code = run_in_place(&program, &config, path, &suffix, args.follow_symlinks)?;
        }
        Ok(last_code)
    } else {
        let reader = RecordReader::new(input_files, terminator, args.separate);
        let stdout = io::stdout();
        let sink = Sink::new(stdout.lock(), args.unbuffered);
        let mut engine = Engine::new(&program, reader, sink, config);
        Ok(engine.run()?)
    }
}

/// Runs `program` over a single file, writing the result to a temp file in
/// the same directory and atomically replacing the original (after taking
/// a backup, if `suffix` is non-empty).
fn run_in_place(
    program: &sed::Program,
    config: &EngineConfig,
    path: &str,
    suffix: &str,
    follow_symlinks: bool,
) -> Result<i32, Box<dyn Error>> {
    let real_path = if follow_symlinks {
        std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    };
    let dir = real_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

    let reader = RecordReader::new(vec![real_path.to_string_lossy().into_owned()], config.terminator, false);
    let sink = Sink::new(tmp.as_file_mut(), config.unbuffered);
    let mut engine = Engine::new(program, reader, sink, config.clone());
    let code = engine.run()?;

    if !suffix.is_empty() {
        let backup_path = if suffix.contains('*') {
            PathBuf::from(suffix.replace('*', &real_path.to_string_lossy()))
        } else {
            let mut name = real_path.clone().into_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        std::fs::copy(&real_path, &backup_path)?;
    }

    tmp.persist(&real_path)
        .map_err(|e| format!("could not replace {}: {}", real_path.display(), e))?;
    Ok(code)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    textdomain(PROJECT_NAME)?;
    bind_textdomain_codeset(PROJECT_NAME, "UTF-8")?;

    let exit_code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("sed: {e}");
            if args.verbose {
                if let Some(sed_err) = e.downcast_ref::<sed::SedError>() {
                    eprintln!("sed: context: {sed_err:?}");
                }
            }
            1
        }
    };

    io::stdout().flush().ok();
    std::process::exit(exit_code)
}
