//! The cycle-driven interpreter: pulls records from a [`RecordReader`],
//! walks the [`Program`] once per cycle, and writes through a [`Sink`].
//!
//! Two-address range state cannot live on the immutable `Program`, so the
//! engine keeps a parallel `Vec<RangeState>` indexed by command position.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use regex::bytes::Regex;

use crate::error::{SedError, SedResult};
use crate::reader::RecordReader;
use crate::regex_adapter::{self, Dialect, RegexCache, RegexFlags};
use crate::script::ast::*;
use crate::sink::Sink;

/// Run-wide knobs derived from the CLI flags or library builder, per the
/// external interface the command catalog is specified against.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub terminator: u8,
    pub suppress_default_print: bool,
    pub dialect: Dialect,
    pub posix: bool,
    pub sandbox: bool,
    pub separate: bool,
    pub unbuffered: bool,
    pub list_width: usize,
    /// `--debug`: annotate stderr with the address/fire decision of every
    /// command as it is dispatched.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            terminator: b'\n',
            suppress_default_print: false,
            dialect: Dialect::Basic,
            posix: false,
            sandbox: false,
            separate: false,
            unbuffered: false,
            list_width: 70,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RangeState {
    active: bool,
    resolved_end_line: Option<u64>,
}

enum DispatchResult {
    Next,
    Jump(usize),
    RestartCycle,
    RestartProgram,
    EndWithPrint,
    EndNoPrint,
}

/// What happened over the course of one full cycle (one record's pass
/// through the program), used by the top-level run loop to decide whether
/// to print the pattern space and drain the append queue.
enum CycleOutcome {
    Normal,
    RestartCycle,
    EndRunWithPrint,
    EndRunNoPrint,
}

pub struct Engine<'p, W: Write> {
    program: &'p Program,
    reader: RecordReader,
    sink: Sink<W>,
    config: EngineConfig,
    regex_cache: RegexCache,
    pattern_space: Vec<u8>,
    hold_space: Vec<u8>,
    append_queue: Vec<Vec<u8>>,
    subst_flag: bool,
    last_regex: Option<Rc<Regex>>,
    range_state: Vec<RangeState>,
    line_number: u64,
    read_line_cursors: HashMap<PathBuf, Option<BufReader<File>>>,
    write_files: HashMap<PathBuf, File>,
    exit_code: i32,
}

impl<'p, W: Write> Engine<'p, W> {
    pub fn new(program: &'p Program, reader: RecordReader, sink: Sink<W>, config: EngineConfig) -> Self {
        let range_state = vec![RangeState::default(); program.commands.len()];
        Engine {
            program,
            reader,
            sink,
            config,
            regex_cache: RegexCache::new(),
            pattern_space: Vec::new(),
            hold_space: Vec::new(),
            append_queue: Vec::new(),
            subst_flag: false,
            last_regex: None,
            range_state,
            line_number: 0,
            read_line_cursors: HashMap::new(),
            write_files: HashMap::new(),
            exit_code: 0,
        }
    }

    /// Drives the program to completion, returning the process exit code
    /// (0 unless a `q`/`Q` supplied one).
    pub fn run(&mut self) -> SedResult<i32> {
        loop {
            let record = match self.reader.next_record()? {
                Some(r) => r,
                None => break,
            };
            self.pattern_space = record;
            self.advance_line_number();
            self.subst_flag = false;
            self.append_queue.clear();

            match self.execute_script()? {
                CycleOutcome::Normal => {
                    if !self.config.suppress_default_print {
                        self.emit_pattern_space()?;
                    }
                    self.drain_append_queue()?;
                }
                CycleOutcome::RestartCycle => {}
                CycleOutcome::EndRunWithPrint => {
                    if !self.config.suppress_default_print {
                        self.emit_pattern_space()?;
                    }
                    self.drain_append_queue()?;
                    self.sink.flush()?;
                    return Ok(self.exit_code);
                }
                CycleOutcome::EndRunNoPrint => {
                    self.sink.flush()?;
                    return Ok(self.exit_code);
                }
            }
            if self.config.unbuffered {
                self.sink.flush()?;
            }
        }
        self.drain_append_queue()?;
        self.sink.flush()?;
        Ok(self.exit_code)
    }

    fn advance_line_number(&mut self) {
        if self.line_number == 0 || (self.config.separate && self.reader.current_file_changed()) {
            self.line_number = 1;
        } else {
            self.line_number += 1;
        }
    }

    fn execute_script(&mut self) -> SedResult<CycleOutcome> {
        'restart: loop {
            let mut ip = 0usize;
            let len = self.program.commands.len();
            while ip < len {
                match self.dispatch(ip)? {
                    DispatchResult::Next => ip += 1,
                    DispatchResult::Jump(target) => ip = target,
                    DispatchResult::RestartCycle => return Ok(CycleOutcome::RestartCycle),
                    DispatchResult::RestartProgram => continue 'restart,
                    DispatchResult::EndWithPrint => return Ok(CycleOutcome::EndRunWithPrint),
                    DispatchResult::EndNoPrint => return Ok(CycleOutcome::EndRunNoPrint),
                }
            }
            return Ok(CycleOutcome::Normal);
        }
    }

    fn dispatch(&mut self, ip: usize) -> SedResult<DispatchResult> {
        let command = self.program.commands[ip].clone();
        let raw_fires = self.address_fires(ip, &command.address)?;
        let fires = raw_fires ^ command.negate;

        if self.config.debug {
            eprintln!(
                "sed: line {}, command #{ip} ({:?}): {}",
                self.line_number,
                command.kind,
                if fires { "fires" } else { "skipped" }
            );
        }

        if let CommandKind::BlockStart { end } = &command.kind {
            return if fires {
                Ok(DispatchResult::Next)
            } else {
                Ok(DispatchResult::Jump(end + 1))
            };
        }
        if !fires {
            return Ok(DispatchResult::Next);
        }

        match command.kind {
            CommandKind::BlockEnd { .. } | CommandKind::Label | CommandKind::Comment => {
                Ok(DispatchResult::Next)
            }
            CommandKind::BlockStart { .. } => unreachable!("handled above"),
            CommandKind::Print => {
                self.emit_pattern_space()?;
                Ok(DispatchResult::Next)
            }
            CommandKind::PrintFirstLine => {
                self.emit_first_line()?;
                Ok(DispatchResult::Next)
            }
            CommandKind::Next => self.do_next(),
            CommandKind::AppendNext => self.do_append_next(),
            CommandKind::Delete => {
                self.pattern_space.clear();
                Ok(DispatchResult::RestartCycle)
            }
            CommandKind::DeleteFirstLine => Ok(self.do_delete_first_line()),
            CommandKind::GetHold => {
                self.pattern_space = self.hold_space.clone();
                Ok(DispatchResult::Next)
            }
            CommandKind::AppendHold => {
                self.pattern_space.push(self.config.terminator);
                self.pattern_space.extend_from_slice(&self.hold_space);
                Ok(DispatchResult::Next)
            }
            CommandKind::HoldFromPattern => {
                self.hold_space = self.pattern_space.clone();
                Ok(DispatchResult::Next)
            }
            CommandKind::AppendHoldFromPattern => {
                self.hold_space.push(self.config.terminator);
                self.hold_space.extend_from_slice(&self.pattern_space);
                Ok(DispatchResult::Next)
            }
            CommandKind::Exchange => {
                std::mem::swap(&mut self.pattern_space, &mut self.hold_space);
                Ok(DispatchResult::Next)
            }
            CommandKind::Substitute(ref s) => {
                self.do_substitute(s)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::Transliterate { ref from, ref to } => {
                self.do_transliterate(from, to);
                Ok(DispatchResult::Next)
            }
            CommandKind::Append(ref text) => {
                self.append_queue.push(text.clone());
                Ok(DispatchResult::Next)
            }
            CommandKind::Insert(ref text) => {
                self.sink.write_record(text, self.config.terminator)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::Change(ref text) => self.do_change(ip, text, &command),
            CommandKind::ReadFile(ref path) => {
                if self.config.sandbox {
                    return Err(SedError::SandboxViolation { command: 'r' });
                }
                self.do_read_file(path);
                Ok(DispatchResult::Next)
            }
            CommandKind::ReadLine(ref path) => {
                if self.config.sandbox {
                    return Err(SedError::SandboxViolation { command: 'R' });
                }
                self.do_read_line(path);
                Ok(DispatchResult::Next)
            }
            CommandKind::WriteFile(ref path) => {
                if self.config.sandbox {
                    return Err(SedError::SandboxViolation { command: 'w' });
                }
                self.do_write_file(path)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::WriteFirstLine(ref path) => {
                if self.config.sandbox {
                    return Err(SedError::SandboxViolation { command: 'W' });
                }
                self.do_write_first_line(path)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::List(width) => {
                self.do_list(width)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::PrintLineNumber => {
                let text = format!("{}", self.line_number);
                self.sink.write_record(text.as_bytes(), self.config.terminator)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::PrintFileName => {
                let name = self.reader.current_file_name().to_string();
                self.sink.write_record(name.as_bytes(), self.config.terminator)?;
                Ok(DispatchResult::Next)
            }
            CommandKind::Quit { code, print } => {
                self.exit_code = code;
                if print {
                    Ok(DispatchResult::EndWithPrint)
                } else {
                    Ok(DispatchResult::EndNoPrint)
                }
            }
            CommandKind::Branch(target) => Ok(DispatchResult::Jump(target)),
            CommandKind::BranchIfSubst(target) => {
                let should = self.subst_flag;
                self.subst_flag = false;
                if should {
                    Ok(DispatchResult::Jump(target))
                } else {
                    Ok(DispatchResult::Next)
                }
            }
            CommandKind::BranchIfNotSubst(target) => {
                let should = !self.subst_flag;
                self.subst_flag = false;
                if should {
                    Ok(DispatchResult::Jump(target))
                } else {
                    Ok(DispatchResult::Next)
                }
            }
            CommandKind::Exec(ref cmd) => {
                self.do_exec(cmd.as_deref())?;
                Ok(DispatchResult::Next)
            }
        }
    }

    // -- addressing -----------------------------------------------------

    fn address_fires(&mut self, cmd_idx: usize, address: &AddressCount) -> SedResult<bool> {
        match address {
            AddressCount::None => Ok(true),
            AddressCount::One(addr) => self.match_single_address(addr),
            AddressCount::Range(addr1, range_end) => self.range_fires(cmd_idx, addr1, range_end),
        }
    }

    fn match_single_address(&mut self, addr: &Address) -> SedResult<bool> {
        match addr {
            Address::Line(n) => Ok(self.line_number == *n),
            Address::Last => Ok(!self.reader.has_more()),
            Address::Step { first, step } => {
                if self.line_number < *first {
                    return Ok(false);
                }
                let step = (*step).max(1);
                Ok((self.line_number - first) % step == 0)
            }
            Address::Regex(spec) => {
                let regex = self.resolve_regex(spec)?;
                Ok(regex.is_match(&self.pattern_space))
            }
        }
    }

    fn resolve_regex(&mut self, spec: &RegexSpec) -> SedResult<Rc<Regex>> {
        match &spec.pattern {
            None => self.last_regex.clone().ok_or_else(|| SedError::RegexCompile {
                pattern: "//".to_string(),
                message: "no previous regular expression".to_string(),
            }),
            Some(source) => {
                let flags = RegexFlags {
                    case_insensitive: spec.case_insensitive,
                    multi_line: spec.multi_line,
                };
                let regex = self.regex_cache.compile(source, self.config.dialect, flags)?;
                self.last_regex = Some(regex.clone());
                Ok(regex)
            }
        }
    }

    fn range_fires(&mut self, cmd_idx: usize, addr1: &Address, range_end: &RangeEnd) -> SedResult<bool> {
        let mut state = self.range_state[cmd_idx];
        let fires;
        if !state.active {
            let starts = if matches!(addr1, Address::Line(0)) {
                self.line_number == 1
            } else {
                self.match_single_address(addr1)?
            };
            if !starts {
                fires = false;
            } else {
                state.active = true;
                state.resolved_end_line = match range_end {
                    RangeEnd::Plus(n) => Some(self.line_number + n),
                    RangeEnd::Multiple(m) => {
                        let m = (*m).max(1);
                        let mut end = (self.line_number / m + 1) * m;
                        if end == self.line_number {
                            end += m;
                        }
                        Some(end)
                    }
                    RangeEnd::Address(_) => None,
                };
                // A regex addr2 matches against the *next* pattern space,
                // never the record that just opened the range. Exception:
                // GNU `0,/re/`, whose addr1 never matches a real record, so
                // addr2 must still be checked starting at record 1.
                let zero_start = matches!(addr1, Address::Line(0));
                let defer_close = !zero_start
                    && matches!(range_end, RangeEnd::Address(Address::Regex(_)));
                if !defer_close && self.range_closes(range_end, &state)? {
                    state.active = false;
                }
                fires = true;
            }
        } else {
            if self.range_closes(range_end, &state)? {
                state.active = false;
            }
            fires = true;
        }
        self.range_state[cmd_idx] = state;
        Ok(fires)
    }

    fn range_closes(&mut self, range_end: &RangeEnd, state: &RangeState) -> SedResult<bool> {
        match range_end {
            RangeEnd::Address(Address::Line(n)) => Ok(self.line_number >= *n),
            RangeEnd::Address(addr) => self.match_single_address(addr),
            RangeEnd::Plus(_) | RangeEnd::Multiple(_) => {
                Ok(state.resolved_end_line.map_or(false, |end| self.line_number >= end))
            }
        }
    }

    // -- command implementations ----------------------------------------

    fn emit_pattern_space(&mut self) -> SedResult<()> {
        let bytes = std::mem::take(&mut self.pattern_space);
        self.sink.write_record(&bytes, self.config.terminator)?;
        self.pattern_space = bytes;
        Ok(())
    }

    fn emit_first_line(&mut self) -> SedResult<()> {
        let idx = self
            .pattern_space
            .iter()
            .position(|&b| b == self.config.terminator);
        let slice: &[u8] = match idx {
            Some(i) => &self.pattern_space[..i],
            None => &self.pattern_space[..],
        };
        let owned = slice.to_vec();
        self.sink.write_record(&owned, self.config.terminator)?;
        Ok(())
    }

    fn drain_append_queue(&mut self) -> SedResult<()> {
        let terminator = self.config.terminator;
        for item in self.append_queue.drain(..) {
            self.sink.write_raw(&item)?;
            if item.last().copied() != Some(terminator) {
                self.sink.write_raw(&[terminator])?;
            }
        }
        Ok(())
    }

    fn do_next(&mut self) -> SedResult<DispatchResult> {
        if !self.config.suppress_default_print {
            self.emit_pattern_space()?;
        }
        match self.reader.next_record()? {
            Some(rec) => {
                self.pattern_space = rec;
                self.advance_line_number();
                Ok(DispatchResult::Next)
            }
            None => {
                self.drain_append_queue()?;
                Ok(DispatchResult::EndNoPrint)
            }
        }
    }

    fn do_append_next(&mut self) -> SedResult<DispatchResult> {
        match self.reader.next_record()? {
            Some(rec) => {
                self.pattern_space.push(self.config.terminator);
                self.pattern_space.extend_from_slice(&rec);
                self.advance_line_number();
                Ok(DispatchResult::Next)
            }
            None => {
                // Both modes print the pattern space (unless `-n`) before
                // ending the run; POSIX mode differs from the GNU
                // extension only in that it never starts a fresh read-N
                // cycle here, not in whether P itself is emitted.
                if !self.config.suppress_default_print {
                    self.emit_pattern_space()?;
                }
                self.drain_append_queue()?;
                Ok(DispatchResult::EndNoPrint)
            }
        }
    }

    fn do_delete_first_line(&mut self) -> DispatchResult {
        match self
            .pattern_space
            .iter()
            .position(|&b| b == self.config.terminator)
        {
            Some(idx) => {
                self.pattern_space.drain(..=idx);
                DispatchResult::RestartProgram
            }
            None => {
                self.pattern_space.clear();
                DispatchResult::RestartCycle
            }
        }
    }

    fn do_change(&mut self, cmd_idx: usize, text: &[u8], command: &Command) -> SedResult<DispatchResult> {
        let should_emit = match &command.address {
            AddressCount::Range(..) => !self.range_state[cmd_idx].active,
            _ => true,
        };
        if should_emit {
            self.sink.write_record(text, self.config.terminator)?;
        }
        self.pattern_space.clear();
        Ok(DispatchResult::RestartCycle)
    }

    fn do_substitute(&mut self, cmd: &SubstituteCmd) -> SedResult<()> {
        if (cmd.exec || cmd.write_file.is_some()) && self.config.sandbox {
            return Err(SedError::SandboxViolation { command: 's' });
        }
        let spec = RegexSpec {
            pattern: cmd.pattern.clone(),
            case_insensitive: cmd.case_insensitive,
            multi_line: cmd.multi_line,
        };
        let regex = self.resolve_regex(&spec)?;
        let (new_space, count) =
            regex_adapter::substitute(&regex, &self.pattern_space, &cmd.replacement, cmd.global, cmd.nth);
        if count == 0 {
            return Ok(());
        }
        self.pattern_space = new_space;
        self.subst_flag = true;
        if cmd.exec {
            let input = self.pattern_space.clone();
            self.pattern_space = self.run_shell_capture(&input)?;
        }
        if let Some(path) = cmd.write_file.clone() {
            let bytes = self.pattern_space.clone();
            self.append_pattern_to_write_file(&path, &bytes)?;
        }
        if cmd.print {
            self.emit_pattern_space()?;
        }
        Ok(())
    }

    fn do_transliterate(&mut self, from: &[u8], to: &[u8]) {
        for b in self.pattern_space.iter_mut() {
            if let Some(pos) = from.iter().position(|&f| f == *b) {
                *b = to[pos];
            }
        }
    }

    fn do_read_file(&mut self, path: &Path) {
        if let Ok(contents) = std::fs::read(path) {
            self.append_queue.push(contents);
        }
    }

    fn do_read_line(&mut self, path: &Path) {
        let terminator = self.config.terminator;
        let entry = self
            .read_line_cursors
            .entry(path.to_path_buf())
            .or_insert_with(|| File::open(path).ok().map(BufReader::new));
        if let Some(reader) = entry {
            let mut buf = Vec::new();
            match reader.read_until(terminator, &mut buf) {
                Ok(0) | Err(_) => {
                    *entry = None;
                }
                Ok(_) => {
                    if buf.last() == Some(&terminator) {
                        buf.pop();
                    }
                    self.append_queue.push(buf);
                }
            }
        }
    }

    fn get_write_file(&mut self, path: &Path) -> SedResult<&mut File> {
        if !self.write_files.contains_key(path) {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            self.write_files.insert(path.to_path_buf(), file);
        }
        Ok(self.write_files.get_mut(path).expect("just inserted"))
    }

    fn do_write_file(&mut self, path: &Path) -> SedResult<()> {
        let bytes = self.pattern_space.clone();
        self.append_pattern_to_write_file(path, &bytes)
    }

    fn append_pattern_to_write_file(&mut self, path: &Path, bytes: &[u8]) -> SedResult<()> {
        let terminator = self.config.terminator;
        let file = self.get_write_file(path)?;
        file.write_all(bytes)?;
        file.write_all(&[terminator])?;
        Ok(())
    }

    fn do_write_first_line(&mut self, path: &Path) -> SedResult<()> {
        let idx = self
            .pattern_space
            .iter()
            .position(|&b| b == self.config.terminator);
        let first_line = match idx {
            Some(i) => self.pattern_space[..i].to_vec(),
            None => self.pattern_space.clone(),
        };
        self.append_pattern_to_write_file(path, &first_line)
    }

    fn do_list(&mut self, width: Option<usize>) -> SedResult<()> {
        let width = width.unwrap_or(self.config.list_width);
        let tokens = render_unambiguous_tokens(&self.pattern_space);
        if width == 0 {
            for t in &tokens {
                self.sink.write_raw(t)?;
            }
            self.sink.write_raw(b"$")?;
            self.sink.write_raw(&[self.config.terminator])?;
            return Ok(());
        }
        let limit = width.saturating_sub(1).max(1);
        let mut col = 0usize;
        for t in &tokens {
            if col > 0 && col + t.len() > limit {
                self.sink.write_raw(b"\\")?;
                self.sink.write_raw(&[self.config.terminator])?;
                col = 0;
            }
            self.sink.write_raw(t)?;
            col += t.len();
        }
        self.sink.write_raw(b"$")?;
        self.sink.write_raw(&[self.config.terminator])?;
        Ok(())
    }

    fn do_exec(&mut self, cmd: Option<&[u8]>) -> SedResult<()> {
        if self.config.sandbox {
            return Err(SedError::SandboxViolation { command: 'e' });
        }
        let source = match cmd {
            Some(c) => c.to_vec(),
            None => self.pattern_space.clone(),
        };
        self.pattern_space = self.run_shell_capture(&source)?;
        Ok(())
    }

    fn run_shell_capture(&mut self, cmd_bytes: &[u8]) -> SedResult<Vec<u8>> {
        let cmd_str = String::from_utf8_lossy(cmd_bytes).into_owned();
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd_str)
            .output()
            .map_err(|e| SedError::ShellExec(e.to_string()))?;
        let mut out = output.stdout;
        if out.last() == Some(&self.config.terminator) {
            out.pop();
        }
        Ok(out)
    }
}

fn render_unambiguous_tokens(bytes: &[u8]) -> Vec<Vec<u8>> {
    bytes
        .iter()
        .map(|&b| match b {
            b'\\' => b"\\\\".to_vec(),
            0x07 => b"\\a".to_vec(),
            0x08 => b"\\b".to_vec(),
            b'\t' => b"\\t".to_vec(),
            b'\n' => b"\\n".to_vec(),
            0x0b => b"\\v".to_vec(),
            0x0c => b"\\f".to_vec(),
            b'\r' => b"\\r".to_vec(),
            0x20..=0x7e => vec![b],
            other => format!("\\x{other:02X}").into_bytes(),
        })
        .collect()
}
