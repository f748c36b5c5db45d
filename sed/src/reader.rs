//! Segments a sequence of named byte streams into records on a configurable
//! terminator byte.
//!
//! The reader always keeps one record of lookahead so `has_more` (used by
//! the `$` address and by `n`/`N`) can answer truthfully without consuming
//! input. In *separate* mode a lookahead that belongs to the next file is
//! treated as "no more" for the purposes of the file currently being
//! processed; the caller still gets that record on the following
//! `next_record` call.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{SedError, SedResult};

enum Opened {
    Stdin(io::Stdin),
    File(BufReader<File>),
}

impl Opened {
    fn read_until(&mut self, delim: u8, buf: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            Opened::Stdin(s) => s.lock().read_until(delim, buf),
            Opened::File(f) => f.read_until(delim, buf),
        }
    }
}

struct Lookahead {
    record: Vec<u8>,
    starts_new_file: bool,
    file_name: String,
}

/// Pulls records out of one or more named sources (`"-"` means stdin).
pub struct RecordReader {
    file_names: Vec<String>,
    next_file_idx: usize,
    current: Option<Opened>,
    current_name: String,
    have_opened_first: bool,
    terminator: u8,
    separate: bool,
    lookahead: Option<Lookahead>,
    last_returned_new_file: bool,
}

impl RecordReader {
    /// `file_names` empty is treated as `["-"]` (read standard input).
    pub fn new(file_names: Vec<String>, terminator: u8, separate: bool) -> Self {
        let file_names = if file_names.is_empty() {
            vec!["-".to_string()]
        } else {
            file_names
        };
        RecordReader {
            file_names,
            next_file_idx: 0,
            current: None,
            current_name: String::new(),
            have_opened_first: false,
            terminator,
            separate,
            lookahead: None,
            last_returned_new_file: false,
        }
    }

    fn open_next_file(&mut self) -> SedResult<bool> {
        if self.next_file_idx >= self.file_names.len() {
            return Ok(false);
        }
        let name = self.file_names[self.next_file_idx].clone();
        self.next_file_idx += 1;
        if name == "-" {
            self.current = Some(Opened::Stdin(io::stdin()));
        } else {
            let path = PathBuf::from(&name);
            let file = File::open(&path).map_err(|source| SedError::InputOpen {
                path: path.clone(),
                source,
            })?;
            self.current = Some(Opened::File(BufReader::new(file)));
        }
        self.current_name = name;
        self.have_opened_first = true;
        Ok(true)
    }

    /// Reads one record from whatever source is currently open, opening the
    /// next queued file on EOF, until a record is produced or all sources
    /// are exhausted.
    fn pull_one(&mut self) -> SedResult<Option<Lookahead>> {
        loop {
            if self.current.is_none() && !self.open_next_file()? {
                return Ok(None);
            }
            let reader = self.current.as_mut().expect("just opened");
            let mut buf = Vec::new();
            let n = reader
                .read_until(self.terminator, &mut buf)
                .map_err(|source| SedError::InputRead {
                    path: PathBuf::from(&self.current_name),
                    source,
                })?;
            if n == 0 {
                self.current = None;
                continue;
            }
            if buf.last() == Some(&self.terminator) {
                buf.pop();
            }
            return Ok(Some(Lookahead {
                record: buf,
                starts_new_file: false,
                file_name: self.current_name.clone(),
            }));
        }
    }

    fn ensure_lookahead(&mut self) -> SedResult<()> {
        if self.lookahead.is_some() {
            return Ok(());
        }
        let name_before = self.current_name.clone();
        let had_source = self.current.is_some() || self.have_opened_first;
        let pulled = self.pull_one()?;
        if let Some(mut la) = pulled {
            la.starts_new_file = !had_source || la.file_name != name_before;
            self.lookahead = Some(la);
        }
        Ok(())
    }

    /// Pulls the next record, or `None` once all sources are exhausted.
    pub fn next_record(&mut self) -> SedResult<Option<Vec<u8>>> {
        self.ensure_lookahead()?;
        match self.lookahead.take() {
            None => Ok(None),
            Some(la) => {
                self.last_returned_new_file = la.starts_new_file;
                self.current_name = la.file_name;
                Ok(Some(la.record))
            }
        }
    }

    /// True if another record is available *in the current scope*: in
    /// `separate` mode, a lookahead belonging to the next file does not
    /// count, so `$` fires on the last record of every file.
    pub fn has_more(&mut self) -> bool {
        if self.ensure_lookahead().is_err() {
            return false;
        }
        match &self.lookahead {
            None => false,
            Some(la) => !(self.separate && la.starts_new_file),
        }
    }

    /// True if the record most recently returned by `next_record` was the
    /// first record of a new input file.
    pub fn current_file_changed(&self) -> bool {
        self.last_returned_new_file
    }

    /// Display name of the file the most recently returned record came
    /// from (`"-"` for standard input), for the `F` command.
    pub fn current_file_name(&self) -> &str {
        &self.current_name
    }
}
