//! Hand-rolled byte-position parser for the sed script language.
//!
//! A regex-based tokenizer cannot work here: the delimiter and escaping
//! rules for `s` and `y` depend on a byte chosen at parse time, and several
//! commands (`a`, `i`, `c`, `r`, `R`, `w`, `W`, `:`, `#`) consume the
//! remainder of the logical line rather than a fixed-grammar token.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{SedError, SedResult};
use crate::script::ast::*;

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    terminator: u8,
    commands: Vec<Command>,
    labels: HashMap<String, usize>,
    branch_fixups: Vec<(usize, Option<String>)>,
    block_stack: Vec<usize>,
    suppress_default_print: bool,
    current_line: usize,
}

/// Parses the concatenation of all `-e`/`-f` sources (already joined by the
/// configured record terminator) into a `Program`.
pub fn parse(script: &[u8], terminator: u8) -> SedResult<Program> {
    let mut p = Parser {
        bytes: script,
        pos: 0,
        terminator,
        commands: Vec::new(),
        labels: HashMap::new(),
        branch_fixups: Vec::new(),
        block_stack: Vec::new(),
        suppress_default_print: false,
        current_line: 1,
    };
    p.check_leading_suppress_flag();
    loop {
        p.skip_separators();
        if p.at_end() {
            break;
        }
        p.parse_one_command()?;
    }
    if !p.block_stack.is_empty() {
        return Err(p.err("unmatched `{`"));
    }
    p.resolve_branches()?;
    Ok(Program {
        commands: p.commands,
        suppress_default_print: p.suppress_default_print,
    })
}

impl<'a> Parser<'a> {
    fn err(&self, message: &str) -> SedError {
        SedError::ScriptParse {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek();
        if let Some(b) = b {
            self.pos += 1;
            if b == self.terminator {
                self.current_line += 1;
            }
        }
        b
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b';') => {
                    self.advance();
                }
                Some(b) if b == self.terminator => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn check_leading_suppress_flag(&mut self) {
        if self.bytes.starts_with(b"#n") {
            match self.bytes.get(2).copied() {
                None => {
                    self.suppress_default_print = true;
                    self.pos = 2;
                }
                Some(b) if b == self.terminator => {
                    self.suppress_default_print = true;
                    self.pos = 3;
                }
                _ => {}
            }
        }
    }

    fn parse_number(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
    }

    /// Scans bytes up to an unescaped `delim`. `\delim` yields a literal
    /// delimiter; `\<terminator>` embeds a literal terminator byte; any
    /// other backslash sequence is preserved verbatim so the regex/
    /// replacement engine can interpret it.
    fn scan_delimited(&mut self, delim: u8) -> SedResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated expression")),
                Some(b) if b == delim => {
                    self.advance();
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(n) if n == delim => {
                            out.push(delim);
                            self.advance();
                        }
                        Some(n) if n == self.terminator => {
                            out.push(self.terminator);
                            self.advance();
                        }
                        Some(n) => {
                            out.push(b'\\');
                            out.push(n);
                            self.advance();
                        }
                        None => return Err(self.err("unterminated expression")),
                    }
                }
                Some(b) if b == self.terminator => {
                    return Err(self.err("unterminated expression (unescaped newline)"))
                }
                Some(b) => {
                    out.push(b);
                    self.advance();
                }
            }
        }
    }

    /// Scans the remainder of the logical line: a bare terminator ends the
    /// argument; `\<terminator>` embeds a literal terminator and continues
    /// onto the next physical line; any other `\X` yields literal `X`.
    fn scan_rest_of_line(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(b) if b == self.terminator => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(n) => {
                            out.push(n);
                            self.advance();
                        }
                        None => break,
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.advance();
                }
            }
        }
        out
    }

    fn parse_text_arg(&mut self) -> SedResult<Vec<u8>> {
        self.skip_blank();
        // Classic `a\` / `i\` / `c\` form: a lone backslash right before the
        // terminator just introduces the text block and is dropped.
        if self.peek() == Some(b'\\') {
            let save = self.pos;
            self.advance();
            if self.peek() == Some(self.terminator) {
                self.advance();
            } else {
                self.pos = save;
            }
        }
        Ok(self.scan_rest_of_line())
    }

    fn parse_optional_text_arg(&mut self) -> Option<Vec<u8>> {
        self.skip_blank();
        if self.at_end() || self.peek() == Some(self.terminator) || self.peek() == Some(b';') {
            return None;
        }
        Some(self.scan_rest_of_line())
    }

    fn parse_filename_arg(&mut self) -> SedResult<PathBuf> {
        self.skip_blank();
        let bytes = self.scan_rest_of_line();
        let name = String::from_utf8_lossy(&bytes).trim().to_string();
        if name.is_empty() {
            return Err(self.err("missing filename"));
        }
        Ok(PathBuf::from(name))
    }

    fn parse_optional_number(&mut self) -> Option<u64> {
        self.skip_blank();
        self.parse_number()
    }

    fn parse_label_name(&mut self) -> SedResult<String> {
        self.skip_blank();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == self.terminator || b == b';' || b == b' ' || b == b'\t' {
                break;
            }
            self.advance();
        }
        let name = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        if name.is_empty() {
            return Err(self.err("missing label name"));
        }
        Ok(name)
    }

    fn parse_label_ref(&mut self) -> SedResult<Option<String>> {
        self.skip_blank();
        if self.at_end() || self.peek() == Some(self.terminator) || self.peek() == Some(b';') {
            return Ok(None);
        }
        Ok(Some(self.parse_label_name()?))
    }

    fn parse_regex_address(&mut self) -> SedResult<Address> {
        let delim = if self.peek() == Some(b'\\') {
            self.advance();
            self.advance().ok_or_else(|| self.err("expected delimiter after `\\`"))?
        } else {
            self.advance();
            b'/'
        };
        let pattern_bytes = self.scan_delimited(delim)?;
        let mut case_insensitive = false;
        let mut multi_line = false;
        loop {
            match self.peek() {
                Some(b'I') => {
                    case_insensitive = true;
                    self.advance();
                }
                Some(b'M') => {
                    multi_line = true;
                    self.advance();
                }
                _ => break,
            }
        }
        let pattern = String::from_utf8_lossy(&pattern_bytes).into_owned();
        let pattern = if pattern.is_empty() { None } else { Some(pattern) };
        Ok(Address::Regex(RegexSpec {
            pattern,
            case_insensitive,
            multi_line,
        }))
    }

    fn parse_address(&mut self) -> SedResult<Option<Address>> {
        self.skip_blank();
        match self.peek() {
            Some(b'$') => {
                self.advance();
                Ok(Some(Address::Last))
            }
            Some(b'/') | Some(b'\\') => Ok(Some(self.parse_regex_address()?)),
            Some(b) if b.is_ascii_digit() => {
                let n = self.parse_number().expect("digit just confirmed");
                if self.peek() == Some(b'~') {
                    self.advance();
                    let step = self
                        .parse_number()
                        .ok_or_else(|| self.err("expected step after `~`"))?;
                    Ok(Some(Address::Step { first: n, step }))
                } else {
                    Ok(Some(Address::Line(n)))
                }
            }
            _ => Ok(None),
        }
    }

    fn parse_address_count(&mut self) -> SedResult<AddressCount> {
        let addr1 = self.parse_address()?;
        let addr1 = match addr1 {
            None => return Ok(AddressCount::None),
            Some(a) => a,
        };
        self.skip_blank();
        if self.peek() != Some(b',') {
            return Ok(AddressCount::One(addr1));
        }
        self.advance();
        self.skip_blank();
        match self.peek() {
            Some(b'+') => {
                self.advance();
                let n = self
                    .parse_number()
                    .ok_or_else(|| self.err("expected count after `+`"))?;
                Ok(AddressCount::Range(addr1, RangeEnd::Plus(n)))
            }
            Some(b'~') => {
                self.advance();
                let n = self
                    .parse_number()
                    .ok_or_else(|| self.err("expected multiple after `~`"))?;
                Ok(AddressCount::Range(addr1, RangeEnd::Multiple(n)))
            }
            _ => {
                let addr2 = self
                    .parse_address()?
                    .ok_or_else(|| self.err("expected second address after `,`"))?;
                Ok(AddressCount::Range(addr1, RangeEnd::Address(addr2)))
            }
        }
    }

    fn parse_negation(&mut self) -> bool {
        let mut negate = false;
        loop {
            self.skip_blank();
            if self.peek() == Some(b'!') {
                self.advance();
                negate = !negate;
            } else {
                break;
            }
        }
        negate
    }

    fn parse_substitute(&mut self) -> SedResult<CommandKind> {
        let delim = self
            .advance()
            .ok_or_else(|| self.err("expected delimiter after `s`"))?;
        if delim == b'\\' || delim == self.terminator {
            return Err(self.err("`s` delimiter cannot be backslash or newline"));
        }
        let pattern_bytes = self.scan_delimited(delim)?;
        let replacement_bytes = self.scan_delimited(delim)?;
        let pattern = String::from_utf8_lossy(&pattern_bytes).into_owned();
        let pattern = if pattern.is_empty() { None } else { Some(pattern) };
        let replacement = String::from_utf8_lossy(&replacement_bytes).into_owned();

        let mut global = false;
        let mut nth = 1usize;
        let mut print = false;
        let mut case_insensitive = false;
        let mut multi_line = false;
        let mut exec = false;
        let mut write_file = None;
        loop {
            match self.peek() {
                Some(b'g') => {
                    global = true;
                    self.advance();
                }
                Some(b'p') => {
                    print = true;
                    self.advance();
                }
                Some(b'i') | Some(b'I') => {
                    case_insensitive = true;
                    self.advance();
                }
                Some(b'm') | Some(b'M') => {
                    multi_line = true;
                    self.advance();
                }
                Some(b'e') => {
                    exec = true;
                    self.advance();
                }
                Some(b'w') => {
                    self.advance();
                    write_file = Some(self.parse_filename_arg()?);
                    break;
                }
                Some(b) if b.is_ascii_digit() => {
                    nth = self.parse_number().expect("digit just confirmed") as usize;
                }
                _ => break,
            }
        }
        Ok(CommandKind::Substitute(SubstituteCmd {
            pattern,
            replacement,
            global,
            nth,
            print,
            case_insensitive,
            multi_line,
            exec,
            write_file,
        }))
    }

    fn parse_transliterate(&mut self) -> SedResult<CommandKind> {
        let delim = self
            .advance()
            .ok_or_else(|| self.err("expected delimiter after `y`"))?;
        let from = self.scan_delimited(delim)?;
        let to = self.scan_delimited(delim)?;
        if from.len() != to.len() {
            return Err(self.err("`y` command strings have different lengths"));
        }
        Ok(CommandKind::Transliterate { from, to })
    }

    fn define_label(&mut self, name: String) -> SedResult<()> {
        let idx = self.commands.len();
        if self.labels.insert(name.clone(), idx).is_some() {
            return Err(self.err(&format!("duplicate label `{name}`")));
        }
        Ok(())
    }

    fn parse_one_command(&mut self) -> SedResult<()> {
        if self.peek() == Some(b'}') {
            self.advance();
            let start = self
                .block_stack
                .pop()
                .ok_or_else(|| self.err("unmatched `}`"))?;
            let end_idx = self.commands.len();
            if let CommandKind::BlockStart { end } = &mut self.commands[start].kind {
                *end = end_idx;
            }
            self.commands.push(Command {
                address: AddressCount::None,
                negate: false,
                kind: CommandKind::BlockEnd { start },
                line: self.current_line,
            });
            return Ok(());
        }
        if self.peek() == Some(b'#') {
            self.advance();
            self.scan_rest_of_line();
            return Ok(());
        }

        let line = self.current_line;
        let address = self.parse_address_count()?;
        let negate = self.parse_negation();
        self.skip_blank();
        let c = self
            .advance()
            .ok_or_else(|| self.err("expected a command after address"))?;

        let kind = match c {
            b'{' => {
                let idx = self.commands.len();
                self.block_stack.push(idx);
                CommandKind::BlockStart { end: 0 }
            }
            b'p' => CommandKind::Print,
            b'P' => CommandKind::PrintFirstLine,
            b'n' => CommandKind::Next,
            b'N' => CommandKind::AppendNext,
            b'd' => CommandKind::Delete,
            b'D' => CommandKind::DeleteFirstLine,
            b'g' => CommandKind::GetHold,
            b'G' => CommandKind::AppendHold,
            b'h' => CommandKind::HoldFromPattern,
            b'H' => CommandKind::AppendHoldFromPattern,
            b'x' => CommandKind::Exchange,
            b's' => self.parse_substitute()?,
            b'y' => self.parse_transliterate()?,
            b'a' => CommandKind::Append(self.parse_text_arg()?),
            b'i' => CommandKind::Insert(self.parse_text_arg()?),
            b'c' => CommandKind::Change(self.parse_text_arg()?),
            b'r' => CommandKind::ReadFile(self.parse_filename_arg()?),
            b'R' => CommandKind::ReadLine(self.parse_filename_arg()?),
            b'w' => CommandKind::WriteFile(self.parse_filename_arg()?),
            b'W' => CommandKind::WriteFirstLine(self.parse_filename_arg()?),
            b'l' => CommandKind::List(self.parse_optional_number().map(|n| n as usize)),
            b'=' => CommandKind::PrintLineNumber,
            b'F' => CommandKind::PrintFileName,
            b'q' => CommandKind::Quit {
                code: self.parse_optional_number().unwrap_or(0) as i32,
                print: true,
            },
            b'Q' => CommandKind::Quit {
                code: self.parse_optional_number().unwrap_or(0) as i32,
                print: false,
            },
            b'b' => {
                let target = self.parse_label_ref()?;
                let idx = self.commands.len();
                self.branch_fixups.push((idx, target));
                CommandKind::Branch(BRANCH_UNRESOLVED)
            }
            b't' => {
                let target = self.parse_label_ref()?;
                let idx = self.commands.len();
                self.branch_fixups.push((idx, target));
                CommandKind::BranchIfSubst(BRANCH_UNRESOLVED)
            }
            b'T' => {
                let target = self.parse_label_ref()?;
                let idx = self.commands.len();
                self.branch_fixups.push((idx, target));
                CommandKind::BranchIfNotSubst(BRANCH_UNRESOLVED)
            }
            b':' => {
                let name = self.parse_label_name()?;
                self.define_label(name)?;
                CommandKind::Label
            }
            b'e' => CommandKind::Exec(self.parse_optional_text_arg()),
            other => {
                return Err(self.err(&format!("unknown command: `{}`", other as char)));
            }
        };

        self.commands.push(Command {
            address,
            negate,
            kind,
            line,
        });
        Ok(())
    }

    fn resolve_branches(&mut self) -> SedResult<()> {
        let fixups = std::mem::take(&mut self.branch_fixups);
        for (idx, name) in fixups {
            let target = match name {
                None => self.commands.len(),
                Some(n) => *self
                    .labels
                    .get(&n)
                    .ok_or_else(|| SedError::UndefinedLabel(n.clone()))?,
            };
            match &mut self.commands[idx].kind {
                CommandKind::Branch(t)
                | CommandKind::BranchIfSubst(t)
                | CommandKind::BranchIfNotSubst(t) => *t = target,
                _ => unreachable!("fixup index did not point at a branch command"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(script: &str) -> Vec<Command> {
        parse(script.as_bytes(), b'\n').unwrap().commands
    }

    #[test]
    fn parses_simple_substitute() {
        let cmds = commands("s/a/b/g");
        assert_eq!(cmds.len(), 1);
        match &cmds[0].kind {
            CommandKind::Substitute(s) => {
                assert_eq!(s.pattern.as_deref(), Some("a"));
                assert_eq!(s.replacement, "b");
                assert!(s.global);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn parses_addresses_and_negation() {
        let cmds = commands("1,3!d");
        match &cmds[0].address {
            AddressCount::Range(Address::Line(1), RangeEnd::Address(Address::Line(3))) => {}
            other => panic!("unexpected address: {other:?}"),
        }
        assert!(cmds[0].negate);
    }

    #[test]
    fn resolves_labels_and_branches() {
        let cmds = commands(": loop\ns/x/y/\nt loop");
        assert!(matches!(cmds[0].kind, CommandKind::Label));
        match &cmds[2].kind {
            CommandKind::BranchIfSubst(target) => assert_eq!(*target, 0),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn branch_with_no_label_targets_end() {
        let cmds = commands("b");
        match &cmds[0].kind {
            CommandKind::Branch(target) => assert_eq!(*target, cmds.len()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn undefined_label_is_an_error() {
        let result = parse(b"b nowhere", b'\n');
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_y_lengths_is_an_error() {
        let result = parse(b"y/ab/a/", b'\n');
        assert!(result.is_err());
    }

    #[test]
    fn blocks_nest_and_resolve_end_index() {
        let cmds = commands("/x/{ s/a/b/\n}");
        assert!(matches!(cmds[0].kind, CommandKind::BlockStart { .. }));
        match &cmds[0].kind {
            CommandKind::BlockStart { end } => assert_eq!(*end, 2),
            _ => unreachable!(),
        }
    }

    #[test]
    fn leading_hash_n_suppresses_default_print() {
        let p = parse(b"#n\np", b'\n').unwrap();
        assert!(p.suppress_default_print);
        assert_eq!(p.commands.len(), 1);
    }

    #[test]
    fn append_text_supports_continuation() {
        let cmds = commands("a\\\nhello\\\nworld");
        match &cmds[0].kind {
            CommandKind::Append(text) => assert_eq!(text, b"hello\nworld"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
