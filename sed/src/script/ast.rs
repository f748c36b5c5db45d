//! The parsed program: commands, their addresses, and resolved branch
//! targets. Once built, a `Program` is never mutated during execution —
//! per-command range state and branch bookkeeping live on the engine.

use std::path::PathBuf;

/// A single address predicate.
#[derive(Debug, Clone)]
pub enum Address {
    /// Matches when the line counter equals `n`. `0` is only meaningful as
    /// the first address of a range (`0,/re/`), matching "before the first
    /// record".
    Line(u64),
    /// Matches on the last record of the current scope (`$`).
    Last,
    /// Matches when `pattern` matches the pattern space. `pattern == None`
    /// means an empty `//`, reusing the last-used regex at evaluation time.
    Regex(RegexSpec),
    /// `first~step`: matches when `L >= first` and `(L - first) % step == 0`.
    Step { first: u64, step: u64 },
}

#[derive(Debug, Clone)]
pub struct RegexSpec {
    pub pattern: Option<String>,
    pub case_insensitive: bool,
    pub multi_line: bool,
}

/// How many addresses a command carries, and their shape.
#[derive(Debug, Clone)]
pub enum AddressCount {
    None,
    One(Address),
    Range(Address, RangeEnd),
}

#[derive(Debug, Clone)]
pub enum RangeEnd {
    Address(Address),
    /// `addr1,+N`: the range closes `N` records after `addr1` fired.
    Plus(u64),
    /// `addr1,~M`: the range closes at the next record whose line number is
    /// a multiple of `M`.
    Multiple(u64),
}

#[derive(Debug, Clone)]
pub struct SubstituteCmd {
    pub pattern: Option<String>,
    pub replacement: String,
    pub global: bool,
    /// 1-based index of the first match to replace.
    pub nth: usize,
    pub print: bool,
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub exec: bool,
    pub write_file: Option<PathBuf>,
}

/// Sentinel branch target meaning "end of script" rather than a specific
/// command index; used in place of `Option<usize>` so the engine's IP
/// advance logic stays a single `usize` comparison.
pub const BRANCH_UNRESOLVED: usize = usize::MAX;

#[derive(Debug, Clone)]
pub enum CommandKind {
    Print,
    PrintFirstLine,
    Next,
    AppendNext,
    Delete,
    DeleteFirstLine,
    GetHold,
    AppendHold,
    HoldFromPattern,
    AppendHoldFromPattern,
    Exchange,
    Substitute(SubstituteCmd),
    Transliterate { from: Vec<u8>, to: Vec<u8> },
    Append(Vec<u8>),
    Insert(Vec<u8>),
    Change(Vec<u8>),
    ReadFile(PathBuf),
    ReadLine(PathBuf),
    WriteFile(PathBuf),
    WriteFirstLine(PathBuf),
    /// `None` means "use the engine's configured default width".
    List(Option<usize>),
    PrintLineNumber,
    PrintFileName,
    Quit { code: i32, print: bool },
    Branch(usize),
    BranchIfSubst(usize),
    BranchIfNotSubst(usize),
    Label,
    Comment,
    BlockStart { end: usize },
    BlockEnd { start: usize },
    Exec(Option<Vec<u8>>),
}

#[derive(Debug, Clone)]
pub struct Command {
    pub address: AddressCount,
    pub negate: bool,
    pub kind: CommandKind,
    /// 1-based source line, best-effort, for `--verbose` diagnostics.
    pub line: usize,
}

/// The fully parsed, immutable program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub commands: Vec<Command>,
    /// Set by a leading `#n` on the first line of the script.
    pub suppress_default_print: bool,
}
