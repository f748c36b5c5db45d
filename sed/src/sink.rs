//! Buffered output abstraction the engine writes through.
//!
//! Writes are buffered at the `BufWriter` default granularity. The engine
//! calls [`Sink::flush`] at the end of a run and after `q`/`Q`; when
//! `-u`/`--unbuffered` is set, every write flushes immediately.

use std::io::{self, Write};

pub struct Sink<W: Write> {
    writer: io::BufWriter<W>,
    unbuffered: bool,
}

impl<W: Write> Sink<W> {
    pub fn new(writer: W, unbuffered: bool) -> Self {
        Sink {
            writer: io::BufWriter::new(writer),
            unbuffered,
        }
    }

    /// Writes `bytes` verbatim with no terminator appended (used for `a`/
    /// `i`/`c`/`r`/`R` text, which is already terminator-exact).
    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.maybe_flush()
    }

    /// Writes `bytes` followed by the record terminator.
    pub fn write_record(&mut self, bytes: &[u8], terminator: u8) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.write_all(&[terminator])?;
        self.maybe_flush()
    }

    fn maybe_flush(&mut self) -> io::Result<()> {
        if self.unbuffered {
            self.writer.flush()
        } else {
            Ok(())
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_record_appends_terminator() {
        let mut buf = Vec::new();
        {
            let mut sink = Sink::new(&mut buf, false);
            sink.write_record(b"hello", b'\n').unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(buf, b"hello\n");
    }
}
