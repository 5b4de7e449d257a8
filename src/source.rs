//! # Sources
//!
//! Where the producer gets its items from. The channel never reads a source itself;
//! only the producer loop in [`driver`](crate::driver) does.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// A pull-based supply of items.
pub trait Source {
    type Item;

    /// Returns the next item, or `Ok(None)` once the source is exhausted.
    fn next_item(&mut self) -> io::Result<Option<Self::Item>>;
}

/// Reads a stream line by line, without the line terminators.
///
/// Bytes that are not valid UTF-8 are replaced with `U+FFFD`, so one bad line
/// doesn't end the stream.
#[derive(Debug)]
pub struct LineSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl LineSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Source for LineSource<R> {
    type Item = String;

    fn next_item(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }

        let line = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }
}

/// Adapts an iterator into a [`Source`] that never fails.
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    iter: I,
}

pub fn iter_source<I: IntoIterator>(iter: I) -> IterSource<I::IntoIter> {
    IterSource {
        iter: iter.into_iter(),
    }
}

impl<I: Iterator> Source for IterSource<I> {
    type Item = I::Item;

    fn next_item(&mut self) -> io::Result<Option<I::Item>> {
        Ok(self.iter.next())
    }
}
