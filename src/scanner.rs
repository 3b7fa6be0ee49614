//! Byte scanner used by the SIP and SDP parsers.

use std::str;

type Result<T> = std::result::Result<T, ScanError>;

#[inline(always)]
pub(crate) fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

#[inline(always)]
pub(crate) fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t')
}

#[inline(always)]
pub(crate) fn is_newline(c: u8) -> bool {
    matches!(c, b'\r' | b'\n')
}

#[inline(always)]
pub(crate) fn is_alphabetic(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

#[derive(Debug)]
pub struct Position {
    /// Current line.
    line: usize,
    /// Current column.
    col: usize,
}

impl Position {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

/// Reads a byte slice while keeping track of line and column.
#[derive(Debug)]
pub struct Scanner<'a> {
    /// The input bytes slice to be read.
    src: &'a [u8],
    /// Current position
    pos: Position,
    /// Current index.
    idx: usize,

    len: usize,
}

impl<'a> Scanner<'a> {
    /// Create a `Scanner` from a byte slice.
    ///
    /// The `line` and `col` will always start from 1.
    pub const fn new(src: &'a [u8]) -> Self {
        Scanner {
            src,
            pos: Position { line: 1, col: 1 },
            idx: 0,
            len: src.len(),
        }
    }

    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// Returns `true` if all bytes were read.
    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        self.idx >= self.src.len()
    }

    /// Get next byte without advancing.
    #[inline]
    pub fn peek(&self) -> Option<&u8> {
        self.src.get(self.idx)
    }

    /// Moves to the next byte n times.
    pub fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.next();
        }
    }

    /// Same as [`Scanner::peek`] but returns a `Result`
    /// instead of an `Option`.
    #[inline]
    pub fn lookahead(&self) -> Result<&u8> {
        self.peek().ok_or_else(|| self.error::<u8>(ScanErrorKind::Eof).unwrap_err())
    }

    #[inline]
    pub fn starts_with(&self, pat: &[u8]) -> bool {
        self.src.get(self.idx..).is_some_and(|rem| rem.starts_with(pat))
    }

    /// Read a `u32` number from the slice.
    ///
    /// This method reads until an invalid digit is found.
    pub fn read_u32(&mut self) -> Result<u32> {
        let digits = self.read_while(is_digit);
        let digits = unsafe { str::from_utf8_unchecked(digits) };

        match digits.parse() {
            Ok(num) => Ok(num),
            Err(_) => self.error(ScanErrorKind::Num),
        }
    }

    /// Read a `u16` number from the slice.
    pub fn read_u16(&mut self) -> Result<u16> {
        let digits = self.read_while(is_digit);
        let digits = unsafe { str::from_utf8_unchecked(digits) };

        match digits.parse() {
            Ok(num) => Ok(num),
            Err(_) => self.error(ScanErrorKind::Num),
        }
    }

    /// Read a `u64` number from the slice.
    pub fn read_u64(&mut self) -> Result<u64> {
        let digits = self.read_while(is_digit);
        let digits = unsafe { str::from_utf8_unchecked(digits) };

        match digits.parse() {
            Ok(num) => Ok(num),
            Err(_) => self.error(ScanErrorKind::Num),
        }
    }

    /// `read_while()` will call the `func` closure for
    /// each element in the slice and advance
    /// while the closure returns `true`.
    #[inline(always)]
    pub fn read_while<F>(&mut self, func: F) -> &'a [u8]
    where
        F: Fn(u8) -> bool,
    {
        let start = self.idx;
        let src = self.src;
        let len = src.len();

        while self.idx < len && func(src[self.idx]) {
            self.bump(src[self.idx]);
        }

        &src[start..self.idx]
    }

    pub fn peek_while<F>(&self, func: F) -> (&'a [u8], Option<u8>)
    where
        F: Fn(u8) -> bool,
    {
        let start = self.idx;
        let src = &self.src[start..];

        let n = src.iter().position(|&b| !func(b)).unwrap_or(src.len());
        let next_byte = src.get(n).copied();

        (&src[..n], next_byte)
    }

    /// Checks whether the current bytes match the specified slice.
    pub fn matches_slice(&mut self, slice: &[u8]) -> Result<()> {
        let start_index = self.idx;
        let slice_len = slice.len();

        let position = self
            .zip(slice.iter())
            .position(|(expected, &current)| expected != current);

        match position {
            // Invalid.
            Some(_) => self.error(ScanErrorKind::Tag),
            None if self.idx - start_index >= slice_len => Ok(()),
            // Incomplete.
            None => self.error(ScanErrorKind::Tag),
        }
    }

    /// Read next byte if it equals `b`.
    pub fn must_read(&mut self, b: u8) -> Result<()> {
        let Some(&n) = self.peek() else {
            return self.error(ScanErrorKind::Eof);
        };
        if b != n {
            return self.error(ScanErrorKind::Char { expected: b, found: n });
        }
        self.next();
        Ok(())
    }

    pub fn take_until(&mut self, byte: u8) -> &'a [u8] {
        self.read_while(|b| b != byte)
    }

    /// Same as [`Scanner::read_while`] but returns the
    /// slice of bytes converted to a string slice.
    ///
    /// # Safety
    ///
    /// Caller must ensure that `func` only accepts bytes that
    /// are valid UTF-8.
    #[inline]
    pub unsafe fn read_as_str<F>(&mut self, func: F) -> &'a str
    where
        F: Fn(u8) -> bool,
    {
        let bytes = self.read_while(&func);

        unsafe { str::from_utf8_unchecked(bytes) }
    }

    /// Call the `func` closure for the next byte and read it
    /// if the closure returns `true`.
    #[inline(always)]
    pub fn consume_if<F>(&mut self, func: F) -> Option<u8>
    where
        F: FnOnce(u8) -> bool,
    {
        match self.peek() {
            Some(&matched) if func(matched) => {
                self.bump(matched);
                Some(matched)
            }
            _ => None,
        }
    }

    #[inline(always)]
    fn bump(&mut self, byte: u8) {
        if byte == b'\n' {
            self.pos.col = 1;
            self.pos.line += 1;
        } else {
            self.pos.col += 1;
        }
        self.idx += 1;
    }

    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        unsafe { self.src.get_unchecked(self.idx..self.len) }
    }

    fn error<T>(&self, kind: ScanErrorKind) -> Result<T> {
        Err(ScanError {
            kind,
            line: self.pos.line,
            col: self.pos.col,
        })
    }
}

/// Errors that can occur while reading the src.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ScanErrorKind {
    /// End of file reached.
    Eof,
    Char {
        expected: u8,
        found: u8,
    },
    Num,
    Tag,
}

#[derive(Debug, PartialEq)]
pub struct ScanError {
    pub kind: ScanErrorKind,
    pub line: usize,
    pub col: usize,
}

impl AsRef<[u8]> for Scanner<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.remaining()
    }
}

impl Iterator for Scanner<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        self.src.get(self.idx).copied().inspect(|&byte| self.bump(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32() {
        let mut scanner = Scanner::new("12345".as_bytes());
        assert_eq!(scanner.read_u32(), Ok(12345));

        let mut scanner = Scanner::new("NaN".as_bytes());
        assert!(scanner.read_u32().is_err());
        assert_eq!(scanner.as_ref(), b"NaN");

        let mut scanner = Scanner::new("9123Test".as_bytes());
        assert_eq!(scanner.read_u32(), Ok(9123));
        assert_eq!(scanner.as_ref(), b"Test");
    }

    #[test]
    fn test_lookahead() {
        let mut scanner = Scanner::new("Hello".as_bytes());

        assert_eq!(scanner.lookahead(), Ok(&b'H'));
        scanner.next();
        assert_eq!(scanner.lookahead(), Ok(&b'e'));
        scanner.next();
        assert_eq!(scanner.lookahead(), Ok(&b'l'));

        scanner.read_while(|_| true);

        assert!(scanner.lookahead().is_err());
    }

    #[test]
    fn test_matches_slice() {
        let mut scanner = Scanner::new(b"SIP/2.0 200 OK");
        assert!(scanner.matches_slice(b"SIP/2.0").is_ok());
        assert_eq!(scanner.as_ref(), b" 200 OK");
    }
}
