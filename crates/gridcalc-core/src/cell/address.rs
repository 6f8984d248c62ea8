//! A1-style addressing for single cells and rectangular ranges

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// Location of one cell on the grid
///
/// Both indices are zero-based: `CellAddress::new(0, 0)` is `A1`. The
/// derived ordering compares `row` before `col`, which makes sorted
/// collections of addresses come out in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellAddress {
    /// Zero-based row (`1` in A1 notation is row 0)
    pub row: u32,
    /// Zero-based column (`A` is 0, `XFD` is 16383)
    pub col: u16,
}

impl CellAddress {
    pub const fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Read an address such as `C12`, `c12` or `$C$12`
    ///
    /// Letters are case-insensitive and `$` markers are ignored, so the
    /// parsed address always prints in canonical upper-case form.
    ///
    /// ```
    /// use gridcalc_core::CellAddress;
    ///
    /// assert_eq!(CellAddress::parse("C12").unwrap(), CellAddress::new(11, 2));
    /// assert_eq!(CellAddress::parse("$b$2").unwrap().to_string(), "B2");
    /// assert!(CellAddress::parse("B0").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = |why: &str| Error::InvalidAddress(format!("{} in '{}'", why, text));

        let rest = text.strip_prefix('$').unwrap_or(text);
        let split = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let (letters, digits) = rest.split_at(split);
        let digits = digits.strip_prefix('$').unwrap_or(digits);

        if letters.is_empty() {
            return Err(invalid("missing column"));
        }
        if digits.is_empty() {
            return Err(invalid("missing row"));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("unexpected characters after row"));
        }

        let col = Self::letters_to_column(letters)?;
        let row = match digits.parse::<u32>() {
            Ok(0) => return Err(invalid("rows start at 1")),
            Ok(n) if n <= MAX_ROWS => n - 1,
            // Too many digits for u32 still means past the last row
            _ => return Err(Error::RowOutOfBounds(MAX_ROWS, MAX_ROWS - 1)),
        };

        Ok(Self { row, col })
    }

    /// Column letters for a zero-based index: 0 is `A`, 26 is `AA`
    pub fn column_to_letters(col: u16) -> String {
        let mut buf = Vec::with_capacity(3);
        let mut n = u32::from(col) + 1;
        while n > 0 {
            let digit = (n - 1) % 26;
            buf.push(b'A' + digit as u8);
            n = (n - 1) / 26;
        }
        buf.reverse();
        buf.into_iter().map(char::from).collect()
    }

    /// Zero-based index for column letters; the inverse of
    /// [`column_to_letters`](Self::column_to_letters)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() {
            return Err(Error::InvalidAddress("empty column letters".into()));
        }

        let number = letters.chars().try_fold(0u32, |acc, c| {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!(
                    "'{}' is not a column letter",
                    c
                )));
            }
            let next = acc * 26 + u32::from(c.to_ascii_uppercase() as u8 - b'A') + 1;
            if next > u32::from(MAX_COLS) {
                Err(Error::ColumnOutOfBounds(next - 1, MAX_COLS - 1))
            } else {
                Ok(next)
            }
        })?;

        Ok((number - 1) as u16)
    }

    pub fn to_a1_string(&self) -> String {
        self.to_string()
    }

    /// The range spanned by this cell and `other`
    pub fn to(&self, other: CellAddress) -> CellRange {
        CellRange::new(*self, other)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::column_to_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Inclusive rectangle of cells, e.g. `B2:D4`
///
/// Construction orders the corners so that `start` holds the smallest row
/// and column and `end` the largest; `D4:B2` and `B2:D4` are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        let (top, bottom) = if a.row <= b.row { (a.row, b.row) } else { (b.row, a.row) };
        let (left, right) = if a.col <= b.col { (a.col, b.col) } else { (b.col, a.col) };
        Self {
            start: CellAddress::new(top, left),
            end: CellAddress::new(bottom, right),
        }
    }

    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    pub fn single(addr: CellAddress) -> Self {
        Self::new(addr, addr)
    }

    /// Read `A1:B10`; a lone address yields a one-cell range
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut corners = text.split(':');
        let first = corners.next().unwrap_or_default();
        let second = corners.next();

        if corners.next().is_some() {
            return Err(Error::InvalidRange(text.to_string()));
        }

        let first = CellAddress::parse(first)?;
        match second {
            Some(second) => Ok(Self::new(first, CellAddress::parse(second)?)),
            None => Ok(Self::single(first)),
        }
    }

    pub fn contains(&self, addr: &CellAddress) -> bool {
        (self.start.row..=self.end.row).contains(&addr.row)
            && (self.start.col..=self.end.col).contains(&addr.col)
    }

    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn width(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.height()) * u64::from(self.width())
    }

    /// Addresses in row-major order: left to right, then top to bottom
    pub fn cells(&self) -> CellRangeIterator {
        CellRangeIterator {
            range: *self,
            next: Some(self.start),
            left: self.cell_count(),
        }
    }

    pub fn to_a1_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Iterator returned by [`CellRange::cells`]
#[derive(Debug, Clone)]
pub struct CellRangeIterator {
    range: CellRange,
    next: Option<CellAddress>,
    left: u64,
}

impl Iterator for CellRangeIterator {
    type Item = CellAddress;

    fn next(&mut self) -> Option<CellAddress> {
        let here = self.next?;
        self.left -= 1;
        self.next = if self.left == 0 {
            None
        } else if here.col < self.range.end.col {
            Some(CellAddress::new(here.row, here.col + 1))
        } else {
            Some(CellAddress::new(here.row + 1, self.range.start.col))
        };
        Some(here)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.left).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}
