//! Cell identity and A1 notation.
//!
//! A `CellAddress` uniquely identifies a cell across all sheets handled by one
//! engine. It is the node type of the dependency graph and the key of the
//! cell map.
//!
//! Columns use base-26 letters: 0=A, 25=Z, 26=AA, 701=ZZ, 702=AAA.
//! Rows are 0-based internally and 1-based in A1 text.

use serde::{Deserialize, Serialize};

/// Stable identifier for a sheet (namespace prefix of every address).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub u64);

impl SheetId {
    /// The sheet used when a host does not care about sheets.
    pub const DEFAULT: SheetId = SheetId(1);

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for SheetId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Unique identifier for a cell.
///
/// Field order is (sheet, row, col) so the derived ordering is row-major
/// within a sheet, which is the order ranges enumerate in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    /// The sheet this cell belongs to
    pub sheet: SheetId,
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
}

impl CellAddress {
    /// Create a new address. Arguments follow A1 reading order: column, then row.
    #[inline]
    pub fn new(sheet: SheetId, col: usize, row: usize) -> Self {
        Self { sheet, row, col }
    }

    /// Parse an A1 string on the given sheet.
    pub fn parse(sheet: SheetId, text: &str) -> Option<Self> {
        parse_address(text).map(|(col, row)| Self::new(sheet, col, row))
    }

    /// The sheet-less A1 form, e.g. `"C4"`.
    pub fn a1(&self) -> String {
        format_address(self.col, self.row)
    }
}

impl std::fmt::Display for CellAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sheet{}!{}", self.sheet.raw(), self.a1())
    }
}

/// Convert 0-based column index to letter(s).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert column letters (any case) to a 0-based index.
///
/// Returns `None` for an empty string, non-letters, or overflow.
pub fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut acc: usize = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        acc = acc.checked_mul(26)?.checked_add(digit)?;
    }
    Some(acc - 1)
}

/// Parse an A1 address (case-insensitive) into 0-based `(col, row)`.
///
/// Accepts exactly `letters digits` with a row of at least 1. Anything else
/// (whitespace, `$`, sheet prefixes, trailing characters) is `None`.
pub fn parse_address(text: &str) -> Option<(usize, usize)> {
    let split = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphabetic())
        .map(|(i, _)| i)?;
    let (letters, digits) = text.split_at(split);

    let col = letters_to_col(letters)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col, row - 1))
}

/// Format 0-based `(col, row)` as A1 text. Inverse of [`parse_address`].
pub fn format_address(col: usize, row: usize) -> String {
    format!("{}{}", col_to_letters(col), row + 1)
}

/// Parse a literal range token `A1:B3` into its two corners (as written).
pub fn parse_range(text: &str) -> Option<((usize, usize), (usize, usize))> {
    let (start, end) = text.split_once(':')?;
    Some((parse_address(start)?, parse_address(end)?))
}

/// Number of cells a rectangle between two corners covers, or `None` on overflow.
pub fn range_cell_count(a: (usize, usize), b: (usize, usize)) -> Option<usize> {
    let width = a.0.abs_diff(b.0).checked_add(1)?;
    let height = a.1.abs_diff(b.1).checked_add(1)?;
    width.checked_mul(height)
}

const PREALLOC_CELLS: usize = 1 << 16;

/// Enumerate every address between two corners, row-major.
///
/// Either diagonal is accepted: the corners are normalized to min/max first.
/// The sheet of `a` is used for every produced address.
pub fn resolve_range(a: CellAddress, b: CellAddress) -> Vec<CellAddress> {
    let (min_row, max_row) = (a.row.min(b.row), a.row.max(b.row));
    let (min_col, max_col) = (a.col.min(b.col), a.col.max(b.col));

    // Preallocate only up to a bound; the caller enforces the real size limit.
    let hint = range_cell_count((a.col, a.row), (b.col, b.row)).unwrap_or(0);
    let mut cells = Vec::with_capacity(hint.min(PREALLOC_CELLS));
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            cells.push(CellAddress::new(a.sheet, col, row));
        }
    }
    cells
}
