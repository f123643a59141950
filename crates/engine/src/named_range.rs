//! Named range definitions and management
//!
//! A named range gives a rectangle of cells a name usable wherever a reference
//! is accepted (e.g., =SUM(Revenue) instead of =SUM(A1:A100)). Lookups are
//! case-insensitive; the stored name keeps the case it was defined with.
//!
//! Each range carries a stable id that is never reused, so hosts can hold on
//! to a range across renames.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::address::{format_address, parse_address, CellAddress, SheetId};
use crate::error::NamedRangeError;
use crate::formula::functions::Function;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamedRangeId(pub u64);

/// A rectangle of cells: top-left corner plus size. Zero width or height is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left column (0-based)
    pub x: usize,
    /// Top row (0-based)
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// The rectangle spanning two corners given in either order.
    pub fn from_corners(a: (usize, usize), b: (usize, usize)) -> Self {
        let (x, y) = (a.0.min(b.0), a.1.min(b.1));
        Self::new(x, y, a.0.abs_diff(b.0).saturating_add(1), a.1.abs_diff(b.1).saturating_add(1))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn cell_count(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// True when the far edge of the rectangle fits in the coordinate space.
    pub fn in_bounds(&self) -> bool {
        self.x.checked_add(self.width).is_some() && self.y.checked_add(self.height).is_some()
    }

    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.x && col - self.x < self.width && row >= self.y && row - self.y < self.height
    }

    /// Every cell in the rectangle on `sheet`, row-major.
    pub fn cells(&self, sheet: SheetId) -> Vec<CellAddress> {
        let mut cells = Vec::with_capacity(self.cell_count());
        for row in self.y..self.y.saturating_add(self.height) {
            for col in self.x..self.x.saturating_add(self.width) {
                cells.push(CellAddress::new(sheet, col, row));
            }
        }
        cells
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedRange {
    /// Assigned by the store on insert.
    pub id: NamedRangeId,
    pub name: String,
    pub sheet: SheetId,
    pub rect: Rect,
}

impl NamedRange {
    /// A range not yet added to a store. Its id is assigned on insert.
    pub fn new(name: impl Into<String>, sheet: SheetId, rect: Rect) -> Self {
        Self {
            id: NamedRangeId(0),
            name: name.into(),
            sheet,
            rect,
        }
    }

    pub fn cells(&self) -> Vec<CellAddress> {
        self.rect.cells(self.sheet)
    }

    /// The A1 text of the target ("A1", "A1:C10", or "" when empty).
    pub fn reference_string(&self) -> String {
        let r = &self.rect;
        if r.is_empty() {
            String::new()
        } else if r.width == 1 && r.height == 1 {
            format_address(r.x, r.y)
        } else {
            format!(
                "{}:{}",
                format_address(r.x, r.y),
                format_address(r.x.saturating_add(r.width - 1), r.y.saturating_add(r.height - 1))
            )
        }
    }

    pub fn references_cell(&self, cell: CellAddress) -> bool {
        self.sheet == cell.sheet && self.rect.contains(cell.col, cell.row)
    }
}

/// Validate a named range identifier
/// Rules:
/// - Must start with letter or underscore
/// - Can contain letters, numbers, underscores, and dots (for namespaces)
/// - Cannot be a built-in function name (SUM, IF, ...)
/// - Cannot be a boolean literal (TRUE, FALSE)
///
/// Names shaped like an A1 address are accepted; see [`looks_like_cell_ref`].
pub fn is_valid_name(name: &str) -> Result<(), String> {
    let name = name.trim();

    let Some(first) = name.chars().next() else {
        return Err("Name cannot be empty".into());
    };

    if first.is_ascii_digit() {
        return Err("Name must start with a letter or underscore, not a digit".into());
    }
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err("Name must start with a letter or underscore".into());
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err("Name can only contain letters, numbers, underscores, and dots".into());
    }
    if name.ends_with('.') {
        return Err("Name cannot end with a dot".into());
    }
    if name.contains("..") {
        return Err("Name cannot have consecutive dots".into());
    }

    let upper = name.to_ascii_uppercase();
    if upper == "TRUE" || upper == "FALSE" {
        return Err(format!(
            "'{}' is a reserved boolean value. Choose a different name.",
            name
        ));
    }
    if Function::from_name(&upper).is_some() {
        return Err(format!(
            "'{}' is a function name. Choose a different name to avoid confusion.",
            name
        ));
    }

    Ok(())
}

/// True when the name also parses as an A1 address (e.g. "B12").
/// Such a name shadows the cell in every formula while it is defined.
pub fn looks_like_cell_ref(name: &str) -> bool {
    parse_address(name.trim()).is_some()
}

/// Storage for named ranges, keyed by id with a case-insensitive name index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedRangeStore {
    ranges: FxHashMap<NamedRangeId, NamedRange>,
    /// Lowercase name -> id
    by_name: FxHashMap<String, NamedRangeId>,
    next_id: u64,
}

impl NamedRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new named range, assigning it a fresh id.
    pub fn insert(&mut self, mut range: NamedRange) -> Result<NamedRangeId, NamedRangeError> {
        let name = validate(&range.name)?;
        check_rect(&name, range.rect)?;
        let key = name.to_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(NamedRangeError::Duplicate(name));
        }
        if looks_like_cell_ref(&name) {
            log::warn!("named range '{}' shadows the cell address of the same spelling", name);
        }

        self.next_id += 1;
        let id = NamedRangeId(self.next_id);
        range.id = id;
        range.name = name;
        self.by_name.insert(key, id);
        self.ranges.insert(id, range);
        Ok(id)
    }

    /// Get a named range by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&NamedRange> {
        let id = self.by_name.get(&name.trim().to_lowercase())?;
        self.ranges.get(id)
    }

    pub fn get_by_id(&self, id: NamedRangeId) -> Option<&NamedRange> {
        self.ranges.get(&id)
    }

    /// Check if a name exists (case-insensitive)
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove a named range by name (case-insensitive)
    pub fn remove(&mut self, name: &str) -> Result<NamedRange, NamedRangeError> {
        let id = self
            .by_name
            .remove(&name.trim().to_lowercase())
            .ok_or_else(|| NamedRangeError::NotFound(name.to_string()))?;
        self.ranges
            .remove(&id)
            .ok_or_else(|| NamedRangeError::NotFound(name.to_string()))
    }

    /// Rename a named range, keeping its id and target.
    ///
    /// A case-only rename (foo -> Foo) is allowed.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<NamedRangeId, NamedRangeError> {
        let new_name = validate(new_name)?;
        let old_key = old_name.trim().to_lowercase();
        let new_key = new_name.to_lowercase();

        let id = *self
            .by_name
            .get(&old_key)
            .ok_or_else(|| NamedRangeError::NotFound(old_name.to_string()))?;
        if old_key != new_key && self.by_name.contains_key(&new_key) {
            return Err(NamedRangeError::Duplicate(new_name));
        }
        if looks_like_cell_ref(&new_name) {
            log::warn!("named range '{}' shadows the cell address of the same spelling", new_name);
        }

        self.by_name.remove(&old_key);
        self.by_name.insert(new_key, id);
        if let Some(range) = self.ranges.get_mut(&id) {
            range.name = new_name;
        }
        Ok(id)
    }

    /// Point an existing name at a new rectangle. Returns the previous definition.
    pub fn retarget(&mut self, name: &str, sheet: SheetId, rect: Rect) -> Result<NamedRange, NamedRangeError> {
        let range = self
            .by_name
            .get(&name.trim().to_lowercase())
            .and_then(|id| self.ranges.get_mut(id))
            .ok_or_else(|| NamedRangeError::NotFound(name.to_string()))?;
        check_rect(&range.name, rect)?;
        let previous = range.clone();
        range.sheet = sheet;
        range.rect = rect;
        Ok(previous)
    }

    /// All named ranges, sorted by name (case-insensitive).
    pub fn list(&self) -> Vec<&NamedRange> {
        let mut ranges: Vec<&NamedRange> = self.ranges.values().collect();
        ranges.sort_by_key(|r| r.name.to_lowercase());
        ranges
    }

    /// Find all named ranges that cover a specific cell
    pub fn find_by_cell(&self, cell: CellAddress) -> Vec<&NamedRange> {
        let mut found: Vec<&NamedRange> = self
            .ranges
            .values()
            .filter(|nr| nr.references_cell(cell))
            .collect();
        found.sort_by_key(|r| r.id);
        found
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

fn validate(name: &str) -> Result<String, NamedRangeError> {
    is_valid_name(name).map_err(|reason| NamedRangeError::InvalidName {
        name: name.to_string(),
        reason,
    })?;
    Ok(name.trim().to_string())
}

fn check_rect(name: &str, rect: Rect) -> Result<(), NamedRangeError> {
    if rect.in_bounds() {
        Ok(())
    } else {
        Err(NamedRangeError::InvalidRect {
            name: name.trim().to_string(),
            reason: format!("{:?} extends past the last addressable cell", rect),
        })
    }
}
