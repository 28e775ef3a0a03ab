// Raw sheet grid with merge ranges, as read from a workbook before any
// header interpretation.

use crate::value::Value;

/// Rectangular merge range, 0-indexed and inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRange {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl MergeRange {
    pub fn new(first_row: usize, first_col: usize, last_row: usize, last_col: usize) -> Self {
        Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        }
    }

    /// Parse an A1-style range such as "A1:C1". A lone cell ref is a 1x1 range.
    pub fn parse(a1: &str) -> Option<Self> {
        let (start, end) = match a1.split_once(':') {
            Some((s, e)) => (s, e),
            None => (a1, a1),
        };
        let (r1, c1) = parse_cell_ref(start)?;
        let (r2, c2) = parse_cell_ref(end)?;
        Some(Self::new(r1, c1, r2, c2))
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.first_row && row <= self.last_row && col >= self.first_col && col <= self.last_col
    }

    pub fn cell_count(&self) -> usize {
        (self.last_row - self.first_row + 1) * (self.last_col - self.first_col + 1)
    }
}

impl std::fmt::Display for MergeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            col_to_letters(self.first_col),
            self.first_row + 1,
            col_to_letters(self.last_col),
            self.last_row + 1
        )
    }
}

/// Parse a cell reference like "B12" (optionally with `$`) to 0-indexed (row, col).
pub fn parse_cell_ref(s: &str) -> Option<(usize, usize)> {
    let s = s.trim().replace('$', "");
    let split = s.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = s.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut col = 0usize;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

/// 0-indexed column to letters: 0 -> "A", 26 -> "AA".
pub fn col_to_letters(mut col: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    out.iter().rev().collect()
}

/// Sheet contents addressed by (row, col) from the absolute origin A1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    cells: Vec<Vec<Value>>,
    merges: Vec<MergeRange>,
}

impl Grid {
    pub fn new(cells: Vec<Vec<Value>>) -> Self {
        let mut grid = Self { cells, merges: Vec::new() };
        grid.square_up();
        grid
    }

    pub fn with_merges(mut self, merges: Vec<MergeRange>) -> Self {
        self.merges = merges;
        self
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn width(&self) -> usize {
        self.cells.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.cells
    }

    pub fn merges(&self) -> &[MergeRange] {
        &self.merges
    }

    pub fn get(&self, row: usize, col: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.cells.get(row).and_then(|r| r.get(col)).unwrap_or(&NULL)
    }

    /// Write a value, growing the grid when the position lies outside it.
    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        if row >= self.cells.len() {
            self.cells.resize_with(row + 1, Vec::new);
        }
        if col >= self.width() || self.cells.iter().any(|r| r.len() <= col) {
            let width = self.width().max(col + 1);
            for r in &mut self.cells {
                r.resize(width, Value::Null);
            }
        }
        self.cells[row][col] = value;
    }

    /// Dissolve every merge range, writing its anchor value into each cell.
    ///
    /// Returns the number of cells the resolved ranges covered. No merges
    /// remain afterwards.
    pub fn resolve_merges(&mut self) -> usize {
        let merges = std::mem::take(&mut self.merges);
        for range in &merges {
            let anchor = self.get(range.first_row, range.first_col).clone();
            for row in range.first_row..=range.last_row {
                for col in range.first_col..=range.last_col {
                    self.set(row, col, anchor.clone());
                }
            }
        }
        merges.iter().map(MergeRange::cell_count).sum()
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.cells
    }

    fn square_up(&mut self) {
        let width = self.cells.iter().map(|r| r.len()).max().unwrap_or(0);
        for r in &mut self.cells {
            r.resize(width, Value::Null);
        }
    }
}
