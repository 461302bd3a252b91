use std::ops::MulAssign;

use num_traits::Zero;

use crate::types::{CANCELLATION_TOLERANCE, ZERO_TOLERANCE};

/// Element type of a `SparseMatrix`.
pub trait Coefficient: Copy + Default + PartialEq + Zero + MulAssign {
    /// Entries for which this returns true are not stored.
    fn is_negligible(&self) -> bool {
        self.is_zero()
    }

    /// Whether `self`, the sum of `lhs` and `rhs`, is only what is left
    /// of their cancellation.
    fn cancels(&self, _lhs: Self, _rhs: Self) -> bool {
        self.is_negligible()
    }
}

impl Coefficient for i64 {}

impl Coefficient for f64 {
    fn is_negligible(&self) -> bool {
        self.abs() < ZERO_TOLERANCE
    }

    fn cancels(&self, lhs: Self, rhs: Self) -> bool {
        self.is_negligible() || self.abs() <= CANCELLATION_TOLERANCE * lhs.abs().max(rhs.abs())
    }
}

const NONE: usize = usize::MAX;

/// Previous and next element of a doubly linked list of entries.
#[derive(Clone, Copy)]
struct Links {
    prev: usize,
    next: usize,
}

impl Default for Links {
    fn default() -> Self {
        Links {
            prev: NONE,
            next: NONE,
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    /// Along a row, i.e. by increasing column.
    Row,
    /// Along a column, i.e. by increasing row.
    Column,
}

#[derive(Clone, Default)]
struct Entry<T> {
    value: T,
    row: usize,
    col: usize,
    in_row: Links,
    in_column: Links,
}

impl<T> Entry<T> {
    fn links(&self, direction: Direction) -> Links {
        match direction {
            Direction::Row => self.in_row,
            Direction::Column => self.in_column,
        }
    }
    fn links_mut(&mut self, direction: Direction) -> &mut Links {
        match direction {
            Direction::Row => &mut self.in_row,
            Direction::Column => &mut self.in_column,
        }
    }
    /// The row or column the entry is linked into.
    fn line(&self, direction: Direction) -> usize {
        match direction {
            Direction::Row => self.row,
            Direction::Column => self.col,
        }
    }
}

/// Sparse matrix with every row and column kept as a doubly linked list,
/// rows sorted by column and columns sorted by row. Slots of erased
/// entries are reused.
#[derive(Clone, Default)]
pub struct SparseMatrix<T> {
    entries: Vec<Entry<T>>,
    /// First (`next`) and last (`prev`) entry of every row.
    row_ends: Vec<Links>,
    column_ends: Vec<Links>,
    free: Vec<usize>,
}

struct Walk<'a, T> {
    next: usize,
    entries: &'a [Entry<T>],
    direction: Direction,
}

impl<'a, T> Iterator for Walk<'a, T> {
    type Item = (usize, &'a Entry<T>);
    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next;
        let entry = self.entries.get(id)?;
        self.next = entry.links(self.direction).next;
        Some((id, entry))
    }
}

impl<T: Coefficient> SparseMatrix<T> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn rows(&self) -> usize {
        self.row_ends.len()
    }
    pub fn columns(&self) -> usize {
        self.column_ends.len()
    }

    /// Iterates over `(row, column, value)` of the entries of a row, in
    /// increasing column order.
    pub fn iterate_row(&self, row: usize) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        self.walk(Direction::Row, row).map(|(_, e)| (e.row, e.col, e.value))
    }

    /// Iterates over `(row, column, value)` of the entries of a column, in
    /// increasing row order.
    pub fn iterate_column(&self, col: usize) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        self.walk(Direction::Column, col).map(|(_, e)| (e.row, e.col, e.value))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.walk(Direction::Row, row)
            .map(|(_, e)| e)
            .take_while(|e| e.col <= col)
            .find(|e| e.col == col)
            .map(|e| e.value)
    }

    /// Stores `value` at the given position, removing the entry if the value
    /// is negligible. The row has to exist.
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let id = self
            .walk(Direction::Row, row)
            .find(|(_, e)| e.col >= col)
            .map_or(NONE, |(id, _)| id);
        let exists = self.entries.get(id).is_some_and(|e| e.col == col);
        match (exists, value.is_negligible()) {
            (true, true) => self.erase(id),
            (true, false) => self.entries[id].value = value,
            (false, true) => {}
            (false, false) => self.insert(row, col, value, id),
        }
    }

    pub fn multiply_row_by_factor(&mut self, row: usize, factor: T) {
        let ids = self
            .walk(Direction::Row, row)
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        for id in ids {
            self.entries[id].value *= factor;
            if self.entries[id].value.is_negligible() {
                self.erase(id);
            }
        }
    }

    /// Adds `factor` times row `source` to row `target`.
    pub fn add_multiple_of_row(&mut self, source: usize, target: usize, factor: T) {
        let source_entries = self
            .iterate_row(source)
            .map(|(_, col, value)| (col, value))
            .collect::<Vec<_>>();
        for (col, mut value) in source_entries {
            value *= factor;
            let old = self.get(target, col).unwrap_or_else(T::zero);
            let sum = old + value;
            if sum.cancels(old, value) {
                self.set(target, col, T::zero());
            } else {
                self.set(target, col, sum);
            }
        }
    }

    /// Appends a new row made of `(column, value)` pairs sorted by column.
    pub fn append_row(&mut self, entries: impl Iterator<Item = (usize, T)>) {
        let row = self.rows();
        self.row_ends.push(Links::default());
        for (col, value) in entries {
            if !value.is_negligible() {
                self.insert(row, col, value, NONE);
            }
        }
    }
}

impl<T: Coefficient> SparseMatrix<T> {
    fn walk(&self, direction: Direction, line: usize) -> Walk<'_, T> {
        let ends = match direction {
            Direction::Row => &self.row_ends,
            Direction::Column => &self.column_ends,
        };
        Walk {
            next: ends.get(line).map_or(NONE, |l| l.next),
            entries: &self.entries,
            direction,
        }
    }

    fn ensure_size(&mut self, row: usize, col: usize) {
        if row >= self.row_ends.len() {
            self.row_ends.resize_with(row + 1, Default::default);
        }
        if col >= self.column_ends.len() {
            self.column_ends.resize_with(col + 1, Default::default);
        }
    }

    /// Links a new entry into its row before `next_in_row` (`NONE` appends)
    /// and into its column at the position given by its row.
    fn insert(&mut self, row: usize, col: usize, value: T, next_in_row: usize) {
        self.ensure_size(row, col);
        let id = self.free.pop().unwrap_or_else(|| {
            self.entries.push(Default::default());
            self.entries.len() - 1
        });
        let mut entry = Entry {
            value,
            row,
            col,
            in_row: Links {
                prev: NONE,
                next: next_in_row,
            },
            in_column: Links {
                prev: NONE,
                next: self.column_successor(row, col),
            },
        };
        for direction in [Direction::Row, Direction::Column] {
            let prev = std::mem::replace(self.next_prev(direction, &entry), id);
            entry.links_mut(direction).prev = prev;
            *self.prev_next(direction, &entry) = id;
        }
        self.entries[id] = entry;
    }

    /// First entry of column `col` below `row`.
    fn column_successor(&self, row: usize, col: usize) -> usize {
        let last = self.entries.get(self.column_ends[col].prev);
        if !last.is_some_and(|e| e.row > row) {
            // Appending at the bottom.
            return NONE;
        }
        self.walk(Direction::Column, col)
            .find(|(_, e)| e.row > row)
            .map_or(NONE, |(id, _)| id)
    }

    fn erase(&mut self, id: usize) {
        let entry = std::mem::take(&mut self.entries[id]);
        for direction in [Direction::Row, Direction::Column] {
            let links = entry.links(direction);
            *self.prev_next(direction, &entry) = links.next;
            *self.next_prev(direction, &entry) = links.prev;
        }
        self.free.push(id);
    }

    /// The `prev` field of the successor of `entry`, or of the list end.
    fn next_prev(&mut self, direction: Direction, entry: &Entry<T>) -> &mut usize {
        let next = entry.links(direction).next;
        &mut self.links_or_end(direction, next, entry.line(direction)).prev
    }

    /// The `next` field of the predecessor of `entry`, or of the list start.
    fn prev_next(&mut self, direction: Direction, entry: &Entry<T>) -> &mut usize {
        let prev = entry.links(direction).prev;
        &mut self.links_or_end(direction, prev, entry.line(direction)).next
    }

    fn links_or_end(&mut self, direction: Direction, id: usize, line: usize) -> &mut Links {
        let ends = match direction {
            Direction::Row => &mut self.row_ends,
            Direction::Column => &mut self.column_ends,
        };
        match self.entries.get_mut(id) {
            Some(entry) => entry.links_mut(direction),
            None => &mut ends[line],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn matrix_by_row(m: &SparseMatrix<i64>) -> Vec<Vec<i64>> {
        (0..m.rows())
            .map(|r| m.iterate_row(r).map(|(_, _, v)| v).collect::<Vec<_>>())
            .collect::<Vec<_>>()
    }

    fn matrix_by_column(m: &SparseMatrix<i64>) -> Vec<Vec<i64>> {
        (0..m.columns())
            .map(|c| m.iterate_column(c).map(|(_, _, v)| v).collect::<Vec<_>>())
            .collect::<Vec<_>>()
    }

    #[test]
    fn add_two_rows() {
        let mut m = SparseMatrix::<i64>::new();
        m.append_row(vec![(0, 1), (3, 2), (4, 3)].into_iter());
        m.append_row(vec![(1, 4), (3, 5), (5, 6)].into_iter());
        assert_eq!(m.columns(), 6);
        assert_eq!(m.rows(), 2);
        assert_eq!(
            matrix_by_column(&m),
            vec![vec![1], vec![4], vec![], vec![2, 5], vec![3], vec![6]]
        );
        assert_eq!(matrix_by_row(&m), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn multiply_by_factor() {
        let mut m = SparseMatrix::<i64>::new();
        m.append_row(vec![(0, 1), (3, 2), (4, 3)].into_iter());
        m.append_row(vec![(1, 4), (2, 5), (4, 6)].into_iter());
        m.append_row(vec![(0, 7), (2, 8), (3, 9)].into_iter());
        m.multiply_row_by_factor(0, 0);
        m.multiply_row_by_factor(2, 0);
        assert_eq!(
            matrix_by_column(&m),
            vec![vec![], vec![4], vec![5], vec![], vec![6]]
        );
        assert_eq!(matrix_by_row(&m), vec![vec![], vec![4, 5, 6], vec![]]);
    }

    #[test]
    fn reuse_abandoned() {
        let mut m = SparseMatrix::<i64>::new();
        m.append_row(vec![(0, 1), (3, 2), (4, 3)].into_iter());
        m.append_row(vec![(1, 4), (3, 5), (5, 6)].into_iter());
        m.multiply_row_by_factor(0, 0);
        m.append_row(vec![(0, 1), (3, 2), (4, 3)].into_iter());
        assert_eq!(m.entries.len(), 6);
        assert_eq!(
            matrix_by_row(&m),
            vec![vec![], vec![4, 5, 6], vec![1, 2, 3]]
        );
        assert_eq!(
            matrix_by_column(&m),
            vec![vec![1], vec![4], vec![], vec![5, 2], vec![3], vec![6]]
        );
    }

    #[test]
    fn set_keeps_order() {
        let mut m = SparseMatrix::<i64>::new();
        m.append_row(vec![(1, 1), (4, 2)].into_iter());
        m.append_row(vec![(0, 3), (2, 4)].into_iter());
        m.set(0, 2, 7);
        m.set(0, 0, 8);
        m.set(0, 6, 9);
        m.set(1, 1, 5);
        assert_eq!(matrix_by_row(&m), vec![vec![8, 1, 7, 2, 9], vec![3, 5, 4]]);
        assert_eq!(
            m.iterate_row(0).map(|(_, c, _)| c).collect::<Vec<_>>(),
            vec![0, 1, 2, 4, 6]
        );
        assert_eq!(
            matrix_by_column(&m),
            vec![vec![8, 3], vec![1, 5], vec![7, 4], vec![], vec![2], vec![], vec![9]]
        );
        m.set(0, 1, 0);
        m.set(1, 3, 0);
        assert_eq!(matrix_by_row(&m), vec![vec![8, 7, 2, 9], vec![3, 5, 4]]);
        assert_eq!(m.get(0, 1), None);
        assert_eq!(m.get(0, 2), Some(7));
        assert_eq!(m.get(1, 1), Some(5));
    }

    #[test]
    fn add_multiple() {
        let mut m = SparseMatrix::<i64>::new();
        m.append_row(vec![(0, 1), (2, -1)].into_iter());
        m.append_row(vec![(1, 2), (2, 3)].into_iter());
        m.add_multiple_of_row(0, 1, 3);
        assert_eq!(matrix_by_row(&m), vec![vec![1, -1], vec![3, 2]]);
        assert_eq!(
            m.iterate_row(1).map(|(_, c, _)| c).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(matrix_by_column(&m), vec![vec![1, 3], vec![2], vec![-1]]);
    }

    #[test]
    fn negligible_floats_are_dropped() {
        let mut m = SparseMatrix::<f64>::new();
        m.append_row(vec![(0, 1.0), (1, 1e-15)].into_iter());
        assert_eq!(m.iterate_row(0).count(), 1);
        m.append_row(vec![(0, -1.0), (1, 2.0)].into_iter());
        m.add_multiple_of_row(0, 1, 1.0);
        assert_eq!(m.get(1, 0), None);
        assert_eq!(m.get(1, 1), Some(2.0));
    }

    #[test]
    fn cancellation_residue_is_dropped() {
        let mut m = SparseMatrix::<f64>::new();
        m.append_row(vec![(0, 0.1), (1, 31.7 * 0.3)].into_iter());
        m.append_row(vec![(0, 1.0), (1, 31.7 * 3.0)].into_iter());
        // Exact arithmetic gives zero in both columns.
        m.add_multiple_of_row(0, 1, -10.0);
        assert_eq!(m.get(1, 0), None);
        assert_eq!(m.get(1, 1), None);
        assert_eq!(m.iterate_row(1).count(), 0);
        // Small values that do not come from cancellation stay.
        m.append_row(vec![(0, 1e-9)].into_iter());
        m.add_multiple_of_row(2, 2, 1.0);
        assert_eq!(m.get(2, 0), Some(2e-9));
    }
}
