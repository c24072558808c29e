//! Dependency tracking for formula calculation
//!
//! The graph holds coordinates only. Every formula cell has an entry, even
//! one whose formula failed to bind, so the graph also knows which cells are
//! formulas.

use ahash::{AHashMap, AHashSet};
use gridcalc_core::{CellCoordinate, SheetRange};
use std::collections::VecDeque;

/// Width of the column bands ranges are indexed by
const COLUMN_BAND: u16 = 64;

/// Something a formula reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Precedent {
    Cell(CellCoordinate),
    Range(SheetRange),
    /// Defined name, lower-cased
    Name(String),
}

/// Dependency graph for formula cells
///
/// Forward edges go from a formula cell to what it reads. Reverse indexes
/// answer "who reads this cell" and "who uses this name".
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Formula cell → what it reads
    precedents: AHashMap<CellCoordinate, Vec<Precedent>>,
    /// Cell → formula cells that read it directly
    cell_dependents: AHashMap<CellCoordinate, AHashSet<CellCoordinate>>,
    /// Range → formula cells that read it
    range_dependents: AHashMap<SheetRange, AHashSet<CellCoordinate>>,
    /// (sheet, column band) → ranges overlapping it
    range_index: AHashMap<(usize, u16), AHashSet<SheetRange>>,
    /// Name → formula cells that use it
    name_dependents: AHashMap<String, AHashSet<CellCoordinate>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything `cell` reads
    pub fn set_precedents(&mut self, cell: CellCoordinate, precedents: &[Precedent]) {
        self.clear_edges(cell);

        let mut stored = Vec::with_capacity(precedents.len());
        for precedent in precedents {
            let precedent = match precedent {
                Precedent::Cell(c) => {
                    self.cell_dependents.entry(*c).or_default().insert(cell);
                    Precedent::Cell(*c)
                }
                Precedent::Range(r) => {
                    let r = r.relative();
                    let dependents = self.range_dependents.entry(r).or_default();
                    if dependents.is_empty() {
                        for band in bands(&r) {
                            self.range_index.entry(band).or_default().insert(r);
                        }
                    }
                    dependents.insert(cell);
                    Precedent::Range(r)
                }
                Precedent::Name(n) => {
                    let n = n.to_lowercase();
                    self.name_dependents.entry(n.clone()).or_default().insert(cell);
                    Precedent::Name(n)
                }
            };
            if !stored.contains(&precedent) {
                stored.push(precedent);
            }
        }
        self.precedents.insert(cell, stored);
    }

    /// Forget a formula cell
    pub fn remove(&mut self, cell: CellCoordinate) {
        self.clear_edges(cell);
    }

    fn clear_edges(&mut self, cell: CellCoordinate) {
        let Some(old) = self.precedents.remove(&cell) else {
            return;
        };
        for precedent in old {
            match precedent {
                Precedent::Cell(c) => remove_edge(&mut self.cell_dependents, &c, &cell),
                Precedent::Range(r) => {
                    remove_edge(&mut self.range_dependents, &r, &cell);
                    if !self.range_dependents.contains_key(&r) {
                        for band in bands(&r) {
                            remove_edge(&mut self.range_index, &band, &r);
                        }
                    }
                }
                Precedent::Name(n) => remove_edge(&mut self.name_dependents, &n, &cell),
            }
        }
    }

    /// Whether `cell` is a tracked formula cell
    pub fn contains(&self, cell: CellCoordinate) -> bool {
        self.precedents.contains_key(&cell)
    }

    /// What `cell` reads
    pub fn precedents(&self, cell: CellCoordinate) -> &[Precedent] {
        self.precedents.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// All formula cells, sorted
    pub fn formula_cells(&self) -> Vec<CellCoordinate> {
        let mut cells: Vec<_> = self.precedents.keys().copied().collect();
        cells.sort_unstable();
        cells
    }

    /// Formula cells that read `cell` directly or through a range, sorted
    pub fn direct_dependents(&self, cell: CellCoordinate) -> Vec<CellCoordinate> {
        let mut result: Vec<_> = self
            .cell_dependents
            .get(&cell)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        let ranges = self.range_index.get(&(cell.sheet, cell.col / COLUMN_BAND));
        for range in ranges.into_iter().flatten() {
            if range.contains(&cell) {
                if let Some(dependents) = self.range_dependents.get(range) {
                    result.extend(dependents.iter().copied());
                }
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Every formula cell that must recalculate when `cell` changes, in
    /// breadth-first order; `cell` itself appears only when it is on a cycle
    pub fn transitive_dependents(&self, cell: CellCoordinate) -> Vec<CellCoordinate> {
        let mut result = Vec::new();
        let mut visited = AHashSet::new();
        let mut queue = VecDeque::from([cell]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(current) {
                if visited.insert(dependent) {
                    result.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        result
    }

    /// Formula cells that use the name, sorted
    pub fn name_dependents(&self, name: &str) -> Vec<CellCoordinate> {
        let mut result: Vec<_> = self
            .name_dependents
            .get(&name.to_lowercase())
            .into_iter()
            .flatten()
            .copied()
            .collect();
        result.sort_unstable();
        result
    }

    /// Formula cells that `cell` reads, directly or inside a range, sorted
    pub fn formula_precedents(&self, cell: CellCoordinate) -> Vec<CellCoordinate> {
        let mut result = Vec::new();
        for precedent in self.precedents(cell) {
            match precedent {
                Precedent::Cell(c) if self.contains(*c) => result.push(*c),
                Precedent::Range(r) => {
                    let size = r.range.cell_count() * r.sheet_count() as u64;
                    if size <= self.precedents.len() as u64 {
                        result.extend(r.coordinates().filter(|c| self.contains(*c)));
                    } else {
                        result.extend(self.precedents.keys().filter(|c| r.contains(c)));
                    }
                }
                _ => {}
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Number of tracked formula cells
    pub fn len(&self) -> usize {
        self.precedents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precedents.is_empty()
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.precedents.clear();
        self.cell_dependents.clear();
        self.range_dependents.clear();
        self.range_index.clear();
        self.name_dependents.clear();
    }
}

/// Index keys a range is filed under
fn bands(range: &SheetRange) -> impl Iterator<Item = (usize, u16)> {
    let columns = range.range.start.col / COLUMN_BAND..=range.range.end.col / COLUMN_BAND;
    (range.first_sheet..=range.last_sheet)
        .flat_map(move |sheet| columns.clone().map(move |band| (sheet, band)))
}

fn remove_edge<K, V>(index: &mut AHashMap<K, AHashSet<V>>, key: &K, value: &V)
where
    K: std::hash::Hash + Eq,
    V: std::hash::Hash + Eq,
{
    if let Some(set) = index.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_core::CellRange;
    use pretty_assertions::assert_eq;

    fn c(a1: &str) -> CellCoordinate {
        CellCoordinate::parse(a1, 0).unwrap()
    }

    fn range(a1: &str) -> Precedent {
        Precedent::Range(SheetRange::on_sheet(0, CellRange::parse(a1).unwrap()))
    }

    #[test]
    fn test_direct_dependents_include_ranges() {
        let mut graph = DependencyGraph::new();
        graph.set_precedents(c("B1"), &[Precedent::Cell(c("A1"))]);
        graph.set_precedents(c("C1"), &[range("A1:A10")]);
        graph.set_precedents(c("D1"), &[range("$A$5:$A$6")]);

        assert_eq!(graph.direct_dependents(c("A1")), vec![c("B1"), c("C1")]);
        assert_eq!(graph.direct_dependents(c("A5")), vec![c("C1"), c("D1")]);
        assert!(graph.direct_dependents(c("A11")).is_empty());
    }

    #[test]
    fn test_range_index_by_sheet_and_column_band() {
        let mut graph = DependencyGraph::new();
        let wide = SheetRange::new(0, 2, CellRange::parse("B1:CZ4").unwrap());
        graph.set_precedents(c("A9"), &[Precedent::Range(wide)]);
        graph.set_precedents(c("B9"), &[range("A1:XFD1")]);

        assert_eq!(graph.direct_dependents(CellCoordinate::new(2, 3, 100)), vec![c("A9")]);
        assert_eq!(graph.direct_dependents(c("XFD1")), vec![c("B9")]);
        assert_eq!(graph.direct_dependents(c("CZ1")), vec![c("A9"), c("B9")]);
        assert!(graph.direct_dependents(CellCoordinate::new(3, 0, 1)).is_empty());
        assert_eq!(graph.direct_dependents(c("DA1")), vec![c("B9")]);

        graph.remove(c("A9"));
        graph.remove(c("B9"));
        assert!(graph.range_index.is_empty());
    }

    #[test]
    fn test_set_precedents_replaces_edges() {
        let mut graph = DependencyGraph::new();
        graph.set_precedents(c("B1"), &[Precedent::Cell(c("A1"))]);
        graph.set_precedents(c("B1"), &[Precedent::Cell(c("A2"))]);

        assert!(graph.direct_dependents(c("A1")).is_empty());
        assert_eq!(graph.direct_dependents(c("A2")), vec![c("B1")]);

        graph.remove(c("B1"));
        assert!(graph.direct_dependents(c("A2")).is_empty());
        assert!(!graph.contains(c("B1")));
    }

    #[test]
    fn test_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        graph.set_precedents(c("B1"), &[Precedent::Cell(c("A1"))]);
        graph.set_precedents(c("C1"), &[Precedent::Cell(c("B1"))]);
        graph.set_precedents(c("D1"), &[range("B1:C1")]);

        assert_eq!(
            graph.transitive_dependents(c("A1")),
            vec![c("B1"), c("C1"), c("D1")]
        );
    }

    #[test]
    fn test_name_dependents() {
        let mut graph = DependencyGraph::new();
        graph.set_precedents(c("B1"), &[Precedent::Name("rate".into())]);
        assert_eq!(graph.name_dependents("RATE"), vec![c("B1")]);
    }

    #[test]
    fn test_formula_precedents() {
        let mut graph = DependencyGraph::new();

        // A1 -> B1 -> C1 -> A1 (circular), D1 reads the cycle without being on it
        graph.set_precedents(c("A1"), &[Precedent::Cell(c("B1"))]);
        graph.set_precedents(c("B1"), &[range("C1:C3")]);
        graph.set_precedents(c("C1"), &[Precedent::Cell(c("A1")), Precedent::Cell(c("Z9"))]);
        graph.set_precedents(c("D1"), &[Precedent::Cell(c("A1"))]);

        assert_eq!(graph.formula_precedents(c("C1")), vec![c("A1")]);
        assert_eq!(graph.formula_precedents(c("B1")), vec![c("C1")]);
        assert_eq!(graph.formula_precedents(c("D1")), vec![c("A1")]);

        // Whole-sheet ranges filter the formula cells instead of walking the range
        graph.set_precedents(c("E1"), &[range("A1:XFD1048576")]);
        assert_eq!(
            graph.formula_precedents(c("E1")),
            vec![c("A1"), c("B1"), c("C1"), c("D1"), c("E1")]
        );
    }
}
