use std::fmt;

use dift_utils::log::debug;

use super::{Color, Row};

/// Widest color pool a table supports: one machine word per row.
pub const MAX_COLORS: usize = u64::BITS as usize;

/// The set of colors carried by one row, as a fixed-width bit vector.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    derive_more::BitOr,
    derive_more::BitXor,
    derive_more::BitAnd,
    derive_more::Not,
)]
pub struct ColorSet(u64);

impl ColorSet {
    pub const EMPTY: ColorSet = ColorSet(0);

    /// The set of the first `n` colors.
    pub fn first(n: usize) -> Self {
        debug_assert!(n <= MAX_COLORS);
        if n == MAX_COLORS {
            ColorSet(u64::MAX)
        } else {
            ColorSet((1u64 << n) - 1)
        }
    }

    #[inline]
    pub fn contains(self, color: Color) -> bool {
        self.0 & (1u64 << color) != 0
    }

    #[inline]
    pub fn insert(&mut self, color: Color) {
        self.0 |= 1u64 << color;
    }

    #[inline]
    pub fn remove(&mut self, color: Color) {
        self.0 &= !(1u64 << color);
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Lowest color in the set.
    pub fn lowest(self) -> Option<Color> {
        if self.is_empty() {
            None
        } else {
            Some(self.0.trailing_zeros() as Color)
        }
    }

    /// Colors in ascending order.
    pub fn iter(self) -> impl Iterator<Item = Color> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let color = bits.trailing_zeros() as Color;
            bits &= bits - 1;
            Some(color)
        })
    }
}

impl FromIterator<Color> for ColorSet {
    fn from_iter<I: IntoIterator<Item = Color>>(iter: I) -> Self {
        let mut set = ColorSet::EMPTY;
        iter.into_iter().for_each(|c| set.insert(c));
        set
    }
}

/// TaintTable records, for every row, which colors its current value
/// depends on, and hands out colors from a bounded pool.
///
/// Row and color indices are preconditions of every method: passing an
/// out-of-range index is a programming error and panics.
#[derive(Clone, Debug)]
pub struct TaintTable {
    table: Vec<ColorSet>,
    num_colors: usize,
    /// logical clock, advanced on every fresh taint
    time: u64,
    /// per color: time of the most recent false -> true taint
    timestamp: Vec<u64>,
    exhaustion_count: usize,
}

impl TaintTable {
    /// Create an empty table of `num_rows` rows over `num_colors` colors.
    pub fn new(num_rows: usize, num_colors: usize) -> Self {
        assert!(
            num_colors > 0 && num_colors <= MAX_COLORS,
            "color pool size must be within 1..={}",
            MAX_COLORS
        );
        Self {
            table: vec![ColorSet::EMPTY; num_rows],
            num_colors,
            time: 0,
            timestamp: vec![0; num_colors],
            exhaustion_count: 0,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.table.len()
    }

    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    #[inline]
    pub fn row(&self, row: Row) -> ColorSet {
        self.table[row]
    }

    #[inline]
    pub fn is_tainted(&self, row: Row, color: Color) -> bool {
        debug_assert!(color < self.num_colors);
        self.table[row].contains(color)
    }

    /// Set `(row, color)`. A fresh taint stamps the color with the current
    /// logical time; re-tainting an already set cell does not.
    pub fn taint(&mut self, row: Row, color: Color) {
        debug_assert!(color < self.num_colors);
        if self.table[row].contains(color) {
            return;
        }
        self.table[row].insert(color);
        self.timestamp[color] = self.time;
        self.time += 1;
    }

    pub fn untaint(&mut self, row: Row, color: Color) {
        debug_assert!(color < self.num_colors);
        self.table[row].remove(color);
    }

    /// Clear `color` from every row.
    pub fn untaint_col(&mut self, color: Color) {
        debug_assert!(color < self.num_colors);
        self.table.iter_mut().for_each(|set| set.remove(color));
    }

    /// `dst = src1 | src2`
    #[inline]
    pub fn union(&mut self, dst: Row, src1: Row, src2: Row) {
        self.table[dst] = self.table[src1] | self.table[src2];
    }

    /// `dst = src1 ^ src2`; `diff(r, r, r)` clears `r`.
    #[inline]
    pub fn diff(&mut self, dst: Row, src1: Row, src2: Row) {
        self.table[dst] = self.table[src1] ^ self.table[src2];
    }

    /// Colors held by at least one row.
    pub fn live(&self) -> ColorSet {
        self.table
            .iter()
            .fold(ColorSet::EMPTY, |live, &set| live | set)
    }

    /// Number of rows holding `color`.
    pub fn count(&self, color: Color) -> usize {
        self.table.iter().filter(|set| set.contains(color)).count()
    }

    /// Hand out a color for a new provenance.
    ///
    /// The lowest unused color is returned if there is one. Otherwise the
    /// color whose most recent allocation is oldest (lowest index on ties)
    /// is evicted from every row and reused, and the exhaustion counter is
    /// incremented.
    pub fn next_available_taint(&mut self) -> Color {
        let free = !self.live() & ColorSet::first(self.num_colors);
        if let Some(color) = free.lowest() {
            return color;
        }

        let color = (0..self.num_colors)
            .min_by_key(|&c| (self.timestamp[c], c))
            .expect("color pool is never empty");
        self.untaint_col(color);
        self.exhaustion_count += 1;
        debug!(
            color,
            exhaustion = self.exhaustion_count,
            "color pool exhausted, evicting oldest color"
        );
        color
    }

    pub fn exhaustion_count(&self) -> usize {
        self.exhaustion_count
    }
}

/// One line per row: the row index, then `+` or `-` for each color.
impl fmt::Display for TaintTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, set) in self.table.iter().enumerate() {
            write!(f, "{}\t", row)?;
            for color in 0..self.num_colors {
                f.write_str(if set.contains(color) { "+" } else { "-" })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorSet, TaintTable};

    const ROWS: usize = 5;
    const COLORS: usize = 8;

    fn table_with(cells: &[(usize, usize)]) -> TaintTable {
        let mut table = TaintTable::new(ROWS, COLORS);
        for &(row, color) in cells {
            table.taint(row, color);
        }
        table
    }

    #[test]
    fn test_fresh_table_is_clean() {
        let table = TaintTable::new(ROWS, COLORS);
        for r in 0..ROWS {
            for c in 0..COLORS {
                assert!(!table.is_tainted(r, c));
            }
        }
        assert_eq!(table.exhaustion_count(), 0);
    }

    #[test]
    fn test_taint_untaint() {
        let mut table = TaintTable::new(ROWS, COLORS);
        table.taint(2, 3);
        assert!(table.is_tainted(2, 3));
        table.taint(2, 3);
        assert!(table.is_tainted(2, 3));
        table.untaint(2, 3);
        assert!(!table.is_tainted(2, 3));
        table.untaint(2, 3);
        assert!(!table.is_tainted(2, 3));
    }

    #[test]
    fn test_untaint_col() {
        let mut table = table_with(&[(0, 1), (0, 2), (3, 1), (4, 2)]);
        table.untaint_col(1);
        assert!(!table.is_tainted(0, 1));
        assert!(!table.is_tainted(3, 1));
        assert!(table.is_tainted(0, 2));
        assert!(table.is_tainted(4, 2));
    }

    #[test]
    fn test_union() {
        let mut table = table_with(&[(0, 0), (0, 1), (1, 1), (1, 5), (2, 7)]);
        table.union(2, 0, 1);
        for c in 0..COLORS {
            assert_eq!(
                table.is_tainted(2, c),
                table.is_tainted(0, c) || table.is_tainted(1, c)
            );
        }
        // aliasing the destination
        table.union(0, 0, 1);
        assert_eq!(table.row(0).iter().collect::<Vec<_>>(), vec![0, 1, 5]);
    }

    #[test]
    fn test_diff() {
        let mut table = table_with(&[(0, 0), (0, 1), (0, 4), (1, 1), (1, 5)]);
        table.diff(2, 0, 1);
        for c in 0..COLORS {
            assert_eq!(
                table.is_tainted(2, c),
                table.is_tainted(0, c) != table.is_tainted(1, c)
            );
        }
        table.diff(0, 0, 0);
        assert!(table.row(0).is_empty());
    }

    #[test]
    fn test_next_available_prefers_free_color() {
        let mut table = table_with(&[(0, 0), (0, 1), (1, 3)]);
        assert_eq!(table.next_available_taint(), 2);
        table.taint(2, 2);
        assert_eq!(table.next_available_taint(), 4);
        assert_eq!(table.exhaustion_count(), 0);
        // allocation alone does not consume a color
        assert_eq!(table.next_available_taint(), 4);
    }

    #[test]
    fn test_next_available_evicts_oldest() {
        let mut table = TaintTable::new(ROWS, 4);
        // allocation order 2, 0, 3, 1
        table.taint(0, 2);
        table.taint(1, 0);
        table.taint(2, 3);
        table.taint(3, 1);
        // retainting does not refresh the timestamp
        table.taint(0, 2);
        let evicted = table.next_available_taint();
        assert_eq!(evicted, 2);
        assert_eq!(table.count(2), 0);
        assert_eq!(table.exhaustion_count(), 1);
        assert_eq!(table.live().len(), 3);
    }

    #[test]
    fn test_eviction_follows_latest_allocation() {
        let mut table = TaintTable::new(2, 2);
        table.taint(0, 0);
        table.taint(0, 1);
        table.untaint(0, 0);
        table.taint(1, 0);
        // color 0 was re-stamped after color 1
        assert_eq!(table.next_available_taint(), 1);
        assert_eq!(table.exhaustion_count(), 1);
    }

    #[test]
    fn test_color_set() {
        let set: ColorSet = [0, 3, 63].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert!(set.contains(63));
        assert_eq!(set.lowest(), Some(0));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 3, 63]);
        assert_eq!(ColorSet::first(64).len(), 64);
        assert_eq!((!ColorSet::first(3) & ColorSet::first(5)).len(), 2);
    }

    #[test]
    fn test_display() {
        let table = table_with(&[(1, 0), (1, 2)]);
        let dump = table.to_string();
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), ROWS);
        assert_eq!(lines[1], "1\t+-+-----");
    }
}
