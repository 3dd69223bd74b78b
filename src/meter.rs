//! Meter render model: a glyph plane and an attribute plane

use crate::constants::meter::{BAR_CELLS, FRAME_COLS, HIST_COLS, HIST_ROWS, VOLUME_DIGITS};
use ratatui::style::Color;

/// Color tier of a meter cell, assigned from the cell's own threshold.
///
/// A filled cell keeps its tier no matter how loud the current level is,
/// which keeps the bar gradient-consistent at any fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Low,
    Mid,
    High,
}

impl Tier {
    /// Tier for a cell whose fill threshold is `threshold` percent
    pub fn for_threshold(threshold: u8) -> Self {
        if threshold < 60 {
            Tier::Low
        } else if threshold < 80 {
            Tier::Mid
        } else {
            Tier::High
        }
    }

    /// Terminal color of this tier
    pub fn color(self) -> Color {
        match self {
            Tier::Low => Color::Green,
            Tier::Mid => Color::Yellow,
            Tier::High => Color::Red,
        }
    }
}

/// Textual plane of the meter frame.
///
/// Everything except the volume readout is decoration, set once here and
/// never touched again.
pub struct GlyphFrame {
    left_bracket: char,
    volume: [char; VOLUME_DIGITS],
    right_bracket: char,
    delimiter: char,
    divider: [char; FRAME_COLS],
}

impl GlyphFrame {
    pub fn new() -> Self {
        Self {
            left_bracket: '[',
            volume: [' '; VOLUME_DIGITS],
            right_bracket: ']',
            delimiter: ' ',
            divider: ['='; FRAME_COLS],
        }
    }

    /// Format `percentage` left-justified into the 3-character readout field
    pub fn set_volume(&mut self, percentage: u8) {
        self.volume = [' '; VOLUME_DIGITS];
        let digits = percentage.to_string();
        for (slot, digit) in self.volume.iter_mut().zip(digits.chars()) {
            *slot = digit;
        }
    }

    /// The readout row up to where the bar cells start: `[NNN] `
    pub fn readout(&self) -> String {
        let mut row = String::with_capacity(VOLUME_DIGITS + 3);
        row.push(self.left_bracket);
        row.extend(self.volume);
        row.push(self.right_bracket);
        row.push(self.delimiter);
        row
    }

    /// The full-width divider line
    pub fn divider(&self) -> String {
        self.divider.iter().collect()
    }
}

impl Default for GlyphFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute plane of the meter frame: the linear bar and the histogram.
///
/// The histogram is a left-scrolling strip chart. There is no backing log;
/// the visible grid is the entire historical record, and the column shifted
/// off the left edge is gone.
pub struct AttrFrame {
    bar: [Option<Tier>; BAR_CELLS],
    histogram: [[Option<Tier>; HIST_COLS]; HIST_ROWS],
}

impl AttrFrame {
    pub fn new() -> Self {
        Self {
            bar: [None; BAR_CELLS],
            histogram: [[None; HIST_COLS]; HIST_ROWS],
        }
    }

    /// Refill the bar and append one histogram column for `percentage`
    pub fn update(&mut self, percentage: u8) {
        for (index, cell) in self.bar.iter_mut().enumerate() {
            let threshold = ((index * 100) / BAR_CELLS) as u8;
            *cell = (threshold < percentage).then(|| Tier::for_threshold(threshold));
        }

        for row in self.histogram.iter_mut() {
            for col in 0..HIST_COLS - 1 {
                row[col] = row[col + 1];
            }
        }

        for (row_index, row) in self.histogram.iter_mut().enumerate() {
            let threshold = (((HIST_ROWS - (row_index + 1)) * 100) / HIST_ROWS) as u8;
            row[HIST_COLS - 1] = (threshold < percentage).then(|| Tier::for_threshold(threshold));
        }
    }

    pub fn bar(&self) -> &[Option<Tier>; BAR_CELLS] {
        &self.bar
    }

    pub fn histogram(&self) -> &[[Option<Tier>; HIST_COLS]; HIST_ROWS] {
        &self.histogram
    }
}

impl Default for AttrFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete meter frame, both planes updated in lockstep.
///
/// `update` only mutates the planes; the caller flushes them to the
/// terminal afterwards.
pub struct MeterFrame {
    pub glyphs: GlyphFrame,
    pub attrs: AttrFrame,
}

impl MeterFrame {
    pub fn new() -> Self {
        Self {
            glyphs: GlyphFrame::new(),
            attrs: AttrFrame::new(),
        }
    }

    pub fn update(&mut self, percentage: u8) {
        self.glyphs.set_volume(percentage);
        self.attrs.update(percentage);
    }
}

impl Default for MeterFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readout_is_left_justified() {
        let mut glyphs = GlyphFrame::new();
        glyphs.set_volume(7);
        assert_eq!(glyphs.readout(), "[7  ] ");
        glyphs.set_volume(42);
        assert_eq!(glyphs.readout(), "[42 ] ");
        glyphs.set_volume(100);
        assert_eq!(glyphs.readout(), "[100] ");
    }

    #[test]
    fn divider_is_static_fill() {
        let glyphs = GlyphFrame::new();
        assert_eq!(glyphs.divider(), "=".repeat(FRAME_COLS));
    }

    #[test]
    fn bar_grows_monotonically() {
        let filled = |pct: u8| {
            let mut attrs = AttrFrame::new();
            attrs.update(pct);
            attrs
                .bar()
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.map(|_| i))
                .collect::<Vec<_>>()
        };

        for (low, high) in [(0u8, 10u8), (10, 40), (40, 75), (75, 100)] {
            let below = filled(low);
            let above = filled(high);
            assert!(below.iter().all(|i| above.contains(i)));
            assert!(above.len() >= below.len());
        }
    }

    #[test]
    fn bar_cell_tier_depends_on_position_only() {
        let mut half = AttrFrame::new();
        half.update(50);
        let mut full = AttrFrame::new();
        full.update(100);

        // Cell 0 is Low at any fill; the last cell is High when reached
        assert_eq!(half.bar()[0], Some(Tier::Low));
        assert_eq!(full.bar()[0], Some(Tier::Low));
        assert_eq!(full.bar()[BAR_CELLS - 1], Some(Tier::High));
    }

    #[test]
    fn empty_and_full_bar() {
        let mut attrs = AttrFrame::new();
        attrs.update(0);
        assert!(attrs.bar().iter().all(|c| c.is_none()));
        attrs.update(100);
        assert!(attrs.bar().iter().all(|c| c.is_some()));
    }

    #[test]
    fn histogram_scrolls_without_reordering() {
        let mut attrs = AttrFrame::new();
        let levels = [10u8, 95, 40, 70, 5, 100, 55];
        for pct in levels {
            attrs.update(pct);
        }
        let before = *attrs.histogram();

        let shift = 3usize;
        for pct in [33u8, 66, 99] {
            attrs.update(pct);
        }
        let after = attrs.histogram();

        for row in 0..HIST_ROWS {
            for col in 0..HIST_COLS - shift {
                assert_eq!(after[row][col], before[row][col + shift]);
            }
        }
    }

    #[test]
    fn histogram_column_is_a_thermometer() {
        let mut attrs = AttrFrame::new();
        attrs.update(50);
        let hist = attrs.histogram();

        // Top row represents the loudest band and stays dark at 50%,
        // the bottom row fills for any non-zero level
        assert_eq!(hist[0][HIST_COLS - 1], None);
        assert_eq!(hist[HIST_ROWS - 1][HIST_COLS - 1], Some(Tier::Low));

        // Filled cells form a contiguous run from the bottom up
        let filled_from = (0..HIST_ROWS)
            .find(|&row| hist[row][HIST_COLS - 1].is_some())
            .unwrap();
        for row in filled_from..HIST_ROWS {
            assert!(hist[row][HIST_COLS - 1].is_some());
        }
    }

    #[test]
    fn histogram_top_cells_are_high_tier() {
        let mut attrs = AttrFrame::new();
        attrs.update(100);
        let hist = attrs.histogram();
        assert_eq!(hist[0][HIST_COLS - 1], Some(Tier::High));
        assert_eq!(hist[HIST_ROWS - 1][HIST_COLS - 1], Some(Tier::Low));
    }
}
