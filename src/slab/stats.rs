//! Per-class usage statistics
//!
//! The engine reports every event to [`EngineStats`] when stats recording
//! is enabled. Counters only ever grow; `high_water_mark` is the running
//! maximum of `allocated - freed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Counters for one size class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    pub index: usize,
    pub slot_size: usize,
    pub capacity: usize,
    /// Address range of the class's slots
    pub range: Range<usize>,
    pub allocated: u64,
    pub freed: u64,
    pub high_water_mark: u64,
    pub reallocate_requests: u64,
    pub reallocate_grows_needed: u64,
    pub reallocate_shrinks_needed: u64,
    /// Requests this class could not serve that moved up a class
    pub overflows: u64,
}

impl ClassStats {
    /// Slots currently in use according to the counters
    pub fn in_use(&self) -> u64 {
        self.allocated.saturating_sub(self.freed)
    }

    /// Share of the class in use, in percent; `0.0` for disabled classes
    pub fn percent_full(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.in_use() as f64 * 100.0 / self.capacity as f64
        }
    }

    fn track_high_water(&mut self) {
        self.high_water_mark = self.high_water_mark.max(self.in_use());
    }
}

/// Statistics for every class of one engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    classes: Vec<ClassStats>,
}

impl EngineStats {
    /// Create zeroed counters for `(slot_size, capacity, range)` per class
    pub fn new(layout: impl IntoIterator<Item = (usize, usize, Range<usize>)>) -> Self {
        let classes = layout
            .into_iter()
            .enumerate()
            .map(|(index, (slot_size, capacity, range))| ClassStats {
                index,
                slot_size,
                capacity,
                range,
                ..ClassStats::default()
            })
            .collect();
        Self { classes }
    }

    /// Counters for class `index`
    pub fn class(&self, index: usize) -> Option<&ClassStats> {
        self.classes.get(index)
    }

    /// Counters for every class, class 0 first
    pub fn classes(&self) -> &[ClassStats] {
        &self.classes
    }

    pub fn on_allocate(&mut self, index: usize) {
        if let Some(class) = self.classes.get_mut(index) {
            class.allocated += 1;
            class.track_high_water();
        }
    }

    pub fn on_free(&mut self, index: usize) {
        if let Some(class) = self.classes.get_mut(index) {
            class.freed += 1;
            class.track_high_water();
        }
    }

    pub fn on_reallocate(&mut self, index: usize) {
        if let Some(class) = self.classes.get_mut(index) {
            class.reallocate_requests += 1;
        }
    }

    pub fn on_grow(&mut self, index: usize) {
        if let Some(class) = self.classes.get_mut(index) {
            class.reallocate_grows_needed += 1;
        }
    }

    pub fn on_shrink(&mut self, index: usize) {
        if let Some(class) = self.classes.get_mut(index) {
            class.reallocate_shrinks_needed += 1;
        }
    }

    pub fn on_overflow(&mut self, index: usize) {
        if let Some(class) = self.classes.get_mut(index) {
            class.overflows += 1;
        }
    }

    /// Every counter of every class
    pub fn detailed_report(&self) -> DetailedReport {
        DetailedReport {
            classes: self.classes.clone(),
        }
    }

    /// Fill level and overflow tally per class
    pub fn compact_report(&self) -> CompactReport {
        let classes = self
            .classes
            .iter()
            .map(|c| CompactLine {
                index: c.index,
                slot_size: c.slot_size,
                used: c.in_use(),
                total: c.capacity,
                percent_full: c.percent_full(),
                overflows: c.overflows,
            })
            .collect();
        CompactReport { classes }
    }
}

/// Full per-class counters
#[derive(Debug, Clone, Serialize)]
pub struct DetailedReport {
    pub classes: Vec<ClassStats>,
}

impl fmt::Display for DetailedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bucket allocator stats")?;
        for c in &self.classes {
            writeln!(
                f,
                "  [{:2}] {:>7} B x {:<6} {:#x}..{:#x}",
                c.index, c.slot_size, c.capacity, c.range.start, c.range.end
            )?;
            writeln!(
                f,
                "       allocated={} freed={} high_water_mark={}",
                c.allocated, c.freed, c.high_water_mark
            )?;
            writeln!(
                f,
                "       reallocs={} grows={} shrinks={} overflows={}",
                c.reallocate_requests,
                c.reallocate_grows_needed,
                c.reallocate_shrinks_needed,
                c.overflows
            )?;
        }
        Ok(())
    }
}

/// One line of the compact report
#[derive(Debug, Clone, Serialize)]
pub struct CompactLine {
    pub index: usize,
    pub slot_size: usize,
    pub used: u64,
    pub total: usize,
    pub percent_full: f64,
    pub overflows: u64,
}

/// Used/total per class
#[derive(Debug, Clone, Serialize)]
pub struct CompactReport {
    pub classes: Vec<CompactLine>,
}

impl fmt::Display for CompactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.classes {
            write!(
                f,
                "{:>7} B: {:>6}/{:<6} {:5.1}%",
                line.slot_size, line.used, line.total, line.percent_full
            )?;
            if line.overflows > 0 {
                write!(f, "  overflows={}", line.overflows)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
