//! Section partitioning.
//!
//! Sections are derived, never stored: contiguous index ranges over a
//! batch's units in `original_index` order. A batch of fewer than ten units
//! is one section. Anything larger splits into ten sections of
//! `total / 10` units each, and the last section is extended to absorb the
//! remainder of the integer division so no unit is unreachable.

use serde::Serialize;

/// Number of sections a batch of ten or more units is split into.
pub const SECTIONS_PER_BATCH: usize = 10;

/// Inclusive index range of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionRange {
    /// 1-indexed.
    pub number: usize,
    pub start: usize,
    pub end: usize,
}

impl SectionRange {
    /// Number of units covered. Never zero.
    pub fn unit_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    /// Offset of a batch index within this section.
    pub fn offset_of(&self, index: usize) -> Option<usize> {
        self.contains(index).then(|| index - self.start)
    }
}

/// Nominal section size: the whole batch below ten units, `total / 10` otherwise.
pub fn section_size(total_unit_count: usize) -> usize {
    if total_unit_count < SECTIONS_PER_BATCH {
        total_unit_count
    } else {
        total_unit_count / SECTIONS_PER_BATCH
    }
}

/// How many sections a batch has. Empty batches have none.
pub fn section_count(total_unit_count: usize) -> usize {
    match total_unit_count {
        0 => 0,
        n if n < SECTIONS_PER_BATCH => 1,
        _ => SECTIONS_PER_BATCH,
    }
}

/// Range of section `number` (1-indexed), or `None` if no such section exists.
pub fn section_at(total_unit_count: usize, number: usize) -> Option<SectionRange> {
    let count = section_count(total_unit_count);
    if number == 0 || number > count {
        return None;
    }

    let size = section_size(total_unit_count);
    let start = (number - 1) * size;
    let end = if number == count {
        total_unit_count - 1
    } else {
        number * size - 1
    };

    Some(SectionRange { number, start, end })
}

/// Every section of a batch, in order.
pub fn sections_for(total_unit_count: usize) -> Vec<SectionRange> {
    (1..=section_count(total_unit_count))
        .filter_map(|n| section_at(total_unit_count, n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(total: usize) -> Vec<(usize, usize)> {
        sections_for(total)
            .into_iter()
            .map(|s| (s.start, s.end))
            .collect()
    }

    #[test]
    fn ninety_five_units_extend_the_last_section() {
        assert_eq!(section_size(95), 9);
        let sections = bounds(95);
        assert_eq!(sections.len(), 10);
        assert_eq!(sections[0], (0, 8));
        assert_eq!(sections[1], (9, 17));
        assert_eq!(sections[8], (72, 80));
        assert_eq!(sections[9], (81, 94));
    }

    #[test]
    fn twelve_units_leave_nothing_unreachable() {
        assert_eq!(section_size(12), 1);
        let sections = bounds(12);
        assert_eq!(sections.len(), 10);
        for (i, section) in sections.iter().take(9).enumerate() {
            assert_eq!(*section, (i, i));
        }
        assert_eq!(sections[9], (9, 11));
    }

    #[test]
    fn small_batches_are_a_single_section() {
        assert_eq!(bounds(3), vec![(0, 2)]);
        assert_eq!(bounds(1), vec![(0, 0)]);
        assert_eq!(bounds(9), vec![(0, 8)]);
        assert!(bounds(0).is_empty());
        assert_eq!(section_count(0), 0);
    }

    #[test]
    fn exact_multiple_has_even_sections() {
        let sections = bounds(100);
        assert_eq!(sections.len(), 10);
        assert!(sections.iter().all(|(s, e)| e - s + 1 == 10));
        assert_eq!(bounds(10), (0..10).map(|i| (i, i)).collect::<Vec<_>>());
    }

    #[test]
    fn sections_partition_every_index_exactly_once() {
        for total in 0..300 {
            let mut next = 0;
            for section in sections_for(total) {
                assert_eq!(section.start, next, "gap or overlap at total={total}");
                assert!(section.unit_count() >= 1);
                next = section.end + 1;
            }
            assert_eq!(next, total, "total={total} not fully covered");
        }
    }

    #[test]
    fn section_at_rejects_out_of_range_numbers() {
        assert_eq!(section_at(95, 0), None);
        assert_eq!(section_at(95, 11), None);
        assert_eq!(section_at(3, 2), None);
        assert_eq!(section_at(0, 1), None);
    }

    #[test]
    fn offsets_are_relative_to_section_start() {
        let section = section_at(95, 10).unwrap();
        assert_eq!(section.offset_of(81), Some(0));
        assert_eq!(section.offset_of(94), Some(13));
        assert_eq!(section.offset_of(80), None);
        assert_eq!(section.unit_count(), 14);
    }
}
