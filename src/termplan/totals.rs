use serde::Serialize;

use super::TermRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TermTotals {
    pub rows: usize,
    pub credits: u64,
    pub theory_course_count: u64,
    pub practical_other_count: u64,
    pub duration_weeks: u64,
}

/// Sums the numeric fields of every row; absent values count as zero.
/// Per-row values are `u32`, so the `u64` sums cannot overflow.
pub fn compute_totals<'a>(rows: impl IntoIterator<Item = &'a TermRow>) -> TermTotals {
    rows.into_iter().fold(TermTotals::default(), |mut acc, row| {
        acc.rows += 1;
        acc.credits += u64::from(row.credits.unwrap_or(0));
        acc.theory_course_count += u64::from(row.theory_course_count.unwrap_or(0));
        acc.practical_other_count += u64::from(row.practical_other_count.unwrap_or(0));
        acc.duration_weeks += u64::from(row.duration_weeks.unwrap_or(0));
        acc
    })
}
