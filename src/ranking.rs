// 🏆 Score & Ranking Engine
//
// Row order is fully derived: descending score, ungraded rows last, ties keep
// the order they had right before this recompute. There is no manual order.

use crate::board::Row;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// ROW SCORE
// ============================================================================

/// Average grade value over the row's graded cells; `None` if none are graded
pub fn compute_row_score(row: &Row) -> Option<f64> {
    let (sum, count) = row
        .cells
        .iter()
        .filter_map(|c| c.grade_value())
        .fold((0u32, 0u32), |(sum, count), v| (sum + v as u32, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}

/// Total order used for ranking: higher score first, `None` after every
/// score, then the original index.
pub fn compare_ranked(a: (Option<f64>, usize), b: (Option<f64>, usize)) -> Ordering {
    let by_score = match (a.0, b.0) {
        (Some(sa), Some(sb)) => sb.partial_cmp(&sa).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_score.then(a.1.cmp(&b.1))
}

// ============================================================================
// RANK OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A row that changed position during a re-rank (drives the slide animation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub from: usize,
    pub to: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankOutcome {
    /// `order[i]` = index (before this recompute) of the row now at position `i`
    pub order: Vec<usize>,
    pub movements: Vec<Movement>,
}

impl RankOutcome {
    pub fn moved(&self) -> bool {
        !self.movements.is_empty()
    }
}

/// Ranking permutation for a list of scores
pub fn rank_order(scores: &[Option<f64>]) -> Vec<usize> {
    let mut indexed: Vec<(Option<f64>, usize)> =
        scores.iter().copied().enumerate().map(|(i, s)| (s, i)).collect();
    indexed.sort_by(|a, b| compare_ranked(*a, *b));
    indexed.into_iter().map(|(_, i)| i).collect()
}

fn movements_for(order: &[usize]) -> Vec<Movement> {
    order
        .iter()
        .enumerate()
        .filter(|(to, from)| *to != **from)
        .map(|(to, &from)| Movement {
            from,
            to,
            direction: if to < from { Direction::Up } else { Direction::Down },
        })
        .collect()
}

/// Reorder rows in place using their current (cached) scores
pub fn rank_in_place(rows: &mut Vec<Row>) -> RankOutcome {
    let scores: Vec<Option<f64>> = rows.iter().map(Row::score).collect();
    let order = rank_order(&scores);
    let movements = movements_for(&order);

    if !movements.is_empty() {
        let mut slots: Vec<Option<Row>> = rows.drain(..).map(Some).collect();
        for &from in &order {
            if let Some(row) = slots[from].take() {
                rows.push(row);
            }
        }
    }

    RankOutcome { order, movements }
}

/// Ranked copy of `rows`, scores recomputed first
pub fn rank(rows: &[Row]) -> Vec<Row> {
    let mut ranked = rows.to_vec();
    for row in &mut ranked {
        row.recompute_score();
    }
    rank_in_place(&mut ranked);
    ranked
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Cell;

    fn row(title: &str, cells: &[Option<&str>]) -> Row {
        let cells = cells
            .iter()
            .map(|c| match c {
                Some(label) => Cell::with_item(*label),
                None => Cell::empty(),
            })
            .collect();
        Row::from_parts(title, None, cells)
    }

    fn titles(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_row_score_averages_graded_cells() {
        let r = row("r", &[Some("A"), Some("B"), None, Some("S")]);
        assert_eq!(compute_row_score(&r), Some(3.0));
    }

    #[test]
    fn test_row_score_ignores_non_grade_labels() {
        let r = row("r", &[Some("SS"), Some("Pikachu"), Some("C")]);
        assert_eq!(compute_row_score(&r), Some(3.0));
    }

    #[test]
    fn test_row_score_uses_real_division() {
        let r = row("r", &[Some("A"), Some("B")]);
        assert_eq!(compute_row_score(&r), Some(2.5));
    }

    #[test]
    fn test_row_without_grades_has_no_score() {
        assert_eq!(compute_row_score(&row("r", &[None, None])), None);
        assert_eq!(compute_row_score(&row("r", &[Some("hello")])), None);
        assert_eq!(compute_row_score(&row("r", &[])), None);
    }

    #[test]
    fn test_rank_order_stable_with_none_last() {
        let order = rank_order(&[Some(3.0), None, Some(3.0), Some(1.0)]);
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_rank_all_none_keeps_order() {
        let order = rank_order(&[None, None, None]);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_rank_rows() {
        let rows = vec![
            row("zero", &[Some("A")]),
            row("one", &[None]),
            row("two", &[Some("a")]),
            row("three", &[Some("C")]),
        ];

        let ranked = rank(&rows);

        assert_eq!(titles(&ranked), vec!["zero", "two", "three", "one"]);
    }

    #[test]
    fn test_rank_in_place_reports_movements() {
        let mut rows = vec![row("low", &[Some("D")]), row("high", &[Some("SS")])];

        let outcome = rank_in_place(&mut rows);

        assert_eq!(titles(&rows), vec!["high", "low"]);
        assert_eq!(outcome.order, vec![1, 0]);
        assert_eq!(
            outcome.movements,
            vec![
                Movement { from: 1, to: 0, direction: Direction::Up },
                Movement { from: 0, to: 1, direction: Direction::Down },
            ]
        );
    }

    #[test]
    fn test_rank_in_place_without_change_has_no_movements() {
        let mut rows = vec![row("a", &[Some("S")]), row("b", &[Some("B")]), row("c", &[None])];

        let outcome = rank_in_place(&mut rows);

        assert!(!outcome.moved());
        assert_eq!(titles(&rows), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tie_break_uses_index_before_recompute() {
        // Equal scores: whichever row is first *now* stays first
        let mut rows = vec![row("second-saved", &[Some("B")]), row("first-saved", &[Some("B")])];
        rank_in_place(&mut rows);
        assert_eq!(titles(&rows), vec!["second-saved", "first-saved"]);
    }
}
