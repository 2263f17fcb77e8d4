//! Single-vehicle sequencing with time windows.
//!
//! Small working sets are solved exactly with depth-first branch-and-bound.
//! Larger ones get a cheapest-insertion construction followed by 2-opt and
//! relocate moves. Both strategies rank orders by the same key: total travel
//! cost, then total deviation from scheduled times, then lexicographic index
//! order.

use std::collections::BTreeSet;

use tracing::debug;

use crate::budget::{Exhausted, SolveBudget};
use crate::error::SolveFailure;
use crate::matrix::DistanceMatrix;
use crate::time_window::TimeWindow;

/// Nodes expanded between budget checks.
const BUDGET_CHECK_INTERVAL: u64 = 256;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Largest free working set solved by exhaustive search.
    pub exact_search_limit: usize,
    /// Maximum iterations for local search improvement.
    pub local_search_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            exact_search_limit: 9,
            local_search_iterations: 100,
        }
    }
}

/// Inputs for one solve. Working-set index `i` is matrix index `i + 1`;
/// matrix index 0 is the depot.
#[derive(Debug, Clone, Copy)]
pub struct SequencingProblem<'a> {
    pub matrix: &'a DistanceMatrix,
    pub windows: &'a [TimeWindow],
    /// Working-set indices removed from the solve entirely.
    pub excluded: &'a BTreeSet<usize>,
    /// Working-set indices that must lead the order, as given. Their windows
    /// are already committed and are not checked.
    pub fixed_prefix: &'a [usize],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Visitation order as working-set indices.
    pub order: Vec<usize>,
    /// Total travel cost in matrix units.
    pub total_cost: i64,
    /// Sum of |service start - scheduled time| in seconds.
    pub deviation: i64,
}

impl Solution {
    fn trivial(order: Vec<usize>) -> Self {
        Self {
            order,
            total_cost: 0,
            deviation: 0,
        }
    }
}

/// Ordering key: lower is better.
type Key = (i64, i64);

/// Vehicle state after visiting a partial order.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    position: usize,
    time: i64,
    cost: i64,
    deviation: i64,
}

impl Cursor {
    const DEPOT: Cursor = Cursor {
        position: 0,
        time: 0,
        cost: 0,
        deviation: 0,
    };

    fn key(&self) -> Key {
        (self.cost, self.deviation)
    }

    /// Travel to `stop` and wait for its window. `None` if the window closed.
    fn advance(&self, stop: usize, problem: &SequencingProblem<'_>, enforce: bool) -> Option<Cursor> {
        let target = stop + 1;
        let travel = problem.matrix.cost(self.position, target);
        let arrival = self.time + travel;
        let window = &problem.windows[stop];

        if enforce && !window.admits_arrival(arrival) {
            return None;
        }

        let start = arrival.max(window.start);
        Some(Cursor {
            position: target,
            time: start,
            cost: self.cost + travel,
            deviation: self.deviation + (start - window.target).abs(),
        })
    }

    fn walk(self, order: &[usize], problem: &SequencingProblem<'_>) -> Option<Cursor> {
        order
            .iter()
            .try_fold(self, |cursor, &stop| cursor.advance(stop, problem, true))
    }
}

/// Produce a feasible visitation order of the non-excluded working set.
///
/// Sets of zero or one feasible delivery return immediately. Cancellation
/// always yields [`SolveFailure::Timeout`]; reaching the deadline returns the
/// best complete order found so far, or `Timeout` if there is none.
pub fn solve(
    problem: &SequencingProblem<'_>,
    options: &SolveOptions,
    budget: &SolveBudget,
) -> Result<Solution, SolveFailure> {
    let n = problem.windows.len();
    debug_assert_eq!(problem.matrix.size(), n + 1, "matrix must include the depot");

    let feasible: Vec<usize> = (0..n).filter(|i| !problem.excluded.contains(i)).collect();
    if feasible.len() <= 1 {
        return Ok(Solution::trivial(feasible));
    }

    let mut prefix: Vec<usize> = Vec::with_capacity(problem.fixed_prefix.len());
    for &stop in problem.fixed_prefix {
        if stop < n && !problem.excluded.contains(&stop) && !prefix.contains(&stop) {
            prefix.push(stop);
        }
    }
    let free: Vec<usize> = feasible
        .iter()
        .copied()
        .filter(|stop| !prefix.contains(stop))
        .collect();

    if budget.check().is_err() {
        return Err(SolveFailure::Timeout);
    }

    let start = prefix.iter().fold(Cursor::DEPOT, |cursor, &stop| {
        cursor
            .advance(stop, problem, false)
            .unwrap_or(cursor)
    });

    debug!(
        stops = feasible.len(),
        pinned = prefix.len(),
        exact = free.len() <= options.exact_search_limit,
        "sequencing working set"
    );

    let (tail, end) = if free.len() <= options.exact_search_limit {
        branch_and_bound(problem, &free, start, budget)?
    } else {
        improve_heuristically(problem, &free, start, options, budget)?
    };

    let mut order = prefix;
    order.extend(tail);
    Ok(Solution {
        order,
        total_cost: end.cost,
        deviation: end.deviation,
    })
}

/// Total travel cost of visiting `order` from the depot, ignoring windows.
pub fn order_cost(matrix: &DistanceMatrix, order: &[usize]) -> i64 {
    let mut position = 0;
    let mut cost = 0;
    for &stop in order {
        cost += matrix.cost(position, stop + 1);
        position = stop + 1;
    }
    cost
}

// ============================================================================
// Exact search
// ============================================================================

struct Search<'p, 'a> {
    problem: &'p SequencingProblem<'a>,
    budget: &'p SolveBudget,
    stops: &'p [usize],
    visited: Vec<bool>,
    path: Vec<usize>,
    nodes: u64,
    best: Option<(Vec<usize>, Cursor)>,
    stopped: Option<Exhausted>,
}

impl Search<'_, '_> {
    fn dominated(&self, cursor: &Cursor) -> bool {
        self.best
            .as_ref()
            .is_some_and(|(_, best)| cursor.key() > best.key())
    }

    fn explore(&mut self, cursor: Cursor) {
        self.nodes += 1;
        if self.nodes % BUDGET_CHECK_INTERVAL == 1 {
            if let Err(reason) = self.budget.check() {
                self.stopped = Some(reason);
            }
        }
        if self.stopped.is_some() || self.dominated(&cursor) {
            return;
        }

        if self.path.len() == self.stops.len() {
            // Equal keys keep the earlier, lexicographically smaller order.
            let improves = self
                .best
                .as_ref()
                .is_none_or(|(_, best)| cursor.key() < best.key());
            if improves {
                self.best = Some((self.path.clone(), cursor));
            }
            return;
        }

        // A stop whose window already closed cannot be reached from here.
        let stranded = self.stops.iter().enumerate().any(|(slot, &stop)| {
            !self.visited[slot] && !self.problem.windows[stop].admits_arrival(cursor.time)
        });
        if stranded {
            return;
        }

        for slot in 0..self.stops.len() {
            if self.visited[slot] {
                continue;
            }
            let stop = self.stops[slot];
            let Some(next) = cursor.advance(stop, self.problem, true) else {
                continue;
            };

            self.visited[slot] = true;
            self.path.push(stop);
            self.explore(next);
            self.path.pop();
            self.visited[slot] = false;

            if self.stopped.is_some() {
                return;
            }
        }
    }
}

fn branch_and_bound(
    problem: &SequencingProblem<'_>,
    free: &[usize],
    start: Cursor,
    budget: &SolveBudget,
) -> Result<(Vec<usize>, Cursor), SolveFailure> {
    let mut search = Search {
        problem,
        budget,
        stops: free,
        visited: vec![false; free.len()],
        path: Vec::with_capacity(free.len()),
        nodes: 0,
        best: None,
        stopped: None,
    };
    search.explore(start);

    debug!(nodes = search.nodes, found = search.best.is_some(), "exact search finished");

    match (search.stopped, search.best) {
        (Some(Exhausted::Cancelled), _) => Err(SolveFailure::Timeout),
        (Some(Exhausted::Deadline), None) => Err(SolveFailure::Timeout),
        (_, Some(best)) => Ok(best),
        (None, None) => Err(SolveFailure::Infeasible),
    }
}

// ============================================================================
// Construction + local search
// ============================================================================

fn budget_failure(reason: Exhausted) -> SolveFailure {
    match reason {
        Exhausted::Deadline | Exhausted::Cancelled => SolveFailure::Timeout,
    }
}

/// Insert each stop, earliest deadline first, at its cheapest feasible position.
fn cheapest_insertion(
    problem: &SequencingProblem<'_>,
    by_deadline: &[usize],
    start: Cursor,
    budget: &SolveBudget,
) -> Result<Option<(Vec<usize>, Cursor)>, Exhausted> {
    let mut route: Vec<usize> = Vec::with_capacity(by_deadline.len());
    let mut end = start;

    for &stop in by_deadline {
        budget.check()?;

        let mut best: Option<(usize, Cursor)> = None;
        for position in 0..=route.len() {
            let mut candidate = route.clone();
            candidate.insert(position, stop);

            if let Some(cursor) = start.walk(&candidate, problem) {
                if best.is_none_or(|(_, current)| cursor.key() < current.key()) {
                    best = Some((position, cursor));
                }
            }
        }

        match best {
            Some((position, cursor)) => {
                route.insert(position, stop);
                end = cursor;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((route, end)))
}

fn improve_heuristically(
    problem: &SequencingProblem<'_>,
    free: &[usize],
    start: Cursor,
    options: &SolveOptions,
    budget: &SolveBudget,
) -> Result<(Vec<usize>, Cursor), SolveFailure> {
    let mut by_deadline = free.to_vec();
    by_deadline.sort_by_key(|&stop| {
        let window = &problem.windows[stop];
        (window.end, window.start, stop)
    });

    let constructed = cheapest_insertion(problem, &by_deadline, start, budget)
        .map_err(budget_failure)?
        .or_else(|| {
            start
                .walk(&by_deadline, problem)
                .map(|end| (by_deadline.clone(), end))
        });

    let Some((mut route, mut end)) = constructed else {
        return Err(SolveFailure::Infeasible);
    };

    match local_search(problem, &mut route, &mut end, start, options, budget) {
        Ok(()) | Err(Exhausted::Deadline) => Ok((route, end)),
        Err(Exhausted::Cancelled) => Err(SolveFailure::Timeout),
    }
}

/// 2-opt: Reverse a segment to reduce the ordering key.
/// Returns true if an improvement was made.
fn two_opt_improve(
    problem: &SequencingProblem<'_>,
    route: &mut Vec<usize>,
    end: &mut Cursor,
    start: Cursor,
    budget: &SolveBudget,
) -> Result<bool, Exhausted> {
    let n = route.len();
    if n < 2 {
        return Ok(false);
    }

    for i in 0..n - 1 {
        budget.check()?;
        for j in i + 1..n {
            let mut candidate = route.clone();
            candidate[i..=j].reverse();

            if let Some(cursor) = start.walk(&candidate, problem) {
                if cursor.key() < end.key() {
                    *route = candidate;
                    *end = cursor;
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

/// Relocate: Move a single stop to another position.
/// Returns true if an improvement was made.
fn relocate_improve(
    problem: &SequencingProblem<'_>,
    route: &mut Vec<usize>,
    end: &mut Cursor,
    start: Cursor,
    budget: &SolveBudget,
) -> Result<bool, Exhausted> {
    let n = route.len();

    for from in 0..n {
        budget.check()?;
        for to in 0..n {
            if to == from {
                continue;
            }

            let mut candidate = route.clone();
            let stop = candidate.remove(from);
            candidate.insert(to, stop);

            if let Some(cursor) = start.walk(&candidate, problem) {
                if cursor.key() < end.key() {
                    *route = candidate;
                    *end = cursor;
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

/// Run local search until no more improvements or max iterations reached.
fn local_search(
    problem: &SequencingProblem<'_>,
    route: &mut Vec<usize>,
    end: &mut Cursor,
    start: Cursor,
    options: &SolveOptions,
    budget: &SolveBudget,
) -> Result<(), Exhausted> {
    for _ in 0..options.local_search_iterations {
        let mut improved = two_opt_improve(problem, route, end, start, budget)?;
        improved |= relocate_improve(problem, route, end, start, budget)?;

        if !improved {
            break;
        }
    }
    Ok(())
}
