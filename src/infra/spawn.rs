use crate::infra::Position;

/// Picks spawn positions that keep a minimum separation from each other.
///
/// Candidates are scanned in their given order and the first one that is at
/// least `min_distance` away from every earlier placement wins. When no
/// candidate qualifies the one farthest from its closest placement is used
/// instead, so a request never comes back short. Once every candidate is used
/// the working set is refilled and candidates are handed out again.
///
/// Placements are remembered across calls, which keeps consecutive requests
/// (one per actor group) apart from each other.
#[derive(Debug, Clone)]
pub struct SpawnPlanner {
    candidates: Vec<Position>,
    unused: Vec<Position>,
    placed: Vec<Position>,
    min_distance: f64,
}

impl SpawnPlanner {
    pub fn new(candidates: &[Position], min_distance: f64) -> Self {
        Self {
            candidates: candidates.to_vec(),
            unused: candidates.to_vec(),
            placed: Vec::new(),
            min_distance,
        }
    }

    /// Returns `count` positions, or none at all when there are no candidates.
    pub fn place(&mut self, count: usize) -> Vec<Position> {
        if self.candidates.is_empty() {
            return Vec::new();
        }

        let mut chosen = Vec::with_capacity(count);
        for _ in 0..count {
            if self.unused.is_empty() {
                tracing::debug!(
                    "Spawn candidates exhausted after {} placements, reusing candidates",
                    self.placed.len()
                );
                self.unused = self.candidates.clone();
            }

            let index = self
                .first_feasible()
                .unwrap_or_else(|| self.most_isolated());
            let position = self.unused.remove(index);
            self.placed.push(position);
            chosen.push(position);
        }
        chosen
    }

    /// Positions handed out so far, in placement order.
    pub fn placed(&self) -> &[Position] {
        &self.placed
    }

    fn first_feasible(&self) -> Option<usize> {
        self.unused
            .iter()
            .position(|candidate| self.clearance(candidate) >= self.min_distance)
    }

    // Earliest candidate wins ties.
    fn most_isolated(&self) -> usize {
        let mut best = 0;
        let mut best_clearance = f64::NEG_INFINITY;
        for (index, candidate) in self.unused.iter().enumerate() {
            let clearance = self.clearance(candidate);
            if clearance > best_clearance {
                best = index;
                best_clearance = clearance;
            }
        }
        best
    }

    fn clearance(&self, candidate: &Position) -> f64 {
        self.placed
            .iter()
            .map(|placed| placed.distance(candidate))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Selects `count` initial positions from `candidates`, see [`SpawnPlanner`].
pub fn get_initial_positions(
    candidates: &[Position],
    min_distance: f64,
    count: usize,
) -> Vec<Position> {
    SpawnPlanner::new(candidates, min_distance).place(count)
}
