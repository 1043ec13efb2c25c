//! Best-hypothesis bookkeeping for one seed
//!
//! Hypotheses are ranked by the number of attached clusters, then by the
//! penalized normalized chi2. Only the best completed hypothesis is kept.

use std::cmp::Ordering;

use crate::track::TrackState;

/// Penalties used when ranking hypotheses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranking {
    /// chi2 added per skipped layer
    pub skip_penalty: f64,
    /// chi2 added per dead-zone crossing
    pub dead_zone_penalty: f64,
}

impl Ranking {
    pub fn new(skip_penalty: f64, dead_zone_penalty: f64) -> Self {
        Self {
            skip_penalty,
            dead_zone_penalty,
        }
    }

    /// chi2 plus skip and dead-zone penalties
    pub fn penalized_chi2(&self, state: &TrackState) -> f64 {
        state.chi2()
            + self.skip_penalty * state.n_skips() as f64
            + self.dead_zone_penalty * state.n_dead_zones() as f64
    }

    pub fn normalized_chi2(&self, state: &TrackState) -> f64 {
        state.normalized_chi2(self.skip_penalty, self.dead_zone_penalty)
    }

    /// Order two hypotheses; `Greater` means `a` is better
    pub fn compare(&self, a: &TrackState, b: &TrackState) -> Ordering {
        a.n_clusters().cmp(&b.n_clusters()).then_with(|| {
            // Lower normalized chi2 is better
            self.normalized_chi2(b)
                .total_cmp(&self.normalized_chi2(a))
        })
    }

    /// Best of a set of hypotheses
    ///
    /// On equal rank the earliest wins.
    pub fn select_best<'a>(
        &self,
        hypotheses: impl IntoIterator<Item = &'a TrackState>,
    ) -> Option<&'a TrackState> {
        hypotheses.into_iter().fold(None, |best, h| match best {
            Some(b) if self.compare(h, b) != Ordering::Greater => Some(b),
            _ => Some(h),
        })
    }
}

/// Best completed hypothesis of the current seed
#[derive(Debug, Clone)]
pub struct HypothesisManager {
    ranking: Ranking,
    best: Option<TrackState>,
    offered: usize,
}

impl HypothesisManager {
    pub fn new(ranking: Ranking) -> Self {
        Self {
            ranking,
            best: None,
            offered: 0,
        }
    }

    #[inline]
    pub fn best(&self) -> Option<&TrackState> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<TrackState> {
        self.best
    }

    /// Completed hypotheses offered so far
    #[inline]
    pub fn offered(&self) -> usize {
        self.offered
    }

    /// Offer a completed hypothesis
    ///
    /// Replaces the best when the new one has strictly more clusters, or as
    /// many with a lower normalized chi2. Returns whether it was kept.
    pub fn offer(&mut self, state: TrackState) -> bool {
        self.offered += 1;
        let better = self
            .best
            .as_ref()
            .map_or(true, |best| self.ranking.compare(&state, best) == Ordering::Greater);
        if better {
            self.best = Some(state);
        }
        better
    }

    /// Whether a partial hypothesis with `remaining` layers still to cross can
    /// end up better than the current best
    ///
    /// chi2, skips and dead zones only grow along a branch, so the penalized
    /// chi2 so far divided by the best cluster count bounds the final
    /// normalized chi2 from below.
    pub fn can_improve(&self, state: &TrackState, remaining: usize) -> bool {
        let Some(best) = &self.best else {
            return true;
        };
        let reachable = state.n_clusters() + remaining;
        match reachable.cmp(&best.n_clusters()) {
            Ordering::Less => false,
            Ordering::Greater => true,
            Ordering::Equal => {
                let bound = self.ranking.penalized_chi2(state) / reachable.max(1) as f64;
                bound < self.ranking.normalized_chi2(best)
            }
        }
    }
}
