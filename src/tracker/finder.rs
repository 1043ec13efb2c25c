//! Inward track following for one seed
//!
//! The search is a depth-first walk from the outermost reachable layer to the
//! innermost one. Each visited layer keeps a frame with the prediction on the
//! layer and its candidates sorted by chi2; branches are taken best first and
//! the search backtracks to the next candidate when a deeper layer fails. The
//! skip (or dead-zone) continuation is the last branch of every frame while
//! the skip budget allows it, so an outlier that passes the gate cannot hide
//! the track that ignores it.
//!
//! Depth is bounded by the number of layers, branching by
//! `max_candidates_per_layer` and the total number of expanded nodes by
//! `max_hypotheses_per_seed`.

use super::association::{collect_candidates, Candidates};
use super::config::{PassConfig, TrackerConfig};
use super::hypothesis::{HypothesisManager, Ranking};
use super::reporter::TrackingReporter;
use super::stats::EventStats;
use crate::detector::{DetectorLayer, Detector};
use crate::error::{Result, TrackingError};
use crate::track::{Material, Propagator, TrackState, Vertex};

/// Pre-update snapshot of one layer with the branches still to try
#[derive(Debug)]
struct LayerFrame {
    layer: usize,
    candidates: Candidates,
    next: usize,
    /// Skip or dead-zone continuation, tried after every candidate
    fallback: Option<TrackState>,
}

/// Branch taken out of a frame
enum Branch {
    Candidate(usize),
    Fallback(TrackState),
}

impl LayerFrame {
    fn next_branch(&mut self) -> Option<Branch> {
        if self.next < self.candidates.len() {
            self.next += 1;
            return Some(Branch::Candidate(self.next - 1));
        }
        self.fallback.take().map(Branch::Fallback)
    }
}

/// Result of searching one seed
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best completed hypothesis, if any reached the innermost layer
    pub best: Option<TrackState>,
    /// Nodes expanded
    pub nodes: usize,
    /// Search stopped by the node budget
    pub budget_exhausted: bool,
}

/// Follows seeds inward through the layers of a detector
pub struct TrackFinder<'a> {
    detector: &'a mut Detector,
    config: &'a TrackerConfig,
    vertex: &'a Vertex,
    propagator: Propagator,
    ranking: Ranking,
}

impl<'a> TrackFinder<'a> {
    pub fn new(detector: &'a mut Detector, config: &'a TrackerConfig, vertex: &'a Vertex) -> Self {
        Self {
            detector,
            config,
            vertex,
            propagator: config.propagator(),
            ranking: Ranking::new(config.skip_penalty, config.dead_zone_penalty),
        }
    }

    /// Outermost layer at or inside the seed's radius
    pub fn start_layer(&self, seed: &TrackState) -> Option<usize> {
        let r = seed.radius() + 1e-6;
        self.detector
            .layers()
            .iter()
            .rposition(|layer| layer.radius() <= r)
    }

    /// Search the best hypothesis for a seed in one pass
    ///
    /// Claimed clusters are never considered. The seed itself is not
    /// modified.
    pub fn find<R: TrackingReporter>(
        &mut self,
        seed: &TrackState,
        pass: &PassConfig,
        stats: &mut EventStats,
        reporter: &mut R,
    ) -> SearchResult {
        let mut manager = HypothesisManager::new(self.ranking);
        let mut result = SearchResult {
            best: None,
            nodes: 0,
            budget_exhausted: false,
        };
        let Some(top) = self.start_layer(seed) else {
            return result;
        };

        let mut stack: Vec<LayerFrame> = Vec::with_capacity(top + 1);
        if let Some(frame) = self.enter_layer(seed.clone(), top, stats, reporter) {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let Some(branch) = frame.next_branch() else {
                stack.pop();
                continue;
            };
            if result.nodes >= self.config.max_hypotheses_per_seed {
                result.budget_exhausted = true;
                break;
            }
            result.nodes += 1;
            let layer = frame.layer;

            let mut state = match branch {
                Branch::Candidate(i) => {
                    let candidate = &frame.candidates[i];
                    let Some(cluster) = self.detector.cluster(candidate.cluster) else {
                        continue;
                    };
                    let mut state = candidate.state.clone();
                    match state.update(candidate.cluster, cluster, self.config.layer(layer).chi2_max)
                    {
                        Ok(outcome) if outcome.is_accepted() => state,
                        Ok(_) => continue,
                        Err(_) => {
                            stats.degenerate_candidates += 1;
                            continue;
                        }
                    }
                }
                Branch::Fallback(state) => state,
            };

            if let Err(err) = self.cross_layer_material(&mut state, layer) {
                log::trace!("layer {}: material correction failed: {}", layer, err);
                stats.geometry_misses += 1;
                continue;
            }
            if !manager.can_improve(&state, layer) {
                continue;
            }

            if layer == 0 {
                if let Some(done) = self.finish(state, pass, stats) {
                    let kept = manager.offer(done);
                    if let Some(best) = manager.best() {
                        reporter.on_hypothesis(best, kept);
                    }
                }
            } else if let Some(next) = self.enter_layer(state, layer - 1, stats, reporter) {
                stack.push(next);
            }
        }

        result.best = manager.into_best();
        result
    }

    /// Propagate onto a layer and build its frame
    ///
    /// Returns `None` when the branch dies here: geometric miss, or no
    /// candidate and no skip budget left.
    fn enter_layer<R: TrackingReporter>(
        &mut self,
        mut state: TrackState,
        layer: usize,
        stats: &mut EventStats,
        reporter: &mut R,
    ) -> Option<LayerFrame> {
        let dead_zone = match self.predict_on_layer(&mut state, layer) {
            Ok(dead_zone) => dead_zone,
            Err(err) => {
                log::trace!("layer {}: {}", layer, err);
                stats.geometry_misses += 1;
                return None;
            }
        };

        let candidates = collect_candidates(
            self.detector,
            layer,
            &state,
            self.config.layer(layer),
            self.config.max_candidates_per_layer,
            stats,
        );
        reporter.on_layer(layer, &state, candidates.len());

        let fallback = if dead_zone {
            state.record_dead_zone();
            Some(state)
        } else if state.n_skips() < self.config.max_skips
            && state.consecutive_skips() < self.config.max_consecutive_skips
        {
            state.record_skip();
            Some(state)
        } else {
            None
        };

        if candidates.is_empty() && fallback.is_none() {
            return None;
        }
        Some(LayerFrame {
            layer,
            candidates,
            next: 0,
            fallback,
        })
    }

    /// Move the state onto the module plane it crosses on `layer`
    ///
    /// Passive shells on the way are crossed with their material. Returns
    /// whether the predicted point is insensitive (outside the acceptance,
    /// the module width or inside an inter-detector gap).
    fn predict_on_layer(&self, state: &mut TrackState, layer: usize) -> Result<bool> {
        let target: &DetectorLayer = self.detector.layer(layer);
        let shells = self.detector.passive_between(state.radius(), target.radius());
        self.propagator.cross_shells(state, &shells)?;
        state.transport_to_radius(target.radius())?;

        let Some(id) = target.find_detector_index(state.phi(), state.z()) else {
            return Ok(true);
        };
        let module = target
            .module(id)
            .ok_or(TrackingError::GeometryMiss { radius: target.radius() })?;
        state.rotate(module.alpha)?;
        state.transport_to(module.x)?;
        Ok(target.is_dead_zone(module, state.y(), state.z()))
    }

    /// Layer material after the update, against the direction of flight
    fn cross_layer_material(&self, state: &mut TrackState, layer: usize) -> Result<()> {
        let target = self.detector.layer(layer);
        let x0 = target.thickness(state.y(), state.z());
        let material = Material::new(x0, DetectorLayer::x_rho(x0));
        self.propagator.correct_for_material(state, material, -1.0)
    }

    /// Close a hypothesis on the innermost layer
    ///
    /// Constrained passes apply the vertex; a rejected vertex discards the
    /// hypothesis.
    fn finish(
        &self,
        mut state: TrackState,
        pass: &PassConfig,
        stats: &mut EventStats,
    ) -> Option<TrackState> {
        if !pass.constrained {
            return Some(state);
        }
        let shells = self.detector.passive_between(state.radius(), 0.0);
        match self.propagator.constrain_to_vertex(
            &mut state,
            self.vertex,
            pass.vertex_weight,
            pass.vertex_chi2_max,
            &shells,
        ) {
            Ok(outcome) if outcome.is_accepted() => Some(state),
            Ok(outcome) => {
                log::trace!("vertex rejected with chi2 {:.2}", outcome.chi2());
                stats.vertex_rejections += 1;
                None
            }
            Err(err) => {
                log::trace!("vertex unreachable: {}", err);
                stats.geometry_misses += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::simulation::{EventGenerator, TrackSpec};
    use crate::detector::{ClusterRef, GeometryDescription};
    use crate::tracker::reporter::{DebugReporter, NoOpReporter};

    fn setup() -> (Detector, TrackerConfig) {
        let detector = Detector::new(&GeometryDescription::six_layer_barrel()).unwrap();
        let config = TrackerConfig::builder().energy_loss(false).build();
        (detector, config)
    }

    #[test]
    fn test_start_layer() {
        let (mut detector, config) = setup();
        let generator = EventGenerator::new(&detector);
        let seed = generator.seed_at(&TrackSpec::new(1.0, 0.3, 0.1), 50.0).unwrap();
        let vertex = config.beam_spot();
        let finder = TrackFinder::new(&mut detector, &config, &vertex);
        assert_eq!(finder.start_layer(&seed), Some(5));

        let inner = generator.seed_at(&TrackSpec::new(1.0, 0.3, 0.1), 2.0).unwrap();
        assert_eq!(finder.start_layer(&inner), None);
    }

    #[test]
    fn test_follows_clean_track() {
        let (mut detector, config) = setup();
        let generator = EventGenerator::new(&detector);
        let spec = TrackSpec::new(1.0, 0.3, 0.1).with_label(1);
        let truth = generator.clusters(&spec).unwrap();
        let seed = generator.seed_at(&spec, 50.0).unwrap();
        detector.load_event(truth).unwrap();

        let vertex = config.beam_spot();
        let mut stats = EventStats::new(1);
        let mut reporter = DebugReporter::new();
        let mut finder = TrackFinder::new(&mut detector, &config, &vertex);
        let result = finder.find(&seed, &PassConfig::unconstrained(4), &mut stats, &mut reporter);

        let best = result.best.unwrap();
        assert_eq!(best.n_clusters(), 6);
        assert_eq!(best.n_skips(), 0);
        assert!(best.chi2() < 1e-6);
        assert!(!result.budget_exhausted);
        let layers: Vec<usize> = reporter.layer_visits().iter().map(|v| v.0).collect();
        assert_eq!(layers, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_empty_event_finds_nothing() {
        let (mut detector, config) = setup();
        let generator = EventGenerator::new(&detector);
        let seed = generator.seed_at(&TrackSpec::new(1.0, 0.3, 0.1), 50.0).unwrap();
        let vertex = config.beam_spot();
        let mut stats = EventStats::new(1);
        let mut finder = TrackFinder::new(&mut detector, &config, &vertex);
        let result = finder.find(
            &seed,
            &PassConfig::unconstrained(4),
            &mut stats,
            &mut NoOpReporter,
        );
        assert!(result.best.is_none());
    }

    #[test]
    fn test_backtracks_from_dead_end_candidate() {
        let (mut detector, config) = setup();
        // Loose z on the seed so both clusters on the outer layer pass the gate
        let generator = EventGenerator::new(&detector)
            .with_seed_covariance([1e-2, 1.0, 1e-4, 1e-6, 1e-7]);
        let truth = TrackSpec::new(1.0, 0.3, 0.1);
        let shifted = TrackSpec::new(1.0, 0.3, 0.1).with_z0(0.5);

        let mut clusters = generator.clusters(&truth).unwrap();
        let truth_z = clusters.iter().find(|c| c.layer == 5).unwrap().z;
        // Lies exactly on the seed line, which has nothing further in
        clusters.extend(
            generator
                .clusters(&shifted)
                .unwrap()
                .into_iter()
                .filter(|c| c.layer == 5),
        );
        detector.load_event(clusters).unwrap();
        let seed = generator.seed_at(&shifted, 50.0).unwrap();

        let vertex = config.beam_spot();
        let mut stats = EventStats::new(1);
        let mut reporter = DebugReporter::new();
        let mut finder = TrackFinder::new(&mut detector, &config, &vertex);
        let result = finder.find(&seed, &PassConfig::unconstrained(4), &mut stats, &mut reporter);

        assert_eq!(reporter.layer_visits()[0], (5, 2));
        let best = result.best.unwrap();
        assert_eq!(best.n_clusters(), 6);
        assert_eq!(best.n_skips(), 0);
        let outer = ClusterRef::new(5, best.cluster_at(5).unwrap());
        assert!((detector.cluster(outer).unwrap().z - truth_z).abs() < 1e-9);
    }

    #[test]
    fn test_node_budget() {
        let (mut detector, _) = setup();
        let config = TrackerConfig::builder()
            .energy_loss(false)
            .max_hypotheses_per_seed(3)
            .build();
        let generator = EventGenerator::new(&detector);
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        detector.load_event(generator.clusters(&spec).unwrap()).unwrap();
        let seed = generator.seed_at(&spec, 50.0).unwrap();

        let vertex = config.beam_spot();
        let mut stats = EventStats::new(1);
        let mut finder = TrackFinder::new(&mut detector, &config, &vertex);
        let result = finder.find(
            &seed,
            &PassConfig::unconstrained(4),
            &mut stats,
            &mut NoOpReporter,
        );
        assert!(result.budget_exhausted);
        assert_eq!(result.nodes, 3);
        assert!(result.best.is_none());
    }

    #[test]
    fn test_constrained_pass_reaches_vertex() {
        let (mut detector, config) = setup();
        let generator = EventGenerator::new(&detector);
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        detector.load_event(generator.clusters(&spec).unwrap()).unwrap();
        let seed = generator.seed_at(&spec, 50.0).unwrap();

        let vertex = config.beam_spot();
        let mut stats = EventStats::new(1);
        let mut finder = TrackFinder::new(&mut detector, &config, &vertex);
        let result = finder.find(
            &seed,
            &PassConfig::constrained(4),
            &mut stats,
            &mut NoOpReporter,
        );
        let best = result.best.unwrap();
        assert_eq!(best.n_clusters(), 6);
        assert!(best.radius() < 0.05);
    }
}
