//! Event-level reconstruction
//!
//! [`Tracker`] owns the detector for the whole run. Every event is loaded,
//! its seeds are ordered by quality and run through the configured passes.
//! An accepted track claims its clusters before the next seed is searched,
//! so the first-processed seed wins any contended cluster. Refits and output
//! materialization happen after all passes.

use super::config::{PassConfig, StandaloneMode, TrackerConfig};
use super::event::{EventInput, EventOutput, ReconstructedTrack, TrackEstimate, TrackFlags};
use super::finder::TrackFinder;
use super::quality::{cook_label, path_length_factor, truncated_mean};
use super::refit::{RefitResult, Refitter};
use super::reporter::{NoOpReporter, TrackingReporter};
use super::seeding::StandaloneSeeder;
use super::stats::EventStats;
use crate::detector::{ClusterRef, Detector, GeometryDescription};
use crate::error::{Result, TrackingError};
use crate::track::{TrackState, Vertex};

// ============================================================================
// Seed bookkeeping
// ============================================================================

/// Seed ready for searching
#[derive(Debug, Clone)]
struct SeedEntry {
    state: TrackState,
    quality: f64,
    standalone: bool,
}

/// Search winner waiting for refit and materialization
#[derive(Debug, Clone)]
struct AcceptedTrack {
    seed_index: usize,
    pass: usize,
    state: TrackState,
}

// ============================================================================
// Tracker
// ============================================================================

/// Reconstructs events on a fixed detector
#[derive(Debug, Clone)]
pub struct Tracker {
    detector: Detector,
    config: TrackerConfig,
}

impl Tracker {
    /// Create a tracker
    ///
    /// Fails when the configuration is invalid for the detector.
    pub fn new(detector: Detector, config: TrackerConfig) -> Result<Self> {
        config.validate_for(detector.num_layers())?;
        Ok(Self { detector, config })
    }

    /// Build the detector from a description and create a tracker
    pub fn from_description(description: &GeometryDescription, config: TrackerConfig) -> Result<Self> {
        Self::new(Detector::new(description)?, config)
    }

    #[inline]
    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Reconstruct one event
    pub fn reconstruct(&mut self, event: EventInput) -> Result<EventOutput> {
        self.reconstruct_with_reporter(event, &mut NoOpReporter)
    }

    /// Reconstruct one event, reporting every step
    ///
    /// Only invalid input is an error; local failures are counted in the
    /// returned statistics. The detector holds no clusters afterwards.
    pub fn reconstruct_with_reporter<R: TrackingReporter>(
        &mut self,
        event: EventInput,
        reporter: &mut R,
    ) -> Result<EventOutput> {
        self.detector.reset_event();
        let result = self.run_event(event, reporter);
        self.detector.reset_event();
        let output = result?;

        log::info!(
            "event: {} clusters, {} seeds, {} tracks {:?}, {} refit failures",
            output.stats.clusters,
            output.stats.num_seeds(),
            output.stats.num_tracks(),
            output.stats.tracks_per_pass,
            output.stats.refit_failures
        );
        reporter.on_event_complete(&output);
        Ok(output)
    }

    fn run_event<R: TrackingReporter>(
        &mut self,
        event: EventInput,
        reporter: &mut R,
    ) -> Result<EventOutput> {
        let num_layers = self.detector.num_layers();
        let mut stats = EventStats::new(self.config.passes.len());
        stats.clusters = self.detector.load_event(event.clusters)?;

        let vertex = match event.vertex {
            Some(vertex) => vertex,
            None => {
                log::warn!("event has no primary vertex, using the beam spot");
                self.config.beam_spot()
            }
        };

        let mut seeds = Vec::with_capacity(event.seeds.len());
        for seed in &event.seeds {
            seeds.push(SeedEntry {
                state: seed.to_state(num_layers)?,
                quality: seed.quality,
                standalone: false,
            });
        }
        stats.external_seeds = seeds.len();
        self.add_standalone_seeds(&mut seeds, &mut stats);
        reporter.on_event_start(stats.clusters, seeds.len());

        let accepted = self.search(&seeds, &vertex, &mut stats, reporter);
        let tracks = accepted
            .iter()
            .map(|track| self.materialize(track, &seeds[track.seed_index], &vertex, &mut stats))
            .collect();

        Ok(EventOutput { tracks, stats })
    }

    fn add_standalone_seeds(&mut self, seeds: &mut Vec<SeedEntry>, stats: &mut EventStats) {
        let run = match self.config.seeding.mode {
            StandaloneMode::Never => false,
            StandaloneMode::Always => true,
            StandaloneMode::WhenNoSeeds => seeds.is_empty(),
        };
        if !run {
            return;
        }

        let num_layers = self.detector.num_layers();
        let found = StandaloneSeeder::new(&mut self.detector, &self.config.seeding, self.config.b_field)
            .find_seeds();
        for seed in found {
            match seed.to_state(num_layers) {
                Ok(state) => {
                    seeds.push(SeedEntry {
                        state,
                        quality: seed.quality,
                        standalone: true,
                    });
                    stats.standalone_seeds += 1;
                }
                Err(err) => log::debug!("standalone seed dropped: {}", err),
            }
        }
    }

    /// Run every pass over the seeds, claiming clusters of accepted tracks
    fn search<R: TrackingReporter>(
        &mut self,
        seeds: &[SeedEntry],
        vertex: &Vertex,
        stats: &mut EventStats,
        reporter: &mut R,
    ) -> Vec<AcceptedTrack> {
        let mut order: Vec<usize> = (0..seeds.len()).collect();
        order.sort_by(|&a, &b| seeds[a].quality.total_cmp(&seeds[b].quality));

        let mut done = vec![false; seeds.len()];
        let mut accepted = Vec::new();

        for (pass_index, pass) in self.config.passes.iter().enumerate() {
            for &seed_index in &order {
                if done[seed_index] {
                    continue;
                }
                reporter.on_seed_start(seed_index, pass_index);

                let result = TrackFinder::new(&mut self.detector, &self.config, vertex).find(
                    &seeds[seed_index].state,
                    pass,
                    stats,
                    reporter,
                );
                stats.nodes_expanded += result.nodes;
                if result.budget_exhausted {
                    stats.budget_exhausted += 1;
                }

                let Some(best) = result.best else {
                    log::debug!("seed {} pass {}: no hypothesis", seed_index, pass_index);
                    stats.seeds_without_hypothesis += 1;
                    let reason = TrackingError::NoHypothesis {
                        nodes: result.nodes,
                    };
                    reporter.on_seed_rejected(seed_index, pass_index, &reason);
                    continue;
                };
                if best.n_clusters() < pass.min_clusters {
                    log::debug!(
                        "seed {} pass {}: {} clusters, {} required",
                        seed_index,
                        pass_index,
                        best.n_clusters(),
                        pass.min_clusters
                    );
                    stats.insufficient_clusters += 1;
                    let reason = TrackingError::InsufficientClusters {
                        found: best.n_clusters(),
                        required: pass.min_clusters,
                    };
                    reporter.on_seed_rejected(seed_index, pass_index, &reason);
                    continue;
                }

                log::debug!(
                    "seed {} pass {}: accepted with {} clusters, chi2 {:.2}",
                    seed_index,
                    pass_index,
                    best.n_clusters(),
                    best.chi2()
                );
                self.detector.mark_used(best.cluster_refs());
                stats.tracks_per_pass[pass_index] += 1;
                done[seed_index] = true;
                reporter.on_track_accepted(seed_index, pass_index, &best);
                accepted.push(AcceptedTrack {
                    seed_index,
                    pass: pass_index,
                    state: best,
                });
            }
        }
        accepted
    }

    /// Refit an accepted track and build its output record
    fn materialize(
        &self,
        track: &AcceptedTrack,
        seed: &SeedEntry,
        vertex: &Vertex,
        stats: &mut EventStats,
    ) -> ReconstructedTrack {
        let pass: &PassConfig = &self.config.passes[track.pass];
        let refit = self.refit(track, pass, vertex, stats);
        let search = &track.state;

        let (state, outer, dedx_samples) = match &refit {
            Some(RefitResult {
                state,
                outer,
                dedx_samples,
            }) => (state, Some(TrackEstimate::from(outer)), dedx_samples.clone()),
            None => (search, None, self.search_dedx_samples(search)),
        };

        let refs: Vec<ClusterRef> = search.cluster_refs().collect();
        let labels = refs
            .iter()
            .filter_map(|&r| self.detector.cluster(r))
            .map(|c| &c.labels);
        let cooked = cook_label(labels, search.label(), self.config.fake_fraction);

        let num_layers = self.detector.num_layers();
        let clusters: Vec<Option<usize>> = (0..num_layers).map(|l| search.cluster_at(l)).collect();
        let cluster_ids = clusters
            .iter()
            .enumerate()
            .map(|(layer, slot)| {
                slot.and_then(|index| self.detector.cluster(ClusterRef::new(layer, index)))
                    .map(|c| c.external_id)
            })
            .collect();

        ReconstructedTrack {
            seed_index: track.seed_index,
            pass: track.pass,
            estimate: TrackEstimate::from(state),
            outer,
            clusters,
            cluster_ids,
            n_clusters: search.n_clusters(),
            n_skips: search.n_skips(),
            n_dead_zones: search.n_dead_zones(),
            chi2: state.chi2(),
            label: cooked.map(|(label, _)| label),
            dedx: truncated_mean(
                &dedx_samples,
                self.config.dedx_low_fraction,
                self.config.dedx_high_fraction,
            ),
            pt: state.pt(self.config.b_field),
            flags: TrackFlags {
                constrained: pass.constrained,
                refitted: refit.is_some(),
                refit_failed: self.config.refit.enabled && refit.is_none(),
                fake: cooked.is_some_and(|(_, fake)| fake),
                standalone: seed.standalone,
            },
        }
    }

    fn refit(
        &self,
        track: &AcceptedTrack,
        pass: &PassConfig,
        vertex: &Vertex,
        stats: &mut EventStats,
    ) -> Option<RefitResult> {
        if !self.config.refit.enabled {
            return None;
        }
        let refitter = Refitter::new(&self.detector, self.config.propagator(), &self.config.refit);
        let constraint = pass.constrained.then_some((vertex, pass));
        match refitter.refit(&track.state, constraint) {
            Ok(result) => Some(result),
            Err(err) => {
                log::debug!("seed {}: refit failed: {}", track.seed_index, err);
                stats.refit_failures += 1;
                None
            }
        }
    }

    /// Charge samples normalized with the search estimate's direction
    fn search_dedx_samples(&self, state: &TrackState) -> Vec<f64> {
        let factor = path_length_factor(state.snp(), state.tgl());
        state
            .cluster_refs()
            .filter_map(|r| self.detector.cluster(r))
            .map(|c| c.charge / factor)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::simulation::{EventGenerator, TrackSpec};
    use crate::tracker::config::{RefitConfig, SeedingConfig};
    use crate::tracker::reporter::{CompositeReporter, DebugReporter, LoggingReporter};

    fn tracker(config: TrackerConfig) -> Tracker {
        Tracker::from_description(&GeometryDescription::six_layer_barrel(), config).unwrap()
    }

    fn quiet_config() -> TrackerConfig {
        TrackerConfig::builder().energy_loss(false).build()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = TrackerConfig::builder().passes(vec![]).build();
        let err = Tracker::from_description(&GeometryDescription::six_layer_barrel(), config)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_single_clean_track() {
        let mut tracker = tracker(quiet_config());
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1).with_label(9);
        let event = EventInput::new(
            generator.clusters(&spec).unwrap(),
            vec![generator.seed(&spec, 50.0, 1.0).unwrap()],
            None,
        );

        let mut reporter = DebugReporter::new();
        let output = tracker.reconstruct_with_reporter(event, &mut reporter).unwrap();
        assert_eq!(output.num_tracks(), 1);
        let track = &output.tracks[0];
        assert_eq!(track.n_clusters, 6);
        assert_eq!(track.pass, 0);
        assert_eq!(track.label, Some(9));
        assert!(track.flags.constrained);
        assert!(track.flags.refitted);
        assert!(!track.flags.fake);
        assert!(track.outer.is_some());
        assert!((track.pt - 1.0).abs() < 1e-3);
        assert!((track.dedx - 1.0).abs() < 1e-3);
        assert_eq!(output.stats.tracks_per_pass, vec![1, 0]);
        assert_eq!(reporter.accepted().len(), 1);
        assert_eq!(reporter.completed_events(), &[1]);
        // Claims are released with the event
        assert_eq!(tracker.detector().num_clusters(), 0);
    }

    #[test]
    fn test_logging_and_debug_reporters_together() {
        let mut tracker = tracker(quiet_config());
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        let event = EventInput::new(
            generator.clusters(&spec).unwrap(),
            vec![generator.seed(&spec, 50.0, 1.0).unwrap()],
            None,
        );

        let mut reporter = CompositeReporter::new(LoggingReporter::new(), DebugReporter::new());
        let output = tracker.reconstruct_with_reporter(event, &mut reporter).unwrap();
        let (_, debug) = reporter.into_parts();
        assert_eq!(output.num_tracks(), 1);
        assert_eq!(debug.accepted().len(), 1);
        assert!(debug.rejected().is_empty());
        assert_eq!(debug.completed_events(), &[1]);
    }

    #[test]
    fn test_invalid_seed_is_fatal() {
        let mut tracker = tracker(quiet_config());
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        let mut seed = generator.seed(&spec, 50.0, 1.0).unwrap();
        seed.params[2] = 2.0;
        let event = EventInput::new(generator.clusters(&spec).unwrap(), vec![seed], None);
        let err = tracker.reconstruct(event).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(tracker.detector().num_clusters(), 0);
    }

    #[test]
    fn test_short_track_is_counted() {
        let config = TrackerConfig::builder()
            .energy_loss(false)
            .passes(vec![PassConfig::unconstrained(6)])
            .max_skips(1)
            .build();
        let mut tracker = tracker(config);
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        let mut clusters = generator.clusters(&spec).unwrap();
        clusters.retain(|c| c.layer != 2);
        let event = EventInput::new(clusters, vec![generator.seed(&spec, 50.0, 1.0).unwrap()], None);

        let mut reporter = DebugReporter::new();
        let output = tracker.reconstruct_with_reporter(event, &mut reporter).unwrap();
        assert_eq!(output.num_tracks(), 0);
        assert_eq!(output.stats.insufficient_clusters, 1);
        assert!(reporter.rejected()[0].2.contains("found 5"));
    }

    #[test]
    fn test_seed_without_hypothesis_is_reported() {
        let mut tracker = tracker(quiet_config());
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        let event = EventInput::new(vec![], vec![generator.seed(&spec, 50.0, 1.0).unwrap()], None);

        let mut reporter = DebugReporter::new();
        let output = tracker.reconstruct_with_reporter(event, &mut reporter).unwrap();
        assert_eq!(output.stats.seeds_without_hypothesis, 2);
        assert_eq!(output.stats.insufficient_clusters, 0);
        let rejected: Vec<(usize, usize)> = reporter.rejected().iter().map(|r| (r.0, r.1)).collect();
        assert_eq!(rejected, vec![(0, 0), (0, 1)]);
        assert!(reporter
            .rejected()
            .iter()
            .all(|r| r.2.starts_with("No hypothesis")));
    }

    #[test]
    fn test_refit_disabled_keeps_search_estimate() {
        let config = TrackerConfig::builder()
            .energy_loss(false)
            .refit(RefitConfig {
                enabled: false,
                ..Default::default()
            })
            .build();
        let mut tracker = tracker(config);
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        let event = EventInput::new(
            generator.clusters(&spec).unwrap(),
            vec![generator.seed(&spec, 50.0, 1.0).unwrap()],
            None,
        );
        let output = tracker.reconstruct(event).unwrap();
        let track = &output.tracks[0];
        assert!(!track.flags.refitted);
        assert!(!track.flags.refit_failed);
        assert!(track.outer.is_none());
        assert_eq!(output.stats.refit_failures, 0);
    }

    #[test]
    fn test_standalone_seeding_without_external_seeds() {
        let mut tracker = tracker(quiet_config());
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1).with_label(2);
        let event = EventInput::new(generator.clusters(&spec).unwrap(), vec![], None);

        let output = tracker.reconstruct(event).unwrap();
        assert_eq!(output.stats.standalone_seeds, 1);
        assert_eq!(output.num_tracks(), 1);
        let track = &output.tracks[0];
        assert!(track.flags.standalone);
        assert_eq!(track.n_clusters, 6);
        assert_eq!(track.label, Some(2));
    }

    #[test]
    fn test_standalone_seeding_disabled() {
        let config = TrackerConfig::builder()
            .energy_loss(false)
            .seeding(SeedingConfig {
                mode: StandaloneMode::Never,
                ..Default::default()
            })
            .build();
        let mut tracker = tracker(config);
        let generator = EventGenerator::new(tracker.detector());
        let spec = TrackSpec::new(1.0, 0.3, 0.1);
        let event = EventInput::new(generator.clusters(&spec).unwrap(), vec![], None);
        let output = tracker.reconstruct(event).unwrap();
        assert_eq!(output.stats.standalone_seeds, 0);
        assert_eq!(output.num_tracks(), 0);
    }

    #[test]
    fn test_seeds_processed_by_quality() {
        let mut tracker = tracker(quiet_config());
        let generator = EventGenerator::new(tracker.detector());
        let a = TrackSpec::new(1.0, 0.3, 0.1);
        let b = TrackSpec::new(1.5, 2.0, -0.2);
        let mut clusters = generator.clusters(&a).unwrap();
        clusters.extend(generator.clusters(&b).unwrap());
        let seeds = vec![
            generator.seed(&a, 50.0, 2.0).unwrap(),
            generator.seed(&b, 50.0, 1.0).unwrap(),
        ];

        let mut reporter = DebugReporter::new();
        let output = tracker
            .reconstruct_with_reporter(EventInput::new(clusters, seeds, None), &mut reporter)
            .unwrap();
        assert_eq!(output.num_tracks(), 2);
        let order: Vec<usize> = reporter.accepted().iter().map(|a| a.0).collect();
        assert_eq!(order, vec![1, 0]);
    }
}
