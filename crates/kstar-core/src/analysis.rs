use std::fmt::Display;

use indexmap::IndexMap;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    data::CandidateBatch,
    event::EventCut,
    kinematics::{truth_gate, PairKinematics, TruePairKinematics},
    pairing::{build_pairs, Pair},
    selection::{ScoreSource, SelectionMasks, Selector, StoredScores},
    utils::enums::{Category, CollisionSystem, GapSide, SelectionMode},
    KstarResult,
};

/// A pair which passed every pair-level requirement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportedPair {
    pub pair: Pair,
    pub k0_id: u64,
    pub photon_id: u64,
    pub kinematics: PairKinematics,
    /// Generated-level kinematics, present when truth information was used.
    pub truth: Option<TruePairKinematics>,
    /// Whether both candidates descend from the same $`K^*(892)^0`$.
    pub true_kstar: bool,
}

/// Everything produced for an accepted collision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionSummary {
    pub collision_id: u64,
    pub centrality: f64,
    /// Rapidity-gap classification, only reported for Pb-Pb.
    pub gap_side: Option<GapSide>,
    pub masks: SelectionMasks,
    pub n_k0_like: usize,
    pub n_photon_like: usize,
    pub pairs: Vec<ReportedPair>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CollisionOutcome {
    /// The collision failed the given event requirement.
    Rejected(EventCut),
    Accepted(CollisionSummary),
}

impl CollisionOutcome {
    pub fn summary(&self) -> Option<&CollisionSummary> {
        match self {
            CollisionOutcome::Accepted(summary) => Some(summary),
            CollisionOutcome::Rejected(_) => None,
        }
    }
}

/// The per-collision analysis: event selection, classification, pairing and pair gates.
#[derive(Clone, Debug)]
pub struct Analysis<S: ScoreSource = StoredScores> {
    config: AnalysisConfig,
    selector: Selector<S>,
}

impl Analysis<StoredScores> {
    /// Build an analysis which uses the scores stored with each candidate in score mode.
    pub fn new(config: AnalysisConfig) -> Self {
        for category in Category::ALL {
            let ml = config.ml.get(category);
            if ml.mode == SelectionMode::Score && ml.calculate {
                log::warn!(
                    "{} scores should be calculated, but no model is attached; stored scores will be used",
                    category
                );
            }
        }
        let selector = Selector::new(
            config.k0_short.clone(),
            config.photon.clone(),
            config.ml.clone(),
            config.mc_association,
        );
        Self { config, selector }
    }
}

impl<S: ScoreSource> Analysis<S> {
    /// Replace the score provider, e.g. with a [`ModelScores`](crate::selection::ModelScores).
    pub fn with_scores<T: ScoreSource>(self, scores: T) -> Analysis<T> {
        Analysis {
            config: self.config,
            selector: self.selector.with_scores(scores),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn selector(&self) -> &Selector<S> {
        &self.selector
    }

    /// Run the full pipeline on one collision.
    pub fn process(&self, batch: &CandidateBatch) -> KstarResult<CollisionOutcome> {
        let collision = batch.collision();
        if let Some(cut) = self
            .config
            .event
            .first_failed(collision, self.config.system)
        {
            log::debug!("Collision {} rejected by {}", collision.id, cut);
            return Ok(CollisionOutcome::Rejected(cut));
        }
        let masks = self.selector.classify_batch(batch);
        let n_k0_like = masks.count(Category::K0Like);
        let n_photon_like = masks.count(Category::PhotonLike);
        let pairs = if n_k0_like > 0 && n_photon_like > 0 {
            self.report_pairs(batch, &masks)?
        } else {
            Vec::new()
        };
        log::debug!(
            "Collision {}: {} candidates, {} K0-like, {} photon-like, {} pairs",
            collision.id,
            batch.len(),
            n_k0_like,
            n_photon_like,
            pairs.len()
        );
        Ok(CollisionOutcome::Accepted(CollisionSummary {
            collision_id: collision.id,
            centrality: collision.centrality(self.config.system),
            gap_side: match self.config.system {
                CollisionSystem::PP => None,
                CollisionSystem::PbPb => Some(collision.gap()),
            },
            masks,
            n_k0_like,
            n_photon_like,
            pairs,
        }))
    }

    fn report_pairs(
        &self,
        batch: &CandidateBatch,
        masks: &SelectionMasks,
    ) -> KstarResult<Vec<ReportedPair>> {
        let use_truth = self.config.mc_association && batch.has_truth();
        let window = &self.config.rapidity;
        let candidates = batch.candidates();
        let pairs = build_pairs(batch, &masks.k0_like, &masks.photon_like)?;
        Ok(pairs
            .into_iter()
            .filter_map(|pair| {
                let (k0, photon) = (&candidates[pair.primary], &candidates[pair.secondary]);
                let kinematics = PairKinematics::k0_gamma(k0, photon);
                let truth = if use_truth {
                    Some(truth_gate(k0, photon, window)?)
                } else if window.accepts(kinematics.rapidity) {
                    None
                } else {
                    return None;
                };
                Some(ReportedPair {
                    pair,
                    k0_id: k0.id,
                    photon_id: photon.id,
                    kinematics,
                    true_kstar: truth.is_some_and(|truth| truth.true_kstar),
                    truth,
                })
            })
            .collect())
    }

    /// Process independent collisions, keeping the input order.
    #[cfg(feature = "rayon")]
    pub fn process_all(&self, batches: &[CandidateBatch]) -> KstarResult<Vec<CollisionOutcome>>
    where
        S: Sync,
    {
        batches.par_iter().map(|batch| self.process(batch)).collect()
    }

    /// Process independent collisions, keeping the input order.
    #[cfg(not(feature = "rayon"))]
    pub fn process_all(&self, batches: &[CandidateBatch]) -> KstarResult<Vec<CollisionOutcome>> {
        batches.iter().map(|batch| self.process(batch)).collect()
    }
}

/// Running totals over many [`CollisionOutcome`]s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisTally {
    pub collisions: usize,
    pub accepted: usize,
    pub rejected: IndexMap<EventCut, usize>,
    pub candidates: usize,
    pub k0_like: usize,
    pub photon_like: usize,
    pub pairs: usize,
    pub true_kstar_pairs: usize,
}

impl AnalysisTally {
    pub fn add(&mut self, outcome: &CollisionOutcome) {
        self.collisions += 1;
        match outcome {
            CollisionOutcome::Rejected(cut) => *self.rejected.entry(*cut).or_default() += 1,
            CollisionOutcome::Accepted(summary) => {
                self.accepted += 1;
                self.candidates += summary.masks.len();
                self.k0_like += summary.n_k0_like;
                self.photon_like += summary.n_photon_like;
                self.pairs += summary.pairs.len();
                self.true_kstar_pairs += summary.pairs.iter().filter(|p| p.true_kstar).count();
            }
        }
    }

    pub fn from_outcomes<'a, I: IntoIterator<Item = &'a CollisionOutcome>>(outcomes: I) -> Self {
        let mut tally = Self::default();
        for outcome in outcomes {
            tally.add(outcome);
        }
        tally
    }
}

impl Display for AnalysisTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Collisions:      {}", self.collisions)?;
        writeln!(f, "  accepted:      {}", self.accepted)?;
        for (cut, count) in &self.rejected {
            writeln!(f, "  {:<13}  {}", format!("{}:", cut), count)?;
        }
        writeln!(f, "V0 candidates:   {}", self.candidates)?;
        writeln!(f, "  K0-like:       {}", self.k0_like)?;
        writeln!(f, "  photon-like:   {}", self.photon_like)?;
        writeln!(f, "Pairs:           {}", self.pairs)?;
        write!(f, "  true K*(892)0: {}", self.true_kstar_pairs)
    }
}
