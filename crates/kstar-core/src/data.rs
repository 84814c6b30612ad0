use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    utils::{
        enums::{CollisionSystem, GapSide},
        vectors::Vec3,
    },
    KstarError, KstarResult,
};

/// Parquet table provider for [`CandidateBatch`]es.
pub mod io;

/// Identifier of a daughter track. Only ever compared for equality.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackRef(pub u64);

impl Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Bit set of the detectors which contributed to a track.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorMap(pub u8);

impl DetectorMap {
    pub const ITS: u8 = 0x1;
    pub const TPC: u8 = 0x2;
    pub const TRD: u8 = 0x4;
    pub const TOF: u8 = 0x8;

    pub fn has(&self, detector: u8) -> bool {
        self.0 & detector == detector
    }
    /// A track reconstructed in the TPC and nowhere else.
    pub fn is_tpc_only(&self) -> bool {
        self.0 == Self::TPC
    }
}

/// Reconstruction-quality and PID information of a V0 daughter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaughterTrack {
    pub id: TrackRef,
    pub tpc_crossed_rows: i32,
    pub its_clusters: i32,
    /// A negative value flags a track built by the ITS afterburner.
    pub its_chi2_per_cluster: f64,
    pub detector_map: DetectorMap,
    pub tpc_nsigma_pi: f64,
    pub tpc_nsigma_el: f64,
}

impl DaughterTrack {
    pub fn is_from_afterburner(&self) -> bool {
        self.its_chi2_per_cluster < 0.0
    }
}

impl Default for DaughterTrack {
    fn default() -> Self {
        Self {
            id: TrackRef::default(),
            tpc_crossed_rows: 0,
            its_clusters: 0,
            its_chi2_per_cluster: 0.0,
            detector_map: DetectorMap(DetectorMap::ITS | DetectorMap::TPC),
            tpc_nsigma_pi: 0.0,
            tpc_nsigma_el: 0.0,
        }
    }
}

/// Generated-level information attached to a candidate in simulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TruthInfo {
    pub pdg_code: i32,
    pub pdg_code_positive: i32,
    pub pdg_code_negative: i32,
    pub pdg_code_mother: i32,
    /// Generated momentum of the candidate.
    pub momentum: Vec3,
}

/// A reconstructed V0 (two-prong) decay candidate.
///
/// Daughters are referenced by position in the owning [`CandidateBatch`]'s track arena.
/// Positions are in cm, momenta in GeV/$`c`$, masses in GeV/$`c^2`$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier, unique within a batch.
    pub id: u64,
    pub pos_track: usize,
    pub neg_track: usize,
    pub v0_type: i32,
    pub momentum: Vec3,
    pub decay_vertex: Vec3,
    pub pos_eta: f64,
    pub neg_eta: f64,
    pub v0_radius: f64,
    pub v0_cos_pa: f64,
    pub dca_v0_to_pv: f64,
    pub dca_pos_to_pv: f64,
    pub dca_neg_to_pv: f64,
    pub dca_v0_daughters: f64,
    pub m_k0_short: f64,
    pub m_lambda: f64,
    pub m_anti_lambda: f64,
    pub m_gamma: f64,
    pub qt_arm: f64,
    pub alpha: f64,
    pub pos_tof_delta_t_k0_pi: Option<f64>,
    pub neg_tof_delta_t_k0_pi: Option<f64>,
    pub tof_nsigma_k0_pi_plus: Option<f64>,
    pub tof_nsigma_k0_pi_minus: Option<f64>,
    pub k0_short_score: Option<f64>,
    pub gamma_score: Option<f64>,
    pub truth: Option<TruthInfo>,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            id: 0,
            pos_track: 0,
            neg_track: 0,
            v0_type: 1,
            momentum: Vec3::default(),
            decay_vertex: Vec3::default(),
            pos_eta: 0.0,
            neg_eta: 0.0,
            v0_radius: 0.0,
            v0_cos_pa: 0.0,
            dca_v0_to_pv: 0.0,
            dca_pos_to_pv: 0.0,
            dca_neg_to_pv: 0.0,
            dca_v0_daughters: 0.0,
            m_k0_short: 0.0,
            m_lambda: 0.0,
            m_anti_lambda: 0.0,
            m_gamma: 0.0,
            qt_arm: 0.0,
            alpha: 0.0,
            pos_tof_delta_t_k0_pi: None,
            neg_tof_delta_t_k0_pi: None,
            tof_nsigma_k0_pi_plus: None,
            tof_nsigma_k0_pi_minus: None,
            k0_short_score: None,
            gamma_score: None,
            truth: None,
        }
    }
}

impl Candidate {
    pub fn pt(&self) -> f64 {
        self.momentum.pt()
    }
    pub fn p(&self) -> f64 {
        self.momentum.mag()
    }
    /// Decay length over momentum, $`L/p`$, measured from the given primary vertex.
    pub fn distance_over_momentum(&self, primary_vertex: &Vec3) -> f64 {
        self.decay_vertex.distance(primary_vertex) / self.p()
    }
}

/// Event-selection decisions computed upstream. They are consumed as-is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBits {
    pub sel8: bool,
    pub trigger_tvx: bool,
    pub no_its_rof_border: bool,
    pub no_time_frame_border: bool,
    pub vertex_its_tpc: bool,
    pub good_zvtx_ft0_vs_pv: bool,
    pub vertex_tof_matched: bool,
    pub vertex_trd_matched: bool,
    pub no_same_bunch_pileup: bool,
    pub no_coll_in_time_range_standard: bool,
    pub no_coll_in_time_range_strict: bool,
    pub no_coll_in_time_range_narrow: bool,
    pub no_coll_in_time_range_vz_dependent: bool,
    pub no_coll_in_rof_standard: bool,
    pub no_coll_in_rof_strict: bool,
}

impl SelectionBits {
    /// Every bit set, i.e. a collision that passes any combination of requirements.
    pub const fn all() -> Self {
        Self {
            sel8: true,
            trigger_tvx: true,
            no_its_rof_border: true,
            no_time_frame_border: true,
            vertex_its_tpc: true,
            good_zvtx_ft0_vs_pv: true,
            vertex_tof_matched: true,
            vertex_trd_matched: true,
            no_same_bunch_pileup: true,
            no_coll_in_time_range_standard: true,
            no_coll_in_time_range_strict: true,
            no_coll_in_time_range_narrow: true,
            no_coll_in_time_range_vz_dependent: true,
            no_coll_in_rof_standard: true,
            no_coll_in_rof_strict: true,
        }
    }
}

impl Default for SelectionBits {
    fn default() -> Self {
        Self::all()
    }
}

/// Collision-level information shared by every candidate of a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub id: u64,
    pub primary_vertex: Vec3,
    pub selection: SelectionBits,
    /// Number of primary-vertex contributors with $`|\eta| < 1`$.
    pub mult_ntracks_pv_eta1: i32,
    pub centrality_ft0m: f64,
    pub centrality_ft0c: f64,
    pub track_occupancy: f64,
    pub ft0c_occupancy: f64,
    /// Upstream rapidity-gap code, see [`GapSide::from_code`]. The FV0, FT0 and ZDC thresholds
    /// which decide it are not re-applied here.
    pub gap_side: i32,
}

impl Default for Collision {
    fn default() -> Self {
        Self {
            id: 0,
            primary_vertex: Vec3::default(),
            selection: SelectionBits::all(),
            mult_ntracks_pv_eta1: 1,
            centrality_ft0m: -1.0,
            centrality_ft0c: -1.0,
            track_occupancy: 0.0,
            ft0c_occupancy: 0.0,
            gap_side: -1,
        }
    }
}

impl Collision {
    /// The centrality percentile of the estimator used for the given system.
    pub fn centrality(&self, system: CollisionSystem) -> f64 {
        match system {
            CollisionSystem::PP => self.centrality_ft0m,
            CollisionSystem::PbPb => self.centrality_ft0c,
        }
    }
    pub fn gap(&self) -> GapSide {
        GapSide::from_code(self.gap_side)
    }
}

/// All candidates reconstructed in one collision.
///
/// Candidates and daughter tracks live in two contiguous arenas; candidates refer to their
/// daughters by index. Whether generated-level information is in use is fixed when the batch
/// is built ([`CandidateBatch::new`] versus [`CandidateBatch::new_with_truth`]).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateBatch {
    collision: Collision,
    tracks: Vec<DaughterTrack>,
    candidates: Vec<Candidate>,
    has_truth: bool,
}

impl CandidateBatch {
    /// Build a batch of reconstructed candidates without generated-level information.
    pub fn new(
        collision: Collision,
        tracks: Vec<DaughterTrack>,
        candidates: Vec<Candidate>,
    ) -> KstarResult<Self> {
        Self::build(collision, tracks, candidates, false)
    }

    /// Build a batch from simulation. Candidates without a [`TruthInfo`] record stay in the
    /// batch but can never be selected.
    pub fn new_with_truth(
        collision: Collision,
        tracks: Vec<DaughterTrack>,
        candidates: Vec<Candidate>,
    ) -> KstarResult<Self> {
        Self::build(collision, tracks, candidates, true)
    }

    fn build(
        collision: Collision,
        tracks: Vec<DaughterTrack>,
        candidates: Vec<Candidate>,
        has_truth: bool,
    ) -> KstarResult<Self> {
        for candidate in &candidates {
            for index in [candidate.pos_track, candidate.neg_track] {
                if index >= tracks.len() {
                    return Err(KstarError::InvalidTrackIndex {
                        candidate: candidate.id,
                        index,
                        n_tracks: tracks.len(),
                    });
                }
            }
        }
        Ok(Self {
            collision,
            tracks,
            candidates,
            has_truth,
        })
    }

    pub fn collision(&self) -> &Collision {
        &self.collision
    }
    pub fn tracks(&self) -> &[DaughterTrack] {
        &self.tracks
    }
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
    pub fn has_truth(&self) -> bool {
        self.has_truth
    }
    pub fn len(&self) -> usize {
        self.candidates.len()
    }
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The identifiers of the positive and negative daughters of the candidate at `index`.
    pub fn daughter_ids(&self, index: usize) -> [TrackRef; 2] {
        let candidate = &self.candidates[index];
        [
            self.tracks[candidate.pos_track].id,
            self.tracks[candidate.neg_track].id,
        ]
    }

    /// A view of the candidate at `index` together with its daughters and collision.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn view(&self, index: usize) -> CandidateView<'_> {
        let candidate = &self.candidates[index];
        CandidateView {
            collision: &self.collision,
            candidate,
            pos: &self.tracks[candidate.pos_track],
            neg: &self.tracks[candidate.neg_track],
            has_truth: self.has_truth,
        }
    }

    pub fn views(&self) -> impl Iterator<Item = CandidateView<'_>> + '_ {
        (0..self.len()).map(|index| self.view(index))
    }
}

/// Borrowed view of one candidate with everything a selection needs.
#[derive(Copy, Clone, Debug)]
pub struct CandidateView<'a> {
    pub collision: &'a Collision,
    pub candidate: &'a Candidate,
    pub pos: &'a DaughterTrack,
    pub neg: &'a DaughterTrack,
    /// Whether the owning batch carries generated-level information.
    pub has_truth: bool,
}

impl Display for CandidateView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "V0 {}:", self.candidate.id)?;
        writeln!(f, "  p: {}", self.candidate.momentum)?;
        writeln!(f, "  daughters: {} {}", self.pos.id, self.neg.id)?;
        writeln!(
            f,
            "  m(K0S) = {:.5}, m(gamma) = {:.5}",
            self.candidate.m_k0_short, self.candidate.m_gamma
        )
    }
}

/// A daughter track which passes the default track-quality and PID requirements of both
/// categories.
pub fn test_track(id: u64) -> DaughterTrack {
    DaughterTrack {
        id: TrackRef(id),
        tpc_crossed_rows: 120,
        its_clusters: 7,
        its_chi2_per_cluster: 1.2,
        detector_map: DetectorMap(DetectorMap::ITS | DetectorMap::TPC | DetectorMap::TOF),
        tpc_nsigma_pi: 0.4,
        tpc_nsigma_el: -0.7,
    }
}

/// A $`K^0_S`$ candidate which passes the default K0-like selection (and fails the photon one).
pub fn test_k0_candidate(id: u64, pos_track: usize, neg_track: usize) -> Candidate {
    Candidate {
        id,
        pos_track,
        neg_track,
        v0_type: 1,
        momentum: Vec3::new(0.8, -0.4, 0.3),
        decay_vertex: Vec3::new(2.1, -1.2, 0.9),
        pos_eta: 0.3,
        neg_eta: 0.2,
        v0_radius: 2.42,
        v0_cos_pa: 0.998,
        dca_v0_to_pv: 0.12,
        dca_pos_to_pv: 0.4,
        dca_neg_to_pv: -0.04,
        dca_v0_daughters: 0.3,
        m_k0_short: 0.4985,
        m_lambda: 1.142,
        m_anti_lambda: 1.139,
        m_gamma: 0.21,
        qt_arm: 0.2,
        alpha: 0.1,
        tof_nsigma_k0_pi_plus: Some(0.8),
        tof_nsigma_k0_pi_minus: None,
        ..Candidate::default()
    }
}

/// A converted photon candidate which passes the default photon-like selection (and fails the
/// K0-like one).
pub fn test_photon_candidate(id: u64, pos_track: usize, neg_track: usize) -> Candidate {
    Candidate {
        id,
        pos_track,
        neg_track,
        v0_type: 1,
        momentum: Vec3::new(-0.3, 0.5, 0.2),
        decay_vertex: Vec3::new(-12.0, 20.0, 8.0),
        pos_eta: 0.35,
        neg_eta: 0.4,
        v0_radius: 23.3,
        v0_cos_pa: 0.999,
        dca_v0_to_pv: 0.2,
        dca_pos_to_pv: 1.3,
        dca_neg_to_pv: 0.03,
        dca_v0_daughters: 0.2,
        m_k0_short: 0.29,
        m_lambda: 1.09,
        m_anti_lambda: 1.09,
        m_gamma: 0.004,
        qt_arm: 0.01,
        alpha: 0.02,
        ..Candidate::default()
    }
}

/// A batch holding one $`K^0_S`$ and one photon candidate with disjoint daughters.
pub fn test_batch() -> CandidateBatch {
    CandidateBatch::new(
        Collision {
            id: 7,
            primary_vertex: Vec3::new(0.01, -0.02, 1.5),
            centrality_ft0m: 35.0,
            centrality_ft0c: 40.0,
            mult_ntracks_pv_eta1: 12,
            ..Collision::default()
        },
        (0..4).map(test_track).collect(),
        vec![test_k0_candidate(0, 0, 1), test_photon_candidate(1, 2, 3)],
    )
    .expect("Test batch should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::MASS_K0_SHORT;
    use approx::assert_relative_eq;

    #[test]
    fn test_batch_creation() {
        let batch = test_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.tracks().len(), 4);
        assert!(!batch.has_truth());
        assert_eq!(batch.daughter_ids(1), [TrackRef(2), TrackRef(3)]);
    }

    #[test]
    fn test_batch_rejects_dangling_track_index() {
        let result = CandidateBatch::new(
            Collision::default(),
            vec![test_track(0)],
            vec![test_k0_candidate(4, 0, 3)],
        );
        match result {
            Err(KstarError::InvalidTrackIndex {
                candidate,
                index,
                n_tracks,
            }) => {
                assert_eq!(candidate, 4);
                assert_eq!(index, 3);
                assert_eq!(n_tracks, 1);
            }
            other => panic!("expected InvalidTrackIndex, got {other:?}"),
        }
    }

    #[test]
    fn test_truth_flag_is_chosen_at_construction() {
        let batch = CandidateBatch::new_with_truth(
            Collision::default(),
            vec![test_track(0), test_track(1)],
            vec![test_k0_candidate(0, 0, 1)],
        )
        .unwrap();
        assert!(batch.has_truth());
    }

    #[test]
    fn test_view_borrows_daughters() {
        let batch = test_batch();
        let view = batch.view(0);
        assert_eq!(view.pos.id, TrackRef(0));
        assert_eq!(view.neg.id, TrackRef(1));
        assert_eq!(view.collision.id, 7);
        assert_eq!(batch.views().count(), 2);
        assert!(format!("{view}").starts_with("V0 0:"));
    }

    #[test]
    fn test_candidate_lifetime_inputs() {
        let candidate = test_k0_candidate(0, 0, 1);
        let pv = Vec3::new(0.0, 0.0, 0.0);
        let expected = candidate.decay_vertex.mag() / candidate.momentum.mag();
        assert_relative_eq!(candidate.distance_over_momentum(&pv), expected);
        assert!(candidate.distance_over_momentum(&pv) * MASS_K0_SHORT < 20.0);
    }

    #[test]
    fn test_detector_map() {
        assert!(DetectorMap(DetectorMap::TPC).is_tpc_only());
        assert!(!DetectorMap(DetectorMap::TPC | DetectorMap::ITS).is_tpc_only());
        assert!(test_track(0).detector_map.has(DetectorMap::TOF));
        assert!(!test_track(0).is_from_afterburner());
    }

    #[test]
    fn test_collision_centrality_estimator() {
        let batch = test_batch();
        assert_relative_eq!(batch.collision().centrality(CollisionSystem::PP), 35.0);
        assert_relative_eq!(batch.collision().centrality(CollisionSystem::PbPb), 40.0);
        assert_eq!(batch.collision().gap(), GapSide::Hadronic);
    }

    #[test]
    fn test_gap_side_is_taken_as_reported() {
        for (code, side) in [(0, GapSide::SingleGapA), (2, GapSide::DoubleGap), (7, GapSide::Hadronic)] {
            let collision = Collision {
                gap_side: code,
                ..Collision::default()
            };
            assert_eq!(collision.gap(), side);
        }
    }
}
