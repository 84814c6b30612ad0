use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    data::{CandidateBatch, CandidateView, DaughterTrack},
    utils::{
        abs_at_least, abs_within,
        constants::{
            MASS_K0_SHORT, MASS_LAMBDA, PDG_ELECTRON, PDG_GAMMA, PDG_K0_SHORT, PDG_PION_PLUS,
        },
        enums::{Category, SelectionMode},
    },
};

/// Topological and acceptance requirements on a V0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyCuts {
    /// Required V0 type tag. Negative values disable the requirement.
    ///
    /// Together with `daughter_eta_max`, this is an acceptance requirement which is read from the
    /// photon-like block for both categories.
    pub v0_type: i32,
    pub daughter_eta_max: f64,
    pub radius_min: f64,
    pub radius_max: f64,
    pub dca_pos_to_pv_min: f64,
    /// Upper bound on $`|\text{DCA}_-|`$, unlike the lower bound on the positive daughter.
    pub dca_neg_to_pv_max: f64,
    pub cos_pa_min: f64,
    pub dca_daughters_max: f64,
    pub dca_v0_to_pv_min: f64,
    /// Slope $`k`$ of the Armenteros-Podolanski requirement $`q_T k > |\alpha|`$. Values
    /// $`\le 0`$ disable it.
    pub armenteros_k: f64,
}

impl Default for TopologyCuts {
    fn default() -> Self {
        Self {
            v0_type: 1,
            daughter_eta_max: 0.8,
            radius_min: 1.2,
            radius_max: 1e5,
            dca_pos_to_pv_min: 0.05,
            dca_neg_to_pv_max: 0.05,
            cos_pa_min: 0.97,
            dca_daughters_max: 1.0,
            dca_v0_to_pv_min: 0.05,
            armenteros_k: 5.0,
        }
    }
}

/// Reconstruction-quality and TPC PID requirements on both daughters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackQualityCuts {
    pub min_tpc_rows: i32,
    pub min_its_clusters: i32,
    /// Reject candidates with at least one daughter reconstructed in the TPC only.
    pub skip_tpc_only: bool,
    /// Require a positive daughter without TPC crossed rows.
    pub require_pos_its_only: bool,
    /// Require a negative daughter without TPC crossed rows.
    pub require_neg_its_only: bool,
    pub reject_pos_afterburner: bool,
    pub reject_neg_afterburner: bool,
    /// Maximum $`|n\sigma|`$ under the daughter hypothesis of the category.
    pub tpc_nsigma_max: f64,
}

impl Default for TrackQualityCuts {
    fn default() -> Self {
        Self {
            min_tpc_rows: 70,
            min_its_clusters: -1,
            skip_tpc_only: false,
            require_pos_its_only: false,
            require_neg_its_only: false,
            reject_pos_afterburner: false,
            reject_neg_afterburner: false,
            tpc_nsigma_max: 5.0,
        }
    }
}

/// The K0-like selection block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct K0ShortCuts {
    pub topology: TopologyCuts,
    pub tracks: TrackQualityCuts,
    /// Half-width of the open window around the $`K^0_S`$ mass.
    pub mass_window: f64,
    /// Minimum distance of the $`\Lambda`$-hypothesis mass from the $`\Lambda`$ mass.
    pub competing_mass_rejection: f64,
    /// Maximum $`L/p \cdot m_{K^0_S}`$ in cm.
    pub lifetime_max: f64,
    pub tof_delta_t_max: f64,
    pub tof_nsigma_max: f64,
}

impl Default for K0ShortCuts {
    fn default() -> Self {
        Self {
            topology: TopologyCuts::default(),
            tracks: TrackQualityCuts::default(),
            mass_window: 0.008,
            competing_mass_rejection: 0.008,
            lifetime_max: 20.0,
            tof_delta_t_max: 1e9,
            tof_nsigma_max: 1e6,
        }
    }
}

/// The photon-like selection block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotonCuts {
    pub topology: TopologyCuts,
    pub tracks: TrackQualityCuts,
    /// Maximum $`z`$ of the conversion point in cm.
    pub conversion_z_max: f64,
    /// Upper bound (inclusive) on the $`e^+e^-`$ invariant mass.
    pub mass_max: f64,
}

impl Default for PhotonCuts {
    fn default() -> Self {
        Self {
            topology: TopologyCuts::default(),
            tracks: TrackQualityCuts::default(),
            conversion_z_max: 240.0,
            mass_max: 0.008,
        }
    }
}

/// Score-based selection settings of one category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThreshold {
    pub mode: SelectionMode,
    /// Ask a [`ScoreModel`] for the score instead of using the stored one.
    pub calculate: bool,
    /// Candidates pass if their score is strictly greater than this.
    pub threshold: f64,
}

impl Default for ScoreThreshold {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Cuts,
            calculate: false,
            threshold: -1.0,
        }
    }
}

impl ScoreThreshold {
    pub fn accepts(&self, score: Option<f64>) -> bool {
        score.is_some_and(|score| score > self.threshold)
    }
}

/// Score-based selection settings of both categories.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlSelection {
    pub k0_short: ScoreThreshold,
    pub gamma: ScoreThreshold,
}

impl MlSelection {
    pub fn get(&self, category: Category) -> &ScoreThreshold {
        match category {
            Category::K0Like => &self.k0_short,
            Category::PhotonLike => &self.gamma,
        }
    }
}

/// A single requirement of the candidate selection, in evaluation order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cut {
    /// Candidate without generated-level information in a batch which carries it.
    MissingTruth,
    Score,
    ConversionZ,
    DaughterEta,
    V0Type,
    Radius,
    DcaPosToPv,
    DcaNegToPv,
    CosPointingAngle,
    DcaDaughters,
    DcaV0ToPv,
    MassWindow,
    CompetingMass,
    ItsClusters,
    ItsAfterburner,
    TpcRows,
    TpcPid,
    TofDeltaT,
    TofPid,
    ItsOnly,
    TpcOnly,
    ProperLifetime,
    Armenteros,
    TruthMatch,
}

impl Display for Cut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Cut::MissingTruth => "missing truth",
            Cut::Score => "score",
            Cut::ConversionZ => "conversion z",
            Cut::DaughterEta => "daughter eta",
            Cut::V0Type => "V0 type",
            Cut::Radius => "radius",
            Cut::DcaPosToPv => "DCA pos. to PV",
            Cut::DcaNegToPv => "DCA neg. to PV",
            Cut::CosPointingAngle => "cos(PA)",
            Cut::DcaDaughters => "DCA daughters",
            Cut::DcaV0ToPv => "DCA V0 to PV",
            Cut::MassWindow => "mass window",
            Cut::CompetingMass => "competing mass",
            Cut::ItsClusters => "ITS clusters",
            Cut::ItsAfterburner => "ITS afterburner",
            Cut::TpcRows => "TPC crossed rows",
            Cut::TpcPid => "TPC PID",
            Cut::TofDeltaT => "TOF delta t",
            Cut::TofPid => "TOF PID",
            Cut::ItsOnly => "ITS only",
            Cut::TpcOnly => "TPC only",
            Cut::ProperLifetime => "proper lifetime",
            Cut::Armenteros => "Armenteros-Podolanski",
            Cut::TruthMatch => "truth match",
        };
        write!(f, "{}", name)
    }
}

/// Something which can provide a classifier score for a candidate.
pub trait ScoreSource {
    /// The score of `view` under `category`, or [`None`] if it is unavailable.
    fn score(&self, view: &CandidateView<'_>, category: Category) -> Option<f64>;
}

/// Uses the scores stored with each candidate.
#[derive(Copy, Clone, Debug, Default)]
pub struct StoredScores;

impl ScoreSource for StoredScores {
    fn score(&self, view: &CandidateView<'_>, category: Category) -> Option<f64> {
        match category {
            Category::K0Like => view.candidate.k0_short_score,
            Category::PhotonLike => view.candidate.gamma_score,
        }
    }
}

/// An external classifier which maps a feature vector to a signal probability.
pub trait ScoreModel {
    fn probability(&self, category: Category, features: &[f64; 8]) -> Option<f64>;
}

/// Scores computed on the fly from [`ml_features`] by a [`ScoreModel`].
#[derive(Clone, Debug, Default)]
pub struct ModelScores<M: ScoreModel> {
    pub model: M,
}

impl<M: ScoreModel> ModelScores<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: ScoreModel> ScoreSource for ModelScores<M> {
    fn score(&self, view: &CandidateView<'_>, category: Category) -> Option<f64> {
        self.model.probability(category, &ml_features(view))
    }
}

impl<F> ScoreSource for F
where
    F: Fn(&CandidateView<'_>, Category) -> Option<f64>,
{
    fn score(&self, view: &CandidateView<'_>, category: Category) -> Option<f64> {
        self(view, category)
    }
}

/// The classifier input: $`[p_T, 0, 0, r, \cos\theta_{PA}, \text{DCA}_{dau}, \text{DCA}_+, \text{DCA}_-]`$.
///
/// The two zero entries are placeholders kept for compatibility with trained models. In batches
/// with truth information, $`p_T`$ is the generated one.
pub fn ml_features(view: &CandidateView<'_>) -> [f64; 8] {
    let c = view.candidate;
    let pt = match (&c.truth, view.has_truth) {
        (Some(truth), true) => truth.momentum.pt(),
        _ => c.pt(),
    };
    [
        pt,
        0.0,
        0.0,
        c.v0_radius,
        c.v0_cos_pa,
        c.dca_v0_daughters,
        c.dca_pos_to_pv,
        c.dca_neg_to_pv,
    ]
}

/// Per-category selection results for one batch, aligned with the batch positions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMasks {
    pub k0_like: Vec<bool>,
    pub photon_like: Vec<bool>,
}

impl SelectionMasks {
    pub fn get(&self, category: Category) -> &[bool] {
        match category {
            Category::K0Like => &self.k0_like,
            Category::PhotonLike => &self.photon_like,
        }
    }
    /// Number of selected candidates in `category`.
    pub fn count(&self, category: Category) -> usize {
        self.get(category).iter().filter(|&&selected| selected).count()
    }
    pub fn len(&self) -> usize {
        self.k0_like.len()
    }
    pub fn is_empty(&self) -> bool {
        self.k0_like.is_empty()
    }
}

/// Classifies V0 candidates as K0-like and/or photon-like.
///
/// Classification is a pure function of the candidate, its daughters, its collision and the
/// configuration, so the same candidate always receives the same verdict.
#[derive(Clone, Debug)]
pub struct Selector<S: ScoreSource = StoredScores> {
    pub k0_short: K0ShortCuts,
    pub photon: PhotonCuts,
    pub ml: MlSelection,
    /// Require a generated-level match in batches which carry truth information.
    pub mc_association: bool,
    scores: S,
}

impl Default for Selector<StoredScores> {
    fn default() -> Self {
        Self::new(
            K0ShortCuts::default(),
            PhotonCuts::default(),
            MlSelection::default(),
            true,
        )
    }
}

impl Selector<StoredScores> {
    pub fn new(
        k0_short: K0ShortCuts,
        photon: PhotonCuts,
        ml: MlSelection,
        mc_association: bool,
    ) -> Self {
        Self {
            k0_short,
            photon,
            ml,
            mc_association,
            scores: StoredScores,
        }
    }
}

impl<S: ScoreSource> Selector<S> {
    /// Replace the score provider used in score mode.
    pub fn with_scores<T: ScoreSource>(self, scores: T) -> Selector<T> {
        Selector {
            k0_short: self.k0_short,
            photon: self.photon,
            ml: self.ml,
            mc_association: self.mc_association,
            scores,
        }
    }

    pub fn classify(&self, view: &CandidateView<'_>, category: Category) -> bool {
        self.first_failed_cut(view, category).is_none()
    }

    /// The first requirement `view` fails under `category`, or [`None`] if it is selected.
    pub fn first_failed_cut(&self, view: &CandidateView<'_>, category: Category) -> Option<Cut> {
        if view.has_truth && view.candidate.truth.is_none() {
            return Some(Cut::MissingTruth);
        }
        let ml = self.ml.get(category);
        if ml.mode == SelectionMode::Score {
            return (!ml.accepts(self.scores.score(view, category))).then_some(Cut::Score);
        }
        match category {
            Category::K0Like => self.k0_short_first_failed(view),
            Category::PhotonLike => self.photon_first_failed(view),
        }
    }

    /// Classify every candidate of `batch` in both categories.
    pub fn classify_batch(&self, batch: &CandidateBatch) -> SelectionMasks {
        let (k0_like, photon_like) = batch
            .views()
            .map(|view| {
                (
                    self.classify(&view, Category::K0Like),
                    self.classify(&view, Category::PhotonLike),
                )
            })
            .unzip();
        SelectionMasks {
            k0_like,
            photon_like,
        }
    }

    fn k0_short_first_failed(&self, view: &CandidateView<'_>) -> Option<Cut> {
        let cuts = &self.k0_short;
        let c = view.candidate;
        if let Some(cut) = topology_first_failed(&self.photon.topology, &cuts.topology, view) {
            return Some(cut);
        }
        if !((c.m_k0_short - MASS_K0_SHORT).abs() < cuts.mass_window) {
            return Some(Cut::MassWindow);
        }
        if !abs_at_least(c.m_lambda - MASS_LAMBDA, cuts.competing_mass_rejection) {
            return Some(Cut::CompetingMass);
        }
        if let Some(cut) = quality_first_failed(&cuts.tracks, view, |track| track.tpc_nsigma_pi) {
            return Some(cut);
        }
        let within = |value: Option<f64>, max: f64| value.map_or(true, |v| abs_within(v, max));
        if !(within(c.pos_tof_delta_t_k0_pi, cuts.tof_delta_t_max)
            && within(c.neg_tof_delta_t_k0_pi, cuts.tof_delta_t_max))
        {
            return Some(Cut::TofDeltaT);
        }
        if !(within(c.tof_nsigma_k0_pi_plus, cuts.tof_nsigma_max)
            && within(c.tof_nsigma_k0_pi_minus, cuts.tof_nsigma_max))
        {
            return Some(Cut::TofPid);
        }
        if let Some(cut) = tags_first_failed(&cuts.tracks, view) {
            return Some(cut);
        }
        let proper_length = c.distance_over_momentum(&view.collision.primary_vertex) * MASS_K0_SHORT;
        if !(proper_length <= cuts.lifetime_max) {
            return Some(Cut::ProperLifetime);
        }
        if !armenteros_accepts(cuts.topology.armenteros_k, view) {
            return Some(Cut::Armenteros);
        }
        if self.truth_required(view)
            && !truth_matches(view, PDG_K0_SHORT, PDG_PION_PLUS, -PDG_PION_PLUS)
        {
            return Some(Cut::TruthMatch);
        }
        None
    }

    fn photon_first_failed(&self, view: &CandidateView<'_>) -> Option<Cut> {
        let cuts = &self.photon;
        let c = view.candidate;
        if !(c.decay_vertex.z <= cuts.conversion_z_max) {
            return Some(Cut::ConversionZ);
        }
        if let Some(cut) = topology_first_failed(&cuts.topology, &cuts.topology, view) {
            return Some(cut);
        }
        if !(c.m_gamma <= cuts.mass_max) {
            return Some(Cut::MassWindow);
        }
        if let Some(cut) = quality_first_failed(&cuts.tracks, view, |track| track.tpc_nsigma_el) {
            return Some(cut);
        }
        if let Some(cut) = tags_first_failed(&cuts.tracks, view) {
            return Some(cut);
        }
        if !armenteros_accepts(cuts.topology.armenteros_k, view) {
            return Some(Cut::Armenteros);
        }
        if self.truth_required(view) && !truth_matches(view, PDG_GAMMA, PDG_ELECTRON, -PDG_ELECTRON)
        {
            return Some(Cut::TruthMatch);
        }
        None
    }

    fn truth_required(&self, view: &CandidateView<'_>) -> bool {
        self.mc_association && view.has_truth
    }
}

/// Daughter acceptance and V0 type come from `acceptance`, everything else from `cuts`.
fn topology_first_failed(
    acceptance: &TopologyCuts,
    cuts: &TopologyCuts,
    view: &CandidateView<'_>,
) -> Option<Cut> {
    let c = view.candidate;
    let eta_max = acceptance.daughter_eta_max;
    if !(abs_within(c.pos_eta, eta_max) && abs_within(c.neg_eta, eta_max)) {
        return Some(Cut::DaughterEta);
    }
    if acceptance.v0_type >= 0 && c.v0_type != acceptance.v0_type {
        return Some(Cut::V0Type);
    }
    if !(cuts.radius_min <= c.v0_radius && c.v0_radius <= cuts.radius_max) {
        return Some(Cut::Radius);
    }
    if !abs_at_least(c.dca_pos_to_pv, cuts.dca_pos_to_pv_min) {
        return Some(Cut::DcaPosToPv);
    }
    if !abs_within(c.dca_neg_to_pv, cuts.dca_neg_to_pv_max) {
        return Some(Cut::DcaNegToPv);
    }
    if !(c.v0_cos_pa >= cuts.cos_pa_min) {
        return Some(Cut::CosPointingAngle);
    }
    if !(c.dca_v0_daughters <= cuts.dca_daughters_max) {
        return Some(Cut::DcaDaughters);
    }
    if !(c.dca_v0_to_pv >= cuts.dca_v0_to_pv_min) {
        return Some(Cut::DcaV0ToPv);
    }
    None
}

fn quality_first_failed(
    cuts: &TrackQualityCuts,
    view: &CandidateView<'_>,
    nsigma: impl Fn(&DaughterTrack) -> f64,
) -> Option<Cut> {
    let (pos, neg) = (view.pos, view.neg);
    if pos.its_clusters < cuts.min_its_clusters || neg.its_clusters < cuts.min_its_clusters {
        return Some(Cut::ItsClusters);
    }
    if (cuts.reject_pos_afterburner && pos.is_from_afterburner())
        || (cuts.reject_neg_afterburner && neg.is_from_afterburner())
    {
        return Some(Cut::ItsAfterburner);
    }
    if pos.tpc_crossed_rows < cuts.min_tpc_rows || neg.tpc_crossed_rows < cuts.min_tpc_rows {
        return Some(Cut::TpcRows);
    }
    if !(abs_within(nsigma(pos), cuts.tpc_nsigma_max) && abs_within(nsigma(neg), cuts.tpc_nsigma_max))
    {
        return Some(Cut::TpcPid);
    }
    None
}

fn tags_first_failed(cuts: &TrackQualityCuts, view: &CandidateView<'_>) -> Option<Cut> {
    let (pos, neg) = (view.pos, view.neg);
    if (cuts.require_pos_its_only && pos.tpc_crossed_rows > 0)
        || (cuts.require_neg_its_only && neg.tpc_crossed_rows > 0)
    {
        return Some(Cut::ItsOnly);
    }
    if cuts.skip_tpc_only && (pos.detector_map.is_tpc_only() || neg.detector_map.is_tpc_only()) {
        return Some(Cut::TpcOnly);
    }
    None
}

fn armenteros_accepts(k: f64, view: &CandidateView<'_>) -> bool {
    if !(k > 0.0) {
        return true;
    }
    view.candidate.qt_arm * k > view.candidate.alpha.abs()
}

fn truth_matches(view: &CandidateView<'_>, pdg: i32, pdg_positive: i32, pdg_negative: i32) -> bool {
    view.candidate.truth.as_ref().is_some_and(|truth| {
        truth.pdg_code == pdg
            && truth.pdg_code_positive == pdg_positive
            && truth.pdg_code_negative == pdg_negative
    })
}
