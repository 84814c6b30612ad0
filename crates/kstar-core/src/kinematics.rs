use serde::{Deserialize, Serialize};

use crate::{
    data::Candidate,
    utils::{
        abs_within,
        constants::{pdg_mass, MASS_GAMMA, MASS_KAON_NEUTRAL, PDG_K_STAR_892_NEUTRAL},
        vectors::Vec3,
    },
};

/// The summed three-momentum of two candidates.
pub fn pair_momentum(a: &Vec3, b: &Vec3) -> Vec3 {
    a + b
}

/// The invariant mass of two candidates with the given momenta and mass hypotheses.
pub fn pair_mass(a: &Vec3, mass_a: f64, b: &Vec3, mass_b: f64) -> f64 {
    (a.with_mass(mass_a) + b.with_mass(mass_b)).m()
}

/// The rapidity of a particle with momentum `p` and mass `mass`.
pub fn pair_rapidity(p: &Vec3, mass: f64) -> f64 {
    p.with_mass(mass).rapidity()
}

/// Kinematics of a $`K^0_S\gamma`$ pair.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PairKinematics {
    pub momentum: Vec3,
    pub pt: f64,
    pub mass: f64,
    pub rapidity: f64,
}

impl PairKinematics {
    /// Compute the kinematics of a K0-like and a photon-like candidate, assigning the neutral
    /// kaon and photon masses.
    pub fn k0_gamma(k0: &Candidate, photon: &Candidate) -> Self {
        let momentum = pair_momentum(&k0.momentum, &photon.momentum);
        let mass = pair_mass(&k0.momentum, MASS_KAON_NEUTRAL, &photon.momentum, MASS_GAMMA);
        Self {
            momentum,
            pt: momentum.pt(),
            mass,
            rapidity: pair_rapidity(&momentum, mass),
        }
    }
}

/// A symmetric acceptance window in rapidity.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RapidityWindow {
    pub max: f64,
}

impl Default for RapidityWindow {
    fn default() -> Self {
        Self { max: 0.5 }
    }
}

impl RapidityWindow {
    pub fn new(max: f64) -> Self {
        Self { max }
    }
    /// `true` if `|rapidity| <= max`.
    pub fn accepts(&self, rapidity: f64) -> bool {
        abs_within(rapidity, self.max)
    }
}

/// Generated-level kinematics of a pair which passed the truth gate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruePairKinematics {
    pub pdg_code_mother: i32,
    pub pt: f64,
    pub rapidity: f64,
    /// Whether the common mother is a $`K^*(892)^0`$.
    pub true_kstar: bool,
}

/// Apply the generated-level pair requirements.
///
/// Both candidates need a truth record with the same mother, and the rapidity of their summed
/// generated momentum, evaluated with the mother's mass, must lie within `window`. Returns
/// [`None`] for pairs which fail, including mothers with an unknown mass.
pub fn truth_gate(
    k0: &Candidate,
    photon: &Candidate,
    window: &RapidityWindow,
) -> Option<TruePairKinematics> {
    let (k0_truth, photon_truth) = (k0.truth.as_ref()?, photon.truth.as_ref()?);
    if k0_truth.pdg_code_mother != photon_truth.pdg_code_mother {
        return None;
    }
    let pdg_code_mother = k0_truth.pdg_code_mother;
    let Some(mother_mass) = pdg_mass(pdg_code_mother) else {
        log::warn!(
            "No mass known for mother PDG code {} of V0s {} and {}, dropping pair",
            pdg_code_mother,
            k0.id,
            photon.id
        );
        return None;
    };
    let momentum = pair_momentum(&k0_truth.momentum, &photon_truth.momentum);
    let rapidity = pair_rapidity(&momentum, mother_mass);
    if !window.accepts(rapidity) {
        return None;
    }
    Some(TruePairKinematics {
        pdg_code_mother,
        pt: momentum.pt(),
        rapidity,
        true_kstar: pdg_code_mother == PDG_K_STAR_892_NEUTRAL,
    })
}
