/// Useful enumerations for candidate categories, selection modes and collision systems.
pub mod enums;
/// Plain three- and four-vectors for kinematic calculations.
pub mod vectors;

/// PDG masses (GeV/$`c^2`$) and particle codes used by the selections.
pub mod constants {
    pub const MASS_K0_SHORT: f64 = 0.497611;
    pub const MASS_KAON_NEUTRAL: f64 = 0.497611;
    pub const MASS_LAMBDA: f64 = 1.115683;
    pub const MASS_GAMMA: f64 = 0.0;
    pub const MASS_PION_CHARGED: f64 = 0.13957039;
    pub const MASS_ELECTRON: f64 = 0.000510998950;
    pub const MASS_K_STAR_892_NEUTRAL: f64 = 0.89555;
    pub const MASS_K_STAR_892_CHARGED: f64 = 0.89167;

    pub const PDG_GAMMA: i32 = 22;
    pub const PDG_ELECTRON: i32 = 11;
    pub const PDG_PION_PLUS: i32 = 211;
    pub const PDG_K0_SHORT: i32 = 310;
    pub const PDG_K_STAR_892_NEUTRAL: i32 = 313;
    pub const PDG_K_STAR_892_CHARGED: i32 = 323;

    /// Look up the mass of the few particles this crate knows about by (signed) PDG code.
    pub fn pdg_mass(code: i32) -> Option<f64> {
        match code.checked_abs()? {
            PDG_GAMMA => Some(MASS_GAMMA),
            PDG_ELECTRON => Some(MASS_ELECTRON),
            PDG_PION_PLUS => Some(MASS_PION_CHARGED),
            PDG_K0_SHORT => Some(MASS_K0_SHORT),
            PDG_K_STAR_892_NEUTRAL => Some(MASS_K_STAR_892_NEUTRAL),
            PDG_K_STAR_892_CHARGED => Some(MASS_K_STAR_892_CHARGED),
            _ => None,
        }
    }
}

/// Returns `true` if `|value| <= limit`. Any NaN gives `false`.
#[inline]
pub fn abs_within(value: f64, limit: f64) -> bool {
    value.abs() <= limit
}

/// Returns `true` if `|value| >= minimum`. Any NaN gives `false`.
#[inline]
pub fn abs_at_least(value: f64, minimum: f64) -> bool {
    value.abs() >= minimum
}

#[cfg(test)]
mod tests {
    use super::constants::*;
    use super::*;

    #[test]
    fn test_pdg_mass_lookup() {
        assert_eq!(pdg_mass(313), Some(MASS_K_STAR_892_NEUTRAL));
        assert_eq!(pdg_mass(-313), Some(MASS_K_STAR_892_NEUTRAL));
        assert_eq!(pdg_mass(22), Some(0.0));
        assert_eq!(pdg_mass(3122), None);
        assert_eq!(pdg_mass(i32::MIN), None);
        assert_eq!(pdg_mass(i32::MAX), None);
    }

    #[test]
    fn test_abs_helpers_fail_on_nan() {
        assert!(abs_within(-0.8, 0.8));
        assert!(!abs_within(f64::NAN, 0.8));
        assert!(!abs_within(0.1, f64::NAN));
        assert!(abs_at_least(-0.05, 0.05));
        assert!(!abs_at_least(f64::NAN, 0.05));
    }
}
