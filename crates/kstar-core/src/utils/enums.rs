use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::KstarError;

/// The two candidate hypotheses a V0 can be selected under.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// A $`K^0_S \to \pi^+\pi^-`$ candidate.
    K0Like,
    /// A photon converted into an $`e^+e^-`$ pair.
    PhotonLike,
}
impl Category {
    pub const ALL: [Category; 2] = [Category::K0Like, Category::PhotonLike];
}
impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::K0Like => write!(f, "K0Short"),
            Category::PhotonLike => write!(f, "Gamma"),
        }
    }
}
impl FromStr for Category {
    type Err = KstarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "k0" | "k0s" | "k0short" | "k0-like" | "k0like" | "kshort" => Ok(Self::K0Like),
            "gamma" | "photon" | "photon-like" | "photonlike" | "g" => Ok(Self::PhotonLike),
            _ => Err(KstarError::ParseError {
                name: s.to_string(),
                object: "Category".to_string(),
            }),
        }
    }
}

/// How candidates of a given [`Category`] are selected.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Topological, kinematic, track-quality and PID cuts.
    #[default]
    Cuts,
    /// A classifier score compared against a threshold.
    Score,
}
impl Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMode::Cuts => write!(f, "cuts"),
            SelectionMode::Score => write!(f, "score"),
        }
    }
}
impl FromStr for SelectionMode {
    type Err = KstarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cuts" | "cut" | "standard" => Ok(Self::Cuts),
            "score" | "scores" | "ml" | "bdt" => Ok(Self::Score),
            _ => Err(KstarError::ParseError {
                name: s.to_string(),
                object: "SelectionMode".to_string(),
            }),
        }
    }
}

/// The colliding system, which decides the centrality estimator and the event-level cuts.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionSystem {
    /// Proton-proton: FT0M centrality and INEL>0/INEL>1 requirements.
    #[default]
    PP,
    /// Lead-lead: FT0C centrality, occupancy cuts and rapidity-gap tagging.
    PbPb,
}
impl Display for CollisionSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionSystem::PP => write!(f, "pp"),
            CollisionSystem::PbPb => write!(f, "Pb-Pb"),
        }
    }
}
impl FromStr for CollisionSystem {
    type Err = KstarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pp" | "p-p" | "proton-proton" => Ok(Self::PP),
            "pbpb" | "pb-pb" | "aa" | "lead-lead" => Ok(Self::PbPb),
            _ => Err(KstarError::ParseError {
                name: s.to_string(),
                object: "CollisionSystem".to_string(),
            }),
        }
    }
}

/// Rapidity-gap classification of an ultra-peripheral collision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GapSide {
    Hadronic,
    /// Gap on the A side only.
    SingleGapA,
    /// Gap on the C side only.
    SingleGapC,
    /// Gaps on both sides.
    DoubleGap,
}
impl GapSide {
    /// Decode the upstream gap code (`0`: A, `1`: C, `2`: both, anything else: hadronic).
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::SingleGapA,
            1 => Self::SingleGapC,
            2 => Self::DoubleGap,
            _ => Self::Hadronic,
        }
    }
    pub fn code(&self) -> i32 {
        match self {
            Self::Hadronic => -1,
            Self::SingleGapA => 0,
            Self::SingleGapC => 1,
            Self::DoubleGap => 2,
        }
    }
}
impl Display for GapSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapSide::Hadronic => write!(f, "Hadronic"),
            GapSide::SingleGapA => write!(f, "SGA"),
            GapSide::SingleGapC => write!(f, "SGC"),
            GapSide::DoubleGap => write!(f, "DG"),
        }
    }
}
