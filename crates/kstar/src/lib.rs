//! `kstar` selects $`K^0_S`$ and photon candidates from reconstructed V0 decays and pairs them
//! into $`K^*(892)^0 \to K^0_S\gamma`$ candidates. It is intended to be run over flat tables of
//! V0 candidates, one collision at a time, with every selection threshold configurable at runtime.
//!
//! <div class="warning">
//!
//! This crate is still in an early development phase, and the API is not stable.
//!
//! </div>
//!
//! # Table of Contents
//! - [Key Features](#key-features)
//! - [Quick Start](#quick-start)
//! - [Configuration](#configuration)
//! - [Data Format](#data-format)
//! - [Selection Order](#selection-order)
//!
//! # Key Features
//! * Independent K0-like and photon-like classification of every V0 candidate, by rectangular
//!   cuts or by a classifier score ([`ScoreSource`]).
//! * Pairing of K0-like and photon-like candidates which never pairs a candidate with itself or
//!   with a candidate sharing a daughter track ([`build_pairs`]).
//! * Collision selection with per-criterion rejection reasons ([`EventCut`]).
//! * Generated-level association for simulated data.
//! * Parallel processing of collisions using [`rayon`](https://github.com/rayon-rs/rayon).
//!
//! # Quick Start
//! ```rust,no_run
//! use kstar::{
//!     read_parquet, Analysis, AnalysisConfig, AnalysisTally, CandidateReadOptions, ConfigValue,
//! };
//!
//! # fn main() -> kstar::KstarResult<()> {
//! let mut config = AnalysisConfig::default();
//! config.set("v0Selections.v0cospa", ConfigValue::Float(0.99))?;
//! let batches = read_parquet("candidates.parquet", &CandidateReadOptions::new())?;
//! let outcomes = Analysis::new(config).process_all(&batches)?;
//! for summary in outcomes.iter().filter_map(|outcome| outcome.summary()) {
//!     for pair in &summary.pairs {
//!         println!("{} {}", summary.collision_id, pair.kinematics.mass);
//!     }
//! }
//! println!("{}", AnalysisTally::from_outcomes(&outcomes));
//! # Ok(())
//! # }
//! ```
//!
//! The `kstar-pairs` binary wraps this workflow for use from the command line.
//!
//! # Configuration
//! [`AnalysisConfig`] can be built in code, deserialized from nested JSON
//! ([`AnalysisConfig::from_json_file`]), or overridden with flat `group.key` settings in the
//! style of the `eventSelections`, `v0Selections`, `photonSelections`, and `mlConfigurations`
//! groups ([`AnalysisConfig::apply_flat`]). Unknown keys and mistyped values are rejected.
//!
//! # Data Format
//! Candidate tables are Parquet files with one row per V0 candidate. Collision columns
//! (`collision_id`, `pv_x`, ...) are repeated on every row, and the daughter-track columns are
//! prefixed with `pos_` and `neg_`. Floating-point columns may be stored as either `f32` or
//! `f64`. Simulated tables additionally carry the `mc_*` columns, where a null `mc_pdg_code`
//! marks a candidate without a generated-level match. See [`data::io`] for the complete layout.
//!
//! # Selection Order
//! Each category applies its criteria in a fixed order and reports the first one which fails
//! ([`Selector::first_failed_cut`]), so rejection statistics are comparable between runs.
#![warn(clippy::perf, clippy::style, missing_docs)]
#![allow(clippy::excessive_precision)]

/// Methods for loading and manipulating V0 candidate data.
pub mod data {
    pub use kstar_core::data::{
        io, test_batch, test_k0_candidate, test_photon_candidate, test_track, Candidate,
        CandidateBatch, CandidateView, Collision, DaughterTrack, DetectorMap, SelectionBits,
        TrackRef, TruthInfo,
    };
}
/// Per-candidate classification.
pub mod selection {
    pub use kstar_core::selection::*;
}
/// Collision selection.
pub mod event {
    pub use kstar_core::event::*;
}
/// Pair kinematics and the pair-level gates.
pub mod kinematics {
    pub use kstar_core::kinematics::*;
}
/// Utility functions, enums, and constants.
pub mod utils {
    pub use kstar_core::utils::*;
}

pub use kstar_core::analysis::{
    Analysis, AnalysisTally, CollisionOutcome, CollisionSummary, ReportedPair,
};
pub use kstar_core::config::{AnalysisConfig, ConfigValue};
pub use kstar_core::data::io::{
    read_parquet, write_pairs_parquet, write_parquet, CandidateReadOptions,
};
pub use kstar_core::data::{Candidate, CandidateBatch, CandidateView, Collision, TrackRef};
pub use kstar_core::event::{EventCut, EventSelection};
pub use kstar_core::kinematics::{PairKinematics, RapidityWindow};
pub use kstar_core::pairing::{build_pairs, shares_daughter, Pair};
pub use kstar_core::selection::{
    Cut, ModelScores, ScoreModel, ScoreSource, SelectionMasks, Selector, StoredScores,
};
pub use kstar_core::utils::enums::{Category, CollisionSystem, GapSide, SelectionMode};
pub use kstar_core::utils::vectors::{Vec3, Vec4};
pub use kstar_core::{KstarError, KstarResult};

#[cfg(feature = "rayon")]
pub use kstar_core::set_num_threads;
