//! # kstar-core
//!
//! This is an internal crate used by `kstar`.
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision, clippy::neg_cmp_op_on_partial_ord)]

use thiserror::Error;

/// Collision-level orchestration: event selection, classification, pairing and reporting.
pub mod analysis;
/// Runtime configuration of every selection stage.
pub mod config;
/// Methods for loading and manipulating V0 candidate data.
pub mod data;
/// Collision (event) selection.
pub mod event;
/// Pair kinematics and the pair-level gates.
pub mod kinematics;
/// Enumeration of $`K^0_S`$-photon candidate pairs.
pub mod pairing;
/// Per-candidate classification into the K0-like and photon-like categories.
pub mod selection;
/// Utility functions, enums, and traits
pub mod utils;

pub use crate::analysis::{
    Analysis, AnalysisTally, CollisionOutcome, CollisionSummary, ReportedPair,
};
pub use crate::config::{AnalysisConfig, ConfigValue};
pub use crate::data::{
    Candidate, CandidateBatch, CandidateView, Collision, DaughterTrack, DetectorMap,
    SelectionBits, TrackRef, TruthInfo,
};
pub use crate::data::io::{read_parquet, write_pairs_parquet, write_parquet, CandidateReadOptions};
pub use crate::event::{EventCut, EventSelection};
pub use crate::kinematics::{PairKinematics, RapidityWindow};
pub use crate::pairing::{build_pairs, shares_daughter, Pair};
pub use crate::selection::{
    Cut, K0ShortCuts, ModelScores, PhotonCuts, ScoreModel, ScoreSource, ScoreThreshold,
    SelectionMasks, Selector, StoredScores,
};
pub use crate::utils::enums::{Category, CollisionSystem, GapSide, SelectionMode};
pub use crate::utils::vectors::{Vec3, Vec4};

/// Set the number of threads in the global [`rayon`] pool.
///
/// This may only be called once, before any parallel work has started.
#[cfg(feature = "rayon")]
pub fn set_num_threads(num_threads: usize) -> KstarResult<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;
    Ok(())
}

pub type KstarResult<T> = Result<T, KstarError>;

/// The error type used by all `kstar` internal methods
#[derive(Error, Debug)]
pub enum KstarError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`parquet::errors::ParquetError`].
    #[error("Parquet Error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
    /// An alias for [`arrow::error::ArrowError`].
    #[error("Arrow Error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// An alias for [`serde_json::Error`].
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// A configuration key which does not name any setting.
    #[error("Unknown configuration key \"{key}\"!")]
    UnknownConfigKey {
        /// The offending key
        key: String,
    },
    /// A configuration value of the wrong type for its key.
    #[error("Configuration key \"{key}\" expects a value of type {expected}, got \"{value}\"!")]
    ConfigType {
        key: String,
        expected: String,
        value: String,
    },
    /// Two sequences which must be parallel have different lengths.
    #[error("Length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },
    /// A required column is absent from an input table.
    #[error("Missing column \"{name}\"")]
    MissingColumn {
        /// Name of the missing column
        name: String,
    },
    /// A column exists but cannot be read as the required type.
    #[error("Column \"{name}\" has unsupported type {datatype}")]
    InvalidColumnType { name: String, datatype: String },
    /// An integer entry which does not fit the type of the field it is read into.
    #[error("Value {value} in column \"{name}\" (row {row}) is out of range")]
    ValueOutOfRange {
        name: String,
        row: usize,
        value: i64,
    },
    /// A candidate refers to a daughter track outside the track arena of its batch.
    #[error("Candidate {candidate} refers to track index {index}, but the batch only holds {n_tracks} tracks")]
    InvalidTrackIndex {
        candidate: u64,
        index: usize,
        n_tracks: usize,
    },
    /// An error type for [`rayon`] thread pools
    #[cfg(feature = "rayon")]
    #[error("Error building thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}

impl Clone for KstarError {
    // Most wrapped error types are not cloneable, so clones keep only the message.
    fn clone(&self) -> Self {
        let err_string = self.to_string();
        KstarError::Custom(err_string)
    }
}
