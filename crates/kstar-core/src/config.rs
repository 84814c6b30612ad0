use std::{fmt::Display, fs, path::Path, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    event::EventSelection,
    kinematics::RapidityWindow,
    selection::{K0ShortCuts, MlSelection, PhotonCuts, TopologyCuts, TrackQualityCuts},
    utils::enums::{CollisionSystem, SelectionMode},
    KstarError, KstarResult,
};

/// A scalar configuration value as found in flat key/value configuration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(value) => write!(f, "{}", value),
            ConfigValue::Int(value) => write!(f, "{}", value),
            ConfigValue::Float(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for ConfigValue {
    type Err = KstarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "true" => return Ok(Self::Bool(true)),
            "false" => return Ok(Self::Bool(false)),
            _ => {}
        }
        if let Ok(value) = s.parse::<i64>() {
            return Ok(Self::Int(value));
        }
        s.parse::<f64>()
            .map(Self::Float)
            .map_err(|_| KstarError::ParseError {
                name: s.to_string(),
                object: "ConfigValue".to_string(),
            })
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

fn type_error(key: &str, expected: &str, value: ConfigValue) -> KstarError {
    KstarError::ConfigType {
        key: key.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    }
}

fn as_bool(key: &str, value: ConfigValue) -> KstarResult<bool> {
    match value {
        ConfigValue::Bool(value) => Ok(value),
        other => Err(type_error(key, "bool", other)),
    }
}

fn as_f64(key: &str, value: ConfigValue) -> KstarResult<f64> {
    match value {
        ConfigValue::Float(value) => Ok(value),
        ConfigValue::Int(value) => Ok(value as f64),
        other => Err(type_error(key, "float", other)),
    }
}

fn as_i32(key: &str, value: ConfigValue) -> KstarResult<i32> {
    match value {
        ConfigValue::Int(value) => {
            i32::try_from(value).map_err(|_| type_error(key, "int", value.into()))
        }
        other => Err(type_error(key, "int", other)),
    }
}

fn as_mode(key: &str, value: ConfigValue) -> KstarResult<SelectionMode> {
    Ok(if as_bool(key, value)? {
        SelectionMode::Score
    } else {
        SelectionMode::Cuts
    })
}

/// Full configuration of an [`Analysis`](crate::analysis::Analysis).
///
/// Every block falls back to its defaults when missing from a serialized configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub system: CollisionSystem,
    /// Use generated-level information in batches which carry it.
    pub mc_association: bool,
    pub rapidity: RapidityWindow,
    pub event: EventSelection,
    pub k0_short: K0ShortCuts,
    pub photon: PhotonCuts,
    pub ml: MlSelection,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            system: CollisionSystem::PP,
            mc_association: true,
            rapidity: RapidityWindow::default(),
            event: EventSelection::default(),
            k0_short: K0ShortCuts::default(),
            photon: PhotonCuts::default(),
            ml: MlSelection::default(),
        }
    }
}

impl AnalysisConfig {
    /// Read a configuration from a JSON file (paths are shell-expanded).
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> KstarResult<Self> {
        let path = shellexpand::full(&path.as_ref().to_string_lossy())?.into_owned();
        let config = Self::from_json_str(&fs::read_to_string(&path)?)?;
        log::info!("Loaded configuration from {}", path);
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> KstarResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> KstarResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a flat JSON object of dotted keys and apply it on top of the defaults.
    pub fn from_flat_json_str(json: &str) -> KstarResult<Self> {
        let map: IndexMap<String, ConfigValue> = serde_json::from_str(json)?;
        let mut config = Self::default();
        config.apply_flat(&map)?;
        Ok(config)
    }

    /// Apply flat key/value settings in order. If any entry is invalid, the error for the first
    /// one is returned and `self` is left unchanged.
    pub fn apply_flat(&mut self, settings: &IndexMap<String, ConfigValue>) -> KstarResult<()> {
        let mut updated = self.clone();
        for (key, value) in settings {
            updated.set(key, *value)?;
        }
        *self = updated;
        Ok(())
    }

    /// Set a single value by its flat dotted key, e.g. `v0Selections.v0cospa`.
    ///
    /// Event-selection keys may be given with or without the `eventSelections.` prefix.
    pub fn set(&mut self, key: &str, value: ConfigValue) -> KstarResult<()> {
        let unknown = || KstarError::UnknownConfigKey {
            key: key.to_string(),
        };
        match key {
            "doPPAnalysis" => {
                self.system = if as_bool(key, value)? {
                    CollisionSystem::PP
                } else {
                    CollisionSystem::PbPb
                };
                return Ok(());
            }
            "doMCAssociation" => {
                self.mc_association = as_bool(key, value)?;
                return Ok(());
            }
            "rapidityCut" => {
                self.rapidity.max = as_f64(key, value)?;
                return Ok(());
            }
            _ => {}
        }
        let (group, name) = key.split_once('.').unwrap_or(("eventSelections", key));
        let handled = match group {
            "eventSelections" => set_event(&mut self.event, name, key, value)?,
            "v0Selections" => set_k0_short(&mut self.k0_short, name, key, value)?,
            "photonSelections" => set_photon(&mut self.photon, name, key, value)?,
            "mlConfigurations" => set_ml(&mut self.ml, name, key, value)?,
            _ => false,
        };
        if handled {
            Ok(())
        } else {
            Err(unknown())
        }
    }
}

fn set_event(
    cuts: &mut EventSelection,
    name: &str,
    key: &str,
    value: ConfigValue,
) -> KstarResult<bool> {
    let flag = match name {
        "requireSel8" => &mut cuts.require_sel8,
        "requireTriggerTVX" => &mut cuts.require_trigger_tvx,
        "rejectITSROFBorder" => &mut cuts.reject_its_rof_border,
        "rejectTFBorder" => &mut cuts.reject_tf_border,
        "requireIsVertexITSTPC" => &mut cuts.require_vertex_its_tpc,
        "requireIsGoodZvtxFT0VsPV" => &mut cuts.require_good_zvtx_ft0_vs_pv,
        "requireIsVertexTOFmatched" => &mut cuts.require_vertex_tof_matched,
        "requireIsVertexTRDmatched" => &mut cuts.require_vertex_trd_matched,
        "rejectSameBunchPileup" => &mut cuts.reject_same_bunch_pileup,
        "requireNoCollInTimeRangeStd" => &mut cuts.require_no_coll_in_time_range_standard,
        "requireNoCollInTimeRangeStrict" => &mut cuts.require_no_coll_in_time_range_strict,
        "requireNoCollInTimeRangeNarrow" => &mut cuts.require_no_coll_in_time_range_narrow,
        "requireNoCollInTimeRangeVzDep" => &mut cuts.require_no_coll_in_time_range_vz_dependent,
        "requireNoCollInROFStd" => &mut cuts.require_no_coll_in_rof_standard,
        "requireNoCollInROFStrict" => &mut cuts.require_no_coll_in_rof_strict,
        "requireINEL0" => &mut cuts.require_inel0,
        "requireINEL1" => &mut cuts.require_inel1,
        "useFT0CbasedOccupancy" => &mut cuts.use_ft0c_occupancy,
        _ => {
            let bound = match name {
                "maxZVtxPosition" => &mut cuts.max_z_vertex,
                "minOccupancy" => &mut cuts.min_occupancy,
                "maxOccupancy" => &mut cuts.max_occupancy,
                _ => return Ok(false),
            };
            *bound = as_f64(key, value)?;
            return Ok(true);
        }
    };
    *flag = as_bool(key, value)?;
    Ok(true)
}

fn set_topology(
    cuts: &mut TopologyCuts,
    name: &str,
    key: &str,
    value: ConfigValue,
) -> KstarResult<bool> {
    if name == "v0TypeSelection" {
        cuts.v0_type = as_i32(key, value)?;
        return Ok(true);
    }
    let field = match name {
        "daughterEtaCut" => &mut cuts.daughter_eta_max,
        "v0radius" => &mut cuts.radius_min,
        "v0radiusMax" => &mut cuts.radius_max,
        "dcapostopv" => &mut cuts.dca_pos_to_pv_min,
        "dcanegtopv" => &mut cuts.dca_neg_to_pv_max,
        "v0cospa" => &mut cuts.cos_pa_min,
        "dcav0dau" => &mut cuts.dca_daughters_max,
        "dcav0topv" => &mut cuts.dca_v0_to_pv_min,
        "armPodCut" => &mut cuts.armenteros_k,
        _ => return Ok(false),
    };
    *field = as_f64(key, value)?;
    Ok(true)
}

fn set_tracks(
    cuts: &mut TrackQualityCuts,
    name: &str,
    key: &str,
    value: ConfigValue,
) -> KstarResult<bool> {
    match name {
        "minTPCrows" => cuts.min_tpc_rows = as_i32(key, value)?,
        "minITSclusters" => cuts.min_its_clusters = as_i32(key, value)?,
        "tpcPidNsigmaCut" => cuts.tpc_nsigma_max = as_f64(key, value)?,
        "skipTPConly" => cuts.skip_tpc_only = as_bool(key, value)?,
        "requirePosITSonly" => cuts.require_pos_its_only = as_bool(key, value)?,
        "requireNegITSonly" => cuts.require_neg_its_only = as_bool(key, value)?,
        "rejectPosITSafterburner" => cuts.reject_pos_afterburner = as_bool(key, value)?,
        "rejectNegITSafterburner" => cuts.reject_neg_afterburner = as_bool(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn set_k0_short(
    cuts: &mut K0ShortCuts,
    name: &str,
    key: &str,
    value: ConfigValue,
) -> KstarResult<bool> {
    if set_topology(&mut cuts.topology, name, key, value)?
        || set_tracks(&mut cuts.tracks, name, key, value)?
    {
        return Ok(true);
    }
    let field = match name {
        "v0MassWindow" => &mut cuts.mass_window,
        "compMassRejection" => &mut cuts.competing_mass_rejection,
        "lifetimeCut" => &mut cuts.lifetime_max,
        "maxDeltaTimePion" => &mut cuts.tof_delta_t_max,
        "tofPidNsigmaCutK0Pi" => &mut cuts.tof_nsigma_max,
        _ => return Ok(false),
    };
    *field = as_f64(key, value)?;
    Ok(true)
}

fn set_photon(
    cuts: &mut PhotonCuts,
    name: &str,
    key: &str,
    value: ConfigValue,
) -> KstarResult<bool> {
    if set_topology(&mut cuts.topology, name, key, value)?
        || set_tracks(&mut cuts.tracks, name, key, value)?
    {
        return Ok(true);
    }
    let field = match name {
        "photonZMax" => &mut cuts.conversion_z_max,
        "photonMassMax" => &mut cuts.mass_max,
        _ => return Ok(false),
    };
    *field = as_f64(key, value)?;
    Ok(true)
}

fn set_ml(ml: &mut MlSelection, name: &str, key: &str, value: ConfigValue) -> KstarResult<bool> {
    match name {
        "useK0ShortScores" => ml.k0_short.mode = as_mode(key, value)?,
        "useGammaScores" => ml.gamma.mode = as_mode(key, value)?,
        "calculateK0ShortScores" => ml.k0_short.calculate = as_bool(key, value)?,
        "calculateGammaScores" => ml.gamma.calculate = as_bool(key, value)?,
        "thresholdK0Short" => ml.k0_short.threshold = as_f64(key, value)?,
        "thresholdGamma" => ml.gamma.threshold = as_f64(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}
