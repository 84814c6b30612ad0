use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{data::Collision, utils::enums::CollisionSystem};

/// A single requirement of the event selection, in evaluation order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventCut {
    Sel8,
    TriggerTvx,
    ItsRofBorder,
    TimeFrameBorder,
    VertexZ,
    VertexItsTpc,
    GoodZvtxFt0VsPv,
    VertexTofMatched,
    VertexTrdMatched,
    SameBunchPileup,
    CollInTimeRangeStandard,
    CollInTimeRangeStrict,
    CollInTimeRangeNarrow,
    CollInTimeRangeVzDependent,
    CollInRofStandard,
    CollInRofStrict,
    /// No primary-vertex contributor in $`|\eta| < 1`$.
    Inel0,
    /// Fewer than two primary-vertex contributors in $`|\eta| < 1`$.
    Inel1,
    MinOccupancy,
    MaxOccupancy,
}

impl EventCut {
    pub const ALL: [EventCut; 20] = [
        EventCut::Sel8,
        EventCut::TriggerTvx,
        EventCut::ItsRofBorder,
        EventCut::TimeFrameBorder,
        EventCut::VertexZ,
        EventCut::VertexItsTpc,
        EventCut::GoodZvtxFt0VsPv,
        EventCut::VertexTofMatched,
        EventCut::VertexTrdMatched,
        EventCut::SameBunchPileup,
        EventCut::CollInTimeRangeStandard,
        EventCut::CollInTimeRangeStrict,
        EventCut::CollInTimeRangeNarrow,
        EventCut::CollInTimeRangeVzDependent,
        EventCut::CollInRofStandard,
        EventCut::CollInRofStrict,
        EventCut::Inel0,
        EventCut::Inel1,
        EventCut::MinOccupancy,
        EventCut::MaxOccupancy,
    ];
}

impl Display for EventCut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventCut::Sel8 => "sel8",
            EventCut::TriggerTvx => "TVX trigger",
            EventCut::ItsRofBorder => "ITS ROF border",
            EventCut::TimeFrameBorder => "TF border",
            EventCut::VertexZ => "vertex z",
            EventCut::VertexItsTpc => "ITS-TPC vertex",
            EventCut::GoodZvtxFt0VsPv => "FT0 vs PV z",
            EventCut::VertexTofMatched => "TOF-matched vertex",
            EventCut::VertexTrdMatched => "TRD-matched vertex",
            EventCut::SameBunchPileup => "same-bunch pile-up",
            EventCut::CollInTimeRangeStandard => "coll. in time range (standard)",
            EventCut::CollInTimeRangeStrict => "coll. in time range (strict)",
            EventCut::CollInTimeRangeNarrow => "coll. in time range (narrow)",
            EventCut::CollInTimeRangeVzDependent => "coll. in time range (vz-dependent)",
            EventCut::CollInRofStandard => "coll. in ROF (standard)",
            EventCut::CollInRofStrict => "coll. in ROF (strict)",
            EventCut::Inel0 => "INEL>0",
            EventCut::Inel1 => "INEL>1",
            EventCut::MinOccupancy => "min. occupancy",
            EventCut::MaxOccupancy => "max. occupancy",
        };
        write!(f, "{}", name)
    }
}

/// Collision-level requirements. Every requirement on an upstream selection bit can be switched
/// off individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSelection {
    pub require_sel8: bool,
    pub require_trigger_tvx: bool,
    pub reject_its_rof_border: bool,
    pub reject_tf_border: bool,
    pub max_z_vertex: f64,
    pub require_vertex_its_tpc: bool,
    pub require_good_zvtx_ft0_vs_pv: bool,
    pub require_vertex_tof_matched: bool,
    pub require_vertex_trd_matched: bool,
    pub reject_same_bunch_pileup: bool,
    pub require_no_coll_in_time_range_standard: bool,
    pub require_no_coll_in_time_range_strict: bool,
    pub require_no_coll_in_time_range_narrow: bool,
    pub require_no_coll_in_time_range_vz_dependent: bool,
    pub require_no_coll_in_rof_standard: bool,
    pub require_no_coll_in_rof_strict: bool,
    pub require_inel0: bool,
    pub require_inel1: bool,
    /// Use the FT0C-based occupancy estimator instead of the track-based one.
    pub use_ft0c_occupancy: bool,
    /// Negative values disable the bound.
    pub min_occupancy: f64,
    /// Negative values disable the bound.
    pub max_occupancy: f64,
}

impl Default for EventSelection {
    fn default() -> Self {
        Self {
            require_sel8: true,
            require_trigger_tvx: true,
            reject_its_rof_border: true,
            reject_tf_border: true,
            max_z_vertex: 10.0,
            require_vertex_its_tpc: false,
            require_good_zvtx_ft0_vs_pv: true,
            require_vertex_tof_matched: false,
            require_vertex_trd_matched: false,
            reject_same_bunch_pileup: true,
            require_no_coll_in_time_range_standard: false,
            require_no_coll_in_time_range_strict: false,
            require_no_coll_in_time_range_narrow: false,
            require_no_coll_in_time_range_vz_dependent: false,
            require_no_coll_in_rof_standard: false,
            require_no_coll_in_rof_strict: false,
            require_inel0: true,
            require_inel1: false,
            use_ft0c_occupancy: false,
            min_occupancy: -1.0,
            max_occupancy: -1.0,
        }
    }
}

impl EventSelection {
    /// The first requirement `collision` fails, or [`None`] if it is accepted.
    pub fn first_failed(&self, collision: &Collision, system: CollisionSystem) -> Option<EventCut> {
        let bits = &collision.selection;
        let flags = [
            (self.require_sel8, bits.sel8, EventCut::Sel8),
            (self.require_trigger_tvx, bits.trigger_tvx, EventCut::TriggerTvx),
            (self.reject_its_rof_border, bits.no_its_rof_border, EventCut::ItsRofBorder),
            (self.reject_tf_border, bits.no_time_frame_border, EventCut::TimeFrameBorder),
        ];
        if let Some(cut) = first_unset(&flags) {
            return Some(cut);
        }
        if !(collision.primary_vertex.z.abs() <= self.max_z_vertex) {
            return Some(EventCut::VertexZ);
        }
        let flags = [
            (self.require_vertex_its_tpc, bits.vertex_its_tpc, EventCut::VertexItsTpc),
            (self.require_good_zvtx_ft0_vs_pv, bits.good_zvtx_ft0_vs_pv, EventCut::GoodZvtxFt0VsPv),
            (self.require_vertex_tof_matched, bits.vertex_tof_matched, EventCut::VertexTofMatched),
            (self.require_vertex_trd_matched, bits.vertex_trd_matched, EventCut::VertexTrdMatched),
            (self.reject_same_bunch_pileup, bits.no_same_bunch_pileup, EventCut::SameBunchPileup),
            (
                self.require_no_coll_in_time_range_standard,
                bits.no_coll_in_time_range_standard,
                EventCut::CollInTimeRangeStandard,
            ),
            (
                self.require_no_coll_in_time_range_strict,
                bits.no_coll_in_time_range_strict,
                EventCut::CollInTimeRangeStrict,
            ),
            (
                self.require_no_coll_in_time_range_narrow,
                bits.no_coll_in_time_range_narrow,
                EventCut::CollInTimeRangeNarrow,
            ),
            (
                self.require_no_coll_in_time_range_vz_dependent,
                bits.no_coll_in_time_range_vz_dependent,
                EventCut::CollInTimeRangeVzDependent,
            ),
            (
                self.require_no_coll_in_rof_standard,
                bits.no_coll_in_rof_standard,
                EventCut::CollInRofStandard,
            ),
            (
                self.require_no_coll_in_rof_strict,
                bits.no_coll_in_rof_strict,
                EventCut::CollInRofStrict,
            ),
        ];
        if let Some(cut) = first_unset(&flags) {
            return Some(cut);
        }
        match system {
            CollisionSystem::PP => {
                if self.require_inel0 && collision.mult_ntracks_pv_eta1 < 1 {
                    return Some(EventCut::Inel0);
                }
                if self.require_inel1 && collision.mult_ntracks_pv_eta1 < 2 {
                    return Some(EventCut::Inel1);
                }
            }
            CollisionSystem::PbPb => {
                let occupancy = if self.use_ft0c_occupancy {
                    collision.ft0c_occupancy
                } else {
                    collision.track_occupancy
                };
                if self.min_occupancy >= 0.0 && !(occupancy >= self.min_occupancy) {
                    return Some(EventCut::MinOccupancy);
                }
                if self.max_occupancy >= 0.0 && !(occupancy <= self.max_occupancy) {
                    return Some(EventCut::MaxOccupancy);
                }
            }
        }
        None
    }

    pub fn is_accepted(&self, collision: &Collision, system: CollisionSystem) -> bool {
        self.first_failed(collision, system).is_none()
    }
}

fn first_unset(flags: &[(bool, bool, EventCut)]) -> Option<EventCut> {
    flags
        .iter()
        .find(|(required, set, _)| *required && !*set)
        .map(|(_, _, cut)| *cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::SelectionBits, utils::vectors::Vec3};

    fn collision() -> Collision {
        Collision {
            primary_vertex: Vec3::new(0.0, 0.0, 3.0),
            mult_ntracks_pv_eta1: 4,
            track_occupancy: 1200.0,
            ft0c_occupancy: 9000.0,
            ..Collision::default()
        }
    }

    #[test]
    fn test_default_collision_is_accepted() {
        let selection = EventSelection::default();
        assert!(selection.is_accepted(&collision(), CollisionSystem::PP));
        assert!(selection.is_accepted(&collision(), CollisionSystem::PbPb));
    }

    #[test]
    fn test_rejects_at_first_failing_stage() {
        let selection = EventSelection::default();
        let mut c = collision();
        c.selection = SelectionBits {
            trigger_tvx: false,
            no_same_bunch_pileup: false,
            ..SelectionBits::all()
        };
        c.primary_vertex.z = 12.0;
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PP),
            Some(EventCut::TriggerTvx)
        );
        c.selection.trigger_tvx = true;
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PP),
            Some(EventCut::VertexZ)
        );
        c.primary_vertex.z = -10.0;
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PP),
            Some(EventCut::SameBunchPileup)
        );
    }

    #[test]
    fn test_disabled_requirements_are_skipped() {
        let selection = EventSelection {
            require_sel8: false,
            ..EventSelection::default()
        };
        let mut c = collision();
        c.selection.sel8 = false;
        c.selection.vertex_trd_matched = false;
        assert!(selection.is_accepted(&c, CollisionSystem::PP));
        let strict = EventSelection {
            require_vertex_trd_matched: true,
            ..selection
        };
        assert_eq!(
            strict.first_failed(&c, CollisionSystem::PP),
            Some(EventCut::VertexTrdMatched)
        );
    }

    #[test]
    fn test_nan_vertex_is_rejected() {
        let mut c = collision();
        c.primary_vertex.z = f64::NAN;
        assert_eq!(
            EventSelection::default().first_failed(&c, CollisionSystem::PP),
            Some(EventCut::VertexZ)
        );
    }

    #[test]
    fn test_pp_and_pbpb_branches_differ() {
        let selection = EventSelection {
            require_inel1: true,
            min_occupancy: 2000.0,
            ..EventSelection::default()
        };
        let mut c = collision();
        c.mult_ntracks_pv_eta1 = 1;
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PP),
            Some(EventCut::Inel1)
        );
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PbPb),
            Some(EventCut::MinOccupancy)
        );
        c.mult_ntracks_pv_eta1 = 0;
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PP),
            Some(EventCut::Inel0)
        );
    }

    #[test]
    fn test_occupancy_estimators_and_bounds() {
        let mut selection = EventSelection {
            max_occupancy: 5000.0,
            ..EventSelection::default()
        };
        let c = collision();
        assert!(selection.is_accepted(&c, CollisionSystem::PbPb));
        selection.use_ft0c_occupancy = true;
        assert_eq!(
            selection.first_failed(&c, CollisionSystem::PbPb),
            Some(EventCut::MaxOccupancy)
        );
        selection.max_occupancy = -1.0;
        assert!(selection.is_accepted(&c, CollisionSystem::PbPb));
    }

    #[test]
    fn test_event_cut_order_and_names() {
        let mut sorted = EventCut::ALL;
        sorted.sort();
        assert_eq!(sorted, EventCut::ALL);
        assert_eq!(EventCut::Inel0.to_string(), "INEL>0");
    }
}
