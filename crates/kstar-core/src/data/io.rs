//! Parquet I/O for candidate tables and reported pairs.
//!
//! Candidate tables are flat: one row per V0 candidate, with the collision and daughter-track
//! information repeated on every row. Rows are grouped into [`CandidateBatch`]es by
//! `collision_id` (in order of first appearance) and daughter tracks are de-duplicated within a
//! collision by their identifier.

use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{
        Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    },
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use indexmap::IndexMap;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};

use super::*;
use crate::analysis::{CollisionSummary, ReportedPair};

const SELECTION_BIT_COLUMNS: [&str; 15] = [
    "sel8",
    "trigger_tvx",
    "no_its_rof_border",
    "no_time_frame_border",
    "vertex_its_tpc",
    "good_zvtx_ft0_vs_pv",
    "vertex_tof_matched",
    "vertex_trd_matched",
    "no_same_bunch_pileup",
    "no_coll_in_time_range_standard",
    "no_coll_in_time_range_strict",
    "no_coll_in_time_range_narrow",
    "no_coll_in_time_range_vz_dependent",
    "no_coll_in_rof_standard",
    "no_coll_in_rof_strict",
];

fn bits_to_array(bits: &SelectionBits) -> [bool; 15] {
    [
        bits.sel8,
        bits.trigger_tvx,
        bits.no_its_rof_border,
        bits.no_time_frame_border,
        bits.vertex_its_tpc,
        bits.good_zvtx_ft0_vs_pv,
        bits.vertex_tof_matched,
        bits.vertex_trd_matched,
        bits.no_same_bunch_pileup,
        bits.no_coll_in_time_range_standard,
        bits.no_coll_in_time_range_strict,
        bits.no_coll_in_time_range_narrow,
        bits.no_coll_in_time_range_vz_dependent,
        bits.no_coll_in_rof_standard,
        bits.no_coll_in_rof_strict,
    ]
}

fn bits_from_array(bits: [bool; 15]) -> SelectionBits {
    SelectionBits {
        sel8: bits[0],
        trigger_tvx: bits[1],
        no_its_rof_border: bits[2],
        no_time_frame_border: bits[3],
        vertex_its_tpc: bits[4],
        good_zvtx_ft0_vs_pv: bits[5],
        vertex_tof_matched: bits[6],
        vertex_trd_matched: bits[7],
        no_same_bunch_pileup: bits[8],
        no_coll_in_time_range_standard: bits[9],
        no_coll_in_time_range_strict: bits[10],
        no_coll_in_time_range_narrow: bits[11],
        no_coll_in_time_range_vz_dependent: bits[12],
        no_coll_in_rof_standard: bits[13],
        no_coll_in_rof_strict: bits[14],
    }
}

fn canonicalize_path(file_path: &str) -> KstarResult<PathBuf> {
    Ok(Path::new(&*shellexpand::full(file_path)?).canonicalize()?)
}

fn expand_output_path(file_path: &str) -> KstarResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(file_path)?))
}

/// Options for reading [`CandidateBatch`]es from a file.
///
/// # See Also
/// [`read_parquet`]
#[derive(Clone, Debug, Default)]
pub struct CandidateReadOptions {
    /// Read the `mc_*` columns and build batches with generated-level information.
    pub truth: bool,
}

impl CandidateReadOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn truth(mut self, truth: bool) -> Self {
        self.truth = truth;
        self
    }
}

/// Load [`CandidateBatch`]es from a Parquet file.
pub fn read_parquet(
    file_path: &str,
    options: &CandidateReadOptions,
) -> KstarResult<Vec<CandidateBatch>> {
    let path = canonicalize_path(file_path)?;
    let file = File::open(&path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut builders = IndexMap::new();
    append_record_batch_stream(reader, options, &mut builders)?;
    let batches = builders
        .into_values()
        .map(|builder| builder.build(options.truth))
        .collect::<KstarResult<Vec<_>>>()?;
    log::info!(
        "Read {} candidates in {} collisions from {}",
        batches.iter().map(CandidateBatch::len).sum::<usize>(),
        batches.len(),
        path.display()
    );
    Ok(batches)
}

/// Persist [`CandidateBatch`]es to a Parquet file in the layout read by [`read_parquet`].
pub fn write_parquet(batches: &[CandidateBatch], file_path: &str) -> KstarResult<()> {
    let path = expand_output_path(file_path)?;
    let rows: Vec<CandidateView<'_>> = batches.iter().flat_map(CandidateBatch::views).collect();
    let mut columns = ColumnSink::new(&rows);

    columns.int("collision_id", |v| v.collision.id as i64);
    columns.float("pv_x", |v| v.collision.primary_vertex.x);
    columns.float("pv_y", |v| v.collision.primary_vertex.y);
    columns.float("pv_z", |v| v.collision.primary_vertex.z);
    for (index, name) in SELECTION_BIT_COLUMNS.iter().enumerate() {
        columns.boolean(name, |v| bits_to_array(&v.collision.selection)[index]);
    }
    columns.int("mult_ntracks_pv_eta1", |v| v.collision.mult_ntracks_pv_eta1 as i64);
    columns.float("centrality_ft0m", |v| v.collision.centrality_ft0m);
    columns.float("centrality_ft0c", |v| v.collision.centrality_ft0c);
    columns.float("track_occupancy", |v| v.collision.track_occupancy);
    columns.float("ft0c_occupancy", |v| v.collision.ft0c_occupancy);
    columns.int("gap_side", |v| v.collision.gap_side as i64);

    columns.int("v0_id", |v| v.candidate.id as i64);
    columns.int("v0_type", |v| v.candidate.v0_type as i64);
    columns.float("px", |v| v.candidate.momentum.x);
    columns.float("py", |v| v.candidate.momentum.y);
    columns.float("pz", |v| v.candidate.momentum.z);
    columns.float("x", |v| v.candidate.decay_vertex.x);
    columns.float("y", |v| v.candidate.decay_vertex.y);
    columns.float("z", |v| v.candidate.decay_vertex.z);
    columns.float("pos_eta", |v| v.candidate.pos_eta);
    columns.float("neg_eta", |v| v.candidate.neg_eta);
    columns.float("v0_radius", |v| v.candidate.v0_radius);
    columns.float("v0_cos_pa", |v| v.candidate.v0_cos_pa);
    columns.float("dca_v0_to_pv", |v| v.candidate.dca_v0_to_pv);
    columns.float("dca_pos_to_pv", |v| v.candidate.dca_pos_to_pv);
    columns.float("dca_neg_to_pv", |v| v.candidate.dca_neg_to_pv);
    columns.float("dca_v0_daughters", |v| v.candidate.dca_v0_daughters);
    columns.float("m_k0_short", |v| v.candidate.m_k0_short);
    columns.float("m_lambda", |v| v.candidate.m_lambda);
    columns.float("m_anti_lambda", |v| v.candidate.m_anti_lambda);
    columns.float("m_gamma", |v| v.candidate.m_gamma);
    columns.float("qt_arm", |v| v.candidate.qt_arm);
    columns.float("alpha", |v| v.candidate.alpha);
    columns.optional_float("pos_tof_delta_t_k0_pi", |v| v.candidate.pos_tof_delta_t_k0_pi);
    columns.optional_float("neg_tof_delta_t_k0_pi", |v| v.candidate.neg_tof_delta_t_k0_pi);
    columns.optional_float("tof_nsigma_k0_pi_plus", |v| v.candidate.tof_nsigma_k0_pi_plus);
    columns.optional_float("tof_nsigma_k0_pi_minus", |v| v.candidate.tof_nsigma_k0_pi_minus);
    columns.optional_float("k0_short_score", |v| v.candidate.k0_short_score);
    columns.optional_float("gamma_score", |v| v.candidate.gamma_score);

    let daughters: [(&str, for<'v> fn(&CandidateView<'v>) -> &'v DaughterTrack); 2] =
        [("pos", |v| v.pos), ("neg", |v| v.neg)];
    for (prefix, daughter) in daughters {
        columns.int(&format!("{prefix}_track_id"), |v| daughter(v).id.0 as i64);
        columns.int(&format!("{prefix}_tpc_crossed_rows"), |v| {
            daughter(v).tpc_crossed_rows as i64
        });
        columns.int(&format!("{prefix}_its_clusters"), |v| daughter(v).its_clusters as i64);
        columns.float(&format!("{prefix}_its_chi2_per_cluster"), |v| {
            daughter(v).its_chi2_per_cluster
        });
        columns.int(&format!("{prefix}_detector_map"), |v| {
            daughter(v).detector_map.0 as i64
        });
        columns.float(&format!("{prefix}_tpc_nsigma_pi"), |v| daughter(v).tpc_nsigma_pi);
        columns.float(&format!("{prefix}_tpc_nsigma_el"), |v| daughter(v).tpc_nsigma_el);
    }

    let truth = |v: &CandidateView<'_>| v.candidate.truth.clone();
    columns.optional_int("mc_pdg_code", |v| truth(v).map(|t| t.pdg_code as i64));
    columns.optional_int("mc_pdg_code_positive", |v| {
        truth(v).map(|t| t.pdg_code_positive as i64)
    });
    columns.optional_int("mc_pdg_code_negative", |v| {
        truth(v).map(|t| t.pdg_code_negative as i64)
    });
    columns.optional_int("mc_pdg_code_mother", |v| {
        truth(v).map(|t| t.pdg_code_mother as i64)
    });
    columns.optional_float("mc_px", |v| truth(v).map(|t| t.momentum.x));
    columns.optional_float("mc_py", |v| truth(v).map(|t| t.momentum.y));
    columns.optional_float("mc_pz", |v| truth(v).map(|t| t.momentum.z));

    columns.write(path)?;
    log::info!(
        "Wrote {} candidates in {} collisions",
        rows.len(),
        batches.len()
    );
    Ok(())
}

/// Persist the reported pairs of accepted collisions to a Parquet file.
pub fn write_pairs_parquet(summaries: &[CollisionSummary], file_path: &str) -> KstarResult<()> {
    let path = expand_output_path(file_path)?;
    let rows: Vec<(&CollisionSummary, &ReportedPair)> = summaries
        .iter()
        .flat_map(|summary| summary.pairs.iter().map(move |pair| (summary, pair)))
        .collect();
    let mut columns = ColumnSink::new(&rows);
    columns.int("collision_id", |(s, _)| s.collision_id as i64);
    columns.float("centrality", |(s, _)| s.centrality);
    columns.optional_int("gap_side", |(s, _)| s.gap_side.map(|gap| gap.code() as i64));
    columns.int("k0_v0_id", |(_, p)| p.k0_id as i64);
    columns.int("photon_v0_id", |(_, p)| p.photon_id as i64);
    columns.float("px", |(_, p)| p.kinematics.momentum.x);
    columns.float("py", |(_, p)| p.kinematics.momentum.y);
    columns.float("pz", |(_, p)| p.kinematics.momentum.z);
    columns.float("pt", |(_, p)| p.kinematics.pt);
    columns.float("mass", |(_, p)| p.kinematics.mass);
    columns.float("rapidity", |(_, p)| p.kinematics.rapidity);
    columns.boolean("true_kstar", |(_, p)| p.true_kstar);
    columns.optional_float("mc_pt", |(_, p)| p.truth.map(|t| t.pt));
    columns.optional_float("mc_rapidity", |(_, p)| p.truth.map(|t| t.rapidity));
    columns.write(path)?;
    log::info!("Wrote {} pairs", rows.len());
    Ok(())
}

/// Collects named columns from a slice of rows and writes them as a single table.
struct ColumnSink<'r, T> {
    rows: &'r [T],
    fields: Vec<Field>,
    arrays: Vec<ArrayRef>,
}

impl<'r, T> ColumnSink<'r, T> {
    fn new(rows: &'r [T]) -> Self {
        Self {
            rows,
            fields: Vec::new(),
            arrays: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, datatype: DataType, nullable: bool, array: ArrayRef) {
        self.fields.push(Field::new(name, datatype, nullable));
        self.arrays.push(array);
    }

    fn float(&mut self, name: &str, f: impl Fn(&T) -> f64) {
        let values: Vec<f64> = self.rows.iter().map(f).collect();
        self.push(name, DataType::Float64, false, Arc::new(Float64Array::from(values)));
    }

    fn optional_float(&mut self, name: &str, f: impl Fn(&T) -> Option<f64>) {
        let values: Vec<Option<f64>> = self.rows.iter().map(f).collect();
        self.push(name, DataType::Float64, true, Arc::new(Float64Array::from(values)));
    }

    fn int(&mut self, name: &str, f: impl Fn(&T) -> i64) {
        let values: Vec<i64> = self.rows.iter().map(f).collect();
        self.push(name, DataType::Int64, false, Arc::new(Int64Array::from(values)));
    }

    fn optional_int(&mut self, name: &str, f: impl Fn(&T) -> Option<i64>) {
        let values: Vec<Option<i64>> = self.rows.iter().map(f).collect();
        self.push(name, DataType::Int64, true, Arc::new(Int64Array::from(values)));
    }

    fn boolean(&mut self, name: &str, f: impl Fn(&T) -> bool) {
        let values: Vec<bool> = self.rows.iter().map(f).collect();
        self.push(name, DataType::Boolean, false, Arc::new(BooleanArray::from(values)));
    }

    fn write(self, path: PathBuf) -> KstarResult<()> {
        let schema = Arc::new(Schema::new(self.fields));
        let batch = RecordBatch::try_new(schema.clone(), self.arrays)?;
        let file = File::create(&path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

enum FloatColumn<'a> {
    F32(&'a Float32Array),
    F64(&'a Float64Array),
}

impl FloatColumn<'_> {
    fn get(&self, row: usize) -> Option<f64> {
        match self {
            Self::F32(array) => (!array.is_null(row)).then(|| array.value(row) as f64),
            Self::F64(array) => (!array.is_null(row)).then(|| array.value(row)),
        }
    }
    /// Null entries read as NaN so that they fail every cut.
    fn value(&self, row: usize) -> f64 {
        self.get(row).unwrap_or(f64::NAN)
    }
}

enum IntValues<'a> {
    I32(&'a Int32Array),
    I64(&'a Int64Array),
}

struct IntColumn<'a> {
    name: String,
    values: IntValues<'a>,
}

impl IntColumn<'_> {
    fn get(&self, row: usize) -> Option<i64> {
        match self.values {
            IntValues::I32(array) => (!array.is_null(row)).then(|| array.value(row) as i64),
            IntValues::I64(array) => (!array.is_null(row)).then(|| array.value(row)),
        }
    }

    fn convert<T: TryFrom<i64>>(&self, row: usize, value: i64) -> KstarResult<T> {
        T::try_from(value).map_err(|_| KstarError::ValueOutOfRange {
            name: self.name.clone(),
            row,
            value,
        })
    }

    /// The entry converted to `T`, or [`None`] if it is null.
    fn get_as<T: TryFrom<i64>>(&self, row: usize) -> KstarResult<Option<T>> {
        self.get(row)
            .map(|value| self.convert(row, value))
            .transpose()
    }

    /// The entry converted to `T`, with null entries read as zero.
    fn value_as<T: TryFrom<i64>>(&self, row: usize) -> KstarResult<T> {
        self.convert(row, self.get(row).unwrap_or_default())
    }
}

fn downcast<'a, A: 'static>(column: &'a ArrayRef, name: &str) -> KstarResult<&'a A> {
    column
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| KstarError::InvalidColumnType {
            name: name.to_string(),
            datatype: column.data_type().to_string(),
        })
}

fn find_float_column<'a>(batch: &'a RecordBatch, name: &str) -> KstarResult<Option<FloatColumn<'a>>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    match column.data_type() {
        DataType::Float32 => Ok(Some(FloatColumn::F32(downcast(column, name)?))),
        DataType::Float64 => Ok(Some(FloatColumn::F64(downcast(column, name)?))),
        other => Err(KstarError::InvalidColumnType {
            name: name.to_string(),
            datatype: other.to_string(),
        }),
    }
}

fn find_int_column<'a>(batch: &'a RecordBatch, name: &str) -> KstarResult<Option<IntColumn<'a>>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let values = match column.data_type() {
        DataType::Int32 => IntValues::I32(downcast(column, name)?),
        DataType::Int64 => IntValues::I64(downcast(column, name)?),
        other => {
            return Err(KstarError::InvalidColumnType {
                name: name.to_string(),
                datatype: other.to_string(),
            })
        }
    };
    Ok(Some(IntColumn {
        name: name.to_string(),
        values,
    }))
}

fn find_bool_column<'a>(batch: &'a RecordBatch, name: &str) -> KstarResult<Option<&'a BooleanArray>> {
    batch
        .column_by_name(name)
        .map(|column| downcast(column, name))
        .transpose()
}

fn missing(name: &str) -> KstarError {
    KstarError::MissingColumn {
        name: name.to_string(),
    }
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> KstarResult<FloatColumn<'a>> {
    find_float_column(batch, name)?.ok_or_else(|| missing(name))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> KstarResult<IntColumn<'a>> {
    find_int_column(batch, name)?.ok_or_else(|| missing(name))
}

struct CollisionColumns<'a> {
    id: IntColumn<'a>,
    primary_vertex: [Option<FloatColumn<'a>>; 3],
    bits: Vec<Option<&'a BooleanArray>>,
    mult_ntracks_pv_eta1: Option<IntColumn<'a>>,
    centrality_ft0m: Option<FloatColumn<'a>>,
    centrality_ft0c: Option<FloatColumn<'a>>,
    track_occupancy: Option<FloatColumn<'a>>,
    ft0c_occupancy: Option<FloatColumn<'a>>,
    gap_side: Option<IntColumn<'a>>,
}

impl<'a> CollisionColumns<'a> {
    fn prepare(batch: &'a RecordBatch) -> KstarResult<Self> {
        Ok(Self {
            id: int_column(batch, "collision_id")?,
            primary_vertex: [
                find_float_column(batch, "pv_x")?,
                find_float_column(batch, "pv_y")?,
                find_float_column(batch, "pv_z")?,
            ],
            bits: SELECTION_BIT_COLUMNS
                .iter()
                .map(|name| find_bool_column(batch, name))
                .collect::<KstarResult<Vec<_>>>()?,
            mult_ntracks_pv_eta1: find_int_column(batch, "mult_ntracks_pv_eta1")?,
            centrality_ft0m: find_float_column(batch, "centrality_ft0m")?,
            centrality_ft0c: find_float_column(batch, "centrality_ft0c")?,
            track_occupancy: find_float_column(batch, "track_occupancy")?,
            ft0c_occupancy: find_float_column(batch, "ft0c_occupancy")?,
            gap_side: find_int_column(batch, "gap_side")?,
        })
    }

    fn collision(&self, row: usize) -> KstarResult<Collision> {
        let default = Collision::default();
        let float_or = |column: &Option<FloatColumn<'_>>, fallback: f64| {
            column.as_ref().and_then(|c| c.get(row)).unwrap_or(fallback)
        };
        let int_or = |column: &Option<IntColumn<'_>>, fallback: i32| -> KstarResult<i32> {
            match column {
                Some(column) => Ok(column.get_as(row)?.unwrap_or(fallback)),
                None => Ok(fallback),
            }
        };
        let mut bits = bits_to_array(&default.selection);
        for (bit, column) in bits.iter_mut().zip(&self.bits) {
            if let Some(array) = column {
                *bit = !array.is_null(row) && array.value(row);
            }
        }
        Ok(Collision {
            id: self.id.value_as(row)?,
            primary_vertex: Vec3::new(
                float_or(&self.primary_vertex[0], default.primary_vertex.x),
                float_or(&self.primary_vertex[1], default.primary_vertex.y),
                float_or(&self.primary_vertex[2], default.primary_vertex.z),
            ),
            selection: bits_from_array(bits),
            mult_ntracks_pv_eta1: int_or(&self.mult_ntracks_pv_eta1, default.mult_ntracks_pv_eta1)?,
            centrality_ft0m: float_or(&self.centrality_ft0m, default.centrality_ft0m),
            centrality_ft0c: float_or(&self.centrality_ft0c, default.centrality_ft0c),
            track_occupancy: float_or(&self.track_occupancy, default.track_occupancy),
            ft0c_occupancy: float_or(&self.ft0c_occupancy, default.ft0c_occupancy),
            gap_side: int_or(&self.gap_side, default.gap_side)?,
        })
    }
}

struct TrackColumns<'a> {
    id: IntColumn<'a>,
    tpc_crossed_rows: IntColumn<'a>,
    its_clusters: IntColumn<'a>,
    its_chi2_per_cluster: FloatColumn<'a>,
    detector_map: IntColumn<'a>,
    tpc_nsigma_pi: FloatColumn<'a>,
    tpc_nsigma_el: FloatColumn<'a>,
}

impl<'a> TrackColumns<'a> {
    fn prepare(batch: &'a RecordBatch, prefix: &str) -> KstarResult<Self> {
        Ok(Self {
            id: int_column(batch, &format!("{prefix}_track_id"))?,
            tpc_crossed_rows: int_column(batch, &format!("{prefix}_tpc_crossed_rows"))?,
            its_clusters: int_column(batch, &format!("{prefix}_its_clusters"))?,
            its_chi2_per_cluster: float_column(batch, &format!("{prefix}_its_chi2_per_cluster"))?,
            detector_map: int_column(batch, &format!("{prefix}_detector_map"))?,
            tpc_nsigma_pi: float_column(batch, &format!("{prefix}_tpc_nsigma_pi"))?,
            tpc_nsigma_el: float_column(batch, &format!("{prefix}_tpc_nsigma_el"))?,
        })
    }

    fn track(&self, row: usize) -> KstarResult<DaughterTrack> {
        Ok(DaughterTrack {
            id: TrackRef(self.id.value_as(row)?),
            tpc_crossed_rows: self.tpc_crossed_rows.value_as(row)?,
            its_clusters: self.its_clusters.value_as(row)?,
            its_chi2_per_cluster: self.its_chi2_per_cluster.value(row),
            detector_map: DetectorMap(self.detector_map.value_as(row)?),
            tpc_nsigma_pi: self.tpc_nsigma_pi.value(row),
            tpc_nsigma_el: self.tpc_nsigma_el.value(row),
        })
    }
}

struct TruthColumns<'a> {
    pdg_code: IntColumn<'a>,
    pdg_code_positive: IntColumn<'a>,
    pdg_code_negative: IntColumn<'a>,
    pdg_code_mother: IntColumn<'a>,
    momentum: [FloatColumn<'a>; 3],
}

impl<'a> TruthColumns<'a> {
    fn prepare(batch: &'a RecordBatch) -> KstarResult<Self> {
        Ok(Self {
            pdg_code: int_column(batch, "mc_pdg_code")?,
            pdg_code_positive: int_column(batch, "mc_pdg_code_positive")?,
            pdg_code_negative: int_column(batch, "mc_pdg_code_negative")?,
            pdg_code_mother: int_column(batch, "mc_pdg_code_mother")?,
            momentum: [
                float_column(batch, "mc_px")?,
                float_column(batch, "mc_py")?,
                float_column(batch, "mc_pz")?,
            ],
        })
    }

    /// Rows with a null PDG code have no generated-level match.
    fn truth(&self, row: usize) -> KstarResult<Option<TruthInfo>> {
        let Some(pdg_code) = self.pdg_code.get_as(row)? else {
            return Ok(None);
        };
        Ok(Some(TruthInfo {
            pdg_code,
            pdg_code_positive: self.pdg_code_positive.value_as(row)?,
            pdg_code_negative: self.pdg_code_negative.value_as(row)?,
            pdg_code_mother: self.pdg_code_mother.value_as(row)?,
            momentum: Vec3::new(
                self.momentum[0].value(row),
                self.momentum[1].value(row),
                self.momentum[2].value(row),
            ),
        }))
    }
}

#[derive(Default)]
struct BatchBuilder {
    collision: Collision,
    tracks: Vec<DaughterTrack>,
    track_index: HashMap<TrackRef, usize>,
    candidates: Vec<Candidate>,
}

impl BatchBuilder {
    fn add_track(&mut self, track: DaughterTrack) -> usize {
        *self.track_index.entry(track.id).or_insert_with(|| {
            self.tracks.push(track);
            self.tracks.len() - 1
        })
    }

    fn build(self, truth: bool) -> KstarResult<CandidateBatch> {
        if truth {
            CandidateBatch::new_with_truth(self.collision, self.tracks, self.candidates)
        } else {
            CandidateBatch::new(self.collision, self.tracks, self.candidates)
        }
    }
}

fn append_record_batch(
    batch: &RecordBatch,
    options: &CandidateReadOptions,
    builders: &mut IndexMap<u64, BatchBuilder>,
) -> KstarResult<()> {
    let collisions = CollisionColumns::prepare(batch)?;
    let pos = TrackColumns::prepare(batch, "pos")?;
    let neg = TrackColumns::prepare(batch, "neg")?;
    let truth = if options.truth {
        Some(TruthColumns::prepare(batch)?)
    } else {
        None
    };
    let id = int_column(batch, "v0_id")?;
    let v0_type = int_column(batch, "v0_type")?;
    let mut floats = IndexMap::new();
    for name in [
        "px",
        "py",
        "pz",
        "x",
        "y",
        "z",
        "pos_eta",
        "neg_eta",
        "v0_radius",
        "v0_cos_pa",
        "dca_v0_to_pv",
        "dca_pos_to_pv",
        "dca_neg_to_pv",
        "dca_v0_daughters",
        "m_k0_short",
        "m_lambda",
        "m_anti_lambda",
        "m_gamma",
        "qt_arm",
        "alpha",
    ] {
        floats.insert(name, float_column(batch, name)?);
    }
    let mut optional = IndexMap::new();
    for name in [
        "pos_tof_delta_t_k0_pi",
        "neg_tof_delta_t_k0_pi",
        "tof_nsigma_k0_pi_plus",
        "tof_nsigma_k0_pi_minus",
        "k0_short_score",
        "gamma_score",
    ] {
        optional.insert(name, find_float_column(batch, name)?);
    }

    for row in 0..batch.num_rows() {
        let f = |name: &str| floats[name].value(row);
        let opt = |name: &str| optional[name].as_ref().and_then(|c| c.get(row));
        let collision_id: u64 = collisions.id.value_as(row)?;
        let builder = match builders.entry(collision_id) {
            indexmap::map::Entry::Occupied(entry) => entry.into_mut(),
            indexmap::map::Entry::Vacant(entry) => entry.insert(BatchBuilder {
                collision: collisions.collision(row)?,
                ..BatchBuilder::default()
            }),
        };
        let pos_track = builder.add_track(pos.track(row)?);
        let neg_track = builder.add_track(neg.track(row)?);
        builder.candidates.push(Candidate {
            id: id.value_as(row)?,
            pos_track,
            neg_track,
            v0_type: v0_type.value_as(row)?,
            momentum: Vec3::new(f("px"), f("py"), f("pz")),
            decay_vertex: Vec3::new(f("x"), f("y"), f("z")),
            pos_eta: f("pos_eta"),
            neg_eta: f("neg_eta"),
            v0_radius: f("v0_radius"),
            v0_cos_pa: f("v0_cos_pa"),
            dca_v0_to_pv: f("dca_v0_to_pv"),
            dca_pos_to_pv: f("dca_pos_to_pv"),
            dca_neg_to_pv: f("dca_neg_to_pv"),
            dca_v0_daughters: f("dca_v0_daughters"),
            m_k0_short: f("m_k0_short"),
            m_lambda: f("m_lambda"),
            m_anti_lambda: f("m_anti_lambda"),
            m_gamma: f("m_gamma"),
            qt_arm: f("qt_arm"),
            alpha: f("alpha"),
            pos_tof_delta_t_k0_pi: opt("pos_tof_delta_t_k0_pi"),
            neg_tof_delta_t_k0_pi: opt("neg_tof_delta_t_k0_pi"),
            tof_nsigma_k0_pi_plus: opt("tof_nsigma_k0_pi_plus"),
            tof_nsigma_k0_pi_minus: opt("tof_nsigma_k0_pi_minus"),
            k0_short_score: opt("k0_short_score"),
            gamma_score: opt("gamma_score"),
            truth: match &truth {
                Some(columns) => columns.truth(row)?,
                None => None,
            },
        });
    }
    Ok(())
}

fn append_record_batch_stream<I, E>(
    reader: I,
    options: &CandidateReadOptions,
    builders: &mut IndexMap<u64, BatchBuilder>,
) -> KstarResult<()>
where
    I: IntoIterator<Item = Result<RecordBatch, E>>,
    E: Into<KstarError>,
{
    for batch in reader {
        let batch = batch.map_err(Into::into)?;
        append_record_batch(&batch, options, builders)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use super::*;
    use crate::{
        analysis::Analysis,
        config::AnalysisConfig,
        data::{test_batch, test_k0_candidate, test_photon_candidate, test_track},
    };

    fn make_temp_dir() -> PathBuf {
        let dir = env::temp_dir().join(format!("kstar_test_{}", fastrand::u64(..)));
        fs::create_dir(&dir).expect("temp dir should be created");
        dir
    }

    fn shared_daughter_batch(id: u64) -> CandidateBatch {
        let mut k0 = test_k0_candidate(10, 0, 1);
        k0.truth = Some(TruthInfo {
            pdg_code: 310,
            pdg_code_positive: 211,
            pdg_code_negative: -211,
            pdg_code_mother: 313,
            momentum: k0.momentum,
        });
        CandidateBatch::new_with_truth(
            Collision {
                id,
                gap_side: 2,
                ..Collision::default()
            },
            (0..3).map(test_track).collect(),
            vec![k0, test_photon_candidate(11, 1, 2), test_photon_candidate(12, 2, 0)],
        )
        .unwrap()
    }

    #[test]
    fn test_parquet_roundtrip_to_tempfile() {
        let first = test_batch();
        let second = shared_daughter_batch(3);
        let dir = make_temp_dir();
        let path = dir.join("candidates.parquet");
        let path_str = path.to_str().expect("path should be valid UTF-8");
        write_parquet(&[first.clone(), second.clone()], path_str)
            .expect("writing parquet should succeed");

        let reopened = read_parquet(path_str, &CandidateReadOptions::new().truth(true))
            .expect("parquet roundtrip should reopen");
        assert_eq!(reopened.len(), 2);
        assert!(reopened[0].has_truth());
        assert_eq!(reopened[0].collision(), first.collision());
        assert_eq!(reopened[0].candidates(), first.candidates());
        assert_eq!(reopened[0].tracks(), first.tracks());
        assert_eq!(reopened[1], second);

        let reco = read_parquet(path_str, &CandidateReadOptions::new())
            .expect("parquet should reopen without truth");
        assert!(!reco[1].has_truth());
        assert!(reco[1].candidates().iter().all(|c| c.truth.is_none()));
        fs::remove_dir_all(&dir).expect("temp dir cleanup should succeed");
    }

    /// Write a three-row table holding only the required columns (plus the generated momentum),
    /// with `f32` floats and `i32` integers. `overrides` replaces the values of individual integer
    /// columns; names which are not required columns are appended as `i64` columns.
    fn write_minimal_table(path: &Path, overrides: &[(&str, Vec<i64>)]) {
        let fields_f32 = [
            "px",
            "py",
            "pz",
            "x",
            "y",
            "z",
            "pos_eta",
            "neg_eta",
            "v0_radius",
            "v0_cos_pa",
            "dca_v0_to_pv",
            "dca_pos_to_pv",
            "dca_neg_to_pv",
            "dca_v0_daughters",
            "m_k0_short",
            "m_lambda",
            "m_anti_lambda",
            "m_gamma",
            "qt_arm",
            "alpha",
            "pos_its_chi2_per_cluster",
            "pos_tpc_nsigma_pi",
            "pos_tpc_nsigma_el",
            "neg_its_chi2_per_cluster",
            "neg_tpc_nsigma_pi",
            "neg_tpc_nsigma_el",
            "mc_px",
            "mc_py",
            "mc_pz",
        ];
        let fields_i32 = [
            "collision_id",
            "v0_id",
            "v0_type",
            "pos_track_id",
            "pos_tpc_crossed_rows",
            "pos_its_clusters",
            "pos_detector_map",
            "neg_track_id",
            "neg_tpc_crossed_rows",
            "neg_its_clusters",
            "neg_detector_map",
        ];
        let mut fields = Vec::new();
        let mut arrays: Vec<ArrayRef> = Vec::new();
        for name in fields_f32 {
            fields.push(Field::new(name, DataType::Float32, false));
            arrays.push(Arc::new(Float32Array::from(vec![0.5_f32, 1.5, 2.5])));
        }
        for name in fields_i32 {
            let values: Vec<i32> = match overrides.iter().find(|(column, _)| *column == name) {
                Some((_, values)) => values.iter().map(|&value| value as i32).collect(),
                None => match name {
                    "collision_id" => vec![4, 9, 4],
                    "v0_id" => vec![0, 1, 2],
                    "pos_track_id" => vec![100, 101, 100],
                    "neg_track_id" => vec![200, 201, 202],
                    _ => vec![1, 1, 1],
                },
            };
            fields.push(Field::new(name, DataType::Int32, false));
            arrays.push(Arc::new(Int32Array::from(values)));
        }
        for (name, values) in overrides {
            if !fields_i32.contains(name) {
                fields.push(Field::new(*name, DataType::Int64, false));
                arrays.push(Arc::new(Int64Array::from(values.clone())));
            }
        }
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_read_minimal_f32_table() {
        let dir = make_temp_dir();
        let path = dir.join("minimal.parquet");
        write_minimal_table(&path, &[]);

        let batches = read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new()).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].collision().id, 4);
        assert_eq!(batches[1].collision().id, 9);
        assert_eq!(batches[0].len(), 2);
        // pos track 100 is shared by both candidates of collision 4
        assert_eq!(batches[0].tracks().len(), 3);
        assert_eq!(batches[0].candidates()[1].pos_track, 0);
        assert_eq!(batches[0].candidates()[1].id, 2);
        assert_eq!(batches[0].candidates()[1].v0_radius, 2.5);
        assert_eq!(batches[0].collision().selection, SelectionBits::all());
        assert_eq!(batches[0].collision().centrality_ft0m, -1.0);
        assert_eq!(batches[0].candidates()[0].k0_short_score, None);

        let missing = read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new().truth(true));
        assert!(matches!(missing, Err(KstarError::MissingColumn { .. })));
        fs::remove_dir_all(&dir).expect("temp dir cleanup should succeed");
    }

    #[test]
    fn test_out_of_range_integers_are_reported() {
        let dir = make_temp_dir();
        let path = dir.join("detector_map.parquet");
        write_minimal_table(&path, &[("neg_detector_map", vec![8, 300, 8])]);
        match read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new()) {
            Err(KstarError::ValueOutOfRange { name, row, value }) => {
                assert_eq!(name, "neg_detector_map");
                assert_eq!(row, 1);
                assert_eq!(value, 300);
            }
            other => panic!("expected ValueOutOfRange, got {other:?}"),
        }

        let path = dir.join("negative_id.parquet");
        write_minimal_table(&path, &[("pos_track_id", vec![100, -1, 100])]);
        assert!(matches!(
            read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new()),
            Err(KstarError::ValueOutOfRange { .. })
        ));
        fs::remove_dir_all(&dir).expect("temp dir cleanup should succeed");
    }

    #[test]
    fn test_wide_pdg_codes_are_reported() {
        let dir = make_temp_dir();
        let path = dir.join("truth.parquet");
        let truth_columns = |mother: Vec<i64>| {
            vec![
                ("mc_pdg_code", vec![310, 310, 22]),
                ("mc_pdg_code_positive", vec![211, 211, 11]),
                ("mc_pdg_code_negative", vec![-211, -211, -11]),
                ("mc_pdg_code_mother", mother),
            ]
        };
        write_minimal_table(&path, &truth_columns(vec![313, 313, 313]));
        let batches =
            read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new().truth(true)).unwrap();
        let truth = batches[0].candidates()[1].truth.as_ref().unwrap();
        assert_eq!(truth.pdg_code, 22);
        assert_eq!(truth.pdg_code_mother, 313);

        write_minimal_table(&path, &truth_columns(vec![313, 1 << 40, 313]));
        match read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new().truth(true)) {
            Err(KstarError::ValueOutOfRange { name, row, .. }) => {
                assert_eq!(name, "mc_pdg_code_mother");
                assert_eq!(row, 1);
            }
            other => panic!("expected ValueOutOfRange, got {other:?}"),
        }
        fs::remove_dir_all(&dir).expect("temp dir cleanup should succeed");
    }

    #[test]
    fn test_wrong_column_type_is_reported() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "collision_id",
            DataType::Float64,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Float64Array::from(vec![1.0])) as ArrayRef],
        )
        .unwrap();
        let dir = make_temp_dir();
        let path = dir.join("bad.parquet");
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        match read_parquet(path.to_str().unwrap(), &CandidateReadOptions::new()) {
            Err(KstarError::InvalidColumnType { name, .. }) => assert_eq!(name, "collision_id"),
            other => panic!("expected InvalidColumnType, got {other:?}"),
        }
        fs::remove_dir_all(&dir).expect("temp dir cleanup should succeed");
    }

    #[test]
    fn test_pairs_parquet() {
        let analysis = Analysis::new(AnalysisConfig::default());
        let outcome = analysis.process(&test_batch()).unwrap();
        let summaries: Vec<_> = outcome.summary().into_iter().cloned().collect();
        let dir = make_temp_dir();
        let path = dir.join("pairs.parquet");
        write_pairs_parquet(&summaries, path.to_str().unwrap()).unwrap();

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 1);
        let mass = find_float_column(&batches[0], "mass").unwrap().unwrap();
        assert_eq!(mass.value(0), summaries[0].pairs[0].kinematics.mass);
        let gap = find_int_column(&batches[0], "gap_side").unwrap().unwrap();
        assert_eq!(gap.get(0), None);
        fs::remove_dir_all(&dir).expect("temp dir cleanup should succeed");
    }
}
