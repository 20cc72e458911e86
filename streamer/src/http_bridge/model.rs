use serde::Serialize;
use tactilecore::pipeline::MapSnapshot;
use tactilecore::telemetry::MetricsSnapshot;
use tactilecore::PipelineStatus;

/// Latest filtered map as served by `/map`.
#[derive(Debug, Clone, Serialize)]
pub struct MapReport {
    pub sequence: u64,
    pub rows: usize,
    pub cols: usize,
    pub contact_peak: f32,
    pub drift_applied: bool,
    pub values: Vec<Vec<f32>>,
}

impl From<&MapSnapshot> for MapReport {
    fn from(snapshot: &MapSnapshot) -> Self {
        let (rows, cols) = snapshot.filtered.dim();
        Self {
            sequence: snapshot.sequence,
            rows,
            cols,
            contact_peak: snapshot.contact_peak,
            drift_applied: snapshot.drift_applied,
            values: snapshot
                .filtered
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: PipelineStatus,
    pub latest_sequence: Option<u64>,
    pub metrics: MetricsSnapshot,
}
