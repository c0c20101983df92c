use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A CSV file picked by the user, not necessarily uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SelectedFile { path: path.into() }
    }

    /// File name sent in the multipart part; falls back to the full path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Request/response bodies for the two endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRequest {
    pub filename: String,
    pub num_clusters: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_col: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon_col: Option<String>,
}

impl ClusterRequest {
    pub fn new(filename: impl Into<String>, num_clusters: i64) -> Self {
        ClusterRequest {
            filename: filename.into(),
            num_clusters,
            lat_col: None,
            lon_col: None,
        }
    }

    pub fn with_columns(mut self, lat_col: Option<String>, lon_col: Option<String>) -> Self {
        self.lat_col = lat_col;
        self.lon_col = lon_col;
        self
    }
}

/// Body the server sends alongside a non-2xx status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// A cluster center as (latitude, longitude). Its position in `centers` is the cluster id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center(pub f64, pub f64);

impl Center {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lon(&self) -> f64 {
        self.1
    }
}

/// An input point tagged with the index of its cluster. Other fields are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredRecord {
    pub cluster: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub centers: Vec<Center>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub clustered: Vec<ClusteredRecord>,
    // Absent or negative on some server responses; a mismatch shows up in `violations()`.
    #[serde(default)]
    pub num_clusters: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plots: Option<Value>,
}

impl ClusterResult {
    pub fn total_points(&self) -> usize {
        self.data.len()
    }

    /// Membership histogram: how many clustered records carry each cluster id.
    pub fn cluster_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.clustered {
            *counts.entry(record.cluster).or_insert(0) += 1;
        }
        counts
    }

    /// Invariant breaches of the response contract, in the order they are found.
    pub fn violations(&self) -> Vec<ResultViolation> {
        let mut found = Vec::new();
        if self.centers.is_empty() {
            found.push(ResultViolation::EmptyCenters);
        }
        if usize::try_from(self.num_clusters).ok() != Some(self.centers.len()) {
            found.push(ResultViolation::ClusterCountMismatch {
                declared: self.num_clusters,
                centers: self.centers.len(),
            });
        }
        for (index, record) in self.clustered.iter().enumerate() {
            let in_range = usize::try_from(record.cluster)
                .map(|c| c < self.centers.len())
                .unwrap_or(false);
            if !in_range {
                found.push(ResultViolation::ClusterOutOfRange {
                    index,
                    cluster: record.cluster,
                });
            }
        }
        found
    }

    pub fn is_consistent(&self) -> bool {
        self.violations().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultViolation {
    EmptyCenters,
    ClusterCountMismatch { declared: i64, centers: usize },
    ClusterOutOfRange { index: usize, cluster: i64 },
}

impl fmt::Display for ResultViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultViolation::EmptyCenters => write!(f, "response contains no cluster centers"),
            ResultViolation::ClusterCountMismatch { declared, centers } => write!(
                f,
                "num_clusters is {} but {} centers were returned",
                declared, centers
            ),
            ResultViolation::ClusterOutOfRange { index, cluster } => write!(
                f,
                "record {} references cluster {} which has no center",
                index, cluster
            ),
        }
    }
}

/// A successful clustering response after the decode step.
///
/// Bodies that are valid JSON but do not have the `ClusterResult` shape are kept
/// verbatim as `Unparsed` so they can still be shown.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterPayload {
    Parsed(ClusterResult),
    Unparsed(Value),
}

impl ClusterPayload {
    pub fn decode(body: Value) -> Self {
        match serde_json::from_value::<ClusterResult>(body.clone()) {
            Ok(result) => ClusterPayload::Parsed(result),
            Err(e) => {
                log::warn!("Clustering response did not match the expected shape: {}", e);
                ClusterPayload::Unparsed(body)
            }
        }
    }

    pub fn parsed(&self) -> Option<&ClusterResult> {
        match self {
            ClusterPayload::Parsed(result) => Some(result),
            ClusterPayload::Unparsed(_) => None,
        }
    }

    pub fn has_plots(&self) -> bool {
        match self {
            ClusterPayload::Parsed(result) => result.plots.is_some(),
            ClusterPayload::Unparsed(raw) => raw.get("plots").map_or(false, |p| !p.is_null()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_cluster_body() -> Value {
        json!({
            "centers": [[-1.286, 36.817], [-1.301, 36.822]],
            "data": [[-1.28, 36.81], [-1.30, 36.82], [-1.29, 36.82]],
            "clustered": [
                {"pickup_lat": -1.28, "pickup_lon": 36.81, "cluster": 0},
                {"pickup_lat": -1.30, "pickup_lon": 36.82, "cluster": 1},
                {"pickup_lat": -1.29, "pickup_lon": 36.82, "cluster": 1}
            ],
            "labels": [0, 1, 1],
            "num_clusters": 2
        })
    }

    #[test]
    fn decodes_well_formed_result() {
        let payload = ClusterPayload::decode(two_cluster_body());
        let result = payload.parsed().expect("parsed");
        assert_eq!(result.centers.len(), 2);
        assert_eq!(result.centers[1].lat(), -1.301);
        assert_eq!(result.clustered[0].fields["pickup_lon"], json!(36.81));
        assert_eq!(result.labels.as_deref(), Some(&[0, 1, 1][..]));
        assert!(result.is_consistent());
        assert!(!payload.has_plots());
    }

    #[test]
    fn missing_clustered_and_data_default_to_empty() {
        let payload = ClusterPayload::decode(json!({
            "centers": [[1.0, 2.0]],
            "num_clusters": 1
        }));
        let result = payload.parsed().expect("parsed");
        assert!(result.clustered.is_empty());
        assert_eq!(result.total_points(), 0);
        assert!(result.cluster_counts().is_empty());
    }

    #[test]
    fn shape_mismatch_is_kept_unparsed() {
        let body = json!({"message": "ok", "plots": ["a.png"]});
        let payload = ClusterPayload::decode(body.clone());
        assert_eq!(payload, ClusterPayload::Unparsed(body));
        assert!(payload.has_plots());
    }

    #[test]
    fn cluster_counts_sum_to_clustered_len() {
        let payload = ClusterPayload::decode(two_cluster_body());
        let result = payload.parsed().unwrap();
        let counts = result.cluster_counts();
        assert_eq!(counts.get(&0), Some(&1));
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.values().sum::<usize>(), result.clustered.len());
    }

    #[test]
    fn missing_num_clusters_still_parses() {
        let payload = ClusterPayload::decode(json!({
            "centers": [[1.0, 2.0], [3.0, 4.0]],
            "clustered": [{"cluster": 0}, {"cluster": 1}]
        }));
        let result = payload.parsed().expect("parsed");
        assert_eq!(result.num_clusters, 0);
        assert_eq!(result.cluster_counts().len(), 2);
        assert_eq!(
            result.violations(),
            vec![ResultViolation::ClusterCountMismatch { declared: 0, centers: 2 }]
        );
    }

    #[test]
    fn negative_num_clusters_is_a_mismatch() {
        let payload = ClusterPayload::decode(json!({
            "centers": [[1.0, 2.0]],
            "clustered": [{"cluster": 0}],
            "num_clusters": -1
        }));
        assert_eq!(
            payload.parsed().expect("parsed").violations(),
            vec![ResultViolation::ClusterCountMismatch { declared: -1, centers: 1 }]
        );
    }

    #[test]
    fn reports_every_violation() {
        let payload = ClusterPayload::decode(json!({
            "centers": [[1.0, 2.0]],
            "clustered": [{"cluster": 0}, {"cluster": 3}, {"cluster": -1}],
            "num_clusters": 2
        }));
        let violations = payload.parsed().unwrap().violations();
        assert_eq!(
            violations,
            vec![
                ResultViolation::ClusterCountMismatch { declared: 2, centers: 1 },
                ResultViolation::ClusterOutOfRange { index: 1, cluster: 3 },
                ResultViolation::ClusterOutOfRange { index: 2, cluster: -1 },
            ]
        );
    }

    #[test]
    fn empty_centers_is_a_violation() {
        let payload = ClusterPayload::decode(json!({"centers": [], "num_clusters": 0}));
        assert_eq!(
            payload.parsed().unwrap().violations(),
            vec![ResultViolation::EmptyCenters]
        );
    }

    #[test]
    fn cluster_request_omits_unset_columns() {
        let body = serde_json::to_value(ClusterRequest::new("trips.csv", 6)).unwrap();
        assert_eq!(body, json!({"filename": "trips.csv", "num_clusters": 6}));

        let body = serde_json::to_value(
            ClusterRequest::new("trips.csv", 3).with_columns(Some("lat".into()), None),
        )
        .unwrap();
        assert_eq!(body, json!({"filename": "trips.csv", "num_clusters": 3, "lat_col": "lat"}));
    }

    #[test]
    fn selected_file_name_is_the_last_component() {
        let file = SelectedFile::new("/data/in/trips.csv");
        assert_eq!(file.file_name(), "trips.csv");
    }
}
