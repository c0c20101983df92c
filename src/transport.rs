// transport.rs
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::ClientConfig;
use crate::error::{Endpoint, WorkflowError};
use crate::models::{ClusterPayload, ClusterRequest, ErrorBody, SelectedFile, UploadReceipt};

/// The two remote calls the workflow depends on.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait ClusterService: Send + Sync {
    async fn upload(&self, file: &SelectedFile) -> Result<UploadReceipt, WorkflowError>;
    async fn cluster(&self, request: &ClusterRequest) -> Result<ClusterPayload, WorkflowError>;
}

/// HTTP client for the clustering backend. Holds no session state.
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: Client,
    base_url: String,
}

impl TransportClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        TransportClient { http, base_url }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Where the server publishes a generated plot image.
    pub fn plot_url(&self, name: &str) -> String {
        format!("{}/static/plots/{}", self.base_url, name.trim_start_matches('/'))
    }

    /// Sends the CSV as the multipart field `file`.
    pub async fn upload_file(&self, file: &SelectedFile) -> Result<UploadReceipt, WorkflowError> {
        let endpoint = Endpoint::Upload;
        let bytes = tokio::fs::read(file.path())
            .await
            .map_err(|e| WorkflowError::transport(endpoint, format!("cannot read {:?}: {}", file.path(), e)))?;
        info!("Uploading {} ({} bytes)", file.file_name(), bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file.file_name())
            .mime_str("text/csv")
            .map_err(|e| WorkflowError::transport(endpoint, e))?;
        let form = Form::new().part("file", part);

        let body = send_json(endpoint, self.http.post(self.url(endpoint)).multipart(form)).await?;
        let receipt: UploadReceipt = serde_json::from_value(body)
            .map_err(|e| WorkflowError::transport(endpoint, format!("malformed upload response: {}", e)))?;
        if receipt.filename.is_empty() {
            return Err(WorkflowError::transport(endpoint, "upload response carried an empty filename"));
        }
        info!("Upload confirmed as '{}'", receipt.filename);
        Ok(receipt)
    }

    pub async fn request_clustering(&self, request: &ClusterRequest) -> Result<ClusterPayload, WorkflowError> {
        let endpoint = Endpoint::Cluster;
        debug!("Clustering request: {:?}", request);
        let body = send_json(endpoint, self.http.post(self.url(endpoint)).json(request)).await?;
        let payload = ClusterPayload::decode(body);
        if let Some(result) = payload.parsed() {
            info!(
                "Clustering of '{}' returned {} centers for {} points",
                request.filename,
                result.centers.len(),
                result.total_points()
            );
        }
        Ok(payload)
    }

    /// Downloads the server's demo CSV into `dest`.
    pub async fn download_sample(&self, dest: &Path) -> Result<PathBuf, WorkflowError> {
        let endpoint = Endpoint::SampleData;
        let response = self
            .http
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| WorkflowError::transport(endpoint, e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WorkflowError::transport(endpoint, e))?;
        if !status.is_success() {
            return Err(server_error(endpoint, status.as_u16(), &bytes));
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| WorkflowError::transport(endpoint, format!("cannot write {:?}: {}", dest, e)))?;
        info!("Sample data ({} bytes) saved to {:?}", bytes.len(), dest);
        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl ClusterService for TransportClient {
    async fn upload(&self, file: &SelectedFile) -> Result<UploadReceipt, WorkflowError> {
        self.upload_file(file).await
    }

    async fn cluster(&self, request: &ClusterRequest) -> Result<ClusterPayload, WorkflowError> {
        self.request_clustering(request).await
    }
}

/// Sends the request and returns the JSON body of a 2xx response.
async fn send_json(endpoint: Endpoint, request: RequestBuilder) -> Result<Value, WorkflowError> {
    let response = request.send().await.map_err(|e| {
        warn!("{} request could not be sent: {}", endpoint, e);
        WorkflowError::transport(endpoint, e)
    })?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| WorkflowError::transport(endpoint, e))?;

    if !status.is_success() {
        let err = server_error(endpoint, status.as_u16(), &bytes);
        warn!("{}", err);
        return Err(err);
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| WorkflowError::transport(endpoint, format!("response is not JSON: {}", e)))
}

fn server_error(endpoint: Endpoint, status: u16, body: &[u8]) -> WorkflowError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    if let Some(details) = parsed.details.as_ref() {
        debug!("{} error details: {}", endpoint, details);
    }
    WorkflowError::Server {
        endpoint,
        status,
        message: parsed.error,
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{closed_url, local_client, serve_once};
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn csv_fixture(dir: &tempfile::TempDir) -> SelectedFile {
        let path = dir.path().join("trips.csv");
        std::fs::write(&path, "pickup_lat,pickup_lon\n-1.28,36.81\n-1.30,36.82\n").unwrap();
        SelectedFile::new(path)
    }

    #[tokio::test]
    async fn upload_sends_multipart_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_fixture(&dir);
        let (url, captured) = serve_once(
            200,
            "application/json",
            r#"{"message":"File uploaded successfully","filename":"trips_20240101.csv"}"#,
        );

        let receipt = local_client(url).upload_file(&file).await.unwrap();
        assert_eq!(receipt.filename, "trips_20240101.csv");

        let request = captured.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(request.request_line, "POST /upload HTTP/1.1");
        assert!(request.body.contains(r#"name="file""#));
        assert!(request.body.contains(r#"filename="trips.csv""#));
        assert!(request.body.contains("-1.28,36.81"));
    }

    #[tokio::test]
    async fn upload_rejection_carries_server_message() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_fixture(&dir);
        let (url, _captured) = serve_once(400, "application/json", r#"{"error":"unsupported file type"}"#);

        let err = local_client(url).upload_file(&file).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::Server {
                endpoint: Endpoint::Upload,
                status: 400,
                message: Some("unsupported file type".into()),
            }
        );
        assert_eq!(err.user_message(), "unsupported file type");
    }

    #[tokio::test]
    async fn non_json_error_body_falls_back_to_generic_message() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_fixture(&dir);
        let (url, _captured) = serve_once(500, "text/html", "<h1>boom</h1>");

        let err = local_client(url).upload_file(&file).await.unwrap_err();
        assert_eq!(err.user_message(), "Upload failed.");
    }

    #[tokio::test]
    async fn success_without_filename_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_fixture(&dir);
        let (url, _captured) = serve_once(200, "application/json", r#"{"message":"ok"}"#);

        let err = local_client(url).upload_file(&file).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Transport { endpoint: Endpoint::Upload, .. }));
        assert_eq!(err.user_message(), "Upload error.");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_fixture(&dir);
        let client = local_client(closed_url());

        let err = client.upload_file(&file).await.unwrap_err();
        assert_eq!(err.user_message(), "Upload error.");
        let err = client
            .request_clustering(&ClusterRequest::new("trips.csv", 6))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Clustering error.");
    }

    #[tokio::test]
    async fn cluster_posts_json_and_decodes_result() {
        let body = json!({
            "centers": [[-1.286, 36.817], [-1.301, 36.822]],
            "data": [[-1.28, 36.81], [-1.30, 36.82]],
            "clustered": [{"cluster": 0}, {"cluster": 1}],
            "num_clusters": 2
        });
        let (url, captured) = serve_once(200, "application/json", &body.to_string());

        let payload = local_client(url)
            .request_clustering(&ClusterRequest::new("trips_20240101.csv", 6))
            .await
            .unwrap();
        assert_eq!(payload.parsed().unwrap().num_clusters, 2);

        let request = captured.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(request.request_line, "POST /cluster HTTP/1.1");
        let sent: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(sent, json!({"filename": "trips_20240101.csv", "num_clusters": 6}));
    }

    #[tokio::test]
    async fn cluster_with_unexpected_shape_is_unparsed_not_an_error() {
        let (url, _captured) = serve_once(200, "application/json", r#"{"num_clusters":"two"}"#);

        let payload = local_client(url)
            .request_clustering(&ClusterRequest::new("trips.csv", 2))
            .await
            .unwrap();
        assert_eq!(payload, ClusterPayload::Unparsed(json!({"num_clusters": "two"})));
    }

    #[test]
    fn server_message_survives_structured_details() {
        let body = br#"{"error":"Missing required columns: pickup_lat, pickup_lon","details":{"cols":["a"]}}"#;
        let err = server_error(Endpoint::Cluster, 400, body);
        assert_eq!(err.user_message(), "Missing required columns: pickup_lat, pickup_lon");

        let err = server_error(Endpoint::Upload, 500, br#"{"error":"Failed to save file","details":13}"#);
        assert_eq!(err.user_message(), "Failed to save file");
    }

    #[tokio::test]
    async fn cluster_not_found_uses_server_message() {
        let (url, _captured) = serve_once(404, "application/json", r#"{"error":"File not found"}"#);

        let err = local_client(url)
            .request_clustering(&ClusterRequest::new("missing.csv", 2))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "File not found");
    }

    #[tokio::test]
    async fn sample_data_is_written_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sample.csv");
        let (url, captured) = serve_once(200, "text/csv", "pickup_lat,pickup_lon\n-1.2,36.8\n");

        let written = local_client(url).download_sample(&dest).await.unwrap();
        assert_eq!(written, dest);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "pickup_lat,pickup_lon\n-1.2,36.8\n");
        let request = captured.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(request.request_line, "GET /sample-data HTTP/1.1");
    }

    #[test]
    fn urls_are_joined_without_double_slashes() {
        let client = TransportClient::new("http://localhost:5000/");
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url(Endpoint::Cluster), "http://localhost:5000/cluster");
        assert_eq!(
            client.plot_url("/cluster_plot.png"),
            "http://localhost:5000/static/plots/cluster_plot.png"
        );
    }
}
