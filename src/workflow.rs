// workflow.rs
use log::{debug, info, warn};
use std::fmt;

use crate::config::ClientConfig;
use crate::error::{WorkflowError, INVALID_CLUSTER_COUNT, NO_FILE_SELECTED, UPLOAD_REQUIRED};
use crate::models::{ClusterPayload, ClusterRequest, SelectedFile, UploadReceipt};
use crate::transport::ClusterService;

pub const UPLOAD_SUCCESS: &str = "File uploaded successfully! Running clustering...";
pub const CLUSTER_SUCCESS: &str = "Clustering completed successfully!";

/// Named states of the upload/cluster workflow, derived from `SessionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoFile,
    FileSelected,
    Uploading,
    Uploaded,
    Clustering,
    ResultReady,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NoFile => "no file",
            Phase::FileSelected => "file selected",
            Phase::Uploading => "uploading",
            Phase::Uploaded => "uploaded",
            Phase::Clustering => "clustering",
            Phase::ResultReady => "result ready",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Cluster,
}

/// Identifies the file selection an upload was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTicket {
    pub selection: u64,
    pub file: SelectedFile,
}

/// Identifies the selection and confirmed filename a clustering call was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTicket {
    pub selection: u64,
    pub request: ClusterRequest,
}

/// A network call a transition asks the driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Upload(UploadTicket),
    Cluster(ClusterTicket),
}

/// The one message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage<'a> {
    Error(&'a str),
    Success(&'a str),
}

/// Everything the workflow knows about the current session.
///
/// Only the transition methods below mutate it. Each of them is defined for every
/// state and returns the network call to make next, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    file: Option<SelectedFile>,
    filename: String,
    num_clusters: i64,
    lat_col: Option<String>,
    lon_col: Option<String>,
    result: Option<ClusterPayload>,
    loading: bool,
    error: String,
    success: String,
    // Bumped on every file selection and reset; completions from older epochs are stale.
    selection: u64,
    in_flight: Option<Operation>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_NUM_CLUSTERS)
    }
}

impl SessionState {
    pub fn new(num_clusters: i64) -> Self {
        SessionState {
            file: None,
            filename: String::new(),
            num_clusters,
            lat_col: None,
            lon_col: None,
            result: None,
            loading: false,
            error: String::new(),
            success: String::new(),
            selection: 0,
            in_flight: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut state = Self::new(config.num_clusters);
        state.set_columns(config.lat_col.clone(), config.lon_col.clone());
        state
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    /// Server-confirmed filename; empty until an upload succeeds.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn num_clusters(&self) -> i64 {
        self.num_clusters
    }

    pub fn result(&self) -> Option<&ClusterPayload> {
        self.result.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn success(&self) -> &str {
        &self.success
    }

    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight
    }

    pub fn message(&self) -> Option<StatusMessage<'_>> {
        if !self.error.is_empty() {
            Some(StatusMessage::Error(&self.error))
        } else if !self.success.is_empty() {
            Some(StatusMessage::Success(&self.success))
        } else {
            None
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.loading, self.in_flight) {
            (true, Some(Operation::Upload)) => Phase::Uploading,
            (true, Some(Operation::Cluster)) => Phase::Clustering,
            _ if self.result.is_some() => Phase::ResultReady,
            _ if !self.filename.is_empty() => Phase::Uploaded,
            _ if self.file.is_some() => Phase::FileSelected,
            _ => Phase::NoFile,
        }
    }

    /// Whether the upload control should be enabled.
    pub fn can_upload(&self) -> bool {
        !self.loading && self.file.is_some()
    }

    /// Whether the clustering control should be enabled.
    pub fn can_cluster(&self) -> bool {
        !self.loading && !self.filename.is_empty()
    }

    /// Picks a new file. Any outstanding call now belongs to a previous selection.
    pub fn select_file(&mut self, file: SelectedFile) {
        info!("Selected file {:?}", file.path());
        self.selection += 1;
        self.file = Some(file);
        self.filename.clear();
        self.result = None;
        self.error.clear();
        self.loading = false;
        self.in_flight = None;
    }

    /// Takes effect on the next clustering request only.
    pub fn set_num_clusters(&mut self, num_clusters: i64) {
        debug!("Number of clusters set to {}", num_clusters);
        self.num_clusters = num_clusters;
    }

    pub fn set_columns(&mut self, lat_col: Option<String>, lon_col: Option<String>) {
        self.lat_col = lat_col;
        self.lon_col = lon_col;
    }

    /// Back to no file, keeping the requested cluster count and columns.
    pub fn reset(&mut self) {
        info!("Session reset");
        self.selection += 1;
        self.file = None;
        self.filename.clear();
        self.result = None;
        self.loading = false;
        self.in_flight = None;
        self.clear_messages();
    }

    pub fn request_upload(&mut self) -> Option<Command> {
        let Some(file) = self.file.clone() else {
            self.reject(NO_FILE_SELECTED);
            return None;
        };
        self.clear_messages();
        // The confirmed name, and any result computed from it, belong to whichever
        // upload finishes next.
        self.filename.clear();
        self.result = None;
        self.loading = true;
        self.in_flight = Some(Operation::Upload);
        Some(Command::Upload(UploadTicket {
            selection: self.selection,
            file,
        }))
    }

    /// Applies an upload outcome. A successful upload chains straight into clustering.
    pub fn complete_upload(
        &mut self,
        ticket: UploadTicket,
        outcome: Result<UploadReceipt, WorkflowError>,
    ) -> Option<Command> {
        if ticket.selection != self.selection {
            warn!(
                "Discarding upload result for {:?}: file selection changed",
                ticket.file.path()
            );
            return None;
        }
        self.loading = false;
        self.in_flight = None;
        match outcome {
            Ok(receipt) => {
                info!("Upload of {} confirmed as '{}'", ticket.file.file_name(), receipt.filename);
                self.filename = receipt.filename;
                self.error.clear();
                self.success = UPLOAD_SUCCESS.to_string();
                self.start_cluster(false)
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                self.fail(&e);
                None
            }
        }
    }

    pub fn request_cluster(&mut self) -> Option<Command> {
        self.start_cluster(true)
    }

    pub fn complete_cluster(
        &mut self,
        ticket: ClusterTicket,
        outcome: Result<ClusterPayload, WorkflowError>,
    ) -> Option<Command> {
        if ticket.selection != self.selection || ticket.request.filename != self.filename {
            warn!(
                "Discarding clustering result for '{}': session moved on",
                ticket.request.filename
            );
            return None;
        }
        self.loading = false;
        self.in_flight = None;
        match outcome {
            Ok(payload) => {
                if let Some(result) = payload.parsed() {
                    for violation in result.violations() {
                        warn!("Clustering result: {}", violation);
                    }
                }
                self.result = Some(payload);
                self.error.clear();
                self.success = CLUSTER_SUCCESS.to_string();
            }
            Err(e) => {
                warn!("Clustering failed: {}", e);
                self.result = None;
                self.fail(&e);
            }
        }
        None
    }

    // The auto-chained call keeps the upload message, which already announces clustering.
    fn start_cluster(&mut self, clear_success: bool) -> Option<Command> {
        if self.filename.is_empty() {
            self.reject(UPLOAD_REQUIRED);
            return None;
        }
        if self.num_clusters < 1 {
            self.reject(INVALID_CLUSTER_COUNT);
            return None;
        }
        self.error.clear();
        if clear_success {
            self.success.clear();
        }
        self.loading = true;
        self.in_flight = Some(Operation::Cluster);
        let request = ClusterRequest::new(self.filename.clone(), self.num_clusters)
            .with_columns(self.lat_col.clone(), self.lon_col.clone());
        info!(
            "Clustering '{}' with k={}",
            request.filename, request.num_clusters
        );
        Some(Command::Cluster(ClusterTicket {
            selection: self.selection,
            request,
        }))
    }

    fn reject(&mut self, message: &str) {
        warn!("Rejected locally: {}", message);
        self.fail(&WorkflowError::guard(message));
    }

    fn fail(&mut self, e: &WorkflowError) {
        self.success.clear();
        self.error = e.user_message();
    }

    fn clear_messages(&mut self) {
        self.error.clear();
        self.success.clear();
    }
}

/// Runs commands produced by the session against a `ClusterService`.
///
/// Calls are awaited one at a time, so transitions never interleave.
pub struct Workflow<S> {
    session: SessionState,
    service: S,
}

impl<S: ClusterService> Workflow<S> {
    pub fn new(session: SessionState, service: S) -> Self {
        Workflow { session, service }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn select_file(&mut self, file: SelectedFile) {
        self.session.select_file(file);
    }

    pub fn set_num_clusters(&mut self, num_clusters: i64) {
        self.session.set_num_clusters(num_clusters);
    }

    /// Uploads the selected file and, on success, clusters it.
    pub async fn upload(&mut self) {
        let command = self.session.request_upload();
        self.execute(command).await;
    }

    pub async fn cluster(&mut self) {
        let command = self.session.request_cluster();
        self.execute(command).await;
    }

    /// Performs `command` and every command its completion chains into.
    pub async fn execute(&mut self, command: Option<Command>) {
        let mut next = command;
        while let Some(command) = next.take() {
            next = match command {
                Command::Upload(ticket) => {
                    let outcome = self.service.upload(&ticket.file).await;
                    self.session.complete_upload(ticket, outcome)
                }
                Command::Cluster(ticket) => {
                    let outcome = self.service.cluster(&ticket.request).await;
                    self.session.complete_cluster(ticket, outcome)
                }
            };
        }
    }
}
