//! Text rendering of a clustering result.
//!
//! Rendering is a pure function of the current payload and the selected view;
//! it never touches the session or the network.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

use crate::models::{ClusterPayload, ClusterResult};

pub const TITLE: &str = "Transport Analysis & Visualization";
pub const NO_VISUALS: &str =
    "No analysis visuals yet. Upload data and run clustering to see analysis plots.";

const ANALYSIS_INFO: [(&str, &str); 3] = [
    (
        "Cluster Visualization",
        "Nairobi pickup locations grouped by cluster with cluster centers.",
    ),
    ("Boxplot Latitude", "Outlier detection for latitude values."),
    ("Boxplot Longitude", "Outlier detection for longitude values."),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Visuals,
    Info,
}

impl ViewMode {
    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Visuals => "Transport Visuals",
            ViewMode::Info => "Analysis Info",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// View selection owned by whoever displays results. Starts on visuals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultView {
    mode: ViewMode,
}

impl ResultView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn switch_to(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn toggle(&mut self) {
        self.mode = match self.mode {
            ViewMode::Visuals => ViewMode::Info,
            ViewMode::Info => ViewMode::Visuals,
        };
    }

    pub fn render(&self, result: Option<&ClusterPayload>) -> String {
        render(result, self.mode)
    }
}

pub fn render(result: Option<&ClusterPayload>, mode: ViewMode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", TITLE, mode);
    match mode {
        ViewMode::Info => render_info(&mut out),
        ViewMode::Visuals => render_visuals(&mut out, result),
    }
    out
}

fn render_info(out: &mut String) {
    for (name, description) in ANALYSIS_INFO {
        let _ = writeln!(out, "  - {}: {}", name, description);
    }
}

fn render_visuals(out: &mut String, result: Option<&ClusterPayload>) {
    if !result.map_or(false, ClusterPayload::has_plots) {
        let _ = writeln!(out, "{}", NO_VISUALS);
    }
    match result {
        None => {}
        Some(ClusterPayload::Parsed(result)) => render_result(out, result),
        Some(ClusterPayload::Unparsed(raw)) => {
            let _ = writeln!(out, "Response could not be interpreted; raw data:");
            let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
            let _ = writeln!(out, "{}", pretty);
        }
    }
}

fn render_result(out: &mut String, result: &ClusterResult) {
    let _ = writeln!(out, "Number of clusters (k): {}", result.num_clusters);
    let _ = writeln!(out, "Cluster centers:");
    for (id, center) in result.centers.iter().enumerate() {
        let _ = writeln!(out, "  {}: {}", id, format_center(center.lat(), center.lon()));
    }
    let _ = writeln!(out, "Cluster counts: {}", format_counts(&result.cluster_counts()));
    let _ = writeln!(out, "Total points: {}", result.total_points());

    if let Some(plots) = &result.plots {
        let _ = writeln!(out, "Plots:");
        for entry in plot_entries(plots) {
            let _ = writeln!(out, "  - {}", entry);
        }
    }
    for violation in result.violations() {
        let _ = writeln!(out, "Warning: {}", violation);
    }
}

pub fn format_center(lat: f64, lon: f64) -> String {
    format!("Lat: {:.6}, Lon: {:.6}", lat, lon)
}

/// `{0: 60, 1: 60}` style rendering of the membership histogram.
pub fn format_counts(counts: &BTreeMap<i64, usize>) -> String {
    let parts: Vec<String> = counts
        .iter()
        .map(|(cluster, count)| format!("{}: {}", cluster, count))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

// Plot payloads are opaque; strings are listed as-is, anything else as compact JSON.
fn plot_entries(plots: &Value) -> Vec<String> {
    let describe = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match plots {
        Value::Array(items) => items.iter().map(describe).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, v)| format!("{}: {}", name, describe(v)))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![describe(other)],
    }
}
