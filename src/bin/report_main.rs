use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::info;
use std::env;
use std::path::PathBuf;

use transport_ai::config::{self, ClientConfig};
use transport_ai::excel_writer;
use transport_ai::models::SelectedFile;
use transport_ai::presenter::{self, ViewMode};
use transport_ai::transport::TransportClient;
use transport_ai::workflow::{SessionState, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    env_logger::init();

    info!("Starting one-shot cluster report...");

    // Usage: cluster-report <csv> [k] [output.xlsx]
    let args: Vec<String> = env::args().collect();
    let csv_path = args
        .get(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Usage: cluster-report <csv> [k] [output.xlsx]"))?;
    let config = ClientConfig::from_env();
    let num_clusters = match args.get(2) {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("'{}' is not a valid number of clusters", raw))?,
        None => config.num_clusters,
    };
    let output_path = match args.get(3) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(format!(
            "cluster_report_{}.xlsx",
            Local::now().format("%Y%m%d%H%M%S")
        )),
    };

    let mut workflow = Workflow::new(
        SessionState::from_config(&config),
        TransportClient::from_config(&config),
    );
    workflow.set_num_clusters(num_clusters);
    workflow.select_file(SelectedFile::new(csv_path.clone()));
    workflow.upload().await;

    let session = workflow.session();
    if !session.error().is_empty() {
        return Err(anyhow!("{}", session.error()));
    }
    let payload = session
        .result()
        .ok_or_else(|| anyhow!("Clustering produced no result"))?;

    println!("{}", presenter::render(Some(payload), ViewMode::Visuals));

    excel_writer::write_result_workbook(&output_path, payload)
        .with_context(|| format!("Failed to write report to {:?}", output_path))?;

    info!("Cluster report completed successfully!");
    println!("\n🎉 Report written to {:?}", output_path);

    Ok(())
}
