use anyhow::Result;
use chrono::Local;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use transport_ai::config::{self, ClientConfig};
use transport_ai::excel_writer;
use transport_ai::models::SelectedFile;
use transport_ai::presenter::ResultView;
use transport_ai::transport::TransportClient;
use transport_ai::workflow::{SessionState, StatusMessage, Workflow};

const ACTIONS: [&str; 9] = [
    "Select CSV file",
    "Download sample data",
    "Upload CSV (runs clustering)",
    "Run clustering",
    "Set number of clusters",
    "Switch view",
    "Export results to Excel",
    "Reset session",
    "Quit",
];

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    env_logger::init();

    info!("Starting interactive transport clustering session.");

    let config = ClientConfig::from_env();
    let client = TransportClient::from_config(&config);
    let mut workflow = Workflow::new(SessionState::from_config(&config), client);
    let mut view = ResultView::new();
    let theme = ColorfulTheme::default();

    println!("\n🚌 SDG11 TransportAI KE: smart public transport clustering");
    println!("   Backend: {}", workflow.service().base_url());

    loop {
        print_status(workflow.session());

        let choice = Select::with_theme(&theme)
            .with_prompt("Choose an action")
            .default(0)
            .items(&ACTIONS)
            .interact()?;

        match choice {
            0 => {
                let path: String = Input::with_theme(&theme)
                    .with_prompt("Path to CSV file")
                    .interact_text()?;
                let path = PathBuf::from(path.trim());
                if !path.exists() {
                    println!("⚠️  {:?} does not exist; the upload will fail until it does.", path);
                }
                workflow.select_file(SelectedFile::new(path));
            }
            1 => {
                let dest: String = Input::with_theme(&theme)
                    .with_prompt("Save sample data as")
                    .default("nairobi_taxi_trips.csv".to_string())
                    .interact_text()?;
                let spinner = start_spinner("Downloading sample data...")?;
                let outcome = workflow.service().download_sample(&PathBuf::from(dest.trim())).await;
                spinner.finish_and_clear();
                match outcome {
                    Ok(path) => {
                        println!("✅ Sample data saved to {:?}", path);
                        workflow.select_file(SelectedFile::new(path));
                    }
                    Err(e) => println!("❌ {}", e.user_message()),
                }
            }
            2 => {
                let spinner = start_spinner("Uploading...")?;
                workflow.upload().await;
                spinner.finish_and_clear();
                println!("\n{}", view.render(workflow.session().result()));
            }
            3 => {
                let spinner = start_spinner("Clustering...")?;
                workflow.cluster().await;
                spinner.finish_and_clear();
                println!("\n{}", view.render(workflow.session().result()));
            }
            4 => {
                let k: i64 = Input::with_theme(&theme)
                    .with_prompt("Number of clusters (k)")
                    .default(workflow.session().num_clusters())
                    .interact_text()?;
                workflow.set_num_clusters(k);
            }
            5 => {
                view.toggle();
                println!("\n{}", view.render(workflow.session().result()));
            }
            6 => export_results(&theme, workflow.session())?,
            7 => workflow.session_mut().reset(),
            _ => break,
        }
    }

    info!("Session ended.");
    Ok(())
}

fn print_status(session: &SessionState) {
    println!();
    println!("── Status: {}", session.phase());
    if let Some(file) = session.file() {
        println!("   File: {:?}", file.path());
    }
    if !session.filename().is_empty() {
        println!("   Uploaded as: {}", session.filename());
    }
    println!("   Clusters (k): {}", session.num_clusters());
    match session.message() {
        Some(StatusMessage::Error(message)) => println!("   ❌ {}", message),
        Some(StatusMessage::Success(message)) => println!("   ✅ {}", message),
        None => {}
    }
}

fn start_spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("  {spinner:.blue} [{elapsed_precise}] {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    Ok(spinner)
}

fn export_results(theme: &ColorfulTheme, session: &SessionState) -> Result<()> {
    let Some(payload) = session.result() else {
        println!("❌ No clustering result to export yet.");
        return Ok(());
    };
    let default_name = format!("cluster_results_{}.xlsx", Local::now().format("%Y%m%d%H%M%S"));
    let path: String = Input::with_theme(theme)
        .with_prompt("Export file")
        .default(default_name)
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    match excel_writer::write_result_workbook(&path, payload) {
        Ok(()) => println!("✅ Results written to {:?}", path),
        Err(e) => println!("❌ Export failed: {:#}", e),
    }
    Ok(())
}
