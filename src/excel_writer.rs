use anyhow::{bail, Result};
use log::info;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

use crate::models::{ClusterPayload, ClusterResult};

/// Writes a clustering result to an Excel file with Summary, Centers and Clustered sheets.
pub fn write_result_workbook(file_path: &Path, payload: &ClusterPayload) -> Result<()> {
    let Some(result) = payload.parsed() else {
        bail!("Clustering response could not be interpreted; nothing to export");
    };
    info!("Initializing Excel workbook for file: {:?}", file_path);
    let mut workbook = Workbook::new();

    write_summary_sheet(workbook.add_worksheet(), result)?;
    write_centers_sheet(workbook.add_worksheet(), result)?;
    write_clustered_sheet(workbook.add_worksheet(), result)?;

    info!("Saving Excel workbook...");
    workbook.save(file_path)?;
    info!("Excel file saved successfully to {:?}", file_path);
    Ok(())
}

fn write_summary_sheet(sheet: &mut Worksheet, result: &ClusterResult) -> Result<()> {
    sheet.set_name("Summary")?;
    sheet.set_column_width(0, 28)?;
    sheet.set_column_width(1, 22)?;

    let mut row = 0u32;
    sheet.write_string(row, 0, "CLUSTERING SUMMARY")?;
    row += 2;

    sheet.write_string(row, 0, "Number of clusters (k)")?;
    sheet.write_number(row, 1, result.num_clusters as f64)?;
    row += 1;
    sheet.write_string(row, 0, "Total points")?;
    sheet.write_number(row, 1, result.total_points() as f64)?;
    row += 1;
    sheet.write_string(row, 0, "Clustered records")?;
    sheet.write_number(row, 1, result.clustered.len() as f64)?;
    row += 1;

    let violations = result.violations();
    if !violations.is_empty() {
        row += 1;
        sheet.write_string(row, 0, "WARNINGS")?;
        row += 1;
        for violation in &violations {
            sheet.write_string(row, 0, &violation.to_string())?;
            row += 1;
        }
    }

    row += 1;
    sheet.write_string(row, 0, "Generated")?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    sheet.write_string(row, 1, &timestamp)?;

    info!("'Summary' sheet written.");
    Ok(())
}

fn write_centers_sheet(sheet: &mut Worksheet, result: &ClusterResult) -> Result<()> {
    sheet.set_name("Centers")?;
    let coordinate_format = Format::new().set_num_format("0.000000");

    let headers = ["cluster", "latitude", "longitude", "members"];
    for (col_num, header) in headers.iter().enumerate() {
        sheet.write_string(0, col_num as u16, *header)?;
    }

    let counts = result.cluster_counts();
    for (id, center) in result.centers.iter().enumerate() {
        let current_row = (id + 1) as u32; // +1 for header row
        let members = counts.get(&(id as i64)).copied().unwrap_or(0);
        sheet.write_number(current_row, 0, id as f64)?;
        sheet.write_number_with_format(current_row, 1, center.lat(), &coordinate_format)?;
        sheet.write_number_with_format(current_row, 2, center.lon(), &coordinate_format)?;
        sheet.write_number(current_row, 3, members as f64)?;
    }
    info!("'Centers' sheet written with {} rows.", result.centers.len());
    Ok(())
}

fn write_clustered_sheet(sheet: &mut Worksheet, result: &ClusterResult) -> Result<()> {
    sheet.set_name("Clustered")?;

    let columns = record_columns(result);
    sheet.write_string(0, 0, "cluster")?;
    for (col_num, column) in columns.iter().enumerate() {
        sheet.write_string(0, (col_num + 1) as u16, column)?;
    }

    for (row_num, record) in result.clustered.iter().enumerate() {
        let current_row = (row_num + 1) as u32;
        sheet.write_number(current_row, 0, record.cluster as f64)?;
        for (col_num, column) in columns.iter().enumerate() {
            if let Some(value) = record.fields.get(column) {
                write_value(sheet, current_row, (col_num + 1) as u16, value)?;
            }
        }
    }
    info!("'Clustered' sheet written with {} rows.", result.clustered.len());
    Ok(())
}

/// Every field name seen across the clustered records, sorted.
fn record_columns(result: &ClusterResult) -> Vec<String> {
    let names: BTreeSet<&String> = result
        .clustered
        .iter()
        .flat_map(|record| record.fields.keys())
        .collect();
    names.into_iter().cloned().collect()
}

fn write_value(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                sheet.write_number(row, col, f)?;
            }
            None => {
                sheet.write_string(row, col, &n.to_string())?;
            }
        },
        Value::String(s) => {
            sheet.write_string(row, col, s)?;
        }
        other => {
            sheet.write_string(row, col, &other.to_string())?;
        }
    }
    Ok(())
}
