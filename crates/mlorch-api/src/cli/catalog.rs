//! CLI catalog subcommands: list the loaded workflows, validate a file.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use mlorch_infra::catalog::read_catalog_file;
use mlorch_types::workflow::Catalog;

use crate::http::handlers::workflow::WorkflowSummary;

/// Print the catalog in selection order.
pub fn list_workflows(catalog: &Catalog, json: bool) -> Result<()> {
    let summaries: Vec<WorkflowSummary> =
        catalog.workflows.iter().map(WorkflowSummary::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Selector"),
            Cell::new("Stages"),
            Cell::new("Steps"),
        ]);

    for (index, wf) in summaries.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&wf.name),
            Cell::new(&wf.selector),
            Cell::new(wf.stages),
            Cell::new(wf.steps.join(", ")),
        ]);
    }

    println!();
    println!("  Workflows ({} total, first match wins)", style(summaries.len()).cyan());
    println!();
    println!("{table}");
    println!();

    Ok(())
}

/// Parse and validate a catalog file, reporting the outcome.
pub async fn validate_file(file: &Path, json: bool) -> Result<()> {
    match read_catalog_file(file).await {
        Ok(catalog) => {
            if json {
                let names: Vec<&str> =
                    catalog.workflows.iter().map(|wf| wf.name.as_str()).collect();
                let out = serde_json::json!({
                    "file": file.display().to_string(),
                    "valid": true,
                    "workflows": names,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} {} is valid ({} workflows)",
                    style("✓").green().bold(),
                    style(file.display()).cyan(),
                    catalog.len()
                );
                println!();
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let out = serde_json::json!({
                    "file": file.display().to_string(),
                    "valid": false,
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!("  {} {}", style("✗").red().bold(), e);
                println!();
            }
            Err(e.into())
        }
    }
}
