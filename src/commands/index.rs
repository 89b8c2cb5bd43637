//! Index command - rebuild an owner's semantic index or show its state

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::time::Instant;

use super::Workspace;
use docvault_index::search::LoadOutcome;
use docvault_index::OwnerId;

pub fn run(config_path: Option<&Path>, owner: OwnerId, status_only: bool, json: bool) -> Result<()> {
    let ws = Workspace::open(config_path)?;

    if status_only {
        return show_status(&ws, owner, json);
    }

    if !json {
        println!("{} Rebuilding index for owner {}...", "→".dimmed(), owner);
    }

    let start = Instant::now();
    let documents = ws
        .service
        .rebuild_index(owner)
        .with_context(|| format!("Error rebuilding index for owner {}", owner))?;
    let duration_ms = start.elapsed().as_millis();
    let index_dir = ws.service.indices().store().paths().owner_dir(owner);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "owner_id": owner,
                "documents": documents,
                "duration_ms": duration_ms,
                "path": index_dir.display().to_string(),
            })
        );
    } else {
        println!();
        println!(
            "{} Indexed {} documents in {:.2}s",
            "✓".green().bold(),
            documents.to_string().cyan(),
            duration_ms as f64 / 1000.0
        );
        if documents == 0 {
            println!("  {} owner has no documents with content", "→".dimmed());
        }
        println!("  {} Index saved to: {}", "→".dimmed(), index_dir.display());
    }

    Ok(())
}

/// Show what is persisted for an owner
fn show_status(ws: &Workspace, owner: OwnerId, json: bool) -> Result<()> {
    let store = ws.service.indices().store();
    let outcome = store.load(owner, &ws.config.model);

    let (state, detail) = match &outcome {
        LoadOutcome::Loaded(_) => ("ready", None),
        LoadOutcome::Missing => ("missing", None),
        LoadOutcome::Corrupt(reason) => ("corrupt", Some(reason.clone())),
        LoadOutcome::ModelMismatch { found, .. } => {
            ("stale-model", Some(format!("built with {}", found)))
        }
        LoadOutcome::Misaligned {
            vectors,
            document_ids,
        } => (
            "misaligned",
            Some(format!("{} vectors for {} document ids", vectors, document_ids)),
        ),
    };
    let index = match outcome {
        LoadOutcome::Loaded(index) => Some(index),
        _ => None,
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "owner_id": owner,
                "state": state,
                "detail": detail,
                "model": ws.config.model,
                "documents": index.as_ref().map(|i| i.len()),
                "created_at": index.as_ref().map(|i| i.created_at().to_rfc3339()),
                "path": store.paths().owner_dir(owner).display().to_string(),
            })
        );
        return Ok(());
    }

    println!("{}", "Index Status".bold());
    println!();
    let state_colored = match state {
        "ready" => state.green(),
        "missing" => state.yellow(),
        _ => state.red(),
    };
    println!("  {} owner {}: {}", "→".dimmed(), owner, state_colored);
    if let Some(detail) = detail {
        println!("  {} {}", "→".dimmed(), detail.dimmed());
    }
    if let Some(index) = index {
        println!("  {} {} documents indexed", "→".dimmed(), index.len().to_string().cyan());
        println!("  {} model: {}", "→".dimmed(), index.model_name());
        println!(
            "  {} built: {}",
            "→".dimmed(),
            index.created_at().format("%Y-%m-%d %H:%M:%S")
        );
    } else {
        println!(
            "  {} Run {} to build it.",
            "→".dimmed(),
            format!("docvault index --owner {}", owner).cyan()
        );
    }
    Ok(())
}
