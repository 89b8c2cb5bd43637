//! Docs command - manage the bundled document database

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use super::Workspace;
use docvault_index::{DocumentId, OwnerId};

pub fn add(
    config_path: Option<&Path>,
    owner: OwnerId,
    title: &str,
    content: Option<&str>,
    json: bool,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let ws = Workspace::open(config_path)?;
    let id = ws.documents.insert(owner, title, content)?;
    // Persisted indices predate this document.
    ws.service.indices().invalidate(owner)?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "owner_id": owner }));
    } else {
        println!("{} Added document {} ({})", "✓".green().bold(), id.to_string().cyan(), title);
    }
    Ok(())
}

pub fn remove(config_path: Option<&Path>, owner: OwnerId, id: DocumentId, json: bool) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let removed = ws.documents.delete(owner, id)?;
    if removed {
        ws.service.indices().invalidate(owner)?;
    }

    if json {
        println!("{}", serde_json::json!({ "id": id, "removed": removed }));
    } else if removed {
        println!("{} Removed document {}", "✓".green().bold(), id);
    } else {
        println!("{} No document {} for owner {}", "!".yellow().bold(), id, owner);
    }
    Ok(())
}

pub fn list(config_path: Option<&Path>, owner: OwnerId, json: bool) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let docs = ws.documents.list(owner)?;

    if json {
        let rows: Vec<_> = docs
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "title": d.title,
                    "indexable": d.has_content(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("{} Owner {} has no documents", "→".dimmed(), owner);
        return Ok(());
    }
    for doc in &docs {
        let marker = if doc.has_content() {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("{} {} {}", marker, format!("#{}", doc.id).dimmed(), doc.title);
    }
    Ok(())
}
