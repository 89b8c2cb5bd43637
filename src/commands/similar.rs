//! Similar command - documents closest to a given document

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use super::{print_ranked, ranked_json, Workspace};
use docvault_index::{DocumentId, DocumentStore, OwnerId};

pub fn run(
    config_path: Option<&Path>,
    owner: OwnerId,
    document: DocumentId,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let Some(target) = ws.documents.document(owner, document)? else {
        bail!("document {} not found for owner {}", document, owner);
    };

    let similar = ws.service.similar_documents(owner, document, k.unwrap_or(5))?;
    let rows: Vec<(f32, _)> = ws
        .resolve(owner, similar, |r| r.document_id)?
        .into_iter()
        .map(|(r, doc)| (r.score, doc))
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "target_document": { "id": target.id, "title": target.title },
                "similar_documents": ranked_json(&rows),
            }))?
        );
    } else {
        println!("{} Similar to {}", "→".dimmed(), target.title.cyan().bold());
        print_ranked(&target.title, &rows);
    }
    Ok(())
}
