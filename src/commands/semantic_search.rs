//! Semantic search command - meaning-based document search for one owner

use anyhow::Result;
use std::path::Path;

use super::{print_ranked, ranked_json, Workspace};
use docvault_index::OwnerId;

pub fn run(
    config_path: Option<&Path>,
    owner: OwnerId,
    query: &str,
    k: Option<usize>,
    threshold: Option<f32>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let k = k.unwrap_or(ws.config.search.k);
    let threshold = threshold.unwrap_or(ws.config.search.threshold);

    let results = ws.service.semantic_search(owner, query, k, threshold)?;
    let rows: Vec<(f32, _)> = ws
        .resolve(owner, results, |r| r.document_id)?
        .into_iter()
        .map(|(r, doc)| (r.score, doc))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked_json(&rows))?);
    } else {
        print_ranked(query, &rows);
    }
    Ok(())
}
