//! Hybrid search command - semantic similarity plus keyword matches

use anyhow::{bail, Result};
use std::path::Path;

use super::{print_ranked, ranked_json, Workspace};
use docvault_index::{HybridWeights, OwnerId};

pub fn run(
    config_path: Option<&Path>,
    owner: OwnerId,
    query: &str,
    semantic_weight: Option<f32>,
    keyword_weight: Option<f32>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let defaults = &ws.config.hybrid;
    let weights = HybridWeights::new(
        semantic_weight.unwrap_or(defaults.semantic_weight),
        keyword_weight.unwrap_or(defaults.keyword_weight),
    );
    if !weights.semantic.is_finite() || !weights.keyword.is_finite() {
        bail!("weights must be finite numbers");
    }
    let limit = limit.unwrap_or(defaults.limit);

    let ranked = ws.service.hybrid_search(owner, query, weights, limit)?;
    let rows: Vec<(f32, _)> = ws
        .resolve(owner, ranked, |r| r.document_id)?
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
