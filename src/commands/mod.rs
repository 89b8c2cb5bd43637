//! Operator commands

pub mod docs;
pub mod hybrid_search;
pub mod index;
pub mod semantic_search;
pub mod similar;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use docvault_index::{
    Document, DocumentId, DocumentStore, EngineConfig, LexicalMatcher, OwnerId, SearchService,
    SqliteDocumentStore,
};

/// Configuration, document database and search service for one invocation
pub struct Workspace {
    pub config: EngineConfig,
    pub documents: Arc<SqliteDocumentStore>,
    pub service: SearchService,
}

impl Workspace {
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = EngineConfig::load(config_path).context("Failed to load configuration")?;
        let documents = Arc::new(
            SqliteDocumentStore::open(&config.database)
                .with_context(|| format!("Failed to open {}", config.database.display()))?,
        );
        let service = SearchService::from_config(
            &config,
            Arc::clone(&documents) as Arc<dyn DocumentStore>,
            Arc::clone(&documents) as Arc<dyn LexicalMatcher>,
        );
        Ok(Self {
            config,
            documents,
            service,
        })
    }

    /// Resolve ranked ids to documents, keeping rank order and skipping
    /// documents that no longer exist
    pub fn resolve<T>(
        &self,
        owner: OwnerId,
        ranked: Vec<T>,
        id_of: impl Fn(&T) -> DocumentId,
    ) -> Result<Vec<(T, Document)>> {
        let mut resolved = Vec::with_capacity(ranked.len());
        for item in ranked {
            if let Some(doc) = self.documents.document(owner, id_of(&item))? {
                resolved.push((item, doc));
            }
        }
        Ok(resolved)
    }
}

/// Print ranked documents the way every search command does
pub fn print_ranked(query: &str, rows: &[(f32, Document)]) {
    if rows.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return;
    }

    println!("{} {} results for: {}", "→".dimmed(), rows.len(), query.cyan());
    println!();

    for (i, (score, doc)) in rows.iter().enumerate() {
        let score_str = format!("{:.2}", score);
        let score_colored = if *score > 0.8 {
            score_str.green()
        } else if *score > 0.5 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] {} {}",
            (i + 1).to_string().bold(),
            score_colored,
            doc.title.cyan(),
            format!("#{}", doc.id).dimmed()
        );

        if let Some(content) = doc.content.as_deref().filter(|c| !c.is_empty()) {
            // char-aware truncation
            let preview = if content.chars().count() > 100 {
                format!("{}...", content.chars().take(100).collect::<String>())
            } else {
                content.to_string()
            };
            println!("   {}", preview.dimmed());
        }
        println!();
    }
}

/// JSON rows shared by the search commands
pub fn ranked_json(rows: &[(f32, Document)]) -> serde_json::Value {
    serde_json::Value::Array(
        rows.iter()
            .map(|(score, doc)| {
                serde_json::json!({
                    "id": doc.id,
                    "title": doc.title,
                    "score": score,
                })
            })
            .collect(),
    )
}
