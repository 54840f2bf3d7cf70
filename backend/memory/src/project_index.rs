//! Project catalog index.
//!
//! Loads a JSON array of projects, embeds each one once at startup and answers
//! `ProjectSearch` queries by brute-force cosine similarity.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use chatitp_core::{ProjectHit, ProjectSearch};

use crate::embeddings::EmbeddingProvider;

/// One catalog row. Accepts both the short and the exported field names.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogProject {
    #[serde(alias = "project_id")]
    pub id: String,
    #[serde(default, alias = "project_name")]
    pub name: String,
    #[serde(default, alias = "elevator_pitch", alias = "description")]
    pub text: String,
}

impl CatalogProject {
    /// Text that gets embedded and handed to the model.
    pub fn document(&self) -> String {
        match (self.name.trim().is_empty(), self.text.trim().is_empty()) {
            (false, false) => format!("{}: {}", self.name.trim(), self.text.trim()),
            (false, true) => self.name.trim().to_string(),
            _ => self.text.trim().to_string(),
        }
    }
}

struct IndexedProject {
    id: String,
    document: String,
    vector: Vec<f32>,
}

pub struct ProjectIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    projects: Vec<IndexedProject>,
}

impl ProjectIndex {
    /// Read the catalog file and embed every project.
    pub async fn load(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read project catalog {:?}", path.as_ref()))?;
        let catalog: Vec<CatalogProject> =
            serde_json::from_str(&raw).context("Failed to parse project catalog")?;
        let index = Self::build(catalog, embedder).await?;
        info!(projects = index.len(), "Project index loaded from {:?}", path.as_ref());
        Ok(index)
    }

    pub async fn build(
        catalog: Vec<CatalogProject>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let documents: Vec<String> = catalog.iter().map(CatalogProject::document).collect();
        let refs: Vec<&str> = documents.iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&refs).await?;
        anyhow::ensure!(
            vectors.len() == catalog.len(),
            "embedder returned {} vectors for {} projects",
            vectors.len(),
            catalog.len()
        );

        let projects = catalog
            .into_iter()
            .zip(documents)
            .zip(vectors)
            .map(|((project, document), vector)| IndexedProject {
                id: project.id,
                document,
                vector,
            })
            .collect();
        Ok(Self { embedder, projects })
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> f32 {
    if v1.len() != v2.len() {
        return 0.0;
    }

    let dot_product: f32 = v1.iter().zip(v2.iter()).map(|(a, b)| a * b).sum();
    let norm_a: f32 = v1.iter().map(|a| a * a).sum::<f32>().sqrt();
    let norm_b: f32 = v2.iter().map(|b| b * b).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[async_trait]
impl ProjectSearch for ProjectIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProjectHit>> {
        if self.projects.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query).await?;

        let mut hits: Vec<ProjectHit> = self
            .projects
            .iter()
            .map(|p| ProjectHit {
                id: p.id.clone(),
                text: p.document.clone(),
                score: cosine_similarity(&query_vector, &p.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        debug!(query = %query, hits = hits.len(), "Project search");
        Ok(hits)
    }
}
