//! Result Seeder: concurrent fan-out over candidate sources, merged into one
//! score-ranked list.
//!
//! All-or-nothing: the first failing source (in request order) fails the
//! whole call. Ties on score keep request order.

use std::future::Future;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::config::SeederConfig;
use crate::error::CanonicalError;

/// One similarity-ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub id: String,
    pub score: f64,
    /// Source that produced the candidate.
    pub source: String,
    pub content: Value,
}

/// External similarity source. Retries and backoff belong here, not in the
/// seeder.
pub trait CandidateSource: Send + Sync {
    fn fetch(
        &self,
        source_id: &str,
        query: &str,
        k: usize,
        filter: Option<&Value>,
    ) -> impl Future<Output = Result<Vec<ScoredCandidate>, CanonicalError>> + Send;
}

/// Fetch from every source concurrently and return the top `k` by score.
///
/// # Errors
///
/// Returns the error of the first failing source in `source_ids` order.
pub async fn seed<C: CandidateSource>(
    source: &C,
    query: &str,
    k: usize,
    filter: Option<&Value>,
    source_ids: &[String],
) -> Result<Vec<ScoredCandidate>, CanonicalError> {
    if k == 0 || source_ids.is_empty() {
        return Ok(Vec::new());
    }

    let fetches = source_ids
        .iter()
        .map(|source_id| source.fetch(source_id, query, k, filter));
    let results = join_all(fetches).await;

    let mut merged = Vec::new();
    for (source_id, result) in source_ids.iter().zip(results) {
        match result {
            Ok(candidates) => merged.extend(candidates),
            Err(err) => {
                tracing::warn!(source_id = %source_id, "seeding failed: {err}");
                return Err(err);
            }
        }
    }

    let before = merged.len();
    merged.retain(|candidate| candidate.score.is_finite());
    if merged.len() < before {
        tracing::debug!(dropped = before - merged.len(), "non-finite candidate scores dropped");
    }

    // stable: equal scores keep source order
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(k);
    Ok(merged)
}

/// [`seed`] bound to a source and the configured limits.
#[derive(Debug, Clone)]
pub struct Seeder<C> {
    source: C,
    config: SeederConfig,
}

impl<C: CandidateSource> Seeder<C> {
    #[must_use]
    pub fn new(source: C, config: SeederConfig) -> Self {
        Self { source, config }
    }

    #[must_use]
    pub fn source(&self) -> &C {
        &self.source
    }

    /// Seed with `k`, or `seeder.default_k` when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Config`] when more than `seeder.max_sources`
    /// sources are requested, otherwise whatever [`seed`] returns.
    pub async fn seed(
        &self,
        query: &str,
        k: Option<usize>,
        filter: Option<&Value>,
        source_ids: &[String],
    ) -> Result<Vec<ScoredCandidate>, CanonicalError> {
        if source_ids.len() > self.config.max_sources {
            return Err(CanonicalError::Config(format!(
                "{} sources requested, seeder.max_sources is {}",
                source_ids.len(),
                self.config.max_sources
            )));
        }
        let k = k.unwrap_or(self.config.default_k);
        let started = std::time::Instant::now();
        let candidates = seed(&self.source, query, k, filter, source_ids).await?;
        tracing::debug!(
            sources = source_ids.len(),
            k,
            returned = candidates.len(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "seeding completed"
        );
        Ok(candidates)
    }
}
