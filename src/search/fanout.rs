//! Concurrent dispatch of the lexical and vector branches.
//!
//! Each branch runs as its own task. A branch that errors, times out or
//! panics contributes an empty [`BranchResult`]; it never cancels or fails
//! its sibling, and both are awaited before the caller merges.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::error::{Result, SearchError};
use crate::llm::embeddings::EmbeddingProvider;
use crate::models::Branch;
use crate::search::{BranchResult, LexicalSearch, VectorSearch};

/// Per-branch result budgets derived from the request limit and lexical ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchBudget {
    pub desired_lexical: usize,
    pub desired_vector: usize,
    /// Over-fetch sizes (2× desired) giving the reranker headroom.
    pub fetch_lexical: usize,
    pub fetch_vector: usize,
}

impl BranchBudget {
    /// `desired_lexical = round(limit * ratio)` (ties to even), clamped to `[0, limit]`.
    pub fn split(limit: usize, ratio: f64) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        let desired_lexical = ((limit as f64 * ratio).round_ties_even() as usize).min(limit);
        let desired_vector = limit - desired_lexical;
        Self {
            desired_lexical,
            desired_vector,
            fetch_lexical: desired_lexical * 2,
            fetch_vector: desired_vector * 2,
        }
    }
}

/// Both branch outputs plus their timings.
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    pub lexical: BranchResult,
    pub vector: BranchResult,
    pub lexical_ms: f64,
    pub vector_ms: f64,
    /// Wall time of the whole fan-out (branches overlap).
    pub wall_ms: f64,
}

#[derive(Clone)]
pub struct FanOut {
    lexical: Arc<dyn LexicalSearch>,
    vector: Arc<dyn VectorSearch>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

type BranchTask = JoinHandle<(Result<BranchResult>, f64)>;

impl FanOut {
    pub fn new(
        lexical: Arc<dyn LexicalSearch>,
        vector: Arc<dyn VectorSearch>,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            lexical,
            vector,
            embedder,
            timeout,
        }
    }

    /// Run both branches concurrently. A branch with a zero fetch budget is not invoked.
    pub async fn run(&self, query: &str, budget: &BranchBudget) -> FanOutOutcome {
        let start = Instant::now();

        let lexical_task = (budget.fetch_lexical > 0).then(|| {
            let lexical = self.lexical.clone();
            let query = query.to_string();
            let limit = budget.fetch_lexical;
            tokio::spawn(run_branch(Branch::Bm25, self.timeout, async move {
                lexical.search(&query, limit).await
            }))
        });

        let vector_task = (budget.fetch_vector > 0).then(|| {
            let vector = self.vector.clone();
            let embedder = self.embedder.clone();
            let query = query.to_string();
            let limit = budget.fetch_vector;
            tokio::spawn(run_branch(Branch::Vector, self.timeout, async move {
                let query_vector = embedder.embed(&query).await?;
                vector.search(&query_vector, limit).await
            }))
        });

        let ran = lexical_task.is_some() || vector_task.is_some();
        let (lexical, lexical_ms) = settle(Branch::Bm25, lexical_task).await;
        let (vector, vector_ms) = settle(Branch::Vector, vector_task).await;

        FanOutOutcome {
            lexical,
            vector,
            lexical_ms,
            vector_ms,
            wall_ms: if ran { elapsed_ms(start) } else { 0.0 },
        }
    }
}

async fn run_branch<F>(branch: Branch, timeout: Duration, fut: F) -> (Result<BranchResult>, f64)
where
    F: Future<Output = Result<BranchResult>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::BranchFailure {
            branch,
            message: format!("timed out after {}ms", timeout.as_millis()),
        }),
    };
    (result, elapsed_ms(start))
}

async fn settle(branch: Branch, task: Option<BranchTask>) -> (BranchResult, f64) {
    let Some(task) = task else {
        return (BranchResult::default(), 0.0);
    };
    match task.await {
        Ok((Ok(result), ms)) => (result, ms),
        Ok((Err(e), ms)) => {
            tracing::warn!("Hybrid search sub-task failed ({branch}): {e}");
            (BranchResult::default(), ms)
        }
        Err(e) => {
            tracing::warn!("Hybrid search sub-task aborted ({branch}): {e}");
            (BranchResult::default(), 0.0)
        }
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_split() {
        let budget = BranchBudget::split(4, 0.5);
        assert_eq!(budget.desired_lexical, 2);
        assert_eq!(budget.desired_vector, 2);
        assert_eq!(budget.fetch_lexical, 4);
        assert_eq!(budget.fetch_vector, 4);
    }

    #[test]
    fn test_half_rounds_to_even() {
        // 5 * 0.5 = 2.5 rounds to 2
        let budget = BranchBudget::split(5, 0.5);
        assert_eq!(budget.desired_lexical, 2);
        assert_eq!(budget.desired_vector, 3);
        // 3 * 0.5 = 1.5 rounds to 2
        assert_eq!(BranchBudget::split(3, 0.5).desired_lexical, 2);
    }

    #[test]
    fn test_extreme_ratios() {
        let all_lexical = BranchBudget::split(10, 1.0);
        assert_eq!((all_lexical.desired_lexical, all_lexical.fetch_vector), (10, 0));
        let all_vector = BranchBudget::split(10, 0.0);
        assert_eq!((all_vector.fetch_lexical, all_vector.desired_vector), (0, 10));
    }

    proptest! {
        #[test]
        fn prop_split_sums_to_limit(limit in 0usize..10_000, ratio in 0.0f64..=1.0) {
            let budget = BranchBudget::split(limit, ratio);
            prop_assert_eq!(budget.desired_lexical + budget.desired_vector, limit);
            prop_assert_eq!(budget.fetch_lexical, budget.desired_lexical * 2);
            prop_assert_eq!(budget.fetch_vector, budget.desired_vector * 2);
        }
    }

    #[tokio::test]
    async fn test_both_branches_receive_over_fetch_limits() {
        let lexical = Arc::new(StaticLexical::new(vec![doc("a", 2.0)], 7));
        let vector = Arc::new(StaticVector::new(vec![doc("b", 0.9)], 3));
        let fanout = FanOut::new(
            lexical.clone(),
            vector.clone(),
            Arc::new(FixedEmbedder),
            Duration::from_secs(5),
        );

        let outcome = fanout.run("query", &BranchBudget::split(4, 0.5)).await;
        assert_eq!(outcome.lexical.documents.len(), 1);
        assert_eq!(outcome.lexical.total, 7);
        assert_eq!(outcome.vector.total, 3);
        assert_eq!(outcome.vector.operator.as_deref(), Some("fake_knn"));
        assert_eq!(lexical.last_limit(), Some(4));
        assert_eq!(vector.last_limit(), Some(4));
    }

    #[tokio::test]
    async fn test_zero_budget_branch_is_skipped() {
        let lexical = Arc::new(StaticLexical::new(vec![doc("a", 2.0)], 1));
        let vector = Arc::new(StaticVector::new(vec![doc("b", 0.9)], 1));
        let fanout = FanOut::new(
            lexical.clone(),
            vector.clone(),
            Arc::new(FixedEmbedder),
            Duration::from_secs(5),
        );

        let outcome = fanout.run("query", &BranchBudget::split(3, 1.0)).await;
        assert_eq!(lexical.calls(), 1);
        assert_eq!(vector.calls(), 0);
        assert!(outcome.vector.documents.is_empty());
        assert_eq!(outcome.vector_ms, 0.0);
    }

    #[tokio::test]
    async fn test_failing_branch_is_isolated() {
        let lexical = Arc::new(StaticLexical::new(vec![doc("a", 2.0)], 1));
        let fanout = FanOut::new(
            lexical,
            Arc::new(FailingVector),
            Arc::new(FixedEmbedder),
            Duration::from_secs(5),
        );

        let outcome = fanout.run("query", &BranchBudget::split(2, 0.5)).await;
        assert_eq!(outcome.lexical.documents.len(), 1);
        assert!(outcome.vector.documents.is_empty());
        assert_eq!(outcome.vector.total, 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_vector_branch_only() {
        let lexical = Arc::new(StaticLexical::new(vec![doc("a", 2.0)], 1));
        let vector = Arc::new(StaticVector::new(vec![doc("b", 0.9)], 1));
        let fanout = FanOut::new(
            lexical,
            vector.clone(),
            Arc::new(UnavailableEmbedder),
            Duration::from_secs(5),
        );

        let outcome = fanout.run("query", &BranchBudget::split(2, 0.5)).await;
        assert_eq!(outcome.lexical.documents.len(), 1);
        assert!(outcome.vector.documents.is_empty());
        assert_eq!(vector.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let fanout = FanOut::new(
            Arc::new(SlowLexical(Duration::from_secs(30))),
            Arc::new(StaticVector::new(vec![doc("b", 0.9)], 1)),
            Arc::new(FixedEmbedder),
            Duration::from_millis(50),
        );

        let outcome = fanout.run("query", &BranchBudget::split(2, 0.5)).await;
        assert!(outcome.lexical.documents.is_empty());
        assert_eq!(outcome.vector.documents.len(), 1);
        assert!(outcome.lexical_ms < 5_000.0);
    }

    #[tokio::test]
    async fn test_panicking_branch_is_isolated() {
        let fanout = FanOut::new(
            Arc::new(PanickingLexical),
            Arc::new(StaticVector::new(vec![doc("b", 0.9)], 1)),
            Arc::new(FixedEmbedder),
            Duration::from_secs(5),
        );

        let outcome = fanout.run("query", &BranchBudget::split(2, 0.5)).await;
        assert!(outcome.lexical.documents.is_empty());
        assert_eq!(outcome.vector.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_invokes_nothing() {
        let lexical = Arc::new(StaticLexical::new(vec![doc("a", 2.0)], 1));
        let vector = Arc::new(StaticVector::new(vec![doc("b", 0.9)], 1));
        let fanout = FanOut::new(
            lexical.clone(),
            vector.clone(),
            Arc::new(FixedEmbedder),
            Duration::from_secs(5),
        );

        let outcome = fanout.run("query", &BranchBudget::split(0, 0.5)).await;
        assert_eq!(lexical.calls() + vector.calls(), 0);
        assert_eq!(outcome.wall_ms, 0.0);
    }
}
