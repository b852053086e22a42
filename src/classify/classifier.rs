use anyhow::Result;
use async_trait::async_trait;

/// Maps cleaned texts to integer relevance labels.
///
/// The output must have exactly one label per input, in input order.
/// Label 0 means irrelevant; any other value is a relevance tier.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn classify(&self, texts: &[String]) -> Result<Vec<i64>>;
}
