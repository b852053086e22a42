// Local ONNX relevance classifier: a BERT sequence-classification model
// fine-tuned on disaster / not-disaster posts.
//
// Texts get the same pre-clean the model was trained with (`classifier_clean`),
// are truncated to 256 tokens and right-padded per sub-batch. The label is the
// argmax over the output logits, so it is whatever class index the model was
// trained with (0 = irrelevant).

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::classifier::RelevanceClassifier;
use crate::text::{classifier_clean, truncate_chars};

/// Token limit the classifier was trained with.
const MAX_TOKENS: usize = 256;

/// Texts per forward pass. Keeps peak memory flat when the unscored
/// backlog is large.
const SUB_BATCH: usize = 32;

/// BERT [PAD] token id.
const PAD_ID: i64 = 0;

pub struct OnnxRelevanceClassifier {
    // ort::Session::run takes &mut self, and spawn_blocking needs 'static
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxRelevanceClassifier {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            anyhow::bail!(
                "Classifier model not found: {}\nRun `disaster-watch download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Classifier tokenizer not found: {}\nRun `disaster-watch download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load classifier model from {}",
                    model_path.display()
                )
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load classifier tokenizer: {}", e))?;

        debug!("Loaded ONNX relevance classifier from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl RelevanceClassifier for OnnxRelevanceClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<i64>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts: Vec<String> = texts.iter().map(|t| classifier_clean(t)).collect();

        tokio::task::spawn_blocking(move || {
            let mut labels = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(SUB_BATCH) {
                labels.extend(classify_sync(&session, &tokenizer, chunk)?);
            }
            Ok(labels)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

fn classify_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    texts: &[String],
) -> Result<Vec<i64>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len().min(MAX_TOKENS))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let len = enc.get_ids().len().min(MAX_TOKENS);
        let ids = &enc.get_ids()[..len];
        let mask = &enc.get_attention_mask()[..len];

        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(mask.iter().map(|&m| m as i64));

        for _ in len..max_len {
            input_ids_flat.push(PAD_ID);
            attention_mask_flat.push(0);
        }
    }
    let token_type_ids_flat: Vec<i64> = vec![0; batch_size * max_len];

    let shape = [batch_size as i64, max_len as i64];
    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids_flat))
        .context("Failed to create token_type_ids tensor")?;

    let logits = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("ONNX classifier inference failed")?;

        // Shape: [batch_size, num_classes]
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract classifier logits")?;
        data.to_vec()
    };

    let labels = labels_from_logits(&logits, batch_size)?;

    for (text, label) in texts.iter().zip(&labels) {
        debug!(
            label,
            text_preview = %truncate_chars(text, 50),
            "Classified text"
        );
    }

    Ok(labels)
}

/// Argmax per row of a flat `[rows, classes]` logit buffer.
fn labels_from_logits(logits: &[f32], rows: usize) -> Result<Vec<i64>> {
    if rows == 0 || logits.is_empty() || logits.len() % rows != 0 {
        anyhow::bail!(
            "Classifier returned {} logits for {} texts",
            logits.len(),
            rows
        );
    }
    let classes = logits.len() / rows;

    Ok(logits
        .chunks(classes)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(best_i, best), (i, &v)| {
                    if v > best {
                        (i, v)
                    } else {
                        (best_i, best)
                    }
                })
                .0 as i64
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_from_logits_argmax_per_row() {
        // 3 texts, 3 classes
        let logits = [2.0, 0.1, -1.0, 0.0, 0.5, 3.0, -0.2, 1.7, 0.3];
        assert_eq!(labels_from_logits(&logits, 3).unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn test_labels_from_logits_binary() {
        let logits = [0.9, -0.9, -2.0, 2.0];
        assert_eq!(labels_from_logits(&logits, 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_labels_from_logits_rejects_ragged_output() {
        assert!(labels_from_logits(&[1.0, 2.0, 3.0], 2).is_err());
        assert!(labels_from_logits(&[], 1).is_err());
    }
}
