// Local ONNX named-entity recognizer.
//
// Runs a token-classification model (BERT family, BIO-tagged labels) on the
// CPU. Each token gets the argmax label, and consecutive tokens of the same
// type are merged back into spans using the tokenizer's byte offsets, so the
// returned entity text is an exact slice of the input.
//
// Expected files in the model directory:
//   model.onnx     : token classification graph (input_ids, attention_mask, token_type_ids)
//   tokenizer.json : HuggingFace fast tokenizer
//   config.json    : carries the id2label map

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::debug;

use super::locator::{Entity, EntityLocator};

/// BERT's position embedding table size. Longer inputs are cut here.
const MAX_TOKENS: usize = 512;

pub struct OnnxEntityLocator {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    labels: Arc<Vec<String>>,
}

impl OnnxEntityLocator {
    /// Load model, tokenizer and label map from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let config_path = model_dir.join("config.json");

        for path in [&model_path, &tokenizer_path, &config_path] {
            if !path.exists() {
                anyhow::bail!(
                    "NER model file not found: {}\nRun `disaster-watch download-model` to download it.",
                    path.display()
                );
            }
        }

        let config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let labels = parse_id2label(&config)?;

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load NER model from {}", model_path.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load NER tokenizer: {}", e))?;

        debug!(
            labels = labels.len(),
            "Loaded ONNX NER model from {}",
            model_dir.display()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            labels: Arc::new(labels),
        })
    }
}

#[async_trait]
impl EntityLocator for OnnxEntityLocator {
    async fn locate(&self, text: &str) -> Result<Vec<Entity>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let labels = Arc::clone(&self.labels);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || locate_sync(&session, &tokenizer, &labels, &text))
            .await
            .context("spawn_blocking panicked")?
    }
}

fn locate_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    labels: &[String],
    text: &str,
) -> Result<Vec<Entity>> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

    let seq_len = encoding.get_ids().len().min(MAX_TOKENS);
    if seq_len == 0 {
        return Ok(Vec::new());
    }

    let input_ids: Vec<i64> = encoding.get_ids()[..seq_len]
        .iter()
        .map(|&id| id as i64)
        .collect();
    let attention_mask: Vec<i64> = encoding.get_attention_mask()[..seq_len]
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = vec![0; seq_len];

    let shape = [1_i64, seq_len as i64];
    let input_ids_tensor =
        Tensor::from_array((shape, input_ids)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
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
            .context("ONNX NER inference failed")?;

        // Shape: [1, seq_len, num_labels]
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract NER logits")?;
        data.to_vec()
    };

    let num_labels = logits.len() / seq_len;
    if num_labels == 0 || num_labels != labels.len() {
        anyhow::bail!(
            "NER model returned {} labels per token, config declares {}",
            num_labels,
            labels.len()
        );
    }

    let offsets = encoding.get_offsets();
    let special = encoding.get_special_tokens_mask();

    let mut tagged = Vec::with_capacity(seq_len);
    for i in 0..seq_len {
        // [CLS], [SEP] and padding carry no text
        if special.get(i).copied().unwrap_or(0) == 1 {
            continue;
        }
        let row = &logits[i * num_labels..(i + 1) * num_labels];
        tagged.push(TaggedToken {
            label: labels[argmax(row)].as_str(),
            start: offsets[i].0,
            end: offsets[i].1,
        });
    }

    Ok(aggregate_spans(text, &tagged))
}

/// One token's predicted label and its byte range in the input text.
#[derive(Debug, Clone, Copy)]
struct TaggedToken<'a> {
    label: &'a str,
    start: usize,
    end: usize,
}

/// Merge BIO-tagged tokens into entity spans.
///
/// `B-X` always opens a new span. `I-X` (or a bare `X`) extends the open span
/// when its type matches, otherwise it opens one. `O` closes whatever is open.
fn aggregate_spans(text: &str, tokens: &[TaggedToken<'_>]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<(String, usize, usize)> = None;

    let close = |span: Option<(String, usize, usize)>, entities: &mut Vec<Entity>| {
        if let Some((kind, start, end)) = span {
            if let Some(slice) = text.get(start..end) {
                let slice = slice.trim();
                if !slice.is_empty() {
                    entities.push(Entity::new(slice, kind));
                }
            }
        }
    };

    for token in tokens {
        if token.label == "O" {
            close(current.take(), &mut entities);
            continue;
        }
        if token.start == token.end {
            continue;
        }

        let (begins, kind) = match token.label.split_once('-') {
            Some(("B", kind)) => (true, kind),
            Some(("I", kind)) => (false, kind),
            _ => (false, token.label),
        };

        let extends = matches!(
            &current,
            Some((open_kind, _, _)) if !begins && open_kind.as_str() == kind
        );
        if extends {
            if let Some((_, _, end)) = current.as_mut() {
                *end = token.end;
            }
        } else {
            close(current.take(), &mut entities);
            current = Some((kind.to_string(), token.start, token.end));
        }
    }
    close(current.take(), &mut entities);

    entities
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best), (i, &v)| {
            if v > best {
                (i, v)
            } else {
                (best_i, best)
            }
        })
        .0
}

#[derive(Deserialize)]
struct ModelConfig {
    id2label: std::collections::HashMap<String, String>,
}

/// Read the `id2label` map from a HuggingFace `config.json` into a dense
/// vector indexed by label id.
fn parse_id2label(config_json: &str) -> Result<Vec<String>> {
    let config: ModelConfig =
        serde_json::from_str(config_json).context("Failed to parse model config.json")?;

    let mut labels = vec![String::new(); config.id2label.len()];
    for (id, label) in config.id2label {
        let index: usize = id
            .parse()
            .with_context(|| format!("Non-numeric label id in id2label: {id}"))?;
        let slot = labels
            .get_mut(index)
            .with_context(|| format!("Label id {index} out of range in id2label"))?;
        *slot = label;
    }

    if labels.is_empty() {
        anyhow::bail!("config.json id2label is empty");
    }
    Ok(labels)
}
