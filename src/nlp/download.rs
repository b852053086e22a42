// Model download helper for the two ONNX models.
//
// Layout under the model root (~/.local/share/disaster-watch/models/ on Linux):
//   ner/         token-classification model used to find place names
//   classifier/  fine-tuned BERT relevance classifier
//
// With DISASTER_MODEL_URL set, both come from `{url}/ner/…` and
// `{url}/classifier/…`. Without it the NER model comes from a public
// HuggingFace export and the classifier is skipped, since it has no public home.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Public ONNX export of bert-base-NER (CoNLL-03 labels).
const DEFAULT_NER_HF_URL: &str = "https://huggingface.co/Xenova/bert-base-NER/resolve/main";

/// One file to fetch: where it lives remotely and what it's called locally.
struct ModelFile {
    remote: &'static str,
    local: &'static str,
    large: bool,
}

const NER_FILES: [ModelFile; 3] = [
    ModelFile {
        remote: "config.json",
        local: "config.json",
        large: false,
    },
    ModelFile {
        remote: "tokenizer.json",
        local: "tokenizer.json",
        large: false,
    },
    ModelFile {
        remote: "onnx/model.onnx",
        local: "model.onnx",
        large: true,
    },
];

const CLASSIFIER_FILES: [ModelFile; 2] = [
    ModelFile {
        remote: "tokenizer.json",
        local: "tokenizer.json",
        large: false,
    },
    ModelFile {
        remote: "model.onnx",
        local: "model.onnx",
        large: true,
    },
];

/// Returns the default directory for storing model files.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("disaster-watch")
        .join("models")
}

pub fn ner_model_dir(base: &Path) -> PathBuf {
    base.join("ner")
}

pub fn classifier_model_dir(base: &Path) -> PathBuf {
    base.join("classifier")
}

pub fn ner_files_present(base: &Path) -> bool {
    let dir = ner_model_dir(base);
    NER_FILES.iter().all(|f| dir.join(f.local).exists())
}

pub fn classifier_files_present(base: &Path) -> bool {
    let dir = classifier_model_dir(base);
    CLASSIFIER_FILES.iter().all(|f| dir.join(f.local).exists())
}

/// Download both models. Files that already exist are left alone.
pub async fn download_models(base: &Path, model_url: Option<&str>) -> Result<()> {
    let model_url = model_url.map(|u| u.trim_end_matches('/'));

    println!("\nNamed-entity model:");
    let ner_source = match model_url {
        Some(url) => format!("{url}/ner"),
        None => DEFAULT_NER_HF_URL.to_string(),
    };
    // A custom host mirrors the local layout, so remote == local there.
    let use_local_names = model_url.is_some();
    fetch_all(&ner_source, &ner_model_dir(base), &NER_FILES, use_local_names).await?;

    println!("\nRelevance classifier:");
    match model_url {
        Some(url) => {
            fetch_all(
                &format!("{url}/classifier"),
                &classifier_model_dir(base),
                &CLASSIFIER_FILES,
                true,
            )
            .await?
        }
        None => println!(
            "  {} set DISASTER_MODEL_URL to download it, or place model.onnx and tokenizer.json in {}",
            "skipped:".yellow(),
            classifier_model_dir(base).display()
        ),
    }

    Ok(())
}

async fn fetch_all(
    source: &str,
    dir: &Path,
    files: &[ModelFile],
    use_local_names: bool,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    for file in files {
        let dest = dir.join(file.local);
        if dest.exists() {
            info!(file = file.local, "Model file already exists, skipping");
            println!("  {} (already exists)", file.local);
            continue;
        }

        let remote = if use_local_names {
            file.local
        } else {
            file.remote
        };
        println!("  Downloading {}...", file.local);
        download_file(&format!("{source}/{remote}"), &dest, file.large).await?;
    }
    Ok(())
}

/// Stream one file to disk. The body goes to a `.part` file first and is
/// renamed into place only once complete, so an interrupted download never
/// looks present.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        Some(progress_bar(response.content_length())?)
    } else {
        None
    };

    let partial = dest.with_extension("part");
    let mut out = std::fs::File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read response body")?
    {
        out.write_all(&chunk)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }
    out.flush()?;
    drop(out);

    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

fn progress_bar(total_size: Option<u64>) -> Result<ProgressBar> {
    let pb = match total_size {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .context("Invalid progress template")?
                    .progress_chars("=> "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("    {spinner} {bytes}")
                    .context("Invalid progress template")?,
            );
            pb
        }
    };
    Ok(pb)
}
