// Colored terminal output for pass reports and record listings.
//
// main.rs and status.rs delegate here so the commands share one look.

use colored::Colorize;

use crate::db::{Record, StoreCounts};
use crate::pipeline::{IngestReport, ScoringOutcome};
use crate::text::truncate_chars;

/// Summary of one ingestion pass.
pub fn display_ingest_report(report: &IngestReport) {
    println!("\n{}", "=== Ingestion pass ===".bold());
    println!(
        "  Keywords searched: {}{}",
        report.keywords_searched,
        if report.keywords_failed > 0 {
            format!("  ({} failed)", report.keywords_failed)
                .red()
                .to_string()
        } else {
            String::new()
        }
    );
    println!("  Posts fetched:     {}", report.fetched);
    println!(
        "  New records:       {} ({} with location)",
        report.inserted.to_string().green(),
        report.located
    );
    println!("  Already stored:    {}", report.duplicates);
    if report.skipped > 0 {
        println!("  Skipped:           {}", report.skipped.to_string().yellow());
    }
}

/// Summary of one scoring pass.
pub fn display_scoring_outcome(outcome: &ScoringOutcome) {
    println!("\n{}", "=== Scoring pass ===".bold());
    match outcome {
        ScoringOutcome::Idle => println!("  No unscored records."),
        ScoringOutcome::Unavailable => println!(
            "  {} no relevance classifier loaded. Run `disaster-watch download-model`.",
            "!".yellow()
        ),
        ScoringOutcome::Applied(summary) => {
            println!("  Scored:  {}", summary.scored.to_string().green());
            println!("  Deleted: {} (irrelevant)", summary.deleted);
            if summary.skipped > 0 {
                println!("  Skipped: {} (already resolved)", summary.skipped);
            }
        }
    }
}

pub fn display_counts(counts: &StoreCounts) {
    println!("Records: {} total", counts.total.to_string().bold());
    println!(
        "  {} unscored, {} scored, {} with coordinates",
        counts.unscored.to_string().yellow(),
        counts.scored.to_string().green(),
        counts.located
    );
    if counts.irrelevant > 0 {
        println!(
            "  {} {} stored with the irrelevant label (run `disaster-watch prune`)",
            "!".red(),
            counts.irrelevant
        );
    }
}

pub fn display_keyword_counts(keyword_counts: &[(String, i64)]) {
    if keyword_counts.is_empty() {
        return;
    }
    println!("\nBy keyword:");
    for (keyword, count) in keyword_counts {
        println!("  {:<14} {:>6}", keyword, count);
    }
}

/// One record on a single line plus its text underneath.
pub fn display_record(label: &str, record: &Record) {
    let score = match record.score {
        Some(score) => format!("score {score}").green(),
        None => "unscored".yellow(),
    };
    let place = match (&record.location, record.coordinates) {
        (Some(name), Some(c)) => format!("{} ({:.2}, {:.2})", name, c.latitude, c.longitude),
        _ => "no location".to_string(),
    };

    println!("\n{} #{} [{}] @{}", label.bold(), record.id, record.keyword, record.author);
    println!("  {} | {} | {}", score, place.dimmed(), record.created_at.dimmed());
    println!("  {}", truncate_chars(&record.original_text, 140));
    println!("  {}", record.url.dimmed());
}
