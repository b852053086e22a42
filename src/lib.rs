// disaster-watch: continuous harvesting of disaster reports from Bluesky
//
// This is the library root. Each module corresponds to one stage or
// collaborator of the ingest → enrich → classify pipeline.

pub mod bluesky;
pub mod classify;
pub mod config;
pub mod db;
pub mod geo;
pub mod nlp;
pub mod output;
pub mod pipeline;
pub mod status;
pub mod text;

#[cfg(feature = "web")]
pub mod web;
