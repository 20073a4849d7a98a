//! CLI domain: parse, route, manifest loading, output, and presentation only.
//! No orchestration here; the single route table dispatches to the session.

mod manifest;
mod output;
mod parse;
mod presentation;
mod route;

pub use manifest::{load_units, load_variations};
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_artifact_detail_json, format_artifact_detail_text, format_artifact_list_json,
    format_artifact_list_text, format_batch_report_json, format_batch_report_text,
    format_deleted, format_timestamp,
};
pub use route::RunContext;
