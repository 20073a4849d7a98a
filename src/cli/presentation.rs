//! CLI presentation: text and json formatters per command family.

mod artifacts;
mod batch;

pub use artifacts::{
    format_artifact_detail_json, format_artifact_detail_text, format_artifact_list_json,
    format_artifact_list_text, format_timestamp,
};
pub use batch::{format_batch_report_json, format_batch_report_text, format_deleted};
