//! The Markdown document a snapshot travels in.
//!
//! Example output:
//! ````text
//! # Website relaunch
//!
//! ## Process flow
//!
//! ```mermaid
//! graph LR
//!     task_1["Write copy<br/>high"]
//!     deliverable_1{"Press kit"}
//!
//!     task_1 --> deliverable_1
//! ```
//!
//! ## Project data
//!
//! ```json
//! { "version": "1.0", ... }
//! ```
//! ````

use once_cell::sync::Lazy;
use regex::Regex;

use super::Snapshot;

static DATA_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```json\r?\n([\s\S]*?)\r?\n```").expect("valid data block regex"));

/// Render the full export document: diagram for people, JSON block for machines.
pub fn render_document(snapshot: &Snapshot) -> serde_json::Result<String> {
    let data = serde_json::to_string_pretty(snapshot)?;
    Ok(format!(
        "# {}\n\n## Process flow\n\n```mermaid\n{}```\n\n## Project data\n\n```json\n{}\n```\n",
        single_line(&snapshot.project.name),
        render_mermaid(snapshot),
        data
    ))
}

/// The body of the `mermaid` block, one node per line then one edge per line.
pub fn render_mermaid(snapshot: &Snapshot) -> String {
    let mut graph = String::from("graph LR\n");

    for task in &snapshot.tasks {
        let priority = task.priority.unwrap_or_default();
        graph.push_str(&format!(
            "    task_{}[\"{}<br/>{}\"]\n",
            task.id,
            mermaid_label(&task.name),
            priority.as_str()
        ));
    }
    for deliverable in &snapshot.deliverables {
        graph.push_str(&format!(
            "    deliverable_{}{{\"{}\"}}\n",
            deliverable.id,
            mermaid_label(&deliverable.name)
        ));
    }

    graph.push('\n');

    for connection in &snapshot.connections {
        let (Some(source_type), Some(source_id), Some(target_type), Some(target_id)) = (
            connection.source_type.as_deref(),
            connection.source_id,
            connection.target_type.as_deref(),
            connection.target_id,
        ) else {
            continue;
        };
        graph.push_str(&format!(
            "    {source_type}_{source_id} --> {target_type}_{target_id}\n"
        ));
    }

    graph
}

/// The contents of the first ```` ```json ```` block, if there is one.
pub fn extract_data_block(text: &str) -> Option<&str> {
    DATA_BLOCK_RE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Suggested file name for an export of `project_name`.
pub fn file_name(project_name: &str) -> String {
    let stem: String = project_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{stem}_flow.md")
}

/// Quote-safe, single-line label. Backticks are escaped so a name can never
/// open or close a fenced block.
fn mermaid_label(name: &str) -> String {
    single_line(name)
        .replace('"', "#quot;")
        .replace('`', "#96;")
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
