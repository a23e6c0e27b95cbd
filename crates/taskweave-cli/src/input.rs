//! Node files: a JSON array, or one node per line.

use std::path::Path;

use anyhow::{Context, Result};
use taskweave_types::Node;

pub fn read_nodes(path: &Path) -> Result<Vec<Node>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_nodes(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_nodes(text: &str) -> Result<Vec<Node>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("node array");
    }
    let mut nodes = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let node = serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        nodes.push(node);
    }
    Ok(nodes)
}

// ============================================================================
// Tests
// ============================================================================
