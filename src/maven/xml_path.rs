//! Minimal slash-separated element queries over repository metadata.
//!
//! Each segment is `name` (first matching descendant) or `name[index]` /
//! `name[last]` (positional match among all matching descendants).

use crate::error::{Error, Result};
use roxmltree::{Document, Node};

fn query_error(path: &str, reason: impl Into<String>) -> Error {
    Error::MetadataQuery {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Parse `xml` and return the trimmed text of the element at `path`.
pub fn query_text(xml: &str, path: &str) -> Result<String> {
    let doc = Document::parse(xml).map_err(|e| query_error(path, format!("malformed XML: {e}")))?;
    query(&doc, path)
}

/// Trimmed text of the element at `path`, relative to the document root.
pub fn query(doc: &Document<'_>, path: &str) -> Result<String> {
    let mut current = doc.root_element();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current = step(current, segment, path)?;
    }
    Ok(text_content(current).trim().to_string())
}

fn step<'a, 'input>(node: Node<'a, 'input>, segment: &str, path: &str) -> Result<Node<'a, 'input>> {
    let Some(open) = segment.find('[').filter(|_| segment.ends_with(']')) else {
        return matching(node, segment)
            .first()
            .copied()
            .ok_or_else(|| query_error(path, format!("no such element '{segment}'")));
    };

    let name = &segment[..open];
    let selector = &segment[open + 1..segment.len() - 1];
    let matches = matching(node, name);
    let index = if selector == "last" {
        matches
            .len()
            .checked_sub(1)
            .ok_or_else(|| query_error(path, format!("no '{name}' elements")))?
    } else {
        selector
            .trim()
            .parse::<usize>()
            .map_err(|_| query_error(path, format!("invalid index '{selector}'")))?
    };

    matches.get(index).copied().ok_or_else(|| {
        query_error(
            path,
            format!(
                "index of {index} is out of range for {} '{name}' elements",
                matches.len()
            ),
        )
    })
}

fn matching<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
    node.descendants()
        .skip(1)
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .collect()
}

fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}
