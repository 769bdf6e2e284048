//! The sink: maps signal ids to DOM ranges and bound attributes, applies
//! updates, rescans after every swap.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use tracing::debug;

use weaver_common::{escape_text, ATTR_BIND_PREFIX, MARKER_CLOSE, MARKER_OPEN};

use crate::dom::{Dom, DomNode, NodeId};

/// One reactive region: the comment pair bracketing it.
#[derive(Debug, Clone, Copy)]
pub struct BindRange {
    pub parent: Option<NodeId>,
    pub open: NodeId,
    pub close: NodeId,
}

/// Bind-point and attribute indexes over a fragment tree.
pub struct DomSink {
    dom: Dom,
    bind_points: HashMap<String, Vec<BindRange>>,
    attr_bindings: HashMap<String, Vec<(NodeId, String)>>,
}

impl DomSink {
    pub fn new(dom: Dom) -> Self {
        let mut sink = Self { dom, bind_points: HashMap::new(), attr_bindings: HashMap::new() };
        sink.rescan();
        sink
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Walk the whole document rebuilding both indexes. Runs at boot and
    /// after every content swap; swapped-in content gets picked up here,
    /// nested markers included.
    pub fn rescan(&mut self) {
        self.bind_points.clear();
        self.attr_bindings.clear();

        for id in self.dom.walk() {
            match self.dom.node(id) {
                DomNode::Comment(text) => {
                    if let Some(signal_id) = text.strip_prefix(MARKER_OPEN) {
                        if let Some(range) = self.match_range(id, signal_id) {
                            self.bind_points
                                .entry(signal_id.to_string())
                                .or_default()
                                .push(range);
                        }
                    }
                }
                DomNode::Element { attrs, .. } => {
                    for (name, value) in attrs {
                        if let Some(attr) = name.strip_prefix(ATTR_BIND_PREFIX) {
                            if !attr.starts_with("on") {
                                self.attr_bindings
                                    .entry(value.clone())
                                    .or_default()
                                    .push((id, attr.to_string()));
                            }
                        }
                    }
                }
                DomNode::Text(_) => {}
            }
        }
    }

    /// Find the close comment matching an open marker among its later
    /// siblings, tolerating nested pairs for the same id.
    fn match_range(&self, open: NodeId, signal_id: &str) -> Option<BindRange> {
        let parent = self.dom.parent(open);
        let siblings = self.dom.children(parent);
        let start = siblings.iter().position(|&s| s == open)?;
        let open_marker = format!("{MARKER_OPEN}{signal_id}");
        let close_marker = format!("{MARKER_CLOSE}{signal_id}");
        let mut depth = 0usize;
        for &sibling in &siblings[start + 1..] {
            if let DomNode::Comment(text) = self.dom.node(sibling) {
                if *text == open_marker {
                    depth += 1;
                } else if *text == close_marker {
                    if depth == 0 {
                        return Some(BindRange { parent, open, close: sibling });
                    }
                    depth -= 1;
                }
            }
        }
        debug!(signal_id, "unmatched bind marker");
        None
    }

    pub fn ranges(&self, signal_id: &str) -> &[BindRange] {
        self.bind_points.get(signal_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_binding(&self, signal_id: &str) -> bool {
        self.bind_points.contains_key(signal_id) || self.attr_bindings.contains_key(signal_id)
    }

    /// Text content currently between the markers of a signal's first
    /// range.
    pub fn region_text(&self, signal_id: &str) -> Option<String> {
        let range = self.ranges(signal_id).first().copied()?;
        let siblings = self.dom.children(range.parent);
        let from = siblings.iter().position(|&s| s == range.open)?;
        let to = siblings.iter().position(|&s| s == range.close)?;
        let mut out = String::new();
        for &sibling in &siblings[from + 1..to] {
            out.push_str(&self.dom.text_content(sibling));
        }
        Some(out)
    }

    /// Swap the content of every range bound to `signal_id` with parsed
    /// `html`, then rescan. Returns the `weaver.push` payloads of any
    /// script elements that arrived with the new content, in document
    /// order, so the agent can consume nested definitions.
    pub fn sync(&mut self, signal_id: &str, html: &str) -> Result<Vec<String>> {
        let ranges: Vec<BindRange> = self.ranges(signal_id).to_vec();
        if ranges.is_empty() {
            return Err(anyhow!("no bind point for signal '{signal_id}'"));
        }

        let mut scripts = Vec::new();
        for range in ranges {
            let siblings = self.dom.children(range.parent);
            let Some(from) = siblings.iter().position(|&s| s == range.open) else {
                continue;
            };
            let Some(to) = siblings.iter().position(|&s| s == range.close) else {
                continue;
            };
            let fresh = self.dom.parse_fragment(html)?;
            for &top in &fresh {
                for node in self.dom.walk_from(top) {
                    if let Some(payload) = script_payload(&self.dom, node) {
                        scripts.push(payload);
                    }
                }
            }
            self.dom.splice(range.parent, from, to, fresh);
        }

        self.rescan();
        Ok(scripts)
    }

    /// Render a plain value into its bound regions as escaped text.
    pub fn sync_text(&mut self, signal_id: &str, text: &str) -> Result<()> {
        self.sync(signal_id, &escape_text(text))?;
        Ok(())
    }

    /// Set a bound attribute on every element bound to `signal_id`.
    pub fn sync_attribute(&mut self, signal_id: &str, attr: &str, value: &str) {
        let bindings: Vec<(NodeId, String)> = self
            .attr_bindings
            .get(signal_id)
            .map(|b| b.iter().filter(|(_, a)| a == attr).cloned().collect())
            .unwrap_or_default();
        for (node, attr) in bindings {
            self.dom.set_attr(node, &attr, value);
        }
    }

    /// All attributes bound to a signal, for value updates that must touch
    /// every binding.
    pub fn bound_attrs(&self, signal_id: &str) -> Vec<(NodeId, String)> {
        self.attr_bindings.get(signal_id).cloned().unwrap_or_default()
    }

    pub fn set_attr(&mut self, node: NodeId, attr: &str, value: &str) {
        self.dom.set_attr(node, attr, value);
    }

    /// Ancestor walk from `target` for a delegated event binding.
    pub fn handler_for(&self, target: NodeId, event_type: &str) -> Option<String> {
        let attr = format!("{ATTR_BIND_PREFIX}on{}", event_type.to_lowercase());
        let mut current = Some(target);
        while let Some(id) = current {
            if let Some(handler_id) = self.dom.attr(id, &attr) {
                return Some(handler_id.to_string());
            }
            current = self.dom.parent(id);
        }
        None
    }
}

/// Extract the JSON payload of a `weaver.push(…)` script element.
pub fn script_payload(dom: &Dom, id: NodeId) -> Option<String> {
    let text = dom.script_text(id)?.trim();
    let inner = text.strip_prefix("weaver.push(")?.strip_suffix(")")?;
    Some(inner.to_string())
}
