//! An arena-backed HTML fragment tree with a parser for the renderer's
//! output: elements with quoted attributes, text, comments, raw-text
//! scripts, self-closed void elements.

use std::fmt::Write as _;

use anyhow::{bail, Result};

use weaver_common::{escape_attr, escape_text, is_void_element};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum DomNode {
    Element { tag: String, attrs: Vec<(String, String)>, children: Vec<NodeId> },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Entry {
    node: DomNode,
    parent: Option<NodeId>,
}

/// The fragment tree. Node ids are stable for the life of the document;
/// removal only detaches.
#[derive(Debug, Default, Clone)]
pub struct Dom {
    entries: Vec<Entry>,
    roots: Vec<NodeId>,
}

impl Dom {
    pub fn parse(html: &str) -> Result<Self> {
        let mut dom = Dom::default();
        let roots = dom.parse_fragment(html)?;
        dom.roots = roots;
        for &root in &dom.roots {
            dom.entries[root].parent = None;
        }
        Ok(dom)
    }

    /// Parse a fragment into the arena without attaching it; returns the
    /// new top-level nodes. Used by content swaps.
    pub fn parse_fragment(&mut self, html: &str) -> Result<Vec<NodeId>> {
        let mut parser = Parser { input: html.as_bytes(), pos: 0 };
        let mut stack: Vec<NodeId> = Vec::new();
        let mut tops = Vec::new();

        while let Some(piece) = parser.next_piece()? {
            match piece {
                Piece::Text(text) => {
                    let id = self.push(DomNode::Text(text), stack.last().copied());
                    self.attach(id, &mut stack, &mut tops);
                }
                Piece::Comment(text) => {
                    let id = self.push(DomNode::Comment(text), stack.last().copied());
                    self.attach(id, &mut stack, &mut tops);
                }
                Piece::Open { tag, attrs, self_closed } => {
                    let void = self_closed || is_void_element(&tag);
                    let id = self.push(
                        DomNode::Element { tag, attrs, children: Vec::new() },
                        stack.last().copied(),
                    );
                    self.attach(id, &mut stack, &mut tops);
                    if !void {
                        stack.push(id);
                    }
                }
                Piece::Script { attrs, body } => {
                    let id = self.push(
                        DomNode::Element {
                            tag: "script".to_string(),
                            attrs,
                            children: Vec::new(),
                        },
                        stack.last().copied(),
                    );
                    self.attach(id, &mut stack, &mut tops);
                    let text = self.push(DomNode::Text(body), Some(id));
                    if let DomNode::Element { children, .. } = &mut self.entries[id].node {
                        children.push(text);
                    }
                }
                Piece::Close { tag } => {
                    match stack.pop() {
                        Some(open) if self.tag_of(open) == Some(tag.as_str()) => {}
                        _ => bail!("mismatched close tag </{tag}>"),
                    }
                }
            }
        }
        if !stack.is_empty() {
            bail!("unclosed element <{}>", self.tag_of(stack[0]).unwrap_or("?"));
        }
        Ok(tops)
    }

    fn push(&mut self, node: DomNode, parent: Option<NodeId>) -> NodeId {
        self.entries.push(Entry { node, parent });
        self.entries.len() - 1
    }

    fn attach(&mut self, id: NodeId, stack: &mut [NodeId], tops: &mut Vec<NodeId>) {
        match stack.last().copied() {
            Some(parent) => {
                if let DomNode::Element { children, .. } = &mut self.entries[parent].node {
                    children.push(id);
                }
            }
            None => tops.push(id),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &DomNode {
        &self.entries[id].node
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entries[id].parent
    }

    pub fn tag_of(&self, id: NodeId) -> Option<&str> {
        match &self.entries[id].node {
            DomNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.entries[id].node {
            DomNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let DomNode::Element { attrs, .. } = &mut self.entries[id].node {
            match attrs.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Children of an element, or the document roots for `None`.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => match &self.entries[id].node {
                DomNode::Element { children, .. } => children,
                _ => &[],
            },
            None => &self.roots,
        }
    }

    /// Replace the sibling run strictly between `from` and `to` (exclusive
    /// indexes into the child list) with `replacement`.
    pub fn splice(
        &mut self,
        parent: Option<NodeId>,
        from: usize,
        to: usize,
        replacement: Vec<NodeId>,
    ) {
        for &id in &replacement {
            self.entries[id].parent = parent;
        }
        match parent {
            Some(parent_id) => {
                if let DomNode::Element { children, .. } = &mut self.entries[parent_id].node {
                    drop(children.splice(from + 1..to, replacement));
                }
            }
            None => {
                drop(self.roots.splice(from + 1..to, replacement));
            }
        }
    }

    /// Document-order walk over the whole tree.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let DomNode::Element { children, .. } = &self.entries[id].node {
                for &child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Document-order walk of a subtree.
    pub fn walk_from(&self, top: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let DomNode::Element { children, .. } = &self.entries[id].node {
                for &child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Concatenated text content of a subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.walk_from(id) {
            if let DomNode::Text(text) = self.node(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Serialize a subtree back to HTML.
    pub fn node_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.write_node(root, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.node(id) {
            DomNode::Text(text) => out.push_str(&escape_text(text)),
            DomNode::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            DomNode::Element { tag, attrs, children } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
                }
                if is_void_element(tag) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                if tag == "script" {
                    // Raw text: children are unescaped script source.
                    for &child in children {
                        if let DomNode::Text(text) = self.node(child) {
                            out.push_str(text);
                        }
                    }
                } else {
                    for &child in children {
                        self.write_node(child, out);
                    }
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    /// First element carrying `name="value"`, document order.
    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<NodeId> {
        self.walk().into_iter().find(|&id| self.attr(id, name) == Some(value))
    }

    /// First element with the given tag, document order.
    pub fn find_tag(&self, tag: &str) -> Option<NodeId> {
        self.walk().into_iter().find(|&id| self.tag_of(id) == Some(tag))
    }
}

enum Piece {
    Text(String),
    Comment(String),
    Open { tag: String, attrs: Vec<(String, String)>, self_closed: bool },
    Close { tag: String },
    /// A whole `<script>…</script>` element; the body is raw text.
    Script { attrs: Vec<(String, String)>, body: String },
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn next_piece(&mut self) -> Result<Option<Piece>> {
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        if self.input[self.pos] != b'<' {
            return Ok(Some(Piece::Text(self.read_text())));
        }
        if self.starts_with("<!--") {
            return Ok(Some(Piece::Comment(self.read_comment()?)));
        }
        if self.starts_with("</") {
            return Ok(Some(Piece::Close { tag: self.read_close()? }));
        }
        Ok(Some(self.read_open()?))
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix.as_bytes())
    }

    fn read_text(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'<' {
            self.pos += 1;
        }
        unescape(&String::from_utf8_lossy(&self.input[start..self.pos]))
    }

    /// Raw text until `</script>`, no unescaping.
    fn read_raw_until(&mut self, close: &str) -> String {
        let haystack = String::from_utf8_lossy(&self.input[self.pos..]).into_owned();
        let end = haystack.find(close).unwrap_or(haystack.len());
        self.pos += end;
        haystack[..end].to_string()
    }

    fn read_comment(&mut self) -> Result<String> {
        self.pos += 4; // <!--
        let rest = String::from_utf8_lossy(&self.input[self.pos..]);
        match rest.find("-->") {
            Some(end) => {
                let content = rest[..end].to_string();
                self.pos += end + 3;
                Ok(content)
            }
            None => bail!("unterminated comment"),
        }
    }

    fn read_close(&mut self) -> Result<String> {
        self.pos += 2; // </
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'>' {
            self.pos += 1;
        }
        if self.pos >= self.input.len() {
            bail!("unterminated close tag");
        }
        let tag = String::from_utf8_lossy(&self.input[start..self.pos]).trim().to_string();
        self.pos += 1;
        Ok(tag)
    }

    fn read_open(&mut self) -> Result<Piece> {
        self.pos += 1; // <
        let tag_start = self.pos;
        while self.pos < self.input.len()
            && !matches!(self.input[self.pos], b' ' | b'>' | b'/')
        {
            self.pos += 1;
        }
        let tag = String::from_utf8_lossy(&self.input[tag_start..self.pos]).to_string();
        if tag.is_empty() {
            bail!("empty tag name");
        }

        let mut attrs = Vec::new();
        let mut self_closed = false;
        loop {
            self.skip_spaces();
            match self.input.get(self.pos) {
                None => bail!("unterminated open tag <{tag}>"),
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.input.get(self.pos) == Some(&b'>') {
                        self.pos += 1;
                        self_closed = true;
                        break;
                    }
                    bail!("stray '/' in <{tag}>");
                }
                Some(_) => attrs.push(self.read_attr()?),
            }
        }

        if tag == "script" && !self_closed {
            let body = self.read_raw_until("</script>");
            if !self.starts_with("</script>") {
                bail!("unterminated script element");
            }
            self.pos += "</script>".len();
            return Ok(Piece::Script { attrs, body });
        }
        Ok(Piece::Open { tag, attrs, self_closed })
    }

    fn read_attr(&mut self) -> Result<(String, String)> {
        let start = self.pos;
        while self.pos < self.input.len()
            && !matches!(self.input[self.pos], b'=' | b' ' | b'>' | b'/')
        {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.input[start..self.pos]).to_string();
        if self.input.get(self.pos) != Some(&b'=') {
            // Boolean attribute.
            return Ok((name, String::new()));
        }
        self.pos += 1;
        if self.input.get(self.pos) != Some(&b'"') {
            bail!("attribute '{name}' is not quoted");
        }
        self.pos += 1;
        let value_start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'"' {
            self.pos += 1;
        }
        if self.pos >= self.input.len() {
            bail!("unterminated attribute value for '{name}'");
        }
        let value = unescape(&String::from_utf8_lossy(&self.input[value_start..self.pos]));
        self.pos += 1;
        Ok((name, value))
    }

    fn skip_spaces(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }
}

impl Dom {
    /// Script source text of a `<script>` element.
    pub fn script_text(&self, id: NodeId) -> Option<&str> {
        match &self.entries[id].node {
            DomNode::Element { tag, children, .. } if tag == "script" => children
                .first()
                .and_then(|&child| match self.node(child) {
                    DomNode::Text(text) => Some(text.as_str()),
                    _ => None,
                }),
            _ => None,
        }
    }
}

fn unescape(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
