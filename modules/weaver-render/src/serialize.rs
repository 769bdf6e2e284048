//! Token → HTML. Bind markers are comment pairs, signal definitions are
//! inline bootstrap scripts, and chunking is tuned for time-to-first-byte.

use std::collections::HashSet;

use weaver_common::{escape_attr, escape_text, is_void_element, MARKER_CLOSE, MARKER_OPEN};
use weaver_signal::{SignalDef, Value};

use crate::context::RenderCtx;
use crate::token::Token;

/// Serialize one token. `emitted` dedups signal-definition scripts within a
/// render pass — re-emissions are idempotent on the client but dead weight
/// on the wire.
pub fn token_html(token: &Token, emitted: &mut HashSet<String>) -> String {
    match token {
        Token::Text(text) => escape_text(text),
        Token::Open { tag, attrs } => {
            let mut out = String::with_capacity(tag.len() + 2);
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            if is_void_element(tag) {
                out.push_str("/>");
            } else {
                out.push('>');
            }
            out
        }
        Token::Close { tag } => {
            if is_void_element(tag) {
                String::new()
            } else {
                format!("</{tag}>")
            }
        }
        Token::BindOpen { id } => format!("<!--{MARKER_OPEN}{id}-->"),
        Token::BindClose { id } => format!("<!--{MARKER_CLOSE}{id}-->"),
        Token::SignalDefinition(def) => {
            if emitted.insert(def.id().to_string()) {
                signal_script(def)
            } else {
                String::new()
            }
        }
        Token::RawHtml(html) => html.clone(),
        // Placeholders never reach the serializer; the pipeline expands
        // them. Render nothing rather than corrupt the stream.
        _ => String::new(),
    }
}

/// Serialize a placeholder-free token run against the pass-wide emitted set.
pub fn tokens_html(tokens: &[Token], ctx: &RenderCtx) -> String {
    let mut emitted = ctx.emitted_set().lock().unwrap();
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token_html(token, &mut emitted));
    }
    out
}

/// The inline bootstrap script for one signal definition. Runtime
/// back-references never reach here — [`SignalDef`] is the wire shape.
pub fn signal_script(def: &SignalDef) -> String {
    let payload = serde_json::json!({ "kind": "signal-definition", "signal": def });
    script_tag(&payload)
}

/// The post-stream follow-up script for a deferred result.
pub fn update_script(id: &str, value: &Value) -> String {
    let payload = serde_json::json!({ "kind": "signal-update", "id": id, "value": value });
    script_tag(&payload)
}

fn script_tag(payload: &Value) -> String {
    // `</` must not appear inside an inline script; `<\/` is equivalent JSON.
    let json = payload.to_string().replace("</", "<\\/");
    format!("<script>weaver.push({json})</script>")
}

/// TTFB-tuned chunk batching: the first chunk flushes as soon as any content
/// exists, later ones batch to the threshold, the remainder flushes on
/// close.
pub struct Chunker {
    buf: String,
    first_flushed: bool,
    chunk_bytes: usize,
}

impl Chunker {
    pub fn new(chunk_bytes: usize) -> Self {
        Self { buf: String::new(), first_flushed: false, chunk_bytes }
    }

    pub fn push(&mut self, piece: &str) -> Option<String> {
        self.buf.push_str(piece);
        if self.buf.is_empty() {
            return None;
        }
        if !self.first_flushed || self.buf.len() >= self.chunk_bytes {
            self.first_flushed = true;
            return Some(std::mem::take(&mut self.buf));
        }
        None
    }

    pub fn finish(mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_tokens_escape_and_self_close() {
        let mut emitted = HashSet::new();
        let open = Token::Open {
            tag: "a".into(),
            attrs: vec![("href".into(), "/x?a=1&b=\"2\"".into())],
        };
        assert_eq!(
            token_html(&open, &mut emitted),
            r#"<a href="/x?a=1&amp;b=&quot;2&quot;">"#
        );

        let img = Token::Open { tag: "img".into(), attrs: vec![] };
        assert_eq!(token_html(&img, &mut emitted), "<img/>");
        assert_eq!(token_html(&Token::Close { tag: "img".into() }, &mut emitted), "");
        assert_eq!(token_html(&Token::Close { tag: "a".into() }, &mut emitted), "</a>");
    }

    #[test]
    fn definition_scripts_dedup_within_a_pass() {
        let def = SignalDef::State(weaver_signal::StateDef {
            id: "s1".into(),
            init: serde_json::json!(0),
        });
        let mut emitted = HashSet::new();
        let first = token_html(&Token::SignalDefinition(def.clone()), &mut emitted);
        assert!(first.starts_with("<script>weaver.push({"));
        assert!(first.contains(r#""kind":"signal-definition""#));
        let second = token_html(&Token::SignalDefinition(def), &mut emitted);
        assert_eq!(second, "");
    }

    #[test]
    fn script_tags_cannot_terminate_early() {
        let def = SignalDef::Suspense(weaver_signal::SuspenseDef {
            id: "sus".into(),
            pending_deps: vec![],
            children_html: Some("<script>x()</script>".into()),
        });
        let script = signal_script(&def);
        // The inner close tag is escaped, the outer one terminates.
        assert_eq!(script.matches("</script>").count(), 1);
        assert!(script.contains("<\\/script>"));
    }

    #[test]
    fn chunker_flushes_first_content_immediately_then_batches() {
        let mut chunker = Chunker::new(16);
        assert_eq!(chunker.push(""), None);
        assert_eq!(chunker.push("<div>").as_deref(), Some("<div>"));
        assert_eq!(chunker.push("short"), None);
        assert_eq!(chunker.push("-more-content-"), Some("short-more-content-".into()));
        assert_eq!(chunker.push("tail"), None);
        assert_eq!(chunker.finish().as_deref(), Some("tail"));
    }
}
