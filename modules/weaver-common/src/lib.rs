pub mod config;
pub mod error;
pub mod escape;

pub use config::Config;
pub use error::WeaverError;
pub use escape::{escape_attr, escape_text};

/// Comment marker opening a reactive region: `<!--^id-->`.
pub const MARKER_OPEN: &str = "^";
/// Comment marker closing a reactive region: `<!--/id-->`.
pub const MARKER_CLOSE: &str = "/";

/// Prefix for signal-bound attributes: `data-w-class="sig_id"`.
pub const ATTR_BIND_PREFIX: &str = "data-w-";

/// DOM event types the client delegates at the document level.
pub const DELEGATED_EVENTS: &[&str] = &[
    "click", "input", "change", "submit", "focus", "blur", "keydown", "keyup", "keypress",
];

/// Rewrite a JSX-ism prop name to its HTML attribute name.
///
/// ```
/// assert_eq!(weaver_common::html_attr_name("className"), "class");
/// assert_eq!(weaver_common::html_attr_name("htmlFor"), "for");
/// assert_eq!(weaver_common::html_attr_name("href"), "href");
/// ```
pub fn html_attr_name(prop: &str) -> &str {
    match prop {
        "className" => "class",
        "htmlFor" => "for",
        other => other,
    }
}

/// Void elements per the HTML spec. Serialized self-closing, no close tag.
pub fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}
