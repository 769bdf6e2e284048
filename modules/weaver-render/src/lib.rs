//! The streaming renderer: tokenizer, HTML serializer, the ordered
//! sequencer, the render pipeline with its fast path, and the suspense
//! resolver.
//!
//! Rendering walks the tree into tokens, serializes synchronous runs
//! immediately, and chains every async subtree (function components, node
//! signals, async computeds, suspense boundaries) into the output at its
//! source position while the work races in the background. Emitted HTML is
//! always in source order.

pub mod context;
pub mod pipeline;
pub mod sequencer;
pub mod serialize;
pub mod session;
pub mod suspense;
pub mod token;
pub mod tokenize;

pub use context::{PendingWork, RenderCtx};
pub use pipeline::{render_stream, render_to_string, server_prepass, try_fast_tokens};
pub use sequencer::{sequencer, Sequencer};
pub use serialize::{signal_script, tokens_html, update_script, Chunker};
pub use session::{PipelineRenderer, RenderSession};
pub use token::Token;
pub use tokenize::{register_tree, tokenize, tokenize_to_vec};
