//! Streaming renderer integration: scenario HTML shapes, source order under
//! parallel subtrees, fast-path equivalence, deferral, suspense.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use weaver_logic::{
    async_logic, component_logic, sync_logic, Executor, Loader, MapResolver, Side, WorkerPool,
};
use weaver_render::{
    render_stream, render_to_string, tokenize_to_vec, try_fast_tokens, RenderCtx, RenderSession,
};
use weaver_signal::{
    component, computed, el, fragment, handler, logic, mutator, node, state, suspense, text,
    IdScope, Prop, Props, Registry, Vnode,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn executor_with(resolver: MapResolver) -> Executor {
    let resolver: Arc<dyn weaver_logic::ModuleResolver> = Arc::new(resolver);
    let workers = Arc::new(WorkerPool::new(resolver.clone(), 1_000));
    Executor::new(Registry::default(), Arc::new(Loader::new(Side::Server, resolver, workers)))
}

fn double_resolver() -> MapResolver {
    MapResolver::new().with_module(
        "/logic/double.js",
        sync_logic(|args| Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))),
    )
}

fn slow_double_resolver(delay_ms: u64) -> MapResolver {
    MapResolver::new().with_module(
        "/logic/slow-double.js",
        async_logic(move |args| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))
        }),
    )
}

// ---------------------------------------------------------------------------
// Counter (S1)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counter_page_emits_markers_values_and_three_definitions() {
    let scope = IdScope::new("counter");
    let count = state(&scope, 0);
    let dbl = logic("/logic/double.js").arity(1).build();
    let doubled = computed(&dbl, &[count.clone()]).unwrap();

    let root: Vnode = el("div")
        .child(text("count="))
        .child(&count)
        .child(text(", doubled="))
        .child(&doubled)
        .into();

    let ctx = RenderCtx::new(executor_with(double_resolver()));
    let html = render_to_string(ctx, root).await;

    assert!(html.contains(&format!("<!--^{}-->0<!--/{}-->", count.id(), count.id())));
    assert!(html.contains(&format!("<!--^{}-->0<!--/{}-->", doubled.id(), doubled.id())));
    assert_eq!(
        html.matches("<script>weaver.push(").count(),
        3,
        "state + logic + computed, deduplicated: {html}"
    );
    assert!(html.contains(r#""kind":"signal-definition""#));
    assert!(html.starts_with("<div>count="));
    assert!(html.ends_with("</div>"));
}

// ---------------------------------------------------------------------------
// Source order under parallel subtrees
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_subtrees_emit_in_source_order() {
    let slow: weaver_signal::ComponentFn = Arc::new(|_props: Props| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(text("slow"))
        })
    });
    let fast: weaver_signal::ComponentFn =
        Arc::new(|_props: Props| Box::pin(async { Ok(text("fast")) }));

    let root: Vnode = el("div")
        .child(Vnode::Component { func: slow, props: Props::new() })
        .child(text("|"))
        .child(Vnode::Component { func: fast, props: Props::new() })
        .into();

    let ctx = RenderCtx::new(executor_with(MapResolver::new()));
    let html = render_to_string(ctx, root).await;
    assert_eq!(html, "<div>slow|fast</div>");
}

// ---------------------------------------------------------------------------
// Fast path (property 8)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fast_path_output_matches_the_token_pipeline_byte_for_byte() {
    let scope = IdScope::new("fast");
    let name = state(&scope, "Ada");
    let sync_subtree: Vnode = el("section")
        .attr("class", "profile")
        .child(el("h1").child(text("name: ")).child(&name))
        .into();

    // Fast path on a fresh context.
    let fast_ctx = RenderCtx::new(executor_with(MapResolver::new()));
    let tokens = tokenize_to_vec(&sync_subtree, &fast_ctx);
    let fast = try_fast_tokens(&tokens, &fast_ctx).expect("tree has no async work");

    // The same subtree forced through the streaming pipeline: appending an
    // async sibling disables the fast path for the pass.
    let lazy: weaver_signal::ComponentFn =
        Arc::new(|_props: Props| Box::pin(async { Ok(Vnode::Empty) }));
    let slow_root: Vnode = fragment(vec![
        sync_subtree.clone(),
        Vnode::Component { func: lazy, props: Props::new() },
    ]);
    let slow_ctx = RenderCtx::new(executor_with(MapResolver::new()));
    let slow = render_to_string(slow_ctx, slow_root).await;

    assert_eq!(fast, slow);
}

// ---------------------------------------------------------------------------
// Deferred rendering (S2)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn always_deferred_computed_renders_empty_then_follows_up() {
    let scope = IdScope::new("deferred");
    let count = state(&scope, 5);
    let slow = logic("/logic/slow-double.js").arity(1).timeout_ms(0).build();
    let doubled = computed(&slow, &[count.clone()]).unwrap();
    let root: Vnode = el("div").child(&doubled).into();

    let session = RenderSession::new(executor_with(slow_double_resolver(100)));
    let started = std::time::Instant::now();
    let html = session.into_string(root).await;

    // Initial content: empty between the bind markers.
    assert!(html.contains(&format!("<!--^{}--><!--/{}-->", doubled.id(), doubled.id())));
    // Follow-up script with the real value, delivered after the body ran.
    assert!(html.contains(r#""kind":"signal-update""#));
    assert!(html.contains(&format!(r#""id":"{}""#, doubled.id())));
    assert!(html.contains(r#""value":10"#));
    assert!(started.elapsed() >= Duration::from_millis(100));
    // The follow-up comes after the closing tag of the main content.
    let close = html.find("</div>").unwrap();
    let update = html.find(r#""kind":"signal-update""#).unwrap();
    assert!(update > close);
}

// ---------------------------------------------------------------------------
// Suspense (S3)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn suspense_shows_fallback_and_carries_pending_deps_and_children_html() {
    let scope = IdScope::new("suspense");
    let count = state(&scope, 5);
    let slow = logic("/logic/slow-double.js").arity(1).timeout_ms(0).build();
    let doubled = computed(&slow, &[count.clone()]).unwrap();

    let boundary = suspense(
        el("div").child(text("Loading")).into(),
        el("p").child(&doubled).into(),
    );
    let root: Vnode = el("main").child(&boundary).into();

    let session = RenderSession::new(executor_with(slow_double_resolver(30)));
    let html = session.into_string(root).await;

    // Fallback between the suspense markers.
    let open = html.find(&format!("<!--^{}-->", boundary.id())).unwrap();
    let close = html.find(&format!("<!--/{}-->", boundary.id())).unwrap();
    assert!(html[open..close].contains("<div>Loading</div>"));

    // The emitted definition carries the pending list and pre-rendered
    // children.
    assert!(html.contains(&format!(r#""pendingDeps":["{}"]"#, doubled.id())));
    assert!(html.contains(r#""_childrenHtml":"<p>"#));

    // The deferred still completes post-stream.
    assert!(html.contains(r#""kind":"signal-update""#));
    assert!(html.contains(r#""value":10"#));
}

#[tokio::test]
async fn suspense_with_settled_children_shows_them_verbatim() {
    let scope = IdScope::new("suspense");
    let count = state(&scope, 5);
    let dbl = logic("/logic/double.js").arity(1).build();
    let doubled = computed(&dbl, &[count.clone()]).unwrap();

    let boundary = suspense(
        el("div").child(text("Loading")).into(),
        el("p").child(&doubled).into(),
    );
    let root: Vnode = el("main").child(&boundary).into();

    let session = RenderSession::new(executor_with(double_resolver()));
    let html = session.into_string(root).await;

    let open = html.find(&format!("<!--^{}-->", boundary.id())).unwrap();
    let close = html.find(&format!("<!--/{}-->", boundary.id())).unwrap();
    assert!(!html[open..close].contains("Loading"));
    assert!(html[open..close].contains("<p>"));
    assert!(html[open..close].contains("10"));
    assert!(html.contains(r#""pendingDeps":[]"#));
}

// ---------------------------------------------------------------------------
// Nodes and components
// ---------------------------------------------------------------------------

#[tokio::test]
async fn node_signals_render_their_component_subtree_between_markers() {
    let scope = IdScope::new("node");
    let alice = state(&scope, "Alice");

    let card_logic = logic("/components/card.js").build();
    let card = component(&card_logic).unwrap();
    let mut props = Props::new();
    props.insert("name".into(), Prop::Signal(alice.clone()));
    props.insert("title".into(), Prop::Value(json!("User")));
    let instance = node(&card, props).unwrap();

    let resolver = MapResolver::new().with_module(
        "/components/card.js",
        component_logic(|props: Props| async move {
            let name = match props.get("name") {
                Some(Prop::Signal(signal)) => Vnode::from(signal.clone()),
                _ => Vnode::Empty,
            };
            Ok(el("article").attr("class", "card").child(name).into())
        }),
    );

    let ctx = RenderCtx::new(executor_with(resolver));
    let html = render_to_string(ctx, el("div").child(&instance).into()).await;

    assert!(html.contains(&format!("<!--^{}-->", instance.id())));
    assert!(html.contains(r#"<article class="card">"#));
    // The signal prop renders with its own markers inside the card.
    assert!(html.contains(&format!("<!--^{}-->Alice<!--/{}-->", alice.id(), alice.id())));
}

// ---------------------------------------------------------------------------
// Attribute and handler bindings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signal_props_emit_current_value_and_binding_attributes() {
    let scope = IdScope::new("attrs");
    let count = state(&scope, 0);
    let inc = logic("/logic/inc.js").arity(2).build();
    let on_click = handler(&inc, &[mutator(&count).unwrap()]).unwrap();
    let theme = state(&scope, "dark");

    let root: Vnode = el("button")
        .bind("className", &theme)
        .on("click", &on_click)
        .child(text("+1"))
        .into();

    let ctx = RenderCtx::new(executor_with(MapResolver::new()));
    let html = render_to_string(ctx, root).await;

    assert!(html.contains(r#"class="dark""#));
    assert!(html.contains(&format!(r#"data-w-class="{}""#, theme.id())));
    assert!(html.contains(&format!(r#"data-w-onclick="{}""#, on_click.id())));
    // Handler definitions (logic, mutator target, mutator, handler) are on
    // the wire for the client.
    assert!(html.contains(&format!(r#""id":"{}""#, on_click.id())));
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_chunk_flushes_immediately_then_batches() {
    let scope = IdScope::new("chunks");
    let count = state(&scope, 4);
    let dbl = logic("/logic/double.js").arity(1).build();
    let doubled = computed(&dbl, &[count.clone()]).unwrap();

    // Sync padding, an async boundary, more sync padding — the pipeline
    // emits three pieces, so chunk batching is observable.
    let mut root = el("div");
    for _ in 0..20 {
        root = root.child(el("p").child(text("padding padding padding")));
    }
    root = root.child(&doubled);
    for _ in 0..20 {
        root = root.child(el("p").child(text("padding padding padding")));
    }

    let session = RenderSession::new(executor_with(double_resolver())).chunk_bytes(256);
    let chunks: Vec<String> = session.into_stream(root.into()).collect().await;

    assert!(chunks.len() > 1, "expected multiple chunks, got {}", chunks.len());
    // The full document reassembles in order.
    let whole = chunks.concat();
    assert!(whole.contains(&format!("<!--^{}-->8<!--/{}-->", doubled.id(), doubled.id())));
    // Middle chunks respect the batch threshold; only the tail may be
    // smaller.
    for chunk in &chunks[1..chunks.len().saturating_sub(1)] {
        assert!(chunk.len() >= 256, "undersized middle chunk: {}", chunk.len());
    }
}

// ---------------------------------------------------------------------------
// Pre-pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_prepass_caches_server_computeds_for_the_fast_path() {
    let scope = IdScope::new("prepass");
    let count = state(&scope, 4);
    let dbl = logic("/logic/double.js")
        .arity(1)
        .context(weaver_signal::ExecutionContext::Server)
        .build();
    let doubled = computed(&dbl, &[count.clone()]).unwrap();
    let quadrupled = computed(&dbl, &[doubled.clone()]).unwrap();
    let root: Vnode = el("div").child(&doubled).child(&quadrupled).into();

    let session = RenderSession::new(executor_with(double_resolver())).with_prepass();
    let ctx_registry = session.ctx().registry().clone();
    let html = session.into_string(root).await;

    assert!(html.contains(">8<!--/") || html.contains("-->8<!--"), "doubled rendered: {html}");
    assert!(html.contains("16"));
    assert_eq!(
        ctx_registry.get_value(quadrupled.id()),
        Some(weaver_signal::SignalValue::Ready(json!(16)))
    );
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_the_output_stops_background_work() {
    let slow: weaver_signal::ComponentFn = Arc::new(|_props: Props| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(text("late"))
        })
    });
    let root: Vnode = el("div")
        .child(Vnode::Component { func: slow, props: Props::new() })
        .into();

    let ctx = RenderCtx::new(executor_with(MapResolver::new()));
    let mut stream = render_stream(ctx, root);
    let first = stream.next().await;
    assert!(first.is_some());
    drop(stream);
    // Nothing to assert beyond "no panic/hang": the child task observes the
    // closed channel and exits.
    tokio::time::sleep(Duration::from_millis(30)).await;
}
