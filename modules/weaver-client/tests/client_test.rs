//! Client agent integration: boot from streamed HTML, event delegation,
//! surgical updates, and the parse/serialize round trip.

use std::sync::Arc;

use serde_json::json;

use weaver_client::{ClientAgent, Dom};
use weaver_logic::{
    sync_logic, Executor, Loader, MapResolver, Side, WorkerPool,
};
use weaver_render::{render_to_string, RenderCtx, RenderSession};
use weaver_signal::{
    computed, el, handler, logic, mutator, state, text, IdScope, Registry, Vnode,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn isomorphic_resolver() -> MapResolver {
    MapResolver::new()
        .with_module(
            "/logic/double.js",
            sync_logic(|args| Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))),
        )
        .with_module(
            "/logic/inc.js",
            sync_logic(|args| {
                let current = args[1].value().as_i64().unwrap_or(0);
                args[1].set(json!(current + 1))?;
                Ok(json!(null))
            }),
        )
}

fn server_executor(resolver: MapResolver) -> Executor {
    let resolver: Arc<dyn weaver_logic::ModuleResolver> = Arc::new(resolver);
    let workers = Arc::new(WorkerPool::new(resolver.clone(), 1_000));
    Executor::new(Registry::default(), Arc::new(Loader::new(Side::Server, resolver, workers)))
}

fn client_loader(resolver: MapResolver) -> Loader {
    let resolver: Arc<dyn weaver_logic::ModuleResolver> = Arc::new(resolver);
    let workers = Arc::new(WorkerPool::new(resolver.clone(), 1_000));
    Loader::new(Side::Client, resolver, workers)
}

// ---------------------------------------------------------------------------
// Round trip (property 3)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parse_then_serialize_preserves_rendered_html() {
    let scope = IdScope::new("roundtrip");
    let count = state(&scope, 7);
    let root: Vnode = el("div")
        .attr("class", "a&b")
        .child(el("img").attr("src", "/x.png"))
        .child(text("1 < 2"))
        .child(&count)
        .into();

    let ctx = RenderCtx::new(server_executor(MapResolver::new()));
    let html = render_to_string(ctx, root).await;

    let dom = Dom::parse(&html).unwrap();
    assert_eq!(dom.to_html(), html);
}

// ---------------------------------------------------------------------------
// Boot + synthesised update (S1)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn booted_client_applies_updates_and_recomputes_dependents() {
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
    let html = render_to_string(RenderCtx::new(server_executor(isomorphic_resolver())), root)
        .await;

    let mut agent = ClientAgent::boot(&html, client_loader(isomorphic_resolver()))
        .await
        .unwrap();

    // The boot registry mirrors the server's definitions.
    assert!(agent.registry().contains(count.id()));
    assert!(agent.registry().contains(doubled.id()));
    assert_eq!(agent.region_text(count.id()).as_deref(), Some("0"));

    agent.apply_update(count.id(), json!(5)).await.unwrap();
    assert_eq!(agent.region_text(count.id()).as_deref(), Some("5"));
    assert_eq!(agent.region_text(doubled.id()).as_deref(), Some("10"));
}

// ---------------------------------------------------------------------------
// Handler reactivity (S4)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_clicks_leave_the_counter_at_three() {
    let scope = IdScope::new("clicks");
    let count = state(&scope, 0);
    let inc = logic("/logic/inc.js").arity(2).build();
    let on_click = handler(&inc, &[mutator(&count).unwrap()]).unwrap();

    let root: Vnode = el("div")
        .child(el("button").on("click", &on_click).child(text("+1")))
        .child(el("span").child(&count))
        .into();
    let html = render_to_string(RenderCtx::new(server_executor(isomorphic_resolver())), root)
        .await;

    let mut agent = ClientAgent::boot(&html, client_loader(isomorphic_resolver()))
        .await
        .unwrap();

    let button = agent
        .with_dom(|dom| dom.find_by_attr("data-w-onclick", on_click.id()))
        .expect("button carries the handler binding");
    for expected in 1..=3 {
        let handled = agent
            .dispatch_dom_event(button, "click", json!({"type": "click"}))
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(
            agent.region_text(count.id()).as_deref(),
            Some(expected.to_string().as_str()),
            "DOM reflects each intermediate value"
        );
    }
}

#[tokio::test]
async fn events_without_a_binding_are_ignored() {
    let scope = IdScope::new("clicks");
    let count = state(&scope, 0);
    let root: Vnode = el("div").child(el("span").child(&count)).into();
    let html = render_to_string(RenderCtx::new(server_executor(MapResolver::new())), root)
        .await;

    let mut agent = ClientAgent::boot(&html, client_loader(MapResolver::new()))
        .await
        .unwrap();
    let span = agent.with_dom(|dom| dom.find_tag("span")).unwrap();
    let handled = agent
        .dispatch_dom_event(span, "click", json!({"type": "click"}))
        .await
        .unwrap();
    assert!(!handled);
}

// ---------------------------------------------------------------------------
// Delegation walks ancestors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delegated_events_bubble_to_the_bound_ancestor() {
    let scope = IdScope::new("bubble");
    let count = state(&scope, 0);
    let inc = logic("/logic/inc.js").arity(2).build();
    let on_click = handler(&inc, &[mutator(&count).unwrap()]).unwrap();

    let root: Vnode = el("div")
        .on("click", &on_click)
        .child(el("button").child(el("b").child(text("deep"))))
        .child(&count)
        .into();
    let html = render_to_string(RenderCtx::new(server_executor(isomorphic_resolver())), root)
        .await;

    let mut agent = ClientAgent::boot(&html, client_loader(isomorphic_resolver()))
        .await
        .unwrap();
    let deep = agent.with_dom(|dom| dom.find_tag("b")).unwrap();
    let handled = agent
        .dispatch_dom_event(deep, "click", json!({"type": "click"}))
        .await
        .unwrap();
    assert!(handled);
    assert_eq!(agent.region_text(count.id()).as_deref(), Some("1"));
}

// ---------------------------------------------------------------------------
// Attribute bindings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn updates_touch_bound_attributes() {
    let scope = IdScope::new("attrs");
    let theme = state(&scope, "dark");
    let root: Vnode = el("div")
        .child(el("section").bind("className", &theme).child(text("body")))
        .into();
    let html = render_to_string(RenderCtx::new(server_executor(MapResolver::new())), root)
        .await;

    let mut agent = ClientAgent::boot(&html, client_loader(MapResolver::new()))
        .await
        .unwrap();

    agent.apply_update(theme.id(), json!("light")).await.unwrap();
    let section = agent.with_dom(|dom| dom.find_tag("section")).unwrap();
    agent.with_dom(|dom| {
        assert_eq!(dom.attr(section, "class"), Some("light"));
    });
}

// ---------------------------------------------------------------------------
// Post-stream follow-ups replay at boot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deferred_follow_up_scripts_are_applied_during_boot() {
    let scope = IdScope::new("replay");
    let count = state(&scope, 5);
    let slow = logic("/logic/slow.js").arity(1).timeout_ms(0).build();
    let doubled = computed(&slow, &[count.clone()]).unwrap();
    let root: Vnode = el("div").child(&doubled).into();

    let resolver = MapResolver::new().with_module(
        "/logic/slow.js",
        weaver_logic::async_logic(|args: Vec<weaver_logic::Arg>| async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))
        }),
    );
    // Full response: initial empty region + post-stream follow-up script.
    let html = RenderSession::new(server_executor(resolver)).into_string(root).await;
    assert!(html.contains(r#""kind":"signal-update""#));

    let agent = ClientAgent::boot(&html, client_loader(MapResolver::new()))
        .await
        .unwrap();
    // The replayed update landed in the region.
    assert_eq!(agent.region_text(doubled.id()).as_deref(), Some("10"));
}

// ---------------------------------------------------------------------------
// Suspense swap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn suspense_swaps_children_in_once_pending_deps_resolve() {
    let scope = IdScope::new("swap");
    let count = state(&scope, 5);
    let slow = logic("/logic/slow.js").arity(1).timeout_ms(0).build();
    let doubled = computed(&slow, &[count.clone()]).unwrap();
    let boundary = weaver_signal::suspense(
        el("div").child(text("Loading")).into(),
        el("p").child(text("value: ")).child(&doubled).into(),
    );
    let root: Vnode = el("main").child(&boundary).into();

    let resolver = MapResolver::new().with_module(
        "/logic/slow.js",
        weaver_logic::async_logic(|args: Vec<weaver_logic::Arg>| async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))
        }),
    );
    let html = RenderSession::new(server_executor(resolver)).into_string(root).await;
    // Streamed with the fallback showing.
    assert!(html.contains("Loading"));

    let agent = ClientAgent::boot(&html, client_loader(MapResolver::new()))
        .await
        .unwrap();

    // Boot replayed the follow-up, so the boundary swapped to its children
    // and the inner region carries the resolved value.
    let region = agent.region_text(boundary.id()).unwrap();
    assert!(region.contains("value: "), "children swapped in: {region}");
    assert!(!region.contains("Loading"));
    assert_eq!(agent.region_text(doubled.id()).as_deref(), Some("10"));
}
