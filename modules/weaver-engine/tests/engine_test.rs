//! Propagation engine integration: cascades, topological ordering,
//! handler-driven updates, deferred and stream completions.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use weaver_engine::{Engine, EngineEvent, NullRenderer, RecordingSink};
use weaver_logic::{
    stream_logic, sync_logic, Executor, Loader, MapResolver, Side, WorkerPool,
};
use weaver_signal::{
    computed, handler, logic, mutator, state, stream, IdScope, Registry, Signal, SignalValue,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn engine_with(
    resolver: MapResolver,
    signals: &[&Signal],
) -> (Engine, Arc<RecordingSink>, Registry) {
    let registry = Registry::default();
    for signal in signals {
        registry.register_signal(signal).unwrap();
    }
    let resolver: Arc<dyn weaver_logic::ModuleResolver> = Arc::new(resolver);
    let workers = Arc::new(WorkerPool::new(resolver.clone(), 1_000));
    let loader = Loader::new(Side::Server, resolver, workers);
    let executor = Executor::new(registry.clone(), Arc::new(loader));
    let sink = Arc::new(RecordingSink::new());
    let engine = Engine::new(executor, sink.clone(), Arc::new(NullRenderer));
    (engine, sink, registry)
}

fn double_resolver() -> MapResolver {
    MapResolver::new().with_module(
        "/logic/double.js",
        sync_logic(|args| Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))),
    )
}

// ---------------------------------------------------------------------------
// Cascades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_cascades_in_topological_order() {
    let scope = IdScope::new("engine");
    let count = state(&scope, 2);
    let dbl = logic("/logic/double.js").arity(1).build();
    let doubled = computed(&dbl, &[count.clone()]).unwrap();
    let quadrupled = computed(&dbl, &[doubled.clone()]).unwrap();

    let (mut engine, sink, registry) =
        engine_with(double_resolver(), &[&doubled, &quadrupled]);

    engine.dispatch(EngineEvent::update(count.id(), 3)).await.unwrap();

    assert_eq!(
        sink.updates(),
        vec![
            (count.id().to_string(), json!(3)),
            (doubled.id().to_string(), json!(6)),
            (quadrupled.id().to_string(), json!(12)),
        ]
    );
    assert_eq!(registry.get_value(count.id()), Some(SignalValue::Ready(json!(3))));
    assert_eq!(registry.get_value(doubled.id()), Some(SignalValue::Ready(json!(6))));
    assert_eq!(registry.get_value(quadrupled.id()), Some(SignalValue::Ready(json!(12))));
}

#[tokio::test]
async fn diamond_dependents_execute_exactly_once_per_pass() {
    let scope = IdScope::new("engine");
    let count = state(&scope, 1);
    let dbl = logic("/logic/double.js").arity(1).build();
    let sum = logic("/logic/sum.js").arity(2).build();
    let left = computed(&dbl, &[count.clone()]).unwrap();
    let right = computed(&dbl, &[count.clone()]).unwrap();
    // Identical derivations collapse; force distinct shapes instead.
    assert_eq!(left.id(), right.id());
    let quad = computed(&dbl, &[left.clone()]).unwrap();
    let joined = computed(&sum, &[left.clone(), quad.clone()]).unwrap();

    let resolver = double_resolver().with_module(
        "/logic/sum.js",
        sync_logic(|args| {
            Ok(json!(args.iter().filter_map(|a| a.value().as_i64()).sum::<i64>()))
        }),
    );
    let (mut engine, sink, _registry) = engine_with(resolver, &[&joined, &quad]);

    engine.dispatch(EngineEvent::update(count.id(), 2)).await.unwrap();

    let ids = sink.ids();
    assert_eq!(ids.len(), 4, "root + three dependents, once each: {ids:?}");
    let joined_updates: Vec<_> = sink
        .updates()
        .into_iter()
        .filter(|(id, _)| id == joined.id())
        .collect();
    // 2 → left 4, quad 8, joined 12 — computed once, from settled inputs.
    assert_eq!(joined_updates, vec![(joined.id().to_string(), json!(12))]);
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_execution_emits_updates_for_each_dependency() {
    let scope = IdScope::new("engine");
    let count = state(&scope, 0);
    let inc = logic("/logic/inc.js").arity(2).build();
    let dbl = logic("/logic/double.js").arity(1).build();
    let on_click = handler(&inc, &[mutator(&count).unwrap()]).unwrap();
    let doubled = computed(&dbl, &[count.clone()]).unwrap();

    let resolver = double_resolver().with_module(
        "/logic/inc.js",
        sync_logic(|args| {
            let current = args[1].value().as_i64().unwrap_or(0);
            args[1].set(json!(current + 1))?;
            Ok(json!(null))
        }),
    );
    let (mut engine, sink, registry) = engine_with(resolver, &[&on_click, &doubled]);

    for _ in 0..3 {
        engine
            .dispatch(EngineEvent::handler(on_click.id(), json!({"type": "click"})))
            .await
            .unwrap();
    }

    // Mutations land on the underlying state; the dependent recomputes.
    assert_eq!(registry.get_value(count.id()), Some(SignalValue::Ready(json!(3))));
    assert_eq!(registry.get_value(doubled.id()), Some(SignalValue::Ready(json!(6))));
    // Each click emitted the state update and the cascaded computed.
    let count_updates: Vec<_> =
        sink.updates().into_iter().filter(|(id, _)| id == count.id()).collect();
    assert_eq!(
        count_updates,
        vec![
            (count.id().to_string(), json!(1)),
            (count.id().to_string(), json!(2)),
            (count.id().to_string(), json!(3)),
        ]
    );
}

// ---------------------------------------------------------------------------
// Deferred and stream completions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deferred_completions_flow_after_the_synchronous_pass() {
    let scope = IdScope::new("engine");
    let count = state(&scope, 5);
    let slow = logic("/logic/slow.js").arity(1).timeout_ms(0).build();
    let lagged = computed(&slow, &[count.clone()]).unwrap();

    let resolver = MapResolver::new().with_module(
        "/logic/slow.js",
        weaver_logic::async_logic(|args: Vec<weaver_logic::Arg>| async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))
        }),
    );
    let (mut engine, sink, registry) = engine_with(resolver, &[&lagged]);

    engine.dispatch(EngineEvent::update(count.id(), 7)).await.unwrap();
    // Synchronous pass saw the pending fallback.
    assert_eq!(registry.get_value(lagged.id()), Some(SignalValue::Pending));
    assert!(engine.has_pending());

    engine.run_until_idle().await.unwrap();
    assert_eq!(registry.get_value(lagged.id()), Some(SignalValue::Ready(json!(14))));
    let last = sink.updates().into_iter().last().unwrap();
    assert_eq!(last, (lagged.id().to_string(), json!(14)));
}

#[tokio::test]
async fn stream_signals_reduce_element_by_element() {
    let ticks = logic("/logic/ticks.js").arity(0).build();
    let add = logic("/logic/add.js").arity(2).build();
    let total = stream(&ticks, &add, 0).unwrap();

    let resolver = MapResolver::new()
        .with_module(
            "/logic/ticks.js",
            stream_logic(|_| futures::stream::iter(vec![json!(1), json!(2), json!(3)]).boxed()),
        )
        .with_module(
            "/logic/add.js",
            sync_logic(|args| {
                Ok(json!(
                    args[0].value().as_i64().unwrap_or(0) + args[1].value().as_i64().unwrap_or(0)
                ))
            }),
        );
    let (mut engine, sink, registry) = engine_with(resolver, &[&total]);

    let outcome = engine.executor().execute_stream(total.id()).await.unwrap();
    assert_eq!(outcome.value, SignalValue::Ready(json!(0)));
    engine.track(total.id().to_string(), outcome.deferred.unwrap());
    engine.run_until_idle().await.unwrap();

    assert_eq!(
        sink.updates(),
        vec![
            (total.id().to_string(), json!(1)),
            (total.id().to_string(), json!(3)),
            (total.id().to_string(), json!(6)),
        ]
    );
    assert_eq!(registry.get_value(total.id()), Some(SignalValue::Ready(json!(6))));
}
