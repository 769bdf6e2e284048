//! Author-facing signal handles and constructors.
//!
//! A [`Signal`] pairs the wire definition with the runtime back-references
//! (`logic_ref`, `deps_ref`, suspense trees, node props) that never cross
//! the wire. Constructors validate their inputs, compute the
//! content-addressable id, and hand back an immutable handle — deriving the
//! same signal twice yields the same id, so duplicates collapse in the
//! registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::def::{
    ActionDef, ComponentDef, ComputedDef, ExecutionContext, HandlerDef, LogicDef, MutatorDef,
    NodeDef, ReferenceDef, SignalDef, StateDef, StreamDef, SuspenseDef,
};
use crate::id::{content_id, derived_id, IdScope};
use crate::value::Value;
use crate::vnode::{collect_signal_ids, Vnode};

/// A prop value: a plain JSON literal or a signal binding.
#[derive(Clone)]
pub enum Prop {
    Value(Value),
    Signal(Signal),
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Value(v) => write!(f, "{v}"),
            Prop::Signal(s) => write!(f, "{s:?}"),
        }
    }
}

impl Prop {
    pub fn value(v: impl Into<Value>) -> Self {
        Prop::Value(v.into())
    }
}

impl From<&Signal> for Prop {
    fn from(s: &Signal) -> Self {
        Prop::Signal(s.clone())
    }
}

/// Component props. BTreeMap so key order is canonical by construction.
pub type Props = BTreeMap<String, Prop>;

/// An addressable unit in the reactive graph: the wire definition plus
/// in-process back-references.
#[derive(Clone)]
pub struct Signal {
    pub def: SignalDef,
    /// Full logic signal, for emitting its definition ahead of this one.
    pub logic_ref: Option<Arc<Signal>>,
    /// Full component signal of a node instance.
    pub component_ref: Option<Arc<Signal>>,
    /// Full dependency signals, in dep order.
    pub deps_ref: Vec<Signal>,
    /// Declared parameter count of a logic signal. Runtime-only hint used to
    /// validate dependency lists; not serialized.
    pub arity: Option<usize>,
    /// Suspense fallback tree.
    pub fallback_ref: Option<Arc<Vnode>>,
    /// Suspense children tree.
    pub children_ref: Option<Arc<Vnode>>,
    /// Original node props, with live signal handles.
    pub props_ref: Option<Props>,
}

impl Signal {
    fn bare(def: SignalDef) -> Self {
        Self {
            def,
            logic_ref: None,
            component_ref: None,
            deps_ref: Vec::new(),
            arity: None,
            fallback_ref: None,
            children_ref: None,
            props_ref: None,
        }
    }

    /// Rebuild a handle from a wire definition — no back-references. The
    /// client agent uses this for definitions that arrived via
    /// `weaver.push`; everything resolves through the registry from here.
    pub fn from_def(def: SignalDef) -> Self {
        Signal::bare(def)
    }

    pub fn id(&self) -> &str {
        self.def.id()
    }

    pub fn kind(&self) -> &'static str {
        self.def.kind()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({} {})", self.kind(), self.id())
    }
}

/// Writable state. The id is sequential within `scope`; `init` seeds the
/// registry value on first read.
pub fn state(scope: &IdScope, init: impl Into<Value>) -> Signal {
    Signal::bare(SignalDef::State(StateDef { id: scope.next_state_id(), init: init.into() }))
}

/// Builder for logic signals. The id is content-derived from `src` unless a
/// bundler-assigned id is supplied.
pub struct LogicBuilder {
    id: Option<String>,
    src: String,
    ssr_src: Option<String>,
    context: Option<ExecutionContext>,
    timeout: Option<u64>,
    arity: Option<usize>,
}

/// Start defining a logic signal for the module at `src`.
pub fn logic(src: impl Into<String>) -> LogicBuilder {
    LogicBuilder {
        id: None,
        src: src.into(),
        ssr_src: None,
        context: None,
        timeout: None,
        arity: None,
    }
}

impl LogicBuilder {
    /// Bundler-assigned id (`logic_…`). Overrides the content-derived one.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Module path for the server-side loader when it differs from `src`.
    pub fn ssr_src(mut self, src: impl Into<String>) -> Self {
        self.ssr_src = Some(src.into());
        self
    }

    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Race async execution against a timer. `0` always defers.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    /// Declare the parameter count so dependent constructors can validate
    /// their dependency lists.
    pub fn arity(mut self, n: usize) -> Self {
        self.arity = Some(n);
        self
    }

    pub fn build(self) -> Signal {
        let id = self.id.unwrap_or_else(|| content_id("logic", &self.src));
        let mut sig = Signal::bare(SignalDef::Logic(LogicDef {
            id,
            src: self.src,
            ssr_src: self.ssr_src,
            context: self.context,
            timeout: self.timeout,
        }));
        sig.arity = self.arity;
        sig
    }
}

fn expect_logic<'a>(sig: &'a Signal, role: &str) -> Result<&'a LogicDef> {
    match &sig.def {
        SignalDef::Logic(d) => Ok(d),
        other => bail!("{role} must be a logic signal, got {}", other.kind()),
    }
}

fn check_arity(logic_sig: &Signal, supplied: usize, reserved: usize) -> Result<()> {
    if let Some(arity) = logic_sig.arity {
        if supplied + reserved != arity {
            bail!(
                "logic '{}' takes {} argument(s), {} dependency(ies) supplied",
                logic_sig.id(),
                arity,
                supplied
            );
        }
    }
    Ok(())
}

fn dep_ids(deps: &[Signal]) -> Vec<String> {
    deps.iter().map(|d| d.id().to_string()).collect()
}

/// Derived value. Same logic + same deps (by id) collapses to the same id.
pub fn computed(logic_sig: &Signal, deps: &[Signal]) -> Result<Signal> {
    computed_inner(logic_sig, deps, None)
}

/// Derived value with a fallback seed used while execution is deferred.
pub fn computed_with_init(
    logic_sig: &Signal,
    deps: &[Signal],
    init: impl Into<Value>,
) -> Result<Signal> {
    computed_inner(logic_sig, deps, Some(init.into()))
}

fn computed_inner(logic_sig: &Signal, deps: &[Signal], init: Option<Value>) -> Result<Signal> {
    let logic_def = expect_logic(logic_sig, "computed logic")?;
    check_arity(logic_sig, deps.len(), 0)?;
    let ids = dep_ids(deps);
    let id = derived_id(&logic_def.id, &ids.iter().map(String::as_str).collect::<Vec<_>>());
    let mut sig = Signal::bare(SignalDef::Computed(ComputedDef {
        id,
        logic: logic_def.id.clone(),
        deps: ids,
        init,
    }));
    sig.logic_ref = Some(Arc::new(logic_sig.clone()));
    sig.deps_ref = deps.to_vec();
    Ok(sig)
}

/// Imperative signal: invoking it runs the logic, which writes through any
/// mutator dependencies.
pub fn action(logic_sig: &Signal, deps: &[Signal]) -> Result<Signal> {
    let logic_def = expect_logic(logic_sig, "action logic")?;
    check_arity(logic_sig, deps.len(), 0)?;
    let ids = dep_ids(deps);
    let id = derived_id(
        &format!("action:{}", logic_def.id),
        &ids.iter().map(String::as_str).collect::<Vec<_>>(),
    );
    let mut sig = Signal::bare(SignalDef::Action(ActionDef {
        id,
        logic: logic_def.id.clone(),
        deps: ids,
    }));
    sig.logic_ref = Some(Arc::new(logic_sig.clone()));
    sig.deps_ref = deps.to_vec();
    Ok(sig)
}

/// Action whose first argument position is reserved for the DOM event.
pub fn handler(logic_sig: &Signal, deps: &[Signal]) -> Result<Signal> {
    let logic_def = expect_logic(logic_sig, "handler logic")?;
    check_arity(logic_sig, deps.len(), 1)?;
    let ids = dep_ids(deps);
    let id = derived_id(
        &format!("handler:{}", logic_def.id),
        &ids.iter().map(String::as_str).collect::<Vec<_>>(),
    );
    let mut sig = Signal::bare(SignalDef::Handler(HandlerDef {
        id,
        logic: logic_def.id.clone(),
        deps: ids,
    }));
    sig.logic_ref = Some(Arc::new(logic_sig.clone()));
    sig.deps_ref = deps.to_vec();
    Ok(sig)
}

/// Bind a logic module to a component role.
pub fn component(logic_sig: &Signal) -> Result<Signal> {
    let logic_def = expect_logic(logic_sig, "component logic")?;
    let id = content_id("component", &logic_def.id);
    let mut sig =
        Signal::bare(SignalDef::Component(ComponentDef { id, logic: logic_def.id.clone() }));
    sig.logic_ref = Some(Arc::new(logic_sig.clone()));
    Ok(sig)
}

/// A component instance. Props are canonicalised (stable key order, signals
/// encoded as `{"$signal": id}`) before hashing, so two identical
/// instantiations collapse to one node.
pub fn node(component_sig: &Signal, props: Props) -> Result<Signal> {
    let component_def = match &component_sig.def {
        SignalDef::Component(d) => d,
        other => bail!("node component must be a component signal, got {}", other.kind()),
    };

    let mut canonical = serde_json::Map::new();
    let mut deps = Vec::new();
    let mut deps_ref = Vec::new();
    for (key, prop) in &props {
        match prop {
            Prop::Value(v) => {
                canonical.insert(key.clone(), v.clone());
            }
            Prop::Signal(sig) => {
                canonical
                    .insert(key.clone(), serde_json::json!({ "$signal": sig.id() }));
                deps.push(sig.id().to_string());
                deps_ref.push(sig.clone());
            }
        }
    }
    let canonical_json = serde_json::to_string(&canonical)?;
    let id = derived_id(&component_def.id, &[&canonical_json]);

    let mut sig = Signal::bare(SignalDef::Node(NodeDef {
        id,
        component: component_def.id.clone(),
        logic: component_def.logic.clone(),
        props: canonical,
        deps,
    }));
    sig.logic_ref = component_sig.logic_ref.clone();
    sig.component_ref = Some(Arc::new(component_sig.clone()));
    sig.deps_ref = deps_ref;
    sig.props_ref = Some(props);
    Ok(sig)
}

/// Reducer over a stream-producing source logic. The registry value starts
/// at `init` and advances once per source element.
pub fn stream(source: &Signal, reducer: &Signal, init: impl Into<Value>) -> Result<Signal> {
    let source_def = expect_logic(source, "stream source")?;
    let reducer_def = expect_logic(reducer, "stream reducer")?;
    let id = derived_id(&format!("stream:{}", source_def.id), &[&reducer_def.id]);
    let mut sig = Signal::bare(SignalDef::Stream(StreamDef {
        id,
        source: source_def.id.clone(),
        reducer: reducer_def.id.clone(),
        init: init.into(),
    }));
    sig.deps_ref = vec![source.clone(), reducer.clone()];
    Ok(sig)
}

/// Suspense boundary. The id is derived from the signals reachable in the
/// children tree; `pending_deps`/`children_html` are filled in by the
/// resolver during rendering.
pub fn suspense(fallback: Vnode, children: Vnode) -> Signal {
    let ids = collect_signal_ids(&children);
    let id = derived_id("suspense", &ids.iter().map(String::as_str).collect::<Vec<_>>());
    let mut sig = Signal::bare(SignalDef::Suspense(SuspenseDef {
        id,
        pending_deps: Vec::new(),
        children_html: None,
    }));
    sig.fallback_ref = Some(Arc::new(fallback));
    sig.children_ref = Some(Arc::new(children));
    sig
}

/// Read-only interface around a state signal.
pub fn reference(target: &Signal) -> Result<Signal> {
    expect_state(target, "reference")?;
    let id = derived_id("reference", &[target.id()]);
    let mut sig = Signal::bare(SignalDef::Reference(ReferenceDef {
        id,
        target: target.id().to_string(),
    }));
    sig.deps_ref = vec![target.clone()];
    Ok(sig)
}

/// Writable interface around a state signal. Logic receiving this dependency
/// gets a `{get, set}` handle that writes through to the registry.
pub fn mutator(target: &Signal) -> Result<Signal> {
    expect_state(target, "mutator")?;
    let id = derived_id("mutator", &[target.id()]);
    let mut sig =
        Signal::bare(SignalDef::Mutator(MutatorDef { id, target: target.id().to_string() }));
    sig.deps_ref = vec![target.clone()];
    Ok(sig)
}

fn expect_state(sig: &Signal, role: &str) -> Result<()> {
    match &sig.def {
        SignalDef::State(_) => Ok(()),
        other => bail!("{role} target must be a state signal, got {}", other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_logic(src: &str, arity: usize) -> Signal {
        logic(src).arity(arity).build()
    }

    #[test]
    fn computed_id_is_idempotent() {
        let scope = IdScope::new("t");
        let count = state(&scope, 0);
        let dbl = test_logic("/logic/double.js", 1);
        let a = computed(&dbl, &[count.clone()]).unwrap();
        let b = computed(&dbl, &[count.clone()]).unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn computed_rejects_arity_mismatch() {
        let scope = IdScope::new("t");
        let count = state(&scope, 0);
        let dbl = test_logic("/logic/double.js", 2);
        assert!(computed(&dbl, &[count]).is_err());
    }

    #[test]
    fn handler_reserves_event_slot() {
        let scope = IdScope::new("t");
        let count = state(&scope, 0);
        let inc = test_logic("/logic/inc.js", 2);
        let m = mutator(&count).unwrap();
        // 2 params = event + one dep.
        assert!(handler(&inc, &[m.clone()]).is_ok());
        assert!(handler(&inc, &[m.clone(), m]).is_err());
    }

    #[test]
    fn node_ids_collapse_for_identical_props() {
        let scope = IdScope::new("t");
        let alice = state(&scope, "Alice");
        let card_logic = logic("/components/card.js").build();
        let card = component(&card_logic).unwrap();

        let mut props_a = Props::new();
        props_a.insert("title".into(), Prop::value("User"));
        props_a.insert("name".into(), Prop::from(&alice));
        // Insertion order differs; canonical order must not.
        let mut props_b = Props::new();
        props_b.insert("name".into(), Prop::from(&alice));
        props_b.insert("title".into(), Prop::value("User"));

        let a = node(&card, props_a).unwrap();
        let b = node(&card, props_b).unwrap();
        assert_eq!(a.id(), b.id());

        match &a.def {
            SignalDef::Node(d) => {
                assert_eq!(d.deps, vec![alice.id().to_string()]);
                assert_eq!(d.props["name"], json!({"$signal": alice.id()}));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn wrappers_require_state_targets() {
        let dbl = test_logic("/logic/double.js", 1);
        assert!(mutator(&dbl).is_err());
        assert!(reference(&dbl).is_err());
    }
}
