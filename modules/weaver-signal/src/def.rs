//! Wire-format signal definitions. These are exactly what crosses the wire
//! in `weaver.push({kind:"signal-definition", signal: …})` scripts and in
//! signal chains — no runtime back-references, everything serde.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Where a logic module may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    Server,
    Client,
    Worker,
}

/// A signal definition, tagged by kind. Field names follow the wire format
/// (camelCase) so a JSON payload round-trips byte-compatibly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalDef {
    State(StateDef),
    Logic(LogicDef),
    Computed(ComputedDef),
    Action(ActionDef),
    Handler(HandlerDef),
    Component(ComponentDef),
    Node(NodeDef),
    Stream(StreamDef),
    Suspense(SuspenseDef),
    Reference(ReferenceDef),
    Mutator(MutatorDef),
}

/// Writable leaf. The value lives in the registry; `init` is the seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub id: String,
    pub init: Value,
}

/// Addressable code module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicDef {
    pub id: String,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssr_src: Option<String>,
    /// Absent means isomorphic: executes wherever invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,
    /// Milliseconds. `Some(0)` always defers; absent blocks until resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Derived value: `logic(deps…)`, cached in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedDef {
    pub id: String,
    pub logic: String,
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Value>,
}

/// Imperative logic that mutates its dependencies when invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    pub id: String,
    pub logic: String,
    pub deps: Vec<String>,
}

/// An action whose first argument is a DOM event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDef {
    pub id: String,
    pub logic: String,
    pub deps: Vec<String>,
}

/// Template binding a logic module to a component role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub id: String,
    pub logic: String,
}

/// A component instance with canonicalised props. Signal-valued props are
/// encoded as `{"$signal": id}` and extracted into `deps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    pub component: String,
    pub logic: String,
    pub props: serde_json::Map<String, Value>,
    pub deps: Vec<String>,
}

/// Reducer over a stream source logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDef {
    pub id: String,
    pub source: String,
    pub reducer: String,
    pub init: Value,
}

/// Suspense boundary. `pending_deps` is mutated in place by the resolver
/// before the definition is emitted; `children_html` is the pre-rendered
/// content the client swaps in once every pending dep resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspenseDef {
    pub id: String,
    #[serde(rename = "pendingDeps", default)]
    pub pending_deps: Vec<String>,
    #[serde(rename = "_childrenHtml", default, skip_serializing_if = "Option::is_none")]
    pub children_html: Option<String>,
}

/// Read-only interface around a state signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDef {
    pub id: String,
    pub target: String,
}

/// Writable interface around a state signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutatorDef {
    pub id: String,
    pub target: String,
}

impl SignalDef {
    pub fn id(&self) -> &str {
        match self {
            SignalDef::State(d) => &d.id,
            SignalDef::Logic(d) => &d.id,
            SignalDef::Computed(d) => &d.id,
            SignalDef::Action(d) => &d.id,
            SignalDef::Handler(d) => &d.id,
            SignalDef::Component(d) => &d.id,
            SignalDef::Node(d) => &d.id,
            SignalDef::Stream(d) => &d.id,
            SignalDef::Suspense(d) => &d.id,
            SignalDef::Reference(d) => &d.id,
            SignalDef::Mutator(d) => &d.id,
        }
    }

    /// Human tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalDef::State(_) => "state",
            SignalDef::Logic(_) => "logic",
            SignalDef::Computed(_) => "computed",
            SignalDef::Action(_) => "action",
            SignalDef::Handler(_) => "handler",
            SignalDef::Component(_) => "component",
            SignalDef::Node(_) => "node",
            SignalDef::Stream(_) => "stream",
            SignalDef::Suspense(_) => "suspense",
            SignalDef::Reference(_) => "reference",
            SignalDef::Mutator(_) => "mutator",
        }
    }

    /// Value-bearing dependencies: the ids whose updates feed this signal.
    pub fn deps(&self) -> &[String] {
        match self {
            SignalDef::Computed(d) => &d.deps,
            SignalDef::Action(d) => &d.deps,
            SignalDef::Handler(d) => &d.deps,
            SignalDef::Node(d) => &d.deps,
            _ => &[],
        }
    }

    /// Every id this definition references. Used for integrity checking and
    /// signal-chain closure.
    pub fn refs(&self) -> Vec<String> {
        match self {
            SignalDef::State(_) | SignalDef::Logic(_) => vec![],
            SignalDef::Computed(d) => {
                let mut r = vec![d.logic.clone()];
                r.extend(d.deps.iter().cloned());
                r
            }
            SignalDef::Action(d) => {
                let mut r = vec![d.logic.clone()];
                r.extend(d.deps.iter().cloned());
                r
            }
            SignalDef::Handler(d) => {
                let mut r = vec![d.logic.clone()];
                r.extend(d.deps.iter().cloned());
                r
            }
            SignalDef::Component(d) => vec![d.logic.clone()],
            SignalDef::Node(d) => {
                let mut r = vec![d.component.clone(), d.logic.clone()];
                r.extend(d.deps.iter().cloned());
                r
            }
            SignalDef::Stream(d) => vec![d.source.clone(), d.reducer.clone()],
            SignalDef::Suspense(d) => d.pending_deps.clone(),
            SignalDef::Reference(d) => vec![d.target.clone()],
            SignalDef::Mutator(d) => vec![d.target.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_kind_tagged_camel_case() {
        let def = SignalDef::Logic(LogicDef {
            id: "logic_ab".into(),
            src: "/logic/double.js".into(),
            ssr_src: Some("/ssr/double.js".into()),
            context: Some(ExecutionContext::Server),
            timeout: Some(0),
        });
        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(
            wire,
            json!({
                "kind": "logic",
                "id": "logic_ab",
                "src": "/logic/double.js",
                "ssrSrc": "/ssr/double.js",
                "context": "server",
                "timeout": 0,
            })
        );
    }

    #[test]
    fn suspense_wire_keeps_children_html_field_name() {
        let def = SignalDef::Suspense(SuspenseDef {
            id: "sus_1".into(),
            pending_deps: vec!["abc".into()],
            children_html: Some("<p>hi</p>".into()),
        });
        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(wire["pendingDeps"], json!(["abc"]));
        assert_eq!(wire["_childrenHtml"], json!("<p>hi</p>"));
    }

    #[test]
    fn optional_logic_fields_stay_off_the_wire() {
        let def = SignalDef::Logic(LogicDef {
            id: "logic_cd".into(),
            src: "/logic/inc.js".into(),
            ssr_src: None,
            context: None,
            timeout: None,
        });
        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(wire, json!({"kind": "logic", "id": "logic_cd", "src": "/logic/inc.js"}));
    }
}
