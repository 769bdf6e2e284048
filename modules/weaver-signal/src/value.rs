//! Signal values. `Pending` is the "not yet resolved" sentinel; it renders
//! as the empty string everywhere.

pub use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Pending,
    Ready(Value),
}

impl SignalValue {
    pub fn ready(v: impl Into<Value>) -> Self {
        SignalValue::Ready(v.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SignalValue::Pending)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            SignalValue::Pending => None,
            SignalValue::Ready(v) => Some(v),
        }
    }

    /// Clone out the inner value, substituting JSON null while pending.
    pub fn to_value(&self) -> Value {
        match self {
            SignalValue::Pending => Value::Null,
            SignalValue::Ready(v) => v.clone(),
        }
    }

    /// Text rendering of a value. Pending and null are empty; strings render
    /// without quotes; everything else renders as its JSON text.
    pub fn display_text(&self) -> String {
        match self {
            SignalValue::Pending => String::new(),
            SignalValue::Ready(Value::Null) => String::new(),
            SignalValue::Ready(Value::String(s)) => s.clone(),
            SignalValue::Ready(other) => other.to_string(),
        }
    }
}

impl From<Value> for SignalValue {
    fn from(v: Value) -> Self {
        SignalValue::Ready(v)
    }
}
