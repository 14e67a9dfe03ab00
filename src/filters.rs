//! Comparison expressions bound to column names at render time.

use serde_json::Value;

/// A filter predicate for one column. Dialects render the operator; the
/// filter itself is dialect-agnostic. Bare values convert to `Eq`.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Ge(Value),
    Lt(Value),
    Le(Value),
    Is(Value),
    IsNot(Value),
}

impl Filter {
    pub fn operator(&self) -> &'static str {
        match self {
            Filter::Eq(_) => "=",
            Filter::Ne(_) => "<>",
            Filter::Gt(_) => ">",
            Filter::Ge(_) => ">=",
            Filter::Lt(_) => "<",
            Filter::Le(_) => "<=",
            Filter::Is(_) => "IS",
            Filter::IsNot(_) => "IS NOT",
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Filter::Eq(v)
            | Filter::Ne(v)
            | Filter::Gt(v)
            | Filter::Ge(v)
            | Filter::Lt(v)
            | Filter::Le(v)
            | Filter::Is(v)
            | Filter::IsNot(v) => v,
        }
    }

    /// Same operator with a replaced value, e.g. after wire conversion.
    pub fn with_value(&self, value: Value) -> Filter {
        match self {
            Filter::Eq(_) => Filter::Eq(value),
            Filter::Ne(_) => Filter::Ne(value),
            Filter::Gt(_) => Filter::Gt(value),
            Filter::Ge(_) => Filter::Ge(value),
            Filter::Lt(_) => Filter::Lt(value),
            Filter::Le(_) => Filter::Le(value),
            Filter::Is(_) => Filter::Is(value),
            Filter::IsNot(_) => Filter::IsNot(value),
        }
    }
}

impl From<Value> for Filter {
    fn from(v: Value) -> Self {
        Filter::Eq(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_value_renders_as_equality() {
        let f: Filter = json!("x").into();
        assert_eq!(f.operator(), "=");
        assert_eq!(f.value(), &json!("x"));
    }

    #[test]
    fn operators() {
        assert_eq!(Filter::Ne(json!(1)).operator(), "<>");
        assert_eq!(Filter::Ge(json!(1)).operator(), ">=");
        assert_eq!(Filter::IsNot(Value::Null).operator(), "IS NOT");
    }
}
