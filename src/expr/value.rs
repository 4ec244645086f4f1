//! Per-event values produced by the evaluator.

/// Result of evaluating an expression for one event: a number, or a list for
/// expressions over object collections.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    List(Vec<f64>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::List(_) => None,
        }
    }

    /// Non-zero and not NaN.
    pub fn truthy(x: f64) -> bool {
        x != 0.0 && !x.is_nan()
    }

    pub(super) fn bool(b: bool) -> f64 {
        if b { 1.0 } else { 0.0 }
    }

    pub(super) fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(x)),
            Value::List(v) => Value::List(v.into_iter().map(f).collect()),
        }
    }

    /// Apply `f` element-wise, broadcasting scalars against lists.
    pub(super) fn zip_with(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, String> {
        Ok(match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
            (Value::Scalar(a), Value::List(b)) => Value::List(b.into_iter().map(|y| f(a, y)).collect()),
            (Value::List(a), Value::Scalar(b)) => Value::List(a.into_iter().map(|x| f(x, b)).collect()),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Err(format!(
                        "collections of different length ({} vs {})",
                        a.len(),
                        b.len()
                    ));
                }
                Value::List(a.into_iter().zip(b).map(|(x, y)| f(x, y)).collect())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn broadcasting() {
        let v = Value::List(vec![1.0, 2.0]).zip_with(Value::Scalar(10.0), |a, b| a * b);
        assert_eq!(v, Ok(Value::List(vec![10.0, 20.0])));

        let v = Value::Scalar(1.0).zip_with(Value::List(vec![0.5, 2.0]), |a, b| a - b);
        assert_eq!(v, Ok(Value::List(vec![0.5, -1.0])));

        let err = Value::List(vec![1.0]).zip_with(Value::List(vec![1.0, 2.0]), |a, b| a + b);
        assert!(err.is_err());
    }

    #[test]
    fn nan_is_false() {
        assert!(Value::truthy(-0.5));
        assert!(!Value::truthy(0.0));
        assert!(!Value::truthy(f64::NAN));
    }
}
