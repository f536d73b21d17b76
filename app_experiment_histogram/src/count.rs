use serde::{Serialize, Serializer};
use serde_json::Value;
use std::{iter::Sum, ops::Add};

/// A bucket count or a sum of them. Integers stay exact; any float operand
/// turns the result into a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Count {
    Int(i128),
    Float(f64),
}

impl Count {
    /// Read a JSON number, preferring the exact integer forms.
    pub fn from_json(value: &Value) -> Option<Self> {
        let Value::Number(n) = value else {
            return None;
        };
        if let Some(i) = n.as_i64() {
            Some(Count::Int(i.into()))
        } else if let Some(u) = n.as_u64() {
            Some(Count::Int(u.into()))
        } else {
            n.as_f64().map(Count::Float)
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Count::Int(i) => i as f64,
            Count::Float(f) => f,
        }
    }
}

impl From<i64> for Count {
    fn from(i: i64) -> Self {
        Count::Int(i.into())
    }
}

impl From<u64> for Count {
    fn from(u: u64) -> Self {
        Count::Int(u.into())
    }
}

impl From<f64> for Count {
    fn from(f: f64) -> Self {
        Count::Float(f)
    }
}

impl Add for Count {
    type Output = Count;

    fn add(self, rhs: Count) -> Count {
        match (self, rhs) {
            (Count::Int(a), Count::Int(b)) => match a.checked_add(b) {
                Some(sum) => Count::Int(sum),
                None => Count::Float(a as f64 + b as f64),
            },
            (a, b) => Count::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl Sum for Count {
    fn sum<I: Iterator<Item = Count>>(iter: I) -> Self {
        iter.fold(Count::Int(0), Add::add)
    }
}

impl Serialize for Count {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match *self {
            Count::Int(i) => {
                if let Ok(i) = i64::try_from(i) {
                    s.serialize_i64(i)
                } else if let Ok(u) = u64::try_from(i) {
                    s.serialize_u64(u)
                } else {
                    s.collect_str(&i)
                }
            }
            Count::Float(f) => s.serialize_f64(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_large_integers() {
        assert_eq!(
            Count::from_json(&json!(9_007_199_254_740_993u64)),
            Some(Count::Int(9_007_199_254_740_993))
        );
        assert_eq!(
            Count::from_json(&json!(u64::MAX)),
            Some(Count::Int(u64::MAX.into()))
        );
        assert_eq!(Count::from_json(&json!(-3)), Some(Count::Int(-3)));
        assert_eq!(Count::from_json(&json!(0.5)), Some(Count::Float(0.5)));
        assert_eq!(Count::from_json(&json!("1")), None);
    }

    #[test]
    fn test_sum_stays_integral() {
        let sum: Count = [1u64, 0, 2, 0, 5].into_iter().map(Count::from).sum();
        assert_eq!(sum, Count::Int(8));

        let empty: Count = std::iter::empty::<Count>().sum();
        assert_eq!(empty, Count::Int(0));

        let big = Count::from(u64::MAX) + Count::from(u64::MAX);
        assert_eq!(big, Count::Int(2 * u128::from(u64::MAX) as i128));
    }

    #[test]
    fn test_float_operand_makes_float() {
        assert_eq!(Count::from(1u64) + Count::from(0.5), Count::Float(1.5));

        let overflow = Count::Int(i128::MAX) + Count::Int(1);
        assert!(matches!(overflow, Count::Float(_)));
    }
}
