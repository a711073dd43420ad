//! Loosely typed option bag submitted with a training request

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{EasyMlError, Result};

/// Ordered map of option name to JSON value.
///
/// Values coming from form fields are often strings, so the typed getters
/// accept `"3"`, `"0.5"`, `"true"`, `"on"` and friends as well as native JSON.
/// A missing key or a JSON `null` yields the caller's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBag(BTreeMap<String, Value>);

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Parse a `key=value` pair; the value is read as JSON when possible,
    /// otherwise kept as a plain string
    pub fn insert_pair(&mut self, pair: &str) -> Result<()> {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            EasyMlError::InvalidInput(format!("expected key=value, got '{}'", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(EasyMlError::InvalidInput(format!("empty key in '{}'", pair)));
        }
        let value = serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.trim().to_string()));
        self.insert(key, value);
        Ok(())
    }

    /// String value, numbers and booleans rendered as text
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|value| match value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or_else(|| default.to_string())
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(true),
                "false" | "0" | "off" | "no" | "" => Ok(false),
                other => Err(EasyMlError::invalid_parameter(key, other, "expected a boolean")),
            },
            other => Err(EasyMlError::invalid_parameter(key, other, "expected a boolean")),
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => parse_number::<f64>(key, value),
        }
    }

    /// Non-negative integer; integral floats such as `5.0` are accepted
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => integral(key, value),
        }
    }

    /// Optional non-negative integer, where `"none"` also means absent
    pub fn opt_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("none") => {
                Ok(None)
            }
            Some(value) => integral(key, value).map(Some),
        }
    }

    /// Parse the value with `FromStr`, falling back to `default` when absent
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr<Err = EasyMlError>,
    {
        match self.get_str(key) {
            None => Ok(default),
            Some(s) => s.parse(),
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &Value) -> Result<T> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    text.parse::<T>()
        .map_err(|_| EasyMlError::invalid_parameter(key, &text, "expected a number"))
}

fn integral(key: &str, value: &Value) -> Result<usize> {
    let number: f64 = parse_number(key, value)?;
    if number < 0.0 || number.fract() != 0.0 || !number.is_finite() {
        return Err(EasyMlError::invalid_parameter(
            key,
            number,
            "expected a non-negative integer",
        ));
    }
    Ok(number as usize)
}

impl From<BTreeMap<String, Value>> for ParameterBag {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ParameterBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_absent_or_null() {
        let bag = ParameterBag::new().with("nnc_k", Value::Null);
        assert_eq!(bag.usize_or("nnc_k", 5).unwrap(), 5);
        assert!(!bag.bool_or("linreg_fit_intercept", false).unwrap());
        assert_eq!(bag.str_or("lda_solver", "svd"), "svd");
        assert_eq!(bag.opt_usize("dtr_custom_depth").unwrap(), None);
    }

    #[test]
    fn test_form_strings_are_parsed() {
        let bag = ParameterBag::new()
            .with("nnc_k", "7")
            .with("logreg_C", "0.5")
            .with("linreg_fit_intercept", "false")
            .with("logreg_fit_intercept", "on")
            .with("rfc_custom_depth", "none");

        assert_eq!(bag.usize_or("nnc_k", 5).unwrap(), 7);
        assert_eq!(bag.f64_or("logreg_C", 1.0).unwrap(), 0.5);
        assert!(!bag.bool_or("linreg_fit_intercept", true).unwrap());
        assert!(bag.bool_or("logreg_fit_intercept", false).unwrap());
        assert_eq!(bag.opt_usize("rfc_custom_depth").unwrap(), None);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let bag = ParameterBag::new()
            .with("nnc_k", "five")
            .with("nnc_p", -2)
            .with("flag", "maybe")
            .with("depth", 2.5);

        assert!(matches!(
            bag.usize_or("nnc_k", 5),
            Err(EasyMlError::InvalidParameter { .. })
        ));
        assert!(bag.usize_or("nnc_p", 2).is_err());
        assert!(bag.bool_or("flag", false).is_err());
        assert!(bag.opt_usize("depth").is_err());
    }

    #[test]
    fn test_insert_pair() {
        let mut bag = ParameterBag::new();
        bag.insert_pair("nnc_k=3").unwrap();
        bag.insert_pair("weights=distance").unwrap();
        bag.insert_pair("logreg_fit_intercept=true").unwrap();

        assert_eq!(bag.get("nnc_k"), Some(&json!(3)));
        assert_eq!(bag.get("weights"), Some(&json!("distance")));
        assert_eq!(bag.get("logreg_fit_intercept"), Some(&json!(true)));
        assert!(bag.insert_pair("no_equals").is_err());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let bag = ParameterBag::new().with("accuracy", 91.5).with("accuracy_type", "Accuracy [%]");
        let text = serde_json::to_string(&bag).unwrap();
        assert_eq!(text, r#"{"accuracy":91.5,"accuracy_type":"Accuracy [%]"}"#);
    }
}
