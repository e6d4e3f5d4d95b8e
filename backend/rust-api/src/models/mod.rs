pub mod assessment;
pub mod content;
pub mod engagement;
pub mod progress;
pub mod reporting;

use serde::de::Deserializer;
use serde::Deserialize;
use serde_json::Value;

/// Lenient numeric coercion for loosely-typed client payloads.
///
/// Numbers pass through, numeric strings parse, anything else (including
/// null and absent fields via `#[serde(default)]`) coerces to 0. Negative
/// values clamp to 0. Required identifiers stay strictly typed; only optional
/// numeric fields go through these helpers.
pub fn coerce_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_value_f64(&value))
}

pub fn coerce_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(coerce_value_f64(&value)))
}

pub fn coerce_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_value_f64(&value).round() as i32)
}

fn coerce_value_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if parsed.is_finite() && parsed > 0.0 {
        parsed
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Lenient {
        #[serde(default, deserialize_with = "coerce_f64")]
        seconds: f64,
        #[serde(default, deserialize_with = "coerce_opt_f64")]
        percent: Option<f64>,
        #[serde(default, deserialize_with = "coerce_i32")]
        page: i32,
    }

    #[test]
    fn numbers_pass_through() {
        let v: Lenient =
            serde_json::from_str(r#"{"seconds": 42.5, "percent": 80, "page": 7}"#).unwrap();
        assert_eq!(v.seconds, 42.5);
        assert_eq!(v.percent, Some(80.0));
        assert_eq!(v.page, 7);
    }

    #[test]
    fn numeric_strings_parse() {
        let v: Lenient = serde_json::from_str(r#"{"seconds": "12.5", "page": "3"}"#).unwrap();
        assert_eq!(v.seconds, 12.5);
        assert_eq!(v.page, 3);
    }

    #[test]
    fn garbage_and_negatives_coerce_to_zero() {
        let v: Lenient =
            serde_json::from_str(r#"{"seconds": "garbage", "percent": -3, "page": {"a": 1}}"#)
                .unwrap();
        assert_eq!(v.seconds, 0.0);
        assert_eq!(v.percent, Some(0.0));
        assert_eq!(v.page, 0);
    }

    #[test]
    fn null_and_absent_have_distinct_option_behavior() {
        let v: Lenient = serde_json::from_str(r#"{"percent": null}"#).unwrap();
        assert_eq!(v.seconds, 0.0);
        assert_eq!(v.percent, None);
        assert_eq!(v.page, 0);
    }
}
