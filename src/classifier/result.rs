//! catformat response model and the classification decision.

use serde::{Deserialize, Serialize};

/// An id the classifier may send either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassifierId {
    Number(serde_json::Number),
    Text(String),
}

impl ClassifierId {
    /// Canonical integer form; `None` when the value is not an integer.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            ClassifierId::Number(n) => n.as_i64().or_else(|| integral(n.as_f64()?)),
            ClassifierId::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| integral(s.parse::<f64>().ok()?))
            }
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub found_category: Option<String>,
    #[serde(default)]
    pub found_category_id: Option<ClassifierId>,
    #[serde(default)]
    pub found_brand: Option<String>,
    #[serde(default)]
    pub brand_id: Option<ClassifierId>,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub brand_accuracy: f64,
    #[serde(default)]
    pub user_category: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Leave the product as it is.
    Unchanged,
    NotClassified,
    Classified { category_id: i64, brand_id: i64 },
}

/// Applies the confidence gates to a classifier answer.
pub fn decide(result: &ClassificationResult, min_confidence: f64) -> Outcome {
    if result.status != "found" {
        return Outcome::Unchanged;
    }

    let category_id = match result.found_category_id.as_ref().map(ClassifierId::to_i64) {
        Some(Some(id)) => Some(id),
        Some(None) => return Outcome::NotClassified,
        None => None,
    };
    let brand_id = match result.brand_id.as_ref().map(ClassifierId::to_i64) {
        Some(Some(id)) => Some(id),
        Some(None) => return Outcome::NotClassified,
        None => None,
    };

    match (category_id, brand_id) {
        (Some(category_id), Some(brand_id))
            if result.accuracy >= min_confidence && result.brand_accuracy >= min_confidence =>
        {
            Outcome::Classified {
                category_id,
                brand_id,
            }
        }
        _ => Outcome::NotClassified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(json: &str) -> ClassificationResult {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        let r = found(r#"{"status":"found","found_category_id":"1318","brand_id":42}"#);
        assert_eq!(r.found_category_id.unwrap().to_i64(), Some(1318));
        assert_eq!(r.brand_id.unwrap().to_i64(), Some(42));

        let r = found(r#"{"status":"found","found_category_id":1318.0,"brand_id":" 7 "}"#);
        assert_eq!(r.found_category_id.unwrap().to_i64(), Some(1318));
        assert_eq!(r.brand_id.unwrap().to_i64(), Some(7));

        assert_eq!(ClassifierId::Text("abc".into()).to_i64(), None);
        assert_eq!(ClassifierId::Text("1.5".into()).to_i64(), None);
    }

    #[test]
    fn confident_answer_classifies() {
        let r = found(
            r#"{"status":"found","found_category_id":1318,"brand_id":"42","accuracy":0.995,"brand_accuracy":0.99}"#,
        );
        assert_eq!(
            decide(&r, 0.99),
            Outcome::Classified {
                category_id: 1318,
                brand_id: 42
            }
        );
    }

    #[test]
    fn low_confidence_is_not_classified() {
        let r = found(
            r#"{"status":"found","found_category_id":1318,"brand_id":42,"accuracy":0.80,"brand_accuracy":0.99}"#,
        );
        assert_eq!(decide(&r, 0.99), Outcome::NotClassified);

        let r = found(
            r#"{"status":"found","found_category_id":1318,"brand_id":42,"accuracy":0.999,"brand_accuracy":0.5}"#,
        );
        assert_eq!(decide(&r, 0.99), Outcome::NotClassified);
    }

    #[test]
    fn missing_or_bad_ids_are_not_classified() {
        let r = found(r#"{"status":"found","found_category_id":1318,"accuracy":1.0,"brand_accuracy":1.0}"#);
        assert_eq!(decide(&r, 0.99), Outcome::NotClassified);

        let r = found(
            r#"{"status":"found","found_category_id":"x","brand_id":42,"accuracy":1.0,"brand_accuracy":1.0}"#,
        );
        assert_eq!(decide(&r, 0.99), Outcome::NotClassified);
    }

    #[test]
    fn non_found_status_changes_nothing() {
        let r = found(r#"{"status":"not_found","accuracy":1.0}"#);
        assert_eq!(decide(&r, 0.99), Outcome::Unchanged);
        assert_eq!(decide(&ClassificationResult::default(), 0.99), Outcome::Unchanged);
    }
}
