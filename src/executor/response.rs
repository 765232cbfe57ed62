//! Store response validation
//!
//! A response is successful only when it carries `ok` equal to 1.0. Write
//! commands can also succeed at the command level while rejecting
//! documents through `writeErrors`; those count as failures too.

use bson::{Bson, Document};

use crate::errors::{GatewayError, GatewayResult};

/// Fails unless `response` reports success for `verb`
pub fn check_response(verb: &str, response: &Document) -> GatewayResult<()> {
    let ok = match response.get("ok") {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        Some(_) | None => {
            return Err(GatewayError::execution_failed(format!(
                "{} response carries no success indicator",
                verb
            )))
        }
    };
    if ok != 1.0 {
        let message = response.get_str("errmsg").unwrap_or("unknown error");
        let code = response
            .get_str("codeName")
            .map(str::to_string)
            .or_else(|_| response.get_i32("code").map(|c| c.to_string()))
            .unwrap_or_default();
        return Err(GatewayError::execution_failed(format!(
            "{} failed: {} ({})",
            verb, message, code
        )));
    }
    if let Ok(errors) = response.get_array("writeErrors") {
        if let Some(Bson::Document(first)) = errors.first() {
            return Err(GatewayError::execution_failed(format!(
                "{} rejected {} document(s): {}",
                verb,
                errors.len(),
                first.get_str("errmsg").unwrap_or("write error")
            )));
        }
    }
    Ok(())
}

/// Documents of one cursor batch plus the id to continue from (0 when done)
#[derive(Debug, Clone, PartialEq)]
pub struct CursorBatch {
    pub id: i64,
    pub documents: Vec<Document>,
}

impl CursorBatch {
    /// Reads `cursor.firstBatch` of a find/aggregate response
    pub fn first(response: &Document) -> GatewayResult<Self> {
        Self::read(response, "firstBatch")
    }

    /// Reads `cursor.nextBatch` of a getMore response
    pub fn next(response: &Document) -> GatewayResult<Self> {
        Self::read(response, "nextBatch")
    }

    fn read(response: &Document, key: &str) -> GatewayResult<Self> {
        let cursor = response.get_document("cursor").map_err(|_| {
            GatewayError::execution_failed("response carries no cursor document")
        })?;
        let id = match cursor.get("id") {
            Some(Bson::Int64(id)) => *id,
            Some(Bson::Int32(id)) => i64::from(*id),
            None => 0,
            Some(other) => {
                return Err(GatewayError::execution_failed(format!(
                    "cursor id has unexpected type: {}",
                    other
                )))
            }
        };
        let batch = cursor.get_array(key).map_err(|_| {
            GatewayError::execution_failed(format!("cursor carries no '{}' array", key))
        })?;
        let documents = batch
            .iter()
            .map(|entry| match entry {
                Bson::Document(document) => Ok(document.clone()),
                other => Err(GatewayError::execution_failed(format!(
                    "cursor entry is not a document: {}",
                    other
                ))),
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(Self { id, documents })
    }
}

/// Number of documents a write command reports as affected
pub fn affected_count(response: &Document) -> Option<i64> {
    match response.get("n")? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

/// `values` of a distinct response
pub fn distinct_values(response: &Document) -> GatewayResult<Vec<Bson>> {
    response
        .get_array("values")
        .cloned()
        .map_err(|_| GatewayError::execution_failed("distinct response carries no 'values' array"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use bson::doc;

    #[test]
    fn test_ok_response_accepted() {
        assert!(check_response("find", &doc! { "ok": 1.0 }).is_ok());
        assert!(check_response("find", &doc! { "ok": 1 }).is_ok());
    }

    #[test]
    fn test_failure_carries_store_text() {
        let response = doc! { "ok": 0.0, "errmsg": "boom", "code": 2, "codeName": "BadValue" };
        let err = check_response("insert", &response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
        assert!(err.message().contains("boom"));
        assert!(err.message().contains("BadValue"));
    }

    #[test]
    fn test_missing_ok_rejected() {
        let err = check_response("find", &doc! { "n": 1 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
    }

    #[test]
    fn test_write_errors_rejected() {
        let response = doc! {
            "n": 0,
            "writeErrors": [{ "index": 0, "code": 11000, "errmsg": "E11000 duplicate key" }],
            "ok": 1.0,
        };
        let err = check_response("insert", &response).unwrap_err();
        assert!(err.message().contains("E11000"));
    }

    #[test]
    fn test_cursor_batches() {
        let response = doc! {
            "cursor": { "firstBatch": [{ "a": 1 }], "id": 7_i64, "ns": "app.t" },
            "ok": 1.0,
        };
        let batch = CursorBatch::first(&response).unwrap();
        assert_eq!(batch.id, 7);
        assert_eq!(batch.documents, vec![doc! { "a": 1 }]);
        assert!(CursorBatch::next(&response).is_err());
    }

    #[test]
    fn test_affected_count() {
        assert_eq!(affected_count(&doc! { "n": 3 }), Some(3));
        assert_eq!(affected_count(&doc! { "n": 2_i64 }), Some(2));
        assert_eq!(affected_count(&doc! { "ok": 1.0 }), None);
    }
}
