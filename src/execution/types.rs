//! Semantic column types for result rendering

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Number,
    Boolean,
    Date,
    Binary,
}

const NUMBER_MARKERS: &[&str] = &["int", "float", "double", "decimal", "numeric", "real", "hugeint"];
const DATE_MARKERS: &[&str] = &["date", "time", "timestamp"];
const BINARY_MARKERS: &[&str] = &["blob", "binary", "bytea"];

/// Value type of an Arrow `Dictionary(key, value)` name
fn dictionary_value_type(t: &str) -> Option<&str> {
    let inner = t.strip_prefix("dictionary(")?.strip_suffix(')')?;
    inner.split_once(',').map(|(_, value)| value.trim())
}

/// Map an engine type name to its semantic type
///
/// Substring match on the lower-cased name, checked in order number,
/// boolean, date, binary; anything else is a string. Dictionary-encoded
/// columns (DuckDB enums) are classified by their value type.
pub fn normalize_type(engine_type: &str) -> SemanticType {
    let lowered = engine_type.trim().to_lowercase();
    let t = dictionary_value_type(&lowered).unwrap_or(&lowered);

    if NUMBER_MARKERS.iter().any(|m| t.contains(m)) {
        SemanticType::Number
    } else if t.contains("bool") {
        SemanticType::Boolean
    } else if DATE_MARKERS.iter().any(|m| t.contains(m)) {
        SemanticType::Date
    } else if BINARY_MARKERS.iter().any(|m| t.contains(m)) {
        SemanticType::Binary
    } else {
        SemanticType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_names() {
        assert_eq!(normalize_type("BIGINT"), SemanticType::Number);
        assert_eq!(normalize_type("DECIMAL(18,3)"), SemanticType::Number);
        assert_eq!(normalize_type("DOUBLE"), SemanticType::Number);
        assert_eq!(normalize_type("BOOLEAN"), SemanticType::Boolean);
        assert_eq!(normalize_type("TIMESTAMP WITH TIME ZONE"), SemanticType::Date);
        assert_eq!(normalize_type("DATE"), SemanticType::Date);
        assert_eq!(normalize_type("BLOB"), SemanticType::Binary);
        assert_eq!(normalize_type("VARCHAR"), SemanticType::String);
    }

    #[test]
    fn test_arrow_type_names() {
        assert_eq!(normalize_type("Int64"), SemanticType::Number);
        assert_eq!(normalize_type("Float64"), SemanticType::Number);
        assert_eq!(normalize_type("Decimal128(18, 3)"), SemanticType::Number);
        assert_eq!(normalize_type("Date32"), SemanticType::Date);
        assert_eq!(normalize_type("Timestamp(Microsecond, None)"), SemanticType::Date);
        assert_eq!(normalize_type("Utf8"), SemanticType::String);
        assert_eq!(normalize_type("Binary"), SemanticType::Binary);
    }

    #[test]
    fn test_dictionary_uses_value_type() {
        assert_eq!(normalize_type("Dictionary(UInt8, Utf8)"), SemanticType::String);
        assert_eq!(normalize_type("Dictionary(UInt16, Int32)"), SemanticType::Number);
    }
}
