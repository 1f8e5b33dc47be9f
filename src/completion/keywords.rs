//! Static completion vocabulary

pub const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "LEFT JOIN", "RIGHT JOIN", "INNER JOIN", "FULL JOIN", "CROSS JOIN", "ON", "USING", "AS",
    "DISTINCT", "UNION", "UNION ALL", "INTERSECT", "EXCEPT", "WITH", "CASE", "WHEN", "THEN",
    "ELSE", "END", "AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE", "ILIKE", "BETWEEN", "EXISTS",
    "ASC", "DESC", "INSERT INTO", "VALUES", "UPDATE", "SET", "DELETE FROM", "CREATE TABLE",
    "CREATE VIEW", "DROP TABLE", "ALTER TABLE", "DESCRIBE", "SUMMARIZE", "PIVOT", "UNPIVOT",
    "QUALIFY", "WINDOW", "OVER", "PARTITION BY", "TRUE", "FALSE",
];

pub const FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "MEDIAN", "MODE", "STDDEV", "VARIANCE", "APPROX_COUNT_DISTINCT",
    "QUANTILE_CONT", "STRING_AGG", "LIST", "ARRAY_AGG", "FIRST", "LAST", "ROW_NUMBER", "RANK",
    "DENSE_RANK", "LAG", "LEAD", "COALESCE", "NULLIF", "CAST", "TRY_CAST", "ROUND", "ABS", "FLOOR",
    "CEIL", "LENGTH", "LOWER", "UPPER", "TRIM", "SUBSTRING", "REPLACE", "CONCAT", "SPLIT_PART",
    "REGEXP_MATCHES", "REGEXP_REPLACE", "STRPTIME", "STRFTIME", "DATE_TRUNC", "DATE_PART",
    "DATE_DIFF", "NOW", "CURRENT_DATE", "EXTRACT", "READ_CSV", "READ_CSV_AUTO", "READ_PARQUET",
    "READ_JSON_AUTO",
];

/// Words that can follow a table name but are never an alias
pub(crate) const NON_ALIAS_WORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN", "LEFT", "RIGHT", "INNER",
    "FULL", "OUTER", "CROSS", "NATURAL", "ON", "USING", "UNION", "INTERSECT", "EXCEPT", "SET",
    "VALUES", "SELECT", "WINDOW", "QUALIFY", "AS", "FROM", "DEFAULT",
];

pub(crate) fn is_non_alias_word(word: &str) -> bool {
    NON_ALIAS_WORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}
