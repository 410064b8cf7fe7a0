//! Ids are written as hyphenated text, but rows imported by older tooling
//! may hold 16-byte blobs. These fragments read both forms.

/// Select expression yielding the hyphenated text form of `col`, aliased to
/// its bare column name.
pub fn uuid_text(col: &str) -> String {
    let alias = col.rsplit('.').next().unwrap_or(col);
    format!(
        "CASE WHEN typeof({c}) = 'blob' THEN lower(substr(hex({c}), 1, 8) || '-' || substr(hex({c}), 9, 4) || '-' || substr(hex({c}), 13, 4) || '-' || substr(hex({c}), 17, 4) || '-' || substr(hex({c}), 21)) ELSE {c} END AS {a}",
        c = col,
        a = alias
    )
}

/// Predicate matching `col` against one id. Bind the hyphenated id twice.
pub fn uuid_eq(col: &str) -> String {
    format!(
        "((typeof({c}) = 'blob' AND hex({c}) = upper(replace(?, '-', ''))) OR (typeof({c}) = 'text' AND lower({c}) = lower(?)))",
        c = col
    )
}
