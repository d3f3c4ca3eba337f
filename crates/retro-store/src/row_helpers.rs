use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::phase::Phase;

    #[test]
    fn parse_enum_success() {
        let result: Result<Phase, _> = parse_enum("grouping", "retros", "phase");
        assert!(matches!(result, Ok(Phase::Grouping)));
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<Phase, _> = parse_enum("INVALID", "retros", "phase");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "retros", column: "phase", .. })
        ));
    }

    #[test]
    fn parse_enum_column() {
        let result: Result<retro_core::Column, _> = parse_enum("stop", "items", "column_type");
        assert!(matches!(result, Ok(retro_core::Column::Stop)));
    }
}
