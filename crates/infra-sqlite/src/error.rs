// sqlx::Error -> AppError mapping
// (From<sqlx::Error> for AppError is not possible here: orphan rules)

use recur_core::error::AppError;

/// Convert a sqlx error into `AppError::Database`, classifying the common
/// SQLite result codes (https://www.sqlite.org/rescode.html)
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => {
                let code_str = code.as_ref();
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            }
            None => AppError::Database(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {}", col)),
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_database_error() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(msg) if msg == "Row not found"));
    }

    #[test]
    fn test_column_not_found_names_column() {
        let err = map_sqlx_error(sqlx::Error::ColumnNotFound("owner".to_string()));
        assert!(err.to_string().contains("owner"));
    }
}
