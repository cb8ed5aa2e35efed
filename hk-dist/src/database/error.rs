//! Database error types and conversions

use hk_core::HkError;

/// SQLSTATE for unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for foreign_key_violation
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Query error: {message}")]
    Query { message: String },

    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Invalid row: {message}")]
    Deserialization { message: String },

    #[error("Record not found: {entity} {key}")]
    NotFound { entity: String, key: String },

    #[error("Duplicate record: {entity} {key}")]
    Duplicate { entity: String, key: String },
}

impl DatabaseError {
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Classify a sqlx error, naming `entity` and `key` for constraint violations
    pub fn from_sqlx(error: sqlx::Error, entity: &str, key: &str) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            match db_error.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => {
                    return Self::Duplicate {
                        entity: entity.to_string(),
                        key: key.to_string(),
                    };
                }
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    return Self::NotFound {
                        entity: "release".to_string(),
                        key: key.to_string(),
                    };
                }
                _ => {}
            }
        }
        Self::Query {
            message: error.to_string(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        Self::Query {
            message: error.to_string(),
        }
    }
}

impl From<HkError> for DatabaseError {
    fn from(error: HkError) -> Self {
        Self::Deserialization {
            message: error.to_string(),
        }
    }
}

impl From<DatabaseError> for HkError {
    fn from(error: DatabaseError) -> Self {
        HkError::Internal {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_errors_are_queries() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound, "release", "hk/1/linux-amd64");
        assert!(matches!(err, DatabaseError::Query { .. }));
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_into_hk_error() {
        let err: HkError = DatabaseError::not_found("cur", "hk/linux-amd64").into();
        assert!(err.to_string().contains("cur hk/linux-amd64"));
    }
}
