use miette::Diagnostic;
use thiserror::Error;

/// Sentinel pushed through sea-orm's error channel by the failover pool so
/// callers can tell "write accepted onto the stream" apart from a hard failure.
pub const TO_ASYNC_SENTINEL: &str = "apsis: write diverted to failover stream";

/// Sentinel for reads short-circuited while the database monitor reports
/// the store unhealthy.
pub const DB_UNAVAILABLE_SENTINEL: &str = "apsis: database unavailable";

#[derive(Debug, Error, Diagnostic)]
pub enum ApsisError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(apsis::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(apsis::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(apsis::serde))]
    Serde(#[from] serde_json::Error),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(apsis::jose))]
    Jose(String),

    #[error("business {0} not found")]
    #[diagnostic(code(apsis::biz_not_found))]
    BizNotFound(i64),

    #[error("invalid parameter: {0}")]
    #[diagnostic(code(apsis::invalid_parameter))]
    InvalidParameter(String),

    #[error("unique conflict: {0}")]
    #[diagnostic(code(apsis::unique_conflict))]
    UniqueConflict(String),

    #[error("attribute {0} not found")]
    #[diagnostic(code(apsis::attribute_not_found))]
    AttributeNotFound(String),

    #[error("operator {op} not supported for {data_type}")]
    #[diagnostic(code(apsis::unknown_operator))]
    UnknownOperator { op: String, data_type: String },

    #[error("unknown data type: {0}")]
    #[diagnostic(code(apsis::unknown_data_type))]
    UnknownDataType(String),

    #[error("decode error: {0}")]
    #[diagnostic(code(apsis::decode))]
    DecodeError(String),

    /// Cache miss sentinel, distinct from a cache transport error.
    #[error("key not found: {0}")]
    #[diagnostic(code(apsis::key_not_found))]
    KeyNotFound(String),

    #[error("cache error: {0}")]
    #[diagnostic(code(apsis::cache))]
    Cache(String),

    /// Aggregate of per-cluster failures from the replication cache.
    #[error("multi-cluster cache errors: {}", format_cluster_errors(.0))]
    #[diagnostic(code(apsis::multi_cache))]
    MultiCache(Vec<(usize, String)>),

    #[error("database unavailable")]
    #[diagnostic(code(apsis::db_unavailable))]
    DbUnavailable,

    #[error("Database error: {0}")]
    #[diagnostic(code(apsis::db))]
    Db(sea_orm::DbErr),

    /// The write was published to the failover stream instead of executed.
    #[error("write diverted to failover stream")]
    #[diagnostic(code(apsis::to_async))]
    ToAsync,

    #[error("update affected no rows: {0}")]
    #[diagnostic(code(apsis::update_failed))]
    UpdateFailed(String),

    #[error("permission denied")]
    #[diagnostic(code(apsis::permission_denied))]
    PermissionDenied,

    /// The cached snapshot cannot answer for every requested action.
    #[error("unknown permission action")]
    #[diagnostic(code(apsis::unknown_permission_action))]
    UnknownPermissionAction,

    #[error("event bus error: {0}")]
    #[diagnostic(code(apsis::events))]
    Events(String),

    #[error("{0}")]
    #[diagnostic(code(apsis::other))]
    Other(String),
}

fn format_cluster_errors(errors: &[(usize, String)]) -> String {
    errors
        .iter()
        .map(|(idx, err)| format!("cluster {idx}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<sea_orm::DbErr> for ApsisError {
    fn from(value: sea_orm::DbErr) -> Self {
        if let sea_orm::DbErr::Custom(msg) = &value {
            if msg == TO_ASYNC_SENTINEL {
                return ApsisError::ToAsync;
            }
            if msg == DB_UNAVAILABLE_SENTINEL {
                return ApsisError::DbUnavailable;
            }
        }
        ApsisError::Db(value)
    }
}

impl From<josekit::JoseError> for ApsisError {
    fn from(value: josekit::JoseError) -> Self {
        ApsisError::Jose(value.to_string())
    }
}

impl ApsisError {
    /// Stable wire code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ApsisError::Io(_) => "IO_ERROR",
            ApsisError::Config(_) => "CONFIG_ERROR",
            ApsisError::Serde(_) => "SERDE_ERROR",
            ApsisError::Jose(_) => "TOKEN_ERROR",
            ApsisError::BizNotFound(_) => "BIZ_NOT_FOUND",
            ApsisError::InvalidParameter(_) => "INVALID_PARAMETER",
            ApsisError::UniqueConflict(_) => "UNIQUE_CONFLICT",
            ApsisError::AttributeNotFound(_) => "ATTRIBUTE_NOT_FOUND",
            ApsisError::UnknownOperator { .. } => "UNKNOWN_OPERATOR",
            ApsisError::UnknownDataType(_) => "UNKNOWN_DATA_TYPE",
            ApsisError::DecodeError(_) => "DECODE_ERROR",
            ApsisError::KeyNotFound(_) => "KEY_NOT_FOUND",
            ApsisError::Cache(_) | ApsisError::MultiCache(_) => "CACHE_ERROR",
            ApsisError::DbUnavailable => "DB_ERROR",
            ApsisError::Db(_) => "DB_ERROR",
            ApsisError::ToAsync => "ERR_TO_ASYNC",
            ApsisError::UpdateFailed(_) => "UPDATE_FAILED",
            ApsisError::PermissionDenied => "PERMISSION_DENIED",
            ApsisError::UnknownPermissionAction => "UNKNOWN_PERMISSION_ACTION",
            ApsisError::Events(_) => "EVENTS_ERROR",
            ApsisError::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ApsisError::KeyNotFound(_))
    }

    pub fn is_to_async(&self) -> bool {
        matches!(self, ApsisError::ToAsync)
    }

    /// Maps a sea-orm error from an insert into `UniqueConflict` when the
    /// backend reports a unique-index violation, otherwise passes it through.
    pub fn from_insert(err: sea_orm::DbErr, what: &str) -> Self {
        let msg = err.to_string();
        if msg.contains("UNIQUE constraint failed")
            || msg.contains("duplicate key value")
            || msg.contains("Duplicate entry")
        {
            ApsisError::UniqueConflict(what.to_string())
        } else {
            ApsisError::from(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_async_sentinel_roundtrip() {
        let err: ApsisError = sea_orm::DbErr::Custom(TO_ASYNC_SENTINEL.to_string()).into();
        assert!(err.is_to_async());

        let plain: ApsisError = sea_orm::DbErr::Custom("something else".to_string()).into();
        assert!(!plain.is_to_async());
    }

    #[test]
    fn unique_conflict_detection() {
        let err = sea_orm::DbErr::Custom("UNIQUE constraint failed: roles.name".to_string());
        match ApsisError::from_insert(err, "role") {
            ApsisError::UniqueConflict(what) => assert_eq!(what, "role"),
            other => panic!("expected UniqueConflict, got {other:?}"),
        }
    }

    #[test]
    fn key_not_found_is_distinct_from_cache_error() {
        assert!(ApsisError::KeyNotFound("k".into()).is_key_not_found());
        assert!(!ApsisError::Cache("boom".into()).is_key_not_found());
    }
}
