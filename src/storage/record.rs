use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Serialize, Deserialize};

/// Whether the weight blob matching a row is known to be on disk.
///
/// Rows are written `Pending` and flipped to `Committed` once the blob has
/// been synced, so a crash between the two writes is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsStatus {
    Pending,
    Committed,
}

impl WeightsStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightsStatus::Pending => "pending",
            WeightsStatus::Committed => "committed",
        }
    }
}

impl fmt::Display for WeightsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightsStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WeightsStatus::Pending),
            "committed" => Ok(WeightsStatus::Committed),
            other => Err(format!("unknown weights status '{}'", other)),
        }
    }
}

impl ToSql for WeightsStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for WeightsStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A full `models` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    /// Serialized `ModelArchitecture` JSON.
    pub architecture: String,
    /// Reserved; always `"{}"` today.
    pub parameters: String,
    pub weights_status: WeightsStatus,
    /// Unix seconds of the last save.
    pub created_at: i64,
}

/// What `list` returns for each model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [WeightsStatus::Pending, WeightsStatus::Committed] {
            assert_eq!(status.as_str().parse::<WeightsStatus>().unwrap(), status);
        }
        assert!("done".parse::<WeightsStatus>().is_err());
    }
}
