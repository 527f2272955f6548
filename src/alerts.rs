use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{named_params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::AlertError;

#[derive(
    AsRefStr, EnumIter, EnumString, Display, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum AlertType {
    TemplateVersion,
    PluginVersion,
}

#[derive(
    AsRefStr, EnumIter, EnumString, Display, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum AlertStatus {
    New,
    Canceled,
    Resolved,
}

impl AlertStatus {
    /// Canceled and Resolved alerts never reopen
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Canceled | AlertStatus::Resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutdatedVersionAlert {
    pub id: i64,
    pub resource_id: String,
    pub block_id: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub status: AlertStatus,
    pub outdated_version: String,
    pub latest_version: String,
    pub created_at: i64, // Unix timestamp (UTC)
    pub updated_at: i64, // Unix timestamp (UTC)
    pub updated_by: Option<String>,
}

/// Arguments for creating an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub resource_id: String,
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub outdated_version: String,
    pub latest_version: String,
}

/// Fields that may be changed on an existing alert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdate {
    pub status: Option<AlertStatus>,
    pub outdated_version: Option<String>,
    pub latest_version: Option<String>,
}

/// Filter for the read and bulk-update operations. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    pub resource_id: Option<String>,
    pub block_id: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub status: Option<AlertStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AlertFilter {
    pub fn for_scope(resource_id: &str, alert_type: AlertType, status: AlertStatus) -> Self {
        AlertFilter {
            resource_id: Some(resource_id.to_owned()),
            alert_type: Some(alert_type),
            status: Some(status),
            ..Default::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<(&'static str, &dyn ToSql)>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<(&'static str, &dyn ToSql)> = Vec::new();

        if let Some(resource_id) = &self.resource_id {
            clauses.push("resource_id = :resource_id");
            params.push((":resource_id", resource_id as &dyn ToSql));
        }
        if let Some(block_id) = &self.block_id {
            clauses.push("block_id = :block_id");
            params.push((":block_id", block_id as &dyn ToSql));
        }
        if let Some(alert_type) = &self.alert_type {
            clauses.push("alert_type = :alert_type");
            params.push((":alert_type", alert_type as &dyn ToSql));
        }
        if let Some(status) = &self.status {
            clauses.push("alert_status = :alert_status");
            params.push((":alert_status", status as &dyn ToSql));
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        (sql, params)
    }
}

impl ToSql for AlertType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let name: &str = self.as_ref();
        Ok(ToSqlOutput::from(name))
    }
}

impl FromSql for AlertType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for AlertStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let name: &str = self.as_ref();
        Ok(ToSqlOutput::from(name))
    }
}

impl FromSql for AlertStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT alert_id, resource_id, block_id, alert_type, alert_status,
           outdated_version, latest_version, created_at, updated_at, updated_by
    FROM outdated_version_alerts
"#;

pub struct Alerts;

impl Alerts {
    fn from_row(row: &Row) -> rusqlite::Result<OutdatedVersionAlert> {
        Ok(OutdatedVersionAlert {
            id: row.get(0)?,
            resource_id: row.get(1)?,
            block_id: row.get(2)?,
            alert_type: row.get(3)?,
            status: row.get(4)?,
            outdated_version: row.get(5)?,
            latest_version: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            updated_by: row.get(9)?,
        })
    }

    /// Inserts a New alert. Superseding older alerts of the same scope is the
    /// caller's job; see `AlertManager::create`.
    pub fn create(conn: &Connection, args: &NewAlert) -> Result<OutdatedVersionAlert, AlertError> {
        let now = chrono::Utc::now().timestamp();

        let alert_id: i64 = conn.query_row(
            r#"
            INSERT INTO outdated_version_alerts (
                resource_id,
                block_id,
                alert_type,
                alert_status,
                outdated_version,
                latest_version,
                created_at,
                updated_at
            )
            VALUES (
                :resource_id,
                :block_id,
                :alert_type,
                :alert_status,
                :outdated_version,
                :latest_version,
                :now,
                :now
            )
            RETURNING alert_id"#,
            named_params! {
                ":resource_id":      args.resource_id,
                ":block_id":         args.block_id,
                ":alert_type":       args.alert_type,
                ":alert_status":     AlertStatus::New,
                ":outdated_version": args.outdated_version,
                ":latest_version":   args.latest_version,
                ":now":              now,
            },
            |row| row.get(0),
        )?;

        Ok(OutdatedVersionAlert {
            id: alert_id,
            resource_id: args.resource_id.clone(),
            block_id: args.block_id.clone(),
            alert_type: args.alert_type,
            status: AlertStatus::New,
            outdated_version: args.outdated_version.clone(),
            latest_version: args.latest_version.clone(),
            created_at: now,
            updated_at: now,
            updated_by: None,
        })
    }

    pub fn find_one(conn: &Connection, alert_id: i64) -> Result<Option<OutdatedVersionAlert>, AlertError> {
        let sql = format!("{} WHERE alert_id = :alert_id", SELECT_COLUMNS);
        let alert = conn
            .query_row(&sql, named_params! { ":alert_id": alert_id }, Self::from_row)
            .optional()?;
        Ok(alert)
    }

    /// Matching alerts, newest first
    pub fn find_many(conn: &Connection, filter: &AlertFilter) -> Result<Vec<OutdatedVersionAlert>, AlertError> {
        let (where_sql, params) = filter.where_clause();
        let sql = format!(
            "{} {} ORDER BY created_at DESC, alert_id DESC LIMIT {} OFFSET {}",
            SELECT_COLUMNS,
            where_sql,
            filter.limit.unwrap_or(-1),
            filter.offset.unwrap_or(0).max(0),
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), Self::from_row)?;

        let mut alerts = Vec::new();
        for alert in rows {
            alerts.push(alert?);
        }
        Ok(alerts)
    }

    pub fn count(conn: &Connection, filter: &AlertFilter) -> Result<i64, AlertError> {
        let (where_sql, params) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM outdated_version_alerts {}", where_sql);
        let count = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Applies `update` to a single alert. Returns None when the alert doesn't exist.
    pub fn update(
        conn: &Connection,
        alert_id: i64,
        update: &AlertUpdate,
        updated_by: Option<&str>,
    ) -> Result<Option<OutdatedVersionAlert>, AlertError> {
        let now = chrono::Utc::now().timestamp();

        let rows_affected = conn.execute(
            r#"
            UPDATE outdated_version_alerts SET
                alert_status = COALESCE(:alert_status, alert_status),
                outdated_version = COALESCE(:outdated_version, outdated_version),
                latest_version = COALESCE(:latest_version, latest_version),
                updated_at = :now,
                updated_by = COALESCE(:updated_by, updated_by)
            WHERE alert_id = :alert_id"#,
            named_params! {
                ":alert_status":     update.status,
                ":outdated_version": update.outdated_version,
                ":latest_version":   update.latest_version,
                ":now":              now,
                ":updated_by":       updated_by,
                ":alert_id":         alert_id,
            },
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }

        Self::find_one(conn, alert_id)
    }

    /// Moves every alert matching `filter` to `new_status`. Pagination fields
    /// of the filter are ignored. Returns the number of alerts changed.
    pub fn update_many(
        conn: &Connection,
        filter: &AlertFilter,
        new_status: AlertStatus,
    ) -> Result<usize, AlertError> {
        let now = chrono::Utc::now().timestamp();
        let (where_sql, mut params) = filter.where_clause();

        let sql = format!(
            "UPDATE outdated_version_alerts SET alert_status = :new_status, updated_at = :now {}",
            where_sql
        );
        params.push((":new_status", &new_status as &dyn ToSql));
        params.push((":now", &now as &dyn ToSql));

        let updated = conn.execute(&sql, params.as_slice())?;
        Ok(updated)
    }

    /// Cancels the New alerts of one scope. `block_id` None matches alerts
    /// without a block, unlike `AlertFilter` where None matches any block.
    pub fn cancel_open_in_scope(
        conn: &Connection,
        resource_id: &str,
        block_id: Option<&str>,
        alert_type: AlertType,
    ) -> Result<usize, AlertError> {
        let now = chrono::Utc::now().timestamp();

        let canceled = conn.execute(
            r#"
            UPDATE outdated_version_alerts
            SET alert_status = :canceled, updated_at = :now
            WHERE resource_id = :resource_id
              AND block_id IS :block_id
              AND alert_type = :alert_type
              AND alert_status = :new"#,
            named_params! {
                ":canceled":    AlertStatus::Canceled,
                ":now":         now,
                ":resource_id": resource_id,
                ":block_id":    block_id,
                ":alert_type":  alert_type,
                ":new":         AlertStatus::New,
            },
        )?;

        Ok(canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_database;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    fn new_alert(resource_id: &str, block_id: Option<&str>, alert_type: AlertType) -> NewAlert {
        NewAlert {
            resource_id: resource_id.into(),
            block_id: block_id.map(Into::into),
            alert_type,
            outdated_version: "1.0.0".into(),
            latest_version: "1.1.0".into(),
        }
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(AlertType::TemplateVersion.as_ref(), "TemplateVersion");
        assert_eq!("PluginVersion".parse::<AlertType>().unwrap(), AlertType::PluginVersion);
        assert_eq!(AlertStatus::Canceled.to_string(), "Canceled");
        assert!("Open".parse::<AlertStatus>().is_err());
        assert_eq!(AlertStatus::iter().count(), 3);
    }

    #[test]
    fn test_unknown_stored_status_is_a_database_error() {
        let (_dir, db) = temp_database();
        let conn = db.get_connection().unwrap();
        let created = Alerts::create(&conn, &new_alert("svc-a", None, AlertType::TemplateVersion)).unwrap();
        conn.execute(
            "UPDATE outdated_version_alerts SET alert_status = 'Open' WHERE alert_id = ?",
            [created.id],
        )
        .unwrap();

        assert!(matches!(
            Alerts::find_one(&conn, created.id),
            Err(AlertError::DatabaseError(_))
        ));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!AlertStatus::New.is_terminal());
        assert!(AlertStatus::Canceled.is_terminal());
        assert!(AlertStatus::Resolved.is_terminal());
    }

    #[test]
    fn test_create_and_find_one() {
        let (_dir, db) = temp_database();
        let conn = db.get_connection().unwrap();

        let created = Alerts::create(&conn, &new_alert("svc-a", None, AlertType::TemplateVersion)).unwrap();
        assert_eq!(created.status, AlertStatus::New);

        let found = Alerts::find_one(&conn, created.id).unwrap();
        assert_eq!(found, Some(created));
        assert_eq!(Alerts::find_one(&conn, 9999).unwrap(), None);
    }

    #[test]
    fn test_find_many_filters_and_pages() {
        let (_dir, db) = temp_database();
        let conn = db.get_connection().unwrap();

        let first = Alerts::create(&conn, &new_alert("svc-a", None, AlertType::TemplateVersion)).unwrap();
        let second = Alerts::create(&conn, &new_alert("svc-a", Some("blk-1"), AlertType::PluginVersion)).unwrap();
        let third = Alerts::create(&conn, &new_alert("svc-b", None, AlertType::TemplateVersion)).unwrap();

        let all = Alerts::find_many(&conn, &AlertFilter::default()).unwrap();
        let ids: Vec<i64> = all.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let svc_a = AlertFilter {
            resource_id: Some("svc-a".into()),
            ..Default::default()
        };
        assert_eq!(Alerts::count(&conn, &svc_a).unwrap(), 2);

        let plugin_only = AlertFilter {
            alert_type: Some(AlertType::PluginVersion),
            ..Default::default()
        };
        assert_eq!(Alerts::find_many(&conn, &plugin_only).unwrap(), vec![second.clone()]);

        let by_block = AlertFilter {
            block_id: Some("blk-1".into()),
            ..Default::default()
        };
        assert_eq!(Alerts::count(&conn, &by_block).unwrap(), 1);

        let paged = AlertFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        assert_eq!(Alerts::find_many(&conn, &paged).unwrap(), vec![second]);
    }

    #[test]
    fn test_update_changes_fields_and_stamps_user() {
        let (_dir, db) = temp_database();
        let conn = db.get_connection().unwrap();
        let created = Alerts::create(&conn, &new_alert("svc-a", None, AlertType::TemplateVersion)).unwrap();

        let update = AlertUpdate {
            status: Some(AlertStatus::Resolved),
            latest_version: Some("1.2.0".into()),
            ..Default::default()
        };
        let updated = Alerts::update(&conn, created.id, &update, Some("user-1"))
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, AlertStatus::Resolved);
        assert_eq!(updated.outdated_version, "1.0.0");
        assert_eq!(updated.latest_version, "1.2.0");
        assert_eq!(updated.updated_by.as_deref(), Some("user-1"));

        assert_eq!(Alerts::update(&conn, 9999, &update, None).unwrap(), None);
    }

    #[test]
    fn test_update_many_uses_filter() {
        let (_dir, db) = temp_database();
        let conn = db.get_connection().unwrap();
        Alerts::create(&conn, &new_alert("svc-a", None, AlertType::TemplateVersion)).unwrap();
        Alerts::create(&conn, &new_alert("svc-a", Some("blk-1"), AlertType::PluginVersion)).unwrap();
        Alerts::create(&conn, &new_alert("svc-b", None, AlertType::TemplateVersion)).unwrap();

        let filter = AlertFilter::for_scope("svc-a", AlertType::TemplateVersion, AlertStatus::New);
        assert_eq!(Alerts::update_many(&conn, &filter, AlertStatus::Resolved).unwrap(), 1);

        let resolved = AlertFilter {
            status: Some(AlertStatus::Resolved),
            ..Default::default()
        };
        assert_eq!(Alerts::count(&conn, &resolved).unwrap(), 1);
    }

    #[test]
    fn test_cancel_open_in_scope_matches_null_block() {
        let (_dir, db) = temp_database();
        let conn = db.get_connection().unwrap();
        let no_block = Alerts::create(&conn, &new_alert("svc-a", None, AlertType::PluginVersion)).unwrap();
        let with_block = Alerts::create(&conn, &new_alert("svc-a", Some("blk-1"), AlertType::PluginVersion)).unwrap();

        assert_eq!(
            Alerts::cancel_open_in_scope(&conn, "svc-a", None, AlertType::PluginVersion).unwrap(),
            1
        );
        assert_eq!(
            Alerts::find_one(&conn, no_block.id).unwrap().unwrap().status,
            AlertStatus::Canceled
        );
        assert_eq!(
            Alerts::find_one(&conn, with_block.id).unwrap().unwrap().status,
            AlertStatus::New
        );
    }
}
