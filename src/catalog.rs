use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{named_params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::AlertError;

#[derive(AsRefStr, EnumString, Display, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    Service,
    ServiceTemplate,
    MessageBroker,
    ProjectConfiguration,
}

impl ToSql for ResourceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let name: &str = self.as_ref();
        Ok(ToSqlOutput::from(name))
    }
}

impl FromSql for ResourceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub workspace_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub resource_type: ResourceType,

    // Template settings, only meaningful for services
    #[serde(default)]
    pub service_template_id: Option<String>,
    #[serde(default)]
    pub service_template_version: Option<String>,

    // Current version, only meaningful for service templates
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInstallation {
    pub block_id: String,
    pub resource_id: String,
    pub plugin_id: String,
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Template reference of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTemplateSettings {
    pub service_template_id: String,
    pub version: Option<String>,
}

/// Snapshot of platform metadata, as accepted by `import-catalog`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub plugin_installations: Vec<PluginInstallation>,
}

const RESOURCE_COLUMNS: &str = r#"
    SELECT resource_id, name, project_id, resource_type,
           service_template_id, service_template_version, version
    FROM resources
"#;

/// Read access to workspaces, projects, resources and plugin installations,
/// plus the writes used to keep that metadata current
pub struct Catalog;

impl Catalog {
    fn resource_from_row(row: &Row) -> rusqlite::Result<Resource> {
        Ok(Resource {
            id: row.get(0)?,
            name: row.get(1)?,
            project_id: row.get(2)?,
            resource_type: row.get(3)?,
            service_template_id: row.get(4)?,
            service_template_version: row.get(5)?,
            version: row.get(6)?,
        })
    }

    pub fn get_resource(conn: &Connection, resource_id: &str) -> Result<Option<Resource>, AlertError> {
        let sql = format!(
            "{} WHERE resource_id = :resource_id",
            RESOURCE_COLUMNS
        );
        let resource = conn
            .query_row(
                &sql,
                named_params! { ":resource_id": resource_id },
                Self::resource_from_row,
            )
            .optional()?;
        Ok(resource)
    }

    pub fn get_project(conn: &Connection, project_id: &str) -> Result<Option<Project>, AlertError> {
        let project = conn
            .query_row(
                "SELECT project_id, name, workspace_id FROM projects WHERE project_id = ?",
                [project_id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        workspace_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    /// Services of `project_id` whose template settings point at `template_id`
    pub fn find_services_by_template(
        conn: &Connection,
        project_id: &str,
        template_id: &str,
    ) -> Result<Vec<Resource>, AlertError> {
        let sql = format!(
            r#"{}
            WHERE project_id = :project_id
              AND service_template_id = :template_id
              AND resource_type = :service
            ORDER BY resource_id"#,
            RESOURCE_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            named_params! {
                ":project_id":  project_id,
                ":template_id": template_id,
                ":service":     ResourceType::Service,
            },
            Self::resource_from_row,
        )?;

        let mut services = Vec::new();
        for service in rows {
            services.push(service?);
        }
        Ok(services)
    }

    /// Enabled installations of `plugin_id` on resources of `project_id`
    pub fn find_plugin_installations(
        conn: &Connection,
        project_id: &str,
        plugin_id: &str,
    ) -> Result<Vec<PluginInstallation>, AlertError> {
        let mut stmt = conn.prepare(
            r#"
            SELECT p.block_id, p.resource_id, p.plugin_id, p.version, p.enabled
            FROM plugin_installations p
            JOIN resources r ON r.resource_id = p.resource_id
            WHERE r.project_id = :project_id
              AND p.plugin_id = :plugin_id
              AND p.enabled = 1
            ORDER BY p.block_id"#,
        )?;

        let rows = stmt.query_map(
            named_params! {
                ":project_id": project_id,
                ":plugin_id":  plugin_id,
            },
            |row| {
                Ok(PluginInstallation {
                    block_id: row.get(0)?,
                    resource_id: row.get(1)?,
                    plugin_id: row.get(2)?,
                    version: row.get(3)?,
                    enabled: row.get(4)?,
                })
            },
        )?;

        let mut installations = Vec::new();
        for installation in rows {
            installations.push(installation?);
        }
        Ok(installations)
    }

    pub fn get_template_settings(
        conn: &Connection,
        service_id: &str,
    ) -> Result<Option<ServiceTemplateSettings>, AlertError> {
        let settings = Self::get_resource(conn, service_id)?.and_then(|service| {
            service
                .service_template_id
                .map(|service_template_id| ServiceTemplateSettings {
                    service_template_id,
                    version: service.service_template_version,
                })
        });
        Ok(settings)
    }

    pub fn upsert_workspace(conn: &Connection, workspace: &Workspace) -> Result<(), AlertError> {
        conn.execute(
            r#"
            INSERT INTO workspaces (workspace_id, name) VALUES (:id, :name)
            ON CONFLICT (workspace_id) DO UPDATE SET name = excluded.name"#,
            named_params! { ":id": workspace.id, ":name": workspace.name },
        )?;
        Ok(())
    }

    pub fn upsert_project(conn: &Connection, project: &Project) -> Result<(), AlertError> {
        conn.execute(
            r#"
            INSERT INTO projects (project_id, workspace_id, name) VALUES (:id, :workspace_id, :name)
            ON CONFLICT (project_id) DO UPDATE SET
                workspace_id = excluded.workspace_id,
                name = excluded.name"#,
            named_params! {
                ":id":           project.id,
                ":workspace_id": project.workspace_id,
                ":name":         project.name,
            },
        )?;
        Ok(())
    }

    pub fn upsert_resource(conn: &Connection, resource: &Resource) -> Result<(), AlertError> {
        conn.execute(
            r#"
            INSERT INTO resources (
                resource_id, project_id, name, resource_type,
                service_template_id, service_template_version, version
            ) VALUES (
                :id, :project_id, :name, :resource_type,
                :service_template_id, :service_template_version, :version
            )
            ON CONFLICT (resource_id) DO UPDATE SET
                project_id = excluded.project_id,
                name = excluded.name,
                resource_type = excluded.resource_type,
                service_template_id = excluded.service_template_id,
                service_template_version = excluded.service_template_version,
                version = excluded.version"#,
            named_params! {
                ":id":                       resource.id,
                ":project_id":               resource.project_id,
                ":name":                     resource.name,
                ":resource_type":            resource.resource_type,
                ":service_template_id":      resource.service_template_id,
                ":service_template_version": resource.service_template_version,
                ":version":                  resource.version,
            },
        )?;
        Ok(())
    }

    pub fn upsert_plugin_installation(
        conn: &Connection,
        installation: &PluginInstallation,
    ) -> Result<(), AlertError> {
        conn.execute(
            r#"
            INSERT INTO plugin_installations (block_id, resource_id, plugin_id, version, enabled)
            VALUES (:block_id, :resource_id, :plugin_id, :version, :enabled)
            ON CONFLICT (block_id) DO UPDATE SET
                resource_id = excluded.resource_id,
                plugin_id = excluded.plugin_id,
                version = excluded.version,
                enabled = excluded.enabled"#,
            named_params! {
                ":block_id":    installation.block_id,
                ":resource_id": installation.resource_id,
                ":plugin_id":   installation.plugin_id,
                ":version":     installation.version,
                ":enabled":     installation.enabled,
            },
        )?;
        Ok(())
    }

    /// Points a service at a new template version
    ///
    /// IMPORTANT: Caller must hold an immediate transaction
    pub fn set_service_template_version(
        conn: &Connection,
        service_id: &str,
        version: &str,
    ) -> Result<(), AlertError> {
        let rows_affected = conn.execute(
            r#"
            UPDATE resources SET service_template_version = :version
            WHERE resource_id = :service_id
              AND resource_type = :service
              AND service_template_id IS NOT NULL"#,
            named_params! {
                ":version":    version,
                ":service_id": service_id,
                ":service":    ResourceType::Service,
            },
        )?;

        if rows_affected == 0 {
            return Err(AlertError::NotFound(format!(
                "Service '{}' with a service template",
                service_id
            )));
        }
        Ok(())
    }

    /// Writes a snapshot parent-first so foreign keys hold. Returns the number of records written.
    ///
    /// IMPORTANT: Caller must hold an immediate transaction
    pub fn import(conn: &Connection, snapshot: &CatalogSnapshot) -> Result<usize, AlertError> {
        for workspace in &snapshot.workspaces {
            Self::upsert_workspace(conn, workspace)?;
        }
        for project in &snapshot.projects {
            Self::upsert_project(conn, project)?;
        }
        for resource in &snapshot.resources {
            Self::upsert_resource(conn, resource)?;
        }
        for installation in &snapshot.plugin_installations {
            Self::upsert_plugin_installation(conn, installation)?;
        }

        Ok(snapshot.workspaces.len()
            + snapshot.projects.len()
            + snapshot.resources.len()
            + snapshot.plugin_installations.len())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn service(id: &str, project_id: &str, template_id: Option<&str>, version: Option<&str>) -> Resource {
        Resource {
            id: id.into(),
            name: format!("{} name", id),
            project_id: project_id.into(),
            resource_type: ResourceType::Service,
            service_template_id: template_id.map(Into::into),
            service_template_version: version.map(Into::into),
            version: None,
        }
    }

    pub fn template(id: &str, project_id: &str, version: &str) -> Resource {
        Resource {
            id: id.into(),
            name: format!("{} name", id),
            project_id: project_id.into(),
            resource_type: ResourceType::ServiceTemplate,
            service_template_id: None,
            service_template_version: None,
            version: Some(version.into()),
        }
    }

    pub fn plugin(block_id: &str, resource_id: &str, plugin_id: &str, version: &str) -> PluginInstallation {
        PluginInstallation {
            block_id: block_id.into(),
            resource_id: resource_id.into(),
            plugin_id: plugin_id.into(),
            version: version.into(),
            enabled: true,
        }
    }

    /// Workspace `ws`, project `p1`
    pub fn snapshot(resources: Vec<Resource>, plugin_installations: Vec<PluginInstallation>) -> CatalogSnapshot {
        CatalogSnapshot {
            workspaces: vec![Workspace {
                id: "ws".into(),
                name: "Workspace".into(),
            }],
            projects: vec![
                Project {
                    id: "p1".into(),
                    name: "Project One".into(),
                    workspace_id: "ws".into(),
                },
                Project {
                    id: "p2".into(),
                    name: "Project Two".into(),
                    workspace_id: "ws".into(),
                },
            ],
            resources,
            plugin_installations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::database::{test_support::temp_database, Database};
    use pretty_assertions::assert_eq;

    fn seeded() -> (tempfile::TempDir, Database) {
        let (dir, db) = temp_database();
        let conn = db.get_connection().unwrap();
        let snapshot = snapshot(
            vec![
                template("tpl", "p1", "1.1.0"),
                service("svc-a", "p1", Some("tpl"), Some("1.0.0")),
                service("svc-b", "p1", Some("tpl"), None),
                service("svc-c", "p1", None, None),
                service("svc-other", "p2", Some("tpl"), Some("1.0.0")),
            ],
            vec![
                plugin("blk-1", "svc-a", "kafka", "2.0.0"),
                plugin("blk-2", "svc-b", "kafka", "2.1.0"),
                plugin("blk-3", "svc-b", "redis", "1.0.0"),
                plugin("blk-4", "svc-other", "kafka", "2.0.0"),
                PluginInstallation {
                    enabled: false,
                    ..plugin("blk-5", "svc-c", "kafka", "1.0.0")
                },
            ],
        );
        Database::immediate_transaction(&conn, |c| Catalog::import(c, &snapshot)).unwrap();
        drop(conn);
        (dir, db)
    }

    #[test]
    fn test_get_resource_and_project() {
        let (_dir, db) = seeded();
        let conn = db.get_connection().unwrap();

        let tpl = Catalog::get_resource(&conn, "tpl").unwrap().unwrap();
        assert_eq!(tpl.resource_type, ResourceType::ServiceTemplate);
        assert_eq!(tpl.version.as_deref(), Some("1.1.0"));
        assert_eq!(Catalog::get_resource(&conn, "missing").unwrap(), None);

        let project = Catalog::get_project(&conn, "p1").unwrap().unwrap();
        assert_eq!(project.workspace_id, "ws");
        assert_eq!(Catalog::get_project(&conn, "nope").unwrap(), None);
    }

    #[test]
    fn test_find_services_by_template_stays_in_project() {
        let (_dir, db) = seeded();
        let conn = db.get_connection().unwrap();

        let ids: Vec<String> = Catalog::find_services_by_template(&conn, "p1", "tpl")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["svc-a".to_string(), "svc-b".to_string()]);
    }

    #[test]
    fn test_find_plugin_installations_skips_disabled_and_other_projects() {
        let (_dir, db) = seeded();
        let conn = db.get_connection().unwrap();

        let blocks: Vec<String> = Catalog::find_plugin_installations(&conn, "p1", "kafka")
            .unwrap()
            .into_iter()
            .map(|p| p.block_id)
            .collect();
        assert_eq!(blocks, vec!["blk-1".to_string(), "blk-2".to_string()]);
    }

    #[test]
    fn test_template_settings() {
        let (_dir, db) = seeded();
        let conn = db.get_connection().unwrap();

        assert_eq!(
            Catalog::get_template_settings(&conn, "svc-a").unwrap(),
            Some(ServiceTemplateSettings {
                service_template_id: "tpl".into(),
                version: Some("1.0.0".into()),
            })
        );
        assert_eq!(Catalog::get_template_settings(&conn, "svc-c").unwrap(), None);
    }

    #[test]
    fn test_set_service_template_version() {
        let (_dir, db) = seeded();
        let conn = db.get_connection().unwrap();

        Catalog::set_service_template_version(&conn, "svc-b", "1.1.0").unwrap();
        assert_eq!(
            Catalog::get_template_settings(&conn, "svc-b").unwrap().unwrap().version.as_deref(),
            Some("1.1.0")
        );

        assert!(matches!(
            Catalog::set_service_template_version(&conn, "svc-c", "1.1.0"),
            Err(AlertError::NotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_json_defaults() {
        let json = r#"{
            "projects": [{"id": "p1", "name": "P", "workspaceId": "ws"}],
            "pluginInstallations": [
                {"blockId": "b", "resourceId": "r", "pluginId": "kafka", "version": "1.0.0"}
            ]
        }"#;
        let snapshot: CatalogSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.workspaces.is_empty());
        assert!(snapshot.plugin_installations[0].enabled);
    }
}
