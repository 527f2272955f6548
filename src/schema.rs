pub const SCHEMA_VERSION: &str = "1";

pub const CREATE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');

CREATE TABLE IF NOT EXISTS workspaces (
    workspace_id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    FOREIGN KEY (workspace_id) REFERENCES workspaces(workspace_id)
);

-- Services, service templates and the other resource kinds of a project.
-- For templates, version holds the current template version. For services,
-- service_template_id and service_template_version hold the template settings.
CREATE TABLE IF NOT EXISTS resources (
    resource_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    service_template_id TEXT,
    service_template_version TEXT,
    version TEXT,
    FOREIGN KEY (project_id) REFERENCES projects(project_id)
);

CREATE INDEX IF NOT EXISTS idx_resources_template ON resources (project_id, service_template_id);

CREATE TABLE IF NOT EXISTS plugin_installations (
    block_id TEXT PRIMARY KEY,
    resource_id TEXT NOT NULL,
    plugin_id TEXT NOT NULL,
    version TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT 1,
    FOREIGN KEY (resource_id) REFERENCES resources(resource_id)
);

CREATE INDEX IF NOT EXISTS idx_plugin_installations_plugin ON plugin_installations (plugin_id);

CREATE TABLE IF NOT EXISTS outdated_version_alerts (
    alert_id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id TEXT NOT NULL,
    block_id TEXT,
    alert_type TEXT NOT NULL,     -- 'TemplateVersion' or 'PluginVersion'
    alert_status TEXT NOT NULL,   -- 'New', 'Canceled' or 'Resolved'
    outdated_version TEXT NOT NULL,
    latest_version TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    updated_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_alerts_scope ON outdated_version_alerts (resource_id, alert_type, alert_status);
"#;
