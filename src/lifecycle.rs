use log::{debug, info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::alerts::{AlertFilter, AlertStatus, AlertType, AlertUpdate, Alerts, NewAlert, OutdatedVersionAlert};
use crate::catalog::{Catalog, CatalogSnapshot, Project, Resource, ResourceType};
use crate::database::Database;
use crate::error::AlertError;
use crate::notifications::{external_id, Notifier, TechDebtEvent};

/// Settings stamped onto every outbound event
#[derive(Debug, Clone)]
pub struct EventSettings {
    pub env_base_url: String,
    pub actor_secret: String,
}

impl EventSettings {
    /// Without a secret the external id is a plain SHA-256 of the user id
    pub fn is_actor_id_keyed(&self) -> bool {
        !self.actor_secret.trim().is_empty()
    }
}

/// What an alert is about, for building its event
struct AlertSubject<'a> {
    resource: &'a Resource,
    project: &'a Project,
    initiator: &'a str,
}

/// Owns every status transition of outdated version alerts
pub struct AlertManager {
    db: Database,
    notifier: Notifier,
    settings: EventSettings,
}

impl AlertManager {
    pub fn new(db: Database, notifier: Notifier, settings: EventSettings) -> Self {
        if !settings.is_actor_id_keyed() {
            warn!("notifications.actor_secret is empty; event external ids are unkeyed user id hashes");
        }
        AlertManager {
            db,
            notifier,
            settings,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Writes a catalog snapshot in one transaction
    pub fn import_catalog(&self, snapshot: &CatalogSnapshot) -> Result<usize, AlertError> {
        let conn = self.db.get_connection()?;
        let written = Database::immediate_transaction(&conn, |c| Catalog::import(c, snapshot))?;
        info!("Imported {} catalog records", written);
        Ok(written)
    }

    /// Cancels the New alerts of the scope and inserts a fresh New alert, atomically
    pub fn create(&self, args: &NewAlert) -> Result<OutdatedVersionAlert, AlertError> {
        let conn = self.db.get_connection()?;
        Database::immediate_transaction(&conn, |c| Self::create_locked(c, args))
    }

    fn create_locked(conn: &Connection, args: &NewAlert) -> Result<OutdatedVersionAlert, AlertError> {
        let canceled = Alerts::cancel_open_in_scope(
            conn,
            &args.resource_id,
            args.block_id.as_deref(),
            args.alert_type,
        )?;
        if canceled > 0 {
            debug!(
                "Canceled {} superseded {} alert(s) for resource {}",
                canceled, args.alert_type, args.resource_id
            );
        }

        Alerts::create(conn, args)
    }

    /// Updates an alert on behalf of `user_id`. Terminal alerts can't be reopened.
    pub fn update(
        &self,
        alert_id: i64,
        update: &AlertUpdate,
        user_id: &str,
    ) -> Result<OutdatedVersionAlert, AlertError> {
        let conn = self.db.get_connection()?;

        Database::immediate_transaction(&conn, |c| {
            let current = Alerts::find_one(c, alert_id)?
                .ok_or_else(|| AlertError::NotFound(format!("Alert {}", alert_id)))?;

            if update.status == Some(AlertStatus::New) && current.status.is_terminal() {
                return Err(AlertError::InvalidArgument(format!(
                    "Alert {} is {} and can't be moved back to New",
                    alert_id, current.status
                )));
            }

            Alerts::update(c, alert_id, update, Some(user_id))?
                .ok_or_else(|| AlertError::NotFound(format!("Alert {}", alert_id)))
        })
    }

    pub fn find_one(&self, alert_id: i64) -> Result<Option<OutdatedVersionAlert>, AlertError> {
        let conn = self.db.get_connection()?;
        Alerts::find_one(&conn, alert_id)
    }

    pub fn find_many(&self, filter: &AlertFilter) -> Result<Vec<OutdatedVersionAlert>, AlertError> {
        let conn = self.db.get_connection()?;
        Alerts::find_many(&conn, filter)
    }

    pub fn count(&self, filter: &AlertFilter) -> Result<i64, AlertError> {
        let conn = self.db.get_connection()?;
        Alerts::count(&conn, filter)
    }

    /// Resolves the New template alerts of `resource_id`. Returns how many were resolved.
    pub fn resolve_for_template_update(&self, resource_id: &str) -> Result<usize, AlertError> {
        let conn = self.db.get_connection()?;
        Database::immediate_transaction(&conn, |c| Self::resolve_for_template_update_locked(c, resource_id))
    }

    fn resolve_for_template_update_locked(conn: &Connection, resource_id: &str) -> Result<usize, AlertError> {
        let filter = AlertFilter::for_scope(resource_id, AlertType::TemplateVersion, AlertStatus::New);
        let resolved = Alerts::update_many(conn, &filter, AlertStatus::Resolved)?;
        if resolved > 0 {
            info!(
                "Resolved {} template version alert(s) for resource {}",
                resolved, resource_id
            );
        }
        Ok(resolved)
    }

    /// Moves a service to `version` of its template. When that is the
    /// template's current version, its template alerts are resolved in the
    /// same transaction. Returns how many alerts were resolved.
    pub fn upgrade_service_template(&self, service_id: &str, version: &str) -> Result<usize, AlertError> {
        let conn = self.db.get_connection()?;

        Database::immediate_transaction(&conn, |c| {
            let settings = Catalog::get_template_settings(c, service_id)?.ok_or_else(|| {
                AlertError::NotFound(format!("Service '{}' with a service template", service_id))
            })?;
            Catalog::set_service_template_version(c, service_id, version)?;

            let template = Catalog::get_resource(c, &settings.service_template_id)?;
            let is_current = template
                .and_then(|t| t.version)
                .is_some_and(|current| current == version);

            if is_current {
                Self::resolve_for_template_update_locked(c, service_id)
            } else {
                Ok(0)
            }
        })
    }

    /// Raises a template version alert for every service of the template's
    /// project that uses it. With no `outdated_version` nothing is raised.
    pub fn trigger_alerts_for_template_version(
        &self,
        template_id: &str,
        outdated_version: Option<&str>,
        latest_version: &str,
        user_id: &str,
    ) -> Result<Vec<OutdatedVersionAlert>, AlertError> {
        let _tmr = timer!(Level::Debug; "AlertManager.trigger_alerts_for_template_version", "{}", template_id);
        let conn = self.db.get_connection()?;

        let template = Catalog::get_resource(&conn, template_id)?
            .ok_or_else(|| AlertError::NotFound(format!("Resource '{}'", template_id)))?;
        if template.resource_type != ResourceType::ServiceTemplate {
            return Err(AlertError::InvalidArgument(format!(
                "Resource '{}' is a {}, not a service template",
                template_id, template.resource_type
            )));
        }

        let project = Self::project_of(&conn, &template)?;
        let services = Catalog::find_services_by_template(&conn, &project.id, template_id)?;

        let Some(outdated_version) = outdated_version else {
            debug!(
                "No outdated version given for template {}; skipping {} service(s)",
                template_id,
                services.len()
            );
            return Ok(Vec::new());
        };

        let external_id = external_id(&self.settings.actor_secret, user_id);
        let mut created = Vec::new();

        for service in &services {
            let current_version = Catalog::get_template_settings(&conn, &service.id)?
                .and_then(|settings| settings.version)
                .unwrap_or_else(|| outdated_version.to_owned());

            let alert = Database::immediate_transaction(&conn, |c| {
                Self::create_locked(
                    c,
                    &NewAlert {
                        resource_id: service.id.clone(),
                        block_id: None,
                        alert_type: AlertType::TemplateVersion,
                        outdated_version: current_version,
                        latest_version: latest_version.to_owned(),
                    },
                )
            })?;

            let subject = AlertSubject {
                resource: service,
                project: &project,
                initiator: &template.name,
            };
            self.notifier.dispatch(
                self.build_event(&subject, &alert, &external_id),
                format!("service {}", service.id),
            );
            created.push(alert);
        }

        info!(
            "Created {} template version alert(s) for template {} ({} -> {})",
            created.len(),
            template_id,
            outdated_version,
            latest_version
        );
        Ok(created)
    }

    /// Raises a plugin version alert for every installation of `plugin_id` in the project
    pub fn trigger_alerts_for_new_plugin_version(
        &self,
        project_id: &str,
        plugin_id: &str,
        new_version: &str,
        user_id: &str,
    ) -> Result<Vec<OutdatedVersionAlert>, AlertError> {
        let _tmr = timer!(Level::Debug; "AlertManager.trigger_alerts_for_new_plugin_version", "{}", plugin_id);
        let conn = self.db.get_connection()?;

        let project = Catalog::get_project(&conn, project_id)?
            .ok_or_else(|| AlertError::NotFound(format!("Project '{}'", project_id)))?;
        let installations = Catalog::find_plugin_installations(&conn, project_id, plugin_id)?;

        let external_id = external_id(&self.settings.actor_secret, user_id);
        let mut created = Vec::new();

        for installation in &installations {
            let alert = Database::immediate_transaction(&conn, |c| {
                Self::create_locked(
                    c,
                    &NewAlert {
                        resource_id: installation.resource_id.clone(),
                        block_id: Some(installation.block_id.clone()),
                        alert_type: AlertType::PluginVersion,
                        outdated_version: installation.version.clone(),
                        latest_version: new_version.to_owned(),
                    },
                )
            })?;

            let resource = Catalog::get_resource(&conn, &installation.resource_id)?.ok_or_else(|| {
                AlertError::NotFound(format!("Resource '{}'", installation.resource_id))
            })?;

            let subject = AlertSubject {
                resource: &resource,
                project: &project,
                initiator: plugin_id,
            };
            self.notifier.dispatch(
                self.build_event(&subject, &alert, &external_id),
                format!("plugin installation {}", installation.block_id),
            );
            created.push(alert);
        }

        info!(
            "Created {} plugin version alert(s) for plugin {} in project {}",
            created.len(),
            plugin_id,
            project_id
        );
        Ok(created)
    }

    fn project_of(conn: &Connection, resource: &Resource) -> Result<Project, AlertError> {
        Catalog::get_project(conn, &resource.project_id)?
            .ok_or_else(|| AlertError::NotFound(format!("Project '{}'", resource.project_id)))
    }

    fn build_event(
        &self,
        subject: &AlertSubject,
        alert: &OutdatedVersionAlert,
        external_id: &str,
    ) -> TechDebtEvent {
        TechDebtEvent {
            resource_id: subject.resource.id.clone(),
            resource_name: subject.resource.name.clone(),
            workspace_id: subject.project.workspace_id.clone(),
            project_id: subject.project.id.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
            tech_debt_id: alert.id.to_string(),
            env_base_url: self.settings.env_base_url.clone(),
            external_id: external_id.to_owned(),
            resource_type: subject.resource.resource_type,
            project_name: subject.project.name.clone(),
            alert_type: alert.alert_type,
            alert_initiator: subject.initiator.to_owned(),
        }
    }
}
