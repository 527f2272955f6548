use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use crate::alerts::{AlertFilter, AlertStatus, AlertType, AlertUpdate, OutdatedVersionAlert};
use crate::catalog::CatalogSnapshot;
use crate::config::Config;
use crate::database::Database;
use crate::error::AlertError;
use crate::lifecycle::{AlertManager, EventSettings};
use crate::notifications::Notifier;

#[derive(Parser)]
#[command(
    name = "versionalert",
    version,
    about = "versionalert: outdated template and plugin version alerts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the server (default if no command specified)
    Serve,

    /// Load workspaces, projects, resources and plugin installations from a JSON snapshot
    ImportCatalog {
        /// Path to the snapshot file
        file: PathBuf,
    },

    /// Raise alerts for every service using a template that has a new version
    TriggerTemplate {
        #[arg(long = "template-id")]
        template_id: String,

        /// Version the services are assumed to be on; nothing is raised without it
        #[arg(long = "outdated-version")]
        outdated_version: Option<String>,

        #[arg(long = "latest-version")]
        latest_version: String,

        #[arg(long = "user-id")]
        user_id: String,
    },

    /// Raise alerts for every installation of a plugin that has a new version
    TriggerPlugin {
        #[arg(long = "project-id")]
        project_id: String,

        #[arg(long = "plugin-id")]
        plugin_id: String,

        #[arg(long = "new-version")]
        new_version: String,

        #[arg(long = "user-id")]
        user_id: String,
    },

    /// Resolve the open template alerts of a resource
    ResolveTemplate {
        #[arg(long = "resource-id")]
        resource_id: String,
    },

    /// Move a service to a template version, resolving its alerts when current
    UpgradeTemplate {
        #[arg(long = "service-id")]
        service_id: String,

        #[arg(long = "version")]
        version: String,
    },

    /// List alerts, newest first
    ListAlerts {
        #[arg(long = "resource-id")]
        resource_id: Option<String>,

        #[arg(long = "type", value_parser = clap::builder::PossibleValuesParser::new(["TemplateVersion", "PluginVersion"]))]
        alert_type: Option<String>,

        #[arg(long = "status", value_parser = clap::builder::PossibleValuesParser::new(["New", "Canceled", "Resolved"]))]
        status: Option<String>,

        #[arg(long = "limit", short = 'n')]
        limit: Option<i64>,
    },

    /// Update the status of an alert
    UpdateAlert {
        #[arg(long = "id")]
        id: i64,

        #[arg(long = "status", value_parser = clap::builder::PossibleValuesParser::new(["New", "Canceled", "Resolved"]))]
        status: String,

        #[arg(long = "user-id")]
        user_id: String,
    },
}

impl Cli {
    pub fn handle_command_line(config: &Config) -> Result<(), AlertError> {
        let args = Cli::parse();
        let command = args.command.unwrap_or(Command::Serve);

        let manager = Arc::new(Self::build_manager(config)?);
        let result = Self::run(command, config, &manager);

        // Queued notifications must reach the sink before the process exits
        manager.notifier().join();
        result
    }

    fn build_manager(config: &Config) -> Result<AlertManager, AlertError> {
        let db = Database::open(&config.database.path)?;
        let notifier = Notifier::from_config(&config.notifications)?;
        let settings = EventSettings {
            env_base_url: config.notifications.env_base_url.clone(),
            actor_secret: config.notifications.actor_secret.clone(),
        };
        Ok(AlertManager::new(db, notifier, settings))
    }

    fn run(command: Command, config: &Config, manager: &Arc<AlertManager>) -> Result<(), AlertError> {
        match command {
            Command::Serve => Self::start_server(config, Arc::clone(manager)),
            Command::ImportCatalog { file } => {
                let contents = std::fs::read_to_string(&file)?;
                let snapshot: CatalogSnapshot = serde_json::from_str(&contents)?;
                let written = manager.import_catalog(&snapshot)?;
                println!("Imported {} catalog records from {}", written, file.display());
                Ok(())
            }
            Command::TriggerTemplate {
                template_id,
                outdated_version,
                latest_version,
                user_id,
            } => {
                let created = manager.trigger_alerts_for_template_version(
                    &template_id,
                    outdated_version.as_deref(),
                    &latest_version,
                    &user_id,
                )?;
                Self::print_alerts(&created);
                Ok(())
            }
            Command::TriggerPlugin {
                project_id,
                plugin_id,
                new_version,
                user_id,
            } => {
                let created = manager.trigger_alerts_for_new_plugin_version(
                    &project_id,
                    &plugin_id,
                    &new_version,
                    &user_id,
                )?;
                Self::print_alerts(&created);
                Ok(())
            }
            Command::ResolveTemplate { resource_id } => {
                let resolved = manager.resolve_for_template_update(&resource_id)?;
                println!("Resolved {} alert(s)", resolved);
                Ok(())
            }
            Command::UpgradeTemplate { service_id, version } => {
                let resolved = manager.upgrade_service_template(&service_id, &version)?;
                println!("Service {} now on template version {}; resolved {} alert(s)", service_id, version, resolved);
                Ok(())
            }
            Command::ListAlerts {
                resource_id,
                alert_type,
                status,
                limit,
            } => {
                let filter = AlertFilter {
                    resource_id,
                    alert_type: alert_type.as_deref().map(parse_alert_type).transpose()?,
                    status: status.as_deref().map(parse_alert_status).transpose()?,
                    limit,
                    ..Default::default()
                };
                Self::print_alerts(&manager.find_many(&filter)?);
                Ok(())
            }
            Command::UpdateAlert { id, status, user_id } => {
                let update = AlertUpdate {
                    status: Some(parse_alert_status(&status)?),
                    ..Default::default()
                };
                let alert = manager.update(id, &update, &user_id)?;
                Self::print_alerts(&[alert]);
                Ok(())
            }
        }
    }

    fn start_server(config: &Config, manager: Arc<AlertManager>) -> Result<(), AlertError> {
        let host = config.server.host.clone();
        let port = config.server.port;

        info!("Starting server on {}:{}", host, port);

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AlertError::Error(format!("Failed to create runtime: {}", e)))?;

        rt.block_on(async {
            let web_server = crate::server::WebServer::new(host, port, manager);
            web_server.start().await
        })
    }

    fn print_alerts(alerts: &[OutdatedVersionAlert]) {
        if alerts.is_empty() {
            println!("No alerts");
            return;
        }

        println!(
            "{:<8} {:<24} {:<16} {:<16} {:<10} {:<12} {:<12}",
            "ID", "RESOURCE", "BLOCK", "TYPE", "STATUS", "OUTDATED", "LATEST"
        );
        for alert in alerts {
            println!(
                "{:<8} {:<24} {:<16} {:<16} {:<10} {:<12} {:<12}",
                alert.id,
                alert.resource_id,
                alert.block_id.as_deref().unwrap_or("-"),
                alert.alert_type,
                alert.status,
                alert.outdated_version,
                alert.latest_version
            );
        }
    }
}

fn parse_alert_type(s: &str) -> Result<AlertType, AlertError> {
    s.parse()
        .map_err(|_| AlertError::InvalidArgument(format!("Invalid alert type: '{}'", s)))
}

fn parse_alert_status(s: &str) -> Result<AlertStatus, AlertError> {
    s.parse()
        .map_err(|_| AlertError::InvalidArgument(format!("Invalid alert status: '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_no_command_defaults_to_serve() {
        let result = Cli::try_parse_from(["versionalert"]);
        assert!(result.is_ok(), "Should accept no command");

        let cli = result.unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(cli.command.unwrap_or(Command::Serve), Command::Serve));
    }

    #[test]
    fn test_cli_parsing_trigger_template() {
        let cli = Cli::try_parse_from([
            "versionalert",
            "trigger-template",
            "--template-id",
            "tpl",
            "--latest-version",
            "1.1.0",
            "--user-id",
            "u1",
        ])
        .unwrap();

        match cli.command {
            Some(Command::TriggerTemplate {
                template_id,
                outdated_version,
                latest_version,
                user_id,
            }) => {
                assert_eq!(template_id, "tpl");
                assert_eq!(outdated_version, None);
                assert_eq!(latest_version, "1.1.0");
                assert_eq!(user_id, "u1");
            }
            _ => panic!("expected trigger-template"),
        }
    }

    #[test]
    fn test_cli_parsing_rejects_unknown_status() {
        let result = Cli::try_parse_from([
            "versionalert",
            "update-alert",
            "--id",
            "3",
            "--status",
            "Open",
            "--user-id",
            "u1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parsing_invalid_arguments() {
        let result = Cli::try_parse_from(["versionalert", "nonexistent-command"]);
        assert!(result.is_err(), "Should reject unknown commands");

        let result = Cli::try_parse_from(["versionalert", "serve", "--invalid-flag"]);
        assert!(result.is_err(), "Should reject unknown flags");
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_alert_status("Resolved").unwrap(), AlertStatus::Resolved);
        assert_eq!(parse_alert_type("PluginVersion").unwrap(), AlertType::PluginVersion);
        assert!(matches!(parse_alert_type("Nope"), Err(AlertError::InvalidArgument(_))));
    }
}
