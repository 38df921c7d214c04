//! itsm CLI - A service-desk console for incidents, bulk operations and SLA notifications.

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use itsm::bulk::{BulkAction, BulkProgress};
use itsm::cli::{
    BulkCommands, Cli, Commands, ConfigCommands, IncidentCommands, NotificationCommands,
    SlaCommands, SyncCommands, SystemCommands, TeamCommands, TechnicianCommands,
};
use itsm::commands::{self, Output};
use itsm::config::{ConfigOverrides, OutputFormat, ResolvedConfig, resolve_config};
use itsm::models::Priority;
use itsm::sla::ScanReport;
use itsm::{action_log, logging, storage};
use std::path::Path;
use std::process;
use std::time::Instant;

fn main() {
    logging::init();

    let cli = Cli::parse();
    let overrides = overrides_for(&cli);

    let data_dir = match storage::resolve_data_dir(cli.data_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => exit_with_error(&e, cli.human_readable, None),
    };

    let config = match resolve_config(&data_dir, &overrides) {
        Ok(config) => config,
        Err(e) => exit_with_error(&e, cli.human_readable, None),
    };
    let human = *config.output_format() == OutputFormat::Human;

    let Some(command) = cli.command else {
        // No subcommand: show help
        let _ = Cli::command().print_help();
        return;
    };

    // Serialize command for logging
    let (cmd_name, args_json) = serialize_command(&command);

    let start = Instant::now();
    let result = run_command(command, &data_dir, &config, &overrides, human);
    let duration = start.elapsed().as_millis() as u64;

    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    // Only log into directories that exist; a failed `init` should not create one
    if data_dir.exists() {
        action_log::log_action(
            &data_dir,
            &cmd_name,
            args_json,
            config.actor(),
            success,
            error,
            duration,
        );
    }

    if let Err(e) = result {
        exit_with_error(&e, human, Some(&data_dir));
    }
}

/// Collect CLI flags that take part in configuration resolution.
fn overrides_for(cli: &Cli) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    if let Some(actor) = &cli.actor {
        overrides = overrides.with_actor(actor.clone());
    }
    if let Some(url) = &cli.api_url {
        overrides = overrides.with_api_url(url.clone());
    }
    if let Some(Commands::Sla {
        command:
            SlaCommands::Watch {
                interval: Some(secs),
                ..
            },
    }) = &cli.command
    {
        overrides = overrides.with_sla_scan_interval(*secs);
    }
    overrides
}

fn exit_with_error(e: &itsm::Error, human: bool, data_dir: Option<&Path>) -> ! {
    let hint = match e {
        itsm::Error::NotInitialized => Some("run `itsm system init` to create the data directory"),
        _ => None,
    };
    if human {
        eprintln!("Error: {}", e);
        if let Some(hint) = hint {
            eprintln!("Hint: {}", hint);
        }
        if let Some(dir) = data_dir.filter(|_| hint.is_some()) {
            eprintln!("Data directory: {}", dir.display());
        }
    } else {
        let mut err = serde_json::json!({ "error": e.to_string() });
        if let Some(hint) = hint {
            err["hint"] = serde_json::json!(hint);
        }
        eprintln!("{}", err);
    }
    process::exit(1);
}

fn run_command(
    command: Commands,
    data_dir: &Path,
    config: &ResolvedConfig,
    overrides: &ConfigOverrides,
    human: bool,
) -> Result<(), itsm::Error> {
    let actor = config.actor();
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init => {
                let result = commands::system_init(data_dir)?;
                output(&result, human);
            }
            SystemCommands::Status => {
                let result = commands::system_status(data_dir)?;
                output(&result, human);
            }
            SystemCommands::Compact => {
                let result = commands::system_compact(data_dir)?;
                output(&result, human);
            }
        },

        Commands::Incident { command } => match command {
            IncidentCommands::Create {
                title,
                priority,
                description,
                category,
                caller,
                sla_hours,
            } => {
                let new = commands::NewIncident {
                    title,
                    priority: parse_priority(&priority)?,
                    description,
                    category,
                    caller,
                    sla_hours,
                };
                let result = commands::incident_create(data_dir, actor, new)?;
                output(&result, human);
            }
            IncidentCommands::List {
                status,
                priority,
                assigned,
            } => {
                let result = commands::incident_list(
                    data_dir,
                    status.as_deref(),
                    priority.as_deref(),
                    assigned.as_deref(),
                )?;
                output(&result, human);
            }
            IncidentCommands::Show { id } => {
                let result = commands::incident_show(data_dir, &id)?;
                output(&result, human);
            }
            IncidentCommands::Note { id, content } => {
                let result = commands::incident_note(data_dir, actor, &id, &content)?;
                output(&result, human);
            }
        },

        Commands::Technician { command } => match command {
            TechnicianCommands::Add { name, email, team } => {
                let result = commands::technician_add(data_dir, actor, &name, email, team)?;
                output(&result, human);
            }
            TechnicianCommands::List { team } => {
                let result = commands::technician_list(data_dir, team.as_deref())?;
                output(&result, human);
            }
        },

        Commands::Team { command } => match command {
            TeamCommands::Add { name, description } => {
                let result = commands::team_add(data_dir, actor, &name, description)?;
                output(&result, human);
            }
            TeamCommands::List => {
                let result = commands::team_list(data_dir)?;
                output(&result, human);
            }
        },

        Commands::Bulk { command } => {
            let (ids, action, push) = match command {
                BulkCommands::Assign {
                    ids,
                    team,
                    technician,
                    note,
                    push,
                } => (
                    ids,
                    BulkAction::Assign {
                        team,
                        technician,
                        note,
                    },
                    push,
                ),
                BulkCommands::Close {
                    ids,
                    code,
                    notes,
                    push,
                } => (
                    ids,
                    BulkAction::Close {
                        resolution_code: code,
                        resolution_notes: notes,
                    },
                    push,
                ),
                BulkCommands::Priority {
                    ids,
                    priority,
                    reason,
                    push,
                } => (
                    ids,
                    BulkAction::Priority {
                        priority: parse_priority(&priority)?,
                        reason,
                    },
                    push,
                ),
                BulkCommands::Note { ids, content, push } => {
                    (ids, BulkAction::Note { content }, push)
                }
            };
            let result = commands::bulk_run(data_dir, config, &ids, action, push, |p| {
                report_progress(p, human)
            })?;
            output(&result, human);
        }

        Commands::Sla { command } => match command {
            SlaCommands::Check { at } => {
                let at = at.as_deref().map(parse_instant).transpose()?;
                let result = commands::sla_check(data_dir, config, at)?;
                output(&result, human);
            }
            SlaCommands::Watch { max_scans, .. } => {
                let result = commands::sla_watch(data_dir, config, max_scans, |report| {
                    print_scan(report, human)
                })?;
                output(&result, human);
            }
        },

        Commands::Notification { command } => match command {
            NotificationCommands::List {
                unread,
                notification_type,
            } => {
                let result =
                    commands::notification_list(data_dir, unread, notification_type.as_deref())?;
                output(&result, human);
            }
            NotificationCommands::Read { id } => {
                let result = commands::notification_read(data_dir, &id)?;
                output(&result, human);
            }
            NotificationCommands::DismissAll => {
                let result = commands::notification_dismiss_all(data_dir)?;
                output(&result, human);
            }
        },

        Commands::Log { incident_id } => {
            let result = commands::log(data_dir, incident_id.as_deref())?;
            output(&result, human);
        }

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => {
                let result = commands::config_get(data_dir, overrides, &key)?;
                output(&result, human);
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(data_dir, &key, &value)?;
                output(&result, human);
            }
            ConfigCommands::List => {
                let result = commands::config_list(data_dir, overrides)?;
                output(&result, human);
            }
        },

        Commands::Sync { command } => match command {
            SyncCommands::Pull { url } => {
                let result = commands::sync_pull(data_dir, config, url.as_deref())?;
                output(&result, human);
            }
            SyncCommands::Push { ids, url } => {
                let result = commands::sync_push(data_dir, config, url.as_deref(), &ids)?;
                output(&result, human);
            }
        },
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn parse_priority(s: &str) -> Result<Priority, itsm::Error> {
    s.parse().map_err(itsm::Error::InvalidInput)
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, itsm::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| itsm::Error::InvalidInput(format!("invalid timestamp {}: {}", s, e)))
}

/// Bulk progress goes to stderr so stdout stays a single result.
fn report_progress(progress: &BulkProgress<'_>, human: bool) {
    if human {
        eprintln!(
            "[{}/{}] {} {}",
            progress.index,
            progress.total,
            progress.incident_id,
            if progress.succeeded { "ok" } else { "failed" }
        );
    }
}

/// Each scan of `sla watch` prints as it happens; the summary follows on exit.
fn print_scan(report: &ScanReport, human: bool) {
    if human {
        println!(
            "{} scanned {} incident(s)",
            report.scanned_at.format("%H:%M:%S"),
            report.evaluated
        );
        for notification in &report.raised {
            println!("  {}", commands::toast(notification));
        }
    } else {
        println!(
            "{}",
            serde_json::to_string(report).unwrap_or_else(|e| {
                serde_json::json!({ "error": e.to_string() }).to_string()
            })
        );
    }
}

/// Command name and arguments for the action log.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init => ("system init".to_string(), serde_json::json!({})),
            SystemCommands::Status => ("system status".to_string(), serde_json::json!({})),
            SystemCommands::Compact => ("system compact".to_string(), serde_json::json!({})),
        },

        Commands::Incident { command } => match command {
            IncidentCommands::Create {
                title,
                priority,
                description,
                category,
                caller,
                sla_hours,
            } => (
                "incident create".to_string(),
                serde_json::json!({
                    "title": title,
                    "priority": priority,
                    "description": description,
                    "category": category,
                    "caller": caller,
                    "sla_hours": sla_hours,
                }),
            ),
            IncidentCommands::List {
                status,
                priority,
                assigned,
            } => (
                "incident list".to_string(),
                serde_json::json!({ "status": status, "priority": priority, "assigned": assigned }),
            ),
            IncidentCommands::Show { id } => {
                ("incident show".to_string(), serde_json::json!({ "id": id }))
            }
            IncidentCommands::Note { id, content } => (
                "incident note".to_string(),
                serde_json::json!({ "id": id, "content": content }),
            ),
        },

        Commands::Technician { command } => match command {
            TechnicianCommands::Add { name, email, team } => (
                "technician add".to_string(),
                serde_json::json!({ "name": name, "email": email, "team": team }),
            ),
            TechnicianCommands::List { team } => (
                "technician list".to_string(),
                serde_json::json!({ "team": team }),
            ),
        },

        Commands::Team { command } => match command {
            TeamCommands::Add { name, description } => (
                "team add".to_string(),
                serde_json::json!({ "name": name, "description": description }),
            ),
            TeamCommands::List => ("team list".to_string(), serde_json::json!({})),
        },

        Commands::Bulk { command } => match command {
            BulkCommands::Assign {
                ids,
                team,
                technician,
                note,
                push,
            } => (
                "bulk assign".to_string(),
                serde_json::json!({
                    "ids": ids,
                    "team": team,
                    "technician": technician,
                    "note": note,
                    "push": push,
                }),
            ),
            BulkCommands::Close {
                ids,
                code,
                notes,
                push,
            } => (
                "bulk close".to_string(),
                serde_json::json!({ "ids": ids, "code": code, "notes": notes, "push": push }),
            ),
            BulkCommands::Priority {
                ids,
                priority,
                reason,
                push,
            } => (
                "bulk priority".to_string(),
                serde_json::json!({
                    "ids": ids,
                    "priority": priority,
                    "reason": reason,
                    "push": push,
                }),
            ),
            BulkCommands::Note { ids, content, push } => (
                "bulk note".to_string(),
                serde_json::json!({ "ids": ids, "content": content, "push": push }),
            ),
        },

        Commands::Sla { command } => match command {
            SlaCommands::Check { at } => ("sla check".to_string(), serde_json::json!({ "at": at })),
            SlaCommands::Watch {
                interval,
                max_scans,
            } => (
                "sla watch".to_string(),
                serde_json::json!({ "interval": interval, "max_scans": max_scans }),
            ),
        },

        Commands::Notification { command } => match command {
            NotificationCommands::List {
                unread,
                notification_type,
            } => (
                "notification list".to_string(),
                serde_json::json!({ "unread": unread, "type": notification_type }),
            ),
            NotificationCommands::Read { id } => (
                "notification read".to_string(),
                serde_json::json!({ "id": id }),
            ),
            NotificationCommands::DismissAll => {
                ("notification dismiss-all".to_string(), serde_json::json!({}))
            }
        },

        Commands::Log { incident_id } => (
            "log".to_string(),
            serde_json::json!({ "incident_id": incident_id }),
        ),

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => {
                ("config get".to_string(), serde_json::json!({ "key": key }))
            }
            ConfigCommands::Set { key, value } => (
                "config set".to_string(),
                serde_json::json!({
                    "key": key,
                    "value": value,
                }),
            ),
            ConfigCommands::List => ("config list".to_string(), serde_json::json!({})),
        },

        Commands::Sync { command } => match command {
            SyncCommands::Pull { url } => {
                ("sync pull".to_string(), serde_json::json!({ "url": url }))
            }
            SyncCommands::Push { ids, url } => (
                "sync push".to_string(),
                serde_json::json!({ "ids": ids, "url": url }),
            ),
        },
    }
}
