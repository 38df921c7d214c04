//! CLI argument definitions for itsm.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// itsm - A service-desk console for incidents, bulk operations and SLA notifications.
///
/// Start with `itsm system init`, then `itsm incident create` and `itsm sla check`.
#[derive(Parser, Debug)]
#[command(name = "itsm")]
#[command(author, version, about = "A service-desk console for incidents, bulk operations and SLA notifications", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Data directory (default: platform data dir + /itsm)
    #[arg(short = 'D', long = "data-dir", global = true, env = "ITSM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Name recorded on notes and audit entries
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Base URL of the REST backend (e.g., http://localhost:3000)
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Data directory administration
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// Incident management commands
    Incident {
        #[command(subcommand)]
        command: IncidentCommands,
    },

    /// Technician directory
    Technician {
        #[command(subcommand)]
        command: TechnicianCommands,
    },

    /// Team directory (assignment groups)
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },

    /// Apply one action to many incidents
    ///
    /// Each incident is processed independently: failures are counted and
    /// reported, and never stop the rest of the batch.
    Bulk {
        #[command(subcommand)]
        command: BulkCommands,
    },

    /// SLA deadline monitoring
    Sla {
        #[command(subcommand)]
        command: SlaCommands,
    },

    /// Notification list
    Notification {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Show audit trail of changes
    Log {
        /// Optional incident ID to filter entries
        incident_id: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Exchange data with the REST backend
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

/// System subcommands
#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Initialize the data directory
    Init,

    /// Summary of incidents, directory and notifications
    Status,

    /// Rewrite data files keeping only the latest version of each record
    Compact,
}

/// Incident subcommands
#[derive(Subcommand, Debug)]
pub enum IncidentCommands {
    /// Open a new incident
    Create {
        /// Short description
        title: String,

        /// Priority (P1-P4, P1 is most urgent)
        #[arg(short, long, default_value = "P3")]
        priority: String,

        /// Detailed description
        #[arg(short, long)]
        description: Option<String>,

        /// Service category (e.g., Network, Email)
        #[arg(short, long)]
        category: Option<String>,

        /// Person reporting the incident
        #[arg(long)]
        caller: Option<String>,

        /// Resolution window in hours (default depends on priority: 4/8/24/72)
        #[arg(long)]
        sla_hours: Option<f64>,
    },

    /// List incidents, most urgent first
    List {
        /// Filter by status (new, assigned, in-progress, pending, resolved, closed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by priority (P1-P4)
        #[arg(short, long)]
        priority: Option<String>,

        /// Filter by team or technician
        #[arg(short, long)]
        assigned: Option<String>,
    },

    /// Show one incident with its notes
    Show {
        /// Incident ID (e.g., INC0001)
        id: String,
    },

    /// Append a work note
    Note {
        /// Incident ID
        id: String,

        /// Note text
        content: String,
    },
}

/// Technician subcommands
#[derive(Subcommand, Debug)]
pub enum TechnicianCommands {
    /// Register a technician
    Add {
        /// Full name
        name: String,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,

        /// Team name or ID
        #[arg(short, long)]
        team: Option<String>,
    },

    /// List technicians
    List {
        /// Only technicians of this team
        #[arg(short, long)]
        team: Option<String>,
    },
}

/// Team subcommands
#[derive(Subcommand, Debug)]
pub enum TeamCommands {
    /// Register a team
    Add {
        /// Team name
        name: String,

        /// What the team handles
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List teams
    List,
}

/// Bulk subcommands
#[derive(Subcommand, Debug)]
pub enum BulkCommands {
    /// Assign incidents to a team and optionally a technician
    Assign {
        /// Incident IDs, processed in the order given
        #[arg(required = true)]
        ids: Vec<String>,

        /// Team name or ID
        #[arg(short, long)]
        team: String,

        /// Technician name or ID
        #[arg(short = 'T', long)]
        technician: Option<String>,

        /// Work note added to every incident
        #[arg(short, long)]
        note: Option<String>,

        /// Also send each updated incident to the REST backend
        #[arg(long)]
        push: bool,
    },

    /// Close incidents with a resolution code
    Close {
        /// Incident IDs, processed in the order given
        #[arg(required = true)]
        ids: Vec<String>,

        /// Resolution code (e.g., Solved, Workaround, Duplicate)
        #[arg(short, long)]
        code: String,

        /// Resolution notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Also send each updated incident to the REST backend
        #[arg(long)]
        push: bool,
    },

    /// Change priority
    Priority {
        /// Incident IDs, processed in the order given
        #[arg(required = true)]
        ids: Vec<String>,

        /// New priority (P1-P4)
        #[arg(short, long)]
        priority: String,

        /// Reason recorded in the priority-change note
        #[arg(short, long)]
        reason: Option<String>,

        /// Also send each updated incident to the REST backend
        #[arg(long)]
        push: bool,
    },

    /// Append a work note
    Note {
        /// Incident IDs, processed in the order given
        #[arg(required = true)]
        ids: Vec<String>,

        /// Note text
        #[arg(short, long)]
        content: String,

        /// Also send each updated incident to the REST backend
        #[arg(long)]
        push: bool,
    },
}

/// SLA subcommands
#[derive(Subcommand, Debug)]
pub enum SlaCommands {
    /// Scan open incidents once and raise warnings and breaches
    Check {
        /// Evaluate as of this instant (RFC 3339) instead of now
        #[arg(long)]
        at: Option<String>,
    },

    /// Scan now and then on every interval until interrupted
    Watch {
        /// Seconds between scans (default: sla-scan-interval config, 60)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many scans
        #[arg(long)]
        max_scans: Option<u64>,
    },
}

/// Notification subcommands
#[derive(Subcommand, Debug)]
pub enum NotificationCommands {
    /// List notifications, newest first
    List {
        /// Only unread notifications
        #[arg(short, long)]
        unread: bool,

        /// Filter by type (sla-warning, sla-breached, assignment, ...)
        #[arg(short = 't', long = "type")]
        notification_type: Option<String>,
    },

    /// Mark a notification as read
    Read {
        /// Notification ID (e.g., ntf-1a2b3c)
        id: String,
    },

    /// Remove every notification
    DismissAll,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get the effective value of a key
    Get {
        /// Key (output-format, actor, sla-warning-threshold, sla-scan-interval, bulk-item-delay-ms, api-url)
        key: String,
    },

    /// Set a key in the data directory's config.kdl
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },

    /// List every key with its value and source
    List,
}

/// Sync subcommands
#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Replace local incidents, technicians and teams with the backend's
    Pull {
        /// Backend URL (default: --api-url, ITSM_API_URL or api-url config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Send incident records to the backend
    Push {
        /// Incident IDs (default: every incident)
        ids: Vec<String>,

        /// Backend URL (default: --api-url, ITSM_API_URL or api-url config)
        #[arg(long)]
        url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bulk_requires_ids() {
        let parsed = Cli::try_parse_from(["itsm", "bulk", "close", "--code", "Solved"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_bulk_ids_keep_order() {
        let cli = Cli::try_parse_from([
            "itsm", "-H", "bulk", "priority", "INC0003", "INC0001", "-p", "P1",
        ])
        .unwrap();
        assert!(cli.human_readable);
        match cli.command {
            Some(Commands::Bulk {
                command: BulkCommands::Priority { ids, priority, .. },
            }) => {
                assert_eq!(ids, vec!["INC0003", "INC0001"]);
                assert_eq!(priority, "P1");
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
