use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pushsync::AckFailure;
use pushsync::push::Permission;

#[derive(Parser, Debug)]
#[command(name = "pushsync")]
#[command(about = "Replay pushes, clicks and refreshes against the pushsync engine")]
#[command(version)]
pub struct Args {
    /// JSON config file; environment variables are used when omitted
    #[arg(short, long, env = "PUSHSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Notification permission reported by the console host
    #[arg(long, value_enum, default_value_t = PermissionArg::Granted)]
    pub permission: PermissionArg,

    /// URL of an open application client (repeatable)
    #[arg(long = "client", value_name = "URL")]
    pub clients: Vec<String>,

    /// Print the event log when the command finishes
    #[arg(long)]
    pub show_log: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory for rotated log files
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deliver one push body to the agent
    Push {
        /// File holding the raw body, or `-` for stdin
        input: String,

        /// Click the rendered notification afterwards with this action
        /// (`default` for a body click)
        #[arg(long, value_name = "ACTION")]
        click: Option<String>,
    },

    /// Deliver every line of a file as a separate push
    Replay {
        /// File with one raw body per line, or `-` for stdin
        input: String,
    },

    /// Route a click as if it came from a displayed notification
    Click {
        /// Target URL carried in the notification data
        #[arg(long)]
        url: Option<String>,

        /// Chosen action; omit for a body click
        #[arg(long)]
        action: Option<String>,
    },

    /// Show the fixed test notification
    TestNotification,

    /// Run a refresh through a session
    Refresh {
        #[arg(value_enum)]
        kind: RefreshArg,

        /// JSON file delivered on the subscription channel after `--delay-ms`
        #[arg(long, value_name = "FILE")]
        deliver: Option<PathBuf>,

        #[arg(long, default_value_t = 200)]
        delay_ms: u64,

        /// Make the acknowledgment channel fail
        #[arg(long, value_enum)]
        fail: Option<FailureArg>,

        /// Identify this user before refreshing
        #[arg(long)]
        user: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionArg {
    Granted,
    Denied,
    Default,
}

impl From<PermissionArg> for Permission {
    fn from(value: PermissionArg) -> Self {
        match value {
            PermissionArg::Granted => Permission::Granted,
            PermissionArg::Denied => Permission::Denied,
            PermissionArg::Default => Permission::Default,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshArg {
    Feed,
    Flags,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureArg {
    Network,
    RateLimited,
    Disabled,
    Timeout,
}

impl From<FailureArg> for AckFailure {
    fn from(value: FailureArg) -> Self {
        match value {
            FailureArg::Network => AckFailure::Network("simulated network error".to_string()),
            FailureArg::RateLimited => AckFailure::RateLimited,
            FailureArg::Disabled => AckFailure::FeatureDisabled,
            FailureArg::Timeout => AckFailure::Timeout,
        }
    }
}
