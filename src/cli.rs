use clap::{Parser, Subcommand};

/// ideahub: notification fan-out service for the idea sharing platform
#[derive(Parser)]
#[command(name = "ideahub", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the notification server
    Serve {
        /// Port to bind (overrides IDEAHUB_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect and update stored notifications
    Notification {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Manage push tokens and test delivery
    Push {
        #[command(subcommand)]
        command: PushCommands,
    },

    /// Delete read notifications older than the given age
    Purge {
        #[arg(long)]
        days: u32,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List unread notifications for a user
    List {
        #[arg(long)]
        user_id: String,
    },
    /// Mark one notification as read
    MarkRead { id: String },
    /// Mark every unread notification of a user as read
    ReadAll {
        #[arg(long)]
        user_id: String,
    },
}

#[derive(Subcommand)]
pub enum PushCommands {
    /// Register (or replace) a user's device token
    SetToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        token: String,
    },
    /// Report whether a user has a device token
    CheckToken {
        #[arg(long)]
        user_id: String,
    },
    /// Send a test push straight to a device token
    Test {
        #[arg(long)]
        token: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
    },
}
