// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI configuration for the `eventbus` demo binary, following the
//! `clap::Parser` + `env` fallback convention used elsewhere in this family
//! of services (renamed here from `COOP_MUX_*` to `EVENTBUS_*`).

use clap::{Parser, Subcommand};

use crate::client::ClientConfig;

/// `eventbus` — a one-to-many event broadcaster over the Fast transport.
#[derive(Debug, Parser)]
#[command(name = "eventbus", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the subscription server.
    Serve(ServeArgs),
    /// Connect a streaming client and print every received event as JSON.
    Client(ClientConfig),
}

/// Arguments for the `serve` subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "EVENTBUS_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9800, env = "EVENTBUS_PORT")]
    pub port: u16,

    /// Server identity stamped on every outbound event. A UUID v4 is
    /// generated when absent.
    #[arg(long, env = "EVENTBUS_SERVER_ID")]
    pub server_id: Option<String>,
}
