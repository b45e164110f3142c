use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "svcdnsd")]
#[command(about = "service DNS reconciler and resolver", long_about = None)]
pub struct Cli {
    /// Path to the config file. If not provided, the daemon will look for a config file in the
    /// current working directory (svcdns.toml), in the home config dir
    /// ($HOME/.config/svcdns/config.toml) or in the system config dir (/etc/svcdns/config.toml)
    #[arg(long = "config", short = 'c', global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Watch cluster services and publish their DNS records
    Controller,
    /// Serve DNS from the published records
    Resolver,
    /// Run the controller and the resolver in one process
    All,
}

impl Command {
    pub fn runs_controller(&self) -> bool {
        matches!(self, Command::Controller | Command::All)
    }

    pub fn runs_resolver(&self) -> bool {
        matches!(self, Command::Resolver | Command::All)
    }
}
