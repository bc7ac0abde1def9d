//! Command-line surface and dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::output::OutputContext;

/// Install and verify the Zenoh DDS bridge for Go2 robots
#[derive(Parser)]
#[command(
    name = "bridgectl",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Print machine-readable JSON where the command supports it
    #[arg(long, global = true)]
    pub json: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR", value_parser = clap::builder::FalseyValueParser::new())]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install, configure, and start the bridge on the robot
    Install(commands::install::InstallArgs),

    /// Install and configure the bridge on this workstation
    Setup(commands::setup::SetupArgs),

    /// Show the robot's installation state
    Status(commands::status::StatusArgs),
}

impl Cli {
    /// Dispatch to the selected command.
    ///
    /// # Errors
    ///
    /// Propagates the command's error; the binary maps it to exit code 1.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            command,
        } = self;
        let ctx = OutputContext::new(no_color, quiet);
        match command {
            Command::Install(args) => commands::install::run(&ctx, &args).await,
            Command::Setup(args) => commands::setup::run(&ctx, &args).await,
            Command::Status(args) => commands::status::run(&ctx, &args, json).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn install_parses_flags_and_defaults() {
        let cli = Cli::parse_from(["bridgectl", "install", "192.168.123.18"]);
        let Command::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.robot_host, "192.168.123.18");
        assert_eq!(args.port, 22);
        assert!(args.user.is_none());
        assert!(!args.test && !args.no_start && !args.force);
    }

    #[test]
    fn install_test_conflicts_with_force_and_no_start() {
        assert!(Cli::try_parse_from(["bridgectl", "install", "go2", "--test", "--force"]).is_err());
        assert!(
            Cli::try_parse_from(["bridgectl", "install", "go2", "--test", "--no-start"]).is_err()
        );
        assert!(Cli::try_parse_from(["bridgectl", "install", "go2", "--force"]).is_ok());
    }

    #[test]
    fn setup_test_conflicts_with_force() {
        assert!(Cli::try_parse_from(["bridgectl", "setup", "go2", "--test", "--force"]).is_err());
        assert!(Cli::try_parse_from(["bridgectl", "setup", "go2", "--tailscale"]).is_ok());
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::parse_from(["bridgectl", "status", "go2", "--json", "-q"]);
        assert!(cli.json);
        assert!(cli.quiet);
    }
}
