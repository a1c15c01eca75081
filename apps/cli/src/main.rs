//! Parley terminal client.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley_client::config::ClientConfig;

/// End-to-end encrypted direct messages from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account with a new key pair and log in
    Register {
        username: String,
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },

    /// Log in with an existing account
    Login {
        username: String,
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and erase this device's key (unless configured otherwise)
    Logout,

    /// Show the logged-in user and the fingerprint of this device's key
    Whoami,

    /// List conversation partners
    Partners,

    /// Send a direct message
    Send {
        peer: String,
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Print a conversation
    Open { peer: String },

    /// Print a conversation and follow new messages until Ctrl-C
    Watch { peer: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match commands::run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn send_joins_trailing_words() {
        let cli = Cli::try_parse_from(["parley", "send", "bob", "hello", "there"]).unwrap();
        match cli.command {
            Command::Send { peer, message } => {
                assert_eq!(peer, "bob");
                assert_eq!(message.join(" "), "hello there");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_requires_a_message() {
        assert!(Cli::try_parse_from(["parley", "send", "bob"]).is_err());
    }

    #[test]
    fn register_takes_both_passwords() {
        let cli = Cli::try_parse_from([
            "parley",
            "register",
            "alice",
            "--password",
            "pw",
            "--confirm-password",
            "pw",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Register { .. }));
    }
}
