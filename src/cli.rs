//! CLI argument parsing for the fixera-worker binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fixera-worker", about = "Fixera marketplace backend worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Create a discount code and print it
    CreatePromo {
        /// Code string; a random one is generated when omitted
        #[arg(long)]
        code: Option<String>,
        /// Discount type
        #[arg(long, value_parser = ["percentage", "fixed"])]
        discount_type: String,
        /// Percentage (0-100) or fixed amount
        #[arg(long)]
        value: f64,
        /// Maximum number of uses
        #[arg(long, default_value_t = 100)]
        usage_limit: i32,
        /// Days the code stays valid, starting now
        #[arg(long, default_value_t = 30)]
        valid_days: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["fixera-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_command_parses() {
        let cli = Cli::parse_from(["fixera-worker", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_migrate_command_parses() {
        let cli = Cli::parse_from(["fixera-worker", "migrate"]);
        assert!(matches!(cli.command, Some(Command::Migrate)));
    }

    #[test]
    fn test_cli_create_promo_parses() {
        let cli = Cli::parse_from([
            "fixera-worker",
            "create-promo",
            "--discount-type",
            "percentage",
            "--value",
            "10",
        ]);
        match cli.command {
            Some(Command::CreatePromo {
                code,
                discount_type,
                value,
                usage_limit,
                valid_days,
            }) => {
                assert!(code.is_none());
                assert_eq!(discount_type, "percentage");
                assert!((value - 10.0).abs() < f64::EPSILON);
                assert_eq!(usage_limit, 100);
                assert_eq!(valid_days, 30);
            }
            _ => panic!("expected create-promo"),
        }
    }

    #[test]
    fn test_cli_create_promo_rejects_unknown_type() {
        let result = Cli::try_parse_from([
            "fixera-worker",
            "create-promo",
            "--discount-type",
            "bogus",
            "--value",
            "10",
        ]);
        assert!(result.is_err());
    }
}
