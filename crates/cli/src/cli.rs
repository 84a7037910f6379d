use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mchat")]
#[command(about = "Member portal chat diagnostics: business hours, eligibility verdicts, live bootstrap checks")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Text)]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Parse a business-hours descriptor and report whether it is open
	Hours {
		/// Descriptor, e.g. "Mon-Fri: 8:00 AM - 5:00 PM ET" or "M_F_8_17"
		raw: String,
		/// Local wall-clock time to evaluate at (defaults to now)
		#[arg(long, value_name = "YYYY-MM-DDTHH:MM")]
		at: Option<String>,
	},

	/// Resolve an eligibility verdict from plan flags and hours
	Resolve {
		/// Business-hours descriptor
		#[arg(long)]
		hours: String,
		/// Treat chat as disabled for the plan
		#[arg(long)]
		plan_disabled: bool,
		/// Route to the cloud chat product
		#[arg(long)]
		cloud: bool,
		#[arg(long, value_name = "YYYY-MM-DDTHH:MM")]
		at: Option<String>,
	},

	/// Query the live eligibility service and try the widget script
	Check {
		#[arg(long)]
		plan: String,
		#[arg(long)]
		member: Option<String>,
		/// JSON configuration file
		#[arg(long, value_name = "PATH")]
		config: Option<PathBuf>,
	},
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
	fn global_flags_follow_subcommand() {
		let cli = Cli::try_parse_from(["mchat", "hours", "24/7", "-f", "json", "-vv"]).unwrap();
		assert_eq!(cli.format, OutputFormat::Json);
		assert_eq!(cli.verbose, 2);
		assert!(matches!(cli.command, Commands::Hours { ref raw, at: None } if raw == "24/7"));
	}
}
