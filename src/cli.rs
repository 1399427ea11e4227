//! CLI argument parsing for eventshift

use crate::correction::CorrectionMethod;
use crate::hypothesis::TestKind;
use crate::power::{SolveFor, Tails};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Unknown solved for by `power`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SolveTarget {
    /// Per-group sample size
    N,
    /// Achieved power
    Power,
    /// Minimum detectable effect
    Effect,
}

impl From<SolveTarget> for SolveFor {
    fn from(target: SolveTarget) -> Self {
        match target {
            SolveTarget::N => SolveFor::SampleSize,
            SolveTarget::Power => SolveFor::Power,
            SolveTarget::Effect => SolveFor::EffectSize,
        }
    }
}

fn parse_tails(s: &str) -> Result<Tails, String> {
    match s {
        "1" | "one" => Ok(Tails::One),
        "2" | "two" => Ok(Tails::Two),
        _ => Err(format!("tails must be 1 or 2, got '{}'", s)),
    }
}

#[derive(Parser, Debug)]
#[command(name = "eventshift")]
#[command(version)]
#[command(about = "Statistical impact analysis of events on time-series metrics", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a comprehensive impact report for one event
    Report(ReportArgs),
    /// Run a two-sample test on inline before/after values
    Test(TestArgs),
    /// Correct a family of p-values for multiple comparisons
    Correct(CorrectArgs),
    /// Power analysis for a two-sample test
    Power(PowerArgs),
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// JSON data file with `events` and `samples`
    #[arg(long = "data", value_name = "FILE")]
    pub data: PathBuf,

    /// Event id to analyze
    #[arg(long = "event", value_name = "ID")]
    pub event: String,

    /// Fields to analyze (default: every field in the data file)
    #[arg(long = "fields", value_name = "FIELDS", value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Restrict to these entities (default: all)
    #[arg(long = "entities", value_name = "IDS", value_delimiter = ',')]
    pub entities: Vec<String>,

    /// Days before the event in the comparison window
    #[arg(long = "before-days", value_name = "DAYS", default_value = "30")]
    pub before_days: u32,

    /// Days after the event in the comparison window
    #[arg(long = "after-days", value_name = "DAYS", default_value = "30")]
    pub after_days: u32,

    /// Engine configuration (TOML)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seed for every resampling loop
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Comma-separated values before the event
    #[arg(long = "before", value_delimiter = ',', allow_negative_numbers = true, required = true)]
    pub before: Vec<f64>,

    /// Comma-separated values after the event
    #[arg(long = "after", value_delimiter = ',', allow_negative_numbers = true, required = true)]
    pub after: Vec<f64>,

    /// welch, student, mann-whitney, permutation or exact
    #[arg(long = "kind", default_value = "welch")]
    pub kind: TestKind,

    /// Significance level
    #[arg(long = "alpha", default_value = "0.05")]
    pub alpha: f64,

    /// Seed for the permutation test
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct CorrectArgs {
    /// Comma-separated p-values
    #[arg(long = "p-values", value_delimiter = ',', required = true)]
    pub p_values: Vec<f64>,

    /// bonferroni, holm or bh
    #[arg(long = "method", default_value = "bh")]
    pub method: CorrectionMethod,

    #[arg(long = "alpha", default_value = "0.05")]
    pub alpha: f64,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct PowerArgs {
    /// Standardized effect size (Cohen's d); ignored when solving for effect
    #[arg(long = "effect-size", allow_negative_numbers = true)]
    pub effect_size: Option<f64>,

    #[arg(long = "alpha", default_value = "0.05")]
    pub alpha: f64,

    /// Target power; ignored when solving for power
    #[arg(long = "power", default_value = "0.8")]
    pub power: f64,

    /// Per-group sample size; required unless solving for n
    #[arg(long = "n", value_name = "N")]
    pub n: Option<usize>,

    #[arg(long = "tails", default_value = "2", value_parser = parse_tails)]
    pub tails: Tails,

    #[arg(long = "solve-for", value_enum, default_value = "n")]
    pub solve_for: SolveTarget,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_report() {
        let cli = Cli::parse_from([
            "eventshift",
            "report",
            "--data",
            "data.json",
            "--event",
            "launch",
            "--fields",
            "nps,csat",
            "--seed",
            "7",
            "--format",
            "json",
        ]);
        let Command::Report(args) = cli.command else {
            panic!("expected report subcommand");
        };
        assert_eq!(args.event, "launch");
        assert_eq!(args.fields, vec!["nps", "csat"]);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.before_days, 30);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_parses_test_values() {
        let cli = Cli::parse_from([
            "eventshift",
            "--debug",
            "test",
            "--before",
            "0.8,0.75,-0.1",
            "--after",
            "0.6,0.62",
            "--kind",
            "mann-whitney",
        ]);
        assert!(cli.debug);
        let Command::Test(args) = cli.command else {
            panic!("expected test subcommand");
        };
        assert_eq!(args.before, vec![0.8, 0.75, -0.1]);
        assert_eq!(args.after.len(), 2);
        assert_eq!(args.kind, TestKind::MannWhitneyU);
    }

    #[test]
    fn test_cli_correct_defaults_to_bh() {
        let cli = Cli::parse_from(["eventshift", "correct", "--p-values", "0.01,0.2"]);
        let Command::Correct(args) = cli.command else {
            panic!("expected correct subcommand");
        };
        assert_eq!(args.method, CorrectionMethod::BenjaminiHochberg);
        assert_eq!(args.alpha, 0.05);
    }

    #[test]
    fn test_cli_power_options() {
        let cli = Cli::parse_from([
            "eventshift",
            "power",
            "--effect-size",
            "0.5",
            "--tails",
            "1",
            "--solve-for",
            "power",
            "--n",
            "64",
        ]);
        let Command::Power(args) = cli.command else {
            panic!("expected power subcommand");
        };
        assert_eq!(args.tails, Tails::One);
        assert_eq!(SolveFor::from(args.solve_for), SolveFor::Power);
        assert_eq!(args.n, Some(64));
    }

    #[test]
    fn test_cli_rejects_unknown_method() {
        assert!(Cli::try_parse_from([
            "eventshift",
            "correct",
            "--p-values",
            "0.01",
            "--method",
            "sidak"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["eventshift", "power", "--tails", "3"]).is_err());
    }
}
