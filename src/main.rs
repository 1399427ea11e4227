use anyhow::{Context, Result};
use clap::Parser;
use eventshift::cli::{Cli, Command, CorrectArgs, OutputFormat, PowerArgs, ReportArgs, TestArgs};
use eventshift::config::EngineConfig;
use eventshift::correction::{correct_for_multiple_comparisons, CorrectionResult};
use eventshift::hypothesis::{run_test, TestOptions, TestResult};
use eventshift::power::{analyze_power, PowerResult, PowerSpec, SolveFor};
use eventshift::provider::JsonFileProvider;
use eventshift::report::{ImpactEngine, ReportOptions};
use eventshift::sampling::Resampler;
use eventshift::window::{EntityScope, WindowSpec};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let provider = JsonFileProvider::from_path(&args.data)
        .with_context(|| format!("failed to load data file {}", args.data.display()))?;

    let fields = if args.fields.is_empty() {
        provider.fields()
    } else {
        args.fields
    };
    let scope = if args.entities.is_empty() {
        EntityScope::all()
    } else {
        EntityScope::entities(args.entities)
    };
    let options = ReportOptions {
        scope,
        window: WindowSpec::new(args.before_days, args.after_days),
        seed: args.seed,
        ..ReportOptions::for_fields(fields)
    };

    let engine = ImpactEngine::with_config(provider, config).context("invalid engine config")?;
    let report = engine
        .generate_comprehensive_report(&args.event, &options)
        .with_context(|| format!("failed to build report for event '{}'", args.event))?;

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json_string()?),
        OutputFormat::Text => print!("{}", report.to_report_string()),
    }
    Ok(())
}

fn print_test(result: &TestResult) {
    let verdict = if result.is_significant {
        "❌ SIGNIFICANT CHANGE"
    } else {
        "✅ NO SIGNIFICANT CHANGE"
    };
    println!("{} ({})", verdict, result.direction.as_str());
    println!("Test: {}", result.kind);
    if result.kind != result.requested_kind {
        println!("Requested: {}", result.requested_kind);
    }
    println!("Statistic: {:.4}", result.statistic);
    if let Some(df) = result.degrees_of_freedom {
        println!("Degrees of freedom: {:.2}", df);
    }
    println!("p-value: {:.6} (α = {})", result.p_value, result.alpha);
    println!("Effect size: {:.4}", result.effect_size);
    println!(
        "Means: {:.4} -> {:.4} (n = {}, {})",
        result.mean_before, result.mean_after, result.n_before, result.n_after
    );
    for warning in &result.warnings {
        println!("⚠️  {}", warning);
    }
}

fn run_hypothesis_test(args: TestArgs) -> Result<()> {
    let options = TestOptions {
        confidence_level: 1.0 - args.alpha,
        validate_assumptions: true,
        ..TestOptions::default()
    };
    options
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid --alpha")?;
    let mut resampler = Resampler::from_seed_or_entropy(args.seed);
    let result = run_test(&args.before, &args.after, args.kind, &options, &mut resampler);
    match args.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_test(&result),
    }
    Ok(())
}

fn print_correction(result: &CorrectionResult) {
    println!(
        "📊 {} correction (α = {}, per-test threshold {:.6})",
        result.method, result.alpha, result.corrected_alpha
    );
    for (i, (p, adjusted)) in result.p_values.iter().zip(&result.adjusted_p_values).enumerate() {
        let mark = if result.is_rejected(i) { "rejected" } else { "kept" };
        println!("  [{}] p={:.6} adjusted={:.6} {}", i, p, adjusted, mark);
    }
    println!(
        "Rejected {} of {}",
        result.rejected_count,
        result.p_values.len()
    );
}

fn run_correction(args: CorrectArgs) -> Result<()> {
    let result = correct_for_multiple_comparisons(&args.p_values, args.method, args.alpha)
        .context("correction failed")?;
    match args.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_correction(&result),
    }
    Ok(())
}

fn print_power(result: &PowerResult) {
    match result.solve_for {
        SolveFor::SampleSize => println!(
            "Required sample size: {} per group ({} total)",
            result.sample_size_per_group, result.total_sample_size
        ),
        SolveFor::Power => println!("Achieved power: {:.4}", result.power),
        SolveFor::EffectSize => println!("Minimum detectable effect: {:.4}", result.effect_size),
    }
    println!(
        "Effect size {:.4}, α = {}, power {:.4}, n = {} per group",
        result.effect_size, result.alpha, result.power, result.sample_size_per_group
    );
    println!("Interpretation: {}", result.interpretation);
    for warning in &result.warnings {
        println!("⚠️  {}", warning);
    }
}

fn run_power(args: PowerArgs) -> Result<()> {
    let spec = PowerSpec {
        effect_size: args.effect_size,
        alpha: args.alpha,
        power: Some(args.power),
        sample_size_per_group: args.n,
        tails: args.tails,
        solve_for: args.solve_for.into(),
    };
    let result = analyze_power(&spec).context("power analysis failed")?;
    match args.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_power(&result),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Report(args) => run_report(args),
        Command::Test(args) => run_hypothesis_test(args),
        Command::Correct(args) => run_correction(args),
        Command::Power(args) => run_power(args),
    }
}
