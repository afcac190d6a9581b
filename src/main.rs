//! Storecast: next-month store sales forecasting over pre-trained cluster models
//!
//! This is the main entrypoint that orchestrates data loading, per-cluster
//! scoring, reporting and export.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::time::Instant;
use storecast::{forecast, viz, Args, CachedLoader};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    args.validate()?;

    if args.verbose {
        println!("Storecast - Cluster-wise Next-Month Sales Forecasting");
        println!("=====================================================\n");
    }

    if args.batch {
        run_batch(&args)
    } else {
        run_dashboard(&args)
    }
}

/// Interactive-style run: preview, KPIs, chart and a display-named CSV
fn run_dashboard(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    if args.verbose {
        println!("Loading historical data from: {}", args.input);
    }
    let mut loader = CachedLoader::new(&args.input);
    let table = loader.load()?;

    viz::print_data_preview(table);

    println!("\nGenerating forecast...");
    let result = forecast::score_latest(table, Path::new(&args.models_dir))?;
    for skip in &result.skipped {
        println!("⚠ Model for cluster {} not found. Skipping.", skip.cluster);
    }
    if result.rows.is_empty() {
        anyhow::bail!("No forecasts were generated. Please check model files.");
    }
    println!("✓ Forecast generated successfully");

    viz::print_forecast_report(&result);

    if !args.no_chart {
        viz::create_forecast_chart(&result.rows, &args.chart, args.top)?;
    }

    forecast::write_display_csv(&result.rows, Path::new(&args.output))?;
    println!("Forecast table saved to: {}", args.output);

    if args.verbose {
        println!(
            "\nTotal processing time: {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

/// Batch run: canonical CSV for downstream consumers, no chart
fn run_batch(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    let mut loader = CachedLoader::new(&args.input);
    let table = loader.load()?;

    if args.verbose {
        println!(
            "Loaded {} stores from {} history rows",
            table.n_stores(),
            table.history.height()
        );
        println!("Using features: {:?}", table.feature_columns);
    }

    let result = forecast::score_latest(table, Path::new(&args.models_dir))?;
    for skip in &result.skipped {
        println!("⚠ Model file not found for cluster {}, skipping.", skip.cluster);
    }
    if result.rows.is_empty() {
        anyhow::bail!("No forecasts were generated. Check cluster assignments and models.");
    }

    forecast::write_forecast_csv(&result.rows, Path::new(&args.output))?;

    let summary = result.summary();
    println!(
        "✓ Saved next-month cluster-wise forecast for {} stores to {}",
        summary.stores, args.output
    );
    if args.verbose {
        println!(
            "  Target month: {} | Total forecast: {:.2} ({:+.2}%)",
            result.forecast_month, summary.total_forecast, summary.delta_pct
        );
        println!(
            "  Processing time: {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
