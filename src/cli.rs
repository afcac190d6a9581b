//! Command-line interface definitions and argument parsing

use clap::Parser;

/// Next-month sales forecasting CLI dispatching to per-cluster regression models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the features CSV produced by the clustering pipeline
    #[arg(short, long, default_value = "data/processed/features_with_clusters.csv")]
    pub input: String,

    /// Directory holding the per-cluster model artifacts
    #[arg(short, long, default_value = "models")]
    pub models_dir: String,

    /// Output path for the forecast CSV
    #[arg(short, long, default_value = "next_month_forecast.csv")]
    pub output: String,

    /// Output path for the store performance chart
    #[arg(short, long, default_value = "forecast_chart.png")]
    pub chart: String,

    /// Maximum number of stores shown in the chart
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Batch mode: write the canonical forecast CSV and skip the chart
    #[arg(short, long)]
    pub batch: bool,

    /// Skip chart generation
    #[arg(long)]
    pub no_chart: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Check argument combinations that clap cannot express on its own
    pub fn validate(&self) -> crate::Result<()> {
        if self.top == 0 {
            anyhow::bail!("--top must be at least 1");
        }
        Ok(())
    }
}
