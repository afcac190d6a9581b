//! Storecast: cluster-wise next-month sales forecasting over pre-trained models
//!
//! This library loads a CSV of per-store feature rows, selects each store's most
//! recent month, scores it with the matching cluster's regression artifact, and
//! renders/exports the resulting next-month forecast.

pub mod cli;
pub mod data;
pub mod forecast;
pub mod model;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_sales_data, CachedLoader, SalesTable};
pub use forecast::{
    next_month_end, score_latest, write_display_csv, write_forecast_csv, ForecastResult,
    ForecastRow,
};
pub use model::ClusterModel;
pub use viz::{create_forecast_chart, print_data_preview, print_forecast_report};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
