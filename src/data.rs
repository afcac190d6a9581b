//! Feature CSV loading and latest-snapshot selection using Polars

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::Array2;
use polars::prelude::*;

/// Columns every feature CSV must carry; everything else is treated as a feature
const REQUIRED_COLUMNS: [&str; 4] = ["store_id", "date", "sales", "cluster"];

/// Loaded feature table plus the derived latest-row-per-store snapshot
///
/// The snapshot vectors (`store_ids`, `clusters`, `sales`, `dates`, `features`)
/// are all aligned row-for-row with `latest`.
#[derive(Debug)]
pub struct SalesTable {
    /// Full history, stably sorted by (store_id, date)
    pub history: DataFrame,
    /// The most recent dated row per store, sorted by store id
    pub latest: DataFrame,
    /// Store ids of the snapshot rows
    pub store_ids: Vec<i64>,
    /// Cluster labels of the snapshot rows
    pub clusters: Vec<i64>,
    /// Last observed sales of the snapshot rows
    pub sales: Vec<f64>,
    /// Snapshot dates (the maximum date per store)
    pub dates: Vec<NaiveDate>,
    /// Feature values of the snapshot rows, columns in `feature_columns` order
    pub features: Array2<f64>,
    /// Every input column except `sales`, `date` and `cluster`, in input order
    pub feature_columns: Vec<String>,
    /// Maximum date observed anywhere in the input
    pub data_month: NaiveDate,
}

impl SalesTable {
    /// Number of stores in the snapshot
    pub fn n_stores(&self) -> usize {
        self.store_ids.len()
    }
}

/// Load the feature CSV and derive the latest-snapshot table
///
/// # Arguments
/// * `path` - Path to the features CSV produced by the clustering pipeline
///
/// # Returns
/// * `SalesTable` with the sorted history and one latest row per store
pub fn load_sales_data(path: impl AsRef<Path>) -> crate::Result<SalesTable> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Data file not found at: {}", path.display());
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open data file: {}", path.display()))?;
    let df = CsvReader::new(file)
        .infer_schema(None)
        .has_header(true)
        .finish()
        .with_context(|| format!("Failed to read CSV: {}", path.display()))?;

    if df.height() == 0 {
        anyhow::bail!("No rows found in: {}", path.display());
    }

    for required in REQUIRED_COLUMNS {
        if !df.get_column_names().contains(&required) {
            anyhow::bail!(
                "Missing required column '{}' in: {}",
                required,
                path.display()
            );
        }
    }

    let store_ids = int_column(&df, "store_id")?;
    let dates = date_column(&df, "date")?;

    // Stable sort by (store_id, date); ties keep original row order
    let mut order: Vec<u32> = (0..df.height() as u32).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        store_ids[a]
            .cmp(&store_ids[b])
            .then(dates[a].cmp(&dates[b]))
    });
    let history = df.take(&IdxCa::from_vec("idx", order.clone()))?;

    // The last row of each store's sorted run is its latest snapshot
    let sorted_stores: Vec<i64> = order.iter().map(|&i| store_ids[i as usize]).collect();
    let mut latest_pos: Vec<u32> = Vec::new();
    for i in 0..sorted_stores.len() {
        if i + 1 == sorted_stores.len() || sorted_stores[i] != sorted_stores[i + 1] {
            latest_pos.push(i as u32);
        }
    }
    let latest = history.take(&IdxCa::from_vec("idx", latest_pos.clone()))?;

    let snapshot_dates: Vec<NaiveDate> = latest_pos
        .iter()
        .map(|&i| dates[order[i as usize] as usize])
        .collect();
    let data_month = snapshot_dates
        .iter()
        .max()
        .copied()
        .context("Snapshot is empty")?;

    let feature_columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| !["sales", "date", "cluster"].contains(name))
        .map(|name| name.to_string())
        .collect();

    let n_stores = latest.height();
    let mut features = Array2::zeros((n_stores, feature_columns.len()));
    for (j, name) in feature_columns.iter().enumerate() {
        let values = numeric_column(&latest, name)?;
        for (i, value) in values.into_iter().enumerate() {
            features[[i, j]] = value;
        }
    }

    let snapshot_stores = int_column(&latest, "store_id")?;
    let snapshot_clusters = int_column(&latest, "cluster")?;
    let snapshot_sales = numeric_column(&latest, "sales")?;

    Ok(SalesTable {
        history,
        latest,
        store_ids: snapshot_stores,
        clusters: snapshot_clusters,
        sales: snapshot_sales,
        dates: snapshot_dates,
        features,
        feature_columns,
        data_month,
    })
}

/// Memoized accessor around [`load_sales_data`], keyed on path and mtime
///
/// Re-reads the CSV only when the file's modification time changes.
#[derive(Debug)]
pub struct CachedLoader {
    path: PathBuf,
    cached: Option<(SystemTime, SalesTable)>,
}

impl CachedLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    /// Load the table, reusing the cached copy until the file changes on disk
    pub fn load(&mut self) -> crate::Result<&SalesTable> {
        if !self.path.exists() {
            anyhow::bail!("Data file not found at: {}", self.path.display());
        }
        let modified = fs::metadata(&self.path)?.modified()?;
        if self.cached.as_ref().map(|(stamp, _)| *stamp) != Some(modified) {
            let table = load_sales_data(&self.path)?;
            self.cached = Some((modified, table));
        }
        let (_, table) = self
            .cached
            .as_ref()
            .ok_or_else(|| anyhow!("data cache unexpectedly empty"))?;
        Ok(table)
    }
}

fn int_column(df: &DataFrame, name: &str) -> crate::Result<Vec<i64>> {
    let series = df
        .column(name)?
        .cast(&DataType::Int64)
        .with_context(|| format!("Column '{name}' is not integer-valued"))?;
    let ca = series.i64()?;
    ca.into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| anyhow!("Column '{name}' has a missing value at row {row}"))
        })
        .collect()
}

fn numeric_column(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    let series = df
        .column(name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{name}' is not numeric"))?;
    let ca = series.f64()?;
    ca.into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                anyhow!("Column '{name}' has a non-numeric or missing value at row {row}")
            })
        })
        .collect()
}

fn date_column(df: &DataFrame, name: &str) -> crate::Result<Vec<NaiveDate>> {
    let series = df.column(name)?;
    let ca = series
        .utf8()
        .map_err(|_| anyhow!("Column '{name}' must contain date strings"))?;
    ca.into_iter()
        .enumerate()
        .map(|(row, value)| {
            let raw = value
                .ok_or_else(|| anyhow!("Column '{name}' has a missing value at row {row}"))?;
            parse_date(raw)
                .ok_or_else(|| anyhow!("Unparseable date '{raw}' in column '{name}' at row {row}"))
        })
        .collect()
}

/// Parse a date cell, accepting plain dates and common datetime renderings
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .ok()
}
