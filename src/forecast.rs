//! Per-cluster scoring loop, forecast-month arithmetic and CSV export

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use serde::Serialize;

use crate::data::SalesTable;
use crate::model::ClusterModel;

/// One store's next-month forecast
#[derive(Debug, Clone, Serialize)]
pub struct ForecastRow {
    pub store_id: i64,
    pub cluster: i64,
    pub last_month_sales: f64,
    pub forecast_month: NaiveDate,
    pub forecast_sales: f64,
}

/// A cluster that was skipped because its model artifact does not exist
#[derive(Debug, Clone)]
pub struct SkippedCluster {
    pub cluster: i64,
    pub path: PathBuf,
}

/// Result of one scoring run over the latest snapshot
#[derive(Debug)]
pub struct ForecastResult {
    /// Forecasts in cluster order, snapshot order within a cluster
    pub rows: Vec<ForecastRow>,
    /// Clusters without a model artifact; their stores receive no forecast
    pub skipped: Vec<SkippedCluster>,
    /// Month-end following the latest observed month
    pub forecast_month: NaiveDate,
}

/// Aggregate metrics over a forecast table
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSummary {
    pub total_last_month: f64,
    pub total_forecast: f64,
    /// `(forecast - current) / current * 100`
    pub delta_pct: f64,
    pub stores: usize,
}

impl ForecastResult {
    pub fn summary(&self) -> ForecastSummary {
        let total_last_month: f64 = self.rows.iter().map(|r| r.last_month_sales).sum();
        let total_forecast: f64 = self.rows.iter().map(|r| r.forecast_sales).sum();
        let delta_pct = (total_forecast - total_last_month) / total_last_month * 100.0;
        ForecastSummary {
            total_last_month,
            total_forecast,
            delta_pct,
            stores: self.rows.len(),
        }
    }
}

/// Score every cluster of the latest snapshot with its own model
///
/// Clusters are processed in ascending label order. A cluster whose artifact
/// file is missing is recorded in `skipped` and its stores are omitted from
/// the output; this is not an error. An empty result is left for the caller
/// to escalate, so both run modes can report it their own way.
pub fn score_latest(table: &SalesTable, models_dir: &Path) -> crate::Result<ForecastResult> {
    let forecast_month = next_month_end(table.data_month)?;

    let mut distinct: Vec<i64> = table.clusters.clone();
    distinct.sort_unstable();
    distinct.dedup();

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for &cluster in &distinct {
        let Some(model) = ClusterModel::load_for_cluster(models_dir, cluster)? else {
            skipped.push(SkippedCluster {
                cluster,
                path: ClusterModel::artifact_path(models_dir, cluster),
            });
            continue;
        };

        let members: Vec<usize> = (0..table.n_stores())
            .filter(|&i| table.clusters[i] == cluster)
            .collect();

        // Select the cluster's rows, columns in the model's stored schema order
        let indices = model.feature_indices(&table.feature_columns)?;
        let mut features = Array2::zeros((members.len(), indices.len()));
        for (r, &row) in members.iter().enumerate() {
            for (c, &col) in indices.iter().enumerate() {
                features[[r, c]] = table.features[[row, col]];
            }
        }
        let predictions = model.predict(&features)?;

        for (&row, &forecast_sales) in members.iter().zip(predictions.iter()) {
            rows.push(ForecastRow {
                store_id: table.store_ids[row],
                cluster,
                last_month_sales: table.sales[row],
                forecast_month,
                forecast_sales,
            });
        }
    }

    Ok(ForecastResult {
        rows,
        skipped,
        forecast_month,
    })
}

/// Last day of the month following `date`'s month
pub fn next_month_end(date: NaiveDate) -> crate::Result<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .ok_or_else(|| anyhow!("Date out of range when computing the forecast month for {date}"))
}

/// Write the canonical forecast CSV
/// (`store_id,cluster,last_month_sales,forecast_month,forecast_sales`)
pub fn write_forecast_csv(rows: &[ForecastRow], path: &Path) -> crate::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the forecast CSV with display column names, as offered for download
pub fn write_display_csv(rows: &[ForecastRow], path: &Path) -> crate::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    writer.write_record(["store_id", "cluster", "Last Month Sales", "Forecasted Sales"])?;
    for row in rows {
        writer.write_record([
            row.store_id.to_string(),
            row.cluster.to_string(),
            row.last_month_sales.to_string(),
            row.forecast_sales.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegressionTree, TreeNode};
    use ndarray::array;
    use polars::prelude::*;
    use tempfile::tempdir;

    fn snapshot_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    }

    /// Stores 1 and 2 in cluster 0, store 3 in cluster 1
    fn test_table() -> SalesTable {
        let latest = DataFrame::new(vec![
            Series::new("store_id", &[1i64, 2, 3]),
            Series::new("date", &["2024-02-29", "2024-02-29", "2024-02-29"]),
            Series::new("sales", &[1100.0, 1500.0, 950.0]),
            Series::new("cluster", &[0i64, 0, 1]),
            Series::new("footfall", &[650.0, 820.0, 410.0]),
        ])
        .unwrap();

        SalesTable {
            history: latest.clone(),
            latest,
            store_ids: vec![1, 2, 3],
            clusters: vec![0, 0, 1],
            sales: vec![1100.0, 1500.0, 950.0],
            dates: vec![snapshot_date(); 3],
            features: array![[1.0, 650.0], [2.0, 820.0], [3.0, 410.0]],
            feature_columns: vec!["store_id".to_string(), "footfall".to_string()],
            data_month: snapshot_date(),
        }
    }

    fn constant_model(cluster: i64, value: f64) -> ClusterModel {
        ClusterModel {
            cluster,
            feature_columns: vec!["store_id".to_string(), "footfall".to_string()],
            base_score: 0.0,
            trees: vec![RegressionTree {
                nodes: vec![TreeNode::Leaf { value }],
            }],
        }
    }

    #[test]
    fn test_missing_model_skips_cluster_without_error() {
        let dir = tempdir().unwrap();
        let model = constant_model(0, 1200.0);
        model
            .save(&ClusterModel::artifact_path(dir.path(), 0))
            .unwrap();

        let result = score_latest(&test_table(), dir.path()).unwrap();

        // Stores 1 and 2 are forecast, store 3's cluster has no artifact
        let stores: Vec<i64> = result.rows.iter().map(|r| r.store_id).collect();
        assert_eq!(stores, vec![1, 2]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].cluster, 1);
        assert!(result.skipped[0]
            .path
            .ends_with("xgb_cluster_1.json"));
    }

    #[test]
    fn test_no_models_yields_empty_rows_not_error() {
        let dir = tempdir().unwrap();
        let result = score_latest(&test_table(), dir.path()).unwrap();

        assert!(result.rows.is_empty());
        assert_eq!(result.skipped.len(), 2);
        assert_eq!(result.forecast_month, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_rows_follow_cluster_then_snapshot_order() {
        let dir = tempdir().unwrap();
        constant_model(0, 1200.0)
            .save(&ClusterModel::artifact_path(dir.path(), 0))
            .unwrap();
        constant_model(1, 800.0)
            .save(&ClusterModel::artifact_path(dir.path(), 1))
            .unwrap();

        let result = score_latest(&test_table(), dir.path()).unwrap();

        let stores: Vec<i64> = result.rows.iter().map(|r| r.store_id).collect();
        assert_eq!(stores, vec![1, 2, 3]);
        assert_eq!(result.rows[0].forecast_sales, 1200.0);
        assert_eq!(result.rows[2].forecast_sales, 800.0);
        assert!(result.skipped.is_empty());
        assert!(result
            .rows
            .iter()
            .all(|r| r.forecast_month == result.forecast_month));
    }

    #[test]
    fn test_schema_mismatch_is_an_error() {
        let dir = tempdir().unwrap();
        let mut model = constant_model(0, 1200.0);
        model.feature_columns = vec!["holiday_flag".to_string()];
        model
            .save(&ClusterModel::artifact_path(dir.path(), 0))
            .unwrap();

        let err = score_latest(&test_table(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("holiday_flag"));
    }

    #[test]
    fn test_summary_delta_formula() {
        let dir = tempdir().unwrap();
        constant_model(0, 1300.0)
            .save(&ClusterModel::artifact_path(dir.path(), 0))
            .unwrap();
        constant_model(1, 1045.0)
            .save(&ClusterModel::artifact_path(dir.path(), 1))
            .unwrap();

        let summary = score_latest(&test_table(), dir.path()).unwrap().summary();

        assert_eq!(summary.stores, 3);
        assert_eq!(summary.total_last_month, 3550.0);
        assert_eq!(summary.total_forecast, 3645.0);
        let expected = (3645.0 - 3550.0) / 3550.0 * 100.0;
        assert!((summary.delta_pct - expected).abs() < 1e-12);
    }

    #[test]
    fn test_next_month_end() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        // Mid-month dates still roll to the following month's end
        assert_eq!(next_month_end(d(2024, 1, 15)).unwrap(), d(2024, 2, 29));
        assert_eq!(next_month_end(d(2024, 1, 31)).unwrap(), d(2024, 2, 29));
        assert_eq!(next_month_end(d(2023, 1, 31)).unwrap(), d(2023, 2, 28));
        assert_eq!(next_month_end(d(2024, 2, 29)).unwrap(), d(2024, 3, 31));
        // December rolls into the next year
        assert_eq!(next_month_end(d(2024, 12, 31)).unwrap(), d(2025, 1, 31));
        assert_eq!(next_month_end(d(2024, 11, 30)).unwrap(), d(2024, 12, 31));
    }

    #[test]
    fn test_write_forecast_csv() {
        let dir = tempdir().unwrap();
        let rows = vec![ForecastRow {
            store_id: 1,
            cluster: 0,
            last_month_sales: 1100.0,
            forecast_month: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            forecast_sales: 1200.5,
        }];
        let path = dir.path().join("out.csv");
        write_forecast_csv(&rows, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "store_id,cluster,last_month_sales,forecast_month,forecast_sales"
        );
        assert_eq!(lines.next().unwrap(), "1,0,1100.0,2024-03-31,1200.5");
    }

    #[test]
    fn test_write_display_csv() {
        let dir = tempdir().unwrap();
        let rows = vec![ForecastRow {
            store_id: 1,
            cluster: 0,
            last_month_sales: 1100.0,
            forecast_month: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            forecast_sales: 1200.5,
        }];
        let path = dir.path().join("display.csv");
        write_display_csv(&rows, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "store_id,cluster,Last Month Sales,Forecasted Sales"
        );
        assert_eq!(lines.next().unwrap(), "1,0,1100,1200.5");
    }
}
