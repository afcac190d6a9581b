//! Chart rendering with Plotters and console reporting

use plotters::prelude::*;

use crate::data::SalesTable;
use crate::forecast::{ForecastResult, ForecastRow};

const LAST_MONTH_COLOR: RGBColor = BLUE;
const FORECAST_COLOR: RGBColor = GREEN;

/// Render a grouped bar chart of last-month vs forecast sales per store
///
/// # Arguments
/// * `rows` - Forecast rows in output order
/// * `output_path` - Path to save the PNG chart
/// * `max_stores` - Truncate the chart to the first N stores for readability
pub fn create_forecast_chart(
    rows: &[ForecastRow],
    output_path: &str,
    max_stores: usize,
) -> crate::Result<()> {
    if rows.is_empty() {
        anyhow::bail!("No forecast rows to chart");
    }
    let shown = &rows[..rows.len().min(max_stores)];

    let max_sales = shown
        .iter()
        .map(|r| r.last_month_sales.max(r.forecast_sales))
        .fold(0.0f64, f64::max);
    let y_max = (max_sales * 1.1).max(1.0);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Store Performance Overview", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..shown.len() as f64, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Store (first rows of the forecast table)")
        .y_desc("Sales")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart
        .draw_series(shown.iter().enumerate().map(|(i, row)| {
            Rectangle::new(
                [(i as f64 + 0.10, 0.0), (i as f64 + 0.45, row.last_month_sales)],
                LAST_MONTH_COLOR.filled(),
            )
        }))?
        .label("Last Month Sales")
        .legend(|(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], LAST_MONTH_COLOR.filled()));

    chart
        .draw_series(shown.iter().enumerate().map(|(i, row)| {
            Rectangle::new(
                [(i as f64 + 0.55, 0.0), (i as f64 + 0.90, row.forecast_sales)],
                FORECAST_COLOR.filled(),
            )
        }))?
        .label("Forecasted Sales")
        .legend(|(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], FORECAST_COLOR.filled()));

    chart.configure_series_labels().draw()?;

    root.present()?;
    println!("Forecast chart saved to: {}", output_path);

    Ok(())
}

/// Print a preview of the latest-snapshot table
pub fn print_data_preview(table: &SalesTable) {
    println!("\n=== Input Data (Latest Month) ===");
    println!("{}", table.latest.head(Some(5)));
    println!(
        "Total stores: {} | Data month: {}",
        table.n_stores(),
        table.data_month
    );
}

/// Print the KPI block for a completed forecast run
pub fn print_forecast_report(result: &ForecastResult) {
    let summary = result.summary();

    println!("\n=== Forecast Summary ===");
    println!("Target month: {}", result.forecast_month.format("%B %Y"));
    println!(
        "Total forecast revenue: ${:.0} ({:+.2}%)",
        summary.total_forecast, summary.delta_pct
    );
    println!("Total last-month revenue: ${:.0}", summary.total_last_month);
    println!("Stores analyzed: {}", summary.stores);
}
