//! Revenue report over the loaded order tables.
//!
//! Revenue is the sum of item prices; freight is reported separately.

use std::fmt::Write as _;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Warehouse;
use crate::error::{ReportError, ReportResult};

/// Default number of categories in the report.
pub const DEFAULT_TOP_CATEGORIES: usize = 10;

const SUMMARY_SQL: &str = "\
SELECT COALESCE(SUM(price::float8), 0)::float8         AS revenue,
       COALESCE(SUM(freight_value::float8), 0)::float8 AS freight,
       COUNT(DISTINCT order_id)                        AS orders
FROM   fact_order_items";

const MONTHLY_SQL: &str = "\
SELECT   to_char(o.order_purchase_timestamp::text::timestamp, 'YYYY-MM') AS month,
         COALESCE(SUM(oi.price::float8), 0)::float8                     AS revenue,
         COUNT(DISTINCT oi.order_id)                                     AS orders
FROM     fact_order_items oi
JOIN     fact_orders      o ON o.order_id = oi.order_id
WHERE    o.order_purchase_timestamp IS NOT NULL
GROUP BY 1
ORDER BY 1";

const CATEGORY_SQL: &str = "\
SELECT   COALESCE(p.product_category_name::text, 'unknown') AS category,
         COALESCE(SUM(oi.price::float8), 0)::float8         AS revenue,
         COUNT(*)                                           AS items
FROM     fact_order_items oi
LEFT JOIN dim_products    p ON p.product_id = oi.product_id
GROUP BY 1
ORDER BY 2 DESC, 1
LIMIT    $1";

const STATE_SQL: &str = "\
SELECT   c.customer_state::text        AS state,
         COALESCE(SUM(oi.price::float8), 0)::float8 AS revenue,
         COUNT(DISTINCT o.order_id)    AS orders
FROM     fact_order_items oi
JOIN     fact_orders      o ON o.order_id    = oi.order_id
JOIN     dim_customers    c ON c.customer_id = o.customer_id
GROUP BY 1
ORDER BY 2 DESC, 1";

/// Produces the revenue report.
#[async_trait]
pub trait Report: Send + Sync {
    async fn report(&self) -> ReportResult<RevenueReport>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: f64,
    pub orders: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: f64,
    pub items: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRevenue {
    pub state: String,
    pub revenue: f64,
    pub orders: i64,
}

/// Revenue summary for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    pub generated_at: DateTime<Utc>,
    pub total_revenue: f64,
    pub total_freight: f64,
    pub orders: i64,
    pub monthly: Vec<MonthlyRevenue>,
    pub top_categories: Vec<CategoryRevenue>,
    pub by_state: Vec<StateRevenue>,
}

impl RevenueReport {
    /// Revenue per order; zero when there are no orders.
    pub fn average_order_value(&self) -> f64 {
        if self.orders == 0 {
            0.0
        } else {
            self.total_revenue / self.orders as f64
        }
    }

    /// Plain-text rendering for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Revenue report ({})", self.generated_at.format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(out, "  Revenue:              {:>14.2}", self.total_revenue);
        let _ = writeln!(out, "  Freight:              {:>14.2}", self.total_freight);
        let _ = writeln!(out, "  Orders:               {:>14}", self.orders);
        let _ = writeln!(out, "  Average order value:  {:>14.2}", self.average_order_value());

        if !self.monthly.is_empty() {
            let _ = writeln!(out, "\n  Month      {:>14}  {:>8}", "revenue", "orders");
            for m in &self.monthly {
                let _ = writeln!(out, "  {:<9}  {:>14.2}  {:>8}", m.month, m.revenue, m.orders);
            }
        }

        if !self.top_categories.is_empty() {
            let _ = writeln!(out, "\n  {:<40} {:>14}  {:>8}", "Category", "revenue", "items");
            for c in &self.top_categories {
                let _ = writeln!(out, "  {:<40} {:>14.2}  {:>8}", c.category, c.revenue, c.items);
            }
        }

        if !self.by_state.is_empty() {
            let _ = writeln!(out, "\n  State  {:>14}  {:>8}", "revenue", "orders");
            for s in &self.by_state {
                let _ = writeln!(out, "  {:<5}  {:>14.2}  {:>8}", s.state, s.revenue, s.orders);
            }
        }

        out
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> ReportResult<()> {
        let output_error = |message: String| ReportError::Output {
            path: path.to_path_buf(),
            message,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| output_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| output_error(e.to_string()))
    }
}

/// Builds the report from the warehouse tables.
#[derive(Debug, Clone)]
pub struct RevenueReporter {
    warehouse: Warehouse,
    top_categories: usize,
}

impl RevenueReporter {
    pub fn new(warehouse: Warehouse) -> Self {
        Self {
            warehouse,
            top_categories: DEFAULT_TOP_CATEGORIES,
        }
    }

    pub fn with_top_categories(mut self, n: usize) -> Self {
        self.top_categories = n;
        self
    }
}

#[async_trait]
impl Report for RevenueReporter {
    async fn report(&self) -> ReportResult<RevenueReport> {
        let session = self.warehouse.connect().await?;
        let failed = |query: &'static str| move |source| ReportError::Query { query, source };

        let summary = session
            .query_one(SUMMARY_SQL, &[])
            .await
            .map_err(failed("summary"))?;

        let monthly = session
            .query(MONTHLY_SQL, &[])
            .await
            .map_err(failed("monthly"))?
            .iter()
            .map(|row| {
                Ok(MonthlyRevenue {
                    month: row.try_get("month")?,
                    revenue: row.try_get("revenue")?,
                    orders: row.try_get("orders")?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(failed("monthly"))?;

        let limit = self.top_categories as i64;
        let top_categories = session
            .query(CATEGORY_SQL, &[&limit])
            .await
            .map_err(failed("categories"))?
            .iter()
            .map(|row| {
                Ok(CategoryRevenue {
                    category: row.try_get("category")?,
                    revenue: row.try_get("revenue")?,
                    items: row.try_get("items")?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(failed("categories"))?;

        let by_state = session
            .query(STATE_SQL, &[])
            .await
            .map_err(failed("states"))?
            .iter()
            .map(|row| {
                let state: Option<String> = row.try_get("state")?;
                Ok(StateRevenue {
                    state: state.unwrap_or_else(|| "unknown".to_string()),
                    revenue: row.try_get("revenue")?,
                    orders: row.try_get("orders")?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(failed("states"))?;

        Ok(RevenueReport {
            generated_at: Utc::now(),
            total_revenue: summary.try_get("revenue").map_err(failed("summary"))?,
            total_freight: summary.try_get("freight").map_err(failed("summary"))?,
            orders: summary.try_get("orders").map_err(failed("summary"))?,
            monthly,
            top_categories,
            by_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> RevenueReport {
        RevenueReport {
            generated_at: Utc::now(),
            total_revenue: 300.0,
            total_freight: 45.5,
            orders: 4,
            monthly: vec![MonthlyRevenue {
                month: "2017-10".into(),
                revenue: 300.0,
                orders: 4,
            }],
            top_categories: vec![CategoryRevenue {
                category: "cama_mesa_banho".into(),
                revenue: 200.0,
                items: 3,
            }],
            by_state: vec![StateRevenue {
                state: "SP".into(),
                revenue: 300.0,
                orders: 4,
            }],
        }
    }

    #[test]
    fn test_average_order_value() {
        let report = sample();
        assert!((report.average_order_value() - 75.0).abs() < f64::EPSILON);

        let empty = RevenueReport {
            orders: 0,
            total_revenue: 0.0,
            ..sample()
        };
        assert_eq!(empty.average_order_value(), 0.0);
    }

    #[test]
    fn test_render_contains_sections() {
        let text = sample().render();
        assert!(text.contains("300.00"));
        assert!(text.contains("2017-10"));
        assert!(text.contains("cama_mesa_banho"));
        assert!(text.contains("SP"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample();
        report.write_json(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let back: RevenueReport = serde_json::from_str(&content).unwrap();
        assert_eq!(back.orders, 4);
        assert!(content.contains("topCategories"));
    }

    #[test]
    fn test_write_json_bad_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        let err = sample().write_json(&path).unwrap_err();
        assert!(matches!(err, ReportError::Output { .. }));
    }
}
