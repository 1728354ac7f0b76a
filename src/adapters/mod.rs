// 儲存層實作：依資料庫 URL 的 scheme 選擇 PostgreSQL 或 SQLite

#[cfg(feature = "database-postgres")]
pub mod postgres;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

use crate::config::DatabaseConfig;
use crate::domain::ports::{Projection, QuoteFilter, QuoteQuery, QuoteStore};
use crate::utils::error::{BatchError, Result};
use crate::utils::validation::redact;
use std::sync::Arc;

pub(crate) const FULL_COLUMNS: &str = "id, quote_id, basic_quote_id, customer_name, \
     customer_email, customer_phone, request_text, created_time, opt_in";

/// 產生分頁查詢；`placeholder(n)` 產生第 n 個 (1 起算) 參數的佔位符
///
/// 參數綁定順序：篩選條件的參數、`after`、`limit`。
pub(crate) fn select_page_sql(query: &QuoteQuery, placeholder: fn(usize) -> String) -> String {
    let columns = match query.projection {
        Projection::Full => FULL_COLUMNS,
        Projection::KeyOnly => "id",
    };
    let (condition, used) = match query.filter {
        QuoteFilter::CreatedBetween { .. } => (
            format!(
                "created_time BETWEEN {} AND {} AND opt_in = {}",
                placeholder(1),
                placeholder(2),
                placeholder(3)
            ),
            3,
        ),
        QuoteFilter::CreatedBefore { .. } => (format!("created_time < {}", placeholder(1)), 1),
    };

    format!(
        "SELECT {} FROM quote WHERE {} AND id > {} ORDER BY id ASC LIMIT {}",
        columns,
        condition,
        placeholder(used + 1),
        placeholder(used + 2)
    )
}

/// 依 URL 建立對應的儲存層
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn QuoteStore>> {
    let scheme = config.url.split(':').next().unwrap_or_default();
    tracing::info!("🔌 Connecting to {}", redact(&config.url));

    match scheme {
        #[cfg(feature = "database-postgres")]
        "postgres" | "postgresql" => {
            let store = postgres::PgQuoteStore::connect(&config.url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "database-sqlite")]
        "sqlite" => {
            let store =
                sqlite::SqliteQuoteStore::connect(&config.url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        other => Err(BatchError::InvalidConfigValueError {
            field: "database.url".to_string(),
            value: redact(&config.url),
            reason: format!("Database backend '{}' is not supported by this build", other),
        }),
    }
}
