use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, Transaction};

use super::{BatchTransaction, PersistenceGateway};
use crate::config::DatabaseConfig;
use crate::models::{
    generate_id, Notification, PriceObservation, PriceUpdate, Subscription, TrackedListing,
    UnavailableReason,
};
use crate::utils::error::{AppError, Result};

const LISTING_COLUMNS: &str = "id, url, source, title, image_url, current_price, \
     lowest_price_ever, highest_price_ever, last_checked";

#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open the pool and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database ready at {}", config.url);

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_listing(&self, listing: &TrackedListing) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO listings ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            LISTING_COLUMNS
        ))
        .bind(&listing.id)
        .bind(&listing.url)
        .bind(&listing.source)
        .bind(&listing.title)
        .bind(&listing.image_url)
        .bind(listing.current_price.to_string())
        .bind(listing.lowest_price_ever.to_string())
        .bind(listing.highest_price_ever.to_string())
        .bind(listing.last_checked)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn subscribe(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (user_id, listing_id, notify, lower_threshold, upper_threshold) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&subscription.user_id)
        .bind(&subscription.listing_id)
        .bind(subscription.notify)
        .bind(subscription.lower_threshold.map(|d| d.to_string()))
        .bind(subscription.upper_threshold.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn listing(&self, id: &str) -> Result<Option<TrackedListing>> {
        let listing = sqlx::query_as::<_, TrackedListing>(&format!(
            "SELECT {} FROM listings WHERE id = ?",
            LISTING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(listing)
    }

    pub async fn observations_for(&self, listing_id: &str) -> Result<Vec<PriceObservation>> {
        let rows = sqlx::query_as::<_, PriceObservation>(
            "SELECT id, listing_id, price, timestamp FROM price_history \
             WHERE listing_id = ? ORDER BY timestamp, rowid",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn subscriptions_for(&self, listing_id: &str) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, Subscription>(
            "SELECT user_id, listing_id, notify, lower_threshold, upper_threshold \
             FROM subscriptions WHERE listing_id = ?",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, message, is_read, created_at FROM notifications \
             WHERE user_id = ? ORDER BY created_at, rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn list_tracked_listings(&self) -> Result<Vec<TrackedListing>> {
        let listings = sqlx::query_as::<_, TrackedListing>(&format!(
            "SELECT {} FROM listings ORDER BY rowid",
            LISTING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(listings)
    }

    async fn begin(&self) -> Result<Box<dyn BatchTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl BatchTransaction for SqliteTransaction {
    async fn apply_price_update(&mut self, update: &PriceUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET title = ?, image_url = ?, current_price = ?, \
             lowest_price_ever = ?, highest_price_ever = ?, last_checked = ? WHERE id = ?",
        )
        .bind(&update.title)
        .bind(&update.image_url)
        .bind(update.price.to_string())
        .bind(update.lowest_price_ever.to_string())
        .bind(update.highest_price_ever.to_string())
        .bind(update.checked_at)
        .bind(&update.listing_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("listing {}", update.listing_id),
            });
        }

        let observation = PriceObservation::from(update);
        sqlx::query("INSERT INTO price_history (id, listing_id, price, timestamp) VALUES (?, ?, ?, ?)")
            .bind(&observation.id)
            .bind(&observation.listing_id)
            .bind(observation.price.to_string())
            .bind(observation.timestamp)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn subscribers(&mut self, listing_id: &str) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, Subscription>(
            "SELECT user_id, listing_id, notify, lower_threshold, upper_threshold \
             FROM subscriptions WHERE listing_id = ?",
        )
        .bind(listing_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn notify(&mut self, user_id: &str, message: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, message, is_read, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(generate_id())
        .bind(user_id)
        .bind(message)
        .bind(chrono::Utc::now())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn apply_unavailable(&mut self, listing_id: &str, reason: UnavailableReason) -> Result<()> {
        sqlx::query("DELETE FROM price_history WHERE listing_id = ?")
            .bind(listing_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM subscriptions WHERE listing_id = ?")
            .bind(listing_id)
            .execute(&mut *self.tx)
            .await?;
        let result = sqlx::query("DELETE FROM listings WHERE id = ?")
            .bind(listing_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("listing {}", listing_id),
            });
        }

        tracing::debug!("Deleted listing {} ({})", listing_id, reason);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn decimal_column(row: &SqliteRow, column: &str) -> std::result::Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn optional_decimal_column(
    row: &SqliteRow,
    column: &str,
) -> std::result::Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Decimal::from_str(&value).map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

impl<'r> FromRow<'r, SqliteRow> for TrackedListing {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            source: row.try_get("source")?,
            title: row.try_get("title")?,
            image_url: row.try_get("image_url")?,
            current_price: decimal_column(row, "current_price")?,
            lowest_price_ever: decimal_column(row, "lowest_price_ever")?,
            highest_price_ever: decimal_column(row, "highest_price_ever")?,
            last_checked: row.try_get("last_checked")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for PriceObservation {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            listing_id: row.try_get("listing_id")?,
            price: decimal_column(row, "price")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Subscription {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            listing_id: row.try_get("listing_id")?,
            notify: row.try_get("notify")?,
            lower_threshold: optional_decimal_column(row, "lower_threshold")?,
            upper_threshold: optional_decimal_column(row, "upper_threshold")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Notification {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
