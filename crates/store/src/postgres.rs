use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BatchId, FarmId, ListingId, OfferId, SubjectId, TransactionId, UserId};
use domain::{
    BatchAggregate, Listing, ListingTarget, Money, Offer, SaleTransaction, SubjectProjection,
    WeightKg,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::store::{MarketplaceStore, StoreSession};
use crate::{Result, StoreError};

/// PostgreSQL-backed marketplace store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// One database transaction against the marketplace schema.
pub struct PostgresSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MarketplaceStore for PostgresStore {
    type Session = PostgresSession;

    async fn begin(&self) -> Result<Self::Session> {
        let tx = self.pool.begin().await?;
        Ok(PostgresSession { tx })
    }
}

fn row_to_listing(row: &PgRow) -> Result<Listing> {
    let listing_type: String = row.try_get("listing_type")?;
    let target = match listing_type.as_str() {
        "individual" => ListingTarget::Individual {
            subject_id: SubjectId::from_uuid(row.try_get::<Uuid, _>("subject_id")?),
        },
        "batch" => ListingTarget::Batch {
            batch_id: BatchId::from_uuid(row.try_get::<Uuid, _>("batch_id")?),
        },
        other => return Err(StoreError::Corrupt(format!("listing type {other}"))),
    };

    let status = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(StoreError::Corrupt)?;
    let removal_reason = row
        .try_get::<Option<String>, _>("removal_reason")?
        .map(|r| r.parse().map_err(StoreError::Corrupt))
        .transpose()?;
    let weight_kg = WeightKg::new(row.try_get("weight_kg")?)
        .ok_or_else(|| StoreError::Corrupt("non-positive weight".to_string()))?;
    let photos: Vec<String> = serde_json::from_value(row.try_get("photos")?)?;

    Ok(Listing {
        id: ListingId::from_uuid(row.try_get::<Uuid, _>("id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        farm_id: FarmId::from_uuid(row.try_get::<Uuid, _>("farm_id")?),
        target,
        weight_kg,
        price_per_kg: Money::from_minor(row.try_get("price_per_kg")?),
        status,
        listed_at: row.try_get("listed_at")?,
        sold_at: row.try_get("sold_at")?,
        removal_reason,
        photos,
    })
}

fn row_to_offer(row: &PgRow) -> Result<Offer> {
    Ok(Offer {
        id: OfferId::from_uuid(row.try_get::<Uuid, _>("id")?),
        listing_id: ListingId::from_uuid(row.try_get::<Uuid, _>("listing_id")?),
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        author_id: UserId::from_uuid(row.try_get::<Uuid, _>("author_id")?),
        kind: row
            .try_get::<String, _>("kind")?
            .parse()
            .map_err(StoreError::Corrupt)?,
        amount: row
            .try_get::<Option<i64>, _>("amount")?
            .map(Money::from_minor),
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(StoreError::Corrupt)?,
        message: row.try_get("message")?,
        counter_of: row
            .try_get::<Option<Uuid>, _>("counter_of")?
            .map(OfferId::from_uuid),
        created_at: row.try_get("created_at")?,
        responded_at: row.try_get("responded_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn row_to_sale(row: &PgRow) -> Result<SaleTransaction> {
    let subject_ids: Vec<SubjectId> = serde_json::from_value(row.try_get("subject_ids")?)?;
    Ok(SaleTransaction {
        id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
        listing_id: ListingId::from_uuid(row.try_get::<Uuid, _>("listing_id")?),
        offer_id: OfferId::from_uuid(row.try_get::<Uuid, _>("offer_id")?),
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        farm_id: FarmId::from_uuid(row.try_get::<Uuid, _>("farm_id")?),
        subject_ids,
        final_price: Money::from_minor(row.try_get("final_price")?),
        payment_method: row.try_get("payment_method")?,
        notes: row.try_get("notes")?,
        pickup_date: row.try_get("pickup_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_projection(row: &PgRow) -> Result<SubjectProjection> {
    Ok(SubjectProjection {
        subject_id: SubjectId::from_uuid(row.try_get::<Uuid, _>("subject_id")?),
        batch_id: row
            .try_get::<Option<Uuid>, _>("batch_id")?
            .map(BatchId::from_uuid),
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(StoreError::Corrupt)?,
        listing_id: row
            .try_get::<Option<Uuid>, _>("listing_id")?
            .map(ListingId::from_uuid),
        listed_at: row.try_get("listed_at")?,
        sold_at: row.try_get("sold_at")?,
    })
}

const LISTING_COLUMNS: &str = "id, seller_id, farm_id, listing_type, subject_id, batch_id, \
     weight_kg, price_per_kg, status, listed_at, sold_at, removal_reason, photos";

const OFFER_COLUMNS: &str = "id, listing_id, buyer_id, seller_id, author_id, kind, amount, \
     status, message, counter_of, created_at, responded_at, expires_at";

const SALE_COLUMNS: &str = "id, listing_id, offer_id, buyer_id, seller_id, farm_id, \
     subject_ids, final_price, payment_method, notes, pickup_date, created_at";

#[async_trait]
impl StoreSession for PostgresSession {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    async fn insert_listing(&mut self, listing: &Listing) -> Result<()> {
        sqlx::query(
            "INSERT INTO marketplace_listings \
             (id, seller_id, farm_id, listing_type, subject_id, batch_id, weight_kg, \
              price_per_kg, status, listed_at, sold_at, removal_reason, photos) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(listing.id.as_uuid())
        .bind(listing.seller_id.as_uuid())
        .bind(listing.farm_id.as_uuid())
        .bind(listing.target.kind_str())
        .bind(listing.target.subject_id().map(|s| s.as_uuid()))
        .bind(listing.target.batch_id().map(|b| b.as_uuid()))
        .bind(listing.weight_kg.as_kg())
        .bind(listing.price_per_kg.minor())
        .bind(listing.status.as_str())
        .bind(listing.listed_at)
        .bind(listing.sold_at)
        .bind(listing.removal_reason.map(|r| r.as_str()))
        .bind(serde_json::to_value(&listing.photos)?)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn listing(&mut self, id: ListingId) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_listing).transpose()
    }

    async fn listing_for_update(&mut self, id: ListingId) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_listing).transpose()
    }

    async fn update_listing(&mut self, listing: &Listing) -> Result<()> {
        sqlx::query(
            "UPDATE marketplace_listings \
             SET weight_kg = $2, price_per_kg = $3, status = $4, sold_at = $5, \
                 removal_reason = $6, photos = $7 \
             WHERE id = $1",
        )
        .bind(listing.id.as_uuid())
        .bind(listing.weight_kg.as_kg())
        .bind(listing.price_per_kg.minor())
        .bind(listing.status.as_str())
        .bind(listing.sold_at)
        .bind(listing.removal_reason.map(|r| r.as_str()))
        .bind(serde_json::to_value(&listing.photos)?)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn listings_by_ids(&mut self, ids: &[ListingId]) -> Result<Vec<Listing>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings WHERE id = ANY($1)"
        ))
        .bind(uuids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut found = std::collections::HashMap::with_capacity(rows.len());
        for row in &rows {
            let listing = row_to_listing(row)?;
            found.insert(listing.id, listing);
        }
        // Preserve request order; unknown ids are silently omitted.
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn active_listings_for_subjects(
        &mut self,
        subjects: &[SubjectId],
        exclude: Option<ListingId>,
    ) -> Result<Vec<Listing>> {
        let uuids: Vec<Uuid> = subjects.iter().map(|s| s.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings l \
             WHERE l.status IN ('available', 'reserved') \
               AND ($2::uuid IS NULL OR l.id <> $2) \
               AND (l.subject_id = ANY($1) \
                    OR l.batch_id IN (SELECT batch_id FROM marketplace_subjects \
                                      WHERE subject_id = ANY($1) AND batch_id IS NOT NULL)) \
             ORDER BY l.id \
             FOR UPDATE OF l"
        ))
        .bind(uuids)
        .bind(exclude.map(|id| id.as_uuid()))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn insert_offer(&mut self, offer: &Offer) -> Result<()> {
        sqlx::query(
            "INSERT INTO marketplace_offers \
             (id, listing_id, buyer_id, seller_id, author_id, kind, amount, status, \
              message, counter_of, created_at, responded_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(offer.id.as_uuid())
        .bind(offer.listing_id.as_uuid())
        .bind(offer.buyer_id.as_uuid())
        .bind(offer.seller_id.as_uuid())
        .bind(offer.author_id.as_uuid())
        .bind(offer.kind.as_str())
        .bind(offer.amount.map(|a| a.minor()))
        .bind(offer.status.as_str())
        .bind(offer.message.as_deref())
        .bind(offer.counter_of.map(|id| id.as_uuid()))
        .bind(offer.created_at)
        .bind(offer.responded_at)
        .bind(offer.expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn offer(&mut self, id: OfferId) -> Result<Option<Offer>> {
        let row = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM marketplace_offers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_offer).transpose()
    }

    async fn update_offer(&mut self, offer: &Offer) -> Result<()> {
        sqlx::query(
            "UPDATE marketplace_offers \
             SET status = $2, responded_at = $3, expires_at = $4 \
             WHERE id = $1",
        )
        .bind(offer.id.as_uuid())
        .bind(offer.status.as_str())
        .bind(offer.responded_at)
        .bind(offer.expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn open_offers_for_listing(&mut self, listing_id: ListingId) -> Result<Vec<Offer>> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM marketplace_offers \
             WHERE listing_id = $1 AND status IN ('pending', 'countered') \
             ORDER BY created_at"
        ))
        .bind(listing_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_offer).collect()
    }

    async fn accepted_offers_for_listing(&mut self, listing_id: ListingId) -> Result<Vec<Offer>> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM marketplace_offers \
             WHERE listing_id = $1 AND status = 'accepted' \
             ORDER BY created_at"
        ))
        .bind(listing_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_offer).collect()
    }

    async fn offers_expiring_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Offer>> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM marketplace_offers \
             WHERE status IN ('pending', 'countered', 'accepted') AND expires_at <= $1 \
             ORDER BY expires_at"
        ))
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_offer).collect()
    }

    async fn insert_sale(&mut self, sale: &SaleTransaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO marketplace_sales \
             (id, listing_id, offer_id, buyer_id, seller_id, farm_id, subject_ids, \
              final_price, payment_method, notes, pickup_date, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(sale.id.as_uuid())
        .bind(sale.listing_id.as_uuid())
        .bind(sale.offer_id.as_uuid())
        .bind(sale.buyer_id.as_uuid())
        .bind(sale.seller_id.as_uuid())
        .bind(sale.farm_id.as_uuid())
        .bind(serde_json::to_value(&sale.subject_ids)?)
        .bind(sale.final_price.minor())
        .bind(sale.payment_method.as_deref())
        .bind(sale.notes.as_deref())
        .bind(sale.pickup_date)
        .bind(sale.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn sale_for_listing(&mut self, listing_id: ListingId) -> Result<Option<SaleTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {SALE_COLUMNS} FROM marketplace_sales WHERE listing_id = $1"
        ))
        .bind(listing_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_sale).transpose()
    }

    async fn register_subject(
        &mut self,
        subject_id: SubjectId,
        batch_id: Option<BatchId>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO marketplace_subjects (subject_id, batch_id, status) \
             VALUES ($1, $2, 'not_listed') \
             ON CONFLICT (subject_id) DO NOTHING",
        )
        .bind(subject_id.as_uuid())
        .bind(batch_id.map(|b| b.as_uuid()))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn subject(&mut self, id: SubjectId) -> Result<Option<SubjectProjection>> {
        let row = sqlx::query(
            "SELECT subject_id, batch_id, status, listing_id, listed_at, sold_at \
             FROM marketplace_subjects WHERE subject_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_projection).transpose()
    }

    async fn subjects_for_update(&mut self, ids: &[SubjectId]) -> Result<Vec<SubjectProjection>> {
        let uuids: Vec<Uuid> = ids.iter().map(|s| s.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT subject_id, batch_id, status, listing_id, listed_at, sold_at \
             FROM marketplace_subjects WHERE subject_id = ANY($1) \
             ORDER BY subject_id \
             FOR UPDATE",
        )
        .bind(uuids)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_projection).collect()
    }

    async fn upsert_subject(&mut self, projection: &SubjectProjection) -> Result<()> {
        sqlx::query(
            "INSERT INTO marketplace_subjects \
             (subject_id, batch_id, status, listing_id, listed_at, sold_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (subject_id) DO UPDATE \
             SET batch_id = $2, status = $3, listing_id = $4, listed_at = $5, sold_at = $6",
        )
        .bind(projection.subject_id.as_uuid())
        .bind(projection.batch_id.map(|b| b.as_uuid()))
        .bind(projection.status.as_str())
        .bind(projection.listing_id.map(|l| l.as_uuid()))
        .bind(projection.listed_at)
        .bind(projection.sold_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn batch_members(&mut self, batch_id: BatchId) -> Result<Vec<SubjectId>> {
        let rows = sqlx::query(
            "SELECT subject_id FROM marketplace_subjects \
             WHERE batch_id = $1 ORDER BY subject_id",
        )
        .bind(batch_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| Ok(SubjectId::from_uuid(row.try_get::<Uuid, _>("subject_id")?)))
            .collect()
    }

    async fn batch_aggregate(&mut self, batch_id: BatchId) -> Result<Option<BatchAggregate>> {
        let row = sqlx::query(
            "SELECT batch_id, status, listed_count FROM marketplace_batches WHERE batch_id = $1",
        )
        .bind(batch_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| {
            Ok(BatchAggregate {
                batch_id: BatchId::from_uuid(row.try_get::<Uuid, _>("batch_id")?),
                status: row
                    .try_get::<String, _>("status")?
                    .parse()
                    .map_err(StoreError::Corrupt)?,
                listed_count: row.try_get::<i32, _>("listed_count")? as u32,
            })
        })
        .transpose()
    }

    async fn upsert_batch_aggregate(&mut self, aggregate: &BatchAggregate) -> Result<()> {
        sqlx::query(
            "INSERT INTO marketplace_batches (batch_id, status, listed_count) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (batch_id) DO UPDATE SET status = $2, listed_count = $3",
        )
        .bind(aggregate.batch_id.as_uuid())
        .bind(aggregate.status.as_str())
        .bind(aggregate.listed_count as i32)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
