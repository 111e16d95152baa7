//! Aggregation synchronizer.
//!
//! Recomputes a batch's derived marketplace status from its members'
//! projections. Always invoked inside the caller's session, in the same
//! transaction as the member write: the aggregate is a derived view and
//! must never lag committed state.

use common::{BatchId, SubjectId};
use domain::{BatchAggregate, Listing, ListingTarget};
use store::{StoreError, StoreSession};

/// Recomputes and persists the aggregate for one batch.
pub async fn resync_batch<Sess: StoreSession>(
    session: &mut Sess,
    batch_id: BatchId,
) -> Result<BatchAggregate, StoreError> {
    let member_ids = session.batch_members(batch_id).await?;
    let mut members = Vec::with_capacity(member_ids.len());
    for id in member_ids {
        if let Some(projection) = session.subject(id).await? {
            members.push(projection);
        }
    }

    let aggregate = BatchAggregate::derive(batch_id, &members);
    session.upsert_batch_aggregate(&aggregate).await?;
    Ok(aggregate)
}

/// Resolves the subjects covered by a listing target: the one subject for
/// individual listings, every current batch member for batch listings.
/// The result is sorted, which doubles as the lock-acquisition order.
pub async fn covered_subjects<Sess: StoreSession>(
    session: &mut Sess,
    target: &ListingTarget,
) -> Result<Vec<SubjectId>, StoreError> {
    let mut subjects = match target {
        ListingTarget::Individual { subject_id } => vec![*subject_id],
        ListingTarget::Batch { batch_id } => session.batch_members(*batch_id).await?,
    };
    subjects.sort();
    subjects.dedup();
    Ok(subjects)
}

/// Marks every covered subject `Listed` under the given listing and
/// resyncs the touched batch aggregates. Used at listing creation.
pub(crate) async fn list_coverage<Sess: StoreSession>(
    session: &mut Sess,
    listing: &Listing,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<usize, StoreError> {
    let subjects = covered_subjects(session, &listing.target).await?;
    let mut touched = std::collections::BTreeSet::new();
    let mut updated = 0;
    for mut projection in session.subjects_for_update(&subjects).await? {
        projection.mark_listed(listing.id, now);
        if let Some(batch_id) = projection.batch_id {
            touched.insert(batch_id);
        }
        session.upsert_subject(&projection).await?;
        updated += 1;
    }
    for batch_id in touched {
        resync_batch(session, batch_id).await?;
    }
    Ok(updated)
}

/// Marks every covered subject `Reserved`. Used when an offer is
/// accepted.
pub(crate) async fn reserve_coverage<Sess: StoreSession>(
    session: &mut Sess,
    listing: &Listing,
) -> Result<usize, StoreError> {
    let subjects = covered_subjects(session, &listing.target).await?;
    let mut touched = std::collections::BTreeSet::new();
    let mut updated = 0;
    for mut projection in session.subjects_for_update(&subjects).await? {
        if projection.listing_id != Some(listing.id) {
            continue;
        }
        projection.mark_reserved(listing.id);
        if let Some(batch_id) = projection.batch_id {
            touched.insert(batch_id);
        }
        session.upsert_subject(&projection).await?;
        updated += 1;
    }
    for batch_id in touched {
        resync_batch(session, batch_id).await?;
    }
    Ok(updated)
}

/// Returns reserved subjects to `Listed` when a reservation is released.
pub(crate) async fn release_coverage<Sess: StoreSession>(
    session: &mut Sess,
    listing: &Listing,
) -> Result<usize, StoreError> {
    let subjects = covered_subjects(session, &listing.target).await?;
    let mut touched = std::collections::BTreeSet::new();
    let mut updated = 0;
    for mut projection in session.subjects_for_update(&subjects).await? {
        if projection.listing_id != Some(listing.id) {
            continue;
        }
        projection.release_reservation();
        if let Some(batch_id) = projection.batch_id {
            touched.insert(batch_id);
        }
        session.upsert_subject(&projection).await?;
        updated += 1;
    }
    for batch_id in touched {
        resync_batch(session, batch_id).await?;
    }
    Ok(updated)
}

/// Reverts every covered subject to `NotListed` so it can be listed
/// again, the policy applied when a listing is removed. Subjects that
/// moved on (sold, or re-covered by another listing) are left untouched.
pub(crate) async fn clear_coverage<Sess: StoreSession>(
    session: &mut Sess,
    listing: &Listing,
) -> Result<usize, StoreError> {
    let subjects = covered_subjects(session, &listing.target).await?;
    let mut touched = std::collections::BTreeSet::new();
    let mut updated = 0;
    for mut projection in session.subjects_for_update(&subjects).await? {
        if projection.listing_id != Some(listing.id) || !projection.status.is_on_market() {
            continue;
        }
        projection.clear();
        if let Some(batch_id) = projection.batch_id {
            touched.insert(batch_id);
        }
        session.upsert_subject(&projection).await?;
        updated += 1;
    }
    for batch_id in touched {
        resync_batch(session, batch_id).await?;
    }
    Ok(updated)
}
