//! Unique PIN allocation for pass documents

use rand_core::{OsRng, RngCore};
use society_types::{Pin, PinDocument};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::store::{Document, DocumentStore, Filter, StoreError};

/// Attempts before giving up on finding a free PIN
pub const MAX_PIN_ATTEMPTS: usize = 10;

/// Give `doc` a PIN unused in its collection and insert it.
///
/// Each attempt probes for the PIN first, then inserts. The unique index on
/// `pin` catches a concurrent writer that took the same PIN between probe and
/// insert; that counts as a collision and uses up an attempt.
pub async fn insert_with_unique_pin<D>(store: &DocumentStore, doc: &mut D) -> Result<(), ApiError>
where
    D: Document + PinDocument,
{
    insert_with_pin_from(store, doc, &mut OsRng).await
}

async fn insert_with_pin_from<D, R>(
    store: &DocumentStore,
    doc: &mut D,
    rng: &mut R,
) -> Result<(), ApiError>
where
    D: Document + PinDocument,
    R: RngCore + Send,
{
    for attempt in 1..=MAX_PIN_ATTEMPTS {
        let pin = Pin::random(rng);

        if store
            .exists::<D>(&Filter::new().eq("pin", pin.as_str()))
            .await?
        {
            debug!("PIN collision in {} on attempt {}", D::COLLECTION, attempt);
            continue;
        }

        doc.set_pin(pin);
        match store.insert(doc).await {
            Ok(()) => return Ok(()),
            Err(StoreError::Conflict(msg)) => {
                warn!(
                    "Lost PIN race in {} on attempt {}: {}",
                    D::COLLECTION,
                    attempt,
                    msg
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::PinExhausted(MAX_PIN_ATTEMPTS))
}
