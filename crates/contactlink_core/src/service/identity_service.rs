//! Identify use-case service.
//!
//! # Responsibility
//! - Run one identify pass: locate, elect, upsert, re-fetch, format.
//! - Provide the transactional entry point used by callers holding a
//!   SQLite connection.
//!
//! # Invariants
//! - Input is validated before any repository call.
//! - A pass either returns a consistent view or an error, never a partial
//!   result.
//! - `identify_contact` holds the SQLite write lock for the whole pass, so
//!   concurrent passes over overlapping identifiers are serialized.

use crate::identity::elector::elect;
use crate::identity::locator::{load_cluster, locate};
use crate::identity::request::IdentifyRequest;
use crate::identity::upserter::upsert;
use crate::identity::view::{format_view, ContactView, IdentifyResponse};
use crate::identity::IdentifyError;
use crate::model::contact::ContactId;
use crate::repo::contact_repo::{ContactRepository, SqliteContactRepository};
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;

/// Identify service facade over repository implementations.
pub struct IdentityService<R: ContactRepository> {
    repo: R,
}

impl<R: ContactRepository> IdentityService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Validates raw identifiers and resolves them to a cluster view.
    ///
    /// # Errors
    /// - `InvalidInput` before any storage access when both are absent or empty.
    pub fn identify(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<ContactView, IdentifyError> {
        let request = IdentifyRequest::new(email, phone_number)?;
        self.resolve(&request)
    }

    /// Runs the identify pipeline for an already validated request.
    pub fn resolve(&self, request: &IdentifyRequest) -> Result<ContactView, IdentifyError> {
        let located = locate(&self.repo, request)?;
        let elected = elect(&self.repo, &located)?;
        let outcome = upsert(&self.repo, elected, request)?;
        let view = self.cluster_view(outcome.primary_id)?;

        info!(
            "event=identify_resolve module=service status=ok located={} primary_id={} created={} cluster_size={}",
            located.len(),
            view.primary_contact_id,
            outcome.created.is_some(),
            view.secondary_contact_ids.len() + 1
        );
        Ok(view)
    }

    /// Re-fetches the cluster rooted at `primary_id` and formats it.
    pub fn cluster_view(&self, primary_id: ContactId) -> Result<ContactView, IdentifyError> {
        let (primary, secondaries) = load_cluster(&self.repo, primary_id)?;
        Ok(format_view(&primary, &secondaries))
    }
}

/// Identifies a submission inside one immediate SQLite transaction.
///
/// The transaction begins before the first read, so competing writers wait
/// on the connection busy timeout instead of racing on the same cluster.
/// Any error rolls back every write of the pass.
///
/// # Errors
/// - `InvalidInput` before the transaction is opened.
/// - Any pipeline error; the transaction is rolled back.
pub fn identify_contact(
    conn: &mut Connection,
    email: Option<&str>,
    phone_number: Option<&str>,
) -> Result<IdentifyResponse, IdentifyError> {
    let started_at = Instant::now();
    let request = match IdentifyRequest::new(email, phone_number) {
        Ok(request) => request,
        Err(err) => {
            warn!(
                "event=identify module=service status=rejected error_code={}",
                err.code()
            );
            return Err(err);
        }
    };
    info!(
        "event=identify module=service status=start has_email={} has_phone={}",
        request.email().is_some(),
        request.phone_number().is_some()
    );

    let result = run_in_transaction(conn, &request);
    match &result {
        Ok(response) => info!(
            "event=identify module=service status=ok duration_ms={} primary_id={} secondaries={}",
            started_at.elapsed().as_millis(),
            response.contact.primary_contact_id,
            response.contact.secondary_contact_ids.len()
        ),
        Err(err) => error!(
            "event=identify module=service status=error duration_ms={} error_code={} error={}",
            started_at.elapsed().as_millis(),
            err.code(),
            err
        ),
    }
    result
}

fn run_in_transaction(
    conn: &mut Connection,
    request: &IdentifyRequest,
) -> Result<IdentifyResponse, IdentifyError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let view = {
        let repo = SqliteContactRepository::try_new(&tx)?;
        IdentityService::new(repo).resolve(request)?
    };
    tx.commit()?;
    Ok(IdentifyResponse { contact: view })
}
