/// Seller Applications
///
/// Review of seller applications by an admin. A decision moves an application
/// out of `pending` exactly once; approval also grants the seller role, opens
/// a store and notifies the applicant, all in one transaction.

use super::gate::PrivilegeGate;
use super::roles::{grant_with, Role};
use super::slug::{random_suffix, store_slug};
use crate::account::CallerIdentity;
use crate::audit::{AuditAction, AuditEvent, AuditLog};
use crate::auth_gate::RequestSource;
use crate::clock::{from_millis, to_millis, SharedClock};
use crate::error::{GateError, GateResult};
use crate::metrics::APPLICATION_DECISIONS_TOTAL;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

const DEFAULT_BUSINESS_NAME: &str = "New Store";
const APPROVED_NOTES: &str = "Approved";
const REJECTED_NOTES: &str = "Rejected";
const APPROVED_TITLE: &str = "Seller Application Approved";
const APPROVED_MESSAGE: &str =
    "Congratulations! Your seller application has been approved. You can now start adding products.";
const REJECTED_TITLE: &str = "Seller Application Update";
const REJECTED_MESSAGE: &str = "Your seller application was not approved at this time.";
const SLUG_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> GateResult<Self> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            _ => Err(GateError::Validation(format!("Invalid status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn parse(s: &str) -> GateResult<Self> {
        match s {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            _ => Err(GateError::Validation("Invalid action".to_string())),
        }
    }

    fn resulting_status(&self) -> ApplicationStatus {
        match self {
            ReviewAction::Approve => ApplicationStatus::Approved,
            ReviewAction::Reject => ApplicationStatus::Rejected,
        }
    }
}

/// Business details submitted by an applicant, stored as `application_data`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationDetails {
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub business_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerApplication {
    pub id: String,
    pub user_id: String,
    pub status: ApplicationStatus,
    pub application_data: ApplicationDetails,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub application_id: String,
    pub action: ReviewAction,
    pub review_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub application_id: String,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_slug: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub pending_applications: i64,
    pub total_stores: i64,
    pub total_sellers: i64,
}

pub struct ApplicationManager {
    db: SqlitePool,
    gate: Arc<PrivilegeGate>,
    audit: Arc<AuditLog>,
    clock: SharedClock,
}

impl ApplicationManager {
    pub fn new(
        db: SqlitePool,
        gate: Arc<PrivilegeGate>,
        audit: Arc<AuditLog>,
        clock: SharedClock,
    ) -> Self {
        Self { db, gate, audit, clock }
    }

    /// File a pending application for the caller
    pub async fn submit(
        &self,
        caller: &CallerIdentity,
        details: ApplicationDetails,
    ) -> GateResult<SellerApplication> {
        let business_name = details
            .business_name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if business_name.is_empty() {
            return Err(GateError::Validation("Business name is required".to_string()));
        }

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seller_applications WHERE user_id = ? AND status = 'pending'",
        )
        .bind(&caller.user_id)
        .fetch_one(&self.db)
        .await?;

        if pending > 0 {
            return Err(GateError::Conflict(
                "An application is already pending review".to_string(),
            ));
        }

        let application = SellerApplication {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: caller.user_id.clone(),
            status: ApplicationStatus::Pending,
            application_data: details,
            submitted_at: self.clock.now(),
            reviewed_at: None,
            reviewed_by: None,
            review_notes: None,
        };

        let data = serde_json::to_string(&application.application_data)
            .map_err(|e| GateError::Internal(format!("Unserializable application: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO seller_applications (id, user_id, status, application_data, submitted_at)
            VALUES (?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&application.id)
        .bind(&application.user_id)
        .bind(&data)
        .bind(to_millis(application.submitted_at))
        .execute(&self.db)
        .await?;

        tracing::info!("Seller application {} submitted by {}", application.id, caller.user_id);

        Ok(application)
    }

    pub async fn get(&self, id: &str) -> GateResult<SellerApplication> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, application_data, submitted_at, reviewed_at, reviewed_by, review_notes
            FROM seller_applications
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound("Application not found".to_string()))?;

        application_from_row(&row)
    }

    /// Applications newest first, optionally filtered by status
    pub async fn list(
        &self,
        caller: &CallerIdentity,
        status: Option<ApplicationStatus>,
    ) -> GateResult<Vec<SellerApplication>> {
        self.gate.require(caller, Role::Admin).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, application_data, submitted_at, reviewed_at, reviewed_by, review_notes
            FROM seller_applications
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY submitted_at DESC, id ASC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(application_from_row).collect()
    }

    pub async fn stats(&self, caller: &CallerIdentity) -> GateResult<DashboardStats> {
        self.gate.require(caller, Role::Admin).await?;

        let pending_applications: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seller_applications WHERE status = 'pending'",
        )
        .fetch_one(&self.db)
        .await?;

        let total_stores: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores")
            .fetch_one(&self.db)
            .await?;

        let total_sellers: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM user_roles WHERE role = 'seller'")
                .fetch_one(&self.db)
                .await?;

        Ok(DashboardStats {
            pending_applications,
            total_stores,
            total_sellers,
        })
    }

    /// Approve or reject a pending application
    pub async fn review(
        &self,
        caller: &CallerIdentity,
        source: &RequestSource,
        request: ReviewRequest,
    ) -> GateResult<ReviewOutcome> {
        self.gate.require(caller, Role::Admin).await?;

        let application = self.get(&request.application_id).await?;
        if application.status != ApplicationStatus::Pending {
            return Err(already_reviewed(&application.id));
        }

        let now = self.clock.now();
        let status = request.action.resulting_status();
        let notes = request
            .review_notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let stored_notes = notes.clone().unwrap_or_else(|| match request.action {
            ReviewAction::Approve => APPROVED_NOTES.to_string(),
            ReviewAction::Reject => REJECTED_NOTES.to_string(),
        });

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE seller_applications
            SET status = ?, reviewed_at = ?, reviewed_by = ?, review_notes = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(to_millis(now))
        .bind(&caller.user_id)
        .bind(&stored_notes)
        .bind(&application.id)
        .execute(&mut *tx)
        .await?;

        // Lost the race to a concurrent review
        if updated.rows_affected() == 0 {
            return Err(already_reviewed(&application.id));
        }

        let (event, slug) = match request.action {
            ReviewAction::Approve => {
                let details = &application.application_data;
                let business_name = details
                    .business_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_BUSINESS_NAME);
                let slug = unique_store_slug(&mut tx, business_name).await?;

                grant_with(&mut *tx, &application.user_id, Role::Seller, to_millis(now)).await?;

                sqlx::query(
                    r#"
                    INSERT INTO stores (id, user_id, name, slug, status, description, created_at)
                    VALUES (?, ?, ?, ?, 'active', ?, ?)
                    "#,
                )
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(&application.user_id)
                .bind(business_name)
                .bind(&slug)
                .bind(details.business_description.as_deref().unwrap_or_default())
                .bind(to_millis(now))
                .execute(&mut *tx)
                .await?;

                insert_notification(
                    &mut tx,
                    &application.user_id,
                    "application_approved",
                    APPROVED_TITLE,
                    APPROVED_MESSAGE,
                    to_millis(now),
                )
                .await?;

                let event = AuditEvent::new(AuditAction::ApplicationApproved, "seller_application")
                    .details(json!({
                        "userId": application.user_id,
                        "businessName": business_name,
                        "storeSlug": slug,
                        "reviewedBy": caller.user_id,
                    }));
                (event, Some(slug))
            }
            ReviewAction::Reject => {
                insert_notification(
                    &mut tx,
                    &application.user_id,
                    "application_rejected",
                    REJECTED_TITLE,
                    notes.as_deref().unwrap_or(REJECTED_MESSAGE),
                    to_millis(now),
                )
                .await?;

                let event = AuditEvent::new(AuditAction::ApplicationRejected, "seller_application")
                    .details(json!({
                        "userId": application.user_id,
                        "reviewNotes": notes,
                        "reviewedBy": caller.user_id,
                    }));
                (event, None)
            }
        };

        tx.commit().await?;

        self.audit
            .append(
                event
                    .resource_id(application.id.as_str())
                    .source(&source.ip, source.user_agent.as_deref()),
            )
            .await?;

        APPLICATION_DECISIONS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();

        tracing::info!(
            "Application {} {} by {}",
            application.id,
            status.as_str(),
            caller.user_id
        );

        let message = match request.action {
            ReviewAction::Approve => "Application approved",
            ReviewAction::Reject => "Application rejected",
        };

        Ok(ReviewOutcome {
            application_id: application.id,
            status,
            store_slug: slug,
            message: message.to_string(),
        })
    }
}

fn already_reviewed(id: &str) -> GateError {
    GateError::InvalidState(format!("Application {} has already been reviewed", id))
}

/// Pick a slug no existing store uses, inside the review transaction
async fn unique_store_slug(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    business_name: &str,
) -> GateResult<String> {
    for _ in 0..SLUG_ATTEMPTS {
        let candidate = store_slug(business_name, &random_suffix());
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores WHERE slug = ?")
            .bind(&candidate)
            .fetch_one(&mut **tx)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
    }

    Err(GateError::Conflict(
        "Could not allocate a unique store slug".to_string(),
    ))
}

async fn insert_notification(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    kind: &str,
    title: &str,
    message: &str,
    created_at: i64,
) -> GateResult<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, message, read, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(message)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn application_from_row(row: &SqliteRow) -> GateResult<SellerApplication> {
    let status: String = row.try_get("status")?;
    let data: String = row.try_get("application_data")?;
    let reviewed_at: Option<i64> = row.try_get("reviewed_at")?;

    Ok(SellerApplication {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status: ApplicationStatus::parse(&status)?,
        application_data: serde_json::from_str(&data)
            .map_err(|e| GateError::Internal(format!("Corrupt application data: {}", e)))?,
        submitted_at: from_millis(row.try_get("submitted_at")?),
        reviewed_at: reviewed_at.map(from_millis),
        reviewed_by: row.try_get("reviewed_by")?,
        review_notes: row.try_get("review_notes")?,
    })
}
