//! Rental request and rotation list persistence on PgRepository

use sqlx::{Postgres, Transaction};

use super::{
    map_unique_violation, NewRentalRequest, NewRotationEntry, OfferCommit, PgRepository,
    PointerAdvance, RentalRequestUpdate,
};
use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        HistoryRecord, RentalAgreement, RentalAgreementStatus, RentalRequest, RotationListEntry,
    },
};

const RENTAL_REQUEST_COLUMNS: &str = r#"
    id, project_id, local_area_id, district_equipment_type_id, equipment_count, status,
    expected_hours, expected_start_date, expected_end_date, first_on_rotation_list,
    created_at, version
"#;

const ENTRY_COLUMNS: &str = r#"
    id, rental_request_id, equipment_id, block_number, rotation_list_sort_order,
    asked_date_time, was_asked, offer_response, offer_response_datetime,
    offer_refusal_reason, offer_response_note, is_force_hire, note,
    rental_agreement_id, version
"#;

const AGREEMENT_COLUMNS: &str = r#"
    id, number, equipment_id, project_id, rental_request_id, rotation_list_entry_id,
    local_area_id, fiscal_year, status, dated_on, estimate_hours, estimate_start_work
"#;

/// Agreement number: `{fiscal year}-{local area}-{sequence}`
pub(crate) fn agreement_number(fiscal_year: i32, local_area_id: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", fiscal_year, local_area_id, sequence)
}

impl PgRepository {
    pub async fn rental_requests_get(&self, id: i32) -> AppResult<Option<RentalRequest>> {
        let query = format!("SELECT {} FROM rental_requests WHERE id = $1", RENTAL_REQUEST_COLUMNS);
        let row = sqlx::query_as::<_, RentalRequest>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn rental_requests_list_entries(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RotationListEntry>> {
        let query = format!(
            "SELECT {} FROM rotation_list_entries WHERE rental_request_id = $1 ORDER BY rotation_list_sort_order",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, RotationListEntry>(&query)
            .bind(rental_request_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn rental_requests_find_in_progress(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<i32>> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT id FROM rental_requests
            WHERE local_area_id = $1 AND district_equipment_type_id = $2 AND status = 1
            LIMIT 1
            "#,
        )
        .bind(local_area_id)
        .bind(district_equipment_type_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn rental_requests_count_agreements(&self, rental_request_id: i32) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rental_agreements WHERE rental_request_id = $1")
                .bind(rental_request_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn rental_requests_list_history(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT id, rental_request_id, history_text, created_date
            FROM history WHERE rental_request_id = $1 ORDER BY id
            "#,
        )
        .bind(rental_request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn rental_requests_list_agreements(
        &self,
        rental_request_id: i32,
    ) -> AppResult<Vec<RentalAgreement>> {
        let query = format!(
            "SELECT {} FROM rental_agreements WHERE rental_request_id = $1 ORDER BY id",
            AGREEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, RentalAgreement>(&query)
            .bind(rental_request_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Insert a request with its queue in one transaction
    pub async fn rental_requests_create(
        &self,
        request: NewRentalRequest,
        entries: Vec<NewRotationEntry>,
    ) -> AppResult<RentalRequest> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO rental_requests (
                project_id, local_area_id, district_equipment_type_id, equipment_count, status,
                expected_hours, expected_start_date, expected_end_date, first_on_rotation_list
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            RENTAL_REQUEST_COLUMNS
        );
        let created = sqlx::query_as::<_, RentalRequest>(&query)
            .bind(request.project_id)
            .bind(request.local_area_id)
            .bind(request.district_equipment_type_id)
            .bind(request.equipment_count)
            .bind(request.status)
            .bind(request.expected_hours)
            .bind(request.expected_start_date)
            .bind(request.expected_end_date)
            .bind(request.first_on_rotation_list)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    ErrorCode::DuplicateActiveRequest,
                    "An In Progress rental request already exists for this local area and equipment type",
                )
            })?;

        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO rotation_list_entries (
                    rental_request_id, equipment_id, block_number, rotation_list_sort_order
                )
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(created.id)
            .bind(entry.equipment_id)
            .bind(entry.block_number)
            .bind(entry.rotation_list_sort_order)
            .execute(&mut *tx)
            .await?;
        }

        insert_history(&mut tx, created.id, &request.history).await?;

        tx.commit().await?;
        Ok(created)
    }

    pub async fn rental_requests_update(&self, update: RentalRequestUpdate) -> AppResult<RentalRequest> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE rental_requests
            SET equipment_count = $3, expected_hours = $4, expected_start_date = $5,
                expected_end_date = $6, status = $7, first_on_rotation_list = $8,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            RENTAL_REQUEST_COLUMNS
        );
        let updated = sqlx::query_as::<_, RentalRequest>(&query)
            .bind(update.id)
            .bind(update.expected_version)
            .bind(update.equipment_count)
            .bind(update.expected_hours)
            .bind(update.expected_start_date)
            .bind(update.expected_end_date)
            .bind(update.status)
            .bind(update.first_on_rotation_list)
            .fetch_optional(&mut *tx)
            .await?;

        let updated = match updated {
            Some(row) => row,
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM rental_requests WHERE id = $1)")
                        .bind(update.id)
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(if exists {
                    AppError::version_conflict("Rental request", update.id)
                } else {
                    AppError::NotFound(format!("Rental request {} not found", update.id))
                });
            }
        };

        if let Some(ref text) = update.history {
            insert_history(&mut tx, updated.id, text).await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Apply an offer response: entry, agreement, request status, pointer and
    /// history move together or not at all.
    pub async fn rental_requests_record_offer(
        &self,
        commit: OfferCommit,
    ) -> AppResult<Option<RentalAgreement>> {
        let mut tx = self.pool.begin().await?;

        let entry_rows = sqlx::query(
            r#"
            UPDATE rotation_list_entries
            SET asked_date_time = $4, was_asked = TRUE, offer_response = $5,
                offer_response_datetime = $6, offer_refusal_reason = $7,
                offer_response_note = $8, is_force_hire = $9, note = $10,
                version = version + 1
            WHERE id = $1 AND rental_request_id = $2 AND version = $3
            "#,
        )
        .bind(commit.entry_id)
        .bind(commit.request_id)
        .bind(commit.entry_version)
        .bind(commit.asked_date_time)
        .bind(commit.offer_response)
        .bind(commit.offer_response_datetime)
        .bind(&commit.offer_refusal_reason)
        .bind(&commit.offer_response_note)
        .bind(commit.is_force_hire)
        .bind(&commit.note)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if entry_rows == 0 {
            return Err(AppError::version_conflict("Rotation list entry", commit.entry_id));
        }

        let request_rows = sqlx::query(
            r#"
            UPDATE rental_requests
            SET status = $3, first_on_rotation_list = $4, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(commit.request_id)
        .bind(commit.request_version)
        .bind(commit.request_status)
        .bind(commit.first_on_rotation_list)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if request_rows == 0 {
            return Err(AppError::version_conflict("Rental request", commit.request_id));
        }

        let agreement = match commit.agreement {
            Some(ref new_agreement) => {
                let existing: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM rental_agreements WHERE local_area_id = $1 AND fiscal_year = $2",
                )
                .bind(new_agreement.local_area_id)
                .bind(new_agreement.fiscal_year)
                .fetch_one(&mut *tx)
                .await?;

                let number = agreement_number(
                    new_agreement.fiscal_year,
                    new_agreement.local_area_id,
                    existing + 1,
                );

                let query = format!(
                    r#"
                    INSERT INTO rental_agreements (
                        number, equipment_id, project_id, rental_request_id,
                        rotation_list_entry_id, local_area_id, fiscal_year, status,
                        dated_on, estimate_hours, estimate_start_work
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    RETURNING {}
                    "#,
                    AGREEMENT_COLUMNS
                );
                let created = sqlx::query_as::<_, RentalAgreement>(&query)
                    .bind(&number)
                    .bind(new_agreement.equipment_id)
                    .bind(new_agreement.project_id)
                    .bind(commit.request_id)
                    .bind(commit.entry_id)
                    .bind(new_agreement.local_area_id)
                    .bind(new_agreement.fiscal_year)
                    .bind(RentalAgreementStatus::Active)
                    .bind(new_agreement.dated_on)
                    .bind(new_agreement.estimate_hours)
                    .bind(new_agreement.estimate_start_work)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| {
                        map_unique_violation(
                            e,
                            ErrorCode::VersionConflict,
                            "Rental agreement number was taken concurrently, retry",
                        )
                    })?;

                sqlx::query("UPDATE rotation_list_entries SET rental_agreement_id = $1 WHERE id = $2")
                    .bind(created.id)
                    .bind(commit.entry_id)
                    .execute(&mut *tx)
                    .await?;

                Some(created)
            }
            None => None,
        };

        if let Some(ref pointer) = commit.pointer {
            advance_pointer(&mut tx, pointer).await?;
        }

        for text in &commit.history {
            insert_history(&mut tx, commit.request_id, text).await?;
        }

        tx.commit().await?;
        Ok(agreement)
    }

    /// Delete a request and everything it owns
    pub async fn rental_requests_delete(&self, id: i32, expected_version: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let agreements: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rental_agreements WHERE rental_request_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if agreements > 0 {
            return Err(AppError::invariant(
                ErrorCode::AgreementsExist,
                format!("Rental request {} has rental agreements and cannot be cancelled", id),
            ));
        }

        for table in [
            "rental_request_attachments",
            "rental_request_notes",
            "history",
            "rotation_list_entries",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE rental_request_id = $1", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let deleted = sqlx::query("DELETE FROM rental_requests WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::version_conflict("Rental request", id));
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    rental_request_id: i32,
    text: &str,
) -> AppResult<()> {
    sqlx::query("INSERT INTO history (rental_request_id, history_text) VALUES ($1, $2)")
        .bind(rental_request_id)
        .bind(text)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn advance_pointer(
    tx: &mut Transaction<'_, Postgres>,
    pointer: &PointerAdvance,
) -> AppResult<()> {
    match pointer.expected_version {
        Some(version) => {
            let rows = sqlx::query(
                r#"
                UPDATE local_area_rotation_lists
                SET current_block = $4, next_equipment_id = $5, last_asked_equipment_id = $6,
                    version = version + 1
                WHERE local_area_id = $1 AND district_equipment_type_id = $2 AND version = $3
                "#,
            )
            .bind(pointer.local_area_id)
            .bind(pointer.district_equipment_type_id)
            .bind(version)
            .bind(pointer.current_block)
            .bind(pointer.next_equipment_id)
            .bind(pointer.last_asked_equipment_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();

            if rows == 0 {
                return Err(AppError::conflict(
                    ErrorCode::VersionConflict,
                    format!(
                        "Rotation list for local area {} was advanced concurrently, retry",
                        pointer.local_area_id
                    ),
                ));
            }
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO local_area_rotation_lists (
                    local_area_id, district_equipment_type_id, current_block,
                    next_equipment_id, last_asked_equipment_id
                )
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(pointer.local_area_id)
            .bind(pointer.district_equipment_type_id)
            .bind(pointer.current_block)
            .bind(pointer.next_equipment_id)
            .bind(pointer.last_asked_equipment_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    ErrorCode::VersionConflict,
                    "Rotation list was created concurrently, retry",
                )
            })?;
        }
    }
    Ok(())
}
