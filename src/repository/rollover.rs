//! District rollover status and checkpoint persistence on PgRepository

use chrono::Utc;
use sqlx::types::Json;

use super::{LocalAreaBatch, PgRepository, RolloverKickoff};
use crate::{
    error::{AppError, AppResult},
    models::{DistrictRolloverStatus, RolloverProgress},
};

const STATUS_COLUMNS: &str = r#"
    district_id, current_fiscal_year, next_fiscal_year, progress_percentage,
    display_rollover_message, rollover_start_date, rollover_end_date
"#;

const PROGRESS_COLUMNS: &str = r#"
    district_id, target_fiscal_year, progress_percentage, last_processed_local_area_id,
    scoring_rules, job_id, last_error, updated_at
"#;

impl PgRepository {
    pub async fn rollover_get_status(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        let query = format!(
            "SELECT {} FROM district_rollover_status WHERE district_id = $1",
            STATUS_COLUMNS
        );
        let row = sqlx::query_as::<_, DistrictRolloverStatus>(&query)
            .bind(district_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn rollover_get_progress(&self, district_id: i32) -> AppResult<Option<RolloverProgress>> {
        let query = format!(
            "SELECT {} FROM rollover_progress WHERE district_id = $1",
            PROGRESS_COLUMNS
        );
        let row = sqlx::query_as::<_, RolloverProgress>(&query)
            .bind(district_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn rollover_list_unfinished(&self) -> AppResult<Vec<RolloverProgress>> {
        let query = format!(
            "SELECT {} FROM rollover_progress WHERE target_fiscal_year IS NOT NULL ORDER BY district_id",
            PROGRESS_COLUMNS
        );
        let rows = sqlx::query_as::<_, RolloverProgress>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Write the kickoff state: a fresh checkpoint, or the job id on a resume
    pub async fn rollover_begin(&self, kickoff: RolloverKickoff) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        if kickoff.resume {
            sqlx::query(
                r#"
                UPDATE rollover_progress
                SET job_id = $2, last_error = NULL, updated_at = $3
                WHERE district_id = $1
                "#,
            )
            .bind(kickoff.district_id)
            .bind(kickoff.job_id)
            .bind(kickoff.started_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE district_rollover_status
                SET progress_percentage = GREATEST(COALESCE(progress_percentage, 1), 1),
                    display_rollover_message = FALSE, rollover_end_date = NULL
                WHERE district_id = $1
                "#,
            )
            .bind(kickoff.district_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO rollover_progress (
                    district_id, target_fiscal_year, progress_percentage,
                    last_processed_local_area_id, scoring_rules, job_id, last_error, updated_at
                )
                VALUES ($1, $2, 1, NULL, $3, $4, NULL, $5)
                ON CONFLICT (district_id) DO UPDATE
                SET target_fiscal_year = EXCLUDED.target_fiscal_year,
                    progress_percentage = 1,
                    last_processed_local_area_id = NULL,
                    scoring_rules = EXCLUDED.scoring_rules,
                    job_id = EXCLUDED.job_id,
                    last_error = NULL,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(kickoff.district_id)
            .bind(kickoff.target_fiscal_year)
            .bind(Json(&kickoff.scoring_rules))
            .bind(kickoff.job_id)
            .bind(kickoff.started_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE district_rollover_status
                SET progress_percentage = 1, display_rollover_message = FALSE,
                    rollover_start_date = $2, rollover_end_date = NULL
                WHERE district_id = $1
                "#,
            )
            .bind(kickoff.district_id)
            .bind(kickoff.started_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Commit one local area's assignments together with the checkpoint
    pub async fn rollover_save_batch(&self, batch: LocalAreaBatch) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for assignment in &batch.assignments {
            let rows = sqlx::query(
                r#"
                UPDATE equipment
                SET seniority = $3, block_number = $4, block_position = $5,
                    number_of_blocks = $6, seniority_fiscal_year = $7, version = version + 1
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(assignment.equipment_id)
            .bind(assignment.expected_version)
            .bind(assignment.seniority)
            .bind(assignment.block_number)
            .bind(assignment.block_position)
            .bind(assignment.number_of_blocks)
            .bind(batch.fiscal_year)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows == 0 {
                return Err(AppError::version_conflict("Equipment", assignment.equipment_id));
            }
        }

        sqlx::query(
            r#"
            UPDATE rollover_progress
            SET last_processed_local_area_id = $2, progress_percentage = $3, updated_at = $4
            WHERE district_id = $1
            "#,
        )
        .bind(batch.district_id)
        .bind(batch.local_area_id)
        .bind(batch.progress_percentage)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE district_rollover_status SET progress_percentage = $2 WHERE district_id = $1",
        )
        .bind(batch.district_id)
        .bind(batch.progress_percentage)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn rollover_complete(
        &self,
        district_id: i32,
        target_fiscal_year: i32,
    ) -> AppResult<DistrictRolloverStatus> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let query = format!(
            r#"
            UPDATE district_rollover_status
            SET current_fiscal_year = $2, next_fiscal_year = $2 + 1,
                progress_percentage = 100, display_rollover_message = TRUE,
                rollover_end_date = $3
            WHERE district_id = $1
            RETURNING {}
            "#,
            STATUS_COLUMNS
        );
        let status = sqlx::query_as::<_, DistrictRolloverStatus>(&query)
            .bind(district_id)
            .bind(target_fiscal_year)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Rollover status for district {} not found", district_id))
            })?;

        sqlx::query(
            r#"
            UPDATE rollover_progress
            SET target_fiscal_year = NULL, progress_percentage = 100,
                last_processed_local_area_id = NULL, job_id = NULL, last_error = NULL,
                updated_at = $2
            WHERE district_id = $1
            "#,
        )
        .bind(district_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(status)
    }

    pub async fn rollover_record_failure(&self, district_id: i32, message: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE rollover_progress
            SET last_error = $2, job_id = NULL, updated_at = $3
            WHERE district_id = $1
            "#,
        )
        .bind(district_id)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn rollover_dismiss_message(
        &self,
        district_id: i32,
    ) -> AppResult<Option<DistrictRolloverStatus>> {
        let mut tx = self.pool.begin().await?;

        let dismissed = sqlx::query(
            r#"
            UPDATE district_rollover_status
            SET progress_percentage = NULL, display_rollover_message = FALSE
            WHERE district_id = $1 AND display_rollover_message AND progress_percentage = 100
            "#,
        )
        .bind(district_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if dismissed > 0 {
            sqlx::query(
                "UPDATE rollover_progress SET progress_percentage = NULL WHERE district_id = $1",
            )
            .bind(district_id)
            .execute(&mut *tx)
            .await?;
        }

        let query = format!(
            "SELECT {} FROM district_rollover_status WHERE district_id = $1",
            STATUS_COLUMNS
        );
        let status = sqlx::query_as::<_, DistrictRolloverStatus>(&query)
            .bind(district_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(status)
    }
}
