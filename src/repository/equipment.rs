//! Reference data, equipment and rotation pointer reads on PgRepository

use super::PgRepository;
use crate::{
    error::AppResult,
    models::{District, DistrictEquipmentType, Equipment, LocalArea, LocalAreaRotationList},
};

pub(crate) const EQUIPMENT_SELECT: &str = r#"
    SELECT e.id, e.equipment_code, e.owner_id, e.local_area_id, e.district_equipment_type_id,
           e.status, e.received_date, e.years_of_service,
           e.service_hours_last_year, e.service_hours_two_years_ago,
           e.service_hours_three_years_ago,
           COALESCE(o.years_registered, 0::double precision) AS owner_years_registered,
           e.seniority, e.block_number, e.block_position, e.number_of_blocks,
           e.seniority_fiscal_year, e.version
    FROM equipment e
    LEFT JOIN owners o ON o.id = e.owner_id
"#;

impl PgRepository {
    // ---- Districts and local areas ----

    pub async fn districts_get(&self, id: i32) -> AppResult<Option<District>> {
        let row = sqlx::query_as::<_, District>("SELECT id, name FROM districts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn local_areas_get(&self, id: i32) -> AppResult<Option<LocalArea>> {
        let row = sqlx::query_as::<_, LocalArea>(
            "SELECT id, district_id, name FROM local_areas WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Local areas of a district in checkpoint order
    pub async fn local_areas_list(&self, district_id: i32) -> AppResult<Vec<LocalArea>> {
        let rows = sqlx::query_as::<_, LocalArea>(
            "SELECT id, district_id, name FROM local_areas WHERE district_id = $1 ORDER BY id",
        )
        .bind(district_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn equipment_types_get(&self, id: i32) -> AppResult<Option<DistrictEquipmentType>> {
        let row = sqlx::query_as::<_, DistrictEquipmentType>(
            r#"
            SELECT d.id, d.district_id, d.equipment_type_id, d.name,
                   t.number_of_blocks, t.is_dump_truck
            FROM district_equipment_types d
            JOIN equipment_types t ON t.id = d.equipment_type_id
            WHERE d.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ---- Equipment ----

    pub async fn equipment_list_for_pair(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Vec<Equipment>> {
        let query = format!(
            "{} WHERE e.local_area_id = $1 AND e.district_equipment_type_id = $2 ORDER BY e.id",
            EQUIPMENT_SELECT
        );
        let rows = sqlx::query_as::<_, Equipment>(&query)
            .bind(local_area_id)
            .bind(district_equipment_type_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn equipment_list_for_local_area(&self, local_area_id: i32) -> AppResult<Vec<Equipment>> {
        let query = format!(
            "{} WHERE e.local_area_id = $1 ORDER BY e.district_equipment_type_id, e.id",
            EQUIPMENT_SELECT
        );
        let rows = sqlx::query_as::<_, Equipment>(&query)
            .bind(local_area_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ---- Rotation pointer ----

    pub async fn rotation_pointer_get(
        &self,
        local_area_id: i32,
        district_equipment_type_id: i32,
    ) -> AppResult<Option<LocalAreaRotationList>> {
        let row = sqlx::query_as::<_, LocalAreaRotationList>(
            r#"
            SELECT id, local_area_id, district_equipment_type_id, current_block,
                   next_equipment_id, last_asked_equipment_id, version
            FROM local_area_rotation_lists
            WHERE local_area_id = $1 AND district_equipment_type_id = $2
            "#,
        )
        .bind(local_area_id)
        .bind(district_equipment_type_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
