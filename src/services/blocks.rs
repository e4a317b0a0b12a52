//! Block partitioner
//!
//! Deals seniority-ranked equipment round-robin into `N` blocks: rank 1 to
//! block 1, rank 2 to block 2, ..., rank N+1 back to block 1. Seniority order
//! is preserved inside each block and block sizes differ by at most one.

use crate::{
    error::{AppError, AppResult},
    models::SeniorityAssignment,
};

use super::seniority::RankedEquipment;

/// Assign each ranked equipment its block and position within the block.
///
/// `ranked` must already be in rank order (as returned by
/// [`super::seniority::rank`]).
pub fn partition(
    ranked: &[RankedEquipment],
    number_of_blocks: i32,
) -> AppResult<Vec<SeniorityAssignment>> {
    if number_of_blocks < 1 {
        return Err(AppError::Configuration(format!(
            "number_of_blocks must be at least 1, got {}",
            number_of_blocks
        )));
    }

    Ok(ranked
        .iter()
        .map(|item| {
            let slot = item.rank - 1;
            SeniorityAssignment {
                equipment_id: item.equipment_id,
                expected_version: item.expected_version,
                seniority: item.seniority,
                rank: item.rank,
                block_number: slot % number_of_blocks + 1,
                block_position: slot / number_of_blocks + 1,
                number_of_blocks,
            }
        })
        .collect())
}
