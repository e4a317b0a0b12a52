//! Rotation queue builder and advancer
//!
//! Block order is `(block_number, block_position)`; equipment that has no
//! block yet (registered after the last rollover) follows every block,
//! by seniority.

use std::cmp::Ordering;

use crate::{
    models::{Equipment, EquipmentStatus, LocalAreaRotationList},
    repository::NewRotationEntry,
};

use super::seniority::compare_seniority;

fn compare_block_order(a: &Equipment, b: &Equipment) -> Ordering {
    match (a.block_number, b.block_number) {
        (Some(block_a), Some(block_b)) => block_a
            .cmp(&block_b)
            .then_with(|| a.block_position.cmp(&b.block_position))
            .then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_seniority(
            (a.seniority.unwrap_or(0.0), a.received_date, a.id),
            (b.seniority.unwrap_or(0.0), b.received_date, b.id),
        ),
    }
}

/// Sort equipment into block order
pub fn rotation_order(equipment: &[Equipment]) -> Vec<&Equipment> {
    let mut ordered: Vec<&Equipment> = equipment.iter().collect();
    ordered.sort_by(|a, b| compare_block_order(a, b));
    ordered
}

/// Index the walk starts at: the pointer's next equipment, else the one
/// after the last asked, else the first equipment in the pointer's block or
/// later, else the top of block 1.
fn start_index(ordered: &[&Equipment], pointer: Option<&LocalAreaRotationList>) -> usize {
    let pointer = match pointer {
        Some(p) => p,
        None => return 0,
    };
    let position = |id: Option<i32>| id.and_then(|id| ordered.iter().position(|e| e.id == id));

    if let Some(index) = position(pointer.next_equipment_id) {
        return index;
    }
    if let Some(index) = position(pointer.last_asked_equipment_id) {
        return (index + 1) % ordered.len();
    }

    pointer
        .current_block
        .and_then(|block| {
            ordered
                .iter()
                .position(|e| e.block_number.map_or(false, |b| b >= block))
        })
        .unwrap_or(0)
}

/// Build the full offer order for a new rental request.
///
/// Walks every equipment of the pair in block order from the pointer,
/// wrapping once, and emits each Approved piece exactly once. Equipment in
/// any other status still holds its place in the order so the pointer can
/// name it.
pub fn build_queue(
    equipment: &[Equipment],
    pointer: Option<&LocalAreaRotationList>,
) -> Vec<NewRotationEntry> {
    let ordered = rotation_order(equipment);
    if ordered.is_empty() {
        return Vec::new();
    }

    let start = start_index(&ordered, pointer);
    ordered
        .iter()
        .cycle()
        .skip(start)
        .take(ordered.len())
        .filter(|e| e.status == EquipmentStatus::Approved)
        .enumerate()
        .map(|(index, e)| NewRotationEntry {
            equipment_id: e.id,
            block_number: e.block_number,
            rotation_list_sort_order: index as i32 + 1,
        })
        .collect()
}

/// Pointer position after equipment `answered_id` responded
#[derive(Debug, Clone, PartialEq)]
pub struct NextInRotation {
    pub next_equipment_id: i32,
    pub current_block: Option<i32>,
}

/// The first Approved equipment after `answered_id` in block order, wrapping
/// to the top of block 1. The answered equipment keeps its place whatever
/// its current status. `None` when `answered_id` is not in the pair or
/// nothing is Approved, in which case the pointer stays where it is.
pub fn next_after(equipment: &[Equipment], answered_id: i32) -> Option<NextInRotation> {
    let ordered = rotation_order(equipment);
    let index = ordered.iter().position(|e| e.id == answered_id)?;

    (1..=ordered.len())
        .map(|step| ordered[(index + step) % ordered.len()])
        .find(|e| e.status == EquipmentStatus::Approved)
        .map(|next| NextInRotation {
            next_equipment_id: next.id,
            current_block: next.block_number,
        })
}
