//! Data models for HETS

pub mod district;
pub mod enums;
pub mod equipment;
pub mod rental_request;
pub mod rollover;
pub mod rotation;

// Re-export commonly used types
pub use district::{District, DistrictEquipmentType, LocalArea};
pub use enums::{EquipmentStatus, OfferResponse, RentalAgreementStatus, RentalRequestStatus};
pub use equipment::{Equipment, SeniorityAssignment};
pub use rental_request::{
    CreateRentalRequest, HistoryRecord, RecordOfferResponse, RentalAgreement, RentalRequest,
    RentalRequestAttachment, RentalRequestDetails, RentalRequestNote, RotationListEntry,
    UpdateRentalRequest,
};
pub use rollover::{DistrictRolloverStatus, RolloverProgress, RolloverStarted, RolloverStatusView};
pub use rotation::LocalAreaRotationList;
