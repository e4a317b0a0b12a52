//! Shared domain enums, persisted as SMALLINT codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Unknown SMALLINT code read back from storage
#[derive(Debug, Error)]
#[error("invalid {kind} code {value}")]
pub struct InvalidCode {
    pub kind: &'static str,
    pub value: i16,
}

/// Implements the Postgres SMALLINT codec for an enum with `TryFrom<i16>`
/// and `From<Enum> for i16`.
macro_rules! smallint_codec {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <i16 as sqlx::Type<sqlx::Postgres>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let code = <i16 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok($name::try_from(code)?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <i16 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&i16::from(*self), buf)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// EquipmentStatus
// ---------------------------------------------------------------------------

/// Registration status of a piece of hired equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum EquipmentStatus {
    Approved = 1,
    Pending = 2,
    Archived = 3,
    Retired = 4,
}

impl EquipmentStatus {
    /// Archived and retired equipment take no part in seniority or rotation
    pub fn is_active(self) -> bool {
        matches!(self, EquipmentStatus::Approved | EquipmentStatus::Pending)
    }
}

impl TryFrom<i16> for EquipmentStatus {
    type Error = InvalidCode;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(EquipmentStatus::Approved),
            2 => Ok(EquipmentStatus::Pending),
            3 => Ok(EquipmentStatus::Archived),
            4 => Ok(EquipmentStatus::Retired),
            value => Err(InvalidCode {
                kind: "equipment status",
                value,
            }),
        }
    }
}

impl From<EquipmentStatus> for i16 {
    fn from(s: EquipmentStatus) -> Self {
        s as i16
    }
}

smallint_codec!(EquipmentStatus);

// ---------------------------------------------------------------------------
// RentalRequestStatus
// ---------------------------------------------------------------------------

/// Rental request lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RentalRequestStatus {
    New = 0,
    InProgress = 1,
    Complete = 2,
    Cancelled = 3,
}

impl TryFrom<i16> for RentalRequestStatus {
    type Error = InvalidCode;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RentalRequestStatus::New),
            1 => Ok(RentalRequestStatus::InProgress),
            2 => Ok(RentalRequestStatus::Complete),
            3 => Ok(RentalRequestStatus::Cancelled),
            value => Err(InvalidCode {
                kind: "rental request status",
                value,
            }),
        }
    }
}

impl From<RentalRequestStatus> for i16 {
    fn from(s: RentalRequestStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for RentalRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RentalRequestStatus::New => "New",
            RentalRequestStatus::InProgress => "In Progress",
            RentalRequestStatus::Complete => "Complete",
            RentalRequestStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", label)
    }
}

smallint_codec!(RentalRequestStatus);

// ---------------------------------------------------------------------------
// OfferResponse
// ---------------------------------------------------------------------------

/// Owner's answer to a rotation offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum OfferResponse {
    Yes = 1,
    No = 2,
}

impl TryFrom<i16> for OfferResponse {
    type Error = InvalidCode;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(OfferResponse::Yes),
            2 => Ok(OfferResponse::No),
            value => Err(InvalidCode {
                kind: "offer response",
                value,
            }),
        }
    }
}

impl From<OfferResponse> for i16 {
    fn from(r: OfferResponse) -> Self {
        r as i16
    }
}

smallint_codec!(OfferResponse);

// ---------------------------------------------------------------------------
// RentalAgreementStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RentalAgreementStatus {
    Active = 1,
    Complete = 2,
}

impl TryFrom<i16> for RentalAgreementStatus {
    type Error = InvalidCode;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(RentalAgreementStatus::Active),
            2 => Ok(RentalAgreementStatus::Complete),
            value => Err(InvalidCode {
                kind: "rental agreement status",
                value,
            }),
        }
    }
}

impl From<RentalAgreementStatus> for i16 {
    fn from(s: RentalAgreementStatus) -> Self {
        s as i16
    }
}

smallint_codec!(RentalAgreementStatus);
