//! Stock movements and the alert rule evaluated on each of them.

use chrono::{DateTime, Utc};
use common::{MovementId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Direction class of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Stock returned or received.
    In,
    /// Stock sold or removed.
    Out,
    /// Manual correction to an absolute level; may go either way.
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(DomainError::UnknownValue {
                kind: "movement type",
                value: other.to_string(),
            }),
        }
    }
}

/// A product and a quantity, the unit of work for ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A stock change that has not been written yet.
///
/// `delta` is signed: negative values remove stock. The datastore applies a
/// negative delta only if enough stock remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub delta: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub performed_by: Option<String>,
}

impl MovementRequest {
    /// Stock leaving the shelf.
    pub fn outbound(product_id: ProductId, quantity: u32, reason: impl Into<String>) -> Self {
        Self {
            product_id,
            movement_type: MovementType::Out,
            delta: -i64::from(quantity),
            reason: reason.into(),
            reference: None,
            performed_by: None,
        }
    }

    /// Stock coming back.
    pub fn inbound(product_id: ProductId, quantity: u32, reason: impl Into<String>) -> Self {
        Self {
            product_id,
            movement_type: MovementType::In,
            delta: i64::from(quantity),
            reason: reason.into(),
            reference: None,
            performed_by: None,
        }
    }

    /// A correction by a signed amount.
    pub fn adjustment(product_id: ProductId, delta: i64, reason: impl Into<String>) -> Self {
        Self {
            product_id,
            movement_type: MovementType::Adjustment,
            delta,
            reason: reason.into(),
            reference: None,
            performed_by: None,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn performed_by(mut self, performed_by: Option<String>) -> Self {
        self.performed_by = performed_by;
        self
    }

    /// Checks that the delta is non-zero and agrees with the movement type.
    pub fn validate(&self) -> Result<(), DomainError> {
        let consistent = match self.movement_type {
            MovementType::In => self.delta > 0,
            MovementType::Out => self.delta < 0,
            MovementType::Adjustment => self.delta != 0,
        };
        if consistent {
            Ok(())
        } else {
            Err(DomainError::EmptyMovement {
                product: self.product_id.to_string(),
            })
        }
    }

    /// Builds the immutable record once the datastore has applied the change.
    pub fn into_movement(self, stock_before: i64, created_at: DateTime<Utc>) -> StockMovement {
        StockMovement {
            id: MovementId::new(),
            product_id: self.product_id,
            movement_type: self.movement_type,
            quantity: self.delta.unsigned_abs(),
            stock_before,
            stock_after: stock_before + self.delta,
            reason: self.reason,
            reference: self.reference,
            performed_by: self.performed_by,
            created_at,
        }
    }
}

/// One append-only entry of the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    /// Always positive; direction comes from the type or the before/after pair.
    pub quantity: u64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub performed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// The change this movement made to stock, with its sign.
    pub fn signed_quantity(&self) -> i64 {
        let quantity = self.quantity as i64;
        match self.movement_type {
            MovementType::In => quantity,
            MovementType::Out => -quantity,
            MovementType::Adjustment => {
                if self.stock_after >= self.stock_before {
                    quantity
                } else {
                    -quantity
                }
            }
        }
    }
}

/// Kind of alert raised by a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockAlertKind {
    LowStock,
    OutOfStock,
}

impl StockAlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockAlertKind::LowStock => "low_stock",
            StockAlertKind::OutOfStock => "out_of_stock",
        }
    }
}

/// Decides whether moving from `previous` to `current` crosses into an alert band.
///
/// Alerts only fire on the crossing edge, so repeated decrements inside the
/// low band stay quiet until stock climbs back above the threshold.
pub fn evaluate_alert(previous: i64, current: i64, threshold: i64) -> Option<StockAlertKind> {
    if current <= 0 && previous > 0 {
        Some(StockAlertKind::OutOfStock)
    } else if previous > threshold && current > 0 && current <= threshold {
        Some(StockAlertKind::LowStock)
    } else {
        None
    }
}
