//! Order status enums and the transition rules between them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fulfillment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    Disputed,
    Refunded,
}

/// Who is requesting a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Seller driving fulfillment through the status endpoint
    Seller,
    /// Buyer confirming receipt or opening a dispute
    Buyer,
    /// Payment gateway outcome (approval, refund, chargeback)
    Gateway,
    /// Release scheduler auto-confirmation
    Scheduler,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        Self::Pending,
        Self::Confirmed,
        Self::Preparing,
        Self::Ready,
        Self::Shipped,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
        Self::Disputed,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Next statuses reachable through the seller-facing fulfillment table
    pub fn fulfillment_targets(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[Shipped],
            Shipped => &[Delivered],
            _ => &[],
        }
    }

    /// Whether the buyer may confirm receipt in this status
    pub fn accepts_delivery_confirmation(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered | Self::Ready)
    }

    /// Whether the item has left the seller, as far as disputes and
    /// auto-confirmation are concerned
    pub fn is_in_transit_or_delivered(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered | Self::OutForDelivery)
    }

    /// Terminal states never move again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Single source of truth for every status change.
    ///
    /// The seller table covers normal fulfillment. Buyers may only confirm
    /// receipt or open a dispute. Gateway outcomes confirm a pending order on
    /// approval, cancel it on a rejected card payment, and can terminate any
    /// non-terminal order with a refund. The scheduler only auto-confirms
    /// shipped orders.
    pub fn can_transition(&self, to: OrderStatus, actor: Actor) -> bool {
        use OrderStatus::*;
        if *self == to {
            return false;
        }
        match actor {
            Actor::Seller => self.fulfillment_targets().contains(&to),
            Actor::Buyer => match to {
                Delivered => matches!(self, Shipped | Ready),
                Disputed => self.is_in_transit_or_delivered(),
                _ => false,
            },
            Actor::Gateway => match to {
                Confirmed | Cancelled => *self == Pending,
                Refunded => !self.is_terminal(),
                _ => false,
            },
            Actor::Scheduler => matches!((self, to), (Shipped, Delivered)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of an order as known to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Ordering used to reject stale notifications
    pub fn priority(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Paid => 1,
            Self::Failed => 2,
            Self::Refunded => 3,
        }
    }

    /// Whether a notification carrying `next` may replace `self`.
    ///
    /// Refunded is terminal and always wins over anything else. Once paid,
    /// only a refund can follow. A failed attempt may still be followed by a
    /// paid one (a regenerated PIX). Otherwise priority must strictly increase.
    pub fn superseded_by(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, next) {
            (a, b) if *a == b => false,
            (Refunded, _) => false,
            (_, Refunded) => true,
            (Paid, _) => false,
            (Failed, Paid) => true,
            (a, b) => b.priority() > a.priority(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escrow state of the seller's share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitStatus {
    #[default]
    Pending,
    Held,
    Released,
    Refunded,
    Chargedback,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Refund issued, waiting for manual review
    Open,
    Resolved,
}
