//! Status enums and fixed vocabularies for store documents.
//!
//! The serde renames on these enums pin the exact strings the UI writes
//! into and reads out of the primary store. They are a wire contract, not
//! a style choice - changing one silently orphans existing documents.

use serde::{Deserialize, Serialize};

/// Caller role, carried both as an identity-provider claim and on the
/// user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperAdmin => write!(f, "SUPER_ADMIN"),
            Self::Admin => write!(f, "ADMIN"),
            Self::Client => write!(f, "CLIENT"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(Self::SuperAdmin),
            "ADMIN" => Ok(Self::Admin),
            "CLIENT" => Ok(Self::Client),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// Product category. The counts document keeps one counter per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    Clothing,
    Shoes,
    Watches,
    Accessories,
}

impl ProductCategory {
    /// Every known category, in counts-document field order.
    pub const ALL: [Self; 4] = [Self::Clothing, Self::Shoes, Self::Watches, Self::Accessories];

    /// The category's counts-document field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clothing => "Clothing",
            Self::Shoes => "Shoes",
            Self::Watches => "Watches",
            Self::Accessories => "Accessories",
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Processing,
    Success,
    Refund,
}

/// Shipment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    New,
    Preparing,
    Shipped,
    Delivered,
    Cancel,
}

/// Whether an order was a one-off charge or part of a subscription chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Onetime,
    Subscription,
}

/// Recurring billing interval supported for subscription products.
///
/// One remote price object is provisioned per interval at product-creation
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
}

impl BillingInterval {
    /// Every supported interval, in provisioning order.
    pub const ALL: [Self; 3] = [Self::Day, Self::Week, Self::Month];

    /// The interval name used both as the gateway's interval value and as
    /// the key in the product's `subscription` map.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote-provisioning state of a product (saga marker).
///
/// A product is written to the store before its gateway product/price
/// objects exist; it stays `Pending` until every billing interval has a
/// price id attached, at which point the reconciler marks it `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningStatus {
    #[default]
    Pending,
    Complete,
}

impl ProvisioningStatus {
    /// The store-level string value, usable in field queries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        assert_eq!(
            serde_json::to_string(&Role::SuperAdmin).expect("serialize"),
            "\"SUPER_ADMIN\""
        );
        assert_eq!("CLIENT".parse::<Role>(), Ok(Role::Client));
        assert!("client".parse::<Role>().is_err());
    }

    #[test]
    fn test_category_wire_format() {
        assert_eq!(
            serde_json::to_string(&ProductCategory::Shoes).expect("serialize"),
            "\"Shoes\""
        );
        for category in ProductCategory::ALL {
            let json = serde_json::to_string(&category).expect("serialize");
            assert_eq!(json, format!("\"{category}\""));
        }
    }

    #[test]
    fn test_statuses_wire_format() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Processing).expect("serialize"),
            "\"Processing\""
        );
        assert_eq!(
            serde_json::to_string(&ShipmentStatus::New).expect("serialize"),
            "\"New\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentType::Onetime).expect("serialize"),
            "\"ONETIME\""
        );
        assert_eq!(
            serde_json::to_string(&BillingInterval::Month).expect("serialize"),
            "\"month\""
        );
    }
}
