//! Denormalized counts documents and their arithmetic.
//!
//! Each entity collection has a singleton counts document projecting its
//! totals; the product one also keeps a counter per category. The documents
//! are lazily created by the first entity's reaction and never deleted.
//! All decrements clamp at zero - a counter that would go negative is a
//! symptom of replayed or re-ordered events, not a reason to corrupt the
//! projection.

use serde::{Deserialize, Serialize};

use crate::types::ProductCategory;

/// Subtract with a floor of zero.
#[must_use]
pub const fn clamped_sub(current: u64, delta: u64) -> u64 {
    current.saturating_sub(delta)
}

/// The `product-counts/counts` document: an overall total plus one counter
/// per category. Invariant at rest: `all == sum(category counters)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCounts {
    #[serde(rename = "All")]
    pub all: u64,
    #[serde(rename = "Clothing")]
    pub clothing: u64,
    #[serde(rename = "Shoes")]
    pub shoes: u64,
    #[serde(rename = "Watches")]
    pub watches: u64,
    #[serde(rename = "Accessories")]
    pub accessories: u64,
}

impl ProductCounts {
    /// The counts document created by the first product's reaction: every
    /// field zero except the new product's category and the total.
    #[must_use]
    pub fn bootstrap(category: ProductCategory) -> Self {
        let mut counts = Self {
            all: 1,
            clothing: 0,
            shoes: 0,
            watches: 0,
            accessories: 0,
        };
        *counts.category_mut(category) = 1;
        counts
    }

    /// Record a product creation.
    #[must_use]
    pub fn created(mut self, category: ProductCategory) -> Self {
        self.all += 1;
        *self.category_mut(category) += 1;
        self
    }

    /// Record a product deletion. `All` and the category clamp at zero.
    #[must_use]
    pub fn deleted(mut self, category: ProductCategory) -> Self {
        self.all = clamped_sub(self.all, 1);
        let slot = self.category_mut(category);
        *slot = clamped_sub(*slot, 1);
        self
    }

    /// Record a category reassignment: the old category loses one, the new
    /// gains one, `All` is untouched.
    #[must_use]
    pub fn category_changed(mut self, from: ProductCategory, to: ProductCategory) -> Self {
        let old = self.category_mut(from);
        *old = clamped_sub(*old, 1);
        *self.category_mut(to) += 1;
        self
    }

    /// Counter for one category.
    #[must_use]
    pub const fn category(&self, category: ProductCategory) -> u64 {
        match category {
            ProductCategory::Clothing => self.clothing,
            ProductCategory::Shoes => self.shoes,
            ProductCategory::Watches => self.watches,
            ProductCategory::Accessories => self.accessories,
        }
    }

    /// Sum of the per-category counters (the at-rest value of `All`).
    #[must_use]
    pub const fn category_sum(&self) -> u64 {
        self.clothing + self.shoes + self.watches + self.accessories
    }

    const fn category_mut(&mut self, category: ProductCategory) -> &mut u64 {
        match category {
            ProductCategory::Clothing => &mut self.clothing,
            ProductCategory::Shoes => &mut self.shoes,
            ProductCategory::Watches => &mut self.watches,
            ProductCategory::Accessories => &mut self.accessories,
        }
    }
}

/// The `order-counts/counts` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCounts {
    #[serde(rename = "orderCounts")]
    pub order_counts: u64,
}

/// The `user-counts/counts` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    #[serde(rename = "userCounts")]
    pub user_counts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductCategory::{Accessories, Clothing, Shoes, Watches};

    #[test]
    fn test_bootstrap_first_product() {
        let counts = ProductCounts::bootstrap(Shoes);
        assert_eq!(
            counts,
            ProductCounts {
                all: 1,
                clothing: 0,
                shoes: 1,
                watches: 0,
                accessories: 0
            }
        );
    }

    #[test]
    fn test_create_delete_sequences_floor_at_zero() {
        // N creates then M deletes leaves All = max(0, N - M)
        let mut counts = ProductCounts::bootstrap(Clothing);
        for _ in 0..2 {
            counts = counts.created(Clothing);
        }
        for _ in 0..5 {
            counts = counts.deleted(Clothing);
        }
        assert_eq!(counts.all, 0);
        assert_eq!(counts.clothing, 0);
    }

    #[test]
    fn test_category_change_preserves_all() {
        let counts = ProductCounts::bootstrap(Watches)
            .created(Accessories)
            .category_changed(Watches, Shoes);
        assert_eq!(counts.all, 2);
        assert_eq!(counts.watches, 0);
        assert_eq!(counts.shoes, 1);
        assert_eq!(counts.category_sum(), counts.all);
    }

    #[test]
    fn test_counts_wire_field_names() {
        let json = serde_json::to_value(ProductCounts::bootstrap(Shoes)).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "All": 1, "Clothing": 0, "Shoes": 1, "Watches": 0, "Accessories": 0
            })
        );

        let orders = serde_json::to_value(OrderCounts { order_counts: 3 }).expect("serialize");
        assert_eq!(orders, serde_json::json!({ "orderCounts": 3 }));

        let users = serde_json::to_value(UserCounts { user_counts: 7 }).expect("serialize");
        assert_eq!(users, serde_json::json!({ "userCounts": 7 }));
    }
}
