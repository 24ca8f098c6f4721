use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::errors::ValidationError;
use super::value_objects::{Delivery, Item, Payment};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The order header plus its co-owned delivery, payment and line items.
// The same JSON shape is accepted over HTTP, returned on reads and
// published as the change notification payload.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    pub customer_id: String,
    #[serde(default)]
    pub delivery_service: String,
    #[serde(default)]
    pub shardkey: String,
    #[serde(default)]
    pub sm_id: i64,
    /// Microsecond precision, the same as the `TIMESTAMPTZ` column.
    #[serde(default = "now_micros", deserialize_with = "deserialize_micros")]
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub oof_shard: String,
}

impl Order {
    /// Drop sub-microsecond precision the store can't keep, so the cached
    /// copy and the stored row compare equal.
    pub fn truncate_timestamps(&mut self) {
        self.date_created = truncate_micros(self.date_created);
    }

    /// Check the aggregate before it is allowed anywhere near the store.
    /// Reports the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("order_uid", &self.order_uid)?;
        require("track_number", &self.track_number)?;
        require("entry", &self.entry)?;
        require("customer_id", &self.customer_id)?;

        let d = &self.delivery;
        require("delivery.name", &d.name)?;
        require("delivery.phone", &d.phone)?;
        require("delivery.zip", &d.zip)?;
        require("delivery.city", &d.city)?;
        require("delivery.address", &d.address)?;
        require("delivery.region", &d.region)?;
        require("delivery.email", &d.email)?;

        let p = &self.payment;
        require("payment.transaction", &p.transaction)?;
        require("payment.currency", &p.currency)?;
        require("payment.provider", &p.provider)?;
        require("payment.bank", &p.bank)?;
        non_negative("payment.amount", p.amount)?;
        non_negative("payment.delivery_cost", p.delivery_cost)?;
        non_negative("payment.goods_total", p.goods_total)?;
        non_negative("payment.custom_fee", p.custom_fee)?;

        if self.items.is_empty() {
            return Err(ValidationError::EmptyItems);
        }

        for (i, item) in self.items.iter().enumerate() {
            let field = |name: &str| format!("items[{}].{}", i, name);
            require(&field("track_number"), &item.track_number)?;
            require(&field("rid"), &item.rid)?;
            require(&field("name"), &item.name)?;
            require(&field("size"), &item.size)?;
            require(&field("brand"), &item.brand)?;
            non_negative(&field("price"), item.price)?;
            non_negative(&field("sale"), item.sale)?;
            non_negative(&field("total_price"), item.total_price)?;
        }

        Ok(())
    }
}

/// Postgres rounds finer timestamps; truncating first keeps the value stable.
pub fn truncate_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

fn now_micros() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

fn deserialize_micros<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    DateTime::<Utc>::deserialize(deserializer).map(truncate_micros)
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

fn non_negative(field: &str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
