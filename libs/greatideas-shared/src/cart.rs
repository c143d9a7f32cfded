//! Session cart: a map of `cart_key -> CartEntry`.
//!
//! The key encodes the full combination (item, variant, add-ons) so that adding the
//! same combination twice merges into one line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Upper bound for one cart line.
pub const MAX_LINE_QUANTITY: i64 = 99;

pub fn is_valid_quantity(quantity: i64) -> bool {
    (1..=MAX_LINE_QUANTITY).contains(&quantity)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub item_id: i64,
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub addon_ids: Vec<i64>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    entries: BTreeMap<String, CartEntry>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CartDataError {
    #[error("cart data must be a JSON object")]
    NotAnObject,
    #[error("cart is empty")]
    Empty,
}

/// `item` + `_v{variant}` + `_a{addon ids sorted as strings, joined by "_"}`.
pub fn cart_key(item_id: i64, variant_id: Option<i64>, addon_ids: &[i64]) -> String {
    let mut key = item_id.to_string();
    if let Some(v) = variant_id {
        key.push_str(&format!("_v{}", v));
    }
    if !addon_ids.is_empty() {
        let mut ids: Vec<String> = addon_ids.iter().map(|id| id.to_string()).collect();
        ids.sort();
        key.push_str(&format!("_a{}", ids.join("_")));
    }
    key
}

/// Inverse of [`cart_key`]; used for carts that only carry quantities.
pub fn parse_cart_key(key: &str) -> Option<(i64, Option<i64>, Vec<i64>)> {
    let (head, addons) = match key.split_once("_a") {
        Some((h, a)) => (h, Some(a)),
        None => (key, None),
    };
    let (item, variant) = match head.split_once("_v") {
        Some((i, v)) => (i, Some(v.parse().ok()?)),
        None => (head, None),
    };
    let addon_ids = match addons {
        Some(a) => a
            .split('_')
            .map(|id| id.parse().ok())
            .collect::<Option<Vec<i64>>>()?,
        None => Vec::new(),
    };
    Some((item.parse().ok()?, variant, addon_ids))
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of a combination and returns its key. A merged line never
    /// grows past [`MAX_LINE_QUANTITY`].
    pub fn add(
        &mut self,
        item_id: i64,
        variant_id: Option<i64>,
        addon_ids: Vec<i64>,
        quantity: i64,
    ) -> String {
        let key = cart_key(item_id, variant_id, &addon_ids);
        let quantity = quantity.clamp(1, MAX_LINE_QUANTITY);
        self.entries
            .entry(key.clone())
            .and_modify(|e| e.quantity = e.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY))
            .or_insert(CartEntry {
                item_id,
                variant_id,
                addon_ids,
                quantity,
            });
        key
    }

    /// Sets an existing line's quantity. Quantities outside `1..=MAX_LINE_QUANTITY`
    /// and unknown keys are rejected.
    pub fn set_quantity(&mut self, key: &str, quantity: i64) -> bool {
        if !is_valid_quantity(quantity) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn total_items(&self) -> i64 {
        self.entries.values().fold(0, |acc, e| acc.saturating_add(e.quantity))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CartEntry)> {
        self.entries.iter()
    }

    /// Reads cart JSON posted by the web app. Three shapes are accepted per line:
    /// a bare quantity (`{"5": 2}`), a full entry (`{"k": {"item_id": 5, ...}}`),
    /// or a quantity object whose key carries the combination (`{"5_v2": {"quantity": 1}}`).
    /// Lines that fit none of them, or whose quantity is out of range, are skipped.
    pub fn from_json(value: &Value) -> Result<Self, CartDataError> {
        let object = value.as_object().ok_or(CartDataError::NotAnObject)?;
        if object.is_empty() {
            return Err(CartDataError::Empty);
        }

        let mut cart = Cart::new();
        for (key, line) in object {
            let parsed = match line {
                Value::Number(_) | Value::String(_) => lenient_i64(line).and_then(|quantity| {
                    parse_cart_key(key).map(|(item, variant, addons)| (item, variant, addons, quantity))
                }),
                Value::Object(fields) if fields.contains_key("item_id") => {
                    lenient_i64(&fields["item_id"]).map(|item| {
                        (
                            item,
                            fields.get("variant_id").and_then(lenient_i64),
                            fields.get("addon_ids").map(lenient_ids).unwrap_or_default(),
                            fields.get("quantity").and_then(lenient_i64).unwrap_or(1),
                        )
                    })
                }
                Value::Object(fields) if fields.contains_key("quantity") => {
                    parse_cart_key(key).map(|(item, key_variant, key_addons)| {
                        let addons = fields.get("addon_ids").map(lenient_ids).unwrap_or_default();
                        (
                            item,
                            key_variant.or_else(|| fields.get("variant_id").and_then(lenient_i64)),
                            if addons.is_empty() { key_addons } else { addons },
                            fields.get("quantity").and_then(lenient_i64).unwrap_or(1),
                        )
                    })
                }
                _ => None,
            };

            if let Some((item, variant, addons, quantity)) = parsed {
                if is_valid_quantity(quantity) {
                    cart.add(item, variant, addons, quantity);
                }
            }
        }

        if cart.is_empty() {
            return Err(CartDataError::Empty);
        }
        Ok(cart)
    }
}

/// Accepts `5`, `"5"`; rejects `null`, `""` and non-numeric values.
pub fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn lenient_ids(value: &Value) -> Vec<i64> {
    match value {
        Value::Array(items) => items.iter().filter_map(lenient_i64).collect(),
        other => lenient_i64(other).into_iter().collect(),
    }
}
