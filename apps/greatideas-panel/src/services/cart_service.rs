use anyhow::Result;
use greatideas_db::models::menu::{Addon, MenuItem, MenuItemVariant};
use greatideas_db::models::order::PricedLine;
use greatideas_db::repositories::MenuRepository;
use greatideas_shared::cart::Cart;
use greatideas_shared::money::format_rub;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CartLine {
    pub key: String,
    pub item: MenuItem,
    pub variant: Option<MenuItemVariant>,
    pub addons: Vec<Addon>,
    pub quantity: i64,
}

impl CartLine {
    pub fn variant_price(&self) -> i64 {
        self.variant.as_ref().map(|v| v.price_modifier).unwrap_or(0)
    }

    pub fn addons_price(&self) -> i64 {
        self.addons.iter().fold(0, |acc, a| acc.saturating_add(a.price))
    }

    pub fn unit_price(&self) -> i64 {
        self.item
            .price
            .saturating_add(self.variant_price())
            .saturating_add(self.addons_price())
    }

    pub fn total_price(&self) -> i64 {
        self.unit_price().saturating_mul(self.quantity)
    }

    pub fn display_name(&self) -> String {
        match &self.variant {
            Some(v) => format!("{} ({})", self.item.name, v.name),
            None => self.item.name.clone(),
        }
    }

    pub fn to_priced_line(&self) -> PricedLine {
        PricedLine {
            menu_item_id: self.item.id,
            variant_id: self.variant.as_ref().map(|v| v.id),
            addon_ids: self.addons.iter().map(|a| a.id).collect(),
            quantity: self.quantity,
            base_price: self.item.price,
            variant_price: self.variant_price(),
            addons_price: self.addons_price(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricedCart {
    pub lines: Vec<CartLine>,
}

impl PricedCart {
    pub fn total_price(&self) -> i64 {
        self.lines.iter().fold(0, |acc, l| acc.saturating_add(l.total_price()))
    }

    pub fn total_items(&self) -> i64 {
        self.lines.iter().fold(0, |acc, l| acc.saturating_add(l.quantity))
    }

    /// Number of distinct lines.
    pub fn cart_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Cafe of the first line that still resolves to a menu item.
    pub fn cafe_id(&self) -> Option<i64> {
        self.lines.first().map(|l| l.item.cafe_id)
    }
}

/// Row shape handed to the cart template.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub key: String,
    pub name: String,
    pub addons: String,
    pub quantity: i64,
    pub unit_price: String,
    pub total_price: String,
}

impl From<&CartLine> for CartLineView {
    fn from(line: &CartLine) -> Self {
        Self {
            key: line.key.clone(),
            name: line.display_name(),
            addons: line.addons.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", "),
            quantity: line.quantity,
            unit_price: format_rub(line.unit_price()),
            total_price: format_rub(line.total_price()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CartService {
    menu: MenuRepository,
}

impl CartService {
    pub fn new(menu: MenuRepository) -> Self {
        Self { menu }
    }

    /// Resolves every cart entry against the menu. Entries whose item is gone are skipped;
    /// a missing variant prices as zero.
    pub async fn price(&self, cart: &Cart) -> Result<PricedCart> {
        let mut lines = Vec::with_capacity(cart.len());
        for (key, entry) in cart.iter() {
            let Some(item) = self.menu.get_item(entry.item_id).await? else {
                debug!("Skipping cart line {}: item {} not found", key, entry.item_id);
                continue;
            };
            let variant = match entry.variant_id {
                Some(id) => self.menu.get_variant(id).await?.filter(|v| v.menu_item_id == item.id),
                None => None,
            };
            let addons = if entry.addon_ids.is_empty() {
                Vec::new()
            } else {
                self.menu.addons_by_ids(&entry.addon_ids).await?
            };
            lines.push(CartLine {
                key: key.clone(),
                item,
                variant,
                addons,
                quantity: entry.quantity,
            });
        }
        Ok(PricedCart { lines })
    }
}
