//! Product and ProductCategory aggregates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Patch;
use crate::error::{EcommerceError, Result};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
    pub category_id: Option<Uuid>,
    pub image: Option<String>,
    pub popular: bool,
    pub spice_level: Option<i16>,
    pub features: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_in_stock(&self) -> bool {
        self.quantity > 0
    }

    pub fn has_stock_for(&self, requested: u32) -> bool {
        i64::from(self.quantity) >= i64::from(requested)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
    pub category_id: Option<Uuid>,
    pub image: Option<String>,
    pub popular: bool,
    pub spice_level: Option<i16>,
    pub features: Option<String>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_price(self.price)?;
        validate_stock(self.quantity)?;
        validate_spice_level(self.spice_level)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductPatch {
    pub name: Patch<String>,
    pub description: Patch<Option<String>>,
    pub price: Patch<Decimal>,
    pub quantity: Patch<i32>,
    pub category_id: Patch<Option<Uuid>>,
    pub image: Patch<Option<String>>,
    pub popular: Patch<bool>,
    pub spice_level: Patch<Option<i16>>,
    pub features: Patch<Option<String>>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<()> {
        if let Patch::Present(name) = &self.name {
            validate_name(name)?;
        }
        if let Patch::Present(price) = self.price {
            validate_price(price)?;
        }
        if let Patch::Present(qty) = self.quantity {
            validate_stock(qty)?;
        }
        if let Patch::Present(level) = self.spice_level {
            validate_spice_level(level)?;
        }
        Ok(())
    }

    /// Applies every present field. The match keeps new fields from being forgotten.
    pub fn apply(self, product: &mut Product) {
        let ProductPatch {
            name,
            description,
            price,
            quantity,
            category_id,
            image,
            popular,
            spice_level,
            features,
        } = self;
        name.apply_to(&mut product.name);
        description.apply_to(&mut product.description);
        price.apply_to(&mut product.price);
        quantity.apply_to(&mut product.quantity);
        category_id.apply_to(&mut product.category_id);
        image.apply_to(&mut product.image);
        popular.apply_to(&mut product.popular);
        spice_level.apply_to(&mut product.spice_level);
        features.apply_to(&mut product.features);
        product.updated_at = Utc::now();
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub image: Option<String>,
}

impl NewCategory {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct CategoryPatch {
    pub name: Patch<String>,
    pub description: Patch<Option<String>>,
    pub icon: Patch<Option<String>>,
    pub color: Patch<Option<String>>,
    pub image: Patch<Option<String>>,
}

impl CategoryPatch {
    pub fn validate(&self) -> Result<()> {
        if let Patch::Present(name) = &self.name {
            validate_name(name)?;
        }
        Ok(())
    }

    pub fn apply(self, category: &mut ProductCategory) {
        let CategoryPatch {
            name,
            description,
            icon,
            color,
            image,
        } = self;
        name.apply_to(&mut category.name);
        description.apply_to(&mut category.description);
        icon.apply_to(&mut category.icon);
        color.apply_to(&mut category.color);
        image.apply_to(&mut category.image);
        category.updated_at = Utc::now();
    }
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EcommerceError::validation("Name is required"));
    }
    if trimmed.len() > 200 {
        return Err(EcommerceError::validation("Name is too long"));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() {
        return Err(EcommerceError::validation("Price must not be negative"));
    }
    Ok(())
}

fn validate_stock(quantity: i32) -> Result<()> {
    if quantity < 0 {
        return Err(EcommerceError::validation("Quantity must not be negative"));
    }
    Ok(())
}

fn validate_spice_level(level: Option<i16>) -> Result<()> {
    match level {
        Some(l) if !(1..=5).contains(&l) => Err(EcommerceError::validation(
            "Spice level must be between 1 and 5",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Shoyu Ramen".into(),
            description: Some("Soy broth".into()),
            price: Decimal::new(1299, 2),
            quantity: 4,
            category_id: Some(Uuid::new_v4()),
            image: None,
            popular: false,
            spice_level: Some(2),
            features: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut p = product();
        let patch = ProductPatch {
            price: Patch::Present(Decimal::new(1500, 2)),
            category_id: Patch::Present(None),
            ..Default::default()
        };
        patch.apply(&mut p);
        assert_eq!(p.price, Decimal::new(15, 0));
        assert_eq!(p.category_id, None);
        assert_eq!(p.name, "Shoyu Ramen");
        assert_eq!(p.quantity, 4);
    }

    #[test]
    fn test_product_validation() {
        let mut new = NewProduct {
            name: "Gyoza".into(),
            price: Decimal::new(500, 2),
            ..Default::default()
        };
        assert!(new.validate().is_ok());
        new.spice_level = Some(6);
        assert!(new.validate().is_err());
        new.spice_level = None;
        new.price = Decimal::new(-1, 0);
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_stock() {
        let p = product();
        assert!(p.is_in_stock());
        assert!(p.has_stock_for(4));
        assert!(!p.has_stock_for(5));
    }
}
