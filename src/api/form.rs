//! Multipart forms for image-bearing catalog writes
//!
//! Text fields are collected by name; the `image` file part becomes an
//! `ImageUpload`. A text field sent empty clears a nullable column.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{FromRequest, Multipart, Request};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::{CategoryPatch, NewCategory, NewProduct, ProductPatch};
use crate::domain::value_objects::Patch;
use crate::error::{EcommerceError, Result};
use crate::service::catalog::ImageUpload;
use crate::storage::MAX_IMAGE_BYTES;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    pub image: Option<ImageUpload>,
}

#[axum::async_trait]
impl<S> FromRequest<S> for Form
where
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection: MultipartRejection| EcommerceError::validation(rejection.body_text()))?;
        Form::read(multipart).await
    }
}

impl Form {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Form::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| EcommerceError::validation(format!("Malformed form: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == IMAGE_FIELD && field.file_name().is_some() {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| EcommerceError::validation(format!("Malformed file part: {e}")))?;
                if bytes.is_empty() {
                    continue;
                }
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(EcommerceError::validation("Image file is too large"));
                }
                form.image = Some(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| EcommerceError::validation(format!("Malformed field {name}: {e}")))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            image: None,
        }
    }

    fn raw(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.raw(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EcommerceError::validation(format!("{name} is required")))
    }

    fn parse<T: FromStr>(&self, name: &str, value: &str) -> Result<T> {
        value
            .parse()
            .map_err(|_| EcommerceError::validation(format!("{name} has an invalid value")))
    }

    /// Present and non-empty, parsed.
    fn patch<T: FromStr>(&self, name: &str) -> Result<Patch<T>> {
        match self.raw(name) {
            None => Ok(Patch::Absent),
            Some(v) => Ok(Patch::Present(self.parse(name, v)?)),
        }
    }

    /// Empty string means null.
    fn nullable<T: FromStr>(&self, name: &str) -> Result<Patch<Option<T>>> {
        match self.raw(name) {
            None => Ok(Patch::Absent),
            Some("") | Some("null") => Ok(Patch::Present(None)),
            Some(v) => Ok(Patch::Present(Some(self.parse(name, v)?))),
        }
    }

    fn optional<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        Ok(self.nullable(name)?.into_option().flatten())
    }

    fn flag(&self, name: &str) -> Result<Patch<bool>> {
        match self.raw(name) {
            None => Ok(Patch::Absent),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(Patch::Present(true)),
                "false" | "0" | "off" | "no" | "" => Ok(Patch::Present(false)),
                _ => Err(EcommerceError::validation(format!("{name} must be a boolean"))),
            },
        }
    }

    pub fn new_product(&self) -> Result<NewProduct> {
        Ok(NewProduct {
            name: self.required("name")?.to_string(),
            description: self.optional("description")?,
            price: self.parse::<Decimal>("price", self.required("price")?)?,
            quantity: self.patch::<i32>("quantity")?.into_option().unwrap_or(0),
            category_id: self.optional::<Uuid>("category_id")?,
            image: None,
            popular: self.flag("popular")?.into_option().unwrap_or(false),
            spice_level: self.optional::<i16>("spice_level")?,
            features: self.optional("features")?,
        })
    }

    pub fn product_patch(&self) -> Result<ProductPatch> {
        Ok(ProductPatch {
            name: self.patch("name")?,
            description: self.nullable("description")?,
            price: self.patch("price")?,
            quantity: self.patch("quantity")?,
            category_id: self.nullable("category_id")?,
            image: Patch::Absent,
            popular: self.flag("popular")?,
            spice_level: self.nullable("spice_level")?,
            features: self.nullable("features")?,
        })
    }

    pub fn new_category(&self) -> Result<NewCategory> {
        Ok(NewCategory {
            name: self.required("name")?.to_string(),
            description: self.optional("description")?,
            icon: self.optional("icon")?,
            color: self.optional("color")?,
            image: None,
        })
    }

    pub fn category_patch(&self) -> Result<CategoryPatch> {
        Ok(CategoryPatch {
            name: self.patch("name")?,
            description: self.nullable("description")?,
            icon: self.nullable("icon")?,
            color: self.nullable("color")?,
            image: Patch::Absent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_product_from_fields() {
        let form = Form::from_pairs(&[
            ("name", " Ramen "),
            ("price", "12.50"),
            ("quantity", "4"),
            ("popular", "true"),
            ("spice_level", ""),
        ]);
        let product = form.new_product().unwrap();
        assert_eq!(product.name, "Ramen");
        assert_eq!(product.price, Decimal::from_str("12.50").unwrap());
        assert_eq!(product.quantity, 4);
        assert!(product.popular);
        assert_eq!(product.spice_level, None);
    }

    #[test]
    fn test_missing_price_is_rejected() {
        let err = Form::from_pairs(&[("name", "Ramen")]).new_product().unwrap_err();
        assert!(matches!(err, EcommerceError::Validation(_)));
    }

    #[test]
    fn test_patch_distinguishes_absent_and_cleared() {
        let patch = Form::from_pairs(&[("description", ""), ("price", "3")])
            .product_patch()
            .unwrap();
        assert_eq!(patch.description, Patch::Present(None));
        assert_eq!(patch.name, Patch::Absent);
        assert_eq!(patch.price, Patch::Present(Decimal::from(3)));
        assert!(patch.category_id.is_absent());
    }

    #[test]
    fn test_bad_number_is_validation_error() {
        let err = Form::from_pairs(&[("quantity", "lots")]).product_patch().unwrap_err();
        assert!(matches!(err, EcommerceError::Validation(_)));
    }
}
