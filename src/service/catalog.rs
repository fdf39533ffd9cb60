//! Products and categories, including their image files

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{
    CategoryPatch, NewCategory, NewProduct, Product, ProductCategory, ProductPatch,
};
use crate::domain::value_objects::Patch;
use crate::error::{EcommerceError, Result};
use crate::storage::{public_url, ImageStore, CATEGORY_IMAGES, PRODUCT_IMAGES};
use crate::store::{CatalogStore, Page, ProductQuery, Store};

/// An uploaded file as received from a multipart form.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: ProductCategory,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    images: Arc<dyn ImageStore>,
    app_url: String,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, images: Arc<dyn ImageStore>, app_url: impl Into<String>) -> Self {
        Self {
            store,
            images,
            app_url: app_url.into(),
        }
    }

    fn product_view(&self, product: Product) -> ProductView {
        ProductView {
            image_url: product.image.as_deref().map(|k| public_url(&self.app_url, k)),
            product,
        }
    }

    fn category_view(&self, category: ProductCategory) -> CategoryView {
        CategoryView {
            image_url: category.image.as_deref().map(|k| public_url(&self.app_url, k)),
            category,
        }
    }

    async fn store_image(&self, folder: &str, upload: Option<ImageUpload>) -> Result<Option<String>> {
        match upload {
            Some(file) => Ok(Some(self.images.save(folder, &file.file_name, &file.bytes).await?)),
            None => Ok(None),
        }
    }

    /// Drops a freshly written image when the record write failed.
    async fn discard(&self, key: Option<&str>) {
        if let Some(key) = key {
            self.images.delete(key).await;
        }
    }

    pub async fn list_products(&self, query: &ProductQuery) -> Result<Page<ProductView>> {
        let page = self.store.list_products(query).await?;
        Ok(page.map(|p| self.product_view(p)))
    }

    pub async fn product(&self, id: Uuid) -> Result<ProductView> {
        let product = self
            .store
            .product(id)
            .await?
            .ok_or(EcommerceError::NotFound("Product"))?;
        Ok(self.product_view(product))
    }

    pub async fn create_product(&self, mut new: NewProduct, image: Option<ImageUpload>) -> Result<ProductView> {
        new.validate()?;
        let key = self.store_image(PRODUCT_IMAGES, image).await?;
        if key.is_some() {
            new.image = key.clone();
        }
        match self.store.insert_product(new).await {
            Ok(product) => {
                tracing::info!(product_id = %product.id, name = %product.name, "product created");
                Ok(self.product_view(product))
            }
            Err(e) => {
                self.discard(key.as_deref()).await;
                Err(e)
            }
        }
    }

    /// Applies the present fields. A new image replaces and deletes the old one.
    pub async fn update_product(&self, id: Uuid, mut patch: ProductPatch, image: Option<ImageUpload>) -> Result<ProductView> {
        patch.validate()?;
        let existing = self
            .store
            .product(id)
            .await?
            .ok_or(EcommerceError::NotFound("Product"))?;
        let key = self.store_image(PRODUCT_IMAGES, image).await?;
        if let Some(k) = &key {
            patch.image = Patch::Present(Some(k.clone()));
        }
        let replaces_image = matches!(patch.image, Patch::Present(_));
        let updated = match self.store.update_product(id, patch).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                self.discard(key.as_deref()).await;
                return Err(EcommerceError::NotFound("Product"));
            }
            Err(e) => {
                self.discard(key.as_deref()).await;
                return Err(e);
            }
        };
        if replaces_image && existing.image != updated.image {
            self.discard(existing.image.as_deref()).await;
        }
        tracing::info!(product_id = %id, "product updated");
        Ok(self.product_view(updated))
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<ProductView> {
        let removed = self
            .store
            .delete_product(id)
            .await?
            .ok_or(EcommerceError::NotFound("Product"))?;
        self.discard(removed.image.as_deref()).await;
        tracing::info!(product_id = %id, "product deleted");
        Ok(self.product_view(removed))
    }

    pub async fn list_categories(&self) -> Result<Vec<CategoryView>> {
        let rows = self.store.list_categories().await?;
        Ok(rows.into_iter().map(|c| self.category_view(c)).collect())
    }

    pub async fn category(&self, id: Uuid) -> Result<CategoryView> {
        let category = self
            .store
            .category(id)
            .await?
            .ok_or(EcommerceError::NotFound("Category"))?;
        Ok(self.category_view(category))
    }

    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> Result<()> {
        match self.store.category_by_name(name).await? {
            Some(c) if Some(c.id) != except => Err(EcommerceError::conflict(
                "CATEGORY_NAME_EXISTS",
                "Category name already exists",
            )),
            _ => Ok(()),
        }
    }

    pub async fn create_category(&self, mut new: NewCategory, image: Option<ImageUpload>) -> Result<CategoryView> {
        new.validate()?;
        self.ensure_name_free(&new.name, None).await?;
        let key = self.store_image(CATEGORY_IMAGES, image).await?;
        if key.is_some() {
            new.image = key.clone();
        }
        match self.store.insert_category(new).await {
            Ok(category) => {
                tracing::info!(category_id = %category.id, name = %category.name, "category created");
                Ok(self.category_view(category))
            }
            Err(e) => {
                self.discard(key.as_deref()).await;
                Err(e)
            }
        }
    }

    pub async fn update_category(&self, id: Uuid, mut patch: CategoryPatch, image: Option<ImageUpload>) -> Result<CategoryView> {
        patch.validate()?;
        let existing = self
            .store
            .category(id)
            .await?
            .ok_or(EcommerceError::NotFound("Category"))?;
        if let Patch::Present(name) = &patch.name {
            self.ensure_name_free(name, Some(id)).await?;
        }
        let key = self.store_image(CATEGORY_IMAGES, image).await?;
        if let Some(k) = &key {
            patch.image = Patch::Present(Some(k.clone()));
        }
        let replaces_image = matches!(patch.image, Patch::Present(_));
        let updated = match self.store.update_category(id, patch).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                self.discard(key.as_deref()).await;
                return Err(EcommerceError::NotFound("Category"));
            }
            Err(e) => {
                self.discard(key.as_deref()).await;
                return Err(e);
            }
        };
        if replaces_image && existing.image != updated.image {
            self.discard(existing.image.as_deref()).await;
        }
        tracing::info!(category_id = %id, "category updated");
        Ok(self.category_view(updated))
    }

    /// Products in the category stay, uncategorized.
    pub async fn delete_category(&self, id: Uuid) -> Result<CategoryView> {
        let removed = self
            .store
            .delete_category(id)
            .await?
            .ok_or(EcommerceError::NotFound("Category"))?;
        self.discard(removed.image.as_deref()).await;
        tracing::info!(category_id = %id, "category deleted");
        Ok(self.category_view(removed))
    }
}
