use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson;
use mongodb::options::FindOptions;

use crate::campaign::CampaignId;
use crate::database::{poisoned, MongoProductStore};
use crate::error::Error;
use crate::tenant::TenantId;

use super::{Product, ProductId};

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<(), Error>;

    async fn fetch_product_by_id(&self, product_id: ProductId) -> Result<Option<Product>, Error>;

    /// Products that are neither private nor archived, newest first.
    async fn fetch_public_products(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<Product>, Error>;

    async fn fetch_products_by_source_launchpad(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<Product>, Error>;
}

#[async_trait]
impl ProductStore for MongoProductStore {
    #[tracing::instrument(skip(self))]
    async fn insert_product(&self, product: &Product) -> Result<(), Error> {
        self.insert_one(product, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_product_by_id(&self, product_id: ProductId) -> Result<Option<Product>, Error> {
        let product = self.find_one(bson::doc! { "_id": product_id }, None).await?;

        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_public_products(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<Product>, Error> {
        let options = FindOptions::builder()
            .sort(bson::doc! { "created_at": -1 })
            .build();
        let mut filter = bson::doc! { "is_private": false, "is_archived": false };
        if let Some(tenant_id) = tenant_id {
            filter.insert("tenant_id", tenant_id);
        }

        let products: Vec<Product> = self.find(filter, options).await?.try_collect().await?;

        Ok(products)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_products_by_source_launchpad(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<Product>, Error> {
        let products: Vec<Product> = self
            .find(bson::doc! { "source_launchpad": campaign_id }, None)
            .await?
            .try_collect()
            .await?;

        Ok(products)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProductStore {
    products: Mutex<HashMap<ProductId, Product>>,
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn insert_product(&self, product: &Product) -> Result<(), Error> {
        let mut products = self.products.lock().map_err(poisoned)?;
        products.insert(product.id, product.clone());

        Ok(())
    }

    async fn fetch_product_by_id(&self, product_id: ProductId) -> Result<Option<Product>, Error> {
        let products = self.products.lock().map_err(poisoned)?;

        Ok(products.get(&product_id).cloned())
    }

    async fn fetch_public_products(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<Product>, Error> {
        let products = self.products.lock().map_err(poisoned)?;
        let mut products: Vec<Product> = products
            .values()
            .filter(|p| p.is_public())
            .filter(|p| tenant_id.map_or(true, |tenant_id| p.tenant_id == tenant_id))
            .cloned()
            .collect();
        products.sort_by_key(|p| Reverse(p.created_at));

        Ok(products)
    }

    async fn fetch_products_by_source_launchpad(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<Product>, Error> {
        let products = self.products.lock().map_err(poisoned)?;

        Ok(products
            .values()
            .filter(|p| p.source_launchpad == Some(campaign_id))
            .cloned()
            .collect())
    }
}
