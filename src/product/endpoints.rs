use actix_web::get;
use actix_web::web::{Data, Json, Path, Query};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignId;
use crate::database::Database;
use crate::error::Error;
use crate::tenant::TenantId;
use crate::user::Identity;

use super::{manager, Product, ProductId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductBody {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub refund_policy: Option<String>,
    pub source_launchpad: Option<CampaignId>,
    pub is_private: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ProductBody {
    pub fn render(product: Product) -> ProductBody {
        ProductBody {
            id: product.id,
            tenant_id: product.tenant_id,
            name: product.name,
            description: product.description,
            price: product.price,
            category: product.category,
            tags: product.tags,
            image: product.image,
            refund_policy: product.refund_policy,
            source_launchpad: product.source_launchpad,
            is_private: product.is_private,
            is_archived: product.is_archived,
            created_at: product.created_at,
            modified_at: product.modified_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProductsQuery {
    pub tenant_id: Option<TenantId>,
}

#[get("/products")]
#[tracing::instrument(skip(db))]
pub async fn get_products(
    db: Data<dyn Database>,
    query: Query<ProductsQuery>,
) -> Result<Json<Vec<ProductBody>>, Error> {
    let products = manager::get_public_products(&**db, query.into_inner().tenant_id).await?;

    let body = products.into_iter().map(ProductBody::render).collect();

    Ok(Json(body))
}

#[get("/products/{product_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_product_by_id(
    db: Data<dyn Database>,
    identity: Option<Identity>,
    params: Path<ProductId>,
) -> Result<Json<ProductBody>, Error> {
    let product_id = params.into_inner();
    let product = manager::get_product_by_id(&**db, identity.as_ref(), product_id).await?;

    Ok(Json(ProductBody::render(product)))
}
