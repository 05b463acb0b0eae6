use crate::typedid::{TypedId, TypedIdMarker};

pub type TenantId = TypedId<Tenant>;

/// Tenants are owned by the storefront layer; this crate only refers to them.
#[derive(Clone, Debug)]
pub struct Tenant;

impl TypedIdMarker for Tenant {
    fn tag() -> &'static str {
        "TNT"
    }
}
