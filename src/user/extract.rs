use actix_web::dev::Payload;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::database::Database;
use crate::error::Error;

use super::{Identity, UserId};

/// Set by the upstream session layer once it has authenticated the caller.
pub const USER_ID_HEADER: &str = "X-User-Id";

impl FromRequest for Identity {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Identity, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok());
        let db = req.app_data::<Data<dyn Database>>().cloned();

        Box::pin(async move {
            let db = db.ok_or_else(|| {
                Error::ExistentialState("no database registered with the app".into())
            })?;
            let user_id = user_id.ok_or(Error::Unauthenticated)?;

            let user = db.users().fetch_user_by_id(user_id).await?.ok_or_else(|| {
                debug!("no user found for {}", user_id);
                Error::Unauthenticated
            })?;

            Ok(Identity::from_user(&user))
        })
    }
}
