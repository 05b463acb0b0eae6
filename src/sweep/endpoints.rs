use actix_web::http::header::AUTHORIZATION;
use actix_web::web::{Data, Json};
use actix_web::{route, HttpRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::clock::Clock;
use crate::config::Config;
use crate::database::Database;
use crate::error::Error;

use super::{run_sweep, SweepResults};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepBody {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub results: SweepResults,
}

fn assert_cron_secret(req: &HttpRequest, secret: &str) -> Result<(), Error> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) => Ok(()),
        _ => {
            warn!("rejected sweep trigger with a missing or wrong secret");
            Err(Error::InvalidCronSecret)
        }
    }
}

#[route("/cron/expire-launchpads", method = "GET", method = "POST")]
#[tracing::instrument(skip(req, db, clock, config))]
pub async fn expire_launchpads(
    req: HttpRequest,
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    config: Data<Config>,
) -> Result<Json<SweepBody>, Error> {
    assert_cron_secret(&req, &config.cron_secret)?;

    let now = clock.now();
    let results = run_sweep(&**db, now).await?;

    Ok(Json(SweepBody {
        success: true,
        timestamp: now,
        results,
    }))
}
