use marketplace_server::config::Config;
use marketplace_server::Error;

#[actix_web::main]
async fn main() -> Result<(), Error> {
    marketplace_server::setup_tracing();

    let config = Config::load()?;

    marketplace_server::run(config).await
}
