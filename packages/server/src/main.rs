#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use clap::Parser as _;
use pairplay_server::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    #[cfg(debug_assertions)]
    const DEFAULT_LOG_LEVEL: &str = "pairplay=debug,actix_web=info";
    #[cfg(not(debug_assertions))]
    const DEFAULT_LOG_LEVEL: &str = "pairplay=info,actix_web=info";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_LEVEL))
        .init();

    let config = Config::parse();
    log::debug!("Starting with {config:?}");

    pairplay_server::run(config).await
}
