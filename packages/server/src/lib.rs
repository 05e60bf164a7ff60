//! HTTP and websocket front end for `pairplay` matchmaking.
//!
//! Clients connect to `/ws`, ask to be matched with another waiting client, and then
//! exchange moves through the server until either side ends the session.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

pub mod api;
pub mod config;
pub mod ws;

use actix_cors::Cors;
use actix_web::{App, http, middleware, web};
use tokio::try_join;

use crate::{config::Config, ws::server::MatchServer};

/// Runs the HTTP server and the match server until the HTTP server stops.
///
/// # Errors
///
/// * If the HTTP server fails to bind to the configured address
/// * If the HTTP server stops with an IO error
pub async fn run(config: Config) -> std::io::Result<()> {
    let (match_server, match_server_handle) = MatchServer::new(config.write_timeout());
    let match_server_task = tokio::spawn(match_server.run());

    let settings = config.connection_settings();

    let app = {
        let match_server_handle = match_server_handle.clone();

        move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET", "OPTIONS"])
                .allowed_headers(vec![http::header::ACCEPT, http::header::CONTENT_TYPE])
                .max_age(3600);

            App::new()
                .wrap(cors)
                .wrap(middleware::Logger::default())
                .app_data(web::Data::new(match_server_handle.clone()))
                .app_data(web::Data::new(settings))
                .configure(api::bind_services)
        }
    };

    let mut http_server =
        actix_web::HttpServer::new(app).bind((config.addr.as_str(), config.port))?;

    if let Some(workers) = config.workers {
        log::debug!("Running with {workers} Actix workers");
        http_server = http_server.workers(workers);
    }

    let http_server = http_server.run();

    log::info!("pairplay server started on {}:{}", config.addr, config.port);

    if let Err(err) = try_join!(
        async move {
            let resp = http_server.await;
            log::debug!("HTTP server stopped");
            match_server_handle.shutdown();
            resp
        },
        async move {
            match_server_task.await.map_err(std::io::Error::other)?;
            log::debug!("Match server stopped");
            Ok::<_, std::io::Error>(())
        },
    ) {
        log::error!("Error on shutdown: {err:?}");
        return Err(err);
    }

    log::debug!("Server shut down");

    Ok(())
}
