#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

mod api;
mod ws;

use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, http, middleware, web};
use api::health_endpoint;
use peerline_registry::AliasRegistry;
use tokio::try_join;

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::init();

    let service_port = {
        let args: Vec<String> = env::args().collect();

        if args.len() > 1 {
            args[1].parse::<u16>().unwrap()
        } else {
            8000
        }
    };

    let registry = Arc::new(AliasRegistry::new());

    let (signaling_server, server_tx) = ws::server::SignalingServer::new();
    let signaling_server = tokio::task::spawn(signaling_server.run());

    let app = move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![http::header::AUTHORIZATION, http::header::ACCEPT])
            .allowed_header(http::header::CONTENT_TYPE)
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(server_tx.clone()))
            .app_data(web::Data::from(registry.clone()))
            .service(health_endpoint)
            .service(ws::api::websocket)
    };

    let http_server = actix_web::HttpServer::new(app)
        .bind(("0.0.0.0", service_port))?
        .run();

    try_join!(http_server, async move {
        signaling_server.await.unwrap()
    })?;

    Ok(())
}
