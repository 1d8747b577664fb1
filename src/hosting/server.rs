use crate::BROADCAST_HZ;
use crate::DEFAULT_PORT;
use crate::DEFAULT_STATIC_DIR;
use crate::relay::*;
use actix_cors::Cors;
use actix_files::Files;
use actix_files::NamedFile;
use actix_web::App;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::dev::fn_service;
use actix_web::middleware::Logger;
use actix_web::web;
use std::path::PathBuf;

/// Incidental HTTP plumbing around the relay core: the WebSocket upgrade
/// endpoint, the static client bundle with SPA fallback, and permissive
/// CORS. Port comes from the PORT env var, asset dir from STATIC_DIR.
pub struct Server;

impl Server {
    pub async fn run() -> anyhow::Result<()> {
        let registry = web::Data::new(Registry::default());
        let _scheduler = Scheduler::spawn(registry.clone().into_inner(), BROADCAST_HZ);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let assets = PathBuf::from(
            std::env::var("STATIC_DIR").unwrap_or_else(|_| DEFAULT_STATIC_DIR.to_string()),
        );
        log::info!("listening on http://0.0.0.0:{}", port);
        HttpServer::new(move || {
            let spa = assets.join("index.html");
            App::new()
                .wrap(Logger::new("%r %s %Ts"))
                .wrap(
                    Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header(),
                )
                .app_data(registry.clone())
                .route("/ws", web::get().to(connect))
                .service(
                    Files::new("/", assets.clone())
                        .index_file("index.html")
                        .default_handler(fn_service(move |req: ServiceRequest| {
                            let spa = spa.clone();
                            async move {
                                // unknown paths fall back to the SPA entry document
                                let (req, _) = req.into_parts();
                                let file = NamedFile::open_async(&spa).await?;
                                let res = file.into_response(&req);
                                Ok::<_, actix_web::Error>(ServiceResponse::new(req, res))
                            }
                        })),
                )
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await?;
        Ok(())
    }
}

/// Upgrades the request and hands the connection to a session loop.
async fn connect(
    registry: web::Data<Registry>,
    body: web::Payload,
    req: HttpRequest,
) -> impl Responder {
    match actix_ws::handle(&req, body) {
        Ok((response, session, stream)) => {
            actix_web::rt::spawn(Session::run(registry.into_inner(), session, stream));
            response
        }
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}
