use actix_web::HttpResponse;
use actix_web::{
    get,
    web::{self},
    Result,
};
use peerline_registry::AliasRegistry;
use tokio::task::spawn_local;

use crate::ws::handler;
use crate::ws::server::SignalingServerHandle;

#[get("/ws")]
pub async fn websocket(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    server_handle: web::Data<SignalingServerHandle>,
    registry: web::Data<AliasRegistry>,
) -> Result<HttpResponse, actix_web::Error> {
    let (res, session, msg_stream) = actix_ws::handle(&req, stream)?;

    // spawn websocket handler (and don't await it) so that the response is returned immediately
    spawn_local(handler::signaling_ws(
        server_handle.get_ref().clone(),
        registry.into_inner(),
        session,
        msg_stream,
    ));

    Ok(res)
}
