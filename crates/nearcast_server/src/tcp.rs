//! The binary TCP demo surface: the framing the demo client and sink
//! speak. One task per connection; a sync request opens a session, data
//! requests fold in locations, broadcast them and answer with the
//! session's archived activity.

use crate::handlers::entity::check_clock;
use nearcast_core::wire::{
    read_frame, write_frame, DataRequestMsg, DataResponseMsg, MsgType, SyncRequestMsg,
    SyncResponseMsg,
};
use nearcast_core::{ClientId, DataResponse, Endpoint, UserData};
use std::io;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Accept loop for the demo surface.
pub async fn serve(listener: TcpListener, endpoint: Arc<Endpoint>) {
    info!(
        "binary demo surface listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
    );
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("demo connection from {peer}");
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, endpoint).await {
                        debug!("demo connection from {peer} ended: {e}");
                    }
                });
            }
            Err(e) => {
                warn!("demo accept failed: {e}");
                break;
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, endpoint: Arc<Endpoint>) -> io::Result<()> {
    loop {
        let (header, payload) = read_frame(&mut stream).await?;
        match header.msg_type {
            MsgType::SyncRequest => {
                let req = SyncRequestMsg::decode(&header, &payload).map_err(invalid)?;
                check_clock(req.location.timestamp).map_err(invalid)?;

                let entity = endpoint
                    .create_entity(ClientId::from(req.client_uuid), req.user_agent)
                    .await
                    .map_err(invalid)?;
                entity.update(req.location);

                let response = SyncResponseMsg {
                    client_uuid: req.client_uuid,
                    service_uuid: req.service_uuid,
                    token_id: entity.token_id(),
                };
                write_frame(&mut stream, &response.encode()).await?;
            }
            MsgType::DataRequest => {
                let req = DataRequestMsg::decode(&header, &payload).map_err(invalid)?;
                check_clock(req.location.timestamp).map_err(invalid)?;

                let entity = endpoint
                    .get_entity(&req.token_id.to_string())
                    .await
                    .map_err(invalid)?;
                entity.update(req.location);

                let user_data = UserData {
                    client_id: entity.client_id().to_string(),
                    location: req.location,
                };
                let message = serde_json::to_vec(&user_data).map_err(io::Error::other)?;
                if let Err(e) = endpoint.ctx().broadcast(&entity, &message).await {
                    warn!("demo broadcast failed: {e}");
                }

                let activity = endpoint.ctx().get_data(req.token_id).await.map_err(invalid)?;
                let body = serde_json::to_vec(&DataResponse {
                    activities: vec![activity],
                })
                .map_err(io::Error::other)?;
                let response = DataResponseMsg {
                    token_id: req.token_id,
                    data: body,
                };
                write_frame(&mut stream, &response.encode()).await?;
            }
            other => {
                return Err(invalid(format!("unexpected message type {other:?}")));
            }
        }
    }
}

fn invalid(e: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}
