//! Demo clients for the gateway: an HTTP beacon loop, a data-socket
//! watcher and a binary TCP probe.

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use nearcast_core::wire::{
    read_frame, write_frame, DataRequestMsg, DataResponseMsg, SyncRequestMsg, SyncResponseMsg,
};
use nearcast_core::{Location, UserFilter};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "nearcast")]
#[command(about = "Demo clients for the nearcast geospatial pub/sub gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a session and beacon a position on an interval
    Beacon {
        /// Gateway host:port
        #[arg(long, default_value = "127.0.0.1:9443")]
        server: String,

        /// Client identity; a random one is minted when omitted
        #[arg(long)]
        client_id: Option<Uuid>,

        /// Latitude to report
        #[arg(long, default_value_t = -34.9287)]
        lat: f64,

        /// Longitude to report
        #[arg(long, default_value_t = 138.5999)]
        lng: f64,

        /// Seconds between beacons
        #[arg(long, default_value_t = 1)]
        interval: u64,

        /// Number of beacons to send
        #[arg(long, default_value_t = 60)]
        count: u32,
    },

    /// Sync a session, open the data socket and print neighborhood traffic
    Watch {
        /// Gateway host:port
        #[arg(long, default_value = "127.0.0.1:9443")]
        server: String,

        /// Client identity; a random one is minted when omitted
        #[arg(long)]
        client_id: Option<Uuid>,

        /// Latitude to watch from
        #[arg(long, default_value_t = -34.9287)]
        lat: f64,

        /// Longitude to watch from
        #[arg(long, default_value_t = 138.5999)]
        lng: f64,

        /// Watch a group channel instead of the local neighborhood
        #[arg(long)]
        group: Option<String>,
    },

    /// Exercise the binary TCP demo surface
    Probe {
        /// Demo surface host:port
        #[arg(long, default_value = "127.0.0.1:41111")]
        server: String,

        /// Latitude to report
        #[arg(long, default_value_t = -34.9287)]
        lat: f64,

        /// Longitude to report
        #[arg(long, default_value_t = 138.5999)]
        lng: f64,

        /// Number of data requests to send
        #[arg(long, default_value_t = 10)]
        count: u32,
    },
}

pub async fn run() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Beacon {
            server,
            client_id,
            lat,
            lng,
            interval,
            count,
        } => beacon(server, client_id, lat, lng, interval, count).await,
        Commands::Watch {
            server,
            client_id,
            lat,
            lng,
            group,
        } => watch(server, client_id, lat, lng, group).await,
        Commands::Probe {
            server,
            lat,
            lng,
            count,
        } => probe(server, lat, lng, count).await,
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Exchange a client identity for a session token.
async fn sync_session(
    http: &reqwest::Client,
    server: &str,
    client_id: Uuid,
) -> anyhow::Result<String> {
    let response = http
        .post(format!("http://{server}/api/v1/entity/sync"))
        .json(&json!({ "clientid": client_id.to_string(), "time": now() }))
        .send()
        .await
        .context("sync request failed")?;
    if !response.status().is_success() {
        bail!("sync rejected: {}", response.status());
    }
    let body: Value = response.json().await?;
    let token = body["tokenid"]
        .as_str()
        .context("sync response carried no token")?
        .to_string();
    info!("token acquired: client={client_id} token={token}");
    Ok(token)
}

async fn post_beacon(
    http: &reqwest::Client,
    server: &str,
    token: &str,
    lat: f64,
    lng: f64,
) -> anyhow::Result<()> {
    let response = http
        .post(format!("http://{server}/api/v1/entity/{token}/beacon"))
        .json(&json!({
            "lat": lat, "lng": lng, "alt": 0.0, "heading": 0.0, "timestamp": now()
        }))
        .send()
        .await
        .context("beacon request failed")?;
    if !response.status().is_success() {
        bail!("beacon rejected: {}", response.status());
    }
    Ok(())
}

async fn beacon(
    server: String,
    client_id: Option<Uuid>,
    lat: f64,
    lng: f64,
    interval: u64,
    count: u32,
) -> anyhow::Result<()> {
    let client_id = client_id.unwrap_or_else(Uuid::new_v4);
    let http = reqwest::Client::new();
    let token = sync_session(&http, &server, client_id).await?;

    for i in 0..count {
        post_beacon(&http, &server, &token, lat, lng).await?;
        println!("beacon {}/{count} sent ({lat}, {lng})", i + 1);
        tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
    }
    Ok(())
}

async fn watch(
    server: String,
    client_id: Option<Uuid>,
    lat: f64,
    lng: f64,
    group: Option<String>,
) -> anyhow::Result<()> {
    let client_id = client_id.unwrap_or_else(Uuid::new_v4);
    let http = reqwest::Client::new();
    let token = sync_session(&http, &server, client_id).await?;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!(
        "ws://{server}/api/v1/entity/{token}/data"
    ))
    .await
    .context("data socket upgrade failed")?;

    // place ourselves so the local neighborhood subscription exists
    post_beacon(&http, &server, &token, lat, lng).await?;

    if let Some(group_id) = group {
        let filter = UserFilter::group(group_id);
        socket
            .send(tokio_tungstenite::tungstenite::Message::Text(
                serde_json::to_string(&filter)?,
            ))
            .await
            .context("filter send failed")?;
    }

    println!("watching... (ctrl-c to stop)");
    while let Some(msg) = socket.next().await {
        match msg? {
            tokio_tungstenite::tungstenite::Message::Text(text) => {
                let frame: Value = serde_json::from_str(&text)?;
                for item in frame.as_array().cloned().unwrap_or_default() {
                    println!("{}", serde_json::to_string_pretty(&item)?);
                }
            }
            tokio_tungstenite::tungstenite::Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

async fn probe(server: String, lat: f64, lng: f64, count: u32) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(&server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;

    let client_uuid = Uuid::new_v4();
    let sync = SyncRequestMsg {
        user_agent: 0,
        client_uuid,
        service_uuid: Uuid::new_v4(),
        location: Location::new(lat, lng, 0.0, 0.0, now()),
    };
    write_frame(&mut stream, &sync.encode()).await?;

    let (header, payload) = read_frame(&mut stream).await?;
    let response = SyncResponseMsg::decode(&header, &payload)?;
    if response.client_uuid != client_uuid {
        bail!("sync response for a different client");
    }
    println!("connected, token={}", response.token_id);

    for i in 0..count {
        let request = DataRequestMsg {
            token_id: response.token_id,
            location: Location::new(lat, lng, 0.0, 0.0, now()),
        };
        write_frame(&mut stream, &request.encode()).await?;

        let (header, payload) = read_frame(&mut stream).await?;
        let data = DataResponseMsg::decode(&header, &payload)?;
        let body: Value = serde_json::from_slice(&data.data)?;
        println!(
            "data {}/{count}:\n{}",
            i + 1,
            serde_json::to_string_pretty(&body)?
        );
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }
    Ok(())
}
