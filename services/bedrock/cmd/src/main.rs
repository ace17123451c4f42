//! Bedrock protocol tool.
//!
//! `pong` parses a server status line and prints it as JSON. `loopback` runs
//! a server and a client over the in-memory transport and exchanges a short
//! login-style conversation, optionally encrypted.

use anyhow::Context;
use bedrock_session::{
    BedrockClient, BedrockServer, BedrockServerEventHandler, BedrockSession, MemoryNetwork,
    SecretKey,
};
use bedrock_wire::packet::{
    ClientToServerHandshakePacket, DisconnectPacket, ModalFormRequestPacket, PlayStatus,
    PlayStatusPacket, PlayerInputPacket, ServerToClientHandshakePacket,
};
use bedrock_wire::{codec_for_protocol, BedrockPong, PacketCodec, PacketHandler, Vector2f};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::BedrockConfig;
use logging::{BedrockLogFormatter, PeerLayer};

/// Bedrock protocol session tool
#[derive(Parser, Debug)]
#[command(name = "bedrock", version, about = "Bedrock protocol session and wire tool")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "bedrock.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a status record and print it as JSON
    Pong {
        /// Raw `;`-separated status line
        line: String,
    },
    /// Run a server and client over the in-memory transport
    Loopback {
        /// Enable batch encryption with a random key
        #[arg(long)]
        encrypt: bool,

        /// Override the flush interval, e.g. 20ms
        #[arg(long)]
        tick: Option<humantime::Duration>,

        /// How long to wait for the conversation to finish
        #[arg(long, default_value = "5s")]
        timeout: humantime::Duration,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("bedrock={}", args.log_level).parse()?)
        .add_directive(format!("bedrock_session={}", args.log_level).parse()?)
        .add_directive(format!("bedrock_wire={}", args.log_level).parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(PeerLayer)
        .with(tracing_subscriber::fmt::layer().event_format(BedrockLogFormatter::new()))
        .init();

    match args.command {
        Command::Pong { line } => {
            let pong = BedrockPong::parse(&line);
            println!("{}", serde_json::to_string_pretty(&pong)?);
            Ok(())
        }
        Command::Loopback {
            encrypt,
            tick,
            timeout,
        } => {
            let mut config = BedrockConfig::load_from_file(&args.config)?;
            if let Some(tick) = tick {
                config.tick_interval = tick.into();
            }
            run_loopback(config, encrypt, timeout.into()).await
        }
    }
}

/// Server-side application callbacks
struct LoopbackEvents {
    config: BedrockConfig,
    codec: Arc<PacketCodec>,
    sessions: mpsc::UnboundedSender<Arc<BedrockSession>>,
}

impl BedrockServerEventHandler for LoopbackEvents {
    fn on_connection_request(&self, address: SocketAddr, _real_address: SocketAddr) -> bool {
        component_info!("server", "Connection request from {}", address);
        true
    }

    fn on_query(&self, _address: SocketAddr) -> Option<BedrockPong> {
        Some(self.config.pong(self.codec.minecraft_version(), 0))
    }

    fn on_session_creation(&self, session: Arc<BedrockSession>) {
        component_info!("server", "Session created for {}", session.address());
        session.set_packet_codec(Arc::clone(&self.codec));
        let _ = self.sessions.send(session);
    }
}

/// Packets the server expects from the client
struct ServerPackets;

impl PacketHandler for ServerPackets {
    fn handle_client_to_server_handshake(&mut self, _packet: &ClientToServerHandshakePacket) -> bool {
        component_info!("server", "Client completed the handshake");
        true
    }

    fn handle_player_input(&mut self, packet: &PlayerInputPacket) -> bool {
        component_info!(
            "server",
            "Player input: motion=({}, {}) jumping={}",
            packet.input_motion.x,
            packet.input_motion.y,
            packet.jumping
        );
        true
    }
}

/// Packets the client expects from the server
struct ClientPackets {
    session: Weak<BedrockSession>,
    key: Option<SecretKey>,
}

impl PacketHandler for ClientPackets {
    fn handle_server_to_client_handshake(&mut self, packet: &ServerToClientHandshakePacket) -> bool {
        component_info!("client", "Server handshake with token {:?}", packet.jwt);
        let Some(session) = self.session.upgrade() else {
            return true;
        };

        if let Some(key) = self.key.take() {
            if let Err(e) = session.enable_encryption(key) {
                component_warn!("client", "Could not enable encryption: {}", e);
                return true;
            }
        }

        let reply = session.send(ClientToServerHandshakePacket).and_then(|_| {
            session.send(PlayerInputPacket {
                input_motion: Vector2f { x: 0.0, y: 1.0 },
                jumping: true,
                sneaking: false,
            })
        });
        if let Err(e) = reply {
            component_warn!("client", "Could not answer the handshake: {}", e);
        }
        true
    }

    fn handle_play_status(&mut self, packet: &PlayStatusPacket) -> bool {
        component_info!("client", "Play status {:?}", packet.status);
        true
    }

    fn handle_modal_form_request(&mut self, packet: &ModalFormRequestPacket) -> bool {
        component_info!("client", "Form {} requested: {}", packet.form_id, packet.form_data);
        true
    }

    fn handle_disconnect(&mut self, packet: &DisconnectPacket) -> bool {
        component_info!("client", "Disconnected by server: {}", packet.kick_message);
        true
    }
}

async fn run_loopback(
    config: BedrockConfig,
    encrypt: bool,
    limit: std::time::Duration,
) -> anyhow::Result<()> {
    let codec = codec_for_protocol(config.protocol_version)?
        .with_context(|| format!("unsupported protocol version {}", config.protocol_version))?;
    let session_config = config.session_config();
    let network = MemoryNetwork::new();

    let server = BedrockServer::new(
        Arc::new(network.server(config.bind_address)),
        session_config.clone(),
    )?;
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();
    server.set_handler(Arc::new(LoopbackEvents {
        config: config.clone(),
        codec: Arc::clone(&codec),
        sessions: session_tx,
    }));
    server.bind().await?;

    let client = BedrockClient::new(Arc::new(network.client()), session_config)?;
    client.bind().await?;

    let pong = client.ping(config.bind_address).await?;
    component_info!("client", "Server status: {}", pong);

    let key = encrypt.then(|| SecretKey::aes(rand::random::<[u8; 32]>()));

    // Sessions start on the compat table; both sides switch to the configured one
    let session = client.connect(config.bind_address).await?;
    session.set_packet_codec(Arc::clone(&codec));
    session.set_packet_handler(Box::new(ClientPackets {
        session: Arc::downgrade(&session),
        key: key.clone(),
    }));
    let (closed_tx, closed_rx) = oneshot::channel();
    session.add_disconnect_handler(move |reason| {
        let _ = closed_tx.send(reason);
    });

    let accepted = session_rx
        .recv()
        .await
        .context("server did not report the session")?;
    accepted.set_packet_handler(Box::new(ServerPackets));

    // The handshake goes out in clear text before the server switches ciphers
    accepted.send_immediately(ServerToClientHandshakePacket {
        jwt: "loopback".to_string(),
    })?;
    if let Some(key) = key {
        accepted.enable_encryption(key)?;
        component_info!("server", "Encryption enabled for {}", accepted.address());
    }

    accepted.send(PlayStatusPacket::new(PlayStatus::LoginSuccess))?;
    accepted.send(ModalFormRequestPacket {
        form_id: 1,
        form_data: r#"{"type":"modal","title":"Loopback"}"#.to_string(),
    })?;

    tokio::time::sleep(config.tick_interval * 4).await;
    accepted.disconnect_with_reason(Some("Loopback finished"), false)?;

    let reason = tokio::time::timeout(limit, closed_rx)
        .await
        .context("client was not disconnected in time")??;
    info!("Client session closed: {}", reason);

    server.close().await;
    client.close().await;
    Ok(())
}
