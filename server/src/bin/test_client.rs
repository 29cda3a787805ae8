use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Appearance, ClientMessage, ServerMessage, Vec3};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const SHIRT_COLORS: [&str; 8] = [
    "blue", "red", "green", "purple", "orange", "cyan", "magenta", "yellow",
];

/// Scripted client: joins, walks in a circle, changes shirt color now and then, and leaves
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the relay server
    #[arg(short, long, default_value = "ws://127.0.0.1:3001/ws")]
    url: String,

    /// Display name, random when omitted
    #[arg(short = 'n', long)]
    username: Option<String>,

    /// Number of MOVE messages to send
    #[arg(short, long, default_value = "20")]
    steps: u32,

    /// Delay between moves in milliseconds
    #[arg(short, long, default_value = "250")]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut rng = rand::thread_rng();

    let player_id: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    let username = args
        .username
        .unwrap_or_else(|| format!("Player{}", rng.gen_range(0..1000)));

    info!("Connecting to {} as {} ({})", args.url, username, player_id);
    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Print every snapshot as it arrives
    let own_id = player_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServerMessage::from_json(text.as_str()) {
                    Ok(ServerMessage::Connected) => info!("Server acknowledged connection"),
                    Ok(ServerMessage::GameState { players }) => {
                        let others: Vec<String> = players
                            .iter()
                            .filter(|p| p.id != own_id)
                            .map(|p| {
                                format!(
                                    "{}@({:.1}, {:.1}, {:.1})",
                                    p.username, p.position.x, p.position.y, p.position.z
                                )
                            })
                            .collect();
                        info!(
                            "Game state: {} players, others: [{}]",
                            players.len(),
                            others.join(", ")
                        );
                    }
                    Err(e) => warn!("Failed to decode server message: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    info!("Server closed connection: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Error receiving message: {}", e);
                    break;
                }
            }
        }
    });

    let join = ClientMessage::Join {
        player_id: player_id.clone(),
        username,
    };
    ws_sender.send(Message::text(join.to_json()?)).await?;

    let radius = 5.0;
    for step in 0..args.steps {
        let angle = step as f64 / args.steps.max(1) as f64 * std::f64::consts::TAU;
        let movement = ClientMessage::Move {
            player_id: player_id.clone(),
            position: Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin()),
            rotation: Vec3::new(0.0, -angle, 0.0),
        };
        ws_sender.send(Message::text(movement.to_json()?)).await?;

        if step % 10 == 0 {
            if let Some(color) = SHIRT_COLORS.choose(&mut rng) {
                let appearance = ClientMessage::Appearance {
                    player_id: player_id.clone(),
                    appearance: Appearance::from([(
                        "shirtColor".to_string(),
                        color.to_string(),
                    )]),
                };
                ws_sender.send(Message::text(appearance.to_json()?)).await?;
            }
        }

        sleep(Duration::from_millis(args.interval)).await;
    }

    let leave = ClientMessage::Leave { player_id };
    ws_sender.send(Message::text(leave.to_json()?)).await?;
    ws_sender.close().await?;

    let _ = tokio::time::timeout(Duration::from_secs(2), reader).await;
    info!("Test client finished");

    Ok(())
}
