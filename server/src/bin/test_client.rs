//! Scripted bot for poking at a running server from the terminal.

use arena_shared::{decode_snapshot, ServerMessage};
use clap::Parser;
use log::{info, warn};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Comma separated commands to send, one per interval
    #[arg(short = 'm', long, default_value = "D,D,L,W,I,A,J,S,K")]
    moves: String,

    /// Delay between commands in milliseconds
    #[arg(short = 'i', long, default_value = "250")]
    interval: u64,

    /// Print decoded snapshots as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let moves: Vec<String> = args
        .moves
        .split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    for command in moves {
        writer.write_all(format!("{}\n", command).as_bytes()).await?;
        println!("> {}", command);

        // Drain whatever arrived while we waited.
        let deadline = sleep(Duration::from_millis(args.interval));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                line = lines.next_line() => match line? {
                    Some(line) => print_line(&line, args.json)?,
                    None => {
                        println!("Server closed the connection");
                        return Ok(());
                    }
                },
            }
        }
    }

    writer.write_all(b"Q\n").await?;
    println!("> Q");

    // The server closes the socket after a quit; show anything still in flight.
    while let Ok(Ok(Some(line))) = timeout(Duration::from_secs(1), lines.next_line()).await {
        print_line(&line, args.json)?;
    }

    println!("Test client finished");
    Ok(())
}

fn print_line(line: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    match line.parse::<ServerMessage>() {
        Ok(ServerMessage::GameState(payload)) => {
            let records = decode_snapshot(&payload)?;
            if json {
                println!("{}", serde_json::to_string(&records)?);
            } else {
                println!("Game state: {} entities", records.len());
                for record in records {
                    println!("  {}", record);
                }
            }
        }
        Ok(message) => println!("{}", message),
        Err(e) => warn!("Unexpected line {:?}: {}", line, e),
    }
    Ok(())
}
