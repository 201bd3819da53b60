use std::io::{self, BufRead, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use tracing_subscriber::EnvFilter;

use qumail_core::{cipher, Payload, ProtocolVariant};
use qumail_handshake::{
    start_as_initiator, start_as_responder, HandshakeError, HandshakeOptions, MessageChannel,
    SessionRegistry, WsChannel,
};

const DEFAULT_SERVER: &str = "ws://127.0.0.1:8080";

#[derive(Debug)]
struct Config {
    server_url: String,
    user_id: String,
    peer_id: Option<String>,
    session_id: Option<String>,
    listen: bool,
    multi_factor: bool,
    raw_key_target_bits: usize,
}

fn usage() -> ! {
    eprintln!("usage: qumail --user <id> --peer <id> [options]     initiate a handshake");
    eprintln!("       qumail --user <id> --listen [options]        answer incoming handshakes");
    eprintln!();
    eprintln!("options:");
    eprintln!("  --server <url>    relay url (default {})", DEFAULT_SERVER);
    eprintln!("  --session <id>    session id (default: random)");
    eprintln!("  --mf              use the multi-factor variant");
    eprintln!("  --bits <n>        raw key target bits (default 512)");
    std::process::exit(2);
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();

    let mut server_url = DEFAULT_SERVER.to_string();
    let mut user_id = String::new();
    let mut peer_id = None;
    let mut session_id = None;
    let mut listen = false;
    let mut multi_factor = false;
    let mut raw_key_target_bits = 512;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" if i + 1 < args.len() => {
                server_url = args[i + 1].clone();
                i += 1;
            }
            "--user" if i + 1 < args.len() => {
                user_id = args[i + 1].clone();
                i += 1;
            }
            "--peer" if i + 1 < args.len() => {
                peer_id = Some(args[i + 1].clone());
                i += 1;
            }
            "--session" if i + 1 < args.len() => {
                session_id = Some(args[i + 1].clone());
                i += 1;
            }
            "--bits" if i + 1 < args.len() => {
                raw_key_target_bits = args[i + 1].parse().unwrap_or(512);
                i += 1;
            }
            "--listen" => listen = true,
            "--mf" => multi_factor = true,
            _ => usage(),
        }
        i += 1;
    }

    if user_id.is_empty() || (peer_id.is_none() && !listen) {
        usage();
    }

    Config {
        server_url,
        user_id,
        peer_id,
        session_id,
        listen,
        multi_factor,
        raw_key_target_bits,
    }
}

fn random_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    line.trim_end().to_string()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = parse_args();

    let channel = match WsChannel::connect(&config.server_url, &config.user_id).await {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("cannot reach relay at {}: {}", config.server_url, e);
            std::process::exit(1);
        }
    };
    let registry = SessionRegistry::new();

    if config.listen {
        listen_loop(&channel, &registry, &config).await;
    } else {
        initiate(&channel, &registry, &config).await;
    }
}

async fn initiate(channel: &WsChannel, registry: &SessionRegistry, config: &Config) {
    let peer_id = config.peer_id.as_deref().unwrap_or_default();
    let session_id = config.session_id.clone().unwrap_or_else(random_session_id);
    let variant = if config.multi_factor {
        ProtocolVariant::MultiFactor
    } else {
        ProtocolVariant::TwoState
    };
    let options = HandshakeOptions::new(variant).with_raw_key_target_bits(config.raw_key_target_bits);

    println!("Session: {}", session_id);
    println!("Peer:    {} ({})", peer_id, variant);

    let result = start_as_initiator(
        channel,
        registry,
        |line| println!("  {}", line),
        &config.user_id,
        peer_id,
        options,
        &session_id,
    )
    .await;

    match result {
        Ok(key) => {
            println!("Key fingerprint: {}", key.fingerprint());
            println!("Key (hex):       {}", key.to_hex());

            let message = read_line("Message to seal (empty to skip): ");
            if !message.is_empty() {
                match cipher::seal(&key, message.as_bytes(), &mut rand::thread_rng()) {
                    Ok(package) => println!("Sealed: {}", package),
                    Err(e) => eprintln!("seal failed: {}", e),
                }
            }
        }
        Err(HandshakeError::SecurityRejection { qber, threshold }) => {
            eprintln!(
                "SECURITY: session rejected, QBER {:.2}% over the {:.0}% threshold.",
                qber * 100.0,
                threshold * 100.0
            );
            eprintln!("The channel may be monitored. No key was produced.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("handshake failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn listen_loop(channel: &WsChannel, registry: &SessionRegistry, config: &Config) {
    println!("Listening as '{}'. Ctrl-C to quit.", config.user_id);
    let mut rx = channel.subscribe();

    loop {
        let envelope = match rx.recv().await {
            Ok(envelope) => envelope,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                eprintln!("relay connection lost");
                return;
            }
        };

        if envelope.to != config.user_id || !matches!(envelope.payload, Payload::Initiate { .. }) {
            continue;
        }

        println!("Incoming handshake from '{}' (session {})", envelope.from, envelope.session_id);
        let result = start_as_responder(
            envelope,
            channel,
            registry,
            |line| println!("  {}", line),
            &config.user_id,
        )
        .await;

        match result {
            Ok(key) => {
                println!("Key fingerprint: {}", key.fingerprint());
                println!("Key (hex):       {}", key.to_hex());

                let package = read_line("Sealed package to open (empty to skip): ");
                if !package.is_empty() {
                    match cipher::open(&key, &package) {
                        Ok(plaintext) => {
                            println!("Opened: {}", String::from_utf8_lossy(&plaintext))
                        }
                        Err(e) => eprintln!("open failed: {}", e),
                    }
                }
            }
            Err(HandshakeError::SecurityRejection { qber, threshold }) => {
                eprintln!(
                    "SECURITY: session rejected, QBER {:.2}% over the {:.0}% threshold.",
                    qber * 100.0,
                    threshold * 100.0
                );
            }
            Err(HandshakeError::DuplicateSession(id)) => {
                // A re-delivered initiate for a session already in flight.
                eprintln!("ignoring duplicate initiate for session {}", id);
            }
            Err(e) => eprintln!("handshake failed: {}", e),
        }
    }
}
