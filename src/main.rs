use std::{fs, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use whatsmeow_webhook::client::PairingScript;
use whatsmeow_webhook::logger;
use whatsmeow_webhook::store::{DeviceStore, FileStore};
use whatsmeow_webhook::{
    BridgeConfig, ConnectionState, EventBridge, LocalNetwork, Logger, Session, SessionManager,
};

/// Relay WhatsApp messages to a webhook and send its replies back.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the webhook URL.
    #[arg(long)]
    webhook_url: Option<String>,

    /// Answer every message with its own text instead of calling the webhook.
    #[arg(long)]
    echo: bool,

    /// Override the owner phone number.
    #[arg(long)]
    phone: Option<String>,

    /// Override the log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Choose a command to run.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Link a new device by scanning a QR code.
    Pair,
    /// Reconnect a previously linked device.
    Resume {
        /// Device JID; defaults to the configured or first stored device.
        #[arg(long)]
        device_jid: Option<String>,
    },
    /// Deliver one inbound text message and print the replies sent.
    Simulate {
        /// Sender phone number.
        #[arg(long)]
        from: String,
        /// Sender display name.
        #[arg(long, default_value = "Tester")]
        name: String,
        /// Message text.
        text: String,
    },
    /// Print the effective configuration.
    ShowConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Commands::ShowConfig = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let log = logger::init(&config.log_level, &config.log_format)?;
    let result = run(cli.command, &config, &log);
    log.flush();
    result
}

fn load_config(cli: &Cli) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(url) = &cli.webhook_url {
        config = config.with_webhook_url(url);
    }
    if cli.echo {
        config = config.with_echo_message(true);
    }
    if let Some(phone) = &cli.phone {
        config = config.with_phone(phone);
    }
    if let Some(level) = &cli.log_level {
        config = config.with_log_level(level);
    }
    Ok(config)
}

fn run(
    command: Commands,
    config: &BridgeConfig,
    log: &Logger,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let store = SessionManager::open_store(&config.database_name)?;
    let network = LocalNetwork::new();
    network.register_number(&config.phone);
    network.set_pairing(PairingScript {
        phone: config.phone.clone(),
        ..Default::default()
    });
    let manager = SessionManager::new(store.clone(), Arc::new(network.clone()), log);

    match command {
        Commands::Pair => {
            let session = pair(&manager, config)?;
            println!("Paired device: {}", session.jid());
            println!("Resume later with: resume --device-jid {}", session.jid());
        }
        Commands::Resume { device_jid } => {
            let Some(jid) = device_jid.or_else(|| known_device(config, &store)) else {
                eprintln!("No linked device found. Run the pair command first.");
                return Ok(());
            };
            let session = manager.resume_session(&jid, &config.phone)?;
            println!("Resumed {} ({})", session.jid(), session.state());
        }
        Commands::Simulate { from, name, text } => {
            let session = match known_device(config, &store) {
                Some(jid) => manager.resume_session(&jid, &config.phone)?,
                None => pair(&manager, config)?,
            };
            if session.state() != ConnectionState::Connected {
                return Err("session is not connected".into());
            }

            let bridge = Arc::new(EventBridge::for_session(config, &session, store.clone(), log));
            let handler_id = bridge.register();

            network.register_number(&from);
            let event = LocalNetwork::incoming_text(&from, &name, &text);
            for handle in network.deliver(session.jid(), event) {
                handle.join().map_err(|_| "event handler panicked")?;
            }
            bridge.unregister(handler_id);

            let sent = network.sent_messages();
            if sent.is_empty() {
                println!("No reply sent.");
            }
            for message in sent {
                match &message.message.image_message {
                    Some(image) => println!(
                        "-> {} [image {} bytes, {}] {}",
                        message.to,
                        image.file_length.unwrap_or_default(),
                        image.mimetype.as_deref().unwrap_or("unknown"),
                        image.caption.as_deref().unwrap_or_default()
                    ),
                    None => println!("-> {}: {}", message.to, message.message.text_content()),
                }
            }
        }
        Commands::ShowConfig => {}
    }

    Ok(())
}

fn pair(
    manager: &SessionManager,
    config: &BridgeConfig,
) -> Result<Session, Box<dyn std::error::Error>> {
    let qr_dir = PathBuf::from(&config.qr_dir);
    fs::create_dir_all(&qr_dir)?;
    Ok(manager.pair_new_session(&config.phone, &qr_dir, config.print_qr_terminal)?)
}

fn known_device(config: &BridgeConfig, store: &FileStore) -> Option<String> {
    config.device_jid.clone().or_else(|| {
        store
            .get_all_devices()
            .ok()?
            .into_iter()
            .find_map(|device| device.jid.map(|jid| jid.to_string()))
    })
}
