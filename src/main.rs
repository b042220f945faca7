//! CLI entry point: argument parsing, logging, credential bootstrap,
//! audio startup, and the run loop.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use parking_lot::Mutex;

use harken::audio::gate::CaptureGate;
use harken::audio::ring_buffer::FrameRing;
use harken::audio::{duplex, wav};
use harken::avs::{auth, SpeechClient};
use harken::config;
use harken::detector::EnergyDetector;
use harken::orchestrator::{Orchestrator, Sounds};

/// Speak a command, hear the answer: an always-on wake-word client for
/// the Alexa Voice Service.
#[derive(Parser, Debug)]
#[command(name = "harken", version, about)]
struct Args {
    /// Credentials config file (rewritten on token refresh)
    #[arg(short, long)]
    config: PathBuf,

    /// Sound confirming the assistant is listening (WAV, 16 kHz mono 16-bit)
    #[arg(short, long)]
    sound: Option<PathBuf>,

    /// Sound confirming the connection was lost (same format)
    #[arg(short, long)]
    lost: Option<PathBuf>,

    /// Also write each turn's decoded answer to this WAV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Display detailed messages
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut creds = config::load(&args.config)?;
    if creds.client_id.is_empty() || creds.client_secret.is_empty() {
        bail!(
            "config file {} must provide client_id and client_secret in the [alexa] section",
            args.config.display()
        );
    }

    let auth_http = reqwest::blocking::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    // One-time bootstrap: no refresh token yet means the user has not
    // granted consent for this device.
    if creds.refresh_token.is_empty() {
        bootstrap_credentials(&auth_http, &mut creds, &args.config)?;
    }

    let sounds = Sounds {
        listen: args.sound.as_deref().map(wav::read_mono16).transpose()?,
        lost: args.lost.as_deref().map(wav::read_mono16).transpose()?,
    };

    let capture = Arc::new(FrameRing::new());
    let playback = Arc::new(FrameRing::new());
    let gate = Arc::new(CaptureGate::new());

    let _audio = duplex::start(capture.clone(), playback.clone(), gate.clone())
        .context("audio device initialisation failed")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let mut orchestrator = Orchestrator {
        capture,
        capture_lock: Arc::new(Mutex::new(())),
        playback,
        playback_lock: Arc::new(Mutex::new(())),
        gate,
        detector: Box::new(EnergyDetector::default()),
        speech: SpeechClient::new().context("failed to build speech client")?,
        auth_http,
        creds,
        config_path: args.config,
        sounds,
        output_path: args.output,
        reask: false,
    };

    orchestrator.run(&running);
    tracing::info!("Shut down");
    Ok(())
}

/// Walk the user through the login-with-Amazon consent flow and persist
/// the resulting tokens. Failure here is fatal.
fn bootstrap_credentials(
    http: &reqwest::blocking::Client,
    creds: &mut config::Credentials,
    config_path: &std::path::Path,
) -> anyhow::Result<()> {
    println!(
        "Please open the following URL in your browser and follow the steps \
         until you see a blank page:"
    );
    println!("{}", auth::login_url(&creds.client_id));
    println!(
        "When ready, enter the value of the code parameter (from the URL of \
         the blank page) and press enter"
    );
    print!("Code: ");
    std::io::stdout().flush().ok();

    let mut code = String::new();
    std::io::stdin()
        .read_line(&mut code)
        .context("failed to read authorization code")?;
    let code = code.trim();
    if code.is_empty() {
        bail!("no authorization code entered");
    }

    let grant = auth::exchange_code(http, &creds.client_id, &creds.client_secret, code)
        .context("authorization code exchange failed")?;
    if grant.refresh_token.is_none() {
        bail!("token endpoint returned no refresh token");
    }

    creds.apply_grant(&grant, config::now_epoch());
    config::save(config_path, creds)?;
    tracing::info!("Credentials bootstrapped and saved");
    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::fmt::format::Writer;
    use tracing_subscriber::fmt::time::FormatTime;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl FormatTime for LocalTimer {
        fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let default = if verbose { "harken=debug,info" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(LocalTimer)
        .init();
}
