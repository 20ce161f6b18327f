use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tag_relay::bot::handlers::{
    handle_edited_message, handle_group_message, handle_like_callback, has_hashtag, Command,
};
use tag_relay::bot::watch::{handle_channel_post, handle_watch_callback, handle_watch_command};
use tag_relay::comments::ChannelComments;
use tag_relay::config::Settings;
use tag_relay::likes::{DISLIKE_CALLBACK, LIKE_CALLBACK};
use tag_relay::platform::TelegramRelay;
use tag_relay::relay::RelayEngine;
use tag_relay::storage::R2Storage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    r2_1: Regex,
    r2_2: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/[^'\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            r2_1: Regex::new(r"R2_ACCESS_KEY_ID=[^\s&]+")?,
            r2_2: Regex::new(r"R2_SECRET_ACCESS_KEY=[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .r2_1
            .replace_all(&output, "R2_ACCESS_KEY_ID=[MASKED]")
            .to_string();
        output = self
            .r2_2
            .replace_all(&output, "R2_SECRET_ACCESS_KEY=[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting Tag Relay Bot...");

    // Load settings
    let settings = init_settings();

    // Initialize storage
    let storage = init_storage(&settings).await;

    // Initialize Bot
    let bot = Bot::new(settings.telegram_token.clone());

    // Wire the relay engine: Telegram transport, R2-backed ledger and
    // ballots, comment seeding through the same bot account.
    let platform = Arc::new(TelegramRelay::new(bot.clone()));
    let comments = Arc::new(ChannelComments::new(bot.clone()));
    let engine = Arc::new(RelayEngine::new(
        platform,
        storage.clone(),
        comments,
        storage.clone(),
    ));

    // Setup handlers
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine, storage])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_storage(settings: &Settings) -> Arc<R2Storage> {
    match R2Storage::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if s.check_connection().await.is_ok() {
                // Success message already logged in check_connection
            } else {
                error!("R2 Storage connection check returned error.");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(|q: CallbackQuery| {
                    matches!(q.data.as_deref(), Some(LIKE_CALLBACK) | Some(DISLIKE_CALLBACK))
                })
                .endpoint(handle_vote),
        )
        .branch(Update::filter_callback_query().endpoint(handle_picker))
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| has_hashtag(&msg))
                .endpoint(handle_tagged),
        )
        .branch(Update::filter_edited_message().endpoint(handle_edited))
        .branch(Update::filter_channel_post().endpoint(handle_channel))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    storage: Arc<R2Storage>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Watch => handle_watch_command(bot, msg, storage).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_picker(
    bot: Bot,
    q: CallbackQuery,
    storage: Arc<R2Storage>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_watch_callback(bot, q, storage).await {
        error!("Watch callback handler error: {}", e);
    }
    respond(())
}

async fn handle_channel(
    bot: Bot,
    msg: Message,
    storage: Arc<R2Storage>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_channel_post(bot, msg, storage).await {
        error!("Channel post handler error: {}", e);
    }
    respond(())
}

async fn handle_tagged(
    msg: Message,
    engine: Arc<RelayEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_group_message(msg, engine).await {
        error!("Relay handler error: {}", e);
    }
    respond(())
}

async fn handle_edited(
    msg: Message,
    engine: Arc<RelayEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_edited_message(msg, engine).await {
        error!("Edit handler error: {}", e);
    }
    respond(())
}

async fn handle_vote(
    bot: Bot,
    q: CallbackQuery,
    storage: Arc<R2Storage>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_like_callback(bot, q, storage).await {
        error!("Like callback handler error: {}", e);
    }
    respond(())
}
