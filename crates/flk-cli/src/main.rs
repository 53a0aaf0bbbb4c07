//! flk: fractalock command-line interface
//!
//! Commands:
//!   encrypt <image>            - encrypt an image (or an area of it); writes cipher image + key material
//!   decrypt <cipher> <key>     - restore the original image from cipher image + key material
//!   fractal <width> <height>   - search for a screened keystream and save it as a preview
//!   identity new|show|sign     - seed-phrase identities and login challenge signing
//!   config show                - display the active configuration

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use flk_cipher::{
    open_key_material, seal_key_material, CipherEngine, FractalGenerator, KeyMaterial,
    KeystreamSource, QualityReport,
};
use flk_core::config::FlkConfig;
use flk_core::EncryptionArea;
use flk_crypto::identity::encode_signature;
use flk_crypto::{
    derive_key_pair, generate_phrase, CryptoSession, KdfParams, MasterSeed, SealedBox, SeedPhrase,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "flk",
    version,
    about = "fractalock image cipher",
    long_about = "flk: encrypt images with a Mandelbrot keystream and manage seed-phrase identities"
)]
struct Cli {
    /// Path to fractalock.toml configuration file
    #[arg(long, short = 'c', env = "FLK_CONFIG", default_value = "fractalock.toml")]
    config: PathBuf,

    /// Log level (overrides config; RUST_LOG takes precedence)
    #[arg(long, env = "FLK_LOG")]
    log: Option<String>,

    /// Log output format (overrides config)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt an image, or a rectangle of it
    ///
    /// The cipher image must be stored losslessly with its alpha channel,
    /// so only PNG, TIFF, and BMP outputs are accepted.
    Encrypt {
        /// Source image
        input: PathBuf,
        /// Cipher image path (default: <input>.enc.png)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Key material path (default: <output>.flk)
        #[arg(long, short = 'k')]
        key: Option<PathBuf>,
        /// Encrypt only this rectangle: x,y,width,height
        #[arg(long, value_parser = parse_area)]
        area: Option<AreaArg>,
        /// Embed the master seed in the key material, sealed under a passphrase
        #[arg(long)]
        embed_seed: bool,
        /// Seal the whole key material file under a passphrase
        #[arg(long)]
        protect: bool,
    },

    /// Restore an image from its cipher image and key material
    Decrypt {
        cipher: PathBuf,
        key: PathBuf,
        /// Output path (default: <cipher>.dec.png)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// The key material file was written with --protect
        #[arg(long)]
        protected: bool,
    },

    /// Search for a keystream that passes the diversity screen and save it
    Fractal {
        width: u32,
        height: u32,
        #[arg(long, short = 'o', default_value = "keystream.png")]
        output: PathBuf,
    },

    /// Seed-phrase identities
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum IdentityAction {
    /// Generate a new 12-word phrase and print its account id and public key
    New {
        /// Also store the phrase, sealed under a passphrase
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Print the registration record (user id + public key) for a phrase
    Show {
        /// Sealed phrase file written by `identity new --save`
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Sign a base64 login nonce
    Sign {
        nonce: String,
        #[arg(long)]
        from: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AreaArg {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn parse_area(s: &str) -> Result<AreaArg, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got '{s}'"));
    };
    let num = |v: &str| v.parse::<u32>().map_err(|e| format!("'{v}': {e}"));
    Ok(AreaArg {
        x: num(x)?,
        y: num(y)?,
        width: num(width)?,
        height: num(height)?,
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FlkConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.logging.format));
    init_logging(&level, format);

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            key,
            area,
            embed_seed,
            protect,
        } => {
            cmd_encrypt(
                config,
                &input,
                output.as_deref(),
                key.as_deref(),
                area,
                embed_seed,
                protect,
            )
            .await
        }
        Commands::Decrypt {
            cipher,
            key,
            output,
            protected,
        } => cmd_decrypt(config, &cipher, &key, output.as_deref(), protected).await,
        Commands::Fractal {
            width,
            height,
            output,
        } => cmd_fractal(config, width, height, &output).await,
        Commands::Identity { action } => match action {
            IdentityAction::New { save } => cmd_identity_new(&config, save.as_deref()).await,
            IdentityAction::Show { from } => cmd_identity_show(&config, from.as_deref()).await,
            IdentityAction::Sign { nonce, from } => {
                cmd_identity_sign(&config, &nonce, from.as_deref()).await
            }
        },
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current attempt");
            child.cancel();
        }
    });
    token
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn describe_rejection(attempt: u32, report: &QualityReport) -> String {
    format!(
        "keystream attempt {attempt} rejected ({} colors, top color {:.1}%, black {:.1}%)",
        report.unique_colors,
        report.max_color_share * 100.0,
        report.black_fraction * 100.0
    )
}

/// Passphrase from FLK_PASSPHRASE, or an interactive prompt.
fn read_passphrase(prompt: &str, confirm: bool) -> Result<SecretString> {
    if let Ok(value) = std::env::var("FLK_PASSPHRASE") {
        return Ok(SecretString::from(value));
    }
    let first = rpassword::prompt_password(format!("{prompt}: ")).context("reading passphrase")?;
    if first.is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    if confirm {
        let second = rpassword::prompt_password(format!("{prompt} (again): "))
            .context("reading passphrase")?;
        if first != second {
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(SecretString::from(first))
}

fn session(config: &FlkConfig) -> CryptoSession {
    CryptoSession::new(KdfParams::from(&config.kdf))
}

/// `<dir>/<stem>.<suffix>.png`
fn sibling_png(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    path.with_file_name(format!("{stem}.{suffix}.png"))
}

/// Cipher images carry data in fully transparent pixels; lossy or
/// alpha-less formats would corrupt them.
fn ensure_lossless(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "tif" | "tiff" | "bmp" => Ok(()),
        _ => anyhow::bail!(
            "{} must be a PNG, TIFF, or BMP file to keep the cipher image intact",
            path.display()
        ),
    }
}

// ── `flk encrypt` ─────────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: FlkConfig,
    input: &Path,
    output: Option<&Path>,
    key: Option<&Path>,
    area: Option<AreaArg>,
    embed_seed: bool,
    protect: bool,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling_png(input, "enc"));
    let key_path = key
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output.with_extension("flk"));
    ensure_lossless(&output)?;

    let image = image::open(input)
        .with_context(|| format!("reading image: {}", input.display()))?
        .to_rgba8();
    let area = match area {
        Some(a) => EncryptionArea::partial(a.x, a.y, a.width, a.height),
        None => EncryptionArea::whole(image.width(), image.height()),
    };
    area.validate_within(image.width(), image.height())?;

    // Prompt before the keystream search, not after it
    let seed_pass = if embed_seed {
        Some(read_passphrase("Seed passphrase", true)?)
    } else {
        None
    };
    let file_pass = if protect {
        Some(read_passphrase("Key file passphrase", true)?)
    } else {
        None
    };

    let engine = CipherEngine::from_config(&config)?;
    let cancel = cancel_on_ctrl_c();
    let spinner = make_spinner("encrypt");
    spinner.set_message("searching for a keystream");

    let pb = spinner.clone();
    let (mut encrypted, seed) = tokio::task::spawn_blocking(move || {
        let seed = MasterSeed::generate();
        let progress = |attempt: u32, report: &QualityReport| {
            pb.set_message(describe_rejection(attempt, report));
        };
        engine
            .encrypt_with(
                &image,
                &area,
                &seed,
                KeystreamSource::Search {
                    cancel: &cancel,
                    progress: Some(&progress),
                },
            )
            .map(|out| (out, seed))
    })
    .await
    .context("encryption task failed")??;
    spinner.finish_and_clear();

    let session = session(&config);
    if let Some(pass) = &seed_pass {
        encrypted
            .key_material
            .seal_seed(&seed, pass.expose_secret().as_bytes(), &session)?;
    }
    drop(seed);

    encrypted
        .image
        .save(&output)
        .with_context(|| format!("writing cipher image: {}", output.display()))?;

    let blob = match &file_pass {
        Some(pass) => seal_key_material(
            &encrypted.key_material,
            pass.expose_secret().as_bytes(),
            &session,
        )?,
        None => encrypted.key_material.to_bytes()?,
    };
    tokio::fs::write(&key_path, blob)
        .await
        .with_context(|| format!("writing key material: {}", key_path.display()))?;

    println!("cipher image:  {}", output.display());
    println!("key material:  {}", key_path.display());
    Ok(())
}

// ── `flk decrypt` ─────────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: FlkConfig,
    cipher_path: &Path,
    key_path: &Path,
    output: Option<&Path>,
    protected: bool,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling_png(cipher_path, "dec"));

    let blob = tokio::fs::read(key_path)
        .await
        .with_context(|| format!("reading key material: {}", key_path.display()))?;
    let key_material = if protected {
        let pass = read_passphrase("Key file passphrase", false)?;
        open_key_material(&blob, pass.expose_secret().as_bytes(), &session(&config))?
    } else {
        KeyMaterial::from_bytes(&blob)
            .with_context(|| format!("parsing key material: {}", key_path.display()))?
    };

    let cipher = image::open(cipher_path)
        .with_context(|| format!("reading cipher image: {}", cipher_path.display()))?
        .to_rgba8();

    let engine = CipherEngine::from_config(&config)?;
    let spinner = make_spinner("decrypt");
    spinner.set_message("rendering keystream");
    let plain = tokio::task::spawn_blocking(move || engine.decrypt(&cipher, &key_material))
        .await
        .context("decryption task failed")??;
    spinner.finish_and_clear();

    plain
        .save(&output)
        .with_context(|| format!("writing image: {}", output.display()))?;
    println!("decrypted image: {}", output.display());
    Ok(())
}

// ── `flk fractal` ─────────────────────────────────────────────────────────────

async fn cmd_fractal(config: FlkConfig, width: u32, height: u32, output: &Path) -> Result<()> {
    let generator = FractalGenerator::from_config(&config.generator)?;
    let cancel = cancel_on_ctrl_c();
    let spinner = make_spinner("fractal");
    spinner.set_message(format!("searching {width}x{height}"));

    let pb = spinner.clone();
    let found = tokio::task::spawn_blocking(move || {
        let progress = |attempt: u32, report: &QualityReport| {
            pb.set_message(describe_rejection(attempt, report));
        };
        generator.generate_validated(width, height, &cancel, Some(&progress))
    })
    .await
    .context("fractal task failed")??;
    spinner.finish_and_clear();

    found
        .image
        .save(output)
        .with_context(|| format!("writing keystream: {}", output.display()))?;

    let summary = serde_json::json!({
        "output": output.display().to_string(),
        "attempts": found.attempts,
        "params": found.params,
        "quality": found.report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── `flk identity` ────────────────────────────────────────────────────────────

async fn load_phrase(config: &FlkConfig, from: Option<&Path>) -> Result<SeedPhrase> {
    let Some(path) = from else {
        let words = rpassword::prompt_password("Seed phrase: ").context("reading seed phrase")?;
        return Ok(SeedPhrase::parse(&words)?);
    };

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading phrase file: {}", path.display()))?;
    let sealed = SealedBox::from_bytes(&data)
        .with_context(|| format!("parsing phrase file: {}", path.display()))?;
    let pass = read_passphrase("Phrase passphrase", false)?;
    let words = session(config).open(&sealed, pass.expose_secret().as_bytes())?;
    let words = String::from_utf8(words).context("phrase file is not UTF-8")?;
    Ok(SeedPhrase::parse(&words)?)
}

async fn cmd_identity_new(config: &FlkConfig, save: Option<&Path>) -> Result<()> {
    let phrase = generate_phrase()?;
    let key_pair = derive_key_pair(&phrase)?;

    println!("Write these words down. They are the only way to recover this identity.");
    println!();
    for (i, word) in phrase.words().iter().enumerate() {
        println!("  {:>2}. {word}", i + 1);
    }
    println!();
    println!("user id:     {}", key_pair.user_id());
    println!("public key:  {}", key_pair.public_key_base64());

    if let Some(path) = save {
        let pass = read_passphrase("Phrase passphrase", true)?;
        let sealed = session(config).seal(phrase.phrase().as_bytes(), pass.expose_secret().as_bytes())?;
        tokio::fs::write(path, sealed.to_bytes()?)
            .await
            .with_context(|| format!("writing phrase file: {}", path.display()))?;
        println!("sealed phrase: {}", path.display());
    }
    Ok(())
}

async fn cmd_identity_show(config: &FlkConfig, from: Option<&Path>) -> Result<()> {
    let key_pair = derive_key_pair(&load_phrase(config, from).await?)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&key_pair.public_identity())?
    );
    Ok(())
}

async fn cmd_identity_sign(config: &FlkConfig, nonce: &str, from: Option<&Path>) -> Result<()> {
    let nonce = STANDARD
        .decode(nonce.trim())
        .context("nonce is not valid base64")?;
    let key_pair = derive_key_pair(&load_phrase(config, from).await?)?;
    println!("{}", encode_signature(&key_pair.sign(&nonce)));
    Ok(())
}

// ── `flk config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &FlkConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
