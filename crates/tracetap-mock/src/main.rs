use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracetap_mock::ai::{AiDelegate, AnthropicDelegate};
use tracetap_mock::config::{MatchingStrategy, ResponseMode};
use tracetap_mock::{load_captures, MockConfig, MockServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Serve captured HTTP traffic as a mock API
#[derive(Parser, Debug)]
#[command(name = "tracetap-mock")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture corpus (JSON array, or object with `requests`/`captures`)
    #[arg(long)]
    captures: PathBuf,

    /// YAML configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// exact | fuzzy | pattern | semantic
    #[arg(short, long)]
    strategy: Option<MatchingStrategy>,

    /// Minimum fuzzy score for a match, 0.0 to 1.0
    #[arg(long)]
    min_score: Option<f64>,

    /// static | template | transform | faker | ai | intelligent
    #[arg(long)]
    response_mode: Option<ResponseMode>,

    /// Fixed delay added to every response
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Fraction of requests to fail; enables chaos when set
    #[arg(long)]
    chaos_rate: Option<f64>,

    /// Record served requests for export and replay
    #[arg(long)]
    record: bool,

    /// Track diffs for unmatched and low-scoring requests
    #[arg(long)]
    diff: bool,

    /// Disable the match result cache
    #[arg(long)]
    no_cache: bool,

    /// Enable the AI delegate for semantic matching and AI responses
    #[arg(long)]
    ai: bool,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    ai_api_key: Option<String>,

    /// Log match details at info level
    #[arg(short, long)]
    verbose: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut MockConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(strategy) = self.strategy {
            config.matching.strategy = strategy;
        }
        if let Some(min_score) = self.min_score {
            config.matching.min_score = min_score;
        }
        if let Some(mode) = self.response_mode {
            config.response.mode = mode;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.delay.fixed_ms = delay_ms;
        }
        if let Some(rate) = self.chaos_rate {
            config.chaos.enabled = true;
            config.chaos.failure_rate = rate;
        }
        if self.record {
            config.recording.enabled = true;
        }
        if self.diff {
            config.diff.enabled = true;
        }
        if self.no_cache {
            config.matching.cache_enabled = false;
        }
        if self.ai {
            config.ai.enabled = true;
        }
        if self.verbose {
            config.server.verbose = true;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        config.ai.api_key = self.ai_api_key.clone();
    }
}

fn ai_delegate(config: &MockConfig) -> Option<Arc<dyn AiDelegate>> {
    if !config.ai.enabled {
        return None;
    }
    match AnthropicDelegate::from_config(&config.ai) {
        Ok(delegate) => Some(Arc::new(delegate)),
        Err(e) => {
            warn!("AI features disabled: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MockConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MockConfig::default(),
    };
    args.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let captures = load_captures(&args.captures)
        .with_context(|| format!("loading captures {}", args.captures.display()))?;
    info!("Loaded {} captures from {}", captures.len(), args.captures.display());

    let ai = ai_delegate(&config);
    let server = Arc::new(MockServer::new(config, captures, ai)?);

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
