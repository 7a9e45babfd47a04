use std::env;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use genai_anthropic::config::{ModelConfig, ResolvedConfig, Variant};
use genai_anthropic::error::{Error, Result};
use genai_anthropic::format::anthropic::MessagesResponse;
use genai_anthropic::format::genai::LlmRequest;
use genai_anthropic::format::sse::SseDecoder;
use genai_anthropic::format::to_anthropic::{RequestOptions, build_request};
use genai_anthropic::format::to_genai::convert_response;
use genai_anthropic::model::ensure_user_turn;
use genai_anthropic::stream::accumulate;

const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

struct Options {
    command: String,
    input: PathBuf,
    config: Option<PathBuf>,
    model: Option<String>,
    vertex: bool,
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);

    init_logging(options.debug);

    let result = match options.command.as_str() {
        "request" => run_request(&options),
        "response" => run_response(&options),
        "stream" => run_stream(&options).await,
        other => {
            eprintln!("\x1b[31mUnknown command:\x1b[0m {}", other);
            eprintln!();
            eprintln!("Run '\x1b[33mgenai-anthropic --help\x1b[0m' for usage information.");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("\x1b[31mError:\x1b[0m {}", e);
        if let Some(suggestion) = e.suggestion() {
            eprintln!();
            eprintln!("  \x1b[33mTip:\x1b[0m {}", suggestion);
        }
        std::process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Options {
    let mut positional = Vec::new();
    let mut config = None;
    let mut model = None;
    let mut vertex = false;
    let mut debug = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => missing_value("--config requires a file path"),
                }
            }
            "--model" | "-m" => {
                i += 1;
                match args.get(i) {
                    Some(name) => model = Some(name.clone()),
                    None => missing_value("--model requires a model name"),
                }
            }
            "--vertex" => vertex = true,
            "--debug" | "-d" => debug = true,
            "-h" | "--help" | "help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" | "version" => {
                println!("genai-anthropic {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("\x1b[31mUnknown option:\x1b[0m {}", arg);
                eprintln!();
                eprintln!("Run '\x1b[33mgenai-anthropic --help\x1b[0m' for usage information.");
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let (Some(command), Some(input)) = (positional.next(), positional.next()) else {
        print_help();
        std::process::exit(1);
    };

    Options {
        command,
        input: PathBuf::from(input),
        config,
        model,
        vertex,
        debug,
    }
}

fn missing_value(message: &str) -> ! {
    eprintln!("\x1b[31mMissing value:\x1b[0m {}", message);
    std::process::exit(1);
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("genai_anthropic=debug,warn"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("genai_anthropic=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

fn load_config(options: &Options) -> Result<ResolvedConfig> {
    let config = match &options.config {
        Some(path) => ModelConfig::load(path)?,
        None => ModelConfig::default(),
    };
    let variant = options.vertex.then_some(Variant::VertexAi);
    Ok(config.with_overrides(variant, None).resolve()?)
}

fn read_input(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "Reading input");
    Ok(std::fs::read_to_string(path)?)
}

/// Print the Messages API request for a UCM request file.
fn run_request(options: &Options) -> Result<()> {
    let config = load_config(options)?;
    let request: LlmRequest = serde_json::from_str(&read_input(&options.input)?)?;

    let model = options
        .model
        .clone()
        .or_else(|| request.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let request_options = RequestOptions {
        model,
        default_max_tokens: config.default_max_tokens,
        variant: config.variant,
    };

    let contents = ensure_user_turn(&request.contents);
    let prepared = build_request(&contents, request.config.as_ref(), &request_options)
        .map_err(Error::Request)?;

    info!(
        surface = ?prepared.surface,
        strip_fences = prepared.strip_fences,
        "Converted request"
    );
    if !prepared.request.betas.is_empty() {
        eprintln!("anthropic-beta: {}", prepared.request.betas.join(","));
    }
    println!("{}", serde_json::to_string_pretty(&prepared.request)?);
    Ok(())
}

/// Print the UCM response for a Messages API response file.
fn run_response(options: &Options) -> Result<()> {
    let message: MessagesResponse = serde_json::from_str(&read_input(&options.input)?)?;
    let mut response = convert_response(&message).map_err(Error::Response)?;
    response.turn_complete = true;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Replay a captured event stream, printing every emission as a JSON line.
async fn run_stream(options: &Options) -> Result<()> {
    let capture = read_input(&options.input)?;

    let mut decoder = SseDecoder::new();
    let mut events = decoder.feed(&capture);
    events.extend(decoder.finish());
    info!(events = events.len(), "Decoded event stream");

    let mut responses = Box::pin(accumulate(futures::stream::iter(events)));
    while let Some(response) = responses.next().await {
        println!("{}", serde_json::to_string(&response?)?);
    }
    Ok(())
}

fn print_help() {
    println!(
        "genai-anthropic {}

Convert between genai content and the Anthropic Messages API.

\x1b[1mUSAGE:\x1b[0m
    genai-anthropic <COMMAND> <FILE> [OPTIONS]

\x1b[1mCOMMANDS:\x1b[0m
    request <FILE>     Print the Messages API request for a genai request (JSON)
    response <FILE>    Print the genai response for a Messages API message (JSON)
    stream <FILE>      Replay an SSE capture and print each emitted response

\x1b[1mOPTIONS:\x1b[0m
    -c, --config <PATH>    Model config file (TOML)
    -m, --model <NAME>     Model name (default: {})
        --vertex           Use the Vertex AI deployment
    -d, --debug            Enable debug logging
    -h, --help             Print help
    -V, --version          Print version

\x1b[1mENVIRONMENT:\x1b[0m
    ANTHROPIC_API_KEY, ANTHROPIC_USE_VERTEX,
    GOOGLE_CLOUD_PROJECT, GOOGLE_CLOUD_LOCATION, RUST_LOG",
        env!("CARGO_PKG_VERSION"),
        DEFAULT_MODEL
    );
}
