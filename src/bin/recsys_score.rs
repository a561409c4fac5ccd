//! recsys-score: command-line client for recsys-proxyd.
//!
//! ```text
//! recsys-score --model ranker --item 11 --item 12 --field country=US --field session=ab12
//! ```

use clap::Parser;

use recsys_proxy_cache::client::ScoreClient;
use recsys_proxy_cache::{Context, ScoreRequest};

/// Request scores from a running recsys-proxyd.
#[derive(Parser)]
#[command(name = "recsys-score")]
#[command(version = recsys_proxy_cache::PKG_VERSION)]
#[command(about = "Recommendation score caching proxy client")]
struct Args {
    /// Server address
    #[arg(
        short,
        long,
        env = "RECSYS_PROXY_ADDRESS",
        default_value = "http://127.0.0.1:50051"
    )]
    address: String,

    /// Model to score with
    #[arg(short, long)]
    model: String,

    /// Item to score (repeatable)
    #[arg(short, long = "item", required = true)]
    items: Vec<i64>,

    /// Context field as key=v1,v2 (repeatable)
    #[arg(short, long = "field", value_parser = parse_field)]
    fields: Vec<(String, Vec<String>)>,
}

fn parse_field(raw: &str) -> Result<(String, Vec<String>), String> {
    let (key, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value[,value...], got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty field name in '{raw}'"));
    }
    let values = if values.is_empty() {
        Vec::new()
    } else {
        values.split(',').map(str::to_string).collect()
    };
    Ok((key.to_string(), values))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut context = Context::new();
    for (key, values) in args.fields {
        context.fields.entry(key).or_default().extend(values);
    }
    let request = ScoreRequest::new(args.model, context, args.items);

    let client = ScoreClient::connect(&args.address).await?;
    let scores = client.get_scores(&request).await?;

    for (item, score) in request.items.iter().zip(&scores) {
        println!("{item}\t{score}");
    }
    Ok(())
}
