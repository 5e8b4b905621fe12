use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;

use protoquote::config::AppConfig;
use protoquote::pricing::{PricingEngine, QuoteInput};
use protoquote::server;
use protoquote::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "protoquote",
    about = "Run the PCB quoting service or price a board from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP quoting service (default).
    Serve,
    /// Price a single board and print the quote as JSON.
    Quote(QuoteArgs),
    /// Print the active pricing tables as JSON.
    Info,
}

#[derive(Args, Debug)]
struct QuoteArgs {
    /// Board width in millimeters.
    #[arg(long)]
    width: f64,
    /// Board height in millimeters.
    #[arg(long)]
    height: f64,
    #[arg(long, default_value_t = 5)]
    quantity: u32,
    /// Base material label, e.g. "FR-4" or "Flex".
    #[arg(long)]
    material: Option<String>,
    /// Board thickness, e.g. "1.6mm".
    #[arg(long)]
    thickness: Option<String>,
    /// Soldermask color, e.g. "green".
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    tenant: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("starting quote service");
            server::serve(&config).await?;
        }
        Command::Quote(args) => {
            let engine = PricingEngine::new(config.pricing.engine_settings());
            let input = QuoteInput {
                parameters: quote_parameters(&args),
                width_mm: args.width,
                height_mm: args.height,
                tenant_id: args.tenant,
                user_id: None,
                request_id: None,
            };
            let result = engine.quote(&input).await?;
            println!("{}", serde_json::to_string_pretty(&result.to_response())?);
        }
        Command::Info => {
            let engine = PricingEngine::new(config.pricing.engine_settings());
            println!("{}", serde_json::to_string_pretty(&engine.pricing_info())?);
        }
    }
    Ok(())
}

fn quote_parameters(args: &QuoteArgs) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("quantity".to_owned(), json!(args.quantity));
    if let Some(material) = &args.material {
        parameters.insert("base_material".to_owned(), json!(material));
    }
    if let Some(thickness) = &args.thickness {
        parameters.insert("thickness".to_owned(), json!(thickness));
    }
    if let Some(color) = &args.color {
        parameters.insert("pcb_color".to_owned(), json!(color));
    }
    parameters
}
