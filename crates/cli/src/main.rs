use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bot: connect to Slack and answer messages until interrupted. Credentials come from SLACK_ACCESS_TOKEN, WIT_AI_SERVER_ACCESS_TOKEN and WOLFARM_APP_ID (a local .env file is read if present).
    Run {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Resolve one message with Wit.ai and print the selected entity and planned reply. Posts nothing.
    Intent {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Message text to resolve.
        text: String,
    },
}

#[tokio::main]
async fn main() {
    // Before the logger, so RUST_LOG can come from .env.
    let env_file = relay::config::load_env_file();
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Some(Commands::Run { .. }) => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    env_file.log();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_bot(config).await {
                log::error!("bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Intent { config, text }) => {
            if let Err(e) = run_intent(config, &text).await {
                log::error!("intent failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_bot(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = relay::config::load_config(config_path)?;
    log::info!("starting relay bot (config {})", path.display());
    relay::bot::run_bot(config).await
}

async fn run_intent(config_path: Option<std::path::PathBuf>, text: &str) -> anyhow::Result<()> {
    use relay::reply::ReplyPlan;

    let (config, _) = relay::config::load_config(config_path)?;
    let token = relay::config::resolve_wit_token(&config).ok_or_else(|| {
        anyhow::anyhow!("{} is not set", relay::config::WIT_TOKEN_ENV)
    })?;
    let wit = relay::intent::WitClient::new(
        token,
        config.wit.api_base.clone(),
        config.wit.api_version.clone(),
    );
    let result = wit.message(text).await?;
    let selected = relay::selector::select_entity(&result);
    let plan = match relay::reply::plan_reply(&selected) {
        ReplyPlan::Greeting => serde_json::json!({ "action": "greeting", "text": relay::reply::GREETING_TEXT }),
        ReplyPlan::KnowledgeQuery(q) => serde_json::json!({ "action": "knowledgeQuery", "query": q }),
        ReplyPlan::InvalidQuery { kind } => serde_json::json!({ "action": "none", "reason": format!("query value is {}", kind) }),
        ReplyPlan::Fallback => serde_json::json!({ "action": "fallback", "text": relay::reply::FALLBACK_TEXT }),
    };
    let categories: Vec<serde_json::Value> = result
        .entities
        .iter()
        .map(|(category, candidates)| {
            serde_json::json!({
                "category": category,
                "confidences": candidates.iter().map(|c| c.confidence).collect::<Vec<_>>(),
            })
        })
        .collect();
    let out = serde_json::json!({
        "entities": categories,
        "selected": {
            "category": selected.category,
            "confidence": selected.confidence(),
        },
        "reply": plan,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
