use anyhow::Result;
use clap::{Parser, Subcommand};
use skiphire_client::{InfinitePager, ProductsClient};
use skiphire_http::HttpClientConfig;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "skiphire")]
#[command(about = "Skip-hire product catalog server and client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the catalog HTTP server using settings from the environment.
    Serve,
    /// Page through a running catalog server the way the storefront does.
    Browse {
        #[arg(long, default_value = "http://localhost:5000")]
        base_url: String,
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Print the final loader state as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => skiphire_web::serve_from_env().await?,
        Commands::Browse {
            base_url,
            pages,
            json,
        } => browse(&base_url, pages, json).await?,
    }

    Ok(())
}

async fn browse(base_url: &str, pages: usize, json: bool) -> Result<()> {
    let client = ProductsClient::new(base_url, HttpClientConfig::default())?;
    let mut pager = InfinitePager::new(client);
    let loaded = pager.fetch_pages(pages).await;
    let state = pager.into_state();

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    for product in &state.products {
        println!(
            "{:>6}  {:<16} {:>10}  {}",
            product.id,
            product.title,
            product.price,
            product.image_url.as_deref().unwrap_or("-")
        );
    }
    println!(
        "pages loaded={} last_page={} products={} more={}",
        loaded,
        state.page,
        state.products.len(),
        state.has_next_page
    );
    if let Some(err) = &state.error {
        warn!(error = %err, "browse stopped early");
        eprintln!("error: {err}");
    }
    Ok(())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("LOG_JSON", false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_defaults_to_local_server() {
        let cli = Cli::try_parse_from(["skiphire", "browse"]).unwrap();
        match cli.command {
            Some(Commands::Browse {
                base_url,
                pages,
                json,
            }) => {
                assert_eq!(base_url, "http://localhost:5000");
                assert_eq!(pages, 1);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["skiphire"]).unwrap();
        assert!(cli.command.is_none());
    }
}
