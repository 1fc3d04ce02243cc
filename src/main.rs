use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use tablecache::api::types::Review;
use tablecache::config::Config;
use tablecache::{logging, CachedClient};

#[derive(Parser, Debug)]
#[command(name = "tablecache")]
#[command(about = "Restaurant reviews with a local cache that works offline")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tablecache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Run without the local store; every read goes to the API
  #[arg(long, global = true)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List restaurants, optionally filtered
  Restaurants {
    #[arg(long)]
    cuisine: Option<String>,
    #[arg(long)]
    neighborhood: Option<String>,
  },
  /// Show one restaurant
  Restaurant { id: u64 },
  /// List the reviews of a restaurant
  Reviews { restaurant_id: u64 },
  /// List distinct neighborhoods
  Neighborhoods,
  /// List distinct cuisines
  Cuisines,
  /// Submit a review (queued locally if the API is unreachable)
  Review {
    #[arg(long)]
    restaurant_id: u64,
    #[arg(long)]
    name: String,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    rating: u8,
    #[arg(long, default_value = "")]
    comments: String,
  },
  /// Show reviews waiting in the offline queue
  Pending,
  /// Replay queued reviews against the API
  Sync,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if args.no_cache {
    config.cache.enabled = false;
  }

  let _log_guard = logging::init(&config.log)?;
  info!(api = %config.api.url, "tablecache starting");

  let client = CachedClient::from_config(&config)?;

  match args.command {
    Command::Restaurants {
      cuisine,
      neighborhood,
    } => {
      let restaurants = client
        .find_restaurants(cuisine.as_deref(), neighborhood.as_deref())
        .await?;
      print_json(&restaurants)
    }
    Command::Restaurant { id } => print_json(&client.restaurant(id).await?),
    Command::Reviews { restaurant_id } => print_json(&client.reviews_for(restaurant_id).await?),
    Command::Neighborhoods => print_json(&client.neighborhoods().await?),
    Command::Cuisines => print_json(&client.cuisines().await?),
    Command::Review {
      restaurant_id,
      name,
      rating,
      comments,
    } => {
      let draft = Review::draft(restaurant_id, &name, rating, &comments);
      print_json(&client.submit_review(draft).await?)
    }
    Command::Pending => print_json(&client.pending_reviews()?),
    Command::Sync => print_json(&client.reconcile_reviews().await?),
  }
}
