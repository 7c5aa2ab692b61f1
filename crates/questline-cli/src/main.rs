// ============================================================================
// questline-db - CLI for inspecting and driving the Questline ledger
// ============================================================================
// Usage:
//   questline-db stats                               Show database statistics
//   questline-db account create USER [--coins N]     Provision an account
//   questline-db account show USER                   Balance, level, progress
//   questline-db reward USER ACTIVITY_ID --kind K --score S --difficulty D
//   questline-db craft USER RECIPE                   Craft an item
//   questline-db buy USER LISTING                    Buy from the store
//   questline-db inventory USER                      List stacks and items
//   questline-db offers USER                         Offers made and received
//   questline-db catalog                             Recipes and listings
//   questline-db clan-ranking CLAN_ID                Members by contribution
//   questline-db export --format json                Export accounts as JSON
// ============================================================================

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use questline_core::db::TradeOffer;
use questline_core::{ActivityEvent, ActivityKind, Difficulty, Engine, EngineConfig};
use std::path::PathBuf;

/// Questline ledger tool
#[derive(Parser)]
#[command(name = "questline-db", version, about = "Inspect and drive the Questline ledger database")]
struct Cli {
    /// Path to the database file (default: ~/.questline/ledger.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Catalog JSON file (default: built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database statistics (accounts, offers, friendships, clans)
    Stats,

    /// Create or inspect an account
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Record a completed activity and apply its reward
    Reward {
        user: String,
        /// Unique id of the activity; recording it twice has no effect
        activity_id: String,
        /// memory, reaction, puzzle, trivia, study or expense
        #[arg(long)]
        kind: String,
        #[arg(long)]
        score: u64,
        /// easy, medium, hard or expert
        #[arg(long, default_value = "medium")]
        difficulty: String,
    },

    /// Craft an item from a recipe
    Craft { user: String, recipe: String },

    /// Buy a store listing
    Buy { user: String, listing: String },

    /// Show a user's inventory
    Inventory { user: String },

    /// Show trade offers made and received by a user
    Offers { user: String },

    /// List recipes and store listings
    Catalog,

    /// Rank clan members by contribution
    ClanRanking { clan_id: String },

    /// Export account, inventory and offer data
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Provision a new account
    Create {
        user: String,
        #[arg(long, default_value = "0")]
        coins: u64,
    },
    /// Show balance and level progress
    Show { user: String },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loaded before the subscriber so RUST_LOG from .env applies
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("questline_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }
    if cli.catalog.is_some() {
        config.catalog_path = cli.catalog;
    }
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Stats => cmd_stats(&engine),
        Commands::Account { action } => match action {
            AccountAction::Create { user, coins } => cmd_account_create(&engine, &user, coins).await,
            AccountAction::Show { user } => cmd_account_show(&engine, &user).await,
        },
        Commands::Reward {
            user,
            activity_id,
            kind,
            score,
            difficulty,
        } => cmd_reward(&engine, &user, &activity_id, &kind, score, &difficulty).await,
        Commands::Craft { user, recipe } => cmd_craft(&engine, &user, &recipe).await,
        Commands::Buy { user, listing } => cmd_buy(&engine, &user, &listing).await,
        Commands::Inventory { user } => cmd_inventory(&engine, &user).await,
        Commands::Offers { user } => cmd_offers(&engine, &user).await,
        Commands::Catalog => cmd_catalog(&engine),
        Commands::ClanRanking { clan_id } => cmd_clan_ranking(&engine, &clan_id).await,
        Commands::Export { format } => cmd_export(&engine, &format).await,
    }
}

fn cmd_stats(engine: &Engine) -> Result<()> {
    let stats = engine.stats()?;

    println!("=== Questline Ledger Stats ===");
    match engine.db().path() {
        Some(path) => println!("Database: {}", path.display()),
        None => println!("Database: (in memory)"),
    }
    println!();
    println!("Accounts:    {}", stats.total_accounts);
    println!("Activities:  {}", stats.total_activities);
    println!("Clans:       {}", stats.total_clans);
    println!("Offers:");
    for (status, count) in &stats.offer_counts {
        println!("  {:12} {}", status, count);
    }
    println!("Friendships:");
    for (status, count) in &stats.friendship_counts {
        println!("  {:12} {}", status, count);
    }

    Ok(())
}

async fn cmd_account_create(engine: &Engine, user: &str, coins: u64) -> Result<()> {
    let account = engine.create_account(user, coins).await?;
    println!(
        "Created account {} with {} coins (level {})",
        account.user_id, account.coins, account.level
    );
    Ok(())
}

async fn cmd_account_show(engine: &Engine, user: &str) -> Result<()> {
    let account = engine.get_account(user).await?;
    let progress = account.progress();

    println!("Account:    {}", account.user_id);
    println!("Coins:      {}", account.coins);
    println!("Level:      {}", account.level);
    println!(
        "Experience: {}/{} ({} to next level)",
        progress.experience, progress.threshold, progress.remaining
    );
    println!("Created:    {}", format_timestamp(account.created_at));
    if let Some(clan) = engine.clan_of(user).await? {
        println!("Clan:       {} ({})", clan.name, clan.id);
    }
    Ok(())
}

async fn cmd_reward(
    engine: &Engine,
    user: &str,
    activity_id: &str,
    kind: &str,
    score: u64,
    difficulty: &str,
) -> Result<()> {
    let kind: ActivityKind = kind.parse()?;
    let difficulty: Difficulty = difficulty.parse()?;
    let event = ActivityEvent::new(activity_id, kind, score, difficulty);

    let outcome = engine.record_activity(user, &event).await?;
    if outcome.duplicate {
        println!("Activity {} was already recorded; nothing applied.", activity_id);
    } else {
        println!(
            "+{} coins, +{} xp -> {} coins, level {}",
            outcome.reward.coins, outcome.reward.xp, outcome.snapshot.coins, outcome.snapshot.level
        );
        if outcome.snapshot.levels_gained > 0 {
            println!("Level up! (+{})", outcome.snapshot.levels_gained);
        }
    }
    Ok(())
}

async fn cmd_craft(engine: &Engine, user: &str, recipe: &str) -> Result<()> {
    let acq = engine.craft(user, recipe).await?;
    println!(
        "Crafted {} [{}] ({}); {} coins left",
        acq.item.name, acq.item.item_type, acq.item.id, acq.coins
    );
    Ok(())
}

async fn cmd_buy(engine: &Engine, user: &str, listing: &str) -> Result<()> {
    let acq = engine.purchase(user, listing).await?;
    println!(
        "Bought {} [{}] ({}); {} coins left",
        acq.item.name, acq.item.item_type, acq.item.id, acq.coins
    );
    Ok(())
}

async fn cmd_inventory(engine: &Engine, user: &str) -> Result<()> {
    let inventory = engine.inventory(user).await?;

    if inventory.stacks.is_empty() && inventory.instances.is_empty() {
        println!("Inventory is empty.");
        return Ok(());
    }

    if !inventory.stacks.is_empty() {
        println!("{:<24}  {:<16}  {}", "RESOURCE", "TYPE", "QUANTITY");
        println!("{}", "-".repeat(56));
        for stack in inventory.stacks.values() {
            println!("{:<24}  {:<16}  {}", stack.name, stack.item_type, stack.quantity);
        }
        println!();
    }

    if !inventory.instances.is_empty() {
        println!(
            "{:<36}  {:<20}  {:<10}  {:<10}  {}",
            "ITEM ID", "NAME", "RARITY", "SOURCE", "ACQUIRED AT"
        );
        println!("{}", "-".repeat(104));
        for item in &inventory.instances {
            println!(
                "{:<36}  {:<20}  {:<10}  {:<10}  {}",
                item.id,
                item.name,
                item.rarity.as_str(),
                format!("{:?}", item.source),
                format_timestamp(item.acquired_at)
            );
        }
    }

    Ok(())
}

fn print_offers(title: &str, offers: &[TradeOffer]) {
    println!("{} ({})", title, offers.len());
    for offer in offers {
        println!(
            "  {}  {:<9}  {} -> {}  {} for {} coins  ({})",
            offer.id,
            offer.status.as_str(),
            offer.proposer_id,
            offer.target_id,
            offer.item_name,
            offer.requested_coins,
            format_timestamp(offer.created_at)
        );
    }
}

async fn cmd_offers(engine: &Engine, user: &str) -> Result<()> {
    print_offers("Offers made", &engine.offers_made(user).await?);
    println!();
    print_offers("Offers received", &engine.offers_received(user).await?);
    Ok(())
}

fn cmd_catalog(engine: &Engine) -> Result<()> {
    let catalog = engine.catalog();

    println!("{:<20}  {:<20}  {:<14}  {}", "RECIPE", "RESULT", "TYPE", "COST");
    println!("{}", "-".repeat(64));
    for recipe in catalog.recipes() {
        println!(
            "{:<20}  {:<20}  {:<14}  {}",
            recipe.id, recipe.result.name, recipe.result.item_type, recipe.cost
        );
    }

    println!();
    println!("{:<20}  {:<20}  {:<14}  {}", "LISTING", "ITEM", "TYPE", "PRICE");
    println!("{}", "-".repeat(64));
    for listing in catalog.listings() {
        println!(
            "{:<20}  {:<20}  {:<14}  {}",
            listing.id, listing.item.name, listing.item.item_type, listing.price
        );
    }
    Ok(())
}

async fn cmd_clan_ranking(engine: &Engine, clan_id: &str) -> Result<()> {
    let clan = engine.get_clan(clan_id).await?;
    let ranking = engine.contribution_ranking(clan_id).await?;

    println!(
        "=== {} ({} members, {} xp total) ===",
        clan.name, clan.member_count, clan.total_experience
    );
    for (rank, member) in ranking.iter().enumerate() {
        println!(
            "{:>3}. {:<24}  {:<8}  {}",
            rank + 1,
            member.user_id,
            format!("{:?}", member.role),
            member.contribution
        );
    }
    Ok(())
}

async fn cmd_export(engine: &Engine, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let accounts = engine.db().list_accounts()?;
    let mut inventories = Vec::with_capacity(accounts.len());
    let mut offers = Vec::new();
    for account in &accounts {
        inventories.push(engine.inventory(&account.user_id).await?);
        offers.extend(engine.offers_made(&account.user_id).await?);
    }
    let stats = engine.stats()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "accounts": accounts,
        "inventories": inventories,
        "offers": offers,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
