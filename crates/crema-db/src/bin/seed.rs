//! # Seed Data Generator
//!
//! Populates a development database with a small café: materials, recipes,
//! an opening stock count, and a handful of confirmed order lines.
//!
//! ## Usage
//! ```bash
//! # Seed using inventory.toml (or defaults)
//! cargo run -p crema-db --bin seed
//!
//! # Explicit config file or database path
//! cargo run -p crema-db --bin seed -- --config ./inventory.toml
//! cargo run -p crema-db --bin seed -- --db ./data/crema.db
//!
//! # More logging
//! RUST_LOG=debug cargo run -p crema-db --bin seed
//! ```

use chrono::{Duration, Utc};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crema_core::consumption::{ConsumeRequest, ToppingSelection};
use crema_core::{CountedStock, Quantity};
use crema_db::{Database, DbConfig, InventoryConfig};

/// `(code, name, storage unit id, opening count)`
const MATERIALS: &[(&str, &str, &str, &str)] = &[
    ("BEANS", "Espresso beans", "unit-kg", "5"),
    ("MILK", "Whole milk", "unit-l", "10"),
    ("OAT", "Oat milk", "unit-l", "4"),
    ("SYRUP-CAR", "Caramel syrup", "unit-l", "1.5"),
    ("CUP-12", "Paper cup 12oz", "unit-piece", "200"),
    ("LID", "Cup lid", "unit-piece", "200"),
];

/// `(product, material code, size, amount, consumption unit)`
const RECIPE_LINES: &[(&str, &str, Option<&str>, &str, &str)] = &[
    ("latte", "BEANS", Some("S"), "20", "g"),
    ("latte", "BEANS", Some("M"), "25", "g"),
    ("latte", "BEANS", Some("L"), "30", "g"),
    ("latte", "MILK", Some("S"), "150", "ml"),
    ("latte", "MILK", Some("M"), "200", "ml"),
    ("latte", "MILK", Some("L"), "250", "ml"),
    ("latte", "CUP-12", None, "1", "piece"),
    ("latte", "LID", None, "1", "piece"),
    ("espresso", "BEANS", None, "18", "g"),
    ("caramel", "SYRUP-CAR", None, "10", "ml"),
    ("oat-swap", "OAT", None, "200", "ml"),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crema=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Crema Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  inventory.toml to load");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = InventoryConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    config.validate()?;

    let db = Database::new(DbConfig::from(&config)).await?;
    info!(path = %config.database.path.display(), "Connected, migrations applied");

    if !db.materials().list(true).await?.is_empty() {
        warn!("Database already has materials; delete the file to regenerate");
        return Ok(());
    }

    // Materials
    let mut counts = Vec::with_capacity(MATERIALS.len());
    for (code, name, unit_id, opening) in MATERIALS {
        let material = db.materials().create(name, code, unit_id).await?;
        counts.push(CountedStock::new(material.id, opening.parse::<Quantity>()?));
    }
    info!(materials = MATERIALS.len(), "Materials created");

    // Recipes
    for (product, code, size, amount, unit) in RECIPE_LINES {
        let material = db
            .materials()
            .get_by_code(code)
            .await?
            .ok_or_else(|| format!("material {} missing after insert", code))?;
        db.recipes()
            .set_line(product, &material.id, *size, amount.parse()?, unit)
            .await?;
    }
    info!(lines = RECIPE_LINES.len(), "Recipes authored");

    // Opening stock, counted yesterday
    let opened = Utc::now() - Duration::days(1);
    let reconciliation = db.reconciliation();
    let proposal = reconciliation.propose(opened.date_naive(), &counts).await?;
    let accepted = reconciliation.accept(&proposal, "seed").await?;
    info!(run_id = %accepted.run.id, "Opening stock recorded");

    // A morning of sales
    let orders = [
        ("latte", Some("M"), 2, vec![("caramel", 2)]),
        ("latte", Some("L"), 1, vec![("oat-swap", 1)]),
        ("espresso", None, 3, vec![]),
        ("latte", Some("S"), 1, vec![]),
    ];

    for (n, (product, size, qty, toppings)) in orders.into_iter().enumerate() {
        let request = ConsumeRequest {
            order_line_id: format!("seed-ol-{}", n + 1),
            product_id: product.to_string(),
            size_id: size.map(str::to_string),
            quantity_sold: qty,
            toppings: toppings
                .into_iter()
                .map(|(topping_id, quantity)| ToppingSelection {
                    topping_id: topping_id.to_string(),
                    quantity,
                })
                .collect(),
            confirmed_at: Utc::now(),
        };
        db.consumption().consume(&request).await?;
    }

    db.wastage()
        .record_wastage(
            &counts[1].material_id,
            "0.5".parse()?,
            "Milk jug spilled",
            "seed",
            Utc::now().date_naive(),
        )
        .await?;

    // Closing summary
    let today = Utc::now().date_naive();
    for baseline in reconciliation.compute(today).await?.baselines {
        info!(
            code = %baseline.material_code,
            remain = %baseline.system_computed_remain,
            unit = %baseline.unit_symbol,
            "Stock"
        );
    }

    db.close().await;
    info!("Seed complete");
    Ok(())
}
