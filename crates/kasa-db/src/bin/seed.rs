//! # Seed Data Generator
//!
//! Fills a SQLite store with a shelf of products for development, each with
//! the `new` stock movement a product created with initial stock gets.
//!
//! ## Usage
//! ```bash
//! cargo run -p kasa-db --bin seed
//! cargo run -p kasa-db --bin seed -- --count 200 --db ./data/kasa.db
//! ```
//!
//! Barcodes are `869{category}{index}` (EAN-13 shaped, checksum not valid).

use std::env;

use chrono::Utc;
use kasa_core::{MovementType, Product, StockMovement, DEFAULT_MIN_STOCK_LEVEL};
use kasa_db::{DbConfig, Filter, SqliteStore, Store, Table};

/// Shelf categories with their VAT rate (basis points).
const CATEGORIES: &[(&str, u32, &[&str])] = &[
    (
        "Icecek",
        2000,
        &[
            "Ayran 300ml",
            "Su 500ml",
            "Maden Suyu 200ml",
            "Kola 1L",
            "Gazoz 1L",
            "Meyve Suyu 1L",
            "Cay 500g",
            "Turk Kahvesi 100g",
        ],
    ),
    (
        "Sut",
        1000,
        &[
            "Sut 1L",
            "Yogurt 1kg",
            "Beyaz Peynir 500g",
            "Kasar 400g",
            "Tereyagi 250g",
            "Kaymak 200g",
        ],
    ),
    (
        "Temel",
        100,
        &[
            "Ekmek",
            "Un 2kg",
            "Seker 1kg",
            "Pirinc 1kg",
            "Makarna 500g",
            "Mercimek 1kg",
            "Aycicek Yagi 1L",
            "Tuz 750g",
        ],
    ),
    (
        "Atistirmalik",
        2000,
        &[
            "Cikolata 80g",
            "Biskuvi 150g",
            "Cips 110g",
            "Lokum 250g",
            "Findik 200g",
            "Simit",
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = usize::MAX;
    let mut db_path = String::from("./kasa_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(usize::MAX);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasa POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Maximum products to create (default: all)");
                println!("  -d, --db <PATH>    Database file path (default: ./kasa_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kasa POS Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let store = Store::new(SqliteStore::connect(DbConfig::new(&db_path)).await?);
    println!("✓ Connected, migrations applied");

    let existing = store.raw().get(Table::Products, &Filter::all().limit(1)).await?;
    if !existing.is_empty() {
        println!("⚠ Products already present, skipping seed.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut created = 0usize;
    'outer: for (category_idx, (category, vat_rate_bps, names)) in CATEGORIES.iter().enumerate() {
        for (product_idx, name) in names.iter().enumerate() {
            if created >= count {
                break 'outer;
            }
            let seed = category_idx * 100 + product_idx;
            let product = generate_product(name, *vat_rate_bps, seed);

            if let Err(e) = store.insert(Table::Products, &product).await {
                eprintln!("Failed to insert {} ({}): {}", product.name, category, e);
                continue;
            }
            if product.quantity > 0 {
                let movement = StockMovement {
                    id: None,
                    request_id: None,
                    barcode: product.barcode.clone(),
                    product_name: product.name.clone(),
                    movement_type: MovementType::New,
                    quantity: product.quantity,
                    user_id: 1,
                    movement_date: product.created_at,
                };
                store.insert(Table::StockMovements, &movement).await?;
            }
            created += 1;
        }
    }

    println!("✓ Created {} products", created);
    Ok(())
}

fn generate_product(name: &str, vat_rate_bps: u32, seed: usize) -> Product {
    Product {
        id: None,
        barcode: format!("869{:010}", seed),
        name: name.to_string(),
        // 4.50 - 124.50 TL
        price_cents: 450 + ((seed * 37) % 121) as i64 * 100,
        // some start at or under the reorder threshold
        quantity: (seed % 40) as i64,
        vat_rate_bps,
        excise_rate_bps: 0,
        min_stock_level: DEFAULT_MIN_STOCK_LEVEL,
        created_at: Utc::now(),
        updated_at: None,
    }
}
