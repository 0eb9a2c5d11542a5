//! End-to-end inventory scenarios against a real SQLite database.
//!
//! - Multi-size Latte draw-down
//! - Wastage followed by a physical count
//! - Missing recipe line
//! - Idempotent consumption and reversal
//! - All-or-nothing reconciliation batches
//! - Concurrent order lines against a file database

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::path::PathBuf;

use crema_core::consumption::ConsumeRequest;
use crema_core::ledger::verify_additivity;
use crema_core::{CountedStock, Quantity, SnapshotSource};
use crema_db::{Database, DbConfig, DbError, InventoryConfig};

// ============================================================================
// Fixtures
// ============================================================================

fn q(s: &str) -> Quantity {
    s.parse().unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn at(d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, d, hour, 0, 0).unwrap()
}

struct Cafe {
    db: Database,
    coffee: String,
    milk: String,
}

/// Coffee in kg and milk in l; Latte S/M/L at 20/25/30 g coffee and
/// 150/200/250 ml milk.
async fn cafe(db: Database) -> Cafe {
    let coffee = db.materials().create("Coffee beans", "BEANS", "unit-kg").await.unwrap().id;
    let milk = db.materials().create("Whole milk", "MILK", "unit-l").await.unwrap().id;

    let recipes = db.recipes();
    for (size, grams, ml) in [("S", "20", "150"), ("M", "25", "200"), ("L", "30", "250")] {
        recipes.set_line("latte", &coffee, Some(size), q(grams), "g").await.unwrap();
        recipes.set_line("latte", &milk, Some(size), q(ml), "ml").await.unwrap();
    }

    Cafe { db, coffee, milk }
}

async fn in_memory_cafe() -> Cafe {
    cafe(Database::new(DbConfig::in_memory()).await.unwrap()).await
}

async fn open_stock(cafe: &Cafe, date: NaiveDate, counts: &[(&String, &str)]) {
    let counts: Vec<CountedStock> = counts
        .iter()
        .map(|(material, remain)| CountedStock::new(material.as_str(), q(remain)))
        .collect();
    let reconciliation = cafe.db.reconciliation();
    let proposal = reconciliation.propose(date, &counts).await.unwrap();
    reconciliation.accept(&proposal, "manager-1").await.unwrap();
}

fn latte(order_line_id: &str, size: &str, qty: i64, confirmed_at: DateTime<Utc>) -> ConsumeRequest {
    ConsumeRequest {
        order_line_id: order_line_id.to_string(),
        product_id: "latte".to_string(),
        size_id: Some(size.to_string()),
        quantity_sold: qty,
        toppings: Vec::new(),
        confirmed_at,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn two_medium_lattes_draw_fifty_grams_of_coffee() {
    let cafe = in_memory_cafe().await;
    open_stock(&cafe, day(1), &[(&cafe.coffee, "2"), (&cafe.milk, "10")]).await;

    let outcome = cafe
        .db
        .consumption()
        .consume(&latte("ol-1", "M", 2, at(2, 8)))
        .await
        .unwrap();

    let coffee = outcome
        .deductions
        .iter()
        .find(|d| d.material_id == cafe.coffee)
        .unwrap();
    assert_eq!(coffee.quantity, q("0.050"));
    assert_eq!(coffee.remain_after, q("1.95"));

    let history = cafe.db.ledger().history(&cafe.coffee).await.unwrap();
    assert_eq!(history[0].delta.to_string(), "-0.05000");
    assert_eq!(history[0].date, day(2));
}

#[tokio::test]
async fn milk_wastage_then_count_shows_unexplained_loss() {
    let cafe = in_memory_cafe().await;
    open_stock(&cafe, day(1), &[(&cafe.milk, "10.000")]).await;

    cafe.db
        .wastage()
        .record_wastage(&cafe.milk, q("0.5"), "Jug knocked over", "barista-1", day(2))
        .await
        .unwrap();
    assert_eq!(cafe.db.ledger().current_stock(&cafe.milk).await.unwrap(), q("9.5"));

    let reconciliation = cafe.db.reconciliation();
    let proposal = reconciliation
        .propose(day(2), &[CountedStock::new(&cafe.milk, q("9.200"))])
        .await
        .unwrap();

    let record = &proposal.records[0];
    assert_eq!(record.last_remain_quantity, q("10"));
    assert_eq!(record.system_computed_remain, q("9.5"));
    assert_eq!(record.difference, q("-0.300"));

    reconciliation.accept(&proposal, "manager-1").await.unwrap();

    let history = cafe.db.ledger().history(&cafe.milk).await.unwrap();
    let sources: Vec<SnapshotSource> = history.iter().rev().map(|s| s.source).collect();
    assert_eq!(
        sources,
        vec![
            SnapshotSource::Reconciliation,
            SnapshotSource::Wastage,
            SnapshotSource::Reconciliation,
        ]
    );
    assert_eq!(history[0].remain, q("9.2"));
    cafe.db.ledger().audit(&cafe.milk).await.unwrap();
}

#[tokio::test]
async fn missing_large_line_still_sells() {
    let cafe = in_memory_cafe().await;
    cafe.db
        .recipes()
        .remove_line("latte", &cafe.coffee, Some("L"))
        .await
        .unwrap();

    let err = cafe
        .db
        .recipes()
        .get_consumption("latte", Some("L"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(crema_core::CoreError::RecipeLineNotFound { .. })
    ));

    let outcome = cafe
        .db
        .consumption()
        .consume(&latte("ol-1", "L", 1, at(2, 8)))
        .await
        .unwrap();

    assert_eq!(outcome.missing_lines.len(), 1);
    assert_eq!(outcome.missing_lines[0].material_id, cafe.coffee);
    assert_eq!(outcome.deductions.len(), 1);
    assert_eq!(outcome.deductions[0].material_id, cafe.milk);
    assert!(cafe.db.ledger().history(&cafe.coffee).await.unwrap().is_empty());

    let alerts = cafe.db.consumption().recent_gap_alerts(5).await.unwrap();
    assert_eq!(alerts[0].order_line_id, "ol-1");
}

#[tokio::test]
async fn consumption_is_idempotent_and_reversible() {
    let cafe = in_memory_cafe().await;
    open_stock(&cafe, day(1), &[(&cafe.coffee, "1"), (&cafe.milk, "10")]).await;
    let consumption = cafe.db.consumption();

    let request = latte("ol-7", "S", 3, at(2, 9));
    let first = consumption.consume(&request).await.unwrap();
    for _ in 0..3 {
        let replay = consumption.consume(&request).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.deductions, first.deductions);
    }
    assert_eq!(cafe.db.ledger().current_stock(&cafe.coffee).await.unwrap(), q("0.94"));
    assert_eq!(cafe.db.ledger().by_reference("ol-7").await.unwrap().len(), 2);

    consumption.reverse("ol-7", at(2, 10)).await.unwrap();
    consumption.reverse("ol-7", at(2, 11)).await.unwrap();

    assert_eq!(cafe.db.ledger().current_stock(&cafe.coffee).await.unwrap(), q("1"));
    assert_eq!(cafe.db.ledger().current_stock(&cafe.milk).await.unwrap(), q("10"));
    assert_eq!(cafe.db.ledger().by_reference("ol-7").await.unwrap().len(), 4);

    // A reversed order line stays consumed: replaying it does not deduct again.
    assert!(consumption.consume(&request).await.unwrap().replayed);
    assert_eq!(cafe.db.ledger().current_stock(&cafe.coffee).await.unwrap(), q("1"));
}

#[tokio::test]
async fn reconciliation_batch_is_all_or_nothing() {
    let cafe = in_memory_cafe().await;
    let cups = cafe
        .db
        .materials()
        .create("Paper cup", "CUP", "unit-piece")
        .await
        .unwrap()
        .id;

    let reconciliation = cafe.db.reconciliation();
    let proposal = reconciliation
        .propose(
            day(3),
            &[
                CountedStock::new(&cafe.coffee, q("2")),
                CountedStock::new(&cafe.milk, q("8")),
                CountedStock::new(&cups, q("150")),
            ],
        )
        .await
        .unwrap();

    // Cups move on a later date before the batch is accepted.
    cafe.db
        .wastage()
        .record_wastage(&cups, q("3"), "Crushed in delivery", "barista-1", day(4))
        .await
        .unwrap();

    let err = reconciliation.accept(&proposal, "manager-1").await.unwrap_err();
    let DbError::Reconciliation(failure) = err else {
        panic!("expected a batch failure");
    };
    assert_eq!(failure.batch.len(), 3);
    assert_eq!(failure.as_of_date, day(3));

    assert!(cafe.db.ledger().history(&cafe.coffee).await.unwrap().is_empty());
    assert!(cafe.db.ledger().history(&cafe.milk).await.unwrap().is_empty());
    assert_eq!(cafe.db.ledger().history(&cups).await.unwrap().len(), 1);
    assert!(reconciliation.runs_for_date(day(3)).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_order_lines_keep_the_ledger_additive() {
    let path: PathBuf =
        std::env::temp_dir().join(format!("crema-concurrency-{}.db", uuid::Uuid::new_v4()));

    let config = InventoryConfig::from_toml_str(&format!(
        "[database]\npath = '{}'\nmax_connections = 8\nbusy_timeout_ms = 100\n\n\
         [retry]\ninitial_backoff_ms = 5\nmax_backoff_ms = 100\nmax_elapsed_ms = 30000\n",
        path.display()
    ))
    .unwrap();
    config.validate().unwrap();

    let cafe = cafe(Database::new(DbConfig::from(&config)).await.unwrap()).await;
    open_stock(&cafe, day(1), &[(&cafe.coffee, "5"), (&cafe.milk, "50")]).await;

    let mut handles = Vec::new();
    for n in 0..40 {
        let db = cafe.db.clone();
        handles.push(tokio::spawn(async move {
            // Every fourth request is a duplicate delivery of the previous line.
            let line = if n % 4 == 3 { n - 1 } else { n };
            db.consumption()
                .consume(&latte(&format!("ol-{line}"), "M", 1, at(2, 12)))
                .await
        }));
    }

    let mut replays = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().replayed {
            replays += 1;
        }
    }
    assert_eq!(replays, 10);

    // 30 distinct medium lattes: 30 × 0.025 kg and 30 × 0.2 l.
    let ledger = cafe.db.ledger();
    assert_eq!(ledger.current_stock(&cafe.coffee).await.unwrap(), q("4.25"));
    assert_eq!(ledger.current_stock(&cafe.milk).await.unwrap(), q("44"));

    for material in [&cafe.coffee, &cafe.milk] {
        let mut chain = ledger.history(material).await.unwrap();
        chain.reverse();
        assert_eq!(chain.len(), 31);
        verify_additivity(&chain).unwrap();
        ledger.audit(material).await.unwrap();
    }

    cafe.db.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}
