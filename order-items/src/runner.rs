use crate::config::Config;
use crate::db::MainDbOps;
use crate::model::*;
use crate::StorePool;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, info_span, Span};

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub strategy: RelationStrategy,
    /// Rows seen by each flat join select.
    pub link_counts: Vec<usize>,
    /// Items hydrated onto the first order, per iteration.
    pub order_item_counts: Vec<usize>,
    /// Orders hydrated onto the first item, per iteration.
    pub item_order_counts: Vec<usize>,
    /// Read after every task has finished.
    pub final_counts: StoreCounts,
}

#[derive(Debug, Default)]
struct RelationCounts {
    order_items: Vec<usize>,
    item_orders: Vec<usize>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn spawn_task<T, F>(
    name: &'static str,
    pool: &StorePool,
    abort: &Arc<AtomicBool>,
    task: F,
) -> JoinHandle<Result<T, DaoError>>
where
    T: Send + 'static,
    F: FnOnce(&StorePool, &AtomicBool) -> Result<T, DaoError> + Send + 'static,
{
    let pool = pool.clone();
    let abort = Arc::clone(abort);
    let span = Span::current();

    thread::spawn(move || {
        let _guard = span.enter();

        let result = task(&pool, &abort);
        if let Err(ref e) = result {
            error!(task = name, "{}", e);
            abort.store(true, Ordering::SeqCst);
        }

        result
    })
}

fn join_task<T>(
    name: &'static str,
    handle: JoinHandle<Result<T, DaoError>>,
) -> Result<T, DaoError> {
    handle.join().map_err(|_| DaoError::TaskPanicked(name))?
}

/// Runs the writer and both readers at once. Nothing orders the readers after
/// the writer, so they may see none, some or all of the seeded rows. The first
/// failing task stops the others before their next iteration and its error is
/// returned.
pub fn run_concurrently(
    pool: &StorePool,
    config: &Config,
    strategy: RelationStrategy,
) -> Result<RunReport, DaoError> {
    let run_id = uuid::Uuid::new_v4();
    let span = info_span!("run", %run_id, %strategy);
    let _guard = span.enter();

    let abort = Arc::new(AtomicBool::new(false));
    let iterations = config.reader_iterations;

    let writer = spawn_task("writer", pool, &abort, |pool, _| {
        let conn = pool.get()?;
        seed_store(&conn, &MainDbOps)?;
        info!("store seeded");
        Ok(())
    });

    let link_reader = spawn_task("link-reader", pool, &abort, move |pool, abort| {
        let mut counts = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let conn = pool.get()?;
            let links = select_joined_links(&conn, &MainDbOps)?;
            println!("OrderToItem {}", links.len());
            counts.push(links.len());
        }
        Ok(counts)
    });

    let relation_reader = spawn_task("relation-reader", pool, &abort, move |pool, abort| {
        let mut counts = RelationCounts::default();
        for _ in 0..iterations {
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let conn = pool.get()?;

            let order = first_order_with_items(&conn, &MainDbOps, strategy, true)?;
            println!(
                "Order: {} Items: {} {}",
                order.order.id,
                order.items.len(),
                to_json(&order.items)
            );
            println!();
            counts.order_items.push(order.items.len());

            let order = first_order_with_items(&conn, &MainDbOps, strategy, false)?;
            println!(
                "Order: {} Items: {} {}",
                order.order.id,
                order.items.len(),
                to_json(&order.items)
            );
            println!();

            let item = first_item_with_orders(&conn, &MainDbOps, strategy, true)?;
            println!(
                "Item: {} Orders: {} {}",
                item.item.id,
                item.orders.len(),
                to_json(&item.orders)
            );
            counts.item_orders.push(item.orders.len());
        }
        Ok(counts)
    });

    let writer = join_task("writer", writer);
    let link_counts = join_task("link-reader", link_reader);
    let relation_counts = join_task("relation-reader", relation_reader);

    writer?;
    let link_counts = link_counts?;
    let relation_counts = relation_counts?;

    let conn = pool.get()?;
    let final_counts = store_counts(&conn, &MainDbOps)?;
    info!(
        orders = final_counts.orders,
        items = final_counts.items,
        order_items = final_counts.order_items,
        "run finished"
    );

    Ok(RunReport {
        strategy,
        link_counts,
        order_item_counts: relation_counts.order_items,
        item_order_counts: relation_counts.item_orders,
        final_counts,
    })
}
