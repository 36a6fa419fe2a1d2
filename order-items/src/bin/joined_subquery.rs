//! Readers resolve the order/item relation with an `IN (SELECT ...)` over the junction table.

use dotenv::dotenv;
use order_items::model::RelationStrategy;
use std::process;

fn main() {
    dotenv().ok();

    if let Err(e) = order_items::launch(RelationStrategy::Subquery) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
