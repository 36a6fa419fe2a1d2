//! Readers resolve the order/item relation by joining the junction table to the far side.

use dotenv::dotenv;
use order_items::model::RelationStrategy;
use std::process;

fn main() {
    dotenv().ok();

    if let Err(e) = order_items::launch(RelationStrategy::M2m) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
