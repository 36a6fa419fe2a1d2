//! Readers load junction rows as a has-many, load each link's item or order, then flatten.

use dotenv::dotenv;
use order_items::model::RelationStrategy;
use std::process;

fn main() {
    dotenv().ok();

    if let Err(e) = order_items::launch(RelationStrategy::HasMany) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
