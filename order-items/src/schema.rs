table! {
    items (id) {
        id -> BigInt,
        order_id -> Nullable<BigInt>,
    }
}

table! {
    orders (id) {
        id -> BigInt,
        item_id -> Nullable<BigInt>,
    }
}

table! {
    order_to_items (order_id, item_id) {
        order_id -> BigInt,
        item_id -> BigInt,
    }
}

joinable!(order_to_items -> orders (order_id));
joinable!(order_to_items -> items (item_id));

allow_tables_to_appear_in_same_query!(
    items,
    orders,
    order_to_items,
);
