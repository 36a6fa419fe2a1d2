use crate::model::{Item, Order, OrderToItem};
use crate::schema::{items, order_to_items, orders};
use crate::StoreDatabase;
use diesel::debug_query;
use diesel::prelude::*;
use diesel::query_builder::QueryFragment;
use diesel::sqlite::Sqlite;
use std::result::Result;
use tracing::debug;

/// Statements are logged here before they run; enable with
/// `RUST_LOG=order_items::sql=debug`.
pub const SQL_LOG_TARGET: &str = "order_items::sql";

fn trace_query<T: QueryFragment<Sqlite>>(query: &T) {
    debug!(target: SQL_LOG_TARGET, "{}", debug_query::<Sqlite, _>(query));
}

pub struct MainDbOps;

pub trait DbOps {
    fn insert_order(
        &self,
        order: &Order,
        conn: &StoreDatabase,
    ) -> Result<usize, diesel::result::Error>;

    fn insert_item(
        &self,
        item: &Item,
        conn: &StoreDatabase,
    ) -> Result<usize, diesel::result::Error>;

    fn insert_order_item(
        &self,
        link: &OrderToItem,
        conn: &StoreDatabase,
    ) -> Result<usize, diesel::result::Error>;

    fn count_orders(&self, conn: &StoreDatabase) -> Result<i64, diesel::result::Error>;

    fn count_items(&self, conn: &StoreDatabase) -> Result<i64, diesel::result::Error>;

    fn count_order_items(&self, conn: &StoreDatabase) -> Result<i64, diesel::result::Error>;

    fn load_joined_order_items(
        &self,
        conn: &StoreDatabase,
    ) -> Result<Vec<OrderToItem>, diesel::result::Error>;

    fn load_first_order(
        &self,
        sorted: bool,
        conn: &StoreDatabase,
    ) -> Result<Option<Order>, diesel::result::Error>;

    fn load_first_item(
        &self,
        sorted: bool,
        conn: &StoreDatabase,
    ) -> Result<Option<Item>, diesel::result::Error>;

    fn load_orders(
        &self,
        limit: i64,
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error>;

    fn load_order_links(
        &self,
        orders: &[Order],
        conn: &StoreDatabase,
    ) -> Result<Vec<OrderToItem>, diesel::result::Error>;

    fn load_item_links(
        &self,
        items: &[Item],
        conn: &StoreDatabase,
    ) -> Result<Vec<OrderToItem>, diesel::result::Error>;

    fn load_items_by_ids(
        &self,
        ids: &[i64],
        conn: &StoreDatabase,
    ) -> Result<Vec<Item>, diesel::result::Error>;

    fn load_orders_by_ids(
        &self,
        ids: &[i64],
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error>;

    fn load_order_items_joined(
        &self,
        order: &Order,
        conn: &StoreDatabase,
    ) -> Result<Vec<Item>, diesel::result::Error>;

    fn load_item_orders_joined(
        &self,
        item: &Item,
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error>;

    fn load_order_items_subquery(
        &self,
        order_id: i64,
        conn: &StoreDatabase,
    ) -> Result<Vec<Item>, diesel::result::Error>;

    fn load_item_orders_subquery(
        &self,
        item_id: i64,
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error>;
}

impl DbOps for MainDbOps {
    fn insert_order(
        &self,
        order: &Order,
        conn: &StoreDatabase,
    ) -> Result<usize, diesel::result::Error> {
        let query = diesel::insert_into(orders::table).values(order);
        trace_query(&query);
        query.execute(&**conn)
    }

    fn insert_item(
        &self,
        item: &Item,
        conn: &StoreDatabase,
    ) -> Result<usize, diesel::result::Error> {
        let query = diesel::insert_into(items::table).values(item);
        trace_query(&query);
        query.execute(&**conn)
    }

    fn insert_order_item(
        &self,
        link: &OrderToItem,
        conn: &StoreDatabase,
    ) -> Result<usize, diesel::result::Error> {
        let query = diesel::insert_into(order_to_items::table).values(link);
        trace_query(&query);
        query.execute(&**conn)
    }

    fn count_orders(&self, conn: &StoreDatabase) -> Result<i64, diesel::result::Error> {
        let query = orders::table.count();
        trace_query(&query);
        query.get_result(&**conn)
    }

    fn count_items(&self, conn: &StoreDatabase) -> Result<i64, diesel::result::Error> {
        let query = items::table.count();
        trace_query(&query);
        query.get_result(&**conn)
    }

    fn count_order_items(&self, conn: &StoreDatabase) -> Result<i64, diesel::result::Error> {
        let query = order_to_items::table.count();
        trace_query(&query);
        query.get_result(&**conn)
    }

    fn load_joined_order_items(
        &self,
        conn: &StoreDatabase,
    ) -> Result<Vec<OrderToItem>, diesel::result::Error> {
        let query = order_to_items::table
            .inner_join(orders::table)
            .inner_join(items::table)
            .select(order_to_items::all_columns)
            .order((order_to_items::order_id.asc(), order_to_items::item_id.asc()));
        trace_query(&query);
        query.load::<OrderToItem>(&**conn)
    }

    fn load_first_order(
        &self,
        sorted: bool,
        conn: &StoreDatabase,
    ) -> Result<Option<Order>, diesel::result::Error> {
        if sorted {
            let query = orders::table.order(orders::id.asc()).limit(1);
            trace_query(&query);
            query.get_result::<Order>(&**conn).optional()
        } else {
            let query = orders::table.limit(1);
            trace_query(&query);
            query.get_result::<Order>(&**conn).optional()
        }
    }

    fn load_first_item(
        &self,
        sorted: bool,
        conn: &StoreDatabase,
    ) -> Result<Option<Item>, diesel::result::Error> {
        if sorted {
            let query = items::table.order(items::id.asc()).limit(1);
            trace_query(&query);
            query.get_result::<Item>(&**conn).optional()
        } else {
            let query = items::table.limit(1);
            trace_query(&query);
            query.get_result::<Item>(&**conn).optional()
        }
    }

    fn load_orders(
        &self,
        limit: i64,
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error> {
        let query = orders::table.order(orders::id.asc()).limit(limit);
        trace_query(&query);
        query.load::<Order>(&**conn)
    }

    fn load_order_links(
        &self,
        orders: &[Order],
        conn: &StoreDatabase,
    ) -> Result<Vec<OrderToItem>, diesel::result::Error> {
        let query = OrderToItem::belonging_to(orders)
            .order((order_to_items::order_id.asc(), order_to_items::item_id.asc()));
        trace_query(&query);
        query.load::<OrderToItem>(&**conn)
    }

    fn load_item_links(
        &self,
        items: &[Item],
        conn: &StoreDatabase,
    ) -> Result<Vec<OrderToItem>, diesel::result::Error> {
        let query = OrderToItem::belonging_to(items)
            .order((order_to_items::item_id.asc(), order_to_items::order_id.asc()));
        trace_query(&query);
        query.load::<OrderToItem>(&**conn)
    }

    fn load_items_by_ids(
        &self,
        ids: &[i64],
        conn: &StoreDatabase,
    ) -> Result<Vec<Item>, diesel::result::Error> {
        let query = items::table
            .filter(items::id.eq_any(ids))
            .order(items::id.asc());
        trace_query(&query);
        query.load::<Item>(&**conn)
    }

    fn load_orders_by_ids(
        &self,
        ids: &[i64],
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error> {
        let query = orders::table
            .filter(orders::id.eq_any(ids))
            .order(orders::id.asc());
        trace_query(&query);
        query.load::<Order>(&**conn)
    }

    fn load_order_items_joined(
        &self,
        order: &Order,
        conn: &StoreDatabase,
    ) -> Result<Vec<Item>, diesel::result::Error> {
        let query = order_to_items::table
            .inner_join(items::table)
            .filter(order_to_items::order_id.eq(order.id))
            .select(items::all_columns)
            .order(items::id.asc());
        trace_query(&query);
        query.load::<Item>(&**conn)
    }

    fn load_item_orders_joined(
        &self,
        item: &Item,
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error> {
        let query = order_to_items::table
            .inner_join(orders::table)
            .filter(order_to_items::item_id.eq(item.id))
            .select(orders::all_columns)
            .order(orders::id.asc());
        trace_query(&query);
        query.load::<Order>(&**conn)
    }

    fn load_order_items_subquery(
        &self,
        order_id: i64,
        conn: &StoreDatabase,
    ) -> Result<Vec<Item>, diesel::result::Error> {
        let linked = order_to_items::table
            .select(order_to_items::item_id)
            .filter(order_to_items::order_id.eq(order_id));
        let query = items::table
            .filter(items::id.eq_any(linked))
            .order(items::id.asc());
        trace_query(&query);
        query.load::<Item>(&**conn)
    }

    fn load_item_orders_subquery(
        &self,
        item_id: i64,
        conn: &StoreDatabase,
    ) -> Result<Vec<Order>, diesel::result::Error> {
        let linked = order_to_items::table
            .select(order_to_items::order_id)
            .filter(order_to_items::item_id.eq(item_id));
        let query = orders::table
            .filter(orders::id.eq_any(linked))
            .order(orders::id.asc());
        trace_query(&query);
        query.load::<Order>(&**conn)
    }
}
