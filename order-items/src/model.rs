use crate::config::ConfigError;
use crate::db::DbOps;
use crate::StoreDatabase;

use crate::schema::{items, order_to_items, orders};

use diesel::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::error;
use std::fmt;
use std::fmt::Display;
use std::slice;

#[derive(Debug, Serialize, Queryable, Insertable, Identifiable, Clone, PartialEq, Default)]
#[table_name = "orders"]
pub struct Order {
    pub id: i64,
    pub item_id: Option<i64>,
}

#[derive(Debug, Serialize, Queryable, Insertable, Identifiable, Clone, PartialEq, Default)]
#[table_name = "items"]
pub struct Item {
    pub id: i64,
    pub order_id: Option<i64>,
}

#[derive(Debug, Serialize, Queryable, Insertable, Identifiable, Associations, Clone, PartialEq)]
#[belongs_to(Order)]
#[belongs_to(Item)]
#[table_name = "order_to_items"]
#[primary_key(order_id, item_id)]
pub struct OrderToItem {
    pub order_id: i64,
    pub item_id: i64,
}

impl Order {
    pub fn new(id: i64) -> Order {
        Order { id, item_id: None }
    }
}

impl Item {
    pub fn new(id: i64) -> Item {
        Item { id, order_id: None }
    }
}

/// A junction row with its belongs-to sides loaded. Either side stays `None`
/// when the junction row points at a row that does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemLink {
    pub order_id: i64,
    pub item_id: i64,
    pub order: Option<Order>,
    pub item: Option<Item>,
}

impl OrderItemLink {
    fn with_item(link: OrderToItem, item: Option<Item>) -> OrderItemLink {
        OrderItemLink {
            order_id: link.order_id,
            item_id: link.item_id,
            order: None,
            item,
        }
    }

    fn with_order(link: OrderToItem, order: Option<Order>) -> OrderItemLink {
        OrderItemLink {
            order_id: link.order_id,
            item_id: link.item_id,
            order,
            item: None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    #[serde(skip)]
    pub links: Vec<OrderItemLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
}

impl OrderWithItems {
    /// Rebuilds `items` from the loaded links, in link order.
    pub fn post_query(&mut self) {
        self.items = self
            .links
            .iter()
            .filter_map(|link| link.item.clone())
            .collect();
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct ItemWithOrders {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip)]
    pub links: Vec<OrderItemLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<Order>,
}

impl ItemWithOrders {
    /// Rebuilds `orders` from the loaded links, in link order.
    pub fn post_query(&mut self) {
        self.orders = self
            .links
            .iter()
            .filter_map(|link| link.order.clone())
            .collect();
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Default)]
pub struct StoreCounts {
    pub orders: i64,
    pub items: i64,
    pub order_items: i64,
}

/// How the far side of the order/item relation gets loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelationStrategy {
    /// Junction rows joined straight to the far table.
    M2m,
    /// Junction rows loaded as a has-many, far side loaded per link, then flattened.
    HasMany,
    /// `IN (SELECT ...)` over the junction table.
    Subquery,
}

impl Display for RelationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RelationStrategy::M2m => f.write_str("m2m"),
            RelationStrategy::HasMany => f.write_str("has-many"),
            RelationStrategy::Subquery => f.write_str("subquery"),
        }
    }
}

#[derive(Debug)]
pub enum DaoError {
    DieselError(diesel::result::Error),
    PoolError(r2d2::Error),
    MigrationError(diesel_migrations::RunMigrationsError),
    ConfigError(ConfigError),
    TaskPanicked(&'static str),
}

impl Display for DaoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DaoError::DieselError(e) => f.write_str(e.to_string().as_str()),
            DaoError::PoolError(e) => write!(f, "Failed to get database connection: {}", e),
            DaoError::MigrationError(e) => write!(f, "Failed to create schema: {}", e),
            DaoError::ConfigError(e) => f.write_str(e.to_string().as_str()),
            DaoError::TaskPanicked(task) => write!(f, "Task {} panicked!", task),
        }
    }
}

impl error::Error for DaoError {}

impl From<diesel::result::Error> for DaoError {
    fn from(err: diesel::result::Error) -> DaoError {
        DaoError::DieselError(err)
    }
}

impl From<r2d2::Error> for DaoError {
    fn from(err: r2d2::Error) -> DaoError {
        DaoError::PoolError(err)
    }
}

impl From<diesel_migrations::RunMigrationsError> for DaoError {
    fn from(err: diesel_migrations::RunMigrationsError) -> DaoError {
        DaoError::MigrationError(err)
    }
}

impl From<ConfigError> for DaoError {
    fn from(err: ConfigError) -> DaoError {
        DaoError::ConfigError(err)
    }
}

/// Inserts two items, one order and the two junction rows linking them.
/// Runs without a transaction, so readers may observe any prefix of it.
pub fn seed_store(conn: &StoreDatabase, dbops: &impl DbOps) -> Result<(), DaoError> {
    for item in &[Item::new(1), Item::new(2)] {
        dbops.insert_item(item, conn)?;
    }

    dbops.insert_order(&Order::new(1), conn)?;

    let links = [
        OrderToItem {
            order_id: 1,
            item_id: 1,
        },
        OrderToItem {
            order_id: 1,
            item_id: 2,
        },
    ];
    for link in &links {
        dbops.insert_order_item(link, conn)?;
    }

    Ok(())
}

pub fn store_counts(conn: &StoreDatabase, dbops: &impl DbOps) -> Result<StoreCounts, DaoError> {
    Ok(StoreCounts {
        orders: dbops.count_orders(conn)?,
        items: dbops.count_items(conn)?,
        order_items: dbops.count_order_items(conn)?,
    })
}

pub fn select_joined_links(
    conn: &StoreDatabase,
    dbops: &impl DbOps,
) -> Result<Vec<OrderToItem>, DaoError> {
    Ok(dbops.load_joined_order_items(conn)?)
}

/// Loads the first order with its items. An empty table is not an error: it
/// yields a zero-valued order with no items.
pub fn first_order_with_items(
    conn: &StoreDatabase,
    dbops: &impl DbOps,
    strategy: RelationStrategy,
    sorted: bool,
) -> Result<OrderWithItems, DaoError> {
    let order = match dbops.load_first_order(sorted, conn)? {
        Some(v) => v,
        None => return Ok(OrderWithItems::default()),
    };

    match strategy {
        RelationStrategy::M2m => {
            let items = dbops.load_order_items_joined(&order, conn)?;
            Ok(OrderWithItems {
                order,
                links: Vec::new(),
                items,
            })
        }
        RelationStrategy::HasMany => {
            let links = dbops.load_order_links(slice::from_ref(&order), conn)?;
            let items = load_items_for(conn, dbops, &links)?;

            let mut result = OrderWithItems {
                links: links
                    .into_iter()
                    .map(|link| {
                        let item = items.get(&link.item_id).cloned();
                        OrderItemLink::with_item(link, item)
                    })
                    .collect(),
                order,
                items: Vec::new(),
            };
            result.post_query();

            Ok(result)
        }
        RelationStrategy::Subquery => {
            let items = dbops.load_order_items_subquery(order.id, conn)?;
            Ok(OrderWithItems {
                order,
                links: Vec::new(),
                items,
            })
        }
    }
}

/// Mirror of [`first_order_with_items`] from the item side.
pub fn first_item_with_orders(
    conn: &StoreDatabase,
    dbops: &impl DbOps,
    strategy: RelationStrategy,
    sorted: bool,
) -> Result<ItemWithOrders, DaoError> {
    let item = match dbops.load_first_item(sorted, conn)? {
        Some(v) => v,
        None => return Ok(ItemWithOrders::default()),
    };

    match strategy {
        RelationStrategy::M2m => {
            let orders = dbops.load_item_orders_joined(&item, conn)?;
            Ok(ItemWithOrders {
                item,
                links: Vec::new(),
                orders,
            })
        }
        RelationStrategy::HasMany => {
            let links = dbops.load_item_links(slice::from_ref(&item), conn)?;

            let orders = load_orders_for(conn, dbops, &links)?;

            let mut result = ItemWithOrders {
                links: links
                    .into_iter()
                    .map(|link| {
                        let order = orders.get(&link.order_id).cloned();
                        OrderItemLink::with_order(link, order)
                    })
                    .collect(),
                item,
                orders: Vec::new(),
            };
            result.post_query();

            Ok(result)
        }
        RelationStrategy::Subquery => {
            let orders = dbops.load_item_orders_subquery(item.id, conn)?;
            Ok(ItemWithOrders {
                item,
                links: Vec::new(),
                orders,
            })
        }
    }
}

/// Loads up to `limit` orders with their items using one query per table:
/// the junction rows for the whole page are grouped back onto their orders.
pub fn orders_with_items(
    conn: &StoreDatabase,
    dbops: &impl DbOps,
    limit: i64,
) -> Result<Vec<OrderWithItems>, DaoError> {
    let orders = dbops.load_orders(limit, conn)?;
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let links = dbops.load_order_links(&orders, conn)?;
    let items = load_items_for(conn, dbops, &links)?;
    let grouped = links.grouped_by(orders.as_slice());

    Ok(orders
        .into_iter()
        .zip(grouped)
        .map(|(order, links)| {
            let mut result = OrderWithItems {
                order,
                links: links
                    .into_iter()
                    .map(|link| {
                        let item = items.get(&link.item_id).cloned();
                        OrderItemLink::with_item(link, item)
                    })
                    .collect(),
                items: Vec::new(),
            };
            result.post_query();
            result
        })
        .collect())
}

fn load_items_for(
    conn: &StoreDatabase,
    dbops: &impl DbOps,
    links: &[OrderToItem],
) -> Result<HashMap<i64, Item>, DaoError> {
    let ids: Vec<i64> = links
        .iter()
        .map(|link| link.item_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(dbops
        .load_items_by_ids(&ids, conn)?
        .into_iter()
        .map(|item| (item.id, item))
        .collect())
}

fn load_orders_for(
    conn: &StoreDatabase,
    dbops: &impl DbOps,
    links: &[OrderToItem],
) -> Result<HashMap<i64, Order>, DaoError> {
    let ids: Vec<i64> = links
        .iter()
        .map(|link| link.order_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(dbops
        .load_orders_by_ids(&ids, conn)?
        .into_iter()
        .map(|order| (order.id, order))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::MainDbOps;
    use crate::{establish_pool, run_db_migrations, StorePool};

    const STRATEGIES: [RelationStrategy; 3] = [
        RelationStrategy::M2m,
        RelationStrategy::HasMany,
        RelationStrategy::Subquery,
    ];

    fn test_pool() -> StorePool {
        let config = Config::in_memory(&uuid::Uuid::new_v4().to_string());
        let pool = establish_pool(&config).expect("pool");
        run_db_migrations(&pool).expect("migrations");
        pool
    }

    fn ids_of_items(items: &[Item]) -> Vec<i64> {
        items.iter().map(|item| item.id).collect()
    }

    #[test]
    fn test_seed_store_counts() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        seed_store(&conn, &MainDbOps).unwrap();

        let counts = store_counts(&conn, &MainDbOps).unwrap();
        assert_eq!(
            counts,
            StoreCounts {
                orders: 1,
                items: 2,
                order_items: 2,
            }
        );
    }

    #[test]
    fn test_joined_links_after_seed() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();

        let links = select_joined_links(&conn, &MainDbOps).unwrap();
        assert_eq!(
            links,
            vec![
                OrderToItem {
                    order_id: 1,
                    item_id: 1,
                },
                OrderToItem {
                    order_id: 1,
                    item_id: 2,
                },
            ]
        );
    }

    #[test]
    fn test_joined_links_skip_dangling_rows() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();
        MainDbOps
            .insert_order_item(
                &OrderToItem {
                    order_id: 1,
                    item_id: 99,
                },
                &conn,
            )
            .unwrap();

        assert_eq!(select_joined_links(&conn, &MainDbOps).unwrap().len(), 2);
        assert_eq!(store_counts(&conn, &MainDbOps).unwrap().order_items, 3);
    }

    #[test]
    fn test_order_hydrates_items_with_every_strategy() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();

        for strategy in STRATEGIES.iter().copied() {
            for sorted in [true, false].iter().copied() {
                let order = first_order_with_items(&conn, &MainDbOps, strategy, sorted).unwrap();
                assert_eq!(order.order.id, 1, "{}", strategy);
                assert_eq!(ids_of_items(&order.items), vec![1, 2], "{}", strategy);
            }
        }
    }

    #[test]
    fn test_item_hydrates_orders_with_every_strategy() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();

        for strategy in STRATEGIES.iter().copied() {
            let item = first_item_with_orders(&conn, &MainDbOps, strategy, true).unwrap();
            assert_eq!(item.item.id, 1, "{}", strategy);
            assert_eq!(item.orders, vec![Order::new(1)], "{}", strategy);
        }
    }

    #[test]
    fn test_empty_store_yields_zero_values() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        for strategy in STRATEGIES.iter().copied() {
            let order = first_order_with_items(&conn, &MainDbOps, strategy, true).unwrap();
            assert_eq!(order, OrderWithItems::default());

            let item = first_item_with_orders(&conn, &MainDbOps, strategy, true).unwrap();
            assert_eq!(item, ItemWithOrders::default());
        }

        assert!(select_joined_links(&conn, &MainDbOps).unwrap().is_empty());
        assert!(orders_with_items(&conn, &MainDbOps, 10).unwrap().is_empty());
    }

    #[test]
    fn test_has_many_keeps_links() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();

        let order =
            first_order_with_items(&conn, &MainDbOps, RelationStrategy::HasMany, true).unwrap();
        assert_eq!(order.links.len(), 2);
        assert!(order.links.iter().all(|link| link.order_id == 1));
        assert_eq!(order.links[1].item, Some(Item::new(2)));
    }

    #[test]
    fn test_post_query_skips_missing_items() {
        let mut order = OrderWithItems {
            order: Order::new(1),
            links: vec![
                OrderItemLink::with_item(
                    OrderToItem {
                        order_id: 1,
                        item_id: 2,
                    },
                    Some(Item::new(2)),
                ),
                OrderItemLink::with_item(
                    OrderToItem {
                        order_id: 1,
                        item_id: 7,
                    },
                    None,
                ),
            ],
            items: vec![Item::new(5)],
        };

        order.post_query();

        assert_eq!(order.items, vec![Item::new(2)]);
    }

    #[test]
    fn test_orders_with_items_groups_links() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();
        MainDbOps.insert_order(&Order::new(2), &conn).unwrap();
        MainDbOps
            .insert_order_item(
                &OrderToItem {
                    order_id: 2,
                    item_id: 2,
                },
                &conn,
            )
            .unwrap();

        let orders = orders_with_items(&conn, &MainDbOps, 10).unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(ids_of_items(&orders[0].items), vec![1, 2]);
        assert_eq!(ids_of_items(&orders[1].items), vec![2]);
    }

    #[test]
    fn test_duplicate_link_is_rejected() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();

        let err = MainDbOps
            .insert_order_item(
                &OrderToItem {
                    order_id: 1,
                    item_id: 1,
                },
                &conn,
            )
            .unwrap_err();

        assert!(matches!(err, diesel::result::Error::DatabaseError(_, _)));
        assert_eq!(store_counts(&conn, &MainDbOps).unwrap().order_items, 2);
    }

    #[test]
    fn test_order_json_omits_links() {
        let order = OrderWithItems {
            order: Order::new(1),
            links: Vec::new(),
            items: vec![Item::new(1)],
        };

        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(
            json,
            r#"{"id":1,"item_id":null,"items":[{"id":1,"order_id":null}]}"#
        );

        let empty = serde_json::to_string(&OrderWithItems::default()).unwrap();
        assert_eq!(empty, r#"{"id":0,"item_id":null}"#);
    }

    #[test]
    fn test_link_identity_is_composite_key() {
        let link = OrderToItem {
            order_id: 3,
            item_id: 4,
        };

        assert_eq!((&link).id(), (&3, &4));
    }

    #[test]
    fn test_has_many_links_from_both_sides() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();

        let order_links = MainDbOps
            .load_order_links(&[Order::new(1)], &conn)
            .unwrap();
        assert_eq!(order_links.len(), 2);

        let item_links = MainDbOps.load_item_links(&[Item::new(2)], &conn).unwrap();
        assert_eq!(
            item_links,
            vec![OrderToItem {
                order_id: 1,
                item_id: 2,
            }]
        );
    }

    #[test]
    fn test_has_many_item_skips_missing_orders() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        seed_store(&conn, &MainDbOps).unwrap();
        MainDbOps
            .insert_order_item(
                &OrderToItem {
                    order_id: 42,
                    item_id: 1,
                },
                &conn,
            )
            .unwrap();

        let item =
            first_item_with_orders(&conn, &MainDbOps, RelationStrategy::HasMany, true).unwrap();

        assert_eq!(item.links.len(), 2);
        assert_eq!(item.links[1].order, None);
        assert_eq!(item.orders, vec![Order::new(1)]);
    }
}
