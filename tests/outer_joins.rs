//! # Outer Join Test Suite
//!
//! Join semantics over the two-table customers/orders shape: inner
//! joins drop unmatched rows, LEFT joins null-extend each unmatched
//! left row exactly once, RIGHT and FULL joins recover unmatched
//! right-side rows through the second pass, and WHERE conditions filter
//! after null extension.
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test outer_joins -- --nocapture
//! ```

use cascara::{
    CmpOp, ColumnDef, DataType, Engine, ExecuteResult, Expr, IndexDef, JoinType, QueryStatement,
    RangeDecl, Session, Statement, TableDef, Value,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// customers(id, name) and orders(id, customer_id, amount), with orders
/// indexed on customer_id. Customer 3 has no orders; order 900 has no
/// customer.
fn shop_engine() -> (Engine, u64, u64) {
    let engine = Engine::new();
    let customers = engine
        .create_table(
            TableDef::new(
                "customers",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("name", DataType::Text),
                ],
            )
            .with_primary_key(vec![0]),
        )
        .expect("Failed to create customers table");
    let orders = engine
        .create_table(
            TableDef::new(
                "orders",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("customer_id", DataType::Int8),
                    ColumnDef::new("amount", DataType::Int8),
                ],
            )
            .with_primary_key(vec![0])
            .with_index(IndexDef::new("idx_orders_customer", vec![1], false)),
        )
        .expect("Failed to create orders table");

    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
        engine.insert(customers, vec![id.into(), name.into()]).unwrap();
    }
    for (id, customer, amount) in [(100, 1, 40), (101, 1, 75), (102, 2, 120), (900, 99, 10)] {
        engine
            .insert(orders, vec![id.into(), customer.into(), amount.into()])
            .unwrap();
    }
    (engine, customers, orders)
}

fn on_customer() -> Expr {
    Expr::eq(Expr::col(0, 0), Expr::col(1, 1))
}

fn run(engine: &Engine, plan: cascara::BoundPlan) -> Vec<Vec<Value>> {
    let stmt = Statement::Query(QueryStatement {
        plan,
        outputs: vec![],
    });
    match engine.execute(&stmt, &Session::new()).expect("Join query failed") {
        ExecuteResult::Rows(rows) => rows,
        other => panic!("Expected rows, got {:?}", other),
    }
}

/// (customer id, order id) pairs of the joined output, NULLs as None,
/// sorted for comparison.
fn pairs(rows: &[Vec<Value>]) -> Vec<(Option<i64>, Option<i64>)> {
    let mut out: Vec<(Option<i64>, Option<i64>)> = rows
        .iter()
        .map(|row| {
            let as_int = |v: &Value| match v {
                Value::Int(i) => Some(*i),
                Value::Null => None,
                other => panic!("Expected Int or NULL, got {:?}", other),
            };
            (as_int(&row[0]), as_int(&row[2]))
        })
        .collect();
    out.sort_unstable();
    out
}

// ============================================================================
// JOIN SEMANTICS TESTS
// ============================================================================

mod join_tests {
    use super::*;

    #[test]
    fn inner_join_drops_unmatched_rows_on_both_sides() {
        let (engine, customers, orders) = shop_engine();
        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Inner, Some(on_customer())),
                ],
                None,
            )
            .unwrap();
        let rows = run(&engine, plan);
        assert_eq!(
            pairs(&rows),
            vec![(Some(1), Some(100)), (Some(1), Some(101)), (Some(2), Some(102))]
        );
    }

    #[test]
    fn left_join_null_extends_each_unmatched_customer_once() {
        let (engine, customers, orders) = shop_engine();
        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Left, Some(on_customer())),
                ],
                None,
            )
            .unwrap();
        let rows = run(&engine, plan);
        assert_eq!(
            pairs(&rows),
            vec![
                (Some(1), Some(100)),
                (Some(1), Some(101)),
                (Some(2), Some(102)),
                (Some(3), None),
            ]
        );
        let extended: Vec<&Vec<Value>> = rows.iter().filter(|r| r[2].is_null()).collect();
        assert_eq!(extended.len(), 1);
        assert!(
            extended[0][3].is_null() && extended[0][4].is_null(),
            "every order column of the synthesized row must be NULL"
        );
    }

    #[test]
    fn where_is_null_selects_customers_without_orders() {
        let (engine, customers, orders) = shop_engine();
        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Left, Some(on_customer())),
                ],
                Some(Expr::is_null(Expr::col(1, 0))),
            )
            .unwrap();
        let rows = run(&engine, plan);
        assert_eq!(pairs(&rows), vec![(Some(3), None)]);
    }

    #[test]
    fn where_in_list_cancels_null_extended_rows() {
        let engine = Engine::new();
        let customers = engine
            .create_table(TableDef::new(
                "customers",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("name", DataType::Text),
                ],
            ))
            .unwrap();
        // Only the id column is indexed, so the ON condition cannot
        // drive a probe and the IN list is the lone promotion candidate.
        let orders = engine
            .create_table(
                TableDef::new(
                    "orders",
                    vec![
                        ColumnDef::new("id", DataType::Int8).not_null(),
                        ColumnDef::new("customer_id", DataType::Int8),
                        ColumnDef::new("amount", DataType::Int8),
                    ],
                )
                .with_index(IndexDef::new("idx_orders_id", vec![0], true)),
            )
            .unwrap();
        for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
            engine.insert(customers, vec![id.into(), name.into()]).unwrap();
        }
        for (id, customer, amount) in [(100, 1, 40), (101, 1, 75), (102, 2, 120)] {
            engine
                .insert(orders, vec![id.into(), customer.into(), amount.into()])
                .unwrap();
        }

        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Left, Some(on_customer())),
                ],
                Some(Expr::in_list(Expr::col(1, 0), vec![Expr::lit(100)])),
            )
            .unwrap();

        // The filter must stay residual on the outer side: NULL IN (100)
        // is UNKNOWN, so the synthesized rows for customers 2 and 3 are
        // cancelled, not emitted.
        let text = engine.describe(&plan).unwrap();
        assert!(
            !text.contains("enumerated probe"),
            "outer-side filter must not drive the probe:\n{}",
            text
        );
        let rows = run(&engine, plan);
        assert_eq!(pairs(&rows), vec![(Some(1), Some(100))]);
    }

    #[test]
    fn right_join_recovers_orphan_orders() {
        let (engine, customers, orders) = shop_engine();
        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Right, Some(on_customer())),
                ],
                None,
            )
            .unwrap();
        let rows = run(&engine, plan);
        assert_eq!(
            pairs(&rows),
            vec![
                (None, Some(900)),
                (Some(1), Some(100)),
                (Some(1), Some(101)),
                (Some(2), Some(102)),
            ]
        );
    }

    #[test]
    fn full_join_emits_every_row_exactly_once() {
        let (engine, customers, orders) = shop_engine();
        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Full, Some(on_customer())),
                ],
                None,
            )
            .unwrap();
        let rows = run(&engine, plan);
        assert_eq!(
            pairs(&rows),
            vec![
                (None, Some(900)),
                (Some(1), Some(100)),
                (Some(1), Some(101)),
                (Some(2), Some(102)),
                (Some(3), None),
            ]
        );
    }

    #[test]
    fn full_join_on_restriction_does_not_unmatch_left_rows() {
        let (engine, customers, orders) = shop_engine();
        // Order 100 fails the amount restriction, so it moves to the
        // second pass; customer 1 still matches through order 101.
        let on = Expr::and(
            on_customer(),
            Expr::cmp(CmpOp::Gt, Expr::col(1, 2), Expr::lit(50)),
        );
        let plan = engine
            .compile(
                vec![
                    RangeDecl::table(customers),
                    RangeDecl::joined(orders, JoinType::Full, Some(on)),
                ],
                None,
            )
            .unwrap();
        let rows = run(&engine, plan);
        assert_eq!(
            pairs(&rows),
            vec![
                (None, Some(100)),
                (None, Some(900)),
                (Some(1), Some(101)),
                (Some(2), Some(102)),
                (Some(3), None),
            ]
        );
    }
}
