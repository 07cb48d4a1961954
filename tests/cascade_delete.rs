//! # Referential Action Test Suite
//!
//! Cascading mutation coverage: RESTRICT rejection, transitive CASCADE
//! deletes, SET NULL / SET DEFAULT propagation, self-referencing
//! chains, key-change cascades on UPDATE, and the conflicting-cascade
//! diagnostic. Every failing statement must leave all tables untouched.
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test cascade_delete -- --nocapture
//! ```

use cascara::{
    ColumnDef, DataType, DeleteStatement, Engine, Expr, ForeignKeyDef, IndexDef, RangeDecl,
    ReferentialAction, Session, Statement, TableDef, UpdateStatement, Value,
};
use cascara::dml::Assignment;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// departments(id, name) <- employees(id, dept_id, name) <- tasks(id, emp_id)
fn org_engine(
    dept_delete: ReferentialAction,
    emp_delete: ReferentialAction,
) -> (Engine, u64, u64, u64) {
    let engine = Engine::new();
    let departments = engine
        .create_table(
            TableDef::new(
                "departments",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("name", DataType::Text),
                ],
            )
            .with_primary_key(vec![0])
            .with_index(IndexDef::new("idx_departments_id", vec![0], true)),
        )
        .unwrap();
    let employees = engine
        .create_table(
            TableDef::new(
                "employees",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("dept_id", DataType::Int8),
                    ColumnDef::new("name", DataType::Text),
                ],
            )
            .with_primary_key(vec![0])
            .with_index(IndexDef::new("idx_employees_id", vec![0], true))
            .with_index(IndexDef::new("idx_employees_dept", vec![1], false)),
        )
        .unwrap();
    let tasks = engine
        .create_table(
            TableDef::new(
                "tasks",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("emp_id", DataType::Int8),
                ],
            )
            .with_primary_key(vec![0])
            .with_index(IndexDef::new("idx_tasks_emp", vec![1], false)),
        )
        .unwrap();

    engine
        .add_foreign_key(
            ForeignKeyDef::new("fk_emp_dept", employees, vec![1], departments, vec![0])
                .on_delete(dept_delete)
                .on_update(ReferentialAction::Cascade),
        )
        .unwrap();
    engine
        .add_foreign_key(
            ForeignKeyDef::new("fk_task_emp", tasks, vec![1], employees, vec![0])
                .on_delete(emp_delete),
        )
        .unwrap();

    for (id, name) in [(1, "engineering"), (2, "sales")] {
        engine.insert(departments, vec![id.into(), name.into()]).unwrap();
    }
    for (id, dept, name) in [(10, 1, "ada"), (11, 1, "grace"), (20, 2, "edsger")] {
        engine
            .insert(employees, vec![id.into(), dept.into(), name.into()])
            .unwrap();
    }
    for (id, emp) in [(100, 10), (101, 10), (102, 11), (200, 20)] {
        engine.insert(tasks, vec![id.into(), emp.into()]).unwrap();
    }
    (engine, departments, employees, tasks)
}

fn delete_where(engine: &Engine, table: u64, condition: Expr) -> Statement {
    let plan = engine
        .compile(vec![RangeDecl::table(table)], Some(condition))
        .expect("Failed to compile delete plan");
    Statement::Delete(DeleteStatement {
        table,
        plan,
        target_range: 0,
    })
}

fn column_values(engine: &Engine, table: u64, column: usize) -> Vec<Value> {
    engine
        .rows(table)
        .unwrap()
        .into_iter()
        .map(|(_, row)| row[column].clone())
        .collect()
}

// ============================================================================
// DELETE TESTS
// ============================================================================

mod delete_tests {
    use super::*;

    #[test]
    fn restrict_rejects_delete_and_changes_nothing() {
        let (engine, departments, employees, tasks) =
            org_engine(ReferentialAction::Restrict, ReferentialAction::Cascade);

        let stmt = delete_where(&engine, departments, Expr::eq(Expr::col(0, 0), Expr::lit(1)));
        let err = engine
            .execute(&stmt, &Session::new())
            .expect_err("restricted delete must fail");
        let text = err.to_string();
        assert!(text.contains("FOREIGN KEY constraint violated"), "{}", text);
        assert!(text.contains("still referenced"), "{}", text);
        assert!(text.contains("fk_emp_dept"), "{}", text);

        assert_eq!(engine.row_count(departments).unwrap(), 2);
        assert_eq!(engine.row_count(employees).unwrap(), 3);
        assert_eq!(engine.row_count(tasks).unwrap(), 4);
    }

    #[test]
    fn cascade_delete_removes_the_transitive_closure() {
        let (engine, departments, employees, tasks) =
            org_engine(ReferentialAction::Cascade, ReferentialAction::Cascade);

        let stmt = delete_where(&engine, departments, Expr::eq(Expr::col(0, 0), Expr::lit(1)));
        let result = engine.execute(&stmt, &Session::new()).unwrap();
        assert_eq!(result.row_count(), 1, "count covers the statement's own table");

        assert_eq!(column_values(&engine, departments, 0), vec![Value::Int(2)]);
        assert_eq!(column_values(&engine, employees, 0), vec![Value::Int(20)]);
        assert_eq!(column_values(&engine, tasks, 0), vec![Value::Int(200)]);
    }

    #[test]
    fn set_null_clears_only_the_foreign_key_columns() {
        let (engine, departments, employees, _tasks) =
            org_engine(ReferentialAction::SetNull, ReferentialAction::Cascade);

        let stmt = delete_where(&engine, departments, Expr::eq(Expr::col(0, 0), Expr::lit(1)));
        engine.execute(&stmt, &Session::new()).unwrap();

        let rows: Vec<Vec<Value>> = engine
            .rows(employees)
            .unwrap()
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        assert_eq!(rows.len(), 3, "SET NULL keeps the referencing rows");
        for row in &rows {
            match &row[0] {
                Value::Int(10) => assert_eq!(row[1..], [Value::Null, "ada".into()]),
                Value::Int(11) => assert_eq!(row[1..], [Value::Null, "grace".into()]),
                Value::Int(20) => assert_eq!(row[1..], [2.into(), "edsger".into()]),
                other => panic!("unexpected employee id {:?}", other),
            }
        }
    }

    #[test]
    fn set_default_restores_the_declared_default() {
        let engine = Engine::new();
        let parents = engine
            .create_table(
                TableDef::new("parents", vec![ColumnDef::new("id", DataType::Int8).not_null()])
                    .with_index(IndexDef::new("idx_parents_id", vec![0], true)),
            )
            .unwrap();
        let children = engine
            .create_table(TableDef::new(
                "children",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("parent_id", DataType::Int8).with_default(0),
                ],
            ))
            .unwrap();
        engine
            .add_foreign_key(
                ForeignKeyDef::new("fk_child_parent", children, vec![1], parents, vec![0])
                    .on_delete(ReferentialAction::SetDefault),
            )
            .unwrap();
        engine.insert(parents, vec![0.into()]).unwrap();
        engine.insert(parents, vec![7.into()]).unwrap();
        engine.insert(children, vec![1.into(), 7.into()]).unwrap();

        let stmt = delete_where(&engine, parents, Expr::eq(Expr::col(0, 0), Expr::lit(7)));
        engine.execute(&stmt, &Session::new()).unwrap();
        assert_eq!(column_values(&engine, children, 1), vec![Value::Int(0)]);
    }

    #[test]
    fn self_referencing_cascade_follows_the_chain() {
        let engine = Engine::new();
        let nodes = engine
            .create_table(
                TableDef::new(
                    "nodes",
                    vec![
                        ColumnDef::new("id", DataType::Int8).not_null(),
                        ColumnDef::new("parent_id", DataType::Int8),
                    ],
                )
                .with_primary_key(vec![0])
                .with_index(IndexDef::new("idx_nodes_id", vec![0], true))
                .with_index(IndexDef::new("idx_nodes_parent", vec![1], false)),
            )
            .unwrap();
        engine
            .add_foreign_key(
                ForeignKeyDef::new("fk_node_parent", nodes, vec![1], nodes, vec![0])
                    .on_delete(ReferentialAction::Cascade),
            )
            .unwrap();
        engine.insert(nodes, vec![1.into(), Value::Null]).unwrap();
        engine.insert(nodes, vec![2.into(), 1.into()]).unwrap();
        engine.insert(nodes, vec![3.into(), 2.into()]).unwrap();

        let stmt = delete_where(&engine, nodes, Expr::eq(Expr::col(0, 0), Expr::lit(1)));
        let result = engine.execute(&stmt, &Session::new()).unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(engine.row_count(nodes).unwrap(), 0, "the whole chain is deleted");
    }

    #[test]
    fn null_foreign_key_is_untouched_by_cascade() {
        let (engine, departments, employees, _tasks) =
            org_engine(ReferentialAction::Cascade, ReferentialAction::Cascade);
        engine
            .insert(employees, vec![30.into(), Value::Null, "alan".into()])
            .unwrap();

        let stmt = delete_where(&engine, departments, Expr::eq(Expr::col(0, 0), Expr::lit(1)));
        engine.execute(&stmt, &Session::new()).unwrap();

        let mut ids = column_values(&engine, employees, 0);
        ids.sort_by(|a, b| a.key_cmp(b));
        assert_eq!(ids, vec![Value::Int(20), Value::Int(30)]);
    }
}

// ============================================================================
// UPDATE CASCADE TESTS
// ============================================================================

mod update_tests {
    use super::*;

    fn update_where(
        engine: &Engine,
        table: u64,
        condition: Expr,
        assignments: Vec<Assignment>,
    ) -> Statement {
        let plan = engine
            .compile(vec![RangeDecl::table(table)], Some(condition))
            .expect("Failed to compile update plan");
        Statement::Update(UpdateStatement {
            table,
            plan,
            target_range: 0,
            assignments,
            check_condition: None,
        })
    }

    #[test]
    fn key_change_cascades_to_child_columns() {
        let (engine, departments, employees, _tasks) =
            org_engine(ReferentialAction::Restrict, ReferentialAction::Cascade);

        let stmt = update_where(
            &engine,
            departments,
            Expr::eq(Expr::col(0, 0), Expr::lit(1)),
            vec![Assignment::set(0, Expr::lit(100))],
        );
        let result = engine.execute(&stmt, &Session::new()).unwrap();
        assert_eq!(result.row_count(), 1);

        let mut depts = column_values(&engine, employees, 1);
        depts.sort_by(|a, b| a.key_cmp(b));
        assert_eq!(depts, vec![Value::Int(2), Value::Int(100), Value::Int(100)]);
    }

    #[test]
    fn restrict_blocks_a_referenced_key_change() {
        let (engine, _departments, employees, tasks) =
            org_engine(ReferentialAction::Restrict, ReferentialAction::Cascade);

        // fk_task_emp carries the default NO ACTION update action.
        let stmt = update_where(
            &engine,
            employees,
            Expr::eq(Expr::col(0, 0), Expr::lit(10)),
            vec![Assignment::set(0, Expr::lit(99))],
        );
        let err = engine
            .execute(&stmt, &Session::new())
            .expect_err("referenced key change must fail");
        assert!(err.to_string().contains("fk_task_emp"), "{}", err);
        assert_eq!(column_values(&engine, tasks, 1).len(), 4);
        assert!(column_values(&engine, employees, 0).contains(&Value::Int(10)));
    }

    #[test]
    fn conflicting_cascades_report_a_data_change_violation() {
        let engine = Engine::new();
        let parents = engine
            .create_table(
                TableDef::new(
                    "parents",
                    vec![
                        ColumnDef::new("id", DataType::Int8).not_null(),
                        ColumnDef::new("code", DataType::Int8).not_null(),
                    ],
                )
                .with_index(IndexDef::new("idx_parents_id", vec![0], true))
                .with_index(IndexDef::new("idx_parents_code", vec![1], true)),
            )
            .unwrap();
        let children = engine
            .create_table(TableDef::new(
                "children",
                vec![
                    ColumnDef::new("id", DataType::Int8).not_null(),
                    ColumnDef::new("ref_value", DataType::Int8),
                ],
            ))
            .unwrap();
        for (name, parent_col) in [("fk_child_id", 0), ("fk_child_code", 1)] {
            engine
                .add_foreign_key(
                    ForeignKeyDef::new(name, children, vec![1], parents, vec![parent_col])
                        .on_update(ReferentialAction::Cascade),
                )
                .unwrap();
        }
        engine.insert(parents, vec![1.into(), 1.into()]).unwrap();
        engine.insert(children, vec![10.into(), 1.into()]).unwrap();

        // Both constraints match the child row but propagate different
        // replacement values.
        let stmt = update_where(
            &engine,
            parents,
            Expr::eq(Expr::col(0, 0), Expr::lit(1)),
            vec![
                Assignment::set(0, Expr::lit(5)),
                Assignment::set(1, Expr::lit(7)),
            ],
        );
        let err = engine
            .execute(&stmt, &Session::new())
            .expect_err("conflicting cascades must fail");
        assert!(
            err.to_string().contains("triggered data change violation"),
            "{}",
            err
        );
        assert_eq!(column_values(&engine, children, 1), vec![Value::Int(1)]);
        assert_eq!(column_values(&engine, parents, 0), vec![Value::Int(1)]);
    }
}

// ============================================================================
// INSERT-SIDE CONSTRAINT TESTS
// ============================================================================

mod insert_tests {
    use super::*;

    #[test]
    fn insert_rejects_a_missing_parent_key() {
        let (engine, _departments, employees, _tasks) =
            org_engine(ReferentialAction::Restrict, ReferentialAction::Cascade);

        let err = engine
            .insert(employees, vec![30.into(), 999.into(), "nobody".into()])
            .expect_err("orphan insert must fail");
        let text = err.to_string();
        assert!(text.contains("no matching row"), "{}", text);
        assert!(text.contains("fk_emp_dept"), "{}", text);
        assert_eq!(engine.row_count(employees).unwrap(), 3);
    }

    #[test]
    fn insert_with_null_foreign_key_is_allowed() {
        let (engine, _departments, employees, _tasks) =
            org_engine(ReferentialAction::Restrict, ReferentialAction::Cascade);
        engine
            .insert(employees, vec![30.into(), Value::Null, "alan".into()])
            .expect("NULL foreign key bypasses the parent check");
        assert_eq!(engine.row_count(employees).unwrap(), 4);
    }
}
