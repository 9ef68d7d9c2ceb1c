use pagedb::{Attribute, Condition, DataType, Schema, StorageManager, Value};
use std::collections::HashMap;

fn open_storage() -> (tempfile::TempDir, StorageManager) {
    let dir = tempfile::tempdir().expect("Should have created temp dir.");
    let manager = StorageManager::open(dir.path()).expect("Should have opened storage.");
    (dir, manager)
}

fn id_name_schema() -> Schema {
    Schema::new(vec![
        Attribute::new("id", DataType::Int, 4),
        Attribute::new("name", DataType::VarChar, 50),
    ])
}

fn id_name_age_schema() -> Schema {
    Schema::new(vec![
        Attribute::new("id", DataType::Int, 4),
        Attribute::new("name", DataType::VarChar, 50),
        Attribute::new("age", DataType::Int, 4),
    ])
}

fn row(id: i32, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::VarChar(name.to_string())]
}

fn aged_row(id: i32, name: &str, age: i32) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::VarChar(name.to_string()),
        Value::Int(age),
    ]
}

fn seed_ages(manager: &mut StorageManager) {
    manager
        .create_table("u", id_name_age_schema())
        .expect("Should have created table.");
    manager
        .insert_into_table(
            "u",
            vec![
                aged_row(1, "A", 20),
                aged_row(2, "B", 21),
                aged_row(3, "C", 21),
                aged_row(4, "D", 21),
                aged_row(5, "E", 19),
            ],
        )
        .expect("Should have inserted rows.");
}

#[test]
fn test_roundtrip_ints_and_varchars() {
    let (_dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    let inserted = manager
        .insert_into_table("t", vec![row(1, "Alice"), row(2, "Bob")])
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(
        manager.get_table_data("t", None, &[]).unwrap(),
        vec![row(1, "Alice"), row(2, "Bob")]
    );
}

#[test]
fn test_selection_by_equality() {
    let (_dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    manager
        .insert_into_table("t", vec![row(1, "Alice"), row(2, "Bob")])
        .unwrap();

    let cond = Condition::new("id", "=", "2").unwrap();
    assert_eq!(
        manager.get_table_data("t", Some(&cond), &[]).unwrap(),
        vec![row(2, "Bob")]
    );

    let cond = Condition::new("name", "=", "'Alice'").unwrap();
    assert_eq!(
        manager.get_table_data("t", Some(&cond), &[]).unwrap(),
        vec![row(1, "Alice")]
    );
}

#[test]
fn test_selection_by_range_delete() {
    let (_dir, mut manager) = open_storage();
    seed_ages(&mut manager);

    let cond = Condition::new("age", ">=", "20").unwrap();
    let deleted = manager.delete_table_record("u", Some(&cond)).unwrap();
    assert_eq!(deleted, 4);
    assert_eq!(
        manager.get_table_data("u", None, &[]).unwrap(),
        vec![aged_row(5, "E", 19)]
    );

    // Delete idempotence: running the same delete again changes nothing.
    let deleted = manager.delete_table_record("u", Some(&cond)).unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(
        manager.get_table_data("u", None, &[]).unwrap(),
        vec![aged_row(5, "E", 19)]
    );
}

#[test]
fn test_update_with_arithmetic() {
    let (_dir, mut manager) = open_storage();
    seed_ages(&mut manager);

    let mut assignments = HashMap::new();
    assignments.insert("age".to_string(), "age ^ (5 - 3) - 100".to_string());
    let cond = Condition::new("id", "=", "4").unwrap();
    let affected = manager
        .update_table("u", &assignments, Some(&cond))
        .unwrap();
    assert_eq!(affected, 1);

    let rows = manager.get_table_data("u", None, &[]).unwrap();
    // 21 ^ 2 - 100
    assert_eq!(rows[3], aged_row(4, "D", 341));
    assert_eq!(rows[0], aged_row(1, "A", 20));
    assert_eq!(rows.len(), 5);
}

#[test]
fn test_join_two_tables() {
    let (_dir, mut manager) = open_storage();
    manager
        .create_table(
            "emp",
            Schema::new(vec![
                Attribute::new("id", DataType::Int, 4),
                Attribute::new("dept_id", DataType::Int, 4),
                Attribute::new("name", DataType::VarChar, 20),
            ]),
        )
        .unwrap();
    manager
        .create_table(
            "dept",
            Schema::new(vec![
                Attribute::new("dept_id", DataType::Int, 4),
                Attribute::new("dname", DataType::VarChar, 20),
            ]),
        )
        .unwrap();
    manager
        .insert_into_table(
            "emp",
            vec![
                vec![
                    Value::Int(1),
                    Value::Int(10),
                    Value::VarChar("Ann".to_string()),
                ],
                vec![
                    Value::Int(2),
                    Value::Int(20),
                    Value::VarChar("Bo".to_string()),
                ],
            ],
        )
        .unwrap();
    manager
        .insert_into_table(
            "dept",
            vec![
                vec![Value::Int(10), Value::VarChar("Eng".to_string())],
                vec![Value::Int(20), Value::VarChar("Ops".to_string())],
            ],
        )
        .unwrap();

    let (rows, columns) = manager
        .get_joined_table(
            &["emp".to_string(), "dept".to_string()],
            &[("emp.dept_id".to_string(), "dept.dept_id".to_string())],
            &[None, None],
            None,
            &[],
        )
        .unwrap();

    assert_eq!(
        columns,
        vec![
            "emp.id".to_string(),
            "emp.dept_id".to_string(),
            "emp.name".to_string(),
            "dept.dept_id".to_string(),
            "dept.dname".to_string(),
        ]
    );
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Int(1),
                Value::Int(10),
                Value::VarChar("Ann".to_string()),
                Value::Int(10),
                Value::VarChar("Eng".to_string()),
            ],
            vec![
                Value::Int(2),
                Value::Int(20),
                Value::VarChar("Bo".to_string()),
                Value::Int(20),
                Value::VarChar("Ops".to_string()),
            ],
        ]
    );
}

#[test]
fn test_join_with_conditions_and_projection() {
    let (_dir, mut manager) = open_storage();
    manager
        .create_table(
            "emp",
            Schema::new(vec![
                Attribute::new("id", DataType::Int, 4),
                Attribute::new("dept_id", DataType::Int, 4),
                Attribute::new("name", DataType::VarChar, 20),
            ]),
        )
        .unwrap();
    manager
        .create_table(
            "dept",
            Schema::new(vec![
                Attribute::new("dept_id", DataType::Int, 4),
                Attribute::new("dname", DataType::VarChar, 20),
            ]),
        )
        .unwrap();
    manager
        .insert_into_table(
            "emp",
            vec![
                vec![
                    Value::Int(1),
                    Value::Int(10),
                    Value::VarChar("Ann".to_string()),
                ],
                vec![
                    Value::Int(2),
                    Value::Int(20),
                    Value::VarChar("Bo".to_string()),
                ],
                vec![
                    Value::Int(3),
                    Value::Int(10),
                    Value::VarChar("Cy".to_string()),
                ],
            ],
        )
        .unwrap();
    manager
        .insert_into_table(
            "dept",
            vec![
                vec![Value::Int(10), Value::VarChar("Eng".to_string())],
                vec![Value::Int(20), Value::VarChar("Ops".to_string())],
            ],
        )
        .unwrap();

    // Per-table condition trims emp before the join; the global condition
    // and projection apply to the combined rows.
    let per_table = vec![Some(Condition::new("id", "!=", "2").unwrap()), None];
    let global = Condition::new("dept.dname", "=", "'Eng'").unwrap();
    let (rows, columns) = manager
        .get_joined_table(
            &["emp".to_string(), "dept".to_string()],
            &[("emp.dept_id".to_string(), "dept.dept_id".to_string())],
            &per_table,
            Some(&global),
            &["emp.name".to_string(), "dept.dname".to_string()],
        )
        .unwrap();

    assert_eq!(
        columns,
        vec!["emp.name".to_string(), "dept.dname".to_string()]
    );
    assert_eq!(
        rows,
        vec![
            vec![
                Value::VarChar("Ann".to_string()),
                Value::VarChar("Eng".to_string()),
            ],
            vec![
                Value::VarChar("Cy".to_string()),
                Value::VarChar("Eng".to_string()),
            ],
        ]
    );
}

#[test]
fn test_hash_index_point_lookup() {
    let (dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    manager
        .insert_into_table("t", vec![row(1, "Alice"), row(2, "Bob"), row(3, "Alice")])
        .unwrap();
    manager.set_index("t", "name", "hash").unwrap();
    assert!(dir.path().join("t-name-hash.idx").exists());

    // Both Alice rows come back in insertion order after collision filtering.
    let hits = manager
        .get_index("t", "name", "'Alice'", DataType::VarChar)
        .unwrap()
        .expect("Should have found an index file.");
    assert_eq!(hits, vec![row(1, "Alice"), row(3, "Alice")]);

    let misses = manager
        .get_index("t", "name", "'Zed'", DataType::VarChar)
        .unwrap()
        .unwrap();
    assert!(misses.is_empty());

    // No index file for this column.
    assert!(manager
        .get_index("t", "id", "1", DataType::Int)
        .unwrap()
        .is_none());
}

#[test]
fn test_index_follows_inserts_and_deletes() {
    let (_dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    manager
        .insert_into_table("t", vec![row(1, "Alice"), row(2, "Bob")])
        .unwrap();
    manager.set_index("t", "name", "hash").unwrap();

    // Inserts rebuild existing indexes.
    manager
        .insert_into_table("t", vec![row(3, "Alice")])
        .unwrap();
    let hits = manager
        .get_index("t", "name", "'Alice'", DataType::VarChar)
        .unwrap()
        .unwrap();
    assert_eq!(hits, vec![row(1, "Alice"), row(3, "Alice")]);

    // Deletes compact the file; the rebuilt index must track new offsets.
    let cond = Condition::new("id", "=", "1").unwrap();
    manager.delete_table_record("t", Some(&cond)).unwrap();
    let hits = manager
        .get_index("t", "name", "'Alice'", DataType::VarChar)
        .unwrap()
        .unwrap();
    assert_eq!(hits, vec![row(3, "Alice")]);

    // Updates rewrite every record, so they rebuild indexes too.
    let mut assignments = HashMap::new();
    assignments.insert("name".to_string(), "'Carol'".to_string());
    let cond = Condition::new("id", "=", "3").unwrap();
    manager.update_table("t", &assignments, Some(&cond)).unwrap();
    let hits = manager
        .get_index("t", "name", "'Carol'", DataType::VarChar)
        .unwrap()
        .unwrap();
    assert_eq!(hits, vec![row(3, "Carol")]);
    assert!(manager
        .get_index("t", "name", "'Alice'", DataType::VarChar)
        .unwrap()
        .unwrap()
        .is_empty());
}

#[test]
fn test_catalog_consistency_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut manager = StorageManager::open(dir.path()).unwrap();
        manager.create_table("t", id_name_schema()).unwrap();
        manager.create_table("u", id_name_age_schema()).unwrap();
        manager
            .insert_into_table("t", vec![row(1, "Alice")])
            .unwrap();
        assert_eq!(
            manager.list_tables().unwrap(),
            vec!["t".to_string(), "u".to_string()]
        );
    }

    // A fresh manager rebuilds its table map from the catalog on disk.
    let mut manager = StorageManager::open(dir.path()).unwrap();
    assert_eq!(
        manager.list_tables().unwrap(),
        vec!["t".to_string(), "u".to_string()]
    );
    assert_eq!(
        manager.get_table_data("t", None, &[]).unwrap(),
        vec![row(1, "Alice")]
    );
    assert_eq!(manager.get_table_schema("u").unwrap(), &id_name_age_schema());
}

#[test]
fn test_delete_table_removes_file_catalog_row_and_indexes() {
    let (dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    manager
        .insert_into_table("t", vec![row(1, "Alice")])
        .unwrap();
    manager.set_index("t", "name", "hash").unwrap();

    manager.delete_table("t").unwrap();
    assert!(!dir.path().join("t_table.bin").exists());
    assert!(!dir.path().join("t-name-hash.idx").exists());
    assert!(manager.list_tables().unwrap().is_empty());
    assert!(manager.get_table_data("t", None, &[]).is_err());

    // The name is free again.
    manager.create_table("t", id_name_age_schema()).unwrap();
    assert_eq!(manager.list_tables().unwrap(), vec!["t".to_string()]);
    assert!(manager.get_table_data("t", None, &[]).unwrap().is_empty());
}

#[test]
fn test_stats() {
    let (_dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    manager
        .insert_into_table("t", vec![row(1, "Alice"), row(2, "Bob"), row(3, "Alice")])
        .unwrap();

    let stats = manager.get_stats().unwrap();
    assert!(!stats.contains_key("information_schema"));
    let t = &stats["t"];
    assert_eq!(t.n_r, 3);
    assert_eq!(t.b_r, 1);
    // 4 + (2 + 50)
    assert_eq!(t.l_r, 56);
    assert_eq!(t.f_r, 3);
    assert_eq!(t.v_a_r["id"], 3);
    assert_eq!(t.v_a_r["name"], 2);
}

#[test]
fn test_condition_type_mismatch_is_an_error() {
    let (_dir, mut manager) = open_storage();
    manager.create_table("t", id_name_schema()).unwrap();
    manager
        .insert_into_table("t", vec![row(1, "Alice")])
        .unwrap();

    let cond = Condition::new("id", "=", "'Alice'").unwrap();
    assert!(manager.get_table_data("t", Some(&cond), &[]).is_err());
}

#[test]
fn test_multi_block_table_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<Vec<Value>> = (0..2000).map(|i| row(i, "abcdefghij")).collect();
    {
        let mut manager = StorageManager::open(dir.path()).unwrap();
        manager.create_table("big", id_name_schema()).unwrap();
        manager.insert_into_table("big", rows.clone()).unwrap();
        let stats = manager.get_stats().unwrap();
        assert!(stats["big"].b_r > 1, "expected a multi-block file");
        assert!(stats["big"].f_r >= 1);
    }
    let mut manager = StorageManager::open(dir.path()).unwrap();
    assert_eq!(manager.get_table_data("big", None, &[]).unwrap(), rows);
}
