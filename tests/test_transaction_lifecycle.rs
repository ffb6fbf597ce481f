use sqlvtab::vtab::{VirtualCursor, VirtualTable};
use sqlvtab::{Error, TableConfig, Value, Vtab};

fn accounts() -> Vtab {
    Vtab::connect(
        "accounts",
        &["name TEXT PRIMARY KEY", "balance INTEGER"],
        TableConfig::default(),
    )
    .unwrap()
}

fn deposit(vtab: &mut Vtab, name: &str, balance: i64) -> i64 {
    vtab.insert(None, &[Value::from(name).into(), Value::Integer(balance).into()])
        .unwrap()
}

fn names(vtab: &Vtab) -> Vec<String> {
    let mut cursor = vtab.open().unwrap();
    cursor.filter("", &[]).unwrap();
    let mut names = Vec::new();
    while !cursor.eof() {
        names.push(cursor.column(0).unwrap().to_string());
        cursor.next().unwrap();
    }
    names
}

#[test]
fn test_transaction_lifecycle() {
    let mut vtab = accounts();
    deposit(&mut vtab, "alice", 10);

    // BEGIN / COMMIT
    vtab.begin().unwrap();
    deposit(&mut vtab, "bob", 20);
    vtab.commit().unwrap();
    assert!(!vtab.in_transaction());
    assert_eq!(names(&vtab), vec!["alice", "bob"]);

    // BEGIN / ROLLBACK
    vtab.begin().unwrap();
    deposit(&mut vtab, "carol", 30);
    let mut cursor = vtab.open().unwrap();
    cursor
        .filter(r#"{"terms":[{"column":0,"op":"eq"}]}"#, &[Value::from("alice")])
        .unwrap();
    vtab.delete(cursor.rowid().unwrap()).unwrap();
    assert_eq!(names(&vtab), vec!["bob", "carol"]);
    vtab.rollback().unwrap();
    assert_eq!(names(&vtab), vec!["alice", "bob"]);
}

#[test]
fn test_framing_errors() {
    let mut vtab = accounts();

    assert!(matches!(vtab.commit(), Err(Error::NoActiveTransaction)));
    assert!(matches!(vtab.rollback(), Err(Error::NoActiveTransaction)));
    assert!(matches!(vtab.savepoint(0), Err(Error::NoActiveTransaction)));

    vtab.begin().unwrap();
    assert!(matches!(vtab.begin(), Err(Error::TransactionActive)));
    assert!(matches!(vtab.rollback_to(3), Err(Error::SavepointNotFound(3))));

    // Releasing a savepoint that was never opened is harmless
    vtab.release(5).unwrap();
    vtab.commit().unwrap();
}

#[test]
fn test_nested_savepoints() {
    let mut vtab = accounts();

    vtab.begin().unwrap();
    deposit(&mut vtab, "alice", 10);
    vtab.savepoint(0).unwrap();
    deposit(&mut vtab, "bob", 20);
    vtab.savepoint(1).unwrap();
    deposit(&mut vtab, "carol", 30);

    vtab.rollback_to(1).unwrap();
    assert_eq!(names(&vtab), vec!["alice", "bob"]);

    // The savepoint survives its own rollback
    deposit(&mut vtab, "dave", 40);
    vtab.rollback_to(1).unwrap();
    assert_eq!(names(&vtab), vec!["alice", "bob"]);

    // Rolling back to an outer level discards the inner one
    vtab.rollback_to(0).unwrap();
    assert_eq!(names(&vtab), vec!["alice"]);
    assert!(matches!(vtab.rollback_to(1), Err(Error::SavepointNotFound(1))));

    vtab.savepoint(1).unwrap();
    deposit(&mut vtab, "erin", 50);
    vtab.release(1).unwrap();
    assert!(matches!(vtab.rollback_to(1), Err(Error::SavepointNotFound(1))));
    vtab.commit().unwrap();

    assert_eq!(names(&vtab), vec!["alice", "erin"]);
}

#[test]
fn test_rollback_undoes_every_savepoint() {
    let mut vtab = accounts();
    deposit(&mut vtab, "alice", 10);

    vtab.begin().unwrap();
    vtab.savepoint(0).unwrap();
    deposit(&mut vtab, "bob", 20);
    vtab.savepoint(1).unwrap();
    deposit(&mut vtab, "carol", 30);
    vtab.rollback().unwrap();

    assert_eq!(names(&vtab), vec!["alice"]);
    assert_eq!(vtab.table().len(), 1);
}

#[test]
fn test_disconnect_discards_open_transaction() {
    let mut vtab = accounts();
    deposit(&mut vtab, "alice", 10);

    vtab.begin().unwrap();
    deposit(&mut vtab, "bob", 20);
    vtab.disconnect().unwrap();

    assert!(!vtab.in_transaction());
    assert_eq!(names(&vtab), vec!["alice"]);
}
