use rust_sqlite_orm::{
    col, column, JournalMode, Schema, Select, SqliteConfig, SqliteStorage, StorageError,
    TableDefinition,
};
use tempfile::NamedTempFile;

#[derive(Debug, Default, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: Option<i32>,
}

fn user_schema() -> Schema {
    Schema::new().add_table(
        TableDefinition::new("users")
            .with_column(column("id", |u: &User| u.id, |u, v| u.id = v).primary_key())
            .with_column(column("name", |u: &User| u.name.clone(), |u, v| u.name = v).not_null())
            .with_column(column("age", |u: &User| u.age, |u, v| u.age = v)),
    )
}

fn open_storage() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory(user_schema()).unwrap();
    storage.sync_schema().unwrap();
    storage
}

#[test]
fn test_insert_and_select_by_key() {
    let storage = open_storage();
    let user = User {
        id: 1,
        name: "a".into(),
        age: Some(30),
    };
    storage.insert(&user).unwrap();

    let found: Vec<User> = storage
        .select(Select::new().with_where(col("id").eq(1)))
        .unwrap();
    assert_eq!(found, vec![user]);
}

#[test]
fn test_basic_crud_cycle() {
    let storage = open_storage();
    let mut user = User {
        id: 1,
        name: "John Doe".into(),
        age: Some(30),
    };
    storage.insert(&user).unwrap();

    user.age = Some(31);
    storage.update(&user).unwrap();
    assert_eq!(storage.get::<User, _>(1i64).unwrap().age, Some(31));

    storage.remove::<User, _>(1i64).unwrap();
    assert!(storage.get_optional::<User, _>(1i64).unwrap().is_none());
    assert!(matches!(
        storage.get::<User, _>(1i64),
        Err(StorageError::Engine(rusqlite::Error::QueryReturnedNoRows))
    ));
}

#[test]
fn test_optional_field_round_trips_absence() {
    let storage = open_storage();
    storage
        .insert(&User {
            id: 1,
            name: "with".into(),
            age: Some(44),
        })
        .unwrap();
    storage
        .insert(&User {
            id: 2,
            name: "without".into(),
            age: None,
        })
        .unwrap();

    assert_eq!(storage.get::<User, _>(1i64).unwrap().age, Some(44));
    assert_eq!(storage.get::<User, _>(2i64).unwrap().age, None);
}

#[test]
fn test_replace_upserts_by_primary_key() {
    let storage = open_storage();
    storage
        .insert(&User {
            id: 1,
            name: "old".into(),
            age: None,
        })
        .unwrap();
    storage
        .replace(&User {
            id: 1,
            name: "new".into(),
            age: Some(7),
        })
        .unwrap();

    assert_eq!(storage.count::<User>(None).unwrap(), 1);
    assert_eq!(storage.get::<User, _>(1i64).unwrap().name, "new");
}

#[test]
fn test_get_all_preserves_inserted_rows() {
    let storage = open_storage();
    for id in 1..=3 {
        storage
            .insert(&User {
                id,
                name: format!("user{id}"),
                age: None,
            })
            .unwrap();
    }
    let all = storage.get_all::<User>().unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_unregistered_type_is_an_unmapped_type_error() {
    #[derive(Default)]
    struct Stranger;

    let storage = open_storage();
    assert!(matches!(
        storage.get_all::<Stranger>(),
        Err(StorageError::UnmappedType(_))
    ));
}

#[test]
fn test_transaction_commit_and_rollback() {
    let mut storage = open_storage();

    storage
        .transaction(|tx| {
            tx.insert(&User {
                id: 1,
                name: "kept".into(),
                age: None,
            })?;
            Ok(())
        })
        .unwrap();

    let aborted: rust_sqlite_orm::Result<()> = storage.transaction(|tx| {
        tx.insert(&User {
            id: 2,
            name: "dropped".into(),
            age: None,
        })?;
        Err(StorageError::Configuration("abort".into()))
    });
    assert!(aborted.is_err());

    assert_eq!(storage.count::<User>(None).unwrap(), 1);
    assert!(storage.get_optional::<User, _>(2i64).unwrap().is_none());
}

#[test]
fn test_file_backed_storage_with_wal_journal() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap();

    let config = SqliteConfig::new(path).with_journal_mode(JournalMode::Wal);
    let storage = SqliteStorage::open(config, user_schema()).unwrap();
    storage.sync_schema().unwrap();
    assert_eq!(storage.journal_mode().unwrap(), JournalMode::Wal);

    storage
        .insert(&User {
            id: 9,
            name: "persisted".into(),
            age: None,
        })
        .unwrap();
    drop(storage);

    // reopen the same file and read the row back
    let reopened = SqliteStorage::open(SqliteConfig::new(path), user_schema()).unwrap();
    assert_eq!(reopened.get::<User, _>(9i64).unwrap().name, "persisted");
}

#[test]
fn test_remove_where_reports_affected_rows() {
    let storage = open_storage();
    for id in 1..=4 {
        storage
            .insert(&User {
                id,
                name: "n".into(),
                age: Some(id as i32 * 10),
            })
            .unwrap();
    }
    let removed = storage.remove_where::<User>(col("age").ge(30)).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(storage.count::<User>(None).unwrap(), 2);
}
