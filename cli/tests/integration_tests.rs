use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const MODELS: &str = r#"models:
  - name: User
    fields:
      - name: name
        type: text
        unique: true
      - name: age
        type: integer
        required: false
      - name: teams
        type:
          reference_list: Team
  - name: Team
    fields:
      - name: name
        type: text
  - name: Post
    fields:
      - name: title
        type: text
      - name: author
        type:
          reference: User
        on_delete: CASCADE
"#;

fn write_models(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("models.yaml");
    fs::write(&path, yaml).expect("failed to write models");
    path
}

fn ormagic(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ormagic"))
        .args(args)
        .output()
        .expect("failed to run ormagic")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Writes the model file and runs `migrate` against a fresh database.
fn migrated(dir: &Path) -> (String, String) {
    let models = write_models(dir, MODELS);
    let db = dir.join("app.db");
    let (models, db) = (
        models.to_str().unwrap().to_string(),
        db.to_str().unwrap().to_string(),
    );

    let out = ormagic(&["migrate", "--models", &models, "--db", &db]);
    assert!(out.status.success(), "migrate failed: {}", String::from_utf8_lossy(&out.stderr));
    (models, db)
}

// ---------------------------------------------------------------------------
// sql
// ---------------------------------------------------------------------------

#[test]
fn sql_prints_tables_and_one_junction() {
    let dir = tempfile::tempdir().unwrap();
    let models = write_models(dir.path(), MODELS);

    let out = ormagic(&["sql", "--models", models.to_str().unwrap()]);
    assert!(out.status.success());
    let sql = stdout(&out);

    assert!(sql.contains(
        "CREATE TABLE IF NOT EXISTS user (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, age INTEGER);"
    ));
    assert!(sql.contains("FOREIGN KEY (author) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE"));
    assert_eq!(sql.matches("CREATE TABLE IF NOT EXISTS user_team").count(), 1);
}

#[test]
fn sql_single_model() {
    let dir = tempfile::tempdir().unwrap();
    let models = write_models(dir.path(), MODELS);

    let out = ormagic(&["sql", "--models", models.to_str().unwrap(), "--model", "Team"]);
    assert!(out.status.success());
    let sql = stdout(&out);
    assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS team (id INTEGER PRIMARY KEY, name TEXT NOT NULL);"));
    assert!(!sql.contains("post"));
}

#[test]
fn invalid_models_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let models = write_models(
        dir.path(),
        "models:\n  - name: User\n    fields:\n      - name: name\n        type: text\n      - name: name\n        type: text\n",
    );

    let out = ormagic(&["sql", "--models", models.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("duplicate field: name"));
}

// ---------------------------------------------------------------------------
// migrate / status / drop
// ---------------------------------------------------------------------------

#[test]
fn migrate_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (models, db) = migrated(dir.path());

    let out = ormagic(&["migrate", "--models", &models, "--db", &db]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("User: up to date"));
    assert!(text.contains("Post: up to date"));
    assert!(!text.contains("create table"));
}

#[test]
fn status_reports_pending_changes() {
    let dir = tempfile::tempdir().unwrap();
    let (_, db) = migrated(dir.path());

    let changed = MODELS.replace("      - name: age\n", "      - name: years\n");
    let models = write_models(dir.path(), &changed);
    let out = ormagic(&["status", "--models", models.to_str().unwrap(), "--db", &db]);
    assert!(out.status.success());

    let statuses: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let user = statuses
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["model"] == "User")
        .unwrap();
    assert_eq!(user["exists"], true);
    assert_eq!(user["pending"][0]["step"], "rename_column");
    assert_eq!(user["pending"][0]["from"], "age");
    assert_eq!(user["pending"][0]["to"], "years");
}

#[test]
fn drop_removes_table() {
    let dir = tempfile::tempdir().unwrap();
    let (models, db) = migrated(dir.path());

    let out = ormagic(&["drop", "--models", &models, "--db", &db, "Post"]);
    assert!(out.status.success());

    let out = ormagic(&["status", "--models", &models, "--db", &db]);
    let statuses: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let post = statuses
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["model"] == "Post")
        .unwrap();
    assert_eq!(post["exists"], false);
}

// ---------------------------------------------------------------------------
// query
// ---------------------------------------------------------------------------

#[test]
fn query_filters_and_orders() {
    let dir = tempfile::tempdir().unwrap();
    let (models, db) = migrated(dir.path());

    let empty = ormagic(&["query", "--models", &models, "--db", &db, "User"]);
    assert!(empty.status.success());
    assert_eq!(stdout(&empty).trim(), "[]");

    seed(&db);

    let out = ormagic(&[
        "query", "--models", &models, "--db", &db, "User",
        "--where", "age__between=25,35",
        "--where", "order_by=-age",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let users: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let names: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ann", "John", "Jane"]);
}

#[test]
fn query_rejects_bad_conditions() {
    let dir = tempfile::tempdir().unwrap();
    let (models, db) = migrated(dir.path());

    for condition in ["age__near=3", "age=old", "height=3", "nonsense"] {
        let out = ormagic(&["query", "--models", &models, "--db", &db, "User", "--where", condition]);
        assert!(!out.status.success(), "{condition} should fail");
        assert!(String::from_utf8_lossy(&out.stderr).starts_with("error:"));
    }
}

#[test]
fn config_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let (models, db) = migrated(dir.path());
    let config = dir.path().join("store.yaml");
    fs::write(&config, "journal_mode: delete\nstrict_filters: false\n").unwrap();

    let out = ormagic(&[
        "query", "--models", &models, "--db", &db, "--config", config.to_str().unwrap(), "User",
        "--where", "name=nobody",
    ]);
    assert!(out.status.success());

    let out = ormagic(&["query", "--models", &models, "--db", &db, "--config", "/nonexistent.yaml", "User"]);
    assert!(!out.status.success());
}

/// Inserts users into a migrated database through the library.
fn seed(db: &str) {
    use ormagic_core::{Field, ModelSchema, Registry};
    use ormagic_sqlite::{Database, StoreConfig};

    let registry = Registry::from_models([
        ModelSchema::builder("User")
            .field(Field::text("name").unique())
            .field(Field::integer("age").nullable())
            .build()
            .unwrap(),
    ])
    .unwrap();
    let db = Database::open(&StoreConfig::with_path(db), registry).unwrap();
    let store = db.store();
    for (name, age) in [("John", 30), ("Jane", 25), ("Bob", 40), ("Ann", 35)] {
        let mut user = store.record("User").unwrap().with("name", name).with("age", age);
        store.save(&mut user).unwrap();
    }
}
