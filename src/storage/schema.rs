//! Database schema definitions
//!
//! Every table declares a primary key; the merge engine relies on it for
//! insert-or-replace.

/// SQL to create the environment table
pub const CREATE_ENVIRONMENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS environment (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    version TEXT NOT NULL
)
"#;

/// SQL to create the environment_values table
pub const CREATE_ENVIRONMENT_VALUES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS environment_values (
    id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (id, key)
)
"#;

/// SQL to create the package table
pub const CREATE_PACKAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS package (
    name TEXT PRIMARY KEY,
    repository TEXT
)
"#;

/// SQL to create the module descriptor table
pub const CREATE_INF_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inf (
    path TEXT PRIMARY KEY,
    guid TEXT,
    library_class TEXT,
    package TEXT
)
"#;

/// SQL to create the source file table
pub const CREATE_SOURCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS source (
    path TEXT PRIMARY KEY,
    license TEXT,
    total_lines INTEGER,
    code_lines INTEGER,
    comment_lines INTEGER,
    blank_lines INTEGER
)
"#;

/// SQL to create the instanced module table
pub const CREATE_INSTANCED_INF_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS instanced_inf (
    env INTEGER NOT NULL,
    path TEXT NOT NULL,
    component TEXT NOT NULL,
    class TEXT,
    name TEXT,
    arch TEXT,
    dsc TEXT,
    PRIMARY KEY (env, component, path)
)
"#;

/// SQL to create the instanced firmware volume table
pub const CREATE_INSTANCED_FV_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS instanced_fv (
    env INTEGER NOT NULL,
    fv_name TEXT NOT NULL,
    fdf TEXT,
    path TEXT,
    PRIMARY KEY (env, fv_name)
)
"#;

/// SQL to create the generic edge table
pub const CREATE_JUNCTION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS junction (
    env INTEGER NOT NULL,
    table1 TEXT NOT NULL,
    key1 TEXT NOT NULL,
    table2 TEXT NOT NULL,
    key2 TEXT NOT NULL,
    PRIMARY KEY (env, table1, key1, table2, key2)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_junction_forward ON junction(env, table1, key1, table2)",
    "CREATE INDEX IF NOT EXISTS idx_instanced_inf_component ON instanced_inf(env, component)",
];

/// Tables whose environment column is named `id` rather than `env`
pub const ENVIRONMENT_TABLES: &[&str] = &["environment", "environment_values"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_ENVIRONMENT_TABLE,
        CREATE_ENVIRONMENT_VALUES_TABLE,
        CREATE_PACKAGE_TABLE,
        CREATE_INF_TABLE,
        CREATE_SOURCE_TABLE,
        CREATE_INSTANCED_INF_TABLE,
        CREATE_INSTANCED_FV_TABLE,
        CREATE_JUNCTION_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Column that scopes a table's rows to an environment, if any
pub fn env_column_for(table: &str, columns: &[String]) -> Option<&'static str> {
    if ENVIRONMENT_TABLES.contains(&table) {
        Some("id")
    } else if columns.iter().any(|c| c == "env") {
        Some("env")
    } else {
        None
    }
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
