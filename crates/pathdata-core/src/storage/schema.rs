//! SQLite Schema Definitions
//!
//! Two table sets share one connection type:
//! - the identifier graph (`link`, `datanode`/`gene`, `attribute`)
//! - the expression dataset (`samples`, `expression`)
//!
//! Both carry a single-row `info` table holding the schema version. Databases
//! written before `datanode` existed name that table `gene`; the
//! [`SchemaVariant`] picked at open time decides which name queries use.

/// Schema version written into newly created databases
pub const SCHEMA_VERSION: i64 = 3;

/// Oldest schema version that uses the `datanode` table name
pub const MIN_DATANODE_SCHEMA_VERSION: i64 = 2;

/// Maximum stored length of sample names and identifier columns
pub const MAX_NAME_LENGTH: usize = 50;

/// SQL to create the info table
pub const SCHEMA_CREATE_INFO: &str = r#"
CREATE TABLE IF NOT EXISTS info (
    schemaversion INTEGER PRIMARY KEY NOT NULL
)
"#;

/// SQL to create the link table
///
/// Each row is a directed edge from a hub identifier (left) to a leaf
/// identifier (right). `bridge` names the resource the mapping came from.
pub const SCHEMA_CREATE_LINK: &str = r#"
CREATE TABLE IF NOT EXISTS link (
    idLeft VARCHAR(50) NOT NULL,
    codeLeft VARCHAR(50) NOT NULL,
    idRight VARCHAR(50) NOT NULL,
    codeRight VARCHAR(50) NOT NULL,
    bridge VARCHAR(50),
    PRIMARY KEY (idLeft, codeLeft, idRight, codeRight)
)
"#;

/// SQL to create the datanode table (backpage text per identifier)
pub const SCHEMA_CREATE_DATANODE: &str = r#"
CREATE TABLE IF NOT EXISTS datanode (
    id VARCHAR(50) NOT NULL,
    code VARCHAR(50) NOT NULL,
    backpageText TEXT,
    PRIMARY KEY (id, code)
)
"#;

/// SQL to create the attribute table (symbols and other metadata)
pub const SCHEMA_CREATE_ATTRIBUTE: &str = r#"
CREATE TABLE IF NOT EXISTS attribute (
    id VARCHAR(50) NOT NULL,
    code VARCHAR(50) NOT NULL,
    attrname VARCHAR(50) NOT NULL,
    attrvalue TEXT
)
"#;

/// Indexes for the identifier graph
pub const SCHEMA_CREATE_GRAPH_INDEXES: &str = r#"
-- Reverse edge lookups (leaf -> hub)
CREATE INDEX IF NOT EXISTS idx_link_right ON link(idRight, codeRight);

-- Forward edge lookups with a data source filter
CREATE INDEX IF NOT EXISTS idx_link_left_code ON link(idLeft, codeRight);

-- Attribute lookups by identifier and by value
CREATE INDEX IF NOT EXISTS idx_attribute_ref ON attribute(id, code);
CREATE INDEX IF NOT EXISTS idx_attribute_value ON attribute(attrname, attrvalue);
"#;

/// SQL to create the samples table
pub const SCHEMA_CREATE_SAMPLES: &str = r#"
CREATE TABLE IF NOT EXISTS samples (
    idSample INTEGER PRIMARY KEY NOT NULL,
    name VARCHAR(50),
    dataType INTEGER NOT NULL
)
"#;

/// SQL to create the expression table
///
/// No primary key: one reporter mapped to several hubs, or listed twice in
/// the source file, legitimately produces duplicate rows.
pub const SCHEMA_CREATE_EXPRESSION: &str = r#"
CREATE TABLE IF NOT EXISTS expression (
    id VARCHAR(50),
    code VARCHAR(50),
    ensId VARCHAR(50),
    idSample INTEGER,
    data VARCHAR(50),
    groupId INTEGER
)
"#;

/// Indexes for the expression dataset
pub const SCHEMA_CREATE_EXPRESSION_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_expression_hub ON expression(ensId);
CREATE INDEX IF NOT EXISTS idx_expression_reporter ON expression(id, code);
"#;

/// Column names for expression queries (in order for row mapping)
pub const EXPRESSION_COLUMNS: &str = "id, code, idSample, groupId, data";

/// Which group of tables a database holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSet {
    /// Cross-reference links, datanodes and attributes
    IdentifierGraph,
    /// Samples and raw expression values
    Expression,
}

impl TableSet {
    /// Tables dropped before the set is (re)created
    fn drop_order(self) -> &'static [&'static str] {
        match self {
            TableSet::IdentifierGraph => &["link", "datanode", "gene", "attribute", "info"],
            TableSet::Expression => &["expression", "samples", "info"],
        }
    }

    /// Statements that create the set from scratch
    fn create_statements(self) -> &'static [&'static str] {
        match self {
            TableSet::IdentifierGraph => &[
                SCHEMA_CREATE_INFO,
                SCHEMA_CREATE_LINK,
                SCHEMA_CREATE_DATANODE,
                SCHEMA_CREATE_ATTRIBUTE,
            ],
            TableSet::Expression => &[
                SCHEMA_CREATE_INFO,
                SCHEMA_CREATE_SAMPLES,
                SCHEMA_CREATE_EXPRESSION,
            ],
        }
    }

    fn index_batch(self) -> &'static str {
        match self {
            TableSet::IdentifierGraph => SCHEMA_CREATE_GRAPH_INDEXES,
            TableSet::Expression => SCHEMA_CREATE_EXPRESSION_INDEXES,
        }
    }

    /// Drop and recreate every table in the set, then stamp the schema version.
    pub(crate) fn recreate(self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        for table in self.drop_order() {
            conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;
        }
        for statement in self.create_statements() {
            conn.execute(statement, [])?;
        }
        conn.execute_batch(self.index_batch())?;
        conn.execute(
            "INSERT INTO info (schemaversion) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
        Ok(())
    }
}

/// Table naming strategy chosen once per connection from `info.schemaversion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVariant {
    version: i64,
}

impl SchemaVariant {
    /// Variant for a database stamped with `version`
    pub fn for_version(version: i64) -> Self {
        Self { version }
    }

    /// Variant of databases created by this crate
    pub fn current() -> Self {
        Self::for_version(SCHEMA_VERSION)
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// True when the identifier table is still called `gene`
    pub fn is_legacy(&self) -> bool {
        self.version < MIN_DATANODE_SCHEMA_VERSION
    }

    /// Name of the per-identifier table holding backpage text
    pub fn node_table(&self) -> &'static str {
        if self.is_legacy() {
            "gene"
        } else {
            "datanode"
        }
    }
}

impl Default for SchemaVariant {
    fn default() -> Self {
        Self::current()
    }
}
