//! Database schema definitions using sea-query.

use sea_query::Iden;

/// Records table schema: one JSON document per (kind, id).
#[derive(Iden)]
pub enum Records {
    Table,
    #[iden = "kind"]
    Kind,
    #[iden = "id"]
    Id,
    #[iden = "body"]
    Body,
}

/// SQL for creating the records table.
pub const CREATE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
"#;
