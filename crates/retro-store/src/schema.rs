/// SQL DDL for the retro-store database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS retros (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    facilitator_id TEXT NOT NULL DEFAULT '',
    phase TEXT NOT NULL DEFAULT 'waiting'
);

CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    retro_id TEXT NOT NULL REFERENCES retros(id),
    column_type TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    group_id TEXT
);

CREATE TABLE IF NOT EXISTS item_groups (
    id TEXT PRIMARY KEY,
    retro_id TEXT NOT NULL REFERENCES retros(id),
    column_type TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- item_id is either an items.id or an item_groups.id (a group ballot).
CREATE TABLE IF NOT EXISTS votes (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_retro ON items(retro_id);
CREATE INDEX IF NOT EXISTS idx_items_group ON items(group_id);
CREATE INDEX IF NOT EXISTS idx_groups_retro ON item_groups(retro_id);
CREATE INDEX IF NOT EXISTS idx_votes_item ON votes(item_id);
CREATE INDEX IF NOT EXISTS idx_votes_participant ON votes(participant_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
