pub const SCHEMA: &str = r#"
-- Owners hold the shared dashboard password
CREATE TABLE IF NOT EXISTS owners (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,      -- argon2id hash with embedded salt
    created_at TEXT DEFAULT (datetime('now'))
);

-- Login sessions; the raw token is only ever shown to the client
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL,       -- 8 char prefix for fast lookup
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL
);

-- Growing tables
CREATE TABLE IF NOT EXISTS hydroponic_tables (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,

    -- Paired event slots (latest >= previous)
    harvest_previous TEXT,
    harvest_latest TEXT,
    water_change_previous TEXT,
    water_change_latest TEXT,

    -- Water quality
    ph_value REAL CHECK (ph_value IS NULL OR (ph_value >= 0 AND ph_value <= 14)),
    ppm_value REAL CHECK (ppm_value IS NULL OR ppm_value >= 0),
    last_measured_at TEXT,

    nutrient_ml REAL NOT NULL DEFAULT 0 CHECK (nutrient_ml >= 0),
    created_at TEXT NOT NULL
);

-- Advisory history. No foreign keys: rows outlive deleted tables.
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS measurement_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_id TEXT NOT NULL,
    ph_value REAL,
    ppm_value REAL,
    measured_at TEXT NOT NULL
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_lookup ON sessions(token_lookup);
CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id);
CREATE INDEX IF NOT EXISTS idx_tables_owner ON hydroponic_tables(owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_events_table ON events(table_id);
CREATE INDEX IF NOT EXISTS idx_measurement_history_table ON measurement_history(table_id);
"#;
