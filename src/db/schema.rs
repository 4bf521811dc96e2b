pub const SERVERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL
);
"#;

pub const TRIGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trigs (
    id INTEGER PRIMARY KEY,
    waypoint TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    county TEXT NOT NULL DEFAULT '',
    physical_type TEXT NOT NULL DEFAULT '',
    status_id INTEGER NOT NULL DEFAULT 10,
    wgs_lat REAL NOT NULL,
    wgs_long REAL NOT NULL,
    osgb_gridref TEXT NOT NULL DEFAULT '',
    osgb_eastings INTEGER,
    osgb_northings INTEGER,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

pub const LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trig_id INTEGER NOT NULL REFERENCES trigs(id),
    user_id INTEGER NOT NULL,
    visit_date DATE,
    comment TEXT NOT NULL DEFAULT '',
    condition TEXT NOT NULL DEFAULT 'G',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

// Photos outlive their (hard-deleted) log as soft-deleted rows, so log_id
// carries no foreign key. AUTOINCREMENT keeps ids, and therefore blob keys,
// from being reused after a rollback.
pub const PHOTOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_id INTEGER NOT NULL,
    server_id INTEGER NOT NULL REFERENCES servers(id),
    photo_type TEXT NOT NULL,
    license TEXT NOT NULL,

    filename TEXT NOT NULL DEFAULT '',
    filesize INTEGER NOT NULL,
    height INTEGER NOT NULL,
    width INTEGER NOT NULL,
    icon_filename TEXT NOT NULL DEFAULT '',
    icon_filesize INTEGER NOT NULL,
    icon_height INTEGER NOT NULL,
    icon_width INTEGER NOT NULL,

    caption TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    origin TEXT NOT NULL DEFAULT 'uploaded' CHECK(origin IN ('uploaded', 'revised')),
    status TEXT NOT NULL DEFAULT 'provisional' CHECK(status IN ('provisional', 'committed')),
    revision INTEGER NOT NULL DEFAULT 0,
    deleted BOOLEAN NOT NULL DEFAULT FALSE,
    ip_addr TEXT NOT NULL DEFAULT '',

    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

pub const POSTCODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS postcodes (
    code TEXT PRIMARY KEY NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL
) WITHOUT ROWID;
"#;

pub const SCHEMA_SQL: &[&str] = &[
    SERVERS_TABLE,
    TRIGS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_trigs_status ON trigs(status_id);",
    "CREATE INDEX IF NOT EXISTS idx_trigs_location ON trigs(wgs_lat, wgs_long);",
    LOGS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_logs_trig_id ON logs(trig_id);",
    "CREATE INDEX IF NOT EXISTS idx_logs_user_id ON logs(user_id);",
    PHOTOS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_photos_log_id ON photos(log_id);",
    "CREATE INDEX IF NOT EXISTS idx_photos_visible ON photos(status, deleted);",
    POSTCODES_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_postcodes_location ON postcodes(lat, lon);",
];
