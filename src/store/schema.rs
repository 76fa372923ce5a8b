pub const SCHEMA: &str = r#"
-- operator-authored posts with a delivery time
CREATE TABLE IF NOT EXISTS scheduled_posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    image_ref TEXT,
    target_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_scheduled_posts_due ON scheduled_posts(status, target_at);

-- discovered content awaiting moderation
CREATE TABLE IF NOT EXISTS candidates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    title_key TEXT NOT NULL,
    body TEXT NOT NULL,
    category TEXT NOT NULL,
    source_url TEXT,
    image_ref TEXT,
    is_approved INTEGER NOT NULL DEFAULT 0,
    is_published INTEGER NOT NULL DEFAULT 0,
    found_at TEXT NOT NULL
);

-- assists the duplicate check, not a uniqueness constraint
CREATE INDEX IF NOT EXISTS idx_candidates_title_found ON candidates(title_key, found_at);
CREATE INDEX IF NOT EXISTS idx_candidates_found_at ON candidates(found_at DESC);
"#;
