/// Database schema version
pub const SCHEMA_VERSION: u32 = 2;

/// SQL schema for the listing store
pub const SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

-- Reference data maintained by the admin system
CREATE TABLE IF NOT EXISTS cities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    department TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS neighborhoods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    city_id INTEGER REFERENCES cities(id),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS property_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS usage_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS listing_statuses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS consignment_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS advisors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    phone TEXT,
    email TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    color TEXT,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS feature_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL CHECK (kind IN ('text', 'numeric', 'boolean')),
    unit TEXT,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

-- Canonical listings, written only by the reconciler (flags excepted)
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ref INTEGER NOT NULL UNIQUE,
    sync_code TEXT,
    title TEXT,
    description TEXT,
    short_description TEXT,
    city_id INTEGER REFERENCES cities(id),
    city_name TEXT,
    neighborhood_id INTEGER REFERENCES neighborhoods(id),
    neighborhood_name TEXT,
    property_type_id INTEGER REFERENCES property_types(id),
    property_type_name TEXT,
    usage_type_id INTEGER REFERENCES usage_types(id),
    usage_type_name TEXT,
    status_id INTEGER REFERENCES listing_statuses(id),
    status_name TEXT,
    consignment_type_id INTEGER REFERENCES consignment_types(id),
    consignment_type_name TEXT,
    advisor_id INTEGER REFERENCES advisors(id),
    advisor_name TEXT,
    built_area TEXT,
    private_area TEXT,
    land_area TEXT,
    area TEXT,
    rooms INTEGER,
    bathrooms INTEGER,
    garages INTEGER,
    stratum INTEGER,
    sale_price TEXT,
    rent_price TEXT,
    admin_fee TEXT,
    total_price TEXT,
    address TEXT,
    latitude TEXT,
    longitude TEXT,
    slug TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    featured INTEGER NOT NULL DEFAULT 0,
    hot INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    synced_at TIMESTAMP NOT NULL,
    data_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_listings_sync_code ON listings(sync_code);
CREATE INDEX IF NOT EXISTS idx_listings_city ON listings(city_id);

-- Locally-owned flags, decoupled from the synced payload (no cascade)
CREATE TABLE IF NOT EXISTS listing_states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_ref INTEGER NOT NULL UNIQUE,
    sync_code TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL,
    featured INTEGER NOT NULL,
    hot INTEGER NOT NULL,
    modified_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listing_states_key ON listing_states(listing_ref, sync_code);

-- Flag edits made directly on a listing row are kept as preserved state
CREATE TRIGGER IF NOT EXISTS listings_flags_to_state
AFTER UPDATE OF active, featured, hot ON listings
WHEN NEW.active IS NOT OLD.active OR NEW.featured IS NOT OLD.featured OR NEW.hot IS NOT OLD.hot
BEGIN
    INSERT INTO listing_states (listing_ref, sync_code, active, featured, hot, modified_at, created_at, updated_at)
    VALUES (
        NEW.ref, COALESCE(NEW.sync_code, ''), NEW.active, NEW.featured, NEW.hot,
        strftime('%Y-%m-%d %H:%M:%f+00:00', 'now'),
        strftime('%Y-%m-%d %H:%M:%f+00:00', 'now'),
        strftime('%Y-%m-%d %H:%M:%f+00:00', 'now')
    )
    ON CONFLICT(listing_ref) DO UPDATE SET
        active = excluded.active,
        featured = excluded.featured,
        hot = excluded.hot,
        modified_at = excluded.modified_at,
        updated_at = excluded.updated_at;
END;

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    local_path TEXT,
    display_order INTEGER NOT NULL DEFAULT 0,
    downloaded INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    UNIQUE (listing_id, url)
);

CREATE INDEX IF NOT EXISTS idx_images_order ON images(listing_id, display_order, created_at);
CREATE INDEX IF NOT EXISTS idx_images_pending ON images(downloaded);

CREATE TABLE IF NOT EXISTS listing_features (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
    feature_id INTEGER NOT NULL REFERENCES feature_definitions(id),
    value_text TEXT,
    value_numeric TEXT,
    value_boolean INTEGER,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    UNIQUE (listing_id, feature_id),
    CHECK ((value_text IS NOT NULL) + (value_numeric IS NOT NULL) + (value_boolean IS NOT NULL) <= 1)
);

CREATE TABLE IF NOT EXISTS listing_tags (
    listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    created_at TIMESTAMP NOT NULL,
    PRIMARY KEY (listing_id, tag_id)
);
"#;
