use sqlx::{Pool, Postgres};

const SCHEMA_SQL: &str = r#"
    CREATE TYPE lab_status AS ENUM ('created', 'deploying', 'active', 'deployfailed');
    CREATE TYPE slice_status AS ENUM ('deploying', 'active');
    CREATE TYPE node_status AS ENUM ('deploying', 'active');
    CREATE TABLE IF NOT EXISTS scenarios (
        id UUID PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        topo JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ DEFAULT NOW()
    );
    CREATE TABLE IF NOT EXISTS cloud_configs (
        id UUID PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        detail JSONB NOT NULL,
        created_at TIMESTAMPTZ DEFAULT NOW()
    );
    CREATE TABLE IF NOT EXISTS labs (
        id UUID PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        scenario_id UUID NOT NULL REFERENCES scenarios(id),
        status lab_status NOT NULL DEFAULT 'created',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ
    );
    CREATE TABLE IF NOT EXISTS slices (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        lab_id UUID NOT NULL REFERENCES labs(id),
        user_id UUID NOT NULL,
        name VARCHAR(255) NOT NULL,
        status slice_status NOT NULL DEFAULT 'deploying',
        cloud_attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE TABLE IF NOT EXISTS network_nodes (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        slice_id UUID NOT NULL REFERENCES slices(id),
        gid VARCHAR(255) NOT NULL,
        name VARCHAR(255) NOT NULL,
        cidr VARCHAR(64) NOT NULL,
        x DOUBLE PRECISION NOT NULL DEFAULT 0,
        y DOUBLE PRECISION NOT NULL DEFAULT 0,
        status node_status NOT NULL DEFAULT 'deploying',
        cloud_attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
        UNIQUE(slice_id, gid)
    );
    CREATE TABLE IF NOT EXISTS instances (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        slice_id UUID NOT NULL REFERENCES slices(id),
        gid VARCHAR(255) NOT NULL,
        name VARCHAR(255) NOT NULL,
        x DOUBLE PRECISION NOT NULL DEFAULT 0,
        y DOUBLE PRECISION NOT NULL DEFAULT 0,
        image VARCHAR(255) NOT NULL,
        flavor VARCHAR(255) NOT NULL,
        links JSONB NOT NULL DEFAULT '[]'::jsonb,
        configurations JSONB NOT NULL DEFAULT '[]'::jsonb,
        password VARCHAR(64),
        public_ip VARCHAR(64),
        status node_status NOT NULL DEFAULT 'deploying',
        cloud_attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
        UNIQUE(slice_id, gid)
    );
    CREATE TABLE IF NOT EXISTS routers (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        slice_id UUID NOT NULL REFERENCES slices(id),
        gid VARCHAR(255) NOT NULL,
        name VARCHAR(255) NOT NULL,
        x DOUBLE PRECISION NOT NULL DEFAULT 0,
        y DOUBLE PRECISION NOT NULL DEFAULT 0,
        flavor VARCHAR(255) NOT NULL,
        links JSONB NOT NULL DEFAULT '[]'::jsonb,
        configurations JSONB NOT NULL DEFAULT '[]'::jsonb,
        password VARCHAR(64),
        public_ip VARCHAR(64),
        status node_status NOT NULL DEFAULT 'deploying',
        cloud_attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
        UNIQUE(slice_id, gid)
    );
    CREATE TABLE IF NOT EXISTS action_logs (
        id UUID PRIMARY KEY,
        action_type VARCHAR(64) NOT NULL,
        component VARCHAR(64) NOT NULL,
        status VARCHAR(32) NOT NULL,
        error_message TEXT,
        lab_id UUID,
        metadata JSONB,
        duration_ms INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ
    );
    CREATE TABLE IF NOT EXISTS state_transitions (
        id BIGSERIAL PRIMARY KEY,
        entity VARCHAR(32) NOT NULL,
        entity_id UUID NOT NULL,
        from_status VARCHAR(32) NOT NULL,
        to_status VARCHAR(32) NOT NULL,
        reason TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE INDEX IF NOT EXISTS idx_slices_lab ON slices(lab_id);
    CREATE INDEX IF NOT EXISTS idx_action_logs_lab ON action_logs(lab_id)
"#;

/// Statements of the inline schema, in execution order.
pub fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Apply the inline schema. Every statement is idempotent or fails harmlessly on rerun
/// (`CREATE TYPE` has no IF NOT EXISTS), so failures are logged and skipped.
pub async fn run_inline_migrations(pool: &Pool<Postgres>) {
    tracing::info!("📦 [migrations] Running migrations (inline schema)...");

    for stmt in schema_statements() {
        if let Err(e) = sqlx::query(stmt).execute(pool).await {
            if !e.to_string().contains("already exists") {
                tracing::warn!("⚠️ [migrations] statement failed: {} ({})", e, first_line(stmt));
            }
        }
    }

    tracing::info!("✅ [migrations] Inline schema applied");
}

fn first_line(stmt: &str) -> &str {
    stmt.lines().next().unwrap_or(stmt)
}
