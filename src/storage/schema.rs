//! Database schema constants.
//!
//! This module contains all SQL schema definitions for the PostgreSQL
//! storage backend. The UNIQUE(request_id, version) constraints on the two
//! version tables are what turn concurrent version allocation into a
//! detectable conflict instead of a silent overwrite.

/// SQL schema for creating the design_requests table.
pub const CREATE_DESIGN_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS design_requests (
    id UUID PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    input_kind VARCHAR(20) NOT NULL,
    prompt_text TEXT,
    repo_url VARCHAR(1024),
    scale_profile VARCHAR(20) NOT NULL,
    detail_level VARCHAR(20) NOT NULL,
    constraints JSONB NOT NULL DEFAULT '{}'::jsonb,
    project_id UUID NOT NULL,
    user_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL schema for creating the jobs table.
pub const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id UUID PRIMARY KEY,
    kind VARCHAR(30) NOT NULL,
    status VARCHAR(20) NOT NULL,
    progress SMALLINT NOT NULL DEFAULT 0,
    request_id UUID NOT NULL REFERENCES design_requests(id) ON DELETE CASCADE,
    metadata JSONB NOT NULL,
    error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
)
"#;

/// SQL schema for creating the design_versions table.
pub const CREATE_DESIGN_VERSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS design_versions (
    id UUID PRIMARY KEY,
    request_id UUID NOT NULL REFERENCES design_requests(id) ON DELETE CASCADE,
    version INTEGER NOT NULL CHECK (version > 0),
    design JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(request_id, version)
)
"#;

/// SQL schema for creating the diagram_versions table.
pub const CREATE_DIAGRAM_VERSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS diagram_versions (
    id UUID PRIMARY KEY,
    request_id UUID NOT NULL REFERENCES design_requests(id) ON DELETE CASCADE,
    design_version_id UUID REFERENCES design_versions(id) ON DELETE SET NULL,
    version INTEGER NOT NULL CHECK (version > 0),
    source TEXT NOT NULL,
    artifact TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(request_id, version)
)
"#;

/// SQL for creating all required indexes.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_request_id ON jobs(request_id);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_design_versions_request_id ON design_versions(request_id);
CREATE INDEX IF NOT EXISTS idx_diagram_versions_request_id ON diagram_versions(request_id);
CREATE INDEX IF NOT EXISTS idx_diagram_versions_design_version_id ON diagram_versions(design_version_id)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_DESIGN_REQUESTS_TABLE,
        CREATE_JOBS_TABLE,
        CREATE_DESIGN_VERSIONS_TABLE,
        CREATE_DIAGRAM_VERSIONS_TABLE,
        CREATE_INDEXES,
    ]
}

/// Table names in the schema.
pub mod tables {
    /// Design requests table name.
    pub const DESIGN_REQUESTS: &str = "design_requests";
    /// Jobs table name.
    pub const JOBS: &str = "jobs";
    /// Design versions table name.
    pub const DESIGN_VERSIONS: &str = "design_versions";
    /// Diagram versions table name.
    pub const DIAGRAM_VERSIONS: &str = "diagram_versions";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), 5);
        // Requests must come first (other tables reference it)
        assert!(statements[0].contains("design_requests"));
        // Indexes should be last
        assert!(statements[4].contains("CREATE INDEX"));
    }

    #[test]
    fn test_version_tables_enforce_uniqueness() {
        assert!(CREATE_DESIGN_VERSIONS_TABLE.contains("UNIQUE(request_id, version)"));
        assert!(CREATE_DIAGRAM_VERSIONS_TABLE.contains("UNIQUE(request_id, version)"));
    }

    #[test]
    fn test_diagram_link_nulls_on_design_delete() {
        assert!(CREATE_DIAGRAM_VERSIONS_TABLE.contains("ON DELETE SET NULL"));
    }

    #[test]
    fn test_table_constants() {
        assert_eq!(tables::DESIGN_REQUESTS, "design_requests");
        assert_eq!(tables::JOBS, "jobs");
        assert_eq!(tables::DESIGN_VERSIONS, "design_versions");
        assert_eq!(tables::DIAGRAM_VERSIONS, "diagram_versions");
    }
}
