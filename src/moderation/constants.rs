//! Shared constants for moderation input validation and limits.

// =============================================================================
// Content Size Limits
// =============================================================================

/// Maximum post or reply body size (100KB).
pub const MAX_BODY_SIZE: usize = 100 * 1024;

/// Maximum audit justification / deletion reason size (2KB).
pub const MAX_JUSTIFICATION_SIZE: usize = 2 * 1024;

/// Maximum free-text details attached to a report (4KB).
pub const MAX_REPORT_DETAILS_SIZE: usize = 4 * 1024;

/// Maximum moderator notes on a report, after merging (16KB).
pub const MAX_MODERATOR_NOTES_SIZE: usize = 16 * 1024;

// =============================================================================
// Ledger Paging
// =============================================================================

/// Default number of audit entries per page.
pub const DEFAULT_AUDIT_PAGE_SIZE: usize = 50;

/// Largest page a single audit query may request.
pub const MAX_AUDIT_PAGE_SIZE: usize = 500;

// =============================================================================
// Concurrency
// =============================================================================

/// How many times a transition is re-run after losing a commit race.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 1;

/// Separator placed between merged moderator notes.
pub const NOTES_SEPARATOR: &str = "\n---\n";
