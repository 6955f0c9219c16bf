//! Known activity categories and the summary columns that count them.
//!
//! Column identifiers are compile-time constants and are the only part of any
//! summary statement assembled with `format!`. Labels are always bound as
//! statement parameters.

/// A tracked activity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// Label as shown in the activity feed. Matched by substring.
    pub label: &'static str,
    /// Integer column in `date_wise_summary` and `team_wise_summary`.
    pub column: &'static str,
}

pub const CATEGORIES: &[Category] = &[
    Category { label: "Ticket Received", column: "ticket_received" },
    Category { label: "Forwarded ticket", column: "forwarded_ticket" },
    Category { label: "Created Ticket", column: "created_ticket" },
    Category { label: "Viewed ticket", column: "viewed_ticket" },
    Category { label: "Assigned to", column: "assigned_to" },
    Category { label: "Changed status", column: "changed_status" },
    Category { label: "Added a note", column: "added_a_note" },
    Category { label: "Added a tag", column: "added_a_tag" },
    Category { label: "Followed ticket", column: "followed_ticket" },
    Category { label: "Moved from", column: "moved_from" },
    Category { label: "Wrote a reply", column: "wrote_a_reply" },
    Category { label: "Merged to", column: "merged_to" },
    Category { label: "Unassigned ticket", column: "unassigned_ticket" },
    Category { label: "Customer", column: "customer" },
    Category { label: "Unfollowed ticket", column: "unfollowed_ticket" },
    Category { label: "Deleted message", column: "deleted_message" },
    Category { label: "Edited a note", column: "edited_a_note" },
    Category { label: "Changed priority", column: "changed_priority" },
];

/// Column holding the sum of every category column.
pub const TOTAL_COLUMN: &str = "total_count";

/// Index of a label in [`CATEGORIES`].
pub fn position(label: &str) -> Option<usize> {
    CATEGORIES.iter().position(|c| c.label == label)
}

/// Whether an activity type is counted under `label`.
///
/// Mirrors the SQL `LIKE '%label%'` used by the aggregator: ASCII
/// case-insensitive containment, so "Unfollowed ticket" also counts as
/// "Followed ticket".
pub fn matches(activity_type: &str, label: &str) -> bool {
    activity_type
        .to_ascii_lowercase()
        .contains(&label.to_ascii_lowercase())
}

/// Comma-separated category columns in declaration order.
pub fn column_list() -> String {
    CATEGORIES
        .iter()
        .map(|c| c.column)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summary granularity keyed by a column of `extracted_activities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// `date_wise_summary`, keyed by `date`.
    Date,
    /// `team_wise_summary`, keyed by `name`.
    Team,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Team, Granularity::Date];

    pub fn table(self) -> &'static str {
        match self {
            Granularity::Date => "date_wise_summary",
            Granularity::Team => "team_wise_summary",
        }
    }

    /// Key column, shared by the summary table and `extracted_activities`.
    pub fn key_column(self) -> &'static str {
        match self {
            Granularity::Date => "date",
            Granularity::Team => "name",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Granularity::Date => "date-wise",
            Granularity::Team => "team-wise",
        }
    }
}
