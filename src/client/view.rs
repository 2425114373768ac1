//! Derives the rendered task list from the raw list and the current
//! filter/search/sort inputs. Pure: the source slice is never reordered.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::tasks::repo_types::{matches_search, StatusFilter, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    DateDesc,
    DateAsc,
    PriorityDesc,
    PriorityAsc,
    /// Anything else keeps input order.
    Unsorted,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DateDesc => "date-desc",
            Self::DateAsc => "date-asc",
            Self::PriorityDesc => "priority-desc",
            Self::PriorityAsc => "priority-asc",
            Self::Unsorted => "none",
        }
    }

    fn compare(&self, a: &Task, b: &Task) -> Ordering {
        match self {
            Self::DateDesc => b.created_at.cmp(&a.created_at),
            Self::DateAsc => a.created_at.cmp(&b.created_at),
            Self::PriorityDesc => b.priority.rank().cmp(&a.priority.rank()),
            Self::PriorityAsc => a.priority.rank().cmp(&b.priority.rank()),
            Self::Unsorted => Ordering::Equal,
        }
    }
}

impl FromStr for SortKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "date-desc" => Self::DateDesc,
            "date-asc" => Self::DateAsc,
            "priority-desc" => Self::PriorityDesc,
            "priority-asc" => Self::PriorityAsc,
            _ => Self::Unsorted,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub status: StatusFilter,
    pub search: String,
    pub sort: SortKey,
}

/// filter → search → sort. Sorting is stable, so ties keep input order.
pub fn derive_view(tasks: &[Task], query: &ViewQuery) -> Vec<Task> {
    let mut view: Vec<Task> = tasks
        .iter()
        .filter(|t| query.status.matches(t.status))
        .filter(|t| matches_search(t, &query.search))
        .cloned()
        .collect();
    if query.sort != SortKey::Unsorted {
        view.sort_by(|a, b| query.sort.compare(a, b));
    }
    view
}
