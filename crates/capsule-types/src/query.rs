use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusFilter {
    #[default]
    All,
    Locked,
    Unlocked,
}

/// Window on `createdAt`, counted back from now in fixed days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeRange {
    #[default]
    All,
    ThisWeek,
    ThisMonth,
    ThisYear,
}

impl TimeRange {
    /// Width of the window, or `None` for no restriction.
    pub fn window(self) -> Option<TimeDelta> {
        match self {
            Self::All => None,
            Self::ThisWeek => Some(TimeDelta::days(7)),
            Self::ThisMonth => Some(TimeDelta::days(30)),
            Self::ThisYear => Some(TimeDelta::days(365)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    /// `createdAt` descending
    #[default]
    Newest,
    /// `createdAt` ascending
    Oldest,
    /// `unlockDate` ascending
    UnlockDate,
}

/// Dashboard search/filter/sort settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapsuleQuery {
    pub search_term: String,
    pub status: StatusFilter,
    pub time_range: TimeRange,
    pub sort_by: SortBy,
}

impl CapsuleQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search_term: term.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn sorted_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Number of settings that differ from the defaults.
    pub fn active_filter_count(&self) -> usize {
        [
            !self.search_term.is_empty(),
            self.status != StatusFilter::All,
            self.sort_by != SortBy::Newest,
            self.time_range != TimeRange::All,
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
