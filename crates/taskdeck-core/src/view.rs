//! The task view model: pure functions from (task records, filter state)
//! to the exact page of tasks to render plus summary statistics.
//!
//! Nothing in this module performs I/O; callers fetch (or load cached)
//! records and hand them in together with an explicit [`FilterState`].

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::datetime::start_of_day;
use crate::task::{Category, Task, ViewStatus, priority_rank};

pub const DEFAULT_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(ViewStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Only(Category),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    All,
    Overdue,
    Today,
    Next7Days,
    Next30Days,
    NoDeadline,
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        ViewStatus::parse(trimmed).map(Self::Only)
    }
}

impl CategoryFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        Category::parse(trimmed).map(Self::Only)
    }
}

impl TimeFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "overdue" => Some(Self::Overdue),
            "today" => Some(Self::Today),
            "next7d" => Some(Self::Next7Days),
            "next30d" => Some(Self::Next30Days),
            "nodeadline" => Some(Self::NoDeadline),
            _ => None,
        }
    }
}

/// The full set of active filter dimensions plus pagination.
///
/// Immutable value type: every `with_*` setter returns a new state, and
/// changing any filter dimension resets `page` to 1 so a narrower result
/// set never silently shows an out-of-range page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub status: StatusFilter,
    pub category: CategoryFilter,
    pub time: TimeFilter,
    pub search: String,
    pub page: usize,
    pub page_size: usize,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            status: StatusFilter::All,
            category: CategoryFilter::All,
            time: TimeFilter::All,
            search: String::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FilterState {
    pub fn with_status(self, status: StatusFilter) -> Self {
        Self { status, page: 1, ..self }
    }

    pub fn with_category(self, category: CategoryFilter) -> Self {
        Self { category, page: 1, ..self }
    }

    pub fn with_time(self, time: TimeFilter) -> Self {
        Self { time, page: 1, ..self }
    }

    pub fn with_search(self, search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            page: 1,
            ..self
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page: 1,
            ..self
        }
    }

    /// The only setter that leaves the other dimensions untouched.
    pub fn with_page(self, page: usize) -> Self {
        Self {
            page: page.max(1),
            ..self
        }
    }
}

/// Summary statistics over the scoped, unfiltered task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overview {
    pub total: usize,
    pub active: usize,
    pub done: usize,
    pub percent_done: u8,
}

/// What the rendering layer needs for one screen: the ordered page of
/// tasks, pagination metadata, and the overview statistics.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub tasks: Vec<Task>,
    /// Matching count after filtering, before pagination.
    pub total: usize,
    pub page: usize,
    pub page_count: usize,
    pub overview: Overview,
}

/// Restricts to records owned by `user_id`. Fail-open: an unresolved
/// identity (`None`) disables scoping rather than hiding data.
pub fn scope_to_user(tasks: Vec<Task>, user_id: Option<&str>) -> Vec<Task> {
    let Some(uid) = user_id else {
        return tasks;
    };
    tasks
        .into_iter()
        .filter(|task| task.owner_id.as_deref() == Some(uid))
        .collect()
}

pub fn apply_status_filter(tasks: Vec<Task>, filter: StatusFilter) -> Vec<Task> {
    match filter {
        StatusFilter::All => tasks,
        StatusFilter::Only(wanted) => tasks
            .into_iter()
            .filter(|task| task.status.view() == wanted)
            .collect(),
    }
}

/// A task with no recognized category only matches `All`, never a
/// specific category filter (including `Only(Other)`).
pub fn apply_category_filter(tasks: Vec<Task>, filter: CategoryFilter) -> Vec<Task> {
    match filter {
        CategoryFilter::All => tasks,
        CategoryFilter::Only(wanted) => tasks
            .into_iter()
            .filter(|task| task.category == Some(wanted))
            .collect(),
    }
}

/// Partitions strictly on deadline presence and value relative to `now`.
/// Unparseable deadlines were already normalized to `None` by the model,
/// so they match only `NoDeadline`.
pub fn apply_time_filter(tasks: Vec<Task>, filter: TimeFilter, now: DateTime<Utc>) -> Vec<Task> {
    let today_start = start_of_day(now);
    let today_end = today_start + Duration::days(1);
    let next_7 = now + Duration::days(7);
    let next_30 = now + Duration::days(30);

    tasks
        .into_iter()
        .filter(|task| match filter {
            TimeFilter::All => true,
            TimeFilter::Overdue => task.is_overdue(now),
            TimeFilter::Today => task
                .deadline
                .map(|d| d >= today_start && d < today_end)
                .unwrap_or(false),
            TimeFilter::Next7Days => task
                .deadline
                .map(|d| d >= now && d <= next_7)
                .unwrap_or(false),
            TimeFilter::Next30Days => task
                .deadline
                .map(|d| d >= now && d <= next_30)
                .unwrap_or(false),
            TimeFilter::NoDeadline => task.deadline.is_none(),
        })
        .collect()
}

/// Case-insensitive substring match on the title only.
pub fn apply_search(tasks: Vec<Task>, keyword: &str) -> Vec<Task> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return tasks;
    }
    tasks
        .into_iter()
        .filter(|task| task.title.to_lowercase().contains(&needle))
        .collect()
}

/// Stable sort: high before medium before low, unrecognized last, and
/// equal-rank tasks keep their input order.
pub fn sort_by_priority(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by_key(|task| priority_rank(task.priority));
    tasks
}

/// Slice for 1-based `page`; a page beyond the end yields an empty slice
/// rather than an error.
pub fn paginate(tasks: &[Task], page: usize, page_size: usize) -> Vec<Task> {
    let page = page.max(1);
    let start = (page - 1).saturating_mul(page_size);
    if start >= tasks.len() {
        return Vec::new();
    }
    let end = start.saturating_add(page_size).min(tasks.len());
    tasks[start..end].to_vec()
}

/// Statistics over the full per-user set, independent of any filter.
pub fn compute_overview(tasks: &[Task]) -> Overview {
    let total = tasks.len();
    let done = tasks
        .iter()
        .filter(|task| task.status.view() == ViewStatus::Done)
        .count();
    let active = total - done;
    let percent_done = if total == 0 {
        0
    } else {
        ((done as f64 / total as f64) * 100.0).round() as u8
    };

    Overview {
        total,
        active,
        done,
        percent_done,
    }
}

/// Runs the whole pipeline in its fixed order: scope by user, status,
/// category, time, search, priority sort, total count, paginate. The
/// overview is computed over the scoped set before any display filter.
pub fn build_view(
    tasks: Vec<Task>,
    user_id: Option<&str>,
    state: &FilterState,
    now: DateTime<Utc>,
) -> TaskView {
    let scoped = scope_to_user(tasks, user_id);
    let overview = compute_overview(&scoped);

    let filtered = apply_status_filter(scoped, state.status);
    let filtered = apply_category_filter(filtered, state.category);
    let filtered = apply_time_filter(filtered, state.time, now);
    let filtered = apply_search(filtered, &state.search);
    let sorted = sort_by_priority(filtered);

    let total = sorted.len();
    let page_count = total.div_ceil(state.page_size);
    let page = state.page.clamp(1, page_count.max(1));
    let page_tasks = paginate(&sorted, page, state.page_size);

    debug!(
        scoped = overview.total,
        matching = total,
        page,
        page_count,
        "built task view"
    );

    TaskView {
        tasks: page_tasks,
        total,
        page,
        page_count,
        overview,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        CategoryFilter, FilterState, StatusFilter, TimeFilter, apply_category_filter,
        apply_search, apply_status_filter, apply_time_filter, build_view, compute_overview,
        paginate, scope_to_user, sort_by_priority,
    };
    use crate::datetime::start_of_day;
    use crate::task::{Category, Priority, Status, Task, ViewStatus};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("valid now")
    }

    fn task(id: &str, title: &str, status: Status) -> Task {
        Task::new(id, title, status)
    }

    #[test]
    fn scoping_is_fail_open_without_identity() {
        let mut mine = task("1", "mine", Status::Active);
        mine.owner_id = Some("u1".to_string());
        let mut theirs = task("2", "theirs", Status::Active);
        theirs.owner_id = Some("u2".to_string());
        let unowned = task("3", "unowned", Status::Active);

        let all = vec![mine.clone(), theirs.clone(), unowned.clone()];
        let scoped = scope_to_user(all.clone(), Some("u1"));
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "1");

        let unscoped = scope_to_user(all, None);
        assert_eq!(unscoped.len(), 3);

        assert!(scope_to_user(vec![theirs], Some("nobody")).is_empty());
    }

    #[test]
    fn status_filter_uses_presentation_vocabulary() {
        let tasks = vec![
            task("1", "a", Status::Active),
            task("2", "b", Status::Doing),
            task("3", "c", Status::Completed),
        ];

        let all = apply_status_filter(tasks.clone(), StatusFilter::All);
        assert_eq!(all.len(), 3);

        let doing = apply_status_filter(tasks.clone(), StatusFilter::Only(ViewStatus::Doing));
        assert_eq!(doing.len(), 1);
        assert_eq!(doing[0].id, "2");

        let done = apply_status_filter(tasks, StatusFilter::Only(ViewStatus::Done));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "3");
    }

    #[test]
    fn missing_category_only_matches_all() {
        let mut categorized = task("1", "a", Status::Active);
        categorized.category = Some(Category::Other);
        let uncategorized = task("2", "b", Status::Active);

        let tasks = vec![categorized, uncategorized];
        let all = apply_category_filter(tasks.clone(), CategoryFilter::All);
        assert_eq!(all.len(), 2);

        let other = apply_category_filter(tasks, CategoryFilter::Only(Category::Other));
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].id, "1");
    }

    #[test]
    fn overdue_excludes_done_tasks() {
        let now = now();
        let mut late = task("1", "late", Status::Active);
        late.deadline = Some(now - Duration::hours(3));
        let mut late_done = task("2", "late but done", Status::Completed);
        late_done.deadline = Some(now - Duration::hours(3));

        let overdue = apply_time_filter(vec![late, late_done], TimeFilter::Overdue, now);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, "1");
    }

    #[test]
    fn today_window_is_half_open() {
        let now = now();
        let day_start = start_of_day(now);

        let mut at_start = task("1", "start", Status::Active);
        at_start.deadline = Some(day_start);
        let mut before_start = task("2", "yesterday", Status::Active);
        before_start.deadline = Some(day_start - Duration::seconds(1));
        let mut at_end = task("3", "tomorrow", Status::Active);
        at_end.deadline = Some(day_start + Duration::days(1));

        let today =
            apply_time_filter(vec![at_start, before_start, at_end], TimeFilter::Today, now);
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].id, "1");
    }

    #[test]
    fn next_windows_are_inclusive() {
        let now = now();
        let mut at_bound = task("1", "exactly 7d", Status::Active);
        at_bound.deadline = Some(now + Duration::days(7));
        let mut past_bound = task("2", "past 7d", Status::Active);
        past_bound.deadline = Some(now + Duration::days(7) + Duration::seconds(1));
        let mut already_due = task("3", "yesterday", Status::Active);
        already_due.deadline = Some(now - Duration::days(1));

        let soon = apply_time_filter(
            vec![at_bound.clone(), past_bound.clone(), already_due],
            TimeFilter::Next7Days,
            now,
        );
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].id, "1");

        let month = apply_time_filter(vec![at_bound, past_bound], TimeFilter::Next30Days, now);
        assert_eq!(month.len(), 2);
    }

    #[test]
    fn no_deadline_matches_absent_only() {
        let now = now();
        let undated = task("1", "free", Status::Active);
        let mut dated = task("2", "due", Status::Active);
        dated.deadline = Some(now + Duration::days(1));

        let hits = apply_time_filter(vec![undated, dated], TimeFilter::NoDeadline, now);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[test]
    fn search_matches_title_not_description() {
        let mut titled = task("1", "Pay rent", Status::Active);
        titled.description = Some("milk".to_string());
        let mut described = task("2", "Buy milk", Status::Active);
        described.description = Some("pay the store".to_string());

        let hits = apply_search(vec![titled, described], "PAY");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[test]
    fn empty_keyword_is_identity() {
        let tasks = vec![task("1", "a", Status::Active), task("2", "b", Status::Doing)];
        assert_eq!(apply_search(tasks.clone(), "").len(), 2);
        assert_eq!(apply_search(tasks, "   ").len(), 2);
    }

    #[test]
    fn priority_sort_is_stable() {
        let mut first_high = task("1", "a", Status::Active);
        first_high.priority = Some(Priority::High);
        let mut second_high = task("2", "b", Status::Active);
        second_high.priority = Some(Priority::High);
        let mut low = task("3", "c", Status::Active);
        low.priority = Some(Priority::Low);
        let unranked = task("4", "d", Status::Active);

        let sorted = sort_by_priority(vec![low, first_high, second_high, unranked]);
        let ids: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn pagination_slices_and_tolerates_overrun() {
        let tasks: Vec<Task> = (0..12)
            .map(|i| task(&i.to_string(), &format!("task {i}"), Status::Active))
            .collect();

        let third = paginate(&tasks, 3, 5);
        assert_eq!(third.len(), 2);
        assert_eq!(third[0].id, "10");
        assert_eq!(third[1].id, "11");

        assert!(paginate(&tasks, 4, 5).is_empty());
        assert!(paginate(&[], 1, 5).is_empty());
    }

    #[test]
    fn overview_counts_and_percent() {
        let empty = compute_overview(&[]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.active, 0);
        assert_eq!(empty.done, 0);
        assert_eq!(empty.percent_done, 0);

        let tasks = vec![
            task("1", "a", Status::Active),
            task("2", "b", Status::Doing),
            task("3", "c", Status::Completed),
        ];
        let overview = compute_overview(&tasks);
        assert_eq!(overview.total, 3);
        assert_eq!(overview.active, 2);
        assert_eq!(overview.done, 1);
        assert_eq!(overview.percent_done, 33);
    }

    #[test]
    fn filter_setters_reset_page() {
        let state = FilterState::default().with_page(4);
        assert_eq!(state.page, 4);

        let state = state.with_category(CategoryFilter::Only(Category::Work));
        assert_eq!(state.page, 1);

        let state = state.with_page(3).with_search("x");
        assert_eq!(state.page, 1);

        let state = state.with_page(2).with_status(StatusFilter::Only(ViewStatus::Done));
        assert_eq!(state.page, 1);

        let state = state.with_page(2).with_time(TimeFilter::Today);
        assert_eq!(state.page, 1);
    }

    #[test]
    fn filters_are_idempotent() {
        let now = now();
        let mut a = task("1", "Pay rent", Status::Active);
        a.category = Some(Category::Personal);
        a.deadline = Some(now + Duration::days(2));
        let mut b = task("2", "Buy milk", Status::Completed);
        b.category = Some(Category::Shopping);

        let once = apply_search(
            apply_time_filter(
                apply_category_filter(
                    apply_status_filter(vec![a, b], StatusFilter::Only(ViewStatus::Todo)),
                    CategoryFilter::Only(Category::Personal),
                ),
                TimeFilter::Next7Days,
                now,
            ),
            "pay",
        );
        let twice = apply_search(
            apply_time_filter(
                apply_category_filter(
                    apply_status_filter(once.clone(), StatusFilter::Only(ViewStatus::Todo)),
                    CategoryFilter::Only(Category::Personal),
                ),
                TimeFilter::Next7Days,
                now,
            ),
            "pay",
        );
        let ids: Vec<&str> = once.iter().map(|t| t.id.as_str()).collect();
        let ids_twice: Vec<&str> = twice.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ids_twice);
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn full_pipeline_scenario() {
        let now = now();
        let mut milk = task("1", "Buy milk", Status::Active);
        milk.priority = Some(Priority::Low);
        let mut rent = task("2", "Pay rent", Status::Active);
        rent.priority = Some(Priority::High);

        let state = FilterState::default().with_search("pay");
        let view = build_view(vec![milk, rent], None, &state, now);

        assert_eq!(view.total, 1);
        assert_eq!(view.tasks.len(), 1);
        assert_eq!(view.tasks[0].title, "Pay rent");
        assert_eq!(view.overview.total, 2);
        assert_eq!(view.overview.done, 0);
    }

    #[test]
    fn empty_result_maps_to_page_one() {
        let now = now();
        let state = FilterState::default().with_page(7);
        let view = build_view(Vec::new(), None, &state, now);
        assert_eq!(view.page, 1);
        assert_eq!(view.page_count, 0);
        assert!(view.tasks.is_empty());
    }

    #[test]
    fn overview_ignores_display_filters() {
        let now = now();
        let tasks = vec![
            task("1", "a", Status::Active),
            task("2", "b", Status::Completed),
            task("3", "c", Status::Completed),
        ];
        let state = FilterState::default().with_status(StatusFilter::Only(ViewStatus::Todo));
        let view = build_view(tasks, None, &state, now);

        assert_eq!(view.total, 1);
        assert_eq!(view.overview.total, 3);
        assert_eq!(view.overview.done, 2);
        assert_eq!(view.overview.percent_done, 67);
    }
}
