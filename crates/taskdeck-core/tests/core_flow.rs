use chrono::{Duration, Utc};
use taskdeck_core::datastore::DataStore;
use taskdeck_core::task::{Priority, Status, Task, ViewStatus};
use taskdeck_core::view::{self, FilterState, StatusFilter, TimeFilter};
use tempfile::tempdir;

#[test]
fn snapshot_roundtrip_and_view_build() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let now = Utc::now();

    let mut pay_rent = Task::new("a1", "Pay rent", Status::Active);
    pay_rent.priority = Some(Priority::High);
    pay_rent.deadline = Some(now - Duration::hours(2));
    pay_rent.owner_id = Some("user-1".to_string());

    let mut groceries = Task::new("a2", "Buy groceries", Status::Doing);
    groceries.priority = Some(Priority::Low);
    groceries.owner_id = Some("user-1".to_string());

    let mut shipped = Task::new("a3", "Ship release", Status::Completed);
    shipped.owner_id = Some("user-1".to_string());

    let mut foreign = Task::new("b1", "Someone else's task", Status::Active);
    foreign.owner_id = Some("user-2".to_string());

    let tasks = vec![pay_rent, groceries, shipped, foreign];
    store.save_snapshot(&tasks).expect("save snapshot");

    let cached = store
        .load_snapshot()
        .expect("load snapshot")
        .expect("snapshot present");
    assert_eq!(cached.len(), 4);

    // Overdue view for user-1: only the unfinished task with a past deadline.
    let state = FilterState::default().with_time(TimeFilter::Overdue);
    let view = view::build_view(cached.clone(), Some("user-1"), &state, now);
    assert_eq!(view.overview.total, 3);
    assert_eq!(view.overview.done, 1);
    assert_eq!(view.tasks.len(), 1);
    assert_eq!(view.tasks[0].title, "Pay rent");

    // Done view pairs with the COMPLETED wire status.
    let state = FilterState::default().with_status(StatusFilter::Only(ViewStatus::Done));
    let view = view::build_view(cached, Some("user-1"), &state, now);
    assert_eq!(view.total, 1);
    assert_eq!(view.tasks[0].id, "a3");
}

#[test]
fn session_persists_until_logout() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    store.save_token("header.payload.sig").expect("save token");
    store
        .save_user(&serde_json::json!({"email": "a@b.co"}))
        .expect("save user");

    assert_eq!(
        store.load_token().expect("load token").as_deref(),
        Some("header.payload.sig")
    );
    assert!(store.load_user().expect("load user").is_some());

    store.clear_session().expect("clear session");
    assert!(store.load_token().expect("token gone").is_none());
    assert!(store.load_user().expect("user gone").is_none());
}
