use std::sync::Arc;
use std::time::Duration;

use canvass::access::{AccessGate, AllowList, AllowListCache, GateState, StaticSource};
use chrono::Utc;

const SHEET: &str = "\
email
a@x.com
 B@X.com
";

#[tokio::test]
async fn sheet_members_are_admitted() {
    let list = AllowList::from_csv(SHEET, true, Utc::now()).unwrap();
    assert_eq!(list.len(), 2);

    let mut gate = AccessGate::new();
    assert_eq!(gate.submit("a@x.com".to_string(), &list), GateState::Admitted);

    let mut gate = AccessGate::new();
    assert_eq!(gate.submit("b@x.com".to_string(), &list), GateState::Admitted);

    let mut gate = AccessGate::new();
    assert_eq!(gate.submit("c@x.com".to_string(), &list), GateState::Denied);
    assert_eq!(gate.submit("a@x.com".to_string(), &list), GateState::Admitted);
}

#[tokio::test]
async fn gate_resolves_against_cached_snapshot() {
    let cache = AllowListCache::new(
        Arc::new(StaticSource::new(vec!["a@x.com".into(), "b@x.com".into()])),
        Duration::from_secs(600),
    );

    let mut gate = AccessGate::new();
    assert_eq!(gate.begin(), GateState::Pending);
    let snapshot = cache.snapshot().await.unwrap();
    assert_eq!(gate.resolve("a@x.com".to_string(), &snapshot), GateState::Admitted);
    assert!(gate.is_admitted());

    let again = cache.snapshot().await.unwrap();
    assert!(Arc::ptr_eq(&snapshot, &again));
}

#[test]
fn header_row_is_skipped_only_when_declared() {
    let without = AllowList::from_csv(SHEET, false, Utc::now()).unwrap();
    assert!(without.contains("email"));

    let with = AllowList::from_csv(SHEET, true, Utc::now()).unwrap();
    assert!(!with.contains("email"));
}
