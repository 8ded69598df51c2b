//! Bubbling: rescoring entries in place.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use feedindex_core::timestamp::{encode, now_score};
use feedindex_core::{BubblingController, EngineConfig, MemoryStore, PageQuery, TimeInput};

fn setup() -> BubblingController {
    BubblingController::new(Arc::new(MemoryStore::new()), EngineConfig::default())
}

fn published() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

async fn seed(ctl: &BubblingController) {
    let t = published();
    for i in 0..5 {
        ctl.engine()
            .add("u1", "home", &format!("a{i}"), t + Duration::seconds(i))
            .await
            .unwrap();
    }
}

async fn newest_first(ctl: &BubblingController) -> Vec<String> {
    let marker = published() + Duration::hours(1);
    ctl.engine()
        .get("u1", "home", PageQuery::before(marker).limit(3))
        .await
        .unwrap()
        .into_one()
        .unwrap()
        .into_members()
}

#[tokio::test]
async fn bubbling_moves_entry_without_changing_membership() {
    let ctl = setup();
    seed(&ctl).await;
    assert_eq!(newest_first(&ctl).await, vec!["a4", "a3", "a2"]);
    let union_before = ctl.engine().get_union("u1", "home").await.unwrap();

    let later = published() + Duration::seconds(30);
    ctl.bubble_values("u1", "home", [("a0", TimeInput::from(later))])
        .await
        .unwrap();

    assert_eq!(newest_first(&ctl).await, vec!["a0", "a4", "a3"]);
    assert_eq!(ctl.engine().get_union("u1", "home").await.unwrap(), union_before);
    assert_eq!(ctl.engine().cardinality("u1", "home").await.unwrap(), 5);
}

#[tokio::test]
async fn bubbling_accepts_scores_strings_and_now() {
    let ctl = setup();
    seed(&ctl).await;
    let before = now_score();

    ctl.bubble_values(
        "u1",
        "home",
        vec![
            ("a0", TimeInput::Score(7)),
            ("a1", TimeInput::from("12345")),
            ("a2", TimeInput::from("2024-03-01T10:00:00")),
            ("a3", TimeInput::Now),
        ],
    )
    .await
    .unwrap();

    let engine = ctl.engine();
    assert_eq!(engine.score("u1", "home", "a0").await.unwrap(), Some(7));
    assert_eq!(engine.score("u1", "home", "a1").await.unwrap(), Some(12345));
    assert_eq!(
        engine.score("u1", "home", "a2").await.unwrap(),
        Some(encode(&Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()))
    );
    assert!(engine.score("u1", "home", "a3").await.unwrap().unwrap() >= before);
    // Ascending: a0(7) < a1(12345) < a4 < a2(10:00) < a3(now)
    assert_eq!(engine.rank("u1", "home", "a0").await.unwrap(), Some(0));
    assert_eq!(engine.rank("u1", "home", "a3").await.unwrap(), Some(4));
}

#[tokio::test]
async fn bubbling_demotes_too() {
    let ctl = setup();
    seed(&ctl).await;
    let earlier = published() - Duration::days(1);
    ctl.bubble_values("u1", "home", [("a4", TimeInput::from(earlier))])
        .await
        .unwrap();

    assert_eq!(newest_first(&ctl).await, vec!["a3", "a2", "a1"]);
    assert_eq!(ctl.engine().rank("u1", "home", "a4").await.unwrap(), Some(0));
}

#[tokio::test]
async fn bubbling_an_absent_member_registers_the_index() {
    let ctl = setup();
    ctl.bubble_values("u9", "fresh", [("x", TimeInput::Score(1))])
        .await
        .unwrap();
    assert_eq!(ctl.engine().indexes("u9").await.unwrap(), vec!["fresh"]);

    ctl.bubble_values("u9", "fresh", Vec::<(String, TimeInput)>::new())
        .await
        .unwrap();
    assert_eq!(ctl.engine().cardinality("u9", "fresh").await.unwrap(), 1);
}

#[tokio::test]
async fn controller_engine_carries_markers() {
    let ctl = setup();
    seed(&ctl).await;
    ctl.engine()
        .get("u1", "home", PageQuery::after(published()).limit(2))
        .await
        .unwrap();
    assert_eq!(
        ctl.markers().get_default_marker("u1", "home").await.unwrap(),
        Some(encode(&(published() + Duration::seconds(1))))
    );

    ctl.engine().delete_index("u1", "home").await.unwrap();
    assert_eq!(ctl.markers().get_default_marker("u1", "home").await.unwrap(), None);
}

#[tokio::test]
async fn bubbling_uses_decimal_values_as_scores() {
    let ctl = setup();
    seed(&ctl).await;

    ctl.bubble_values(
        "u1",
        "home",
        vec![
            ("a0", TimeInput::from("1234.5")),
            ("a1", TimeInput::from(" -7.9 ")),
            ("a2", TimeInput::from(5e3)),
        ],
    )
    .await
    .unwrap();

    let engine = ctl.engine();
    assert_eq!(engine.score("u1", "home", "a0").await.unwrap(), Some(1234));
    assert_eq!(engine.score("u1", "home", "a1").await.unwrap(), Some(-7));
    assert_eq!(engine.score("u1", "home", "a2").await.unwrap(), Some(5000));
    assert_eq!(engine.rank("u1", "home", "a1").await.unwrap(), Some(0));
}

#[tokio::test]
async fn bubbling_parses_common_date_layouts() {
    let ctl = setup();
    seed(&ctl).await;
    let march_first = encode(&Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

    ctl.bubble_values(
        "u1",
        "home",
        vec![
            ("a0", TimeInput::from("2024/03/01")),
            ("a1", TimeInput::from("March 1, 2024")),
            ("a2", TimeInput::from("2024-03-01T00:00:00.5+0000")),
        ],
    )
    .await
    .unwrap();

    let engine = ctl.engine();
    assert_eq!(engine.score("u1", "home", "a0").await.unwrap(), Some(march_first));
    assert_eq!(engine.score("u1", "home", "a1").await.unwrap(), Some(march_first));
    assert_eq!(engine.score("u1", "home", "a2").await.unwrap(), Some(march_first + 500));
}
