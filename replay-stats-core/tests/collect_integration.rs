use replay_stats_core::collect::{collect, list_all_replays};
use replay_stats_core::config::{
    CollectConfig, Credentials, FetchFailurePolicy, OutputConfig, RetryPolicy,
};
use replay_stats_core::contract::{GroupInfo, MockReplayApi, ReplayPage, ReplaySummary};
use replay_stats_core::error::{ApiError, CollectError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const PLAYER: &str = "n o a h";
const GROUP: &str = "replay-analysis-j2e0c8rw06";

fn test_config(root: &Path) -> CollectConfig {
    let mut config = CollectConfig::new(Credentials {
        token: "test-token".to_string(),
        group_id: GROUP.to_string(),
        player_name: PLAYER.to_string(),
    });
    config.retry = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };
    config.output = OutputConfig {
        summary_path: root.join("summary.csv"),
        output_dir: root.join("stats"),
    };
    config
}

fn player(name: &str, goals: u32) -> Value {
    json!({
        "name": name,
        "stats": {
            "core": {"shots": goals + 2, "goals": goals, "saves": 1, "assists": 1},
            "boost": {"bpm": 400},
            "movement": {"avg_speed": 1500},
            "demo": {"inflicted": 1}
        }
    })
}

fn replay(id: &str, blue: Vec<Value>, orange: Vec<Value>) -> Value {
    json!({
        "id": id,
        "created": format!("2025-03-01T20:{}:00Z", id.len() + 10),
        "blue": {"players": blue},
        "orange": {"players": orange}
    })
}

/// Three replays; the tracked player is in r1 (win) and r3 (loss), not in r2.
fn three_replays() -> Vec<Value> {
    vec![
        replay("r1", vec![player(PLAYER, 3)], vec![player("opp", 1)]),
        replay("r2", vec![player("someone", 1)], vec![player("else", 0)]),
        replay("r3", vec![player("opp", 2)], vec![player(PLAYER, 0)]),
    ]
}

fn summaries(replays: &[Value]) -> Vec<ReplaySummary> {
    replays
        .iter()
        .map(|r| ReplaySummary {
            id: r["id"].as_str().unwrap().to_string(),
            replay_title: None,
        })
        .collect()
}

/// A mock serving `replays` as a single listing page.
fn mock_group(replays: Vec<Value>) -> MockReplayApi {
    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: "Season 14".to_string(),
        })
    });
    let page = ReplayPage {
        replays: summaries(&replays),
        next: None,
    };
    api.expect_list_replays()
        .times(1)
        .returning(move |_, _| Ok(page.clone()));
    let by_id: HashMap<String, Value> = replays
        .into_iter()
        .map(|r| (r["id"].as_str().unwrap().to_string(), r))
        .collect();
    api.expect_fetch_replay().returning(move |id: &str| {
        by_id
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("replay {id}")))
    });
    api
}

fn summary_ids(config: &CollectConfig) -> Vec<String> {
    let text = fs::read_to_string(&config.output.summary_path).expect("summary exists");
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("id,date,team,outcome"));
    lines
        .map(|l| l.split(',').next().unwrap().to_string())
        .collect()
}

fn document_ids(config: &CollectConfig) -> Vec<String> {
    let mut ids: Vec<String> = fs::read_dir(&config.output.output_dir)
        .expect("output dir exists")
        .map(|e| {
            let name = e.unwrap().file_name().to_string_lossy().into_owned();
            name.strip_suffix(".json")
                .expect("only json documents")
                .to_string()
        })
        .collect();
    ids.sort();
    ids
}

fn assert_rows_match_documents(config: &CollectConfig) {
    let mut rows = summary_ids(config);
    rows.sort();
    assert_eq!(rows, document_ids(config), "table rows and documents differ");
}

#[tokio::test]
async fn test_player_filter_keeps_two_of_three() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    let api = mock_group(three_replays());

    let report = collect(&config, &api).await.expect("collect should succeed");

    assert_eq!(report.group_name, "Season 14");
    assert_eq!(report.listed, 3);
    assert_eq!(report.matched, 2);
    assert!(report.skipped.is_empty());
    assert_eq!(summary_ids(&config), vec!["r1", "r3"]);
    assert_eq!(document_ids(&config), vec!["r1", "r3"]);

    let text = fs::read_to_string(&config.output.summary_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[1].starts_with("r1,2025-03-01T20:12:00Z,blue,win,3,1,"));
    assert!(lines[2].starts_with("r3,2025-03-01T20:12:00Z,orange,loss,0,2,"));

    let doc: Value =
        serde_json::from_str(&fs::read_to_string(config.output.output_dir.join("r1.json")).unwrap())
            .unwrap();
    assert_eq!(doc, three_replays()[0]);
}

#[tokio::test]
async fn test_zero_replays_writes_header_only_and_empty_dir() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    let api = mock_group(vec![]);

    let report = collect(&config, &api).await.expect("empty group is not an error");

    assert_eq!(report.listed, 0);
    assert_eq!(report.matched, 0);
    let text = fs::read_to_string(&config.output.summary_path).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(config.output.output_dir.is_dir());
    assert!(document_ids(&config).is_empty());
}

#[tokio::test]
async fn test_rerun_is_byte_identical() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());

    let first = collect(&config, &mock_group(three_replays())).await.unwrap();
    let summary_1 = fs::read(&config.output.summary_path).unwrap();
    let doc_1 = fs::read(config.output.output_dir.join("r3.json")).unwrap();

    let second = collect(&config, &mock_group(three_replays())).await.unwrap();
    let summary_2 = fs::read(&config.output.summary_path).unwrap();
    let doc_2 = fs::read(config.output.output_dir.join("r3.json")).unwrap();

    assert_eq!(summary_1, summary_2);
    assert_eq!(doc_1, doc_2);
    assert_eq!(first.summary_sha256, second.summary_sha256);
    assert_rows_match_documents(&config);
}

#[tokio::test]
async fn test_invalid_token_fails_with_auth_and_writes_nothing() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());

    let mut api = MockReplayApi::new();
    api.expect_fetch_group()
        .times(1)
        .returning(|_| Err(ApiError::Unauthorized("group: 401 Unauthorized".into())));
    api.expect_list_replays().never();
    api.expect_fetch_replay().never();

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::Auth(_)), "got {err:?}");
    assert!(!config.output.summary_path.exists());
    assert!(!config.output.output_dir.exists());
}

#[tokio::test]
async fn test_unknown_group_fails_with_not_found() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());

    let mut api = MockReplayApi::new();
    api.expect_fetch_group()
        .returning(|id: &str| Err(ApiError::NotFound(format!("group {id}"))));

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::NotFound(ref what) if what.contains(GROUP)));
    assert!(!config.output.summary_path.exists());
}

#[tokio::test]
async fn test_token_rejected_mid_run_keeps_previous_output() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    fs::create_dir_all(&config.output.output_dir).unwrap();
    fs::write(config.output.output_dir.join("old.json"), "{}").unwrap();
    fs::write(&config.output.summary_path, "previous\n").unwrap();

    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: String::new(),
        })
    });
    let replays = three_replays();
    let page = ReplayPage {
        replays: summaries(&replays),
        next: None,
    };
    api.expect_list_replays()
        .returning(move |_, _| Ok(page.clone()));
    api.expect_fetch_replay().returning(move |id: &str| {
        if id == "r1" {
            Ok(replays[0].clone())
        } else {
            Err(ApiError::Unauthorized("token expired".into()))
        }
    });

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::Auth(_)));
    assert_eq!(
        fs::read_to_string(&config.output.summary_path).unwrap(),
        "previous\n"
    );
    assert_eq!(document_ids(&config), vec!["old"]);
}

#[tokio::test]
async fn test_pagination_is_followed_until_exhausted() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    let replays = three_replays();

    let mut api = MockReplayApi::new();
    let first = ReplayPage {
        replays: summaries(&replays[..2]),
        next: Some("https://ballchasing.com/api/replays?group=x&after=2".into()),
    };
    let second = ReplayPage {
        replays: summaries(&replays[2..]),
        next: None,
    };
    api.expect_list_replays()
        .times(2)
        .returning(move |group: &str, next: Option<String>| {
            assert_eq!(group, GROUP);
            match next.as_deref() {
                None => Ok(first.clone()),
                Some("https://ballchasing.com/api/replays?group=x&after=2") => Ok(second.clone()),
                Some(other) => panic!("unexpected next url {other}"),
            }
        });

    let listed = list_all_replays(&api, &config).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
}

#[tokio::test]
async fn test_repeated_next_url_and_duplicate_ids_terminate() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    let replays = three_replays();

    let mut api = MockReplayApi::new();
    let looping = ReplayPage {
        replays: summaries(&replays[..2]),
        next: Some("https://ballchasing.com/api/replays?after=same".into()),
    };
    api.expect_list_replays()
        .times(2)
        .returning(move |_, _| Ok(looping.clone()));

    let listed = list_all_replays(&api, &config).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);
}

#[tokio::test]
async fn test_rate_limit_is_retried_then_succeeds() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    let replays = three_replays();

    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: String::new(),
        })
    });
    let page = ReplayPage {
        replays: summaries(&replays[..1]),
        next: None,
    };
    let mut list_calls = 0;
    api.expect_list_replays()
        .times(2)
        .returning(move |_, _| {
            list_calls += 1;
            if list_calls == 1 {
                Err(ApiError::RateLimited { retry_after: None })
            } else {
                Ok(page.clone())
            }
        });
    let r1 = replays[0].clone();
    api.expect_fetch_replay()
        .times(1)
        .returning(move |_| Ok(r1.clone()));

    let report = collect(&config, &api).await.expect("retry should recover");
    assert_eq!(report.matched, 1);
    assert_rows_match_documents(&config);
}

#[tokio::test]
async fn test_persistent_rate_limit_fails_after_max_attempts() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());

    let mut api = MockReplayApi::new();
    api.expect_fetch_group()
        .times(3)
        .returning(|_| Err(ApiError::RateLimited { retry_after: None }));

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::RateLimit { attempts: 3 }), "got {err:?}");
    assert!(!config.output.summary_path.exists());
}

fn api_with_failing_r2() -> MockReplayApi {
    let replays = vec![
        replay("r1", vec![player(PLAYER, 3)], vec![player("opp", 1)]),
        replay("r2", vec![player(PLAYER, 1)], vec![player("opp", 2)]),
        replay("r3", vec![player("opp", 2)], vec![player(PLAYER, 0)]),
    ];
    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: String::new(),
        })
    });
    let page = ReplayPage {
        replays: summaries(&replays),
        next: None,
    };
    api.expect_list_replays()
        .returning(move |_, _| Ok(page.clone()));
    api.expect_fetch_replay().returning(move |id: &str| match id {
        "r2" => Err(ApiError::Status {
            status: 503,
            body: "unavailable".into(),
        }),
        "r1" => Ok(replays[0].clone()),
        _ => Ok(replays[2].clone()),
    });
    api
}

#[tokio::test]
async fn test_partial_fetch_aborts_by_default() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());
    assert_eq!(config.on_fetch_failure, FetchFailurePolicy::Abort);

    let err = collect(&config, &api_with_failing_r2()).await.unwrap_err();
    match err {
        CollectError::PartialFetch { failed } => assert_eq!(failed, vec!["r2".to_string()]),
        other => panic!("expected PartialFetch, got {other:?}"),
    }
    assert!(!config.output.summary_path.exists());
    assert!(!config.output.output_dir.exists());
}

#[tokio::test]
async fn test_partial_fetch_skip_leaves_failed_replay_out() {
    let tmp = tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.on_fetch_failure = FetchFailurePolicy::Skip;

    let report = collect(&config, &api_with_failing_r2()).await.unwrap();
    assert_eq!(report.skipped, vec!["r2".to_string()]);
    assert_eq!(report.matched, 2);
    assert_eq!(summary_ids(&config), vec!["r1", "r3"]);
    assert_rows_match_documents(&config);
}

#[tokio::test]
async fn test_undecodable_payload_counts_as_failed_fetch() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());

    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: String::new(),
        })
    });
    api.expect_list_replays().returning(|_, _| {
        Ok(ReplayPage {
            replays: vec![ReplaySummary {
                id: "broken".into(),
                replay_title: None,
            }],
            next: None,
        })
    });
    api.expect_fetch_replay()
        .times(1)
        .returning(|_| Ok(json!({"status": "pending"})));

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::PartialFetch { ref failed } if failed == &["broken"]));
}

#[tokio::test]
async fn test_unsafe_replay_id_is_rejected_before_fetching() {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path());

    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: String::new(),
        })
    });
    api.expect_list_replays().returning(|_, _| {
        Ok(ReplayPage {
            replays: vec![
                ReplaySummary {
                    id: "r1".into(),
                    replay_title: None,
                },
                ReplaySummary {
                    id: "../../etc/passwd".into(),
                    replay_title: None,
                },
            ],
            next: None,
        })
    });
    api.expect_fetch_replay().never();

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::InvalidReplayId(ref id) if id == "../../etc/passwd"));
    assert!(!config.output.summary_path.exists());
}

fn api_with_throttled_r2() -> MockReplayApi {
    let replays = three_replays();
    let mut api = MockReplayApi::new();
    api.expect_fetch_group().returning(|id: &str| {
        Ok(GroupInfo {
            id: id.to_string(),
            name: String::new(),
        })
    });
    let page = ReplayPage {
        replays: summaries(&replays),
        next: None,
    };
    api.expect_list_replays()
        .returning(move |_, _| Ok(page.clone()));
    api.expect_fetch_replay().returning(move |id: &str| match id {
        "r2" => Err(ApiError::RateLimited { retry_after: None }),
        "r1" => Ok(replays[0].clone()),
        _ => Ok(replays[2].clone()),
    });
    api
}

#[tokio::test]
async fn test_throttled_replay_detail_fails_run_under_either_policy() {
    for policy in [FetchFailurePolicy::Abort, FetchFailurePolicy::Skip] {
        let tmp = tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.on_fetch_failure = policy;

        let err = collect(&config, &api_with_throttled_r2()).await.unwrap_err();
        assert!(
            matches!(err, CollectError::RateLimit { attempts: 3 }),
            "{policy:?}: got {err:?}"
        );
        assert!(!config.output.summary_path.exists());
        assert!(!config.output.output_dir.exists());
    }
}

#[tokio::test]
async fn test_blank_credentials_are_rejected_without_requests() {
    let tmp = tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.credentials.token = String::new();

    let mut api = MockReplayApi::new();
    api.expect_fetch_group().never();

    let err = collect(&config, &api).await.unwrap_err();
    assert!(matches!(err, CollectError::Config(_)));
}
