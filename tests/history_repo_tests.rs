// HistoryRepo tests: connect, init, save, get_recent, range queries, prune

use meshperf::history_repo::HistoryRepo;
use meshperf::models::{SummaryMap, SummaryReport, SummaryValue, TemplateFailure};
use meshperf::window::TimeWindow;
use tempfile::TempDir;

fn report(end: i64, cpu: &str) -> SummaryReport {
    let mut values = SummaryMap::new();
    values.insert(
        "cpu_mili_avg_fortioserver_deployment_proxy".into(),
        SummaryValue::from(cpu),
    );
    values.insert(
        "cpu_mili_fortio_deployment_proxy".into(),
        SummaryValue::Trend(vec![200.0, 400.0]),
    );
    SummaryReport {
        window: TimeWindow::ending_at(end, 300).unwrap(),
        values,
        failures: vec![],
    }
}

async fn open(dir: &TempDir) -> HistoryRepo {
    let path = dir.path().join("history.db");
    let repo = HistoryRepo::connect(path.to_str().unwrap(), 30)
        .await
        .unwrap();
    repo.init().await.unwrap();
    repo
}

#[tokio::test]
async fn history_repo_connect_and_init() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("history.db");
    let repo = HistoryRepo::connect(path.to_str().unwrap(), 30)
        .await
        .unwrap();
    repo.init().await.unwrap();
    // init is idempotent
    repo.init().await.unwrap();
    assert!(path.exists());
    assert!(repo.get_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_repo_save_and_get_recent() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;

    repo.save_report(&report(10_000, "350"), 1_000).await.unwrap();
    repo.save_report(&report(20_000, "360"), 2_000).await.unwrap();
    repo.save_report(&report(30_000, "370"), 3_000).await.unwrap();

    let recent = repo.get_recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    // oldest first
    assert_eq!(recent[0].created_at, 2_000);
    assert_eq!(recent[1].created_at, 3_000);
    assert_eq!(recent[1].window_end, 30_000);
    assert_eq!(recent[1].window_start, 29_700);
    assert_eq!(
        recent[1].values.get("cpu_mili_avg_fortioserver_deployment_proxy"),
        Some(&SummaryValue::from("370"))
    );
    assert_eq!(
        recent[1].values.get("cpu_mili_fortio_deployment_proxy"),
        Some(&SummaryValue::Trend(vec![200.0, 400.0]))
    );
}

#[tokio::test]
async fn history_repo_keeps_failures() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;

    let mut r = report(10_000, "0");
    r.failures.push(TemplateFailure {
        template: "cpu_and_memory".into(),
        error: "prometheus returned HTTP 503".into(),
    });
    repo.save_report(&r, 1_000).await.unwrap();

    let stored = repo.get_recent(1).await.unwrap();
    assert_eq!(stored[0].failures, r.failures);
}

#[tokio::test]
async fn history_repo_get_by_time_range() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;
    for ts in [1_000, 2_000, 3_000, 4_000] {
        repo.save_report(&report(ts, "1"), ts).await.unwrap();
    }

    let entries = repo.get_by_time_range(2_000, 4_000).await.unwrap();
    let created: Vec<i64> = entries.iter().map(|e| e.created_at).collect();
    assert_eq!(created, vec![2_000, 3_000]);
}

#[tokio::test]
async fn history_repo_prune_before() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;
    for ts in [1_000, 2_000, 3_000] {
        repo.save_report(&report(ts, "1"), ts).await.unwrap();
    }

    assert_eq!(repo.prune_before(2_500).await.unwrap(), 2);
    let left = repo.get_recent(10).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].created_at, 3_000);
}

#[tokio::test]
async fn history_repo_prune_old_data_uses_retention() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;
    let now = chrono::Utc::now().timestamp_millis();
    let day = 24 * 60 * 60 * 1000;

    repo.save_report(&report(1_000, "1"), now - 31 * day).await.unwrap();
    repo.save_report(&report(2_000, "1"), now - day).await.unwrap();

    assert_eq!(repo.prune_old_data().await.unwrap(), 1);
    assert_eq!(repo.get_recent(10).await.unwrap().len(), 1);
}
