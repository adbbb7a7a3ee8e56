use std::path::PathBuf;

use matchlog_adapters::{RecordSource, SnapshotFile, SnapshotKind};
use matchlog_core::{MatchPeriod, Score};

fn fixture(kind: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("fixtures")
        .join(kind)
        .join("sample")
        .join("snapshot.json")
}

#[test]
fn live_sample_normalises_and_skips_keyless_record() {
    let batch = SnapshotFile::new(SnapshotKind::Live, fixture("live"))
        .extract()
        .expect("live snapshot");

    assert_eq!(batch.records.len(), 4);
    assert_eq!(batch.skipped, 1);
    assert_eq!(batch.records[0].title, "Arsenal vs Brentford");
    assert_eq!(batch.records[0].period, Some(MatchPeriod::Halftime));
    assert_eq!(batch.records[3].period, Some(MatchPeriod::FirstHalf));
}

#[test]
fn today_sample_keeps_odds_and_blanks_suspended_prices() {
    let batch = SnapshotFile::new(SnapshotKind::Today, fixture("today"))
        .extract()
        .expect("today snapshot");

    assert_eq!(batch.records.len(), 3);
    let roma = &batch.records[2];
    assert_eq!(roma.kickoff_date.as_deref(), Some("01-01-25"));
    assert_eq!(roma.odds.home, Some(2.4));
    assert_eq!(roma.odds.away, None);
    assert_eq!(batch.diagnostics.len(), 1);
}

#[test]
fn results_sample_reads_score_text_and_explicit_goals() {
    let batch = SnapshotFile::new(SnapshotKind::Results, fixture("results"))
        .extract()
        .expect("results snapshot");

    assert_eq!(batch.records[0].fulltime, Score::new(2, 0));
    assert_eq!(batch.records[1].fulltime, Score::new(1, 1));
    assert!(!batch.records[2].fulltime.is_known());
}
