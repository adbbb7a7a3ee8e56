//! Reconciliation core: merge and backfill engines plus the per-cycle pipelines that
//! drive them against the table files.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use matchlog_adapters::{RecordSource, SnapshotKind};
use matchlog_core::{Column, Diagnostic, LogStamp, MatchPeriod, MatchRecord, TableRow};
use matchlog_storage::{StorageError, Table, TableFile, TableKind};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "matchlog-sync";

/// Columns copied from today's fixtures onto a freshly logged alert.
const ENRICHED_COLUMNS: [Column; 4] = [
    Column::Tournament,
    Column::OddsHome,
    Column::OddsDraw,
    Column::OddsAway,
];

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub alert_log: PathBuf,
    pub result_log: PathBuf,
    pub today: PathBuf,
    pub final_db: PathBuf,
    pub max_halftime_goals: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            alert_log: std::env::var("ALERT_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("alerts_log.csv")),
            result_log: std::env::var("RESULT_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("results.csv")),
            today: std::env::var("REMOTE_TODAY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("today.csv")),
            final_db: std::env::var("FINAL_DB_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("final_db.csv")),
            max_halftime_goals: std::env::var("MATCHLOG_MAX_HT_GOALS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        }
    }

    /// Default file names under `root`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            alert_log: root.join("alerts_log.csv"),
            result_log: root.join("results.csv"),
            today: root.join("today.csv"),
            final_db: root.join("final_db.csv"),
            max_halftime_goals: 1,
        }
    }

    pub fn table(&self, kind: TableKind) -> TableFile {
        let path = match kind {
            TableKind::Today => &self.today,
            TableKind::AlertsLog => &self.alert_log,
            TableKind::Results => &self.result_log,
            TableKind::FinalDb => &self.final_db,
        };
        TableFile::new(kind, path)
    }
}

/// Which columns identify "the same event" in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalKey {
    Title,
    DateTitle,
    Teams,
}

impl NaturalKey {
    pub fn for_table(kind: TableKind) -> Self {
        match kind {
            TableKind::AlertsLog | TableKind::FinalDb => NaturalKey::Title,
            TableKind::Today => NaturalKey::DateTitle,
            TableKind::Results => NaturalKey::Teams,
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            NaturalKey::Title => &[Column::Title],
            NaturalKey::DateTitle => &[Column::Date, Column::Title],
            NaturalKey::Teams => &[Column::HomeTeam, Column::AwayTeam],
        }
    }

    /// Exact, untrimmed key values.
    pub fn of(self, row: &TableRow) -> Vec<String> {
        self.columns()
            .iter()
            .map(|c| row.get(*c).to_string())
            .collect()
    }
}

/// Read-only lookup over a companion table by trimmed `(date, title)`.
#[derive(Debug, Clone, Default)]
pub struct CompanionIndex {
    rows: Vec<TableRow>,
    by_key: HashMap<(String, String), usize>,
}

impl CompanionIndex {
    pub fn new(rows: Vec<TableRow>) -> Self {
        let mut by_key = HashMap::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            by_key
                .entry(Self::key(row.date.as_deref().unwrap_or_default(), &row.title))
                .or_insert(index);
        }
        Self { rows, by_key }
    }

    fn key(date: &str, title: &str) -> (String, String) {
        (date.trim().to_string(), title.trim().to_string())
    }

    /// First companion row for the pair, if any.
    pub fn lookup(&self, date: &str, title: &str) -> Option<&TableRow> {
        self.by_key
            .get(&Self::key(date, title))
            .map(|&index| &self.rows[index])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub rows: Vec<TableRow>,
    pub appended: usize,
    pub duplicates: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Append-only merge keyed by a [`NaturalKey`].
///
/// Existing rows are kept verbatim and in order; new rows follow in input order,
/// minus any whose key is already present (in the table or earlier in the batch).
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    key: NaturalKey,
}

impl MergeEngine {
    pub fn new(key: NaturalKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> NaturalKey {
        self.key
    }

    /// Stamps each record with `stamp`, optionally enriches it from `companion`, and
    /// appends the ones not already present.
    pub fn merge(
        &self,
        existing: Vec<TableRow>,
        records: &[MatchRecord],
        companion: Option<&CompanionIndex>,
        stamp: &LogStamp,
    ) -> MergeOutcome {
        let rows = records
            .iter()
            .map(|record| TableRow::logged(record, stamp))
            .collect();
        self.merge_rows(existing, rows, companion)
    }

    pub fn merge_rows(
        &self,
        existing: Vec<TableRow>,
        new_rows: Vec<TableRow>,
        companion: Option<&CompanionIndex>,
    ) -> MergeOutcome {
        let mut seen: HashSet<Vec<String>> = existing.iter().map(|row| self.key.of(row)).collect();
        let mut outcome = MergeOutcome {
            rows: existing,
            ..Default::default()
        };

        for mut row in new_rows {
            if let Some(companion) = companion {
                if let Some(diagnostic) = enrich_from_companion(&mut row, companion) {
                    outcome.diagnostics.push(diagnostic);
                }
            }

            if !seen.insert(self.key.of(&row)) {
                debug!(title = %row.title, "duplicate row skipped");
                outcome.duplicates += 1;
                continue;
            }
            outcome.rows.push(row);
            outcome.appended += 1;
        }

        outcome
    }
}

/// Copies non-empty tournament and odds cells from the matching companion row.
fn enrich_from_companion(row: &mut TableRow, companion: &CompanionIndex) -> Option<Diagnostic> {
    let date = row.date.clone().unwrap_or_default();
    let Some(found) = companion.lookup(&date, &row.title) else {
        let diagnostic = Diagnostic::NoMatchFound {
            date,
            title: row.title.clone(),
        };
        info!(%diagnostic);
        return Some(diagnostic);
    };

    for column in ENRICHED_COLUMNS {
        let cell = found.get(column);
        if !cell.is_empty() {
            row.set(column, &cell);
        }
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct BackfillOutcome {
    pub rows: Vec<TableRow>,
    pub filled: usize,
    pub unmatched: usize,
}

/// Conservative in-place repair: only rows whose fill fields are all empty are
/// touched, and only from the first companion row sharing the exact key.
#[derive(Debug, Clone)]
pub struct BackfillEngine {
    key_fields: Vec<Column>,
    fill_fields: Vec<Column>,
}

impl BackfillEngine {
    pub fn new(key_fields: impl Into<Vec<Column>>, fill_fields: impl Into<Vec<Column>>) -> Self {
        Self {
            key_fields: key_fields.into(),
            fill_fields: fill_fields.into(),
        }
    }

    pub fn tournament_and_odds() -> Self {
        Self::new([Column::Date, Column::Title], ENRICHED_COLUMNS)
    }

    /// Joins results onto logged rows by team pair.
    pub fn final_scores() -> Self {
        Self::new(
            [Column::HomeTeam, Column::AwayTeam],
            [Column::HomeFtGoals, Column::AwayFtGoals, Column::FtGoals],
        )
    }

    pub fn fill_fields(&self) -> &[Column] {
        &self.fill_fields
    }

    pub fn backfill(&self, mut rows: Vec<TableRow>, companion: &[TableRow]) -> BackfillOutcome {
        let mut index: HashMap<Vec<String>, usize> = HashMap::with_capacity(companion.len());
        for (position, row) in companion.iter().enumerate() {
            if let Some(key) = self.key_of(row) {
                index.entry(key).or_insert(position);
            }
        }

        let mut filled = 0usize;
        let mut unmatched = 0usize;
        for row in rows.iter_mut() {
            if !self.fill_fields.iter().all(|column| row.is_empty(*column)) {
                continue;
            }
            let Some(&position) = self.key_of(row).and_then(|key| index.get(&key)) else {
                unmatched += 1;
                continue;
            };

            let source = &companion[position];
            let mut changed = false;
            for column in &self.fill_fields {
                let cell = source.get(*column);
                if !cell.is_empty() {
                    row.set(*column, &cell);
                    changed = true;
                }
            }
            if changed {
                filled += 1;
            }
        }

        BackfillOutcome {
            rows,
            filled,
            unmatched,
        }
    }

    /// `None` when any key component is empty; such rows never match.
    fn key_of(&self, row: &TableRow) -> Option<Vec<String>> {
        self.key_fields
            .iter()
            .map(|column| row.get(*column).as_text())
            .collect()
    }
}

/// Which live events are worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub max_halftime_goals: u16,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            max_halftime_goals: 1,
        }
    }
}

impl AlertPolicy {
    /// Halftime (or unlabelled) events with a known halftime total at or below the cap.
    pub fn admits(&self, record: &MatchRecord) -> bool {
        matches!(record.period, None | Some(MatchPeriod::Halftime))
            && record
                .halftime
                .total()
                .is_some_and(|goals| goals <= self.max_halftime_goals)
    }

    pub fn select(&self, records: &[MatchRecord]) -> Vec<MatchRecord> {
        records
            .iter()
            .filter(|record| self.admits(record))
            .cloned()
            .collect()
    }
}

/// Most common kick-off times, busiest first, ties by time.
pub fn busiest_kickoff_times(records: &[MatchRecord], limit: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for time in records.iter().filter_map(|r| r.kickoff_time.as_deref()) {
        *counts.entry(time).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(time, count)| (time.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: String,
    pub table: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_in: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub filled: usize,
    pub saved: bool,
    pub diagnostics: usize,
}

impl RunSummary {
    fn start(pipeline: &str, table: &TableFile) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.to_string(),
            table: table.path().display().to_string(),
            started_at: now,
            finished_at: now,
            rows_in: 0,
            appended: 0,
            duplicates: 0,
            filled: 0,
            saved: false,
            diagnostics: 0,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        info!(
            pipeline = %self.pipeline,
            rows_in = self.rows_in,
            appended = self.appended,
            duplicates = self.duplicates,
            filled = self.filled,
            saved = self.saved,
            diagnostics = self.diagnostics,
            "run complete"
        );
        self
    }
}

/// Runs one reconciliation cycle per call against the configured table files.
pub struct Reconciler {
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Log halftime alerts from a live snapshot, enriched from today's fixtures.
    pub fn record_live(&self, source: &dyn RecordSource, stamp: &LogStamp) -> Result<RunSummary> {
        ensure!(
            source.kind() == SnapshotKind::Live,
            "live alerts need a live snapshot, got {:?}",
            source.kind()
        );
        let alerts_file = self.config.table(TableKind::AlertsLog);
        let mut summary = RunSummary::start("live", &alerts_file);
        let span = info_span!("reconcile", run_id = %summary.run_id, pipeline = "live");
        let _guard = span.enter();

        let batch = source.extract().context("extracting live snapshot")?;
        summary.diagnostics += batch.diagnostics.len();
        let policy = AlertPolicy {
            max_halftime_goals: self.config.max_halftime_goals,
        };
        let selected = policy.select(&batch.records);
        summary.rows_in = selected.len();
        info!(
            scraped = batch.records.len(),
            selected = selected.len(),
            "selected halftime alerts"
        );
        if selected.is_empty() {
            return Ok(summary.finish());
        }

        let alerts = alerts_file
            .load_or_empty()
            .with_context(|| format!("loading {}", alerts_file.path().display()))?;
        let today = load_companion(&self.config.table(TableKind::Today));
        summary.diagnostics += alerts.diagnostics.len() + today.diagnostics.len();

        let companion = CompanionIndex::new(today.rows);
        let outcome = MergeEngine::new(NaturalKey::for_table(TableKind::AlertsLog)).merge(
            alerts.rows,
            &selected,
            Some(&companion),
            stamp,
        );
        summary.appended = outcome.appended;
        summary.duplicates = outcome.duplicates;
        summary.diagnostics += outcome.diagnostics.len();

        if outcome.appended > 0 {
            alerts_file
                .save(&outcome.rows)
                .with_context(|| format!("saving {}", alerts_file.path().display()))?;
            summary.saved = true;
        } else {
            info!(duplicates = outcome.duplicates, "all alerts already logged");
        }
        Ok(summary.finish())
    }

    /// Accumulate today's fixtures (with odds) keyed by date and title.
    pub fn record_today(&self, source: &dyn RecordSource, stamp: &LogStamp) -> Result<RunSummary> {
        ensure!(
            source.kind() == SnapshotKind::Today,
            "fixtures need a today snapshot, got {:?}",
            source.kind()
        );
        let today_file = self.config.table(TableKind::Today);
        let mut summary = RunSummary::start("today", &today_file);
        let span = info_span!("reconcile", run_id = %summary.run_id, pipeline = "today");
        let _guard = span.enter();

        let batch = source.extract().context("extracting today snapshot")?;
        summary.rows_in = batch.records.len();
        summary.diagnostics += batch.diagnostics.len();
        for (time, count) in busiest_kickoff_times(&batch.records, 5) {
            info!(kickoff = %time, events = count, "busy kick-off slot");
        }
        if batch.records.is_empty() {
            return Ok(summary.finish());
        }

        let today = today_file
            .load_or_empty()
            .with_context(|| format!("loading {}", today_file.path().display()))?;
        summary.diagnostics += today.diagnostics.len();

        let rows = batch
            .records
            .iter()
            .map(|record| TableRow::fixture(record, stamp))
            .collect();
        let outcome =
            MergeEngine::new(NaturalKey::for_table(TableKind::Today)).merge_rows(today.rows, rows, None);
        summary.appended = outcome.appended;
        summary.duplicates = outcome.duplicates;

        if outcome.appended > 0 {
            today_file
                .save(&outcome.rows)
                .with_context(|| format!("saving {}", today_file.path().display()))?;
            summary.saved = true;
        }
        Ok(summary.finish())
    }

    /// Replace the results table with the latest results listing.
    pub fn record_results(&self, source: &dyn RecordSource) -> Result<RunSummary> {
        ensure!(
            source.kind() == SnapshotKind::Results,
            "results table needs a results snapshot, got {:?}",
            source.kind()
        );
        let results_file = self.config.table(TableKind::Results);
        let mut summary = RunSummary::start("results", &results_file);
        let span = info_span!("reconcile", run_id = %summary.run_id, pipeline = "results");
        let _guard = span.enter();

        let batch = source.extract().context("extracting results snapshot")?;
        summary.rows_in = batch.records.len();
        summary.diagnostics += batch.diagnostics.len();
        if batch.records.is_empty() {
            warn!("results snapshot is empty; keeping the existing table");
            return Ok(summary.finish());
        }

        let rows: Vec<TableRow> = batch.records.iter().map(TableRow::from_record).collect();
        results_file
            .save(&rows)
            .with_context(|| format!("saving {}", results_file.path().display()))?;
        summary.appended = rows.len();
        summary.saved = true;
        Ok(summary.finish())
    }

    /// Fill tournament and odds on logged alerts that were recorded before today's
    /// fixtures knew about them.
    pub fn backfill_tournament_and_odds(&self) -> Result<RunSummary> {
        let alerts_file = self.config.table(TableKind::AlertsLog);
        let mut summary = RunSummary::start("backfill", &alerts_file);
        let span = info_span!("reconcile", run_id = %summary.run_id, pipeline = "backfill");
        let _guard = span.enter();

        let alerts = alerts_file
            .load_or_empty()
            .with_context(|| format!("loading {}", alerts_file.path().display()))?;
        let today_file = self.config.table(TableKind::Today);
        let today = today_file
            .load_or_empty()
            .with_context(|| format!("loading {}", today_file.path().display()))?;
        summary.rows_in = alerts.len();
        summary.diagnostics += alerts.diagnostics.len() + today.diagnostics.len();
        if alerts.is_empty() || today.is_empty() {
            return Ok(summary.finish());
        }

        let outcome = BackfillEngine::tournament_and_odds().backfill(alerts.rows, &today.rows);
        summary.filled = outcome.filled;
        if outcome.filled > 0 {
            alerts_file
                .save(&outcome.rows)
                .with_context(|| format!("saving {}", alerts_file.path().display()))?;
            summary.saved = true;
        } else {
            info!("no alerts needed backfilling");
        }
        Ok(summary.finish())
    }

    /// Attach final scores to a copy of the alerts log and append it to the final
    /// database, then score any earlier final rows that were still open.
    pub fn finalize_scores(&self) -> Result<RunSummary> {
        let final_file = self.config.table(TableKind::FinalDb);
        let mut summary = RunSummary::start("finalize", &final_file);
        let span = info_span!("reconcile", run_id = %summary.run_id, pipeline = "finalize");
        let _guard = span.enter();

        let alerts_file = self.config.table(TableKind::AlertsLog);
        let alerts = alerts_file
            .load_or_empty()
            .with_context(|| format!("loading {}", alerts_file.path().display()))?;
        let results_file = self.config.table(TableKind::Results);
        let results = results_file
            .load_or_empty()
            .with_context(|| format!("loading {}", results_file.path().display()))?;
        summary.rows_in = alerts.len();
        summary.diagnostics += alerts.diagnostics.len() + results.diagnostics.len();
        if alerts.is_empty() {
            return Ok(summary.finish());
        }

        let scores = BackfillEngine::final_scores();
        let scored = scores.backfill(alerts.rows, &results.rows);
        info!(scored = scored.filled, unmatched = scored.unmatched, "attached final scores");

        let existing = final_file
            .load_or_empty()
            .with_context(|| format!("loading {}", final_file.path().display()))?;
        summary.diagnostics += existing.diagnostics.len();
        let merged = MergeEngine::new(NaturalKey::for_table(TableKind::FinalDb)).merge_rows(
            existing.rows,
            scored.rows,
            None,
        );
        let repaired = scores.backfill(merged.rows, &results.rows);

        summary.appended = merged.appended;
        summary.duplicates = merged.duplicates;
        summary.filled = repaired.filled;
        if merged.appended > 0 || repaired.filled > 0 {
            final_file
                .save(&repaired.rows)
                .with_context(|| format!("saving {}", final_file.path().display()))?;
            summary.saved = true;
        }
        Ok(summary.finish())
    }
}

/// A companion that is missing or unreadable degrades to an empty table.
fn load_companion(file: &TableFile) -> Table {
    file.load_or_empty().unwrap_or_else(|err: StorageError| {
        warn!(error = %err, "companion table unusable; enrichment skipped");
        Table::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchlog_core::{Cell, Odds, Score};

    fn stamp() -> LogStamp {
        LogStamp {
            date: "01-01-25".to_string(),
            time: "15:47".to_string(),
        }
    }

    fn record(title: &str) -> MatchRecord {
        let (home, away) = title.split_once(" vs ").expect("title");
        let mut record = MatchRecord::new(home, away);
        record.halftime = Score::new(0, 0);
        record
    }

    fn stored(title: &str) -> TableRow {
        TableRow::logged(&record(title), &stamp())
    }

    fn fixture(date: &str, title: &str, tournament: &str) -> TableRow {
        let mut row = TableRow {
            date: Some(date.to_string()),
            title: title.to_string(),
            ..Default::default()
        };
        row.set(Column::Tournament, &Cell::text(tournament));
        row
    }

    fn titles(rows: &[TableRow]) -> Vec<&str> {
        rows.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn duplicate_titles_are_rejected_and_new_ones_appended() {
        let engine = MergeEngine::new(NaturalKey::Title);
        let outcome = engine.merge(
            vec![stored("A vs B")],
            &[record("A vs B"), record("C vs D")],
            None,
            &stamp(),
        );

        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(titles(&outcome.rows), vec!["A vs B", "C vs D"]);
    }

    #[test]
    fn merging_the_same_batch_twice_is_idempotent() {
        let engine = MergeEngine::new(NaturalKey::Title);
        let batch = [record("A vs B"), record("C vs D"), record("A vs B")];

        let first = engine.merge(Vec::new(), &batch, None, &stamp());
        assert_eq!(first.appended, 2);
        assert_eq!(first.duplicates, 1);

        let second = engine.merge(first.rows.clone(), &batch, None, &stamp());
        assert_eq!(second.appended, 0);
        assert_eq!(second.rows, first.rows);
    }

    #[test]
    fn existing_order_is_a_prefix_of_the_output() {
        let engine = MergeEngine::new(NaturalKey::Title);
        let existing = vec![stored("Z vs Y"), stored("A vs B"), stored("M vs N")];
        let outcome = engine.merge(
            existing.clone(),
            &[record("Q vs R"), record("A vs B"), record("C vs D")],
            None,
            &stamp(),
        );

        assert_eq!(&outcome.rows[..existing.len()], existing.as_slice());
        assert_eq!(
            titles(&outcome.rows),
            vec!["Z vs Y", "A vs B", "M vs N", "Q vs R", "C vs D"]
        );
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let engine = MergeEngine::new(NaturalKey::Title);
        let existing = vec![stored("A vs B")];
        let outcome = engine.merge(existing.clone(), &[], None, &stamp());

        assert_eq!(outcome.appended, 0);
        assert_eq!(outcome.rows, existing);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn companion_supplies_tournament_and_odds() {
        let mut today = fixture("01-01-25", " A vs B ", "X");
        today.odds = Odds {
            home: Some(1.9),
            draw: Some(3.2),
            away: Some(4.0),
        };
        let companion = CompanionIndex::new(vec![fixture("31-12-24", "A vs B", "Old"), today]);

        let outcome = MergeEngine::new(NaturalKey::Title).merge(
            Vec::new(),
            &[record("A vs B")],
            Some(&companion),
            &stamp(),
        );

        let row = &outcome.rows[0];
        assert_eq!(row.tournament.as_deref(), Some("X"));
        assert_eq!(row.odds.home, Some(1.9));
        assert_eq!(row.odds.away, Some(4.0));
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn empty_companion_leaves_fields_blank_with_one_diagnostic_per_row() {
        let companion = CompanionIndex::default();
        let outcome = MergeEngine::new(NaturalKey::Title).merge(
            Vec::new(),
            &[record("A vs B"), record("C vs D")],
            Some(&companion),
            &stamp(),
        );

        assert_eq!(outcome.appended, 2);
        assert!(outcome.rows.iter().all(|r| r.tournament.is_none()));
        assert_eq!(outcome.diagnostics.len(), 2);
        assert!(matches!(
            &outcome.diagnostics[0],
            Diagnostic::NoMatchFound { title, .. } if title == "A vs B"
        ));
    }

    #[test]
    fn date_title_key_keeps_same_fixture_on_different_days() {
        let engine = MergeEngine::new(NaturalKey::DateTitle);
        let outcome = engine.merge_rows(
            vec![fixture("01-01-25", "A vs B", "X")],
            vec![
                fixture("01-01-25", "A vs B", "X"),
                fixture("08-01-25", "A vs B", "X"),
            ],
            None,
        );

        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.rows[1].date.as_deref(), Some("08-01-25"));
    }

    #[test]
    fn backfill_fills_gaps_and_never_overwrites() {
        let mut gap = stored("A vs B");
        gap.tournament = None;
        let mut set = stored("C vs D");
        set.tournament = Some("Y".to_string());
        let companion = vec![
            fixture("01-01-25", "A vs B", "X"),
            fixture("01-01-25", "C vs D", "Z"),
        ];

        let outcome =
            BackfillEngine::tournament_and_odds().backfill(vec![gap, set], &companion);

        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.filled, 1);
        assert_eq!(outcome.rows[0].tournament.as_deref(), Some("X"));
        assert_eq!(outcome.rows[1].tournament.as_deref(), Some("Y"));
    }

    #[test]
    fn backfill_requires_exact_key_and_counts_misses() {
        let rows = vec![stored("A vs B"), stored("E vs F")];
        let companion = vec![
            fixture("02-01-25", "A vs B", "Wrong day"),
            fixture("01-01-25", " E vs F", "Padded"),
        ];

        let outcome = BackfillEngine::tournament_and_odds().backfill(rows.clone(), &companion);

        assert_eq!(outcome.filled, 0);
        assert_eq!(outcome.unmatched, 2);
        assert_eq!(outcome.rows, rows);
    }

    #[test]
    fn final_scores_join_on_team_pair_first_match_wins() {
        let alerts = vec![stored("A vs B"), stored("C vs D")];
        let mut first = TableRow::from_record(&MatchRecord::new("A", "B"));
        first.set(Column::HomeFtGoals, &Cell::Goals(2));
        first.set(Column::AwayFtGoals, &Cell::Goals(1));
        first.set(Column::FtGoals, &Cell::Goals(3));
        let mut second = first.clone();
        second.set(Column::FtGoals, &Cell::Goals(9));

        let outcome = BackfillEngine::final_scores().backfill(alerts, &[first, second]);

        assert_eq!(outcome.filled, 1);
        assert_eq!(outcome.unmatched, 1);
        assert_eq!(outcome.rows[0].fulltime, Score::new(2, 1));
        assert_eq!(outcome.rows[0].ft_goals, Some(3));
        assert_eq!(outcome.rows[1].ft_goals, None);
    }

    #[test]
    fn alert_policy_keeps_low_scoring_halftime_events() {
        let policy = AlertPolicy::default();
        let mut quiet = record("A vs B");
        quiet.period = Some(MatchPeriod::Halftime);
        let mut one = record("C vs D");
        one.halftime = Score::new(0, 1);
        let mut busy = record("E vs F");
        busy.halftime = Score::new(2, 1);
        let mut early = record("G vs H");
        early.period = Some(MatchPeriod::FirstHalf);
        let mut unknown = record("I vs J");
        unknown.halftime = Score::default();

        let selected = policy.select(&[quiet, one, busy, early, unknown]);
        let titles: Vec<_> = selected.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A vs B", "C vs D"]);
    }

    #[test]
    fn busiest_kickoff_times_rank_by_count_then_time() {
        let mut records = Vec::new();
        for (title, time) in [
            ("A vs B", "16:00"),
            ("C vs D", "14:00"),
            ("E vs F", "16:00"),
            ("G vs H", "12:30"),
            ("I vs J", "14:00"),
        ] {
            let mut r = record(title);
            r.kickoff_time = Some(time.to_string());
            records.push(r);
        }

        assert_eq!(
            busiest_kickoff_times(&records, 2),
            vec![("14:00".to_string(), 2), ("16:00".to_string(), 2)]
        );
    }
}
