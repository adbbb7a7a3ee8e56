//! Extractor boundary: snapshot bundles of loosely-typed scraped records and their
//! normalisation into [`MatchRecord`]s.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use matchlog_core::{title_for, Cell, Column, Diagnostic, MatchPeriod, MatchRecord, Odds, Score};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "matchlog-adapters";

/// Which bookmaker page a snapshot was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Live,
    Today,
    Results,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("snapshot {} holds {found:?} records, expected {expected:?}", .path.display())]
    WrongKind {
        path: PathBuf,
        expected: SnapshotKind,
        found: SnapshotKind,
    },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Anything that can hand the reconciliation core one scrape cycle's records.
pub trait RecordSource {
    fn kind(&self) -> SnapshotKind;

    fn extract(&self) -> Result<ExtractedBatch, AdapterError>;
}

/// One extractor run as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBundle {
    pub snapshot_id: String,
    pub kind: SnapshotKind,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub captured_from_url: Option<String>,
    pub extractor_version: String,
    #[serde(default)]
    pub records: Vec<RawRecord>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A record exactly as the page scraper emitted it. Numeric fields may arrive as JSON
/// numbers or strings, and either team-name spelling is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "home-team")]
    pub home_team: Option<String>,
    #[serde(default, alias = "away-team")]
    pub away_team: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, alias = "game-id")]
    pub game_id: Option<JsonValue>,
    #[serde(default)]
    pub clock: Option<String>,
    #[serde(default)]
    pub tournament: Option<String>,
    #[serde(default, rename = "pre-match_odds_home")]
    pub odds_home: Option<JsonValue>,
    #[serde(default, rename = "pre-match_odds_draw")]
    pub odds_draw: Option<JsonValue>,
    #[serde(default, rename = "pre-match_odds_away")]
    pub odds_away: Option<JsonValue>,
    #[serde(default)]
    pub home_ht_goals: Option<JsonValue>,
    #[serde(default)]
    pub away_ht_goals: Option<JsonValue>,
    #[serde(default)]
    pub home_ft_goals: Option<JsonValue>,
    #[serde(default)]
    pub away_ft_goals: Option<JsonValue>,
    #[serde(default)]
    pub score: Option<String>,
}

/// Normalised output of one extraction.
#[derive(Debug, Clone)]
pub struct ExtractedBatch {
    pub kind: SnapshotKind,
    pub captured_at: DateTime<Utc>,
    pub records: Vec<MatchRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub skipped: usize,
}

/// A snapshot JSON file written by the scraper.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    kind: SnapshotKind,
}

impl SnapshotFile {
    pub fn new(kind: SnapshotKind, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for SnapshotFile {
    fn kind(&self) -> SnapshotKind {
        self.kind
    }

    fn extract(&self) -> Result<ExtractedBatch, AdapterError> {
        let bundle = load_snapshot_bundle(&self.path)?;
        if bundle.kind != self.kind {
            return Err(AdapterError::WrongKind {
                path: self.path.clone(),
                expected: self.kind,
                found: bundle.kind,
            });
        }
        Ok(normalize_bundle(&bundle))
    }
}

/// Records already held in memory, e.g. handed over by an embedding scraper.
#[derive(Debug, Clone)]
pub struct StaticSource {
    pub kind: SnapshotKind,
    pub captured_at: DateTime<Utc>,
    pub records: Vec<MatchRecord>,
}

impl RecordSource for StaticSource {
    fn kind(&self) -> SnapshotKind {
        self.kind
    }

    fn extract(&self) -> Result<ExtractedBatch, AdapterError> {
        Ok(ExtractedBatch {
            kind: self.kind,
            captured_at: self.captured_at,
            records: self.records.clone(),
            diagnostics: Vec::new(),
            skipped: 0,
        })
    }
}

pub fn load_snapshot_bundle(path: impl AsRef<Path>) -> Result<SnapshotBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

pub fn normalize_bundle(bundle: &SnapshotBundle) -> ExtractedBatch {
    let mut diagnostics = Vec::new();
    let mut records = Vec::with_capacity(bundle.records.len());
    let mut skipped = 0usize;

    for (index, raw) in bundle.records.iter().enumerate() {
        match normalize_record(raw, &mut diagnostics) {
            Some(record) => records.push(record),
            None => {
                skipped += 1;
                warn!(
                    snapshot = %bundle.snapshot_id,
                    index,
                    "record has neither a title nor both team names; skipped"
                );
            }
        }
    }

    debug!(
        snapshot = %bundle.snapshot_id,
        kind = ?bundle.kind,
        records = records.len(),
        skipped,
        "normalised snapshot"
    );
    ExtractedBatch {
        kind: bundle.kind,
        captured_at: bundle.captured_at,
        records,
        diagnostics,
        skipped,
    }
}

/// Turns one loose record into a [`MatchRecord`]. Returns `None` when no natural key
/// can be formed.
pub fn normalize_record(raw: &RawRecord, diagnostics: &mut Vec<Diagnostic>) -> Option<MatchRecord> {
    let mut home_team = non_blank(raw.home_team.as_deref());
    let mut away_team = non_blank(raw.away_team.as_deref());
    let title = match non_blank(raw.title.as_deref()) {
        Some(title) => title,
        None => title_for(home_team.as_deref()?, away_team.as_deref()?),
    };
    if home_team.is_none() || away_team.is_none() {
        if let Some((home, away)) = title.split_once(" vs ") {
            home_team = home_team.or_else(|| Some(home.to_string()));
            away_team = away_team.or_else(|| Some(away.to_string()));
        }
    }

    let mut cell = |column: Column, value: Option<&JsonValue>| -> Cell {
        json_cell(column, value).unwrap_or_else(|diagnostic| {
            warn!(%title, %diagnostic, "snapshot value stored blank");
            diagnostics.push(diagnostic);
            Cell::Empty
        })
    };

    let odds = Odds {
        home: cell(Column::OddsHome, raw.odds_home.as_ref()).as_decimal(),
        draw: cell(Column::OddsDraw, raw.odds_draw.as_ref()).as_decimal(),
        away: cell(Column::OddsAway, raw.odds_away.as_ref()).as_decimal(),
    };
    let halftime = Score {
        home: cell(Column::HomeHtGoals, raw.home_ht_goals.as_ref()).as_goals(),
        away: cell(Column::AwayHtGoals, raw.away_ht_goals.as_ref()).as_goals(),
    };
    let mut fulltime = Score {
        home: cell(Column::HomeFtGoals, raw.home_ft_goals.as_ref()).as_goals(),
        away: cell(Column::AwayFtGoals, raw.away_ft_goals.as_ref()).as_goals(),
    };
    let game_id = cell(Column::GameId, raw.game_id.as_ref()).as_text();

    if !fulltime.is_known() {
        if let Some(score) = raw.score.as_deref().and_then(Score::parse_colon) {
            fulltime = score;
        }
    }

    Some(MatchRecord {
        title,
        home_team: home_team.unwrap_or_default(),
        away_team: away_team.unwrap_or_default(),
        kickoff_date: non_blank(raw.date.as_deref()),
        kickoff_time: non_blank(raw.time.as_deref()),
        game_id,
        period: raw.clock.as_deref().and_then(MatchPeriod::from_clock_label),
        tournament: non_blank(raw.tournament.as_deref().map(|t| t.trim_matches('"'))),
        odds,
        halftime,
        fulltime,
    })
}

fn json_cell(column: Column, value: Option<&JsonValue>) -> Result<Cell, Diagnostic> {
    match value {
        None | Some(JsonValue::Null) => Ok(Cell::Empty),
        Some(JsonValue::String(s)) => Cell::parse(column, s),
        Some(JsonValue::Number(n)) => Cell::parse(column, &n.to_string()),
        Some(other) => Err(Diagnostic::ParseFailure {
            column: column.header(),
            raw: other.to_string(),
        }),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
