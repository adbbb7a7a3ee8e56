//! Core domain model for MatchLog: scraped match records and the table rows they become.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "matchlog-core";

/// Layout of every `date` cell, e.g. `01-01-25`.
pub const DATE_FORMAT: &str = "%d-%m-%y";
/// Layout of `log_time` cells.
pub const TIME_FORMAT: &str = "%H:%M";

/// Logical column shared by all tables. Each table picks the subset it persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    Date,
    LogTime,
    KickoffTime,
    GameId,
    Tournament,
    Title,
    HomeTeam,
    AwayTeam,
    OddsHome,
    OddsDraw,
    OddsAway,
    HomeHtGoals,
    AwayHtGoals,
    HtGoals,
    HomeFtGoals,
    AwayFtGoals,
    FtGoals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Text,
    Decimal,
    Goals,
}

impl Column {
    pub fn kind(self) -> CellKind {
        match self {
            Column::OddsHome | Column::OddsDraw | Column::OddsAway => CellKind::Decimal,
            Column::HomeHtGoals
            | Column::AwayHtGoals
            | Column::HtGoals
            | Column::HomeFtGoals
            | Column::AwayFtGoals
            | Column::FtGoals => CellKind::Goals,
            _ => CellKind::Text,
        }
    }

    /// Default header spelling. The results table overrides the team columns.
    pub fn header(self) -> &'static str {
        match self {
            Column::Date => "date",
            Column::LogTime => "log_time",
            Column::KickoffTime => "time",
            Column::GameId => "game-id",
            Column::Tournament => "tournament",
            Column::Title => "title",
            Column::HomeTeam => "home-team",
            Column::AwayTeam => "away-team",
            Column::OddsHome => "pre-match_odds_home",
            Column::OddsDraw => "pre-match_odds_draw",
            Column::OddsAway => "pre-match_odds_away",
            Column::HomeHtGoals => "home_ht_goals",
            Column::AwayHtGoals => "away_ht_goals",
            Column::HtGoals => "ht_goals",
            Column::HomeFtGoals => "home_ft_goals",
            Column::AwayFtGoals => "away_ft_goals",
            Column::FtGoals => "ft_goals",
        }
    }

    /// Resolves a header cell. Hyphenated and underscored spellings are both accepted.
    pub fn from_header(header: &str) -> Option<Column> {
        let column = match header.trim() {
            "date" => Column::Date,
            "log_time" => Column::LogTime,
            "time" => Column::KickoffTime,
            "game-id" | "game_id" => Column::GameId,
            "tournament" => Column::Tournament,
            "title" => Column::Title,
            "home-team" | "home_team" => Column::HomeTeam,
            "away-team" | "away_team" => Column::AwayTeam,
            "pre-match_odds_home" | "pre_match_odds_home" => Column::OddsHome,
            "pre-match_odds_draw" | "pre_match_odds_draw" => Column::OddsDraw,
            "pre-match_odds_away" | "pre_match_odds_away" => Column::OddsAway,
            "home_ht_goals" => Column::HomeHtGoals,
            "away_ht_goals" => Column::AwayHtGoals,
            "ht_goals" => Column::HtGoals,
            "home_ft_goals" => Column::HomeFtGoals,
            "away_ft_goals" => Column::AwayFtGoals,
            "ft_goals" => Column::FtGoals,
            _ => return None,
        };
        Some(column)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Row-level degradations. None of these abort a run; they are logged and returned
/// alongside the outcome that absorbed them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("table file {path} not found; treated as empty")]
    NotFound { path: String },
    #[error("could not coerce {column} value {raw:?}; stored blank")]
    ParseFailure { column: &'static str, raw: String },
    #[error("no companion row for date {date:?} and title {title:?}")]
    NoMatchFound { date: String, title: String },
}

/// A single typed table value. `Empty` is the explicit "missing field" state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Decimal(f64),
    Goals(u16),
}

impl Cell {
    /// Whitespace-only text collapses to `Empty`; other text is kept verbatim.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    /// Parses a raw table or snapshot value for `column`. Blank input is `Empty`;
    /// anything that cannot be coerced to the column's kind is a `ParseFailure`.
    pub fn parse(column: Column, raw: &str) -> Result<Cell, Diagnostic> {
        if raw.trim().is_empty() {
            return Ok(Cell::Empty);
        }
        let parsed = match column.kind() {
            CellKind::Text => Some(Cell::Text(raw.to_string())),
            CellKind::Decimal => parse_decimal(raw).map(Cell::Decimal),
            CellKind::Goals => parse_goals(raw).map(Cell::Goals),
        };
        parsed.ok_or_else(|| Diagnostic::ParseFailure {
            column: column.header(),
            raw: raw.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Decimal(_) | Cell::Goals(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(self.to_string())
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => parse_decimal(s),
            Cell::Decimal(v) => Some(*v),
            Cell::Goals(g) => Some(f64::from(*g)),
        }
    }

    pub fn as_goals(&self) -> Option<u16> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => parse_goals(s),
            Cell::Decimal(v) => whole_goals(*v),
            Cell::Goals(g) => Some(*g),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Decimal(v) => write!(f, "{v}"),
            Cell::Goals(g) => write!(f, "{g}"),
        }
    }
}

impl From<Option<&str>> for Cell {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, Cell::text)
    }
}

/// Bookmaker odds are plain decimals such as `1.85`. Signs, exponents and
/// placeholders like `-` are rejected.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Goal counts, tolerating float renderings such as `2.0`.
pub fn parse_goals(raw: &str) -> Option<u16> {
    let trimmed = raw.trim();
    if let Ok(goals) = trimmed.parse::<u16>() {
        return Some(goals);
    }
    parse_decimal(trimmed).and_then(whole_goals)
}

fn whole_goals(value: f64) -> Option<u16> {
    if value.fract() == 0.0 && value >= 0.0 && value <= f64::from(u16::MAX) {
        Some(value as u16)
    } else {
        None
    }
}

/// Phase of a live match as printed in the bookmaker's clock cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPeriod {
    FirstHalf,
    Halftime,
    SecondHalf,
}

impl MatchPeriod {
    /// Classifies labels like `H1 23'`, `HT` or `2nd half`.
    pub fn from_clock_label(label: &str) -> Option<MatchPeriod> {
        let upper = label.trim().to_ascii_uppercase();
        if ["H1", "1ST", "FIRST"].iter().any(|m| upper.contains(m)) {
            Some(MatchPeriod::FirstHalf)
        } else if ["H2", "2ND", "SECOND"].iter().any(|m| upper.contains(m)) {
            Some(MatchPeriod::SecondHalf)
        } else if ["HT", "HALF"].iter().any(|m| upper.contains(m)) {
            Some(MatchPeriod::Halftime)
        } else {
            None
        }
    }
}

/// Pre-match 1X2 odds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Odds {
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: Option<u16>,
    pub away: Option<u16>,
}

impl Score {
    pub fn new(home: u16, away: u16) -> Self {
        Self {
            home: Some(home),
            away: Some(away),
        }
    }

    /// Parses a results-page score such as `"1:4 "`.
    pub fn parse_colon(text: &str) -> Option<Score> {
        let cleaned = text.replace(' ', "");
        let (home, away) = cleaned.trim().split_once(':')?;
        Some(Score::new(home.parse().ok()?, away.parse().ok()?))
    }

    pub fn total(&self) -> Option<u16> {
        self.home?.checked_add(self.away?)
    }

    pub fn is_known(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }
}

/// One event as produced by the extractor for a single scrape cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchRecord {
    pub title: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_date: Option<String>,
    pub kickoff_time: Option<String>,
    pub game_id: Option<String>,
    pub period: Option<MatchPeriod>,
    pub tournament: Option<String>,
    pub odds: Odds,
    pub halftime: Score,
    pub fulltime: Score,
}

impl MatchRecord {
    pub fn new(home_team: impl Into<String>, away_team: impl Into<String>) -> Self {
        let home_team = home_team.into();
        let away_team = away_team.into();
        Self {
            title: title_for(&home_team, &away_team),
            home_team,
            away_team,
            ..Default::default()
        }
    }
}

/// The site's own title format, used whenever the extractor saw no explicit title.
pub fn title_for(home_team: &str, away_team: &str) -> String {
    format!("{home_team} vs {away_team}")
}

/// Wall-clock date and time stamped onto rows logged in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStamp {
    pub date: String,
    pub time: String,
}

impl LogStamp {
    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    pub fn at<Tz: TimeZone>(moment: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self {
            date: moment.format(DATE_FORMAT).to_string(),
            time: moment.format(TIME_FORMAT).to_string(),
        }
    }
}

/// A persisted row. Every table stores a subset of these fields; the ones a table
/// does not carry simply stay `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub date: Option<String>,
    pub log_time: Option<String>,
    pub kickoff_time: Option<String>,
    pub game_id: Option<String>,
    pub tournament: Option<String>,
    pub title: String,
    pub home_team: String,
    pub away_team: String,
    pub odds: Odds,
    pub halftime: Score,
    pub ht_goals: Option<u16>,
    pub fulltime: Score,
    pub ft_goals: Option<u16>,
}

impl TableRow {
    /// Row for an append-only log, stamped with the run's date and time.
    pub fn logged(record: &MatchRecord, stamp: &LogStamp) -> Self {
        Self {
            date: Some(stamp.date.clone()),
            log_time: Some(stamp.time.clone()),
            ..Self::from_record(record)
        }
    }

    /// Fixture row dated by kickoff, falling back to the run date.
    pub fn fixture(record: &MatchRecord, stamp: &LogStamp) -> Self {
        Self {
            date: record
                .kickoff_date
                .clone()
                .or_else(|| Some(stamp.date.clone())),
            ..Self::from_record(record)
        }
    }

    pub fn from_record(record: &MatchRecord) -> Self {
        Self {
            date: record.kickoff_date.clone(),
            log_time: None,
            kickoff_time: record.kickoff_time.clone(),
            game_id: record.game_id.clone(),
            tournament: record.tournament.clone(),
            title: record.title.clone(),
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            odds: record.odds,
            halftime: record.halftime,
            ht_goals: record.halftime.total(),
            fulltime: record.fulltime,
            ft_goals: record.fulltime.total(),
        }
    }

    pub fn get(&self, column: Column) -> Cell {
        match column {
            Column::Date => Cell::from(self.date.as_deref()),
            Column::LogTime => Cell::from(self.log_time.as_deref()),
            Column::KickoffTime => Cell::from(self.kickoff_time.as_deref()),
            Column::GameId => Cell::from(self.game_id.as_deref()),
            Column::Tournament => Cell::from(self.tournament.as_deref()),
            Column::Title => Cell::text(self.title.as_str()),
            Column::HomeTeam => Cell::text(self.home_team.as_str()),
            Column::AwayTeam => Cell::text(self.away_team.as_str()),
            Column::OddsHome => decimal_cell(self.odds.home),
            Column::OddsDraw => decimal_cell(self.odds.draw),
            Column::OddsAway => decimal_cell(self.odds.away),
            Column::HomeHtGoals => goals_cell(self.halftime.home),
            Column::AwayHtGoals => goals_cell(self.halftime.away),
            Column::HtGoals => goals_cell(self.ht_goals),
            Column::HomeFtGoals => goals_cell(self.fulltime.home),
            Column::AwayFtGoals => goals_cell(self.fulltime.away),
            Column::FtGoals => goals_cell(self.ft_goals),
        }
    }

    /// Writes `cell` into `column`, coercing it to the column's kind. Values that
    /// cannot be coerced leave the field empty.
    pub fn set(&mut self, column: Column, cell: &Cell) {
        match column {
            Column::Date => self.date = cell.as_text(),
            Column::LogTime => self.log_time = cell.as_text(),
            Column::KickoffTime => self.kickoff_time = cell.as_text(),
            Column::GameId => self.game_id = cell.as_text(),
            Column::Tournament => self.tournament = cell.as_text(),
            Column::Title => self.title = cell.as_text().unwrap_or_default(),
            Column::HomeTeam => self.home_team = cell.as_text().unwrap_or_default(),
            Column::AwayTeam => self.away_team = cell.as_text().unwrap_or_default(),
            Column::OddsHome => self.odds.home = cell.as_decimal(),
            Column::OddsDraw => self.odds.draw = cell.as_decimal(),
            Column::OddsAway => self.odds.away = cell.as_decimal(),
            Column::HomeHtGoals => self.halftime.home = cell.as_goals(),
            Column::AwayHtGoals => self.halftime.away = cell.as_goals(),
            Column::HtGoals => self.ht_goals = cell.as_goals(),
            Column::HomeFtGoals => self.fulltime.home = cell.as_goals(),
            Column::AwayFtGoals => self.fulltime.away = cell.as_goals(),
            Column::FtGoals => self.ft_goals = cell.as_goals(),
        }
    }

    pub fn is_empty(&self, column: Column) -> bool {
        self.get(column).is_empty()
    }
}

fn decimal_cell(value: Option<f64>) -> Cell {
    value.map_or(Cell::Empty, Cell::Decimal)
}

fn goals_cell(value: Option<u16>) -> Cell {
    value.map_or(Cell::Empty, Cell::Goals)
}
