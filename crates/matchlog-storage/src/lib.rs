//! Flat-file table storage for MatchLog: CSV schemas, lenient loading and atomic rewrites.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use matchlog_core::{Cell, Column, Diagnostic, TableRow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "matchlog-storage";

/// The four datasets MatchLog maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Today,
    AlertsLog,
    Results,
    FinalDb,
}

const TODAY_COLUMNS: &[Column] = &[
    Column::Date,
    Column::KickoffTime,
    Column::Title,
    Column::Tournament,
    Column::GameId,
    Column::HomeTeam,
    Column::AwayTeam,
    Column::OddsHome,
    Column::OddsDraw,
    Column::OddsAway,
];

const ALERTS_COLUMNS: &[Column] = &[
    Column::Date,
    Column::LogTime,
    Column::Tournament,
    Column::Title,
    Column::HomeTeam,
    Column::AwayTeam,
    Column::OddsHome,
    Column::OddsDraw,
    Column::OddsAway,
    Column::HomeHtGoals,
    Column::AwayHtGoals,
    Column::HtGoals,
];

const FINAL_COLUMNS: &[Column] = &[
    Column::Date,
    Column::LogTime,
    Column::Tournament,
    Column::Title,
    Column::HomeTeam,
    Column::AwayTeam,
    Column::OddsHome,
    Column::OddsDraw,
    Column::OddsAway,
    Column::HomeHtGoals,
    Column::AwayHtGoals,
    Column::HtGoals,
    Column::HomeFtGoals,
    Column::AwayFtGoals,
    Column::FtGoals,
];

const RESULTS_COLUMNS: &[Column] = &[
    Column::Tournament,
    Column::HomeTeam,
    Column::AwayTeam,
    Column::HomeFtGoals,
    Column::AwayFtGoals,
    Column::FtGoals,
];

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Today => "today",
            TableKind::AlertsLog => "alerts_log",
            TableKind::Results => "results",
            TableKind::FinalDb => "final_db",
        }
    }

    /// Persisted columns in write order.
    pub fn columns(self) -> &'static [Column] {
        match self {
            TableKind::Today => TODAY_COLUMNS,
            TableKind::AlertsLog => ALERTS_COLUMNS,
            TableKind::Results => RESULTS_COLUMNS,
            TableKind::FinalDb => FINAL_COLUMNS,
        }
    }

    /// Columns a file must carry to be usable at all.
    pub fn key_columns(self) -> &'static [Column] {
        match self {
            TableKind::Today => &[Column::Date, Column::Title],
            TableKind::AlertsLog | TableKind::FinalDb => &[Column::Title],
            TableKind::Results => &[Column::HomeTeam, Column::AwayTeam],
        }
    }

    pub fn header(self, column: Column) -> &'static str {
        match (self, column) {
            (TableKind::Results, Column::HomeTeam) => "home_team",
            (TableKind::Results, Column::AwayTeam) => "away_team",
            _ => column.header(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("table file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("{table} table {} has no `{column}` column", .path.display())]
    MissingColumn {
        table: &'static str,
        path: PathBuf,
        column: &'static str,
    },
    #[error("csv error on {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fully loaded table contents plus the cells that had to be blanked on the way in.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub rows: Vec<TableRow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One table file on disk. Loaded whole, rewritten whole.
#[derive(Debug, Clone)]
pub struct TableFile {
    kind: TableKind,
    path: PathBuf,
}

impl TableFile {
    pub fn new(kind: TableKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Table, StorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(StorageError::Io {
                    action: "opening",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(BufReader::new(file));
        let headers = reader.headers().map_err(|source| self.csv_error(source))?.clone();
        if headers.is_empty() {
            return Ok(Table::default());
        }

        let columns: Vec<Option<Column>> = headers.iter().map(Column::from_header).collect();
        for required in self.kind.key_columns() {
            if !columns.contains(&Some(*required)) {
                return Err(StorageError::MissingColumn {
                    table: self.kind.name(),
                    path: self.path.clone(),
                    column: self.kind.header(*required),
                });
            }
        }

        let mut table = Table::default();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|source| self.csv_error(source))?;
            let mut row = TableRow::default();
            for (column, raw) in columns.iter().zip(record.iter()) {
                let Some(column) = column else {
                    continue;
                };
                match Cell::parse(*column, raw) {
                    Ok(cell) => row.set(*column, &cell),
                    Err(diagnostic) => {
                        warn!(
                            table = self.kind.name(),
                            row = index + 1,
                            %diagnostic,
                            "unparseable cell stored blank"
                        );
                        table.diagnostics.push(diagnostic);
                    }
                }
            }
            table.rows.push(row);
        }

        debug!(
            table = self.kind.name(),
            path = %self.path.display(),
            rows = table.rows.len(),
            "loaded table"
        );
        Ok(table)
    }

    /// Like [`TableFile::load`], but an absent file is an empty table carrying a
    /// `NotFound` diagnostic.
    pub fn load_or_empty(&self) -> Result<Table, StorageError> {
        match self.load() {
            Err(StorageError::NotFound(path)) => {
                let diagnostic = Diagnostic::NotFound {
                    path: path.display().to_string(),
                };
                info!(table = self.kind.name(), %diagnostic);
                Ok(Table {
                    rows: Vec::new(),
                    diagnostics: vec![diagnostic],
                })
            }
            other => other,
        }
    }

    /// Replace the file with `rows` using the table's fixed column order.
    pub fn save(&self, rows: &[TableRow]) -> Result<(), StorageError> {
        let bytes = self.render(rows)?;
        write_atomically(&self.path, &bytes)?;
        info!(
            table = self.kind.name(),
            path = %self.path.display(),
            rows = rows.len(),
            "saved table"
        );
        Ok(())
    }

    pub fn render(&self, rows: &[TableRow]) -> Result<Vec<u8>, StorageError> {
        let columns = self.kind.columns();
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(columns.iter().map(|c| self.kind.header(*c)))
            .map_err(|source| self.csv_error(source))?;
        for row in rows {
            writer
                .write_record(columns.iter().map(|c| row.get(*c).to_string()))
                .map_err(|source| self.csv_error(source))?;
        }
        writer.into_inner().map_err(|err| StorageError::Io {
            action: "buffering",
            path: self.path.clone(),
            source: err.into_error(),
        })
    }

    fn csv_error(&self, source: csv::Error) -> StorageError {
        StorageError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

/// Write through a uniquely named sibling temp file and rename it over `path`, so a
/// failed write never leaves a truncated table behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|source| StorageError::Io {
        action: "creating directory",
        path: parent.clone(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    if let Err(source) = write_temp_file(&temp_path, bytes) {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::Io {
            action: "writing temp file",
            path: temp_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::Io {
            action: "replacing",
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn write_temp_file(temp_path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchlog_core::{Odds, Score};
    use tempfile::tempdir;

    fn alert_row(title: &str) -> TableRow {
        let (home, away) = title.split_once(" vs ").expect("title");
        TableRow {
            date: Some("01-01-25".into()),
            log_time: Some("15:47".into()),
            tournament: Some("Premier League".into()),
            title: title.into(),
            home_team: home.into(),
            away_team: away.into(),
            odds: Odds {
                home: Some(1.85),
                draw: Some(3.4),
                away: None,
            },
            halftime: Score::new(0, 1),
            ht_goals: Some(1),
            ..Default::default()
        }
    }

    fn temp_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn missing_file_is_not_found_and_load_or_empty_degrades() {
        let dir = tempdir().expect("tempdir");
        let table = TableFile::new(TableKind::AlertsLog, dir.path().join("alerts_log.csv"));

        assert!(matches!(table.load(), Err(StorageError::NotFound(_))));

        let loaded = table.load_or_empty().expect("load_or_empty");
        assert!(loaded.is_empty());
        assert!(matches!(
            loaded.diagnostics.as_slice(),
            [Diagnostic::NotFound { .. }]
        ));
    }

    #[test]
    fn saved_alerts_log_loads_back_with_fixed_header() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("alerts_log.csv");
        let table = TableFile::new(TableKind::AlertsLog, &path);
        let rows = vec![alert_row("Alpha vs Beta"), alert_row("Gamma vs Delta")];

        table.save(&rows).expect("save");

        let text = fs::read_to_string(&path).expect("read");
        let header = text.lines().next().expect("header");
        assert_eq!(
            header,
            "date,log_time,tournament,title,home-team,away-team,pre-match_odds_home,\
             pre-match_odds_draw,pre-match_odds_away,home_ht_goals,away_ht_goals,ht_goals"
        );
        assert!(text.contains("01-01-25,15:47,Premier League,Alpha vs Beta,Alpha,Beta,1.85,3.4,,0,1,1"));

        let loaded = table.load().expect("load");
        assert_eq!(loaded.rows, rows);
        assert!(loaded.diagnostics.is_empty());
        assert!(temp_entries(path.parent().expect("parent")).is_empty());
    }

    #[test]
    fn malformed_numbers_load_blank_and_rows_are_kept() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("today.csv");
        fs::write(
            &path,
            "date,time,title,tournament,game-id,home-team,away-team,pre-match_odds_home,pre-match_odds_draw,pre-match_odds_away\n\
             01-01-25,18:00,A vs B,Cup,12345,A,B,2.10,-,N/A\n",
        )
        .expect("write");

        let loaded = TableFile::new(TableKind::Today, &path).load().expect("load");
        assert_eq!(loaded.len(), 1);
        let row = &loaded.rows[0];
        assert_eq!(row.odds.home, Some(2.1));
        assert_eq!(row.odds.draw, None);
        assert_eq!(row.odds.away, None);
        assert_eq!(row.game_id.as_deref(), Some("12345"));
        assert_eq!(loaded.diagnostics.len(), 2);
    }

    #[test]
    fn results_table_uses_underscored_team_headers_and_accepts_short_rows() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "tournament,home_team,away_team,home_ft_goals,away_ft_goals,ft_goals,extra\n\
             League,A,B,2.0,1,3,ignored\n\
             League,C,D\n",
        )
        .expect("write");
        let table = TableFile::new(TableKind::Results, &path);

        let loaded = table.load().expect("load");
        assert_eq!(loaded.rows[0].fulltime, Score::new(2, 1));
        assert_eq!(loaded.rows[0].ft_goals, Some(3));
        assert_eq!(loaded.rows[1].home_team, "C");
        assert_eq!(loaded.rows[1].ft_goals, None);

        let rendered = String::from_utf8(table.render(&loaded.rows).expect("render")).expect("utf8");
        assert!(rendered.starts_with("tournament,home_team,away_team,"));
    }

    #[test]
    fn table_without_key_column_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("alerts_log.csv");
        fs::write(&path, "date,home-team,away-team\n01-01-25,A,B\n").expect("write");

        let err = TableFile::new(TableKind::AlertsLog, &path)
            .load()
            .expect_err("missing title");
        assert!(matches!(
            err,
            StorageError::MissingColumn { column: "title", .. }
        ));
    }

    #[test]
    fn failed_replace_leaves_no_temp_file_behind() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("final_db.csv");
        fs::create_dir(&target).expect("dir in the way");
        fs::write(target.join("keep.txt"), "prior").expect("write");

        let err = TableFile::new(TableKind::FinalDb, &target)
            .save(&[alert_row("Alpha vs Beta")])
            .expect_err("rename over non-empty dir fails");

        assert!(matches!(err, StorageError::Io { action: "replacing", .. }));
        assert!(temp_entries(dir.path()).is_empty());
        assert_eq!(
            fs::read_to_string(target.join("keep.txt")).expect("read"),
            "prior"
        );
    }
}
