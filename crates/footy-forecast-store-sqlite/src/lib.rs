#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

mod demo;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use footy_forecast_core::{
    forecast_from_source, format_rfc3339, now_utc, parse_rfc3339_utc, Confidence, Factor, Fixture,
    Forecast, ForecastDataSource, ForecastError, HistoricalMatch, LeagueId, MatchResult,
    ResultStatus, ScoringRules, Side, StandingRow, TeamId,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use ulid::Ulid;

const FORECAST_MIGRATION_VERSION: i64 = 1;
const RECOMPUTE_CONTRACT_VERSION: &str = "forecast_recompute.v1";

const SCHEMA_FORECAST_V1: &str = r"
CREATE TABLE IF NOT EXISTS leagues (
  league_id INTEGER PRIMARY KEY AUTOINCREMENT,
  code TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  country TEXT NOT NULL DEFAULT '',
  is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1))
);

CREATE TABLE IF NOT EXISTS teams (
  team_id INTEGER PRIMARY KEY AUTOINCREMENT,
  league_id INTEGER NOT NULL REFERENCES leagues(league_id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  UNIQUE(name, league_id)
);

CREATE TABLE IF NOT EXISTS matches (
  match_row_id INTEGER PRIMARY KEY AUTOINCREMENT,
  match_id TEXT NOT NULL UNIQUE,
  season TEXT NOT NULL,
  league_id INTEGER NOT NULL REFERENCES leagues(league_id) ON DELETE CASCADE,
  kickoff_unix INTEGER NOT NULL,
  round TEXT NOT NULL DEFAULT '',
  home_team_id INTEGER NOT NULL REFERENCES teams(team_id) ON DELETE CASCADE,
  away_team_id INTEGER NOT NULL REFERENCES teams(team_id) ON DELETE CASCADE,
  CHECK (home_team_id <> away_team_id)
);

CREATE INDEX IF NOT EXISTS idx_matches_kickoff
  ON matches(kickoff_unix);
CREATE INDEX IF NOT EXISTS idx_matches_home_kickoff
  ON matches(home_team_id, kickoff_unix DESC);
CREATE INDEX IF NOT EXISTS idx_matches_away_kickoff
  ON matches(away_team_id, kickoff_unix DESC);

CREATE TABLE IF NOT EXISTS results (
  match_id TEXT PRIMARY KEY REFERENCES matches(match_id) ON DELETE CASCADE,
  home_goals INTEGER NOT NULL CHECK (home_goals >= 0),
  away_goals INTEGER NOT NULL CHECK (away_goals >= 0),
  status TEXT NOT NULL CHECK (status IN ('finished', 'postponed'))
);

CREATE TABLE IF NOT EXISTS standings (
  league_id INTEGER NOT NULL REFERENCES leagues(league_id) ON DELETE CASCADE,
  team_id INTEGER NOT NULL REFERENCES teams(team_id) ON DELETE CASCADE,
  played INTEGER NOT NULL DEFAULT 0 CHECK (played >= 0),
  won INTEGER NOT NULL DEFAULT 0 CHECK (won >= 0),
  drawn INTEGER NOT NULL DEFAULT 0 CHECK (drawn >= 0),
  lost INTEGER NOT NULL DEFAULT 0 CHECK (lost >= 0),
  goals_for INTEGER NOT NULL DEFAULT 0 CHECK (goals_for >= 0),
  goals_against INTEGER NOT NULL DEFAULT 0 CHECK (goals_against >= 0),
  points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
  PRIMARY KEY (league_id, team_id)
);

CREATE TABLE IF NOT EXISTS forecasts (
  match_id TEXT PRIMARY KEY REFERENCES matches(match_id) ON DELETE CASCADE,
  prob_home REAL NOT NULL CHECK (prob_home BETWEEN 0.0 AND 1.0),
  prob_draw REAL NOT NULL CHECK (prob_draw BETWEEN 0.0 AND 1.0),
  prob_away REAL NOT NULL CHECK (prob_away BETWEEN 0.0 AND 1.0),
  confidence TEXT NOT NULL CHECK (confidence IN ('low', 'medium', 'high')),
  explain_json TEXT NOT NULL DEFAULT '[]',
  rules_version INTEGER NOT NULL CHECK (rules_version >= 1),
  recalculated_at TEXT NOT NULL
);
";

pub struct SqliteForecastStore {
    conn: Connection,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewMatch {
    pub match_id: String,
    pub season: String,
    pub league_id: LeagueId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub kickoff: OffsetDateTime,
    pub round: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeSelection {
    Single(String),
    All,
}

/// What a bulk recompute does when one match fails.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    FailFast,
    SkipAndLog,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RecomputeFailure {
    pub match_id: String,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RecomputeReport {
    pub contract_version: String,
    pub run_id: Ulid,
    pub rules_version: u32,
    pub policy: BatchPolicy,
    pub recomputed: usize,
    pub failures: Vec<RecomputeFailure>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SeedReport {
    pub season: String,
    pub leagues_created: usize,
    pub teams_created: usize,
    pub standings_created: usize,
}

impl SqliteForecastStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_FORECAST_V1)
            .context("failed to apply forecast schema")?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![FORECAST_MIGRATION_VERSION, now],
            )
            .context("failed to register forecast schema migration")?;

        Ok(())
    }

    pub fn upsert_league(&self, code: &str, name: &str, country: &str) -> Result<LeagueId> {
        if code.trim().is_empty() {
            return Err(anyhow!("league code MUST be provided"));
        }

        self.conn
            .execute(
                "INSERT INTO leagues(code, name, country, is_active)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(code) DO UPDATE SET
                   name = excluded.name,
                   country = excluded.country",
                params![code, name, country],
            )
            .context("failed to upsert league")?;

        self.league_id_by_code(code)?
            .ok_or_else(|| anyhow!("league {code} missing after upsert"))
    }

    pub fn league_id_by_code(&self, code: &str) -> Result<Option<LeagueId>> {
        let id = self
            .conn
            .query_row(
                "SELECT league_id FROM leagues WHERE code = ?1",
                params![code],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .context("failed to query league by code")?;
        Ok(id.map(LeagueId))
    }

    pub fn upsert_team(&self, league_id: LeagueId, name: &str) -> Result<TeamId> {
        if name.trim().is_empty() {
            return Err(anyhow!("team name MUST be provided"));
        }

        self.conn
            .execute(
                "INSERT OR IGNORE INTO teams(league_id, name) VALUES (?1, ?2)",
                params![league_id.0, name],
            )
            .with_context(|| format!("failed to upsert team {name} in league {league_id}"))?;

        self.team_id_by_name(league_id, name)?
            .ok_or_else(|| anyhow!("team {name} missing after upsert"))
    }

    pub fn team_id_by_name(&self, league_id: LeagueId, name: &str) -> Result<Option<TeamId>> {
        let id = self
            .conn
            .query_row(
                "SELECT team_id FROM teams WHERE league_id = ?1 AND name = ?2",
                params![league_id.0, name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .context("failed to query team by name")?;
        Ok(id.map(TeamId))
    }

    pub fn upsert_match(&self, input: &NewMatch) -> Result<()> {
        if input.match_id.trim().is_empty() {
            return Err(anyhow!("match_id MUST be provided"));
        }
        if input.home_team_id == input.away_team_id {
            return Err(anyhow!(
                "match {} cannot use team {} on both sides",
                input.match_id,
                input.home_team_id
            ));
        }

        self.conn
            .execute(
                "INSERT INTO matches(
                    match_id, season, league_id, kickoff_unix, round, home_team_id, away_team_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(match_id) DO UPDATE SET
                    season = excluded.season,
                    league_id = excluded.league_id,
                    kickoff_unix = excluded.kickoff_unix,
                    round = excluded.round,
                    home_team_id = excluded.home_team_id,
                    away_team_id = excluded.away_team_id",
                params![
                    input.match_id,
                    input.season,
                    input.league_id.0,
                    input.kickoff.unix_timestamp(),
                    input.round,
                    input.home_team_id.0,
                    input.away_team_id.0,
                ],
            )
            .with_context(|| format!("failed to upsert match {}", input.match_id))?;

        Ok(())
    }

    pub fn upsert_result(&self, match_id: &str, result: &MatchResult) -> Result<()> {
        if !self.match_exists(match_id)? {
            return Err(anyhow!("match not found: {match_id}"));
        }

        self.conn
            .execute(
                "INSERT INTO results(match_id, home_goals, away_goals, status)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(match_id) DO UPDATE SET
                    home_goals = excluded.home_goals,
                    away_goals = excluded.away_goals,
                    status = excluded.status",
                params![
                    match_id,
                    result.home_goals,
                    result.away_goals,
                    result.status.as_str(),
                ],
            )
            .with_context(|| format!("failed to upsert result for match {match_id}"))?;

        Ok(())
    }

    pub fn upsert_standing(&self, row: &StandingRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO standings(
                    league_id, team_id, played, won, drawn, lost, goals_for, goals_against, points
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(league_id, team_id) DO UPDATE SET
                    played = excluded.played,
                    won = excluded.won,
                    drawn = excluded.drawn,
                    lost = excluded.lost,
                    goals_for = excluded.goals_for,
                    goals_against = excluded.goals_against,
                    points = excluded.points",
                params![
                    row.league_id.0,
                    row.team_id.0,
                    row.played,
                    row.won,
                    row.drawn,
                    row.lost,
                    row.goals_for,
                    row.goals_against,
                    row.points,
                ],
            )
            .with_context(|| {
                format!(
                    "failed to upsert standing for team {} in league {}",
                    row.team_id, row.league_id
                )
            })?;

        Ok(())
    }

    pub fn get_fixture(&self, match_id: &str) -> Result<Option<Fixture>> {
        let fixture = self
            .conn
            .query_row(
                "SELECT match_id, league_id, home_team_id, away_team_id, kickoff_unix
                 FROM matches
                 WHERE match_id = ?1",
                params![match_id],
                parse_fixture_row,
            )
            .optional()
            .with_context(|| format!("failed to load match {match_id}"))?;
        Ok(fixture)
    }

    /// All known match ids in kickoff order.
    pub fn list_match_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT match_id FROM matches ORDER BY kickoff_unix ASC, match_row_id ASC")
            .context("failed to prepare match id query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query match ids")?;
        collect_rows(rows).context("failed to load match ids")
    }

    pub fn get_standing(
        &self,
        league_id: LeagueId,
        team_id: TeamId,
    ) -> Result<Option<StandingRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT league_id, team_id, points, played, won, drawn, lost, goals_for, goals_against
                 FROM standings
                 WHERE league_id = ?1 AND team_id = ?2",
                params![league_id.0, team_id.0],
                parse_standing_row,
            )
            .optional()
            .with_context(|| format!("failed to load standing for team {team_id}"))?;
        Ok(row)
    }

    /// Most recent fixtures where `team_id` played on `side`, newest first,
    /// each joined with its result when one is recorded.
    pub fn list_recent_fixtures(
        &self,
        team_id: TeamId,
        side: Side,
        limit: usize,
    ) -> Result<Vec<HistoricalMatch>> {
        let column = match side {
            Side::Home => "home_team_id",
            Side::Away => "away_team_id",
        };
        let limit = i64::try_from(limit).with_context(|| format!("invalid limit: {limit}"))?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT m.match_id, m.home_team_id, m.away_team_id, m.kickoff_unix,
                        r.home_goals, r.away_goals, r.status
                 FROM matches m
                 LEFT JOIN results r ON r.match_id = m.match_id
                 WHERE m.{column} = ?1
                 ORDER BY m.kickoff_unix DESC, m.match_row_id DESC
                 LIMIT ?2"
            ))
            .context("failed to prepare recent fixtures query")?;
        let rows = stmt
            .query_map(params![team_id.0, limit], parse_history_row)
            .with_context(|| format!("failed to query recent fixtures for team {team_id}"))?;
        collect_rows(rows).with_context(|| {
            format!(
                "failed to load recent {} fixtures for team {team_id}",
                side.as_str()
            )
        })
    }

    pub fn upsert_forecast(&mut self, forecast: &Forecast, rules_version: u32) -> Result<()> {
        let explain =
            serde_json::to_string(&forecast.factors).context("failed to serialize factors")?;
        let recalculated_at = format_rfc3339(forecast.recalculated_at)?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start forecast transaction")?;

        tx.execute(
            "INSERT INTO forecasts(
                match_id, prob_home, prob_draw, prob_away, confidence,
                explain_json, rules_version, recalculated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(match_id) DO UPDATE SET
                prob_home = excluded.prob_home,
                prob_draw = excluded.prob_draw,
                prob_away = excluded.prob_away,
                confidence = excluded.confidence,
                explain_json = excluded.explain_json,
                rules_version = excluded.rules_version,
                recalculated_at = excluded.recalculated_at",
            params![
                forecast.match_id,
                forecast.prob_home,
                forecast.prob_draw,
                forecast.prob_away,
                forecast.confidence.as_str(),
                explain,
                i64::from(rules_version),
                recalculated_at,
            ],
        )
        .with_context(|| format!("failed to upsert forecast for match {}", forecast.match_id))?;

        tx.commit().context("failed to commit forecast transaction")?;
        Ok(())
    }

    pub fn get_forecast(&self, match_id: &str) -> Result<Option<Forecast>> {
        let forecast = self
            .conn
            .query_row(
                "SELECT match_id, prob_home, prob_draw, prob_away, confidence,
                        explain_json, recalculated_at
                 FROM forecasts
                 WHERE match_id = ?1",
                params![match_id],
                parse_forecast_row,
            )
            .optional()
            .with_context(|| format!("failed to load forecast for match {match_id}"))?;
        Ok(forecast)
    }

    /// Stored forecasts ordered by the kickoff of their match.
    pub fn list_forecasts(&self) -> Result<Vec<Forecast>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT f.match_id, f.prob_home, f.prob_draw, f.prob_away, f.confidence,
                        f.explain_json, f.recalculated_at
                 FROM forecasts f
                 JOIN matches m ON m.match_id = f.match_id
                 ORDER BY m.kickoff_unix ASC, m.match_row_id ASC",
            )
            .context("failed to prepare forecast list query")?;
        let rows = stmt
            .query_map([], parse_forecast_row)
            .context("failed to query forecasts")?;
        collect_rows(rows).context("failed to load forecasts")
    }

    /// Computes and stores the forecast for one match.
    ///
    /// An unknown `match_id` is an error and leaves every stored forecast
    /// untouched.
    pub fn recompute_forecast(&mut self, match_id: &str, rules: &ScoringRules) -> Result<Forecast> {
        rules.validate().context("invalid scoring rules")?;

        let fixture = self
            .get_fixture(match_id)?
            .ok_or_else(|| anyhow!("match not found: {match_id}"))?;

        let result = forecast_from_source(&*self, &fixture, rules)
            .with_context(|| format!("failed to load forecast inputs for match {match_id}"))?;
        let forecast = Forecast::from_result(&fixture.match_id, result, now_utc());
        self.upsert_forecast(&forecast, rules.rules_version)?;

        debug!(
            match_id = %forecast.match_id,
            prob_home = forecast.prob_home,
            prob_draw = forecast.prob_draw,
            prob_away = forecast.prob_away,
            confidence = forecast.confidence.as_str(),
            "forecast recomputed"
        );

        Ok(forecast)
    }

    pub fn recompute_all(
        &mut self,
        rules: &ScoringRules,
        policy: BatchPolicy,
    ) -> Result<RecomputeReport> {
        rules.validate().context("invalid scoring rules")?;

        let run_id = Ulid::new();
        let match_ids = self.list_match_ids()?;
        info!(%run_id, matches = match_ids.len(), ?policy, "forecast recompute started");

        let mut report = RecomputeReport {
            contract_version: RECOMPUTE_CONTRACT_VERSION.to_string(),
            run_id,
            rules_version: rules.rules_version,
            policy,
            recomputed: 0,
            failures: Vec::new(),
        };

        for match_id in match_ids {
            match self.recompute_forecast(&match_id, rules) {
                Ok(_) => report.recomputed += 1,
                Err(err) => match policy {
                    BatchPolicy::FailFast => {
                        return Err(err.context(format!(
                            "forecast recompute aborted at match {match_id} after {} forecasts",
                            report.recomputed
                        )));
                    }
                    BatchPolicy::SkipAndLog => {
                        let message = format!("{err:#}");
                        warn!(%run_id, match_id = %match_id, error = %message, "skipping match");
                        report.failures.push(RecomputeFailure { match_id, message });
                    }
                },
            }
        }

        info!(
            %run_id,
            recomputed = report.recomputed,
            failed = report.failures.len(),
            "forecast recompute finished"
        );
        Ok(report)
    }

    pub fn recompute(
        &mut self,
        selection: &RecomputeSelection,
        rules: &ScoringRules,
        policy: BatchPolicy,
    ) -> Result<RecomputeReport> {
        match selection {
            RecomputeSelection::All => self.recompute_all(rules, policy),
            RecomputeSelection::Single(match_id) => {
                self.recompute_forecast(match_id, rules)?;
                Ok(RecomputeReport {
                    contract_version: RECOMPUTE_CONTRACT_VERSION.to_string(),
                    run_id: Ulid::new(),
                    rules_version: rules.rules_version,
                    policy,
                    recomputed: 1,
                    failures: Vec::new(),
                })
            }
        }
    }

    /// Seeds demo leagues, their teams, and an empty standing row per team.
    /// Existing rows are left as they are.
    pub fn seed_demo(&mut self, season: &str) -> Result<SeedReport> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start seed transaction")?;

        let mut report = SeedReport {
            season: season.to_string(),
            leagues_created: 0,
            teams_created: 0,
            standings_created: 0,
        };

        for league in demo::DEMO_LEAGUES {
            report.leagues_created += tx
                .execute(
                    "INSERT OR IGNORE INTO leagues(code, name, country, is_active)
                     VALUES (?1, ?2, ?3, 1)",
                    params![league.code, league.name, league.country],
                )
                .with_context(|| format!("failed to seed league {}", league.code))?;
            let league_id: i64 = tx
                .query_row(
                    "SELECT league_id FROM leagues WHERE code = ?1",
                    params![league.code],
                    |row| row.get(0),
                )
                .with_context(|| format!("failed to resolve seeded league {}", league.code))?;

            for team in league.teams {
                report.teams_created += tx
                    .execute(
                        "INSERT OR IGNORE INTO teams(league_id, name) VALUES (?1, ?2)",
                        params![league_id, team],
                    )
                    .with_context(|| format!("failed to seed team {team}"))?;
                let team_id: i64 = tx
                    .query_row(
                        "SELECT team_id FROM teams WHERE league_id = ?1 AND name = ?2",
                        params![league_id, team],
                        |row| row.get(0),
                    )
                    .with_context(|| format!("failed to resolve seeded team {team}"))?;
                report.standings_created += tx
                    .execute(
                        "INSERT OR IGNORE INTO standings(league_id, team_id) VALUES (?1, ?2)",
                        params![league_id, team_id],
                    )
                    .with_context(|| format!("failed to seed standing for {team}"))?;
            }
        }

        tx.commit().context("failed to commit seed transaction")?;
        info!(
            season,
            leagues = report.leagues_created,
            teams = report.teams_created,
            standings = report.standings_created,
            "demo data seeded"
        );
        Ok(report)
    }

    fn match_exists(&self, match_id: &str) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM matches WHERE match_id = ?1 LIMIT 1",
                params![match_id],
                |_| Ok(()),
            )
            .optional()
            .context("failed to check match existence")?
            .is_some();
        Ok(exists)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ForecastDataSource for SqliteForecastStore {
    type Error = anyhow::Error;

    fn standing(&self, league_id: LeagueId, team_id: TeamId) -> Result<Option<StandingRow>> {
        self.get_standing(league_id, team_id)
    }

    fn recent_fixtures(
        &self,
        team_id: TeamId,
        side: Side,
        limit: usize,
    ) -> Result<Vec<HistoricalMatch>> {
        self.list_recent_fixtures(team_id, side, limit)
    }
}

fn parse_fixture_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fixture> {
    Ok(Fixture {
        match_id: row.get(0)?,
        league_id: LeagueId(row.get(1)?),
        home_team_id: TeamId(row.get(2)?),
        away_team_id: TeamId(row.get(3)?),
        kickoff: parse_kickoff(4, row.get(4)?)?,
    })
}

fn parse_history_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoricalMatch> {
    let home_goals: Option<u32> = row.get(4)?;
    let away_goals: Option<u32> = row.get(5)?;
    let status_raw: Option<String> = row.get(6)?;

    let result = match (home_goals, away_goals, status_raw) {
        (Some(home_goals), Some(away_goals), Some(status_raw)) => {
            let status = ResultStatus::parse(&status_raw).ok_or_else(|| {
                invalid_data(6, Type::Text, format!("invalid result status: {status_raw}"))
            })?;
            Some(MatchResult {
                home_goals,
                away_goals,
                status,
            })
        }
        _ => None,
    };

    Ok(HistoricalMatch {
        match_id: row.get(0)?,
        home_team_id: TeamId(row.get(1)?),
        away_team_id: TeamId(row.get(2)?),
        kickoff: parse_kickoff(3, row.get(3)?)?,
        result,
    })
}

fn parse_standing_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StandingRow> {
    Ok(StandingRow {
        league_id: LeagueId(row.get(0)?),
        team_id: TeamId(row.get(1)?),
        points: row.get(2)?,
        played: row.get(3)?,
        won: row.get(4)?,
        drawn: row.get(5)?,
        lost: row.get(6)?,
        goals_for: row.get(7)?,
        goals_against: row.get(8)?,
    })
}

fn parse_forecast_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Forecast> {
    let confidence_raw: String = row.get(4)?;
    let explain_raw: String = row.get(5)?;

    let confidence = Confidence::parse(&confidence_raw).ok_or_else(|| {
        invalid_data(4, Type::Text, format!("invalid confidence: {confidence_raw}"))
    })?;
    let factors: Vec<Factor> = serde_json::from_str(&explain_raw)
        .map_err(|err| invalid_data(5, Type::Text, format!("invalid explain_json: {err}")))?;

    Ok(Forecast {
        match_id: row.get(0)?,
        prob_home: row.get(1)?,
        prob_draw: row.get(2)?,
        prob_away: row.get(3)?,
        confidence,
        factors,
        recalculated_at: parse_rfc3339_utc(&row.get::<_, String>(6)?).map_err(to_sql_error)?,
    })
}

fn parse_kickoff(column: usize, raw: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(raw).map_err(|err| {
        invalid_data(
            column,
            Type::Integer,
            format!("invalid kickoff timestamp {raw}: {err}"),
        )
    })
}

fn invalid_data(column: usize, kind: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        kind,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn to_sql_error(err: ForecastError) -> rusqlite::Error {
    invalid_data(0, Type::Text, err.to_string())
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::too_many_lines)]

    use super::*;
    use footy_forecast_core::{compute_forecast, ForecastInputs};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn must_utc(value: &str) -> OffsetDateTime {
        match parse_rfc3339_utc(value) {
            Ok(parsed) => parsed,
            Err(err) => panic!("invalid fixture timestamp: {err}"),
        }
    }

    fn fixture_store() -> SqliteForecastStore {
        let store = must(SqliteForecastStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    struct League {
        id: LeagueId,
        teams: Vec<TeamId>,
    }

    fn seed_league(store: &SqliteForecastStore, names: &[&str]) -> League {
        let id = must(store.upsert_league("TST", "Test League", "Testland"));
        let teams = names
            .iter()
            .map(|name| must(store.upsert_team(id, name)))
            .collect();
        League { id, teams }
    }

    fn add_match(
        store: &SqliteForecastStore,
        league: LeagueId,
        match_id: &str,
        home: TeamId,
        away: TeamId,
        kickoff: &str,
    ) {
        must(store.upsert_match(&NewMatch {
            match_id: match_id.to_string(),
            season: "2025/26".to_string(),
            league_id: league,
            home_team_id: home,
            away_team_id: away,
            kickoff: must_utc(kickoff),
            round: String::new(),
        }));
    }

    fn finished(home_goals: u32, away_goals: u32) -> MatchResult {
        MatchResult {
            home_goals,
            away_goals,
            status: ResultStatus::Finished,
        }
    }

    fn table_row(league: LeagueId, team: TeamId, points: u32, played: u32) -> StandingRow {
        StandingRow {
            league_id: league,
            team_id: team,
            points,
            played,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
        }
    }

    fn count_rows(store: &SqliteForecastStore, table: &str) -> i64 {
        match store.connection().query_row(
            &format!("SELECT COUNT(*) FROM {table}"),
            [],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(value) => value,
            Err(err) => panic!("failed to count {table}: {err}"),
        }
    }

    #[test]
    fn recompute_stores_table_and_form_forecast() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        let (home, away) = (league.teams[0], league.teams[1]);
        add_match(&store, league.id, "m-1", home, away, "2026-03-01T15:00:00Z");
        must(store.upsert_standing(&table_row(league.id, home, 20, 10)));
        must(store.upsert_standing(&table_row(league.id, away, 10, 10)));

        let forecast = must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        assert_eq!(forecast.prob_home, 0.4865);
        assert_eq!(forecast.prob_draw, 0.1351);
        assert_eq!(forecast.prob_away, 0.3784);
        assert_eq!(forecast.confidence, Confidence::Medium);

        let stored = must_some(must(store.get_forecast("m-1")));
        assert_eq!(stored, forecast);
        assert_eq!(stored.factors[0].name, "table_position");
        assert_eq!(stored.factors[1].name, "recent_form");
    }

    #[test]
    fn recompute_replaces_previous_forecast_in_place() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC", "Third FC"]);
        let (home, away, third) = (league.teams[0], league.teams[1], league.teams[2]);
        add_match(&store, league.id, "m-old", home, third, "2026-02-01T15:00:00Z");
        add_match(&store, league.id, "m-1", home, away, "2026-03-01T15:00:00Z");

        let first = must(store.recompute_forecast("m-1", &ScoringRules::v1()));
        must(store.upsert_result("m-old", &finished(3, 0)));
        let second = must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        assert!(second.prob_home > first.prob_home);
        assert_eq!(second.factors[0].detail, "gd_home=3.00, gd_away=0.00");
        assert_eq!(count_rows(&store, "forecasts"), 1);
        assert_eq!(must_some(must(store.get_forecast("m-1"))), second);
    }

    #[test]
    fn unknown_match_fails_without_touching_forecasts() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        add_match(
            &store,
            league.id,
            "m-1",
            league.teams[0],
            league.teams[1],
            "2026-03-01T15:00:00Z",
        );
        let existing = must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        let err = match store.recompute_forecast("missing", &ScoringRules::v1()) {
            Ok(_) => panic!("expected unknown match to fail"),
            Err(err) => err,
        };

        assert!(err.to_string().contains("match not found: missing"));
        assert_eq!(count_rows(&store, "forecasts"), 1);
        assert_eq!(must_some(must(store.get_forecast("m-1"))), existing);

        let single = store.recompute(
            &RecomputeSelection::Single("missing".to_string()),
            &ScoringRules::v1(),
            BatchPolicy::SkipAndLog,
        );
        assert!(single.is_err());
    }

    #[test]
    fn recent_fixtures_filter_by_side_and_order_newest_first() {
        let store = fixture_store();
        let league = seed_league(&store, &["A", "B", "C"]);
        let (a, b, c) = (league.teams[0], league.teams[1], league.teams[2]);

        for day in 1..=7 {
            add_match(
                &store,
                league.id,
                &format!("a-home-{day}"),
                a,
                if day % 2 == 0 { b } else { c },
                &format!("2026-01-{day:02}T15:00:00Z"),
            );
        }
        add_match(&store, league.id, "a-away-1", b, a, "2026-01-20T15:00:00Z");
        must(store.upsert_result("a-home-7", &finished(2, 2)));

        let recent = must(store.list_recent_fixtures(a, Side::Home, 5));
        let ids = recent
            .iter()
            .map(|fixture| fixture.match_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["a-home-7", "a-home-6", "a-home-5", "a-home-4", "a-home-3"]
        );
        assert_eq!(recent[0].result, Some(finished(2, 2)));
        assert_eq!(recent[1].result, None);

        let away = must(store.list_recent_fixtures(a, Side::Away, 5));
        assert_eq!(away.len(), 1);
        assert_eq!(away[0].match_id, "a-away-1");
        assert_eq!(away[0].away_team_id, a);
    }

    #[test]
    fn missing_and_zero_standings_are_distinct() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        let (home, away) = (league.teams[0], league.teams[1]);
        add_match(&store, league.id, "m-1", home, away, "2026-03-01T15:00:00Z");

        let without_table = must(store.recompute_forecast("m-1", &ScoringRules::v1()));
        assert_eq!(without_table.factors.len(), 1);
        assert_eq!(without_table.prob_draw, 0.2381);

        must(store.upsert_standing(&table_row(league.id, home, 0, 0)));
        must(store.upsert_standing(&table_row(league.id, away, 0, 0)));
        let with_table = must(store.recompute_forecast("m-1", &ScoringRules::v1()));
        assert_eq!(with_table.factors.len(), 2);
        assert_eq!(with_table.prob_draw, 0.1515);
    }

    #[test]
    fn store_lookups_match_in_memory_engine_inputs() {
        let store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC", "Third FC"]);
        let (home, away, third) = (league.teams[0], league.teams[1], league.teams[2]);
        add_match(&store, league.id, "h-1", home, third, "2026-02-01T15:00:00Z");
        add_match(&store, league.id, "a-1", third, away, "2026-02-02T15:00:00Z");
        add_match(&store, league.id, "m-1", home, away, "2026-03-01T15:00:00Z");
        must(store.upsert_result("h-1", &finished(1, 0)));
        must(store.upsert_result("a-1", &finished(1, 1)));
        must(store.upsert_standing(&table_row(league.id, home, 7, 3)));

        let fixture = must_some(must(store.get_fixture("m-1")));
        let inputs = must(footy_forecast_core::load_inputs(
            &store,
            &fixture,
            &ScoringRules::v1(),
        ));

        assert!(inputs.home_standing.is_some());
        assert!(inputs.away_standing.is_none());
        let home_ids = inputs
            .home_recent
            .iter()
            .map(|item| item.match_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(home_ids, vec!["m-1", "h-1"]);
        assert_eq!(inputs.away_recent.len(), 2);
    }

    #[test]
    fn bulk_recompute_respects_failure_policy() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["A", "B", "C", "D"]);
        let (a, b, c, d) = (
            league.teams[0],
            league.teams[1],
            league.teams[2],
            league.teams[3],
        );
        add_match(&store, league.id, "good", c, d, "2026-03-01T15:00:00Z");
        if let Err(err) = store.connection().execute(
            "INSERT INTO matches(match_id, season, league_id, kickoff_unix, round, home_team_id, away_team_id)
             VALUES ('broken', '2025/26', ?1, ?2, '', ?3, ?4)",
            params![league.id.0, i64::MAX, a.0, b.0],
        ) {
            panic!("failed to insert broken match: {err}");
        }

        let err = match store.recompute_all(&ScoringRules::v1(), BatchPolicy::FailFast) {
            Ok(report) => panic!("expected fail-fast error, got {report:?}"),
            Err(err) => err,
        };
        assert!(format!("{err:#}").contains("broken"));

        let report = must(store.recompute_all(&ScoringRules::v1(), BatchPolicy::SkipAndLog));
        assert_eq!(report.recomputed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].match_id, "broken");
        assert_eq!(report.policy, BatchPolicy::SkipAndLog);
        assert!(must(store.get_forecast("good")).is_some());
        assert!(must(store.get_forecast("broken")).is_none());
    }

    #[test]
    fn bulk_recompute_counts_every_match() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["A", "B", "C"]);
        let (a, b, c) = (league.teams[0], league.teams[1], league.teams[2]);
        add_match(&store, league.id, "m-1", a, b, "2026-03-01T15:00:00Z");
        add_match(&store, league.id, "m-2", b, c, "2026-03-02T15:00:00Z");
        add_match(&store, league.id, "m-3", c, a, "2026-03-03T15:00:00Z");

        let report = must(store.recompute(
            &RecomputeSelection::All,
            &ScoringRules::v1(),
            BatchPolicy::FailFast,
        ));

        assert_eq!(report.recomputed, 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.contract_version, "forecast_recompute.v1");
        let listed = must(store.list_forecasts())
            .into_iter()
            .map(|forecast| forecast.match_id)
            .collect::<Vec<_>>();
        assert_eq!(listed, vec!["m-1", "m-2", "m-3"]);
    }

    #[test]
    fn recompute_is_bit_identical_for_unchanged_data() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC", "Third FC"]);
        let (home, away, third) = (league.teams[0], league.teams[1], league.teams[2]);
        add_match(&store, league.id, "h-1", home, third, "2026-02-01T15:00:00Z");
        add_match(&store, league.id, "m-1", home, away, "2026-03-01T15:00:00Z");
        must(store.upsert_result("h-1", &finished(2, 1)));
        must(store.upsert_standing(&table_row(league.id, home, 13, 7)));
        must(store.upsert_standing(&table_row(league.id, away, 9, 7)));

        let first = must(store.recompute_forecast("m-1", &ScoringRules::v1()));
        let second = must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        assert_eq!(first.prob_home.to_bits(), second.prob_home.to_bits());
        assert_eq!(first.prob_draw.to_bits(), second.prob_draw.to_bits());
        assert_eq!(first.prob_away.to_bits(), second.prob_away.to_bits());
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.factors, second.factors);
    }

    #[test]
    fn unreadable_rows_report_which_lookup_failed() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        let (home, away) = (league.teams[0], league.teams[1]);
        add_match(&store, league.id, "m-1", home, away, "2026-03-01T15:00:00Z");
        must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        if let Err(err) = store.connection().execute_batch(
            "UPDATE forecasts SET explain_json = 'not-json' WHERE match_id = 'm-1';
             UPDATE matches SET kickoff_unix = 9223372036854775807 WHERE match_id = 'm-1';",
        ) {
            panic!("failed to corrupt rows: {err}");
        }

        let err = match store.list_forecasts() {
            Ok(rows) => panic!("expected corrupt forecast to fail, got {rows:?}"),
            Err(err) => err,
        };
        let message = format!("{err:#}");
        assert!(message.contains("failed to load forecasts"), "{message}");
        assert!(message.contains("invalid explain_json"), "{message}");

        let err = match store.list_recent_fixtures(home, Side::Home, 5) {
            Ok(rows) => panic!("expected corrupt kickoff to fail, got {rows:?}"),
            Err(err) => err,
        };
        let message = format!("{err:#}");
        assert!(
            message.contains(&format!("failed to load recent home fixtures for team {home}")),
            "{message}"
        );
        assert!(message.contains("invalid kickoff timestamp"), "{message}");
    }

    #[test]
    fn deleting_a_match_cascades_to_its_forecast() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        add_match(
            &store,
            league.id,
            "m-1",
            league.teams[0],
            league.teams[1],
            "2026-03-01T15:00:00Z",
        );
        must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        if let Err(err) = store
            .connection()
            .execute("DELETE FROM matches WHERE match_id = 'm-1'", [])
        {
            panic!("failed to delete match: {err}");
        }

        assert_eq!(count_rows(&store, "forecasts"), 0);
    }

    #[test]
    fn invalid_rules_are_rejected_before_writing() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        add_match(
            &store,
            league.id,
            "m-1",
            league.teams[0],
            league.teams[1],
            "2026-03-01T15:00:00Z",
        );

        let rules = ScoringRules {
            recent_fixture_limit: 0,
            ..ScoringRules::v1()
        };
        assert!(store.recompute_forecast("m-1", &rules).is_err());
        assert_eq!(count_rows(&store, "forecasts"), 0);
    }

    #[test]
    fn results_require_a_known_match() {
        let store = fixture_store();
        let err = match store.upsert_result("ghost", &finished(1, 0)) {
            Ok(()) => panic!("expected missing match error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("match not found: ghost"));
    }

    #[test]
    fn matches_reject_same_team_on_both_sides() {
        let store = fixture_store();
        let league = seed_league(&store, &["Solo FC"]);
        let result = store.upsert_match(&NewMatch {
            match_id: "self".to_string(),
            season: "2025/26".to_string(),
            league_id: league.id,
            home_team_id: league.teams[0],
            away_team_id: league.teams[0],
            kickoff: must_utc("2026-03-01T15:00:00Z"),
            round: String::new(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn seed_demo_is_idempotent() {
        let mut store = fixture_store();

        let first = must(store.seed_demo("2025/26"));
        assert_eq!(first.leagues_created, demo::DEMO_LEAGUES.len());
        assert_eq!(first.teams_created, demo::demo_team_count());
        assert_eq!(first.standings_created, demo::demo_team_count());

        let second = must(store.seed_demo("2025/26"));
        assert_eq!(second.leagues_created, 0);
        assert_eq!(second.teams_created, 0);
        assert_eq!(second.standings_created, 0);

        let epl = must_some(must(store.league_id_by_code("EPL")));
        let arsenal = must_some(must(store.team_id_by_name(epl, "Arsenal")));
        let row = must_some(must(store.get_standing(epl, arsenal)));
        assert_eq!(row.points, 0);
        assert_eq!(row.played, 0);
    }

    #[test]
    fn migration_is_idempotent_and_preserves_existing_data() {
        let mut store = fixture_store();
        let league = seed_league(&store, &["Home FC", "Away FC"]);
        add_match(
            &store,
            league.id,
            "m-1",
            league.teams[0],
            league.teams[1],
            "2026-03-01T15:00:00Z",
        );
        must(store.recompute_forecast("m-1", &ScoringRules::v1()));

        must(store.migrate());
        must(store.migrate());

        assert_eq!(count_rows(&store, "schema_migrations"), 1);
        assert_eq!(count_rows(&store, "forecasts"), 1);
    }

    #[test]
    fn schema_contract_contains_expected_tables() {
        let store = fixture_store();
        let mut stmt = match store
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        {
            Ok(value) => value,
            Err(err) => panic!("failed to prepare schema query: {err}"),
        };
        let names = match stmt.query_map([], |row| row.get::<_, String>(0)) {
            Ok(rows) => must(collect_rows(rows)),
            Err(err) => panic!("failed to query schema: {err}"),
        }
        .into_iter()
        .collect::<BTreeSet<_>>();

        for table in [
            "schema_migrations",
            "leagues",
            "teams",
            "matches",
            "results",
            "standings",
            "forecasts",
        ] {
            assert!(names.contains(table), "missing table {table}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_store_forecast_matches_in_memory_engine(
            home_scores in prop::collection::vec(prop::option::of((0u32..6, 0u32..6)), 0..7),
            away_scores in prop::collection::vec(prop::option::of((0u32..6, 0u32..6)), 0..7),
            table in prop::option::of(((0u32..60, 0u32..20), (0u32..60, 0u32..20))),
        ) {
            let mut store = fixture_store();
            let league = seed_league(&store, &["Home FC", "Away FC", "Rival FC"]);
            let (home, away, rival) = (league.teams[0], league.teams[1], league.teams[2]);

            for (idx, score) in home_scores.iter().enumerate() {
                let id = format!("h-{idx}");
                add_match(&store, league.id, &id, home, rival, &format!("2026-01-{:02}T15:00:00Z", idx + 1));
                if let Some((hg, ag)) = score {
                    must(store.upsert_result(&id, &finished(*hg, *ag)));
                }
            }
            for (idx, score) in away_scores.iter().enumerate() {
                let id = format!("a-{idx}");
                add_match(&store, league.id, &id, rival, away, &format!("2026-02-{:02}T15:00:00Z", idx + 1));
                if let Some((hg, ag)) = score {
                    must(store.upsert_result(&id, &finished(*hg, *ag)));
                }
            }
            if let Some(((hp, hg), (ap, ag))) = table {
                must(store.upsert_standing(&table_row(league.id, home, hp, hg)));
                must(store.upsert_standing(&table_row(league.id, away, ap, ag)));
            }
            add_match(&store, league.id, "target", home, away, "2026-03-01T15:00:00Z");

            let fixture = must_some(must(store.get_fixture("target")));
            let inputs = ForecastInputs {
                home_standing: must(store.get_standing(league.id, home)),
                away_standing: must(store.get_standing(league.id, away)),
                home_recent: must(store.list_recent_fixtures(home, Side::Home, 5)),
                away_recent: must(store.list_recent_fixtures(away, Side::Away, 5)),
            };
            let expected = compute_forecast(&fixture, &inputs);
            let stored = must(store.recompute_forecast("target", &ScoringRules::v1()));

            prop_assert_eq!(stored.prob_home, expected.prob_home);
            prop_assert_eq!(stored.prob_draw, expected.prob_draw);
            prop_assert_eq!(stored.prob_away, expected.prob_away);
            prop_assert_eq!(stored.confidence, expected.confidence);
            prop_assert_eq!(stored.factors, expected.factors);
        }
    }
}
