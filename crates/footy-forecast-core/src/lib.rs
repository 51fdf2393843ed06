use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

pub const TABLE_POSITION_FACTOR: &str = "table_position";
pub const RECENT_FORM_FACTOR: &str = "recent_form";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ForecastError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct LeagueId(pub i64);

impl Display for LeagueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct TeamId(pub i64);

impl Display for TeamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a fixture a team played on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Away => "away",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "home" => Some(Self::Home),
            "away" => Some(Self::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Finished,
    Postponed,
}

impl ResultStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Postponed => "postponed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "finished" => Some(Self::Finished),
            "postponed" => Some(Self::Postponed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// The fixture being forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fixture {
    pub match_id: String,
    pub league_id: LeagueId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub kickoff: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandingRow {
    pub league_id: LeagueId,
    pub team_id: TeamId,
    pub points: u32,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    pub home_goals: u32,
    pub away_goals: u32,
    pub status: ResultStatus,
}

/// A past (or scheduled) fixture pulled into a team's recent-form window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoricalMatch {
    pub match_id: String,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub kickoff: OffsetDateTime,
    pub result: Option<MatchResult>,
}

impl HistoricalMatch {
    /// Goal differential seen from `team_id`, or `None` without a recorded result.
    #[must_use]
    pub fn goal_diff_for(&self, team_id: TeamId) -> Option<i64> {
        let result = self.result?;
        let home = i64::from(result.home_goals);
        let away = i64::from(result.away_goals);
        if self.home_team_id == team_id {
            Some(home - away)
        } else {
            Some(away - home)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Factor {
    pub name: String,
    pub weight: f64,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResult {
    pub prob_home: f64,
    pub prob_draw: f64,
    pub prob_away: f64,
    pub confidence: Confidence,
    #[serde(rename = "explain")]
    pub factors: Vec<Factor>,
}

/// A persisted forecast, one per match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forecast {
    pub match_id: String,
    pub prob_home: f64,
    pub prob_draw: f64,
    pub prob_away: f64,
    pub confidence: Confidence,
    #[serde(rename = "explain")]
    pub factors: Vec<Factor>,
    pub recalculated_at: OffsetDateTime,
}

impl Forecast {
    #[must_use]
    pub fn from_result(
        match_id: &str,
        result: ForecastResult,
        recalculated_at: OffsetDateTime,
    ) -> Self {
        Self {
            match_id: match_id.to_string(),
            prob_home: result.prob_home,
            prob_draw: result.prob_draw,
            prob_away: result.prob_away,
            confidence: result.confidence,
            factors: result.factors,
            recalculated_at,
        }
    }
}

/// Everything the engine reads for one fixture, already resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForecastInputs {
    pub home_standing: Option<StandingRow>,
    pub away_standing: Option<StandingRow>,
    /// Home team's fixtures played at home, most recent first.
    pub home_recent: Vec<HistoricalMatch>,
    /// Away team's fixtures played away, most recent first.
    pub away_recent: Vec<HistoricalMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringRules {
    pub rules_version: u32,
    pub draw_baseline: f64,
    pub table_base: f64,
    pub table_slope: f64,
    pub table_factor_weight: f64,
    pub form_base: f64,
    pub form_slope: f64,
    pub form_factor_weight: f64,
    pub recent_fixture_limit: usize,
    pub high_confidence_min: f64,
    pub medium_confidence_min: f64,
}

impl ScoringRules {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            rules_version: 1,
            draw_baseline: 0.5,
            table_base: 0.6,
            table_slope: 0.8,
            table_factor_weight: 0.8,
            form_base: 0.4,
            form_slope: 0.5,
            form_factor_weight: 0.6,
            recent_fixture_limit: 5,
            high_confidence_min: 0.60,
            medium_confidence_min: 0.45,
        }
    }

    /// Validates rule constants and confidence thresholds.
    ///
    /// # Errors
    /// Returns [`ForecastError::Configuration`] when a field is outside its
    /// allowed range.
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.rules_version == 0 {
            return Err(ForecastError::Configuration(
                "rules_version MUST be >= 1".to_string(),
            ));
        }

        if self.recent_fixture_limit == 0 {
            return Err(ForecastError::Configuration(
                "recent_fixture_limit MUST be >= 1".to_string(),
            ));
        }

        for (name, value) in [
            ("draw_baseline", self.draw_baseline),
            ("table_base", self.table_base),
            ("table_slope", self.table_slope),
            ("table_factor_weight", self.table_factor_weight),
            ("form_base", self.form_base),
            ("form_slope", self.form_slope),
            ("form_factor_weight", self.form_factor_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ForecastError::Configuration(format!(
                    "{name} MUST be a finite value >= 0.0"
                )));
            }
        }

        for (name, value) in [
            ("high_confidence_min", self.high_confidence_min),
            ("medium_confidence_min", self.medium_confidence_min),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ForecastError::Configuration(format!(
                    "{name} MUST be in [0.0, 1.0]"
                )));
            }
        }

        if self.medium_confidence_min > self.high_confidence_min {
            return Err(ForecastError::Configuration(
                "medium_confidence_min cannot exceed high_confidence_min".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates scoring rules from JSON.
    ///
    /// # Errors
    /// Returns [`ForecastError::Configuration`] when decoding fails or the
    /// decoded rules are out of bounds.
    pub fn from_json(value: &Value) -> Result<Self, ForecastError> {
        let rules: Self = serde_json::from_value(value.clone()).map_err(|err| {
            ForecastError::Configuration(format!("invalid scoring rules JSON payload: {err}"))
        })?;
        rules.validate()?;
        Ok(rules)
    }
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self::v1()
    }
}

/// Read surface the engine needs from whatever holds league data.
pub trait ForecastDataSource {
    type Error;

    /// Standing row of `team_id` in `league_id`, if the table has one.
    ///
    /// # Errors
    /// Returns the source's error when the lookup itself fails.
    fn standing(
        &self,
        league_id: LeagueId,
        team_id: TeamId,
    ) -> Result<Option<StandingRow>, Self::Error>;

    /// Up to `limit` fixtures where `team_id` played on `side`, most recent first.
    ///
    /// # Errors
    /// Returns the source's error when the lookup itself fails.
    fn recent_fixtures(
        &self,
        team_id: TeamId,
        side: Side,
        limit: usize,
    ) -> Result<Vec<HistoricalMatch>, Self::Error>;
}

/// Resolves standings and recent fixtures for both sides of `fixture`.
///
/// # Errors
/// Propagates any lookup failure from `source`.
pub fn load_inputs<S: ForecastDataSource>(
    source: &S,
    fixture: &Fixture,
    rules: &ScoringRules,
) -> Result<ForecastInputs, S::Error> {
    let limit = rules.recent_fixture_limit;
    Ok(ForecastInputs {
        home_standing: source.standing(fixture.league_id, fixture.home_team_id)?,
        away_standing: source.standing(fixture.league_id, fixture.away_team_id)?,
        home_recent: source.recent_fixtures(fixture.home_team_id, Side::Home, limit)?,
        away_recent: source.recent_fixtures(fixture.away_team_id, Side::Away, limit)?,
    })
}

/// Loads inputs from `source` and runs the engine over them.
///
/// # Errors
/// Propagates any lookup failure from `source`; the computation itself
/// cannot fail.
pub fn forecast_from_source<S: ForecastDataSource>(
    source: &S,
    fixture: &Fixture,
    rules: &ScoringRules,
) -> Result<ForecastResult, S::Error> {
    let inputs = load_inputs(source, fixture, rules)?;
    Ok(compute_forecast_with_rules(fixture, &inputs, rules))
}

#[must_use]
pub fn compute_forecast(fixture: &Fixture, inputs: &ForecastInputs) -> ForecastResult {
    compute_forecast_with_rules(fixture, inputs, &ScoringRules::v1())
}

#[must_use]
pub fn compute_forecast_with_rules(
    fixture: &Fixture,
    inputs: &ForecastInputs,
    rules: &ScoringRules,
) -> ForecastResult {
    let mut score_home = 0.0_f64;
    let score_draw = rules.draw_baseline;
    let mut score_away = 0.0_f64;
    let mut factors = Vec::new();

    if let (Some(home), Some(away)) = (&inputs.home_standing, &inputs.away_standing) {
        let delta = points_delta(home, away);
        score_home += rules.table_base + rules.table_slope * delta.max(0.0);
        score_away += rules.table_base + rules.table_slope * (-delta).max(0.0);
        factors.push(Factor {
            name: TABLE_POSITION_FACTOR.to_string(),
            weight: rules.table_factor_weight,
            detail: format!("Δpts_norm={delta:.2}"),
        });
    }

    let limit = rules.recent_fixture_limit;
    let gd_home = goal_diff(
        truncated(&inputs.home_recent, limit),
        fixture.home_team_id,
    );
    let gd_away = goal_diff(
        truncated(&inputs.away_recent, limit),
        fixture.away_team_id,
    );
    score_home += rules.form_base + rules.form_slope * gd_home.max(0.0);
    score_away += rules.form_base + rules.form_slope * (-gd_home).max(0.0);
    score_away += rules.form_base + rules.form_slope * gd_away.max(0.0);
    score_home += rules.form_base + rules.form_slope * (-gd_away).max(0.0);
    factors.push(Factor {
        name: RECENT_FORM_FACTOR.to_string(),
        weight: rules.form_factor_weight,
        detail: format!("gd_home={gd_home:.2}, gd_away={gd_away:.2}"),
    });

    let (p_home, p_draw, p_away) = normalize_scores(score_home, score_draw, score_away);
    let top = p_home.max(p_draw).max(p_away);

    ForecastResult {
        prob_home: round_probability(p_home),
        prob_draw: round_probability(p_draw),
        prob_away: round_probability(p_away),
        confidence: classify_confidence(top, rules),
        factors,
    }
}

/// Points gap normalized by combined games played; `max(1, played)` guards
/// an empty table.
#[must_use]
pub fn points_delta(home: &StandingRow, away: &StandingRow) -> f64 {
    let points = f64::from(home.points) - f64::from(away.points);
    let played = (f64::from(home.played) + f64::from(away.played)).max(1.0);
    points / played
}

/// Mean goal differential from `team_id`'s perspective over fixtures with a
/// recorded result; `0.0` when none has one.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn goal_diff(fixtures: &[HistoricalMatch], team_id: TeamId) -> f64 {
    let diffs = fixtures
        .iter()
        .filter_map(|fixture| fixture.goal_diff_for(team_id))
        .collect::<Vec<_>>();
    if diffs.is_empty() {
        return 0.0;
    }
    diffs.iter().sum::<i64>() as f64 / diffs.len() as f64
}

#[must_use]
pub fn normalize_scores(home: f64, draw: f64, away: f64) -> (f64, f64, f64) {
    let total = home + draw + away;
    if total <= 0.0 {
        return (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
    }
    (home / total, draw / total, away / total)
}

#[must_use]
pub fn classify_confidence(top: f64, rules: &ScoringRules) -> Confidence {
    if top >= rules.high_confidence_min {
        Confidence::High
    } else if top >= rules.medium_confidence_min {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Rounds to 4 decimal places on the exact decimal expansion, ties to even.
#[must_use]
pub fn round_probability(value: f64) -> f64 {
    format!("{value:.4}").parse::<f64>().unwrap_or(value)
}

fn truncated(fixtures: &[HistoricalMatch], limit: usize) -> &[HistoricalMatch] {
    &fixtures[..fixtures.len().min(limit)]
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`ForecastError::Validation`] when parsing fails or the
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, ForecastError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| ForecastError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(ForecastError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`ForecastError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, ForecastError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            ForecastError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
