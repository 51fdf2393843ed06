//! Command surface for the forecast engine.
//!
//! Hosts embed the CLI through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_with_db`] for direct [`Command`] execution against a DB path.
//! - [`run_command`] for execution against an existing [`SqliteForecastStore`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use footy_forecast_core::{
    format_rfc3339, parse_rfc3339_utc, Factor, Forecast, LeagueId, MatchResult, ResultStatus,
    ScoringRules, StandingRow, TeamId,
};
use footy_forecast_store_sqlite::{
    BatchPolicy, NewMatch, RecomputeReport, RecomputeSelection, SqliteForecastStore,
};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "ff")]
#[command(about = "Football forecast engine CLI")]
pub struct Cli {
    #[arg(long, env = "FOOTY_FORECAST_DB", default_value = "./footy_forecast.sqlite3")]
    db: PathBuf,

    /// JSON file with scoring rules; the built-in v1 rules are used when absent.
    #[arg(long)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Forecast {
        #[command(subcommand)]
        command: Box<ForecastCommand>,
    },
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    Data {
        #[command(subcommand)]
        command: Box<DataCommand>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ForecastCommand {
    Recompute(RecomputeArgs),
    Show(ShowArgs),
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct RecomputeArgs {
    /// Recompute a single match instead of every known match.
    #[arg(long)]
    match_id: Option<String>,
    /// Skip failing matches and report them instead of aborting.
    #[arg(long)]
    continue_on_error: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    match_id: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    Show,
}

#[derive(Debug, Subcommand)]
pub enum DataCommand {
    SeedDemo(SeedDemoArgs),
    AddLeague(AddLeagueArgs),
    AddTeam(AddTeamArgs),
    AddMatch(AddMatchArgs),
    AddResult(AddResultArgs),
    SetStanding(SetStandingArgs),
}

#[derive(Debug, Args)]
pub struct SeedDemoArgs {
    #[arg(long, default_value = "2025/26")]
    season: String,
}

#[derive(Debug, Args)]
pub struct AddLeagueArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    country: String,
}

#[derive(Debug, Args)]
pub struct AddTeamArgs {
    /// League code.
    #[arg(long)]
    league: String,
    #[arg(long)]
    name: String,
}

#[derive(Debug, Args)]
pub struct AddMatchArgs {
    #[arg(long)]
    match_id: String,
    /// League code.
    #[arg(long)]
    league: String,
    /// Home team name within the league.
    #[arg(long)]
    home: String,
    /// Away team name within the league.
    #[arg(long)]
    away: String,
    /// Kickoff time, RFC3339 UTC.
    #[arg(long)]
    kickoff: String,
    #[arg(long, default_value = "2025/26")]
    season: String,
    #[arg(long, default_value = "")]
    round: String,
}

#[derive(Debug, Args)]
pub struct AddResultArgs {
    #[arg(long)]
    match_id: String,
    #[arg(long)]
    home_goals: u32,
    #[arg(long)]
    away_goals: u32,
    #[arg(long, value_enum, default_value_t = StatusArg::Finished)]
    status: StatusArg,
}

#[derive(Debug, Args)]
pub struct SetStandingArgs {
    /// League code.
    #[arg(long)]
    league: String,
    /// Team name within the league.
    #[arg(long)]
    team: String,
    #[arg(long)]
    points: u32,
    #[arg(long)]
    played: u32,
    #[arg(long, default_value_t = 0)]
    won: u32,
    #[arg(long, default_value_t = 0)]
    drawn: u32,
    #[arg(long, default_value_t = 0)]
    lost: u32,
    #[arg(long, default_value_t = 0)]
    goals_for: u32,
    #[arg(long, default_value_t = 0)]
    goals_against: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Finished,
    Postponed,
}

/// Output shape of a stored forecast.
#[derive(Debug, Serialize)]
struct ForecastView {
    match_id: String,
    prob_home: f64,
    prob_draw: f64,
    prob_away: f64,
    confidence: String,
    explain: Vec<Factor>,
    recalculated_at: String,
}

/// Executes a parsed CLI invocation.
///
/// # Errors
/// Returns an error when the rules file is invalid, store open/migrate fails,
/// or the requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let rules = load_rules(cli.rules.as_deref())?;
    match cli.command {
        Command::Rules {
            command: RulesCommand::Show,
        } => {
            println!("{}", serde_json::to_string_pretty(&rules)?);
            Ok(())
        }
        command => run_with_db(&cli.db, &rules, command),
    }
}

/// Executes a parsed command using the provided `SQLite` DB path.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_with_db(db_path: &Path, rules: &ScoringRules, command: Command) -> Result<()> {
    debug!(db = %db_path.display(), "opening forecast store");
    let mut store = SqliteForecastStore::open(db_path)?;
    store.migrate()?;
    run_command(command, &mut store, rules)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, lookup, recompute, or persistence fails.
pub fn run_command(
    command: Command,
    store: &mut SqliteForecastStore,
    rules: &ScoringRules,
) -> Result<()> {
    match command {
        Command::Forecast { command } => run_forecast(*command, store, rules),
        Command::Rules {
            command: RulesCommand::Show,
        } => {
            println!("{}", serde_json::to_string_pretty(rules)?);
            Ok(())
        }
        Command::Data { command } => run_data(*command, store),
    }
}

fn run_forecast(
    command: ForecastCommand,
    store: &mut SqliteForecastStore,
    rules: &ScoringRules,
) -> Result<()> {
    match command {
        ForecastCommand::Recompute(args) => {
            let selection = match args.match_id {
                Some(match_id) => RecomputeSelection::Single(match_id),
                None => RecomputeSelection::All,
            };
            let policy = if args.continue_on_error {
                BatchPolicy::SkipAndLog
            } else {
                BatchPolicy::FailFast
            };

            let report = store.recompute(&selection, rules, policy)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_recompute_report(&report);
            }
            Ok(())
        }
        ForecastCommand::Show(args) => {
            let forecast = store
                .get_forecast(&args.match_id)?
                .ok_or_else(|| anyhow!("forecast not found for match {}", args.match_id))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&forecast_view(&forecast)?)?
            );
            Ok(())
        }
        ForecastCommand::List(args) => {
            let forecasts = store.list_forecasts()?;
            if args.json {
                let views = forecasts
                    .iter()
                    .map(forecast_view)
                    .collect::<Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                print_forecast_table(&forecasts)?;
            }
            Ok(())
        }
    }
}

fn run_data(command: DataCommand, store: &mut SqliteForecastStore) -> Result<()> {
    match command {
        DataCommand::SeedDemo(args) => {
            let report = store.seed_demo(&args.season)?;
            println!(
                "Seeded leagues={}, teams={}, standings_rows={} for season {}",
                report.leagues_created,
                report.teams_created,
                report.standings_created,
                report.season
            );
            Ok(())
        }
        DataCommand::AddLeague(args) => {
            let league_id = store.upsert_league(&args.code, &args.name, &args.country)?;
            println!("league {} -> {league_id}", args.code);
            Ok(())
        }
        DataCommand::AddTeam(args) => {
            let league_id = resolve_league(store, &args.league)?;
            let team_id = store.upsert_team(league_id, &args.name)?;
            println!("team {} -> {team_id}", args.name);
            Ok(())
        }
        DataCommand::AddMatch(args) => {
            let league_id = resolve_league(store, &args.league)?;
            let input = NewMatch {
                home_team_id: resolve_team(store, league_id, &args.home)?,
                away_team_id: resolve_team(store, league_id, &args.away)?,
                kickoff: parse_rfc3339_utc(&args.kickoff)
                    .with_context(|| format!("invalid kickoff for match {}", args.match_id))?,
                match_id: args.match_id,
                season: args.season,
                league_id,
                round: args.round,
            };
            store.upsert_match(&input)?;
            println!("match {} saved", input.match_id);
            Ok(())
        }
        DataCommand::AddResult(args) => {
            let result = MatchResult {
                home_goals: args.home_goals,
                away_goals: args.away_goals,
                status: map_status(args.status),
            };
            store.upsert_result(&args.match_id, &result)?;
            println!(
                "result {} {}-{} ({})",
                args.match_id,
                result.home_goals,
                result.away_goals,
                result.status.as_str()
            );
            Ok(())
        }
        DataCommand::SetStanding(args) => {
            let league_id = resolve_league(store, &args.league)?;
            let team_id = resolve_team(store, league_id, &args.team)?;
            store.upsert_standing(&StandingRow {
                league_id,
                team_id,
                points: args.points,
                played: args.played,
                won: args.won,
                drawn: args.drawn,
                lost: args.lost,
                goals_for: args.goals_for,
                goals_against: args.goals_against,
            })?;
            println!(
                "standing {} points={} played={}",
                args.team, args.points, args.played
            );
            Ok(())
        }
    }
}

fn load_rules(path: Option<&Path>) -> Result<ScoringRules> {
    let Some(path) = path else {
        return Ok(ScoringRules::v1());
    };
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&body)
        .with_context(|| format!("rules file must be valid JSON: {}", path.display()))?;
    ScoringRules::from_json(&value)
        .with_context(|| format!("invalid rules file {}", path.display()))
}

fn resolve_league(store: &SqliteForecastStore, code: &str) -> Result<LeagueId> {
    store
        .league_id_by_code(code)?
        .ok_or_else(|| anyhow!("league not found: {code}"))
}

fn resolve_team(store: &SqliteForecastStore, league_id: LeagueId, name: &str) -> Result<TeamId> {
    store
        .team_id_by_name(league_id, name)?
        .ok_or_else(|| anyhow!("team not found in league {league_id}: {name}"))
}

fn map_status(value: StatusArg) -> ResultStatus {
    match value {
        StatusArg::Finished => ResultStatus::Finished,
        StatusArg::Postponed => ResultStatus::Postponed,
    }
}

fn forecast_view(forecast: &Forecast) -> Result<ForecastView> {
    Ok(ForecastView {
        match_id: forecast.match_id.clone(),
        prob_home: forecast.prob_home,
        prob_draw: forecast.prob_draw,
        prob_away: forecast.prob_away,
        confidence: forecast.confidence.as_str().to_string(),
        explain: forecast.factors.clone(),
        recalculated_at: format_rfc3339(forecast.recalculated_at)?,
    })
}

fn print_recompute_report(report: &RecomputeReport) {
    println!("Recomputed {} forecasts", report.recomputed);
    for failure in &report.failures {
        println!("skipped match={} error={}", failure.match_id, failure.message);
    }
}

fn print_forecast_table(forecasts: &[Forecast]) -> Result<()> {
    println!(
        "{:<24} {:>9} {:>9} {:>9} {:<10} recalculated_at",
        "match_id", "home", "draw", "away", "confidence"
    );
    println!("{}", "-".repeat(90));

    for forecast in forecasts {
        println!(
            "{:<24} {:>9.4} {:>9.4} {:>9.4} {:<10} {}",
            forecast.match_id,
            forecast.prob_home,
            forecast.prob_draw,
            forecast.prob_away,
            forecast.confidence.as_str(),
            format_rfc3339(forecast.recalculated_at)?
        );
    }
    Ok(())
}
