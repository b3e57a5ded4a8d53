use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::core::{
    DEFAULT_DAYS_PER_WEEK, DEFAULT_MARGINAL_TOLERANCE, DEFAULT_WEEKS_PER_YEAR, EarningsInput,
    EmployerCostPolicy, EngineConfig, InvalidInputError, Posture, RuleTable, TaxYear,
    resolve_day_rate,
};

#[derive(Debug, Parser)]
#[command(
    name = "ir35",
    version,
    about = "Compare UK contractor take-home inside and outside IR35"
)]
pub struct Cli {
    /// JSON rule table replacing the built-in tax years.
    #[arg(long, global = true, env = "IR35_RULES")]
    pub rules: Option<PathBuf>,

    /// Net difference, as a share of gross, below which the result is "marginal".
    #[arg(long, global = true, default_value_t = DEFAULT_MARGINAL_TOLERANCE)]
    pub tolerance: f64,

    #[arg(long, global = true, value_enum, default_value_t = CliEmployerCostPolicy::ContractorBorne)]
    pub employer_cost_policy: CliEmployerCostPolicy,

    /// Tax year such as 2025-26. Defaults to the year in force today.
    #[arg(long, global = true)]
    pub tax_year: Option<TaxYear>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Print the inside/outside comparison as JSON.
    Compare(EarningsArgs),
    /// Find the day rate that reaches a net target.
    Solve(SolveArgs),
    /// List the fractional role presets.
    Roles,
    /// List the tax years in the rule table.
    TaxYears,
    /// Project gross earnings across several fractional clients.
    Portfolio {
        #[arg(long)]
        day_rate: Option<f64>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value_t = 2.5)]
        days_per_client: f64,
        #[arg(long, default_value_t = 2)]
        clients: u32,
        #[arg(long, default_value_t = 48.0)]
        weeks_per_year: f64,
    },
    /// Compare a full-time hire with a fractional engagement.
    HiringCost {
        #[arg(long)]
        salary: Option<f64>,
        #[arg(long)]
        day_rate: Option<f64>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value_t = 2.0)]
        days_per_week: f64,
    },
}

#[derive(Debug, Clone, Args)]
pub struct EarningsArgs {
    #[arg(long)]
    pub day_rate: Option<f64>,
    /// Seed the day rate from a role preset such as `cfo`.
    #[arg(long)]
    pub role: Option<String>,
    #[arg(long, default_value_t = DEFAULT_DAYS_PER_WEEK)]
    pub days_per_week: f64,
    #[arg(long, default_value_t = DEFAULT_WEEKS_PER_YEAR)]
    pub weeks_per_year: f64,
    #[arg(long, default_value_t = 0.0)]
    pub business_costs: f64,
    #[arg(long)]
    pub director_salary: Option<f64>,
}

impl EarningsArgs {
    pub fn to_input(&self, tax_year: TaxYear) -> Result<EarningsInput, InvalidInputError> {
        let day_rate = resolve_day_rate(self.day_rate, self.role.as_deref())?;
        Ok(EarningsInput {
            business_costs: self.business_costs,
            director_salary: self.director_salary,
            ..EarningsInput::new(day_rate, self.days_per_week, self.weeks_per_year, tax_year)
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct SolveArgs {
    #[command(flatten)]
    pub earnings: EarningsArgs,
    /// Net annual take-home to reach. Without it, solve for the inside rate matching outside net.
    #[arg(long)]
    pub target_net: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliPosture::Inside)]
    pub posture: CliPosture,
    #[arg(long, default_value_t = 1.0)]
    pub search_min: f64,
    #[arg(long, default_value_t = 10_000.0)]
    pub search_max: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliEmployerCostPolicy {
    ContractorBorne,
    ClientBorne,
}

impl From<CliEmployerCostPolicy> for EmployerCostPolicy {
    fn from(value: CliEmployerCostPolicy) -> Self {
        match value {
            CliEmployerCostPolicy::ContractorBorne => EmployerCostPolicy::ContractorBorne,
            CliEmployerCostPolicy::ClientBorne => EmployerCostPolicy::ClientBorne,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliPosture {
    Inside,
    Outside,
}

impl From<CliPosture> for Posture {
    fn from(value: CliPosture) -> Self {
        match value {
            CliPosture::Inside => Posture::Inside,
            CliPosture::Outside => Posture::Outside,
        }
    }
}

/// Calendar date in the UK at `now`. Tax years turn over on 6 April London time, whatever
/// zone the host runs in.
pub fn uk_date(now: &jiff::Zoned) -> jiff::civil::Date {
    match now.in_tz("Europe/London") {
        Ok(london) => london.date(),
        Err(err) => {
            warn!(%err, "Europe/London time zone unavailable, using the host zone");
            now.date()
        }
    }
}

/// Everything resolved once at startup and shared by every calculation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub table: RuleTable,
    pub engine: EngineConfig,
    /// Used whenever a request does not name a tax year.
    pub default_tax_year: TaxYear,
}

impl Settings {
    /// `today` is the wall-clock date; it only picks the default tax year.
    pub fn from_cli(cli: &Cli, today: jiff::civil::Date) -> Result<Self> {
        let table = match &cli.rules {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("reading rule table {}", path.display()))?;
                RuleTable::from_json(&json)
                    .with_context(|| format!("loading rule table {}", path.display()))?
            }
            None => RuleTable::builtin().context("built-in rule table")?,
        };

        if !(0.0..=1.0).contains(&cli.tolerance) {
            bail!("--tolerance must be between 0 and 1");
        }

        let default_tax_year = cli.tax_year.unwrap_or_else(|| TaxYear::containing(today));
        table
            .get_rules(default_tax_year)
            .with_context(|| format!("default tax year {default_tax_year}"))?;

        Ok(Self {
            table,
            engine: EngineConfig {
                employer_cost_policy: cli.employer_cost_policy.into(),
                marginal_tolerance: cli.tolerance,
            },
            default_tax_year,
        })
    }
}
