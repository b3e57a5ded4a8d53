use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ir35::config::{Cli, Command, Settings, SolveArgs, uk_date};
use ir35::core::{
    HiringAssumptions, ROLES, SolveConfig, SolveGoal, compare, compare_hiring_cost, find_role,
    project_portfolio, resolve_day_rate, solve_day_rate,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME")))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let today = uk_date(&jiff::Zoned::now());
    let settings = Settings::from_cli(&cli, today)?;

    match cli.command {
        Command::Serve { port } => {
            info!("Starting IR35 API v{}", env!("CARGO_PKG_VERSION"));
            ir35::api::run_http_server(settings, port)
                .await
                .context("HTTP server failed")?;
        }
        Command::Compare(args) => {
            let input = args.to_input(settings.default_tax_year)?;
            let result = compare(&input, &settings.table, &settings.engine)?;
            print_json(&result)?;
        }
        Command::Solve(args) => run_solve(&settings, args)?,
        Command::Roles => print_json(ROLES)?,
        Command::TaxYears => {
            let years: Vec<_> = settings.table.years().collect();
            print_json(&years)?;
        }
        Command::Portfolio {
            day_rate,
            role,
            days_per_client,
            clients,
            weeks_per_year,
        } => {
            let day_rate = resolve_day_rate(day_rate, role.as_deref())?;
            let projection = project_portfolio(day_rate, days_per_client, clients, weeks_per_year)?;
            print_json(&projection)?;
        }
        Command::HiringCost {
            salary,
            day_rate,
            role,
            days_per_week,
        } => {
            let salary = match (salary, role.as_deref().and_then(find_role)) {
                (Some(salary), _) => salary,
                (None, Some(preset)) => preset.avg_salary,
                (None, None) => anyhow::bail!("--salary is required unless a known --role is given"),
            };
            let day_rate = resolve_day_rate(day_rate, role.as_deref())?;
            let rules = settings.table.get_rules(settings.default_tax_year)?;
            let comparison = compare_hiring_cost(
                salary,
                day_rate,
                days_per_week,
                rules,
                &HiringAssumptions::default(),
            )?;
            print_json(&comparison)?;
        }
    }

    Ok(())
}

fn run_solve(settings: &Settings, args: SolveArgs) -> Result<()> {
    let goal = match args.target_net {
        Some(net_annual) => SolveGoal::TargetNet {
            posture: args.posture.into(),
            net_annual,
        },
        None => SolveGoal::MatchOutsideNet,
    };
    let mut earnings = args.earnings;
    if earnings.day_rate.is_none() && earnings.role.is_none() && args.target_net.is_some() {
        earnings.day_rate = Some(args.search_min);
    }
    let input = earnings.to_input(settings.default_tax_year)?;
    let config = SolveConfig {
        search_min: args.search_min,
        search_max: args.search_max,
        ..SolveConfig::default()
    };
    let result = solve_day_rate(&input, &settings.table, &settings.engine, config, goal)?;
    print_json(&result)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{json}");
    Ok(())
}
