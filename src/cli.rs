use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::api::run_http_server;
use crate::config::AppConfig;
use crate::core::{
    ExpenseBook, ExpenseItem, Frequency, PlanInput, PlanTargets, RawNumber, TransactionRounding,
    calculate_plan_targets_with, create_initial_plan_for_current_year, format_currency,
    merge_saved_plan, validate_plan,
};
use crate::error::AppError;
use crate::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "production-planner",
    about = "Work a net income goal back into deals and daily prospecting activity",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Compute plan targets once and print them
    Plan(PlanArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliRounding {
    IndependentCeiling,
    LargestRemainder,
}

impl From<CliRounding> for TransactionRounding {
    fn from(value: CliRounding) -> Self {
        match value {
            CliRounding::IndependentCeiling => TransactionRounding::IndependentCeiling,
            CliRounding::LargestRemainder => TransactionRounding::LargestRemainder,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// Saved plan JSON to start from instead of the planner defaults
    #[arg(long)]
    pub input: Option<PathBuf>,
    #[arg(long)]
    pub net_income_goal: Option<f64>,
    /// Effective tax rate in percent
    #[arg(long)]
    pub tax_rate: Option<f64>,
    #[arg(long)]
    pub avg_sale_price: Option<f64>,
    /// Commission in percent of the sale price
    #[arg(long)]
    pub commission_rate: Option<f64>,
    /// Share of commission kept after the brokerage split, in percent
    #[arg(long)]
    pub income_split: Option<f64>,
    /// Share of deals on the buyer side, in percent
    #[arg(long)]
    pub buyer_seller_split: Option<f64>,
    #[arg(long)]
    pub team_split_buyers: Option<f64>,
    #[arg(long)]
    pub team_split_sellers: Option<f64>,
    /// Replace the personal expense book with a single annual total
    #[arg(long)]
    pub personal_expenses_annual: Option<f64>,
    /// Replace the business expense book with a single annual total
    #[arg(long)]
    pub business_expenses_annual: Option<f64>,
    /// How deals are split between buyer and listing sides
    #[arg(long, value_enum)]
    pub rounding: Option<CliRounding>,
    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => serve(args).await,
        Command::Plan(args) => plan(args),
    }
}

async fn serve(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;
    run_http_server(&config).await
}

fn plan(args: PlanArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(rounding) = args.rounding {
        config.planner.rounding = rounding.into();
    }
    telemetry::init(&config.telemetry)?;

    let plan = build_plan(&args)?;
    for issue in validate_plan(&plan) {
        warn!(field = ?issue.field, "{}", issue.message);
    }

    let targets = calculate_plan_targets_with(&plan, &config.planner);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        print!("{}", render_summary(&targets));
    }
    Ok(())
}

fn build_plan(args: &PlanArgs) -> Result<PlanInput, AppError> {
    let saved = match &args.input {
        Some(path) => Some(serde_json::from_str::<PlanInput>(&fs::read_to_string(path)?)?),
        None => None,
    };
    let mut plan = merge_saved_plan(saved, create_initial_plan_for_current_year());

    let overrides = [
        (&mut plan.net_income_goal, args.net_income_goal),
        (&mut plan.tax_rate, args.tax_rate),
        (&mut plan.avg_sale_price, args.avg_sale_price),
        (&mut plan.commission_rate, args.commission_rate),
        (&mut plan.income_split, args.income_split),
        (&mut plan.buyer_seller_split, args.buyer_seller_split),
        (&mut plan.team_split_buyers, args.team_split_buyers),
        (&mut plan.team_split_sellers, args.team_split_sellers),
    ];
    for (field, value) in overrides {
        if let Some(value) = value {
            *field = Some(RawNumber::Number(value));
        }
    }

    if let Some(total) = args.personal_expenses_annual {
        plan.personal_expenses = Some(annual_total_book(total));
    }
    if let Some(total) = args.business_expenses_annual {
        plan.business_expenses = Some(annual_total_book(total));
    }

    Ok(plan)
}

fn annual_total_book(total: f64) -> ExpenseBook {
    let mut book = ExpenseBook::new();
    book.insert(
        "total".to_string(),
        vec![ExpenseItem::new("total-0", "Annual total", total, Frequency::Annually)],
    );
    book
}

fn render_summary(targets: &PlanTargets) -> String {
    let summary = &targets.financial_summary;
    let deals = &targets.deal_structure;
    let monthly = &targets.monthly_breakdown;

    format!(
        "Net income goal:      {net}\n\
         Taxes:                {taxes}\n\
         Expenses:             {expenses}\n\
         GCI required:         {gci}\n\
         Net per deal:         {per_deal}\n\
         Deals:                {deals_total} ({buyer} buyer, {listing} listing)\n\
         Sales volume:         {volume}\n\
         Yearly activity:      {conversations} conversations, {appointments} appointments, \
         {agreements} agreements, {contracts} contracts\n\
         Monthly activity:     {m_conversations} conversations, {m_appointments} appointments, \
         {m_agreements} agreements, {m_contracts} contracts, {m_closings} closings\n",
        net = format_currency(summary.net_income_goal),
        taxes = format_currency(summary.tax_amount),
        expenses = format_currency(summary.total_expenses),
        gci = format_currency(targets.gci_required),
        per_deal = format_currency(deals.estimated_net_commission_per_deal),
        deals_total = targets.total_deals_needed,
        buyer = targets.buyer_deals,
        listing = targets.listing_deals,
        volume = format_currency(targets.total_sales_volume),
        conversations = targets.total_conversations,
        appointments = targets.total_appointments,
        agreements = targets.total_agreements,
        contracts = targets.total_contracts,
        m_conversations = monthly.conversations,
        m_appointments = monthly.appointments,
        m_agreements = monthly.agreements,
        m_contracts = monthly.contracts,
        m_closings = monthly.closings,
    )
}
