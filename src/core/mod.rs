mod engine;
mod expenses;
mod format;
mod numeric;
mod plan;
mod types;

pub use engine::{
    MAX_TAX_RATE, calculate_activity_targets, calculate_deal_structure,
    calculate_financial_summary, calculate_plan_targets, calculate_plan_targets_with,
    resolve_stage_rates, reverse_engineer_funnel,
};
pub use expenses::{
    BUSINESS_EXPENSE_CATEGORIES, ExpenseBook, ExpenseCategory, ExpenseItem, Frequency,
    PERSONAL_EXPENSE_CATEGORIES, initialize_expense_categories, merge_expense_book,
    sum_expense_book, sum_expense_category, to_annual_amount,
};
pub use format::format_currency;
pub use numeric::{
    MIN_RATE, Rate, RateValue, RawNumber, clamp_rate, ensure_rate, resolve_rate, to_number,
};
pub use plan::{
    ConversionRatesInput, PlanField, PlanInput, PlanIssue, RatePath, RatePathError,
    StageRatesInput, create_initial_plan, create_initial_plan_for_current_year,
    get_default_conversion_rates, merge_saved_plan, update_conversion_rate, validate_plan,
};
pub use types::{
    ActivityFunnel, ActivityTargets, ConversionRates, DealStructure, FinancialSummary,
    PlanTargets, PlannerConfig, Side, Stage, StageRates, TransactionRounding,
};
