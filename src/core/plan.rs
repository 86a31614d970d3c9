use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};

use super::expenses::{
    BUSINESS_EXPENSE_CATEGORIES, ExpenseBook, PERSONAL_EXPENSE_CATEGORIES,
    initialize_expense_categories, merge_expense_book,
};
use super::numeric::{RateValue, RawNumber, clamp_rate, to_number};
use super::types::{ConversionRates, Side, Stage, StageRates};

/// Business plan as edited in the planner. Every numeric field may be missing,
/// blank or non-numeric; the engine coerces rather than rejects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanInput {
    pub plan_year: Option<i32>,
    pub net_income_goal: Option<RawNumber>,
    /// Percentage points, e.g. 25.
    pub tax_rate: Option<RawNumber>,
    pub personal_expenses: Option<ExpenseBook>,
    pub business_expenses: Option<ExpenseBook>,
    pub avg_sale_price: Option<RawNumber>,
    /// Percentage of the sale price, e.g. 3.
    pub commission_rate: Option<RawNumber>,
    /// Percentage of commission kept after the brokerage split.
    pub income_split: Option<RawNumber>,
    /// Percentage of deals on the buyer side.
    pub buyer_seller_split: Option<RawNumber>,
    pub team_split_buyers: Option<RawNumber>,
    pub team_split_sellers: Option<RawNumber>,
    pub conversion_rates: Option<ConversionRatesInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageRatesInput {
    pub conversation_to_appointment: Option<RateValue>,
    pub appointment_to_agreement: Option<RateValue>,
    pub agreement_to_contract: Option<RateValue>,
    pub contract_to_close: Option<RateValue>,
}

impl StageRatesInput {
    pub fn get(&self, stage: Stage) -> Option<&RateValue> {
        match stage {
            Stage::ConversationToAppointment => self.conversation_to_appointment.as_ref(),
            Stage::AppointmentToAgreement => self.appointment_to_agreement.as_ref(),
            Stage::AgreementToContract => self.agreement_to_contract.as_ref(),
            Stage::ContractToClose => self.contract_to_close.as_ref(),
        }
    }

    /// Stage by stage, values present here win over `fallback`.
    fn overlay(self, fallback: StageRatesInput) -> StageRatesInput {
        StageRatesInput {
            conversation_to_appointment: self
                .conversation_to_appointment
                .or(fallback.conversation_to_appointment),
            appointment_to_agreement: self
                .appointment_to_agreement
                .or(fallback.appointment_to_agreement),
            agreement_to_contract: self.agreement_to_contract.or(fallback.agreement_to_contract),
            contract_to_close: self.contract_to_close.or(fallback.contract_to_close),
        }
    }
}

impl From<&StageRates> for StageRatesInput {
    fn from(rates: &StageRates) -> Self {
        Self {
            conversation_to_appointment: Some(rates.conversation_to_appointment.into()),
            appointment_to_agreement: Some(rates.appointment_to_agreement.into()),
            agreement_to_contract: Some(rates.agreement_to_contract.into()),
            contract_to_close: Some(rates.contract_to_close.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionRatesInput {
    pub buyer: Option<StageRatesInput>,
    pub listing: Option<StageRatesInput>,
}

impl ConversionRatesInput {
    pub fn side(&self, side: Side) -> Option<&StageRatesInput> {
        match side {
            Side::Buyer => self.buyer.as_ref(),
            Side::Listing => self.listing.as_ref(),
        }
    }
}

impl From<&ConversionRates> for ConversionRatesInput {
    fn from(rates: &ConversionRates) -> Self {
        Self {
            buyer: Some((&rates.buyer).into()),
            listing: Some((&rates.listing).into()),
        }
    }
}

pub fn get_default_conversion_rates() -> ConversionRates {
    ConversionRates::default()
}

pub fn create_initial_plan(plan_year: i32) -> PlanInput {
    PlanInput {
        plan_year: Some(plan_year),
        net_income_goal: Some(RawNumber::Number(70_000.0)),
        tax_rate: Some(RawNumber::Number(25.0)),
        personal_expenses: Some(initialize_expense_categories(PERSONAL_EXPENSE_CATEGORIES)),
        business_expenses: Some(initialize_expense_categories(BUSINESS_EXPENSE_CATEGORIES)),
        avg_sale_price: Some(RawNumber::Number(450_000.0)),
        commission_rate: Some(RawNumber::Number(3.0)),
        income_split: Some(RawNumber::Number(60.0)),
        buyer_seller_split: Some(RawNumber::Number(60.0)),
        team_split_buyers: Some(RawNumber::Number(0.0)),
        team_split_sellers: Some(RawNumber::Number(0.0)),
        conversion_rates: Some((&get_default_conversion_rates()).into()),
    }
}

pub fn create_initial_plan_for_current_year() -> PlanInput {
    create_initial_plan(Local::now().year())
}

/// Restores a saved plan on top of `defaults`, picking up expense template items and
/// conversion stages added since the plan was saved.
pub fn merge_saved_plan(saved: Option<PlanInput>, defaults: PlanInput) -> PlanInput {
    let Some(saved) = saved else {
        return defaults;
    };

    let personal_expenses = merge_expense_book(
        saved.personal_expenses.as_ref(),
        &defaults.personal_expenses.unwrap_or_default(),
    );
    let business_expenses = merge_expense_book(
        saved.business_expenses.as_ref(),
        &defaults.business_expenses.unwrap_or_default(),
    );

    let default_rates = defaults.conversion_rates.unwrap_or_default();
    let saved_rates = saved.conversion_rates.unwrap_or_default();
    let conversion_rates = ConversionRatesInput {
        buyer: Some(
            saved_rates
                .buyer
                .unwrap_or_default()
                .overlay(default_rates.buyer.unwrap_or_default()),
        ),
        listing: Some(
            saved_rates
                .listing
                .unwrap_or_default()
                .overlay(default_rates.listing.unwrap_or_default()),
        ),
    };

    PlanInput {
        plan_year: saved.plan_year.or(defaults.plan_year),
        net_income_goal: saved.net_income_goal.or(defaults.net_income_goal),
        tax_rate: saved.tax_rate.or(defaults.tax_rate),
        personal_expenses: Some(personal_expenses),
        business_expenses: Some(business_expenses),
        avg_sale_price: saved.avg_sale_price.or(defaults.avg_sale_price),
        commission_rate: saved.commission_rate.or(defaults.commission_rate),
        income_split: saved.income_split.or(defaults.income_split),
        buyer_seller_split: saved.buyer_seller_split.or(defaults.buyer_seller_split),
        team_split_buyers: saved.team_split_buyers.or(defaults.team_split_buyers),
        team_split_sellers: saved.team_split_sellers.or(defaults.team_split_sellers),
        conversion_rates: Some(conversion_rates),
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanField {
    NetIncomeGoal,
    AvgSalePrice,
    CommissionRate,
    IncomeSplit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanIssue {
    pub field: PlanField,
    pub message: &'static str,
}

/// Checks the planner gates before a plan is activated. Advisory only: the engine
/// still produces targets for a plan with issues.
pub fn validate_plan(plan: &PlanInput) -> Vec<PlanIssue> {
    let checks = [
        (
            PlanField::NetIncomeGoal,
            plan.net_income_goal.as_ref(),
            "Please enter a positive net income goal.",
        ),
        (
            PlanField::AvgSalePrice,
            plan.avg_sale_price.as_ref(),
            "Average sale price must be greater than zero.",
        ),
        (
            PlanField::CommissionRate,
            plan.commission_rate.as_ref(),
            "Commission rate must be greater than zero.",
        ),
        (
            PlanField::IncomeSplit,
            plan.income_split.as_ref(),
            "Income split must be greater than zero.",
        ),
    ];

    checks
        .into_iter()
        .filter(|(_, value, _)| to_number(*value, 0.0) <= 0.0)
        .map(|(field, _, message)| PlanIssue { field, message })
        .collect()
}

/// `side.stage` address of one conversion rate, e.g. `buyer.contractToClose`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RatePath {
    pub side: Side,
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePathError {
    pub path: String,
}

impl fmt::Display for RatePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown conversion rate path '{}', expected '<buyer|listing>.<stage>'",
            self.path
        )
    }
}

impl std::error::Error for RatePathError {}

impl FromStr for RatePath {
    type Err = RatePathError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let err = || RatePathError {
            path: value.to_string(),
        };
        let (side, stage) = value.split_once('.').ok_or_else(err)?;
        let side = match side {
            "buyer" => Side::Buyer,
            "listing" => Side::Listing,
            _ => return Err(err()),
        };
        let stage = Stage::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == stage)
            .ok_or_else(err)?;
        Ok(RatePath { side, stage })
    }
}

impl fmt::Display for RatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.side.as_str(), self.stage.as_str())
    }
}

/// Applies one user edit. The value is bounded on whichever scale it was typed in and
/// stored as a fraction.
pub fn update_conversion_rate(
    rates: &ConversionRates,
    path: RatePath,
    value: Option<&RawNumber>,
) -> ConversionRates {
    let clamped = clamp_rate(value);
    let fraction = if clamped > 1.0 { clamped / 100.0 } else { clamped };

    let mut updated = *rates;
    updated.side_mut(path.side).set(path.stage, fraction);
    updated
}
