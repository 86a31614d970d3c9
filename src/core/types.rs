use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Funnel transitions, from first conversation to a closed deal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    ConversationToAppointment,
    AppointmentToAgreement,
    AgreementToContract,
    ContractToClose,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::ConversationToAppointment,
        Stage::AppointmentToAgreement,
        Stage::AgreementToContract,
        Stage::ContractToClose,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ConversationToAppointment => "conversationToAppointment",
            Stage::AppointmentToAgreement => "appointmentToAgreement",
            Stage::AgreementToContract => "agreementToContract",
            Stage::ContractToClose => "contractToClose",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buyer,
    Listing,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buyer => "buyer",
            Side::Listing => "listing",
        }
    }
}

/// Resolved conversion rates for one side, each a fraction in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRates {
    pub conversation_to_appointment: f64,
    pub appointment_to_agreement: f64,
    pub agreement_to_contract: f64,
    pub contract_to_close: f64,
}

impl StageRates {
    pub fn get(&self, stage: Stage) -> f64 {
        match stage {
            Stage::ConversationToAppointment => self.conversation_to_appointment,
            Stage::AppointmentToAgreement => self.appointment_to_agreement,
            Stage::AgreementToContract => self.agreement_to_contract,
            Stage::ContractToClose => self.contract_to_close,
        }
    }

    pub fn set(&mut self, stage: Stage, rate: f64) {
        match stage {
            Stage::ConversationToAppointment => self.conversation_to_appointment = rate,
            Stage::AppointmentToAgreement => self.appointment_to_agreement = rate,
            Stage::AgreementToContract => self.agreement_to_contract = rate,
            Stage::ContractToClose => self.contract_to_close = rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionRates {
    pub buyer: StageRates,
    pub listing: StageRates,
}

impl ConversionRates {
    pub fn side(&self, side: Side) -> &StageRates {
        match side {
            Side::Buyer => &self.buyer,
            Side::Listing => &self.listing,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut StageRates {
        match side {
            Side::Buyer => &mut self.buyer,
            Side::Listing => &mut self.listing,
        }
    }
}

impl Default for ConversionRates {
    fn default() -> Self {
        Self {
            buyer: StageRates {
                conversation_to_appointment: 0.25,
                appointment_to_agreement: 0.40,
                agreement_to_contract: 0.80,
                contract_to_close: 0.85,
            },
            listing: StageRates {
                conversation_to_appointment: 0.30,
                appointment_to_agreement: 0.60,
                agreement_to_contract: 0.90,
                contract_to_close: 0.95,
            },
        }
    }
}

/// How a deal total is divided between buyer and listing sides.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionRounding {
    /// Each side is ceiling-rounded on its own; the sides may sum to one more than the total.
    #[default]
    IndependentCeiling,
    /// Sides always sum to the total; the leftover deal goes to the larger remainder.
    LargestRemainder,
}

impl FromStr for TransactionRounding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "independent-ceiling" | "independent_ceiling" | "ceiling" => {
                Ok(TransactionRounding::IndependentCeiling)
            }
            "largest-remainder" | "largest_remainder" => Ok(TransactionRounding::LargestRemainder),
            other => Err(format!(
                "unknown transaction rounding '{other}', expected independent-ceiling or largest-remainder"
            )),
        }
    }
}

impl fmt::Display for TransactionRounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionRounding::IndependentCeiling => write!(f, "independent-ceiling"),
            TransactionRounding::LargestRemainder => write!(f, "largest-remainder"),
        }
    }
}

/// Explicit calculator settings; nothing in the engine reads global defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannerConfig {
    pub default_rates: ConversionRates,
    pub rounding: TransactionRounding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub personal_expenses: f64,
    pub business_expenses: f64,
    pub total_expenses: f64,
    pub tax_amount: f64,
    pub gross_income: f64,
    pub gci_required: f64,
    pub net_income_goal: f64,
    pub tax_rate_decimal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealStructure {
    pub avg_sale_price: f64,
    pub commission_rate: f64,
    pub income_split: f64,
    pub buyer_split: f64,
    pub seller_split: f64,
    pub gross_commission: f64,
    pub base_net_commission: f64,
    pub estimated_net_commission_per_deal: f64,
    pub total_deals_needed: u64,
    pub buyer_transactions: u64,
    pub listing_transactions: u64,
    pub total_sales_volume: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFunnel {
    pub conversations: u64,
    pub appointments: u64,
    pub agreements: u64,
    pub contracts: u64,
    pub closings: u64,
}

impl ActivityFunnel {
    pub fn saturating_add(self, other: ActivityFunnel) -> ActivityFunnel {
        ActivityFunnel {
            conversations: self.conversations.saturating_add(other.conversations),
            appointments: self.appointments.saturating_add(other.appointments),
            agreements: self.agreements.saturating_add(other.agreements),
            contracts: self.contracts.saturating_add(other.contracts),
            closings: self.closings.saturating_add(other.closings),
        }
    }

    pub fn per_month(self) -> ActivityFunnel {
        ActivityFunnel {
            conversations: self.conversations.div_ceil(12),
            appointments: self.appointments.div_ceil(12),
            agreements: self.agreements.div_ceil(12),
            contracts: self.contracts.div_ceil(12),
            closings: self.closings.div_ceil(12),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTargets {
    pub buyer: ActivityFunnel,
    pub listing: ActivityFunnel,
    pub totals: ActivityFunnel,
    pub monthly: ActivityFunnel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTargets {
    pub financial_summary: FinancialSummary,
    pub deal_structure: DealStructure,
    pub activity_targets: ActivityTargets,
    pub gci_required: f64,
    pub total_deals_needed: u64,
    pub buyer_deals: u64,
    pub listing_deals: u64,
    pub total_sales_volume: f64,
    pub total_conversations: u64,
    pub total_appointments: u64,
    pub total_agreements: u64,
    pub total_contracts: u64,
    pub total_closings: u64,
    pub monthly_breakdown: ActivityFunnel,
}
