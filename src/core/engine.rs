use tracing::debug;

use super::expenses::sum_expense_book;
use super::numeric::{RawNumber, resolve_rate, to_number};
use super::plan::{PlanInput, StageRatesInput};
use super::types::{
    ActivityFunnel, ActivityTargets, DealStructure, FinancialSummary, PlanTargets, PlannerConfig,
    Side, Stage, StageRates, TransactionRounding,
};

/// Tax rates at or above this are treated as "no gross-up" to avoid dividing by ~0.
pub const MAX_TAX_RATE: f64 = 0.99;

const DEFAULT_BUYER_SELLER_SPLIT: f64 = 60.0;

pub fn calculate_plan_targets(plan: &PlanInput) -> PlanTargets {
    calculate_plan_targets_with(plan, &PlannerConfig::default())
}

pub fn calculate_plan_targets_with(plan: &PlanInput, config: &PlannerConfig) -> PlanTargets {
    let financial_summary = calculate_financial_summary(plan);
    let deal_structure = calculate_deal_structure(plan, &financial_summary, config);
    let activity_targets = calculate_activity_targets(&deal_structure, plan, config);

    debug!(
        gci_required = financial_summary.gci_required,
        total_deals = deal_structure.total_deals_needed,
        buyer_deals = deal_structure.buyer_transactions,
        listing_deals = deal_structure.listing_transactions,
        conversations = activity_targets.totals.conversations,
        rounding = %config.rounding,
        "calculated plan targets"
    );

    let totals = activity_targets.totals;
    PlanTargets {
        gci_required: financial_summary.gci_required,
        total_deals_needed: deal_structure.total_deals_needed,
        buyer_deals: deal_structure.buyer_transactions,
        listing_deals: deal_structure.listing_transactions,
        total_sales_volume: deal_structure.total_sales_volume,
        total_conversations: totals.conversations,
        total_appointments: totals.appointments,
        total_agreements: totals.agreements,
        total_contracts: totals.contracts,
        total_closings: totals.closings,
        monthly_breakdown: activity_targets.monthly,
        financial_summary,
        deal_structure,
        activity_targets,
    }
}

pub fn calculate_financial_summary(plan: &PlanInput) -> FinancialSummary {
    let personal_expenses = plan.personal_expenses.as_ref().map_or(0.0, sum_expense_book);
    let business_expenses = plan.business_expenses.as_ref().map_or(0.0, sum_expense_book);
    let total_expenses = personal_expenses + business_expenses;

    let net_income_goal = to_number(plan.net_income_goal.as_ref(), 0.0).max(0.0);
    let tax_rate_decimal =
        (to_number(plan.tax_rate.as_ref(), 0.0) / 100.0).clamp(0.0, MAX_TAX_RATE);
    let gross_income = if tax_rate_decimal >= MAX_TAX_RATE {
        net_income_goal
    } else {
        net_income_goal / (1.0 - tax_rate_decimal)
    };
    let tax_amount = (gross_income - net_income_goal).max(0.0);
    let gci_required = gross_income + total_expenses;

    FinancialSummary {
        personal_expenses,
        business_expenses,
        total_expenses,
        tax_amount,
        gross_income,
        gci_required,
        net_income_goal,
        tax_rate_decimal,
    }
}

pub fn calculate_deal_structure(
    plan: &PlanInput,
    summary: &FinancialSummary,
    config: &PlannerConfig,
) -> DealStructure {
    let avg_sale_price = to_number(plan.avg_sale_price.as_ref(), 0.0).max(0.0);
    let commission_rate = to_number(plan.commission_rate.as_ref(), 0.0).max(0.0) / 100.0;
    let income_split = percent_to_unit(plan.income_split.as_ref(), 0.0);
    let buyer_split = percent_to_unit(plan.buyer_seller_split.as_ref(), DEFAULT_BUYER_SELLER_SPLIT);
    let seller_split = 1.0 - buyer_split;
    let team_split_buyers = percent_to_unit(plan.team_split_buyers.as_ref(), 0.0);
    let team_split_sellers = percent_to_unit(plan.team_split_sellers.as_ref(), 0.0);

    let gross_commission = avg_sale_price * commission_rate;
    let base_net_commission = gross_commission * income_split;
    let buyer_net = base_net_commission * (1.0 - team_split_buyers);
    let seller_net = base_net_commission * (1.0 - team_split_sellers);
    // One "deal" is a blend of both sides weighted by the buyer/seller mix.
    let estimated_net_commission_per_deal = buyer_net * buyer_split + seller_net * seller_split;

    let total_deals_needed = if estimated_net_commission_per_deal > 0.0 {
        (summary.gci_required / estimated_net_commission_per_deal)
            .ceil()
            .max(1.0) as u64
    } else {
        0
    };
    let (buyer_transactions, listing_transactions) =
        split_transactions(total_deals_needed, buyer_split, seller_split, config.rounding);
    let total_sales_volume = total_deals_needed as f64 * avg_sale_price;

    DealStructure {
        avg_sale_price,
        commission_rate,
        income_split,
        buyer_split,
        seller_split,
        gross_commission,
        base_net_commission,
        estimated_net_commission_per_deal,
        total_deals_needed,
        buyer_transactions,
        listing_transactions,
        total_sales_volume,
    }
}

pub fn calculate_activity_targets(
    deals: &DealStructure,
    plan: &PlanInput,
    config: &PlannerConfig,
) -> ActivityTargets {
    let rates = plan.conversion_rates.as_ref();
    let buyer = reverse_engineer_funnel(
        deals.buyer_transactions,
        rates.and_then(|r| r.side(Side::Buyer)),
        config.default_rates.side(Side::Buyer),
    );
    let listing = reverse_engineer_funnel(
        deals.listing_transactions,
        rates.and_then(|r| r.side(Side::Listing)),
        config.default_rates.side(Side::Listing),
    );

    let totals = buyer.saturating_add(listing);
    ActivityTargets {
        buyer,
        listing,
        totals,
        monthly: totals.per_month(),
    }
}

/// Walks the funnel backwards from closings. Each stage needs at least as many
/// entries as the stage below it because every rate is at most 1.
pub fn reverse_engineer_funnel(
    closings: u64,
    rates: Option<&StageRatesInput>,
    defaults: &StageRates,
) -> ActivityFunnel {
    let rates = resolve_stage_rates(rates, defaults);

    let contracts = upstream_volume(closings, rates.contract_to_close);
    let agreements = upstream_volume(contracts, rates.agreement_to_contract);
    let appointments = upstream_volume(agreements, rates.appointment_to_agreement);
    let conversations = upstream_volume(appointments, rates.conversation_to_appointment);

    ActivityFunnel {
        conversations,
        appointments,
        agreements,
        contracts,
        closings,
    }
}

pub fn resolve_stage_rates(rates: Option<&StageRatesInput>, defaults: &StageRates) -> StageRates {
    let mut resolved = *defaults;
    for stage in Stage::ALL {
        let value = rates.and_then(|r| r.get(stage));
        resolved.set(stage, resolve_rate(value, defaults.get(stage)));
    }
    resolved
}

fn upstream_volume(downstream: u64, rate: f64) -> u64 {
    let needed = (downstream as f64 / rate).ceil().max(0.0) as u64;
    // f64 cannot represent every u64; keep the stage ordering exact for huge counts.
    needed.max(downstream)
}

fn percent_to_unit(value: Option<&RawNumber>, fallback: f64) -> f64 {
    (to_number(value, fallback) / 100.0).clamp(0.0, 1.0)
}

fn split_transactions(
    total: u64,
    buyer_split: f64,
    seller_split: f64,
    rounding: TransactionRounding,
) -> (u64, u64) {
    if total == 0 {
        return (0, 0);
    }

    let exact_buyer = total as f64 * buyer_split;
    let exact_listing = total as f64 * seller_split;

    match rounding {
        TransactionRounding::IndependentCeiling => (
            exact_buyer.ceil().max(0.0) as u64,
            exact_listing.ceil().max(0.0) as u64,
        ),
        TransactionRounding::LargestRemainder => {
            let mut buyer = (exact_buyer.floor().max(0.0) as u64).min(total);
            let listing_floor = exact_listing.floor().max(0.0) as u64;
            if buyer.saturating_add(listing_floor) < total
                && exact_buyer.fract() >= exact_listing.fract()
            {
                buyer += 1;
            }
            let buyer = buyer.min(total);
            (buyer, total - buyer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expenses::{ExpenseBook, ExpenseItem, Frequency};
    use crate::core::numeric::{Rate, RateValue};
    use crate::core::plan::ConversionRatesInput;
    use crate::core::types::ConversionRates;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn num(value: f64) -> Option<RawNumber> {
        Some(RawNumber::Number(value))
    }

    fn single_item_book(key: &str, annual: f64) -> ExpenseBook {
        let mut book = ExpenseBook::new();
        book.insert(
            key.to_string(),
            vec![ExpenseItem::new(format!("{key}-0"), "Total", annual, Frequency::Annually)],
        );
        book
    }

    fn sample_plan() -> PlanInput {
        PlanInput {
            net_income_goal: num(100_000.0),
            tax_rate: num(25.0),
            personal_expenses: Some(single_item_book("housing", 24_000.0)),
            business_expenses: Some(single_item_book("marketing", 12_000.0)),
            avg_sale_price: num(400_000.0),
            commission_rate: num(3.0),
            income_split: num(70.0),
            buyer_seller_split: num(50.0),
            team_split_buyers: num(0.0),
            team_split_sellers: num(0.0),
            ..PlanInput::default()
        }
    }

    fn assert_funnel_is_monotonic(funnel: &ActivityFunnel) {
        assert!(funnel.conversations >= funnel.appointments, "{funnel:?}");
        assert!(funnel.appointments >= funnel.agreements, "{funnel:?}");
        assert!(funnel.agreements >= funnel.contracts, "{funnel:?}");
        assert!(funnel.contracts >= funnel.closings, "{funnel:?}");
    }

    #[test]
    fn financial_summary_grosses_up_income_and_adds_expenses() {
        let summary = calculate_financial_summary(&sample_plan());
        assert_approx(summary.gross_income, 100_000.0 / 0.75);
        assert_approx(summary.personal_expenses, 24_000.0);
        assert_approx(summary.business_expenses, 12_000.0);
        assert_approx(summary.total_expenses, 36_000.0);
        assert_approx(summary.gci_required, 100_000.0 / 0.75 + 36_000.0);
        assert_approx(summary.tax_amount, 100_000.0 / 0.75 - 100_000.0);
        assert_approx(summary.tax_rate_decimal, 0.25);
        assert_approx(
            summary.gci_required,
            summary.gross_income + summary.total_expenses,
        );
    }

    #[test]
    fn financial_summary_skips_gross_up_at_confiscatory_tax_rates() {
        for tax_rate in [99.0, 100.0, 250.0] {
            let mut plan = sample_plan();
            plan.tax_rate = num(tax_rate);
            let summary = calculate_financial_summary(&plan);
            assert_eq!(summary.gross_income, summary.net_income_goal);
            assert!(summary.gross_income.is_finite());
            assert_approx(summary.tax_amount, 0.0);
            assert_approx(summary.tax_rate_decimal, MAX_TAX_RATE);
        }
    }

    #[test]
    fn financial_summary_clamps_negative_and_garbage_inputs() {
        let plan = PlanInput {
            net_income_goal: num(-50_000.0),
            tax_rate: Some(RawNumber::Text("lots".to_string())),
            ..PlanInput::default()
        };
        let summary = calculate_financial_summary(&plan);
        assert_approx(summary.net_income_goal, 0.0);
        assert_approx(summary.tax_rate_decimal, 0.0);
        assert_approx(summary.gross_income, 0.0);
        assert_approx(summary.gci_required, 0.0);
    }

    #[test]
    fn deal_structure_matches_hand_calculation() {
        let plan = sample_plan();
        let summary = calculate_financial_summary(&plan);
        let deals = calculate_deal_structure(&plan, &summary, &PlannerConfig::default());

        assert_approx(deals.gross_commission, 12_000.0);
        assert_approx(deals.base_net_commission, 8_400.0);
        assert_approx(deals.estimated_net_commission_per_deal, 8_400.0);
        // 169_333.33 / 8_400 = 20.16 -> 21
        assert_eq!(deals.total_deals_needed, 21);
        // Each side ceils 10.5 on its own.
        assert_eq!(deals.buyer_transactions, 11);
        assert_eq!(deals.listing_transactions, 11);
        assert_approx(deals.total_sales_volume, 21.0 * 400_000.0);
    }

    #[test]
    fn largest_remainder_rounding_conserves_the_deal_total() {
        let plan = sample_plan();
        let summary = calculate_financial_summary(&plan);
        let config = PlannerConfig {
            rounding: TransactionRounding::LargestRemainder,
            ..PlannerConfig::default()
        };
        let deals = calculate_deal_structure(&plan, &summary, &config);
        assert_eq!(deals.total_deals_needed, 21);
        assert_eq!(deals.buyer_transactions, 11);
        assert_eq!(deals.listing_transactions, 10);
    }

    #[test]
    fn deal_structure_applies_team_splits_per_side() {
        let mut plan = sample_plan();
        plan.team_split_buyers = num(50.0);
        plan.team_split_sellers = num(0.0);
        let summary = calculate_financial_summary(&plan);
        let deals = calculate_deal_structure(&plan, &summary, &PlannerConfig::default());
        // buyer net 4_200 * 0.5 + seller net 8_400 * 0.5
        assert_approx(deals.estimated_net_commission_per_deal, 6_300.0);
    }

    #[test]
    fn deal_structure_defaults_to_sixty_percent_buyers() {
        let mut plan = sample_plan();
        plan.buyer_seller_split = None;
        let summary = calculate_financial_summary(&plan);
        let deals = calculate_deal_structure(&plan, &summary, &PlannerConfig::default());
        assert_approx(deals.buyer_split, 0.6);
        assert_approx(deals.seller_split, 0.4);
    }

    #[test]
    fn zero_commission_means_zero_deals() {
        for (price, commission) in [(0.0, 3.0), (400_000.0, 0.0)] {
            let mut plan = sample_plan();
            plan.avg_sale_price = num(price);
            plan.commission_rate = num(commission);
            let targets = calculate_plan_targets(&plan);
            let deals = &targets.deal_structure;
            assert_eq!(deals.estimated_net_commission_per_deal, 0.0);
            assert_eq!(deals.total_deals_needed, 0);
            assert_eq!(deals.buyer_transactions, 0);
            assert_eq!(deals.listing_transactions, 0);
            assert_eq!(targets.activity_targets.totals, ActivityFunnel::default());
            assert_eq!(targets.monthly_breakdown, ActivityFunnel::default());
        }
    }

    #[test]
    fn tiny_goal_still_needs_one_deal() {
        let plan = PlanInput {
            net_income_goal: num(1.0),
            avg_sale_price: num(400_000.0),
            commission_rate: num(3.0),
            income_split: num(70.0),
            ..PlanInput::default()
        };
        let targets = calculate_plan_targets(&plan);
        assert_eq!(targets.total_deals_needed, 1);
    }

    #[test]
    fn funnel_with_default_buyer_rates_matches_hand_calculation() {
        let defaults = ConversionRates::default();
        let funnel = reverse_engineer_funnel(11, None, &defaults.buyer);
        assert_eq!(funnel.closings, 11);
        assert_eq!(funnel.contracts, 13);
        assert_eq!(funnel.agreements, 17);
        assert_eq!(funnel.appointments, 43);
        assert_eq!(funnel.conversations, 172);
    }

    #[test]
    fn funnel_resolves_percentages_tagged_rates_and_garbage() {
        let defaults = ConversionRates::default();
        let rates = StageRatesInput {
            conversation_to_appointment: Some(RateValue::from(50.0)),
            appointment_to_agreement: Some(RateValue::Tagged(Rate::Fraction(1.0))),
            agreement_to_contract: Some(RateValue::Raw(RawNumber::Text("oops".to_string()))),
            contract_to_close: Some(RateValue::from(-3.0)),
        };
        let resolved = resolve_stage_rates(Some(&rates), &defaults.listing);
        assert_approx(resolved.conversation_to_appointment, 0.5);
        assert_approx(resolved.appointment_to_agreement, 1.0);
        assert_approx(resolved.agreement_to_contract, 0.90);
        assert_approx(resolved.contract_to_close, 0.95);

        let funnel = reverse_engineer_funnel(10, Some(&rates), &defaults.listing);
        // 10 / 0.95 -> 11, 11 / 0.9 -> 13, 13 / 1.0 -> 13, 13 / 0.5 -> 26
        assert_eq!(funnel.contracts, 11);
        assert_eq!(funnel.agreements, 13);
        assert_eq!(funnel.appointments, 13);
        assert_eq!(funnel.conversations, 26);
    }

    #[test]
    fn listing_side_falls_back_to_listing_defaults() {
        let plan = PlanInput {
            conversion_rates: Some(ConversionRatesInput {
                buyer: None,
                listing: Some(StageRatesInput::default()),
            }),
            ..sample_plan()
        };
        let targets = calculate_plan_targets(&plan);
        let defaults = ConversionRates::default();
        assert_eq!(
            targets.activity_targets.listing,
            reverse_engineer_funnel(11, None, &defaults.listing)
        );
        assert_eq!(
            targets.activity_targets.buyer,
            reverse_engineer_funnel(11, None, &defaults.buyer)
        );
    }

    #[test]
    fn injected_default_rates_replace_the_stock_table() {
        let mut default_rates = ConversionRates::default();
        default_rates.buyer.conversation_to_appointment = 0.5;
        let config = PlannerConfig {
            default_rates,
            ..PlannerConfig::default()
        };
        let targets = calculate_plan_targets_with(&sample_plan(), &config);
        assert_eq!(targets.activity_targets.buyer.appointments, 43);
        assert_eq!(targets.activity_targets.buyer.conversations, 86);
    }

    #[test]
    fn plan_targets_flatten_totals_and_monthly_cadence() {
        let targets = calculate_plan_targets(&sample_plan());
        let totals = targets.activity_targets.totals;
        let buyer = targets.activity_targets.buyer;
        let listing = targets.activity_targets.listing;

        assert_eq!(totals.conversations, buyer.conversations + listing.conversations);
        assert_eq!(totals.closings, 22);
        assert_eq!(targets.total_closings, totals.closings);
        assert_eq!(targets.total_conversations, totals.conversations);
        assert_eq!(targets.total_appointments, totals.appointments);
        assert_eq!(targets.total_agreements, totals.agreements);
        assert_eq!(targets.total_contracts, totals.contracts);
        assert_eq!(targets.buyer_deals, 11);
        assert_eq!(targets.listing_deals, 11);
        assert_eq!(targets.monthly_breakdown.closings, 2);
        assert_eq!(
            targets.monthly_breakdown.conversations,
            totals.conversations.div_ceil(12)
        );
        assert_approx(targets.gci_required, targets.financial_summary.gci_required);
    }

    #[test]
    fn plan_targets_serialize_with_camel_case_keys() {
        let targets = calculate_plan_targets(&sample_plan());
        let json = serde_json::to_string(&targets).expect("targets serialize");
        assert!(json.contains("\"financialSummary\""));
        assert!(json.contains("\"estimatedNetCommissionPerDeal\""));
        assert!(json.contains("\"monthlyBreakdown\""));
        assert!(json.contains("\"gciRequired\""));
        assert!(json.contains("\"taxRateDecimal\""));
    }

    #[test]
    fn empty_plan_degrades_to_zero_targets() {
        let targets = calculate_plan_targets(&PlanInput::default());
        assert_eq!(targets.total_deals_needed, 0);
        assert_approx(targets.gci_required, 0.0);
        assert_eq!(targets.activity_targets.totals, ActivityFunnel::default());
    }

    #[test]
    fn non_finite_inputs_fall_back_to_zero_targets() {
        let plan = PlanInput {
            net_income_goal: num(f64::NAN),
            tax_rate: num(f64::INFINITY),
            avg_sale_price: num(f64::NEG_INFINITY),
            commission_rate: num(f64::NAN),
            income_split: Some(RawNumber::Text("NaN".to_string())),
            ..PlanInput::default()
        };
        let targets = calculate_plan_targets(&plan);
        assert_approx(targets.financial_summary.net_income_goal, 0.0);
        assert_approx(targets.financial_summary.tax_rate_decimal, 0.0);
        assert_approx(targets.deal_structure.avg_sale_price, 0.0);
        assert_eq!(targets.total_deals_needed, 0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_funnel_is_monotonic_for_any_rates(
            closings in 0u64..5_000_000,
            conversation_bp in 1u32..10_001,
            appointment_bp in 1u32..10_001,
            agreement_bp in 1u32..10_001,
            contract_bp in 1u32..10_001
        ) {
            let fraction = |bp: u32| Some(RateValue::from(Rate::Fraction(bp as f64 / 10_000.0)));
            let rates = StageRatesInput {
                conversation_to_appointment: fraction(conversation_bp),
                appointment_to_agreement: fraction(appointment_bp),
                agreement_to_contract: fraction(agreement_bp),
                contract_to_close: fraction(contract_bp),
            };
            let defaults = ConversionRates::default().buyer;
            let funnel = reverse_engineer_funnel(closings, Some(&rates), &defaults);
            prop_assert_eq!(funnel.closings, closings);
            prop_assert!(funnel.conversations >= funnel.appointments);
            prop_assert!(funnel.appointments >= funnel.agreements);
            prop_assert!(funnel.agreements >= funnel.contracts);
            prop_assert!(funnel.contracts >= funnel.closings);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_outputs_are_non_negative_and_idempotent(
            net_income in -1.0e7f64..1.0e7,
            tax_rate in -50.0f64..150.0,
            expense in -1.0e6f64..1.0e6,
            price in -1.0e6f64..5.0e6,
            commission in -5.0f64..20.0,
            income_split in -20.0f64..150.0,
            buyer_split in -20.0f64..150.0,
            team_buyers in -20.0f64..150.0,
            team_sellers in -20.0f64..150.0,
            largest_remainder in any::<bool>()
        ) {
            let plan = PlanInput {
                net_income_goal: num(net_income),
                tax_rate: num(tax_rate),
                personal_expenses: Some(single_item_book("misc", expense)),
                avg_sale_price: num(price),
                commission_rate: num(commission),
                income_split: num(income_split),
                buyer_seller_split: num(buyer_split),
                team_split_buyers: num(team_buyers),
                team_split_sellers: num(team_sellers),
                ..PlanInput::default()
            };
            let config = PlannerConfig {
                rounding: if largest_remainder {
                    TransactionRounding::LargestRemainder
                } else {
                    TransactionRounding::IndependentCeiling
                },
                ..PlannerConfig::default()
            };

            let first = calculate_plan_targets_with(&plan, &config);
            let second = calculate_plan_targets_with(&plan, &config);
            prop_assert_eq!(&first, &second);

            let summary = &first.financial_summary;
            for value in [
                summary.personal_expenses,
                summary.business_expenses,
                summary.total_expenses,
                summary.tax_amount,
                summary.gross_income,
                summary.gci_required,
                summary.net_income_goal,
                summary.tax_rate_decimal,
            ] {
                prop_assert!(value >= 0.0, "negative summary value {}", value);
            }

            let deals = &first.deal_structure;
            for value in [
                deals.avg_sale_price,
                deals.commission_rate,
                deals.income_split,
                deals.buyer_split,
                deals.seller_split,
                deals.gross_commission,
                deals.base_net_commission,
                deals.estimated_net_commission_per_deal,
                deals.total_sales_volume,
            ] {
                prop_assert!(value >= 0.0, "negative deal value {}", value);
            }

            if largest_remainder {
                prop_assert_eq!(
                    deals.buyer_transactions.saturating_add(deals.listing_transactions),
                    deals.total_deals_needed
                );
            } else if deals.total_deals_needed > 0 {
                prop_assert!(
                    deals.buyer_transactions.saturating_add(deals.listing_transactions)
                        <= deals.total_deals_needed.saturating_add(1)
                );
            }

            for funnel in [
                &first.activity_targets.buyer,
                &first.activity_targets.listing,
                &first.activity_targets.totals,
            ] {
                assert_funnel_is_monotonic(funnel);
            }
        }
    }
}
