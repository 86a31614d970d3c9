use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::numeric::{RawNumber, to_number};

/// Category key -> line items.
pub type ExpenseBook = BTreeMap<String, Vec<ExpenseItem>>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<Value>")]
pub enum Frequency {
    Monthly,
    #[default]
    Annually,
}

// Only "monthly" scales an amount; anything else is taken as already annual.
impl From<Option<Value>> for Frequency {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(Value::String(text)) if text == "monthly" => Frequency::Monthly,
            _ => Frequency::Annually,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub frequency: Frequency,
}

impl ExpenseItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        amount: f64,
        frequency: Frequency,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            amount: Some(RawNumber::Number(amount)),
            frequency,
        }
    }
}

/// Template for one expense category shown in the planner.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCategory {
    pub key: &'static str,
    pub label: &'static str,
    pub default_items: &'static [&'static str],
}

pub const PERSONAL_EXPENSE_CATEGORIES: &[ExpenseCategory] = &[
    ExpenseCategory {
        key: "housingUtilities",
        label: "Housing & Utilities",
        default_items: &[
            "Mortgage/Rent",
            "Utilities: Electricity",
            "Utilities: Gas",
            "Internet",
            "Mobile Phone",
            "Water",
        ],
    },
    ExpenseCategory {
        key: "transportation",
        label: "Transportation",
        default_items: &[
            "Car Payment",
            "Car Gas/Electricity",
            "Car Insurance",
            "Car Maintenance",
        ],
    },
    ExpenseCategory {
        key: "lifestyle",
        label: "Lifestyle & Entertainment",
        default_items: &[
            "Streaming Apps",
            "Food / Entertainment",
            "Travel",
            "Shopping & Clothing",
        ],
    },
    ExpenseCategory {
        key: "healthcare",
        label: "Healthcare & Insurance",
        default_items: &["Health Insurance"],
    },
    ExpenseCategory {
        key: "familyFinancial",
        label: "Family & Financial",
        default_items: &["Child Care", "Savings", "Credit Cards"],
    },
    ExpenseCategory {
        key: "other",
        label: "Other",
        default_items: &["Other 1", "Other 2", "Other 3", "Other 4", "Other 5"],
    },
];

pub const BUSINESS_EXPENSE_CATEGORIES: &[ExpenseCategory] = &[
    ExpenseCategory {
        key: "professionalFees",
        label: "Professional Fees & Dues",
        default_items: &[
            "Association Dues/Fees",
            "RPAC Contributions",
            "MLS Fees",
            "MLS Application",
            "License Renewals / Applications",
        ],
    },
    ExpenseCategory {
        key: "officeInsurance",
        label: "Office & Insurance",
        default_items: &[
            "Office Desk Fees",
            "E&O Insurance",
            "Additional Brokerage Fees",
            "Keycard & Lockbox",
        ],
    },
    ExpenseCategory {
        key: "professionalDevelopment",
        label: "Professional Development",
        default_items: &["CE Credits / Certifications", "Coaching / Training Fees"],
    },
    ExpenseCategory {
        key: "marketingOperations",
        label: "Marketing & Operations",
        default_items: &[
            "Marketing & Advertising",
            "Printing & Signage",
            "Mail & Postage",
            "Client Gifts / Events",
        ],
    },
    ExpenseCategory {
        key: "technologyStaffing",
        label: "Technology & Staffing",
        default_items: &["Software Subscriptions", "Payroll / Employees"],
    },
    ExpenseCategory {
        key: "other",
        label: "Other",
        default_items: &["Other"],
    },
];

/// Negative amounts count as zero so expense totals stay non-negative.
pub fn to_annual_amount(amount: Option<&RawNumber>, frequency: Frequency) -> f64 {
    let value = to_number(amount, 0.0);
    if value <= 0.0 {
        return 0.0;
    }
    match frequency {
        Frequency::Monthly => value * 12.0,
        Frequency::Annually => value,
    }
}

pub fn sum_expense_category(items: &[ExpenseItem]) -> f64 {
    items
        .iter()
        .map(|item| to_annual_amount(item.amount.as_ref(), item.frequency))
        .sum()
}

pub fn sum_expense_book(book: &ExpenseBook) -> f64 {
    book.values().map(|items| sum_expense_category(items)).sum()
}

pub fn initialize_expense_categories(categories: &[ExpenseCategory]) -> ExpenseBook {
    categories
        .iter()
        .map(|category| {
            let items = category
                .default_items
                .iter()
                .enumerate()
                .map(|(index, name)| ExpenseItem {
                    id: format!("{}-{index}", category.key),
                    name: (*name).to_string(),
                    amount: None,
                    frequency: Frequency::Monthly,
                })
                .collect();
            (category.key.to_string(), items)
        })
        .collect()
}

/// Overlays a saved book on the current templates. Default items are replaced by the
/// saved item of the same name; saved items with unknown names are appended.
pub fn merge_expense_book(saved: Option<&ExpenseBook>, defaults: &ExpenseBook) -> ExpenseBook {
    let mut merged = ExpenseBook::new();
    let empty = Vec::new();

    let saved_keys = saved.into_iter().flat_map(|book| book.keys());
    for key in defaults.keys().chain(saved_keys) {
        if merged.contains_key(key) {
            continue;
        }
        let saved_items = saved.and_then(|book| book.get(key)).unwrap_or(&empty);
        let default_items = defaults.get(key).unwrap_or(&empty);

        let by_name: HashMap<&str, &ExpenseItem> = saved_items
            .iter()
            .map(|item| (item.name.as_str(), item))
            .collect();

        let mut items: Vec<ExpenseItem> = default_items
            .iter()
            .map(|item| (*by_name.get(item.name.as_str()).unwrap_or(&item)).clone())
            .collect();
        items.extend(
            saved_items
                .iter()
                .filter(|item| !default_items.iter().any(|d| d.name == item.name))
                .cloned(),
        );

        merged.insert(key.clone(), items);
    }

    merged
}
