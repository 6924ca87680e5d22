// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: String,
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub payday_day: Option<u32>,
    /// Share of a shared expense the payer keeps, in percent.
    #[serde(default)]
    pub default_split_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Removed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdMember {
    pub id: String,
    pub household_id: String,
    pub user_id: String,
    pub status: MemberStatus,
    pub role: MemberRole,
    /// Personal payday; overrides the household's.
    #[serde(default)]
    pub payday_day: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub balance: Decimal,
    pub currency: String,
    #[serde(default)]
    pub is_excluded_from_budget: bool,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// Signed effect of `amount` on an account balance.
    pub fn balance_delta(self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("Unknown transaction type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroup {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub display_order: i32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_by_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category_group_id: Option<String>,
    #[serde(default)]
    pub created_by_user_id: Option<String>,
}

/// Import-time payee pattern pointing at a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMapping {
    pub id: String,
    pub user_id: String,
    pub pattern: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub household_id: String,
    pub account_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub payee: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub paid_by_user_id: Option<String>,
    #[serde(default)]
    pub is_excluded_from_budget: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub allocated_amount: Decimal,
    pub spent_amount: Decimal,
    pub percentage: Decimal,
    #[serde(default)]
    pub category_group: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub id: String,
    pub user_id: String,
    pub total_income: Decimal,
    pub total_allocated: Decimal,
    pub total_spent: Decimal,
    /// Start of the pay period the rows were last reset for.
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedExpenseSplit {
    pub id: String,
    pub transaction_id: String,
    pub ower_user_id: String,
    pub owed_to_user_id: String,
    pub split_amount: Decimal,
    pub split_percentage: Decimal,
    pub is_paid: bool,
    #[serde(default)]
    pub settlement_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub id: String,
    pub household_id: String,
    pub payer_user_id: String,
    pub receiver_user_id: String,
    pub amount: Decimal,
    pub payer_account_id: String,
    pub receiver_account_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub split_ids: Vec<String>,
    #[serde(default)]
    pub payee: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTemplate {
    pub id: String,
    pub user_id: String,
    pub household_id: String,
    pub account_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    #[serde(default)]
    pub payee: String,
    pub recurring_day: u32,
    pub is_active: bool,
    #[serde(default)]
    pub last_created_date: Option<NaiveDate>,
}
