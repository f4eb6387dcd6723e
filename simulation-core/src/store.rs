//! External collaborator interfaces
//!
//! The engine reads patterns and companies through [`PatternStore`] and
//! hands finished results to a [`ResultSink`]. How either is backed is
//! not the engine's concern; the in-memory implementations here serve
//! tests and embedded use.

use crate::error::{Error, Result};
use crate::ledger::SimulationResults;
use crate::types::{Company, ExpensePattern, RevenuePattern};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Read-only source of companies and their recurring patterns
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Revenue patterns configured for a company
    async fn list_revenue_patterns(&self, company_id: &str) -> Result<Vec<RevenuePattern>>;

    /// Expense patterns configured for a company
    async fn list_expense_patterns(&self, company_id: &str) -> Result<Vec<ExpensePattern>>;

    /// Company by id
    async fn get_company(&self, company_id: &str) -> Result<Company>;
}

/// Receiver of finished simulation results
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist or forward one result value
    async fn publish(&self, results: &SimulationResults) -> Result<()>;
}

/// In-memory pattern store
#[derive(Default)]
pub struct InMemoryPatternStore {
    companies: RwLock<HashMap<String, Company>>,
    revenues: RwLock<HashMap<String, Vec<RevenuePattern>>>,
    expenses: RwLock<HashMap<String, Vec<ExpensePattern>>>,
}

impl InMemoryPatternStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a company
    pub async fn insert_company(&self, company: Company) {
        self.companies
            .write()
            .await
            .insert(company.id.clone(), company);
    }

    /// Insert a revenue pattern for a company
    pub async fn insert_revenue(&self, company_id: &str, pattern: RevenuePattern) {
        self.revenues
            .write()
            .await
            .entry(company_id.to_string())
            .or_default()
            .push(pattern);
    }

    /// Insert an expense pattern for a company
    pub async fn insert_expense(&self, company_id: &str, pattern: ExpensePattern) {
        self.expenses
            .write()
            .await
            .entry(company_id.to_string())
            .or_default()
            .push(pattern);
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn list_revenue_patterns(&self, company_id: &str) -> Result<Vec<RevenuePattern>> {
        Ok(self
            .revenues
            .read()
            .await
            .get(company_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_expense_patterns(&self, company_id: &str) -> Result<Vec<ExpensePattern>> {
        Ok(self
            .expenses
            .read()
            .await
            .get(company_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_company(&self, company_id: &str) -> Result<Company> {
        self.companies
            .read()
            .await
            .get(company_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("company {company_id}")))
    }
}

/// In-memory result sink, recording every published result
#[derive(Default)]
pub struct InMemoryResultSink {
    results: RwLock<Vec<SimulationResults>>,
}

impl InMemoryResultSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded results, oldest first
    pub async fn recorded(&self) -> Vec<SimulationResults> {
        self.results.read().await.clone()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn publish(&self, results: &SimulationResults) -> Result<()> {
        self.results.write().await.push(results.clone());
        Ok(())
    }
}
