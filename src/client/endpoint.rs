//! Named upstream endpoints

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared response shape of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `data` is a single object
    Object,
    /// `data` holds one page of rows plus paging metadata
    Paginated,
}

/// Fixed set of endpoints, defined at startup. Every one is a signed form
/// POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    PoolStats,
    Account,
    Hashrate,
    PaymentHistory,
    AccountOverview,
    WorkerList,
}

impl Endpoint {
    /// Path appended to the configured base URL
    pub fn path(&self) -> &'static str {
        match self {
            Self::PoolStats => "/poolStats.htm",
            Self::Account => "/account.htm",
            Self::Hashrate => "/hashrate.htm",
            Self::PaymentHistory => "/paymentHistoryV2.htm",
            Self::AccountOverview => "/accountOverview.htm",
            Self::WorkerList => "/userWorkerList.htm",
        }
    }

    pub fn shape(&self) -> ResponseShape {
        match self {
            Self::PaymentHistory | Self::WorkerList => ResponseShape::Paginated,
            _ => ResponseShape::Object,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PoolStats => "pool_stats",
            Self::Account => "account",
            Self::Hashrate => "hashrate",
            Self::PaymentHistory => "payment_history",
            Self::AccountOverview => "account_overview",
            Self::WorkerList => "worker_list",
        }
    }

    /// Extra form fields that switch an endpoint into paged mode
    pub fn paging_params(&self, page: u32, page_size: u32) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), page.to_string()),
            ("pageSize".to_string(), page_size.to_string()),
        ];
        if matches!(self, Self::PaymentHistory) {
            params.push(("pageEnable".to_string(), "1".to_string()));
        }
        params
    }

    pub fn all() -> [Self; 6] {
        [
            Self::PoolStats,
            Self::Account,
            Self::Hashrate,
            Self::PaymentHistory,
            Self::AccountOverview,
            Self::WorkerList,
        ]
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginated_endpoints() {
        let paginated: Vec<_> = Endpoint::all()
            .into_iter()
            .filter(|e| e.shape() == ResponseShape::Paginated)
            .collect();
        assert_eq!(
            paginated,
            vec![Endpoint::PaymentHistory, Endpoint::WorkerList]
        );
    }

    #[test]
    fn test_paging_params() {
        let params = Endpoint::WorkerList.paging_params(2, 50);
        assert_eq!(
            params,
            vec![
                ("page".to_string(), "2".to_string()),
                ("pageSize".to_string(), "50".to_string())
            ]
        );
        assert!(Endpoint::PaymentHistory
            .paging_params(1, 10)
            .contains(&("pageEnable".to_string(), "1".to_string())));
    }

    #[test]
    fn test_paths_and_names_are_distinct() {
        let mut paths: Vec<_> = Endpoint::all().iter().map(Endpoint::path).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), 6);
        assert!(paths.iter().all(|p| p.starts_with('/') && p.ends_with(".htm")));
        assert_eq!(Endpoint::PoolStats.to_string(), "pool_stats");
    }
}
