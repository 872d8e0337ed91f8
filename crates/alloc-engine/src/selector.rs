//! 分配候選批次選擇（FEFO）

use alloc_core::{AllocationPolicy, Lot, LotStatus};
use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;

/// 候選查詢條件
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    /// 產品ID
    pub product_id: String,

    /// 交貨地點（已解析為履行該地點的倉庫鍵）
    pub delivery_place_id: Option<String>,

    /// 結果數量上限
    pub limit: Option<usize>,

    /// 基準日期（效期判定與近效期警告）
    pub as_of: NaiveDate,
}

impl CandidateQuery {
    /// 創建新的查詢
    pub fn new(product_id: String, as_of: NaiveDate) -> Self {
        Self {
            product_id,
            delivery_place_id: None,
            limit: None,
            as_of,
        }
    }

    /// 建構器模式：設置交貨地點
    pub fn with_delivery_place(mut self, delivery_place_id: String) -> Self {
        self.delivery_place_id = Some(delivery_place_id);
        self
    }

    /// 建構器模式：設置結果上限
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// 候選批次
#[derive(Debug, Clone, Serialize)]
pub struct LotCandidate {
    /// 批次ID
    pub lot_id: String,

    /// 可自由分配數量
    pub free_qty: Decimal,

    /// 到期日
    pub expiry_date: Option<NaiveDate>,

    /// 收貨日期
    pub received_date: NaiveDate,
}

/// 候選選擇結果
///
/// 空結果為合法答案，不視為錯誤；警告為非致命，由呼叫端呈現。
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSelection {
    pub items: Vec<LotCandidate>,
    pub warnings: Vec<String>,
}

/// 候選批次選擇器
pub struct CandidateSelector;

impl CandidateSelector {
    /// 選出可分配批次並依 FEFO 排序
    ///
    /// 資格：產品相符、指定地點時倉庫相符、基準日推導狀態為可用、
    /// 可用量大於零。排序：到期日升冪（無到期日排最後）→
    /// 收貨日升冪 → 批次ID升冪（決定性平手裁定）。
    pub fn select(
        lots: &[&Lot],
        query: &CandidateQuery,
        policy: &AllocationPolicy,
    ) -> CandidateSelection {
        let mut items: Vec<LotCandidate> = lots
            .par_iter()
            .filter(|lot| lot.product_id == query.product_id)
            .filter(|lot| {
                query
                    .delivery_place_id
                    .as_deref()
                    .map_or(true, |warehouse| lot.warehouse_id == warehouse)
            })
            .filter(|lot| crate::status::derive_lot_status(lot, query.as_of) == LotStatus::Active)
            .map(|lot| LotCandidate {
                lot_id: lot.lot_id.clone(),
                free_qty: lot.available_quantity(),
                expiry_date: lot.expiry_date,
                received_date: lot.received_date,
            })
            .filter(|candidate| candidate.free_qty > Decimal::ZERO)
            .collect();

        items.sort_by(|a, b| {
            compare_expiry(a.expiry_date, b.expiry_date)
                .then_with(|| a.received_date.cmp(&b.received_date))
                .then_with(|| a.lot_id.cmp(&b.lot_id))
        });

        let mut warnings = Vec::new();
        if items.is_empty() {
            match &query.delivery_place_id {
                Some(place) => warnings.push(format!("交貨地點 {} 沒有可用批次", place)),
                None => warnings.push(format!("產品 {} 沒有可用批次", query.product_id)),
            }
        } else if let Some(first) = items.first() {
            if let Some(expiry) = first.expiry_date {
                let days = (expiry - query.as_of).num_days();
                if days <= policy.near_expiry_warn_days as i64 {
                    warnings.push(format!(
                        "最近效期批次 {} 將於 {} 天內到期",
                        first.lot_id, days
                    ));
                }
            }
        }

        if let Some(limit) = query.limit {
            items.truncate(limit);
        }

        CandidateSelection { items, warnings }
    }
}

/// 到期日比較：無到期日排最後
fn compare_expiry(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(lot_id: &str, current: i64, expiry: Option<NaiveDate>) -> Lot {
        let mut lot = Lot::new(
            lot_id.to_string(),
            "PROD-A".to_string(),
            "WH-01".to_string(),
            date(2024, 12, 1),
            Decimal::from(current),
        );
        lot.expiry_date = expiry;
        lot
    }

    #[test]
    fn test_fefo_ordering_with_null_expiry_last() {
        // 效期 [2025-03-01, 2025-01-15, 無] 應排序為 [2025-01-15, 2025-03-01, 無]
        let a = lot("LOT-A", 10, Some(date(2025, 3, 1)));
        let b = lot("LOT-B", 10, Some(date(2025, 1, 15)));
        let c = lot("LOT-C", 10, None);
        let lots = vec![&a, &b, &c];

        let query = CandidateQuery::new("PROD-A".to_string(), date(2024, 12, 15));
        let selection = CandidateSelector::select(&lots, &query, &AllocationPolicy::new());

        let ids: Vec<&str> = selection.items.iter().map(|c| c.lot_id.as_str()).collect();
        assert_eq!(ids, vec!["LOT-B", "LOT-A", "LOT-C"]);
    }

    #[test]
    fn test_tie_break_by_received_then_lot_id() {
        let mut a = lot("LOT-2", 10, Some(date(2025, 3, 1)));
        a.received_date = date(2024, 11, 20);
        let mut b = lot("LOT-1", 10, Some(date(2025, 3, 1)));
        b.received_date = date(2024, 11, 20);
        let mut c = lot("LOT-0", 10, Some(date(2025, 3, 1)));
        c.received_date = date(2024, 11, 25);
        let lots = vec![&a, &b, &c];

        let query = CandidateQuery::new("PROD-A".to_string(), date(2024, 12, 15));
        let selection = CandidateSelector::select(&lots, &query, &AllocationPolicy::new());

        // 同效期：收貨日早者優先，再依批次ID升冪
        let ids: Vec<&str> = selection.items.iter().map(|c| c.lot_id.as_str()).collect();
        assert_eq!(ids, vec!["LOT-1", "LOT-2", "LOT-0"]);
    }

    #[test]
    fn test_filters_status_and_free_qty() {
        let active = lot("LOT-A", 10, None);
        let empty = lot("LOT-B", 0, None);
        let mut quarantine = lot("LOT-C", 10, None);
        quarantine.status = LotStatus::Quarantine;
        let expired = lot("LOT-D", 10, Some(date(2024, 1, 1)));
        let mut fully_allocated = lot("LOT-E", 10, None);
        fully_allocated.allocated_quantity = Decimal::from(10);
        let lots = vec![&active, &empty, &quarantine, &expired, &fully_allocated];

        let query = CandidateQuery::new("PROD-A".to_string(), date(2024, 12, 15));
        let selection = CandidateSelector::select(&lots, &query, &AllocationPolicy::new());

        assert_eq!(selection.items.len(), 1);
        assert_eq!(selection.items[0].lot_id, "LOT-A");
    }

    #[test]
    fn test_empty_result_is_warning_not_error() {
        let a = lot("LOT-A", 10, None);
        let lots = vec![&a];

        let query = CandidateQuery::new("PROD-A".to_string(), date(2024, 12, 15))
            .with_delivery_place("WH-99".to_string());
        let selection = CandidateSelector::select(&lots, &query, &AllocationPolicy::new());

        assert!(selection.items.is_empty());
        assert_eq!(selection.warnings.len(), 1);
        assert!(selection.warnings[0].contains("WH-99"));
    }

    #[test]
    fn test_near_expiry_warning() {
        let a = lot("LOT-A", 10, Some(date(2025, 1, 5)));
        let lots = vec![&a];

        let query = CandidateQuery::new("PROD-A".to_string(), date(2024, 12, 30));
        let policy = AllocationPolicy::new().with_near_expiry_warn_days(7);
        let selection = CandidateSelector::select(&lots, &query, &policy);

        assert_eq!(selection.warnings.len(), 1);
        assert!(selection.warnings[0].contains("LOT-A"));
    }

    #[test]
    fn test_limit() {
        let a = lot("LOT-A", 10, Some(date(2025, 1, 1)));
        let b = lot("LOT-B", 10, Some(date(2025, 2, 1)));
        let c = lot("LOT-C", 10, Some(date(2025, 3, 1)));
        let lots = vec![&a, &b, &c];

        let query = CandidateQuery::new("PROD-A".to_string(), date(2024, 6, 1)).with_limit(2);
        let selection = CandidateSelector::select(&lots, &query, &AllocationPolicy::new());

        assert_eq!(selection.items.len(), 2);
        assert_eq!(selection.items[0].lot_id, "LOT-A");
    }
}
