//! 分配引擎門面
//!
//! 將儲存、交易管理器、拆分器與編輯鎖註冊表組合為對外的邏輯操作。
//! 編輯鎖前置條件在此檢查：僅當「其他」操作者持有存活鎖時拒絕變更；
//! 操作會話自身是否必須持鎖由策略旗標決定。

use alloc_core::{
    order, quantity, AllocError, Allocation, AllocationDraft, AllocationPolicy, LineStatus, Lot,
    Order, OrderLine, Result,
};
use alloc_engine::{
    AllocationManager, AllocationRequest, AllocationStore, CancelResult, CandidateQuery,
    CandidateSelection, CandidateSelector, CommitResult, DistributionEntry, DistributionResult,
    DistributionSplitter, DomainEvent, QuantityDelta, QuantityLedger, RematchResult, SplitResult,
    SplitTarget,
};
use alloc_lock::{EditLockRegistry, LockGrant};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// 訂單行進度（讀取時計算的派生數字）
#[derive(Debug, Clone, Serialize)]
pub struct LineProgress {
    pub allocated_total: Decimal,
    pub remaining: Decimal,
    pub progress_pct: u32,
    pub status: LineStatus,
}

/// 分配引擎
pub struct AllocationEngine {
    store: AllocationStore,
    manager: AllocationManager,
    splitter: DistributionSplitter,
    locks: EditLockRegistry,
    policy: AllocationPolicy,
}

impl AllocationEngine {
    /// 創建新的引擎（編輯鎖閒置逾時以秒計）
    pub fn new(policy: AllocationPolicy, lock_timeout_secs: i64) -> Self {
        Self {
            store: AllocationStore::new(),
            manager: AllocationManager::new(policy.clone()),
            splitter: DistributionSplitter::new(policy.clone()),
            locks: EditLockRegistry::new(lock_timeout_secs),
            policy,
        }
    }

    // ---- 狀態載入 ----

    /// 收貨建立批次
    pub fn receive_lot(&mut self, lot: Lot) -> Result<()> {
        tracing::debug!("收貨批次 {}：{} {}", lot.lot_id, lot.current_quantity, lot.unit);
        self.store.insert_lot(lot)
    }

    /// 建立訂單
    pub fn add_order(&mut self, order: Order) -> Result<()> {
        self.store.insert_order(order)
    }

    /// 建立訂單行
    pub fn add_order_line(&mut self, line: OrderLine) -> Result<()> {
        self.store.insert_line(line)
    }

    // ---- 查詢 ----

    /// 候選批次查詢（FEFO 排序）
    pub fn select_candidates(&self, query: &CandidateQuery) -> CandidateSelection {
        let lots = self.store.lots();
        CandidateSelector::select(&lots, query, &self.policy)
    }

    /// 獲取批次
    pub fn lot(&self, lot_id: &str) -> Result<&Lot> {
        self.store.lot(lot_id)
    }

    /// 獲取訂單行
    pub fn order_line(&self, line_id: &str) -> Result<&OrderLine> {
        self.store.line(line_id)
    }

    /// 訂單行的存活分配
    pub fn line_allocations(&self, line_id: &str) -> Vec<&Allocation> {
        self.store.line_allocations(line_id)
    }

    /// 訂單行進度
    pub fn line_progress(&self, line_id: &str) -> Result<LineProgress> {
        let line = self.store.line(line_id)?;
        let allocated_total = self.store.line_allocated_total(line_id);
        Ok(LineProgress {
            allocated_total,
            remaining: (line.order_quantity - allocated_total).max(Decimal::ZERO),
            progress_pct: order::progress_pct(line.order_quantity, allocated_total),
            status: line.status,
        })
    }

    // ---- 編輯鎖 ----

    /// 取得訂單編輯鎖（失敗為非致命，呼叫端降級為唯讀）
    pub fn acquire_lock(&self, order_id: &str, actor_id: &str, now: DateTime<Utc>) -> LockGrant {
        self.locks.acquire(order_id, actor_id, now)
    }

    /// 釋放訂單編輯鎖
    pub fn release_lock(&self, order_id: &str, actor_id: &str) -> bool {
        self.locks.release(order_id, actor_id)
    }

    /// 檢查編輯鎖前置條件
    fn check_lock(&self, order_id: &str, actor_id: &str, now: DateTime<Utc>) -> Result<()> {
        if let Some(holder) = self.locks.holder(order_id, now) {
            if holder != actor_id {
                return Err(AllocError::LineLocked {
                    order_id: order_id.to_string(),
                    holder,
                });
            }
            return Ok(());
        }
        if self.policy.require_edit_lock {
            return Err(AllocError::LineLocked {
                order_id: order_id.to_string(),
                holder: "未持有編輯鎖".to_string(),
            });
        }
        Ok(())
    }

    fn owning_order(&self, line_id: &str) -> Result<String> {
        Ok(self.store.line(line_id)?.order_id.clone())
    }

    // ---- 交易操作 ----

    /// 提交分配
    pub fn commit_allocations(
        &mut self,
        actor_id: &str,
        line_id: &str,
        requests: &[AllocationRequest],
        now: DateTime<Utc>,
    ) -> Result<CommitResult> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        self.locks.touch(&order_id, actor_id, now);
        self.manager.commit(&mut self.store, line_id, requests)
    }

    /// 由舊格式輸入提交分配（輸入邊界一次性正規化後走一般提交）
    pub fn commit_allocation_drafts(
        &mut self,
        actor_id: &str,
        line_id: &str,
        drafts: &[AllocationDraft],
        now: DateTime<Utc>,
    ) -> Result<CommitResult> {
        let requests: Vec<AllocationRequest> = drafts
            .iter()
            .map(|draft| {
                let mut request = AllocationRequest::new(draft.lot_id.clone(), draft.quantity);
                if let Some(place) = &draft.delivery_place_id {
                    request = request.with_delivery_place(place.clone());
                }
                request
            })
            .collect();
        self.commit_allocations(actor_id, line_id, &requests, now)
    }

    /// 取消分配
    pub fn cancel_allocations(
        &mut self,
        actor_id: &str,
        line_id: &str,
        allocation_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<CancelResult> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        self.locks.touch(&order_id, actor_id, now);
        self.manager.cancel(&mut self.store, line_id, allocation_ids)
    }

    /// 訂單行重新匹配
    pub fn re_match_line(
        &mut self,
        actor_id: &str,
        line_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RematchResult> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        self.locks.touch(&order_id, actor_id, now);
        self.manager
            .rematch(&mut self.store, line_id, now.date_naive())
    }

    /// 整張訂單重新匹配（已出貨/結案/取消的行不參與）
    pub fn re_match_order(
        &mut self,
        actor_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RematchResult> {
        self.store.order(order_id)?;
        self.check_lock(order_id, actor_id, now)?;
        self.locks.touch(order_id, actor_id, now);

        let mut new_allocation_ids = Vec::new();
        let mut unmet_quantity = Decimal::ZERO;
        for line_id in self.store.lines_of_order(order_id) {
            if !self.store.line(&line_id)?.status.is_editable() {
                continue;
            }
            let result = self
                .manager
                .rematch(&mut self.store, &line_id, now.date_naive())?;
            new_allocation_ids.extend(result.new_allocation_ids);
            unmet_quantity += result.unmet_quantity;
        }

        Ok(RematchResult {
            new_allocation_ids,
            unmet_quantity,
        })
    }

    /// 儲存交貨地點分配
    pub fn save_distribution(
        &mut self,
        actor_id: &str,
        line_id: &str,
        entries: &[DistributionEntry],
        now: DateTime<Utc>,
    ) -> Result<DistributionResult> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        self.locks.touch(&order_id, actor_id, now);
        self.splitter
            .save_distribution(&mut self.store, &self.manager, line_id, entries)
    }

    /// 批次拆分（供應側 smart split）
    pub fn split_lot(&mut self, lot_id: &str, targets: &[SplitTarget]) -> Result<SplitResult> {
        self.splitter.split_lot(&mut self.store, lot_id, targets)
    }

    // ---- 批次管理操作 ----

    /// 管理凍結批次數量
    pub fn lock_quantity(&mut self, lot_id: &str, locked: Decimal) -> Result<()> {
        if !quantity::is_positive(locked) {
            return Err(AllocError::InvalidQuantity(locked));
        }
        let lot = self.store.lot_mut(lot_id)?;
        QuantityLedger::apply(lot, &QuantityDelta::lock(quantity::quantize(locked)))
    }

    /// 解除管理凍結
    pub fn unlock_quantity(&mut self, lot_id: &str, unlocked: Decimal) -> Result<()> {
        if !quantity::is_positive(unlocked) {
            return Err(AllocError::InvalidQuantity(unlocked));
        }
        let lot = self.store.lot_mut(lot_id)?;
        QuantityLedger::apply(lot, &QuantityDelta::unlock(quantity::quantize(unlocked)))
    }

    /// 軟性保留（暫留；保留當下不得超過可用量）
    pub fn reserve(&mut self, lot_id: &str, reserved: Decimal) -> Result<()> {
        if !quantity::is_positive(reserved) {
            return Err(AllocError::InvalidQuantity(reserved));
        }
        let lot = self.store.lot_mut(lot_id)?;
        QuantityLedger::apply(lot, &QuantityDelta::reserve(quantity::quantize(reserved)))
    }

    /// 釋放軟性保留
    pub fn release_reservation(&mut self, lot_id: &str, released: Decimal) -> Result<()> {
        if !quantity::is_positive(released) {
            return Err(AllocError::InvalidQuantity(released));
        }
        let lot = self.store.lot_mut(lot_id)?;
        QuantityLedger::apply(lot, &QuantityDelta::release(quantity::quantize(released)))
    }

    /// 封存批次（僅轉換狀態，未出貨承諾不受影響）
    pub fn archive_lot(&mut self, lot_id: &str) -> Result<()> {
        let lot = self.store.lot_mut(lot_id)?;
        lot.status = alloc_core::LotStatus::Archived;
        Ok(())
    }

    // ---- 訂單行生命週期 ----

    /// 開立草稿訂單行
    pub fn open_line(&mut self, actor_id: &str, line_id: &str, now: DateTime<Utc>) -> Result<()> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        let line = self.store.line_mut(line_id)?;
        if line.status != LineStatus::Draft {
            return Err(AllocError::LineNotEditable {
                line_id: line_id.to_string(),
                status: line.status,
            });
        }
        line.status = LineStatus::Open;
        Ok(())
    }

    /// 出貨訂單行（部分或完全分配後）
    pub fn ship_line(&mut self, actor_id: &str, line_id: &str, now: DateTime<Utc>) -> Result<()> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        let line = self.store.line_mut(line_id)?;
        if !matches!(
            line.status,
            LineStatus::PartAllocated | LineStatus::Allocated
        ) {
            return Err(AllocError::LineNotEditable {
                line_id: line_id.to_string(),
                status: line.status,
            });
        }
        line.status = LineStatus::Shipped;
        Ok(())
    }

    /// 結案訂單行（出貨後）
    pub fn close_line(&mut self, actor_id: &str, line_id: &str, now: DateTime<Utc>) -> Result<()> {
        let order_id = self.owning_order(line_id)?;
        self.check_lock(&order_id, actor_id, now)?;
        let line = self.store.line_mut(line_id)?;
        if line.status != LineStatus::Shipped {
            return Err(AllocError::LineNotEditable {
                line_id: line_id.to_string(),
                status: line.status,
            });
        }
        line.status = LineStatus::Closed;
        Ok(())
    }

    /// 取消訂單行（出貨前；同筆交易內歸還全部分配）
    pub fn cancel_line(&mut self, actor_id: &str, line_id: &str, now: DateTime<Utc>) -> Result<()> {
        let line = self.store.line(line_id)?.clone();
        if !line.status.can_cancel() {
            return Err(AllocError::LineNotEditable {
                line_id: line_id.to_string(),
                status: line.status,
            });
        }
        self.check_lock(&line.order_id, actor_id, now)?;

        let allocation_ids: Vec<Uuid> = self
            .store
            .line_allocations(line_id)
            .iter()
            .map(|a| a.allocation_id)
            .collect();
        if !allocation_ids.is_empty() {
            self.manager
                .cancel(&mut self.store, line_id, &allocation_ids)?;
        }
        self.store.line_mut(line_id)?.status = LineStatus::Cancelled;
        Ok(())
    }

    // ---- 事件 ----

    /// 擷取待處理領域事件（通知/稽核協作者消費）
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        self.store.drain_events()
    }
}
