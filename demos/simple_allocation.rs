//! 簡單分配流程示例

use chrono::{NaiveDate, Utc};
use lot_alloc::{
    AllocationEngine, AllocationPolicy, AllocationRequest, CandidateQuery, Lot, Order, OrderLine,
};
use rust_decimal::Decimal;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== 簡單分配流程示例 ===\n");

    let mut engine = AllocationEngine::new(AllocationPolicy::new(), 600);
    let now = Utc::now();
    let today = now.date_naive();

    // 收貨三個批次（不同效期）
    engine.receive_lot(
        Lot::new(
            "LOT-001".to_string(),
            "PROD-A".to_string(),
            "WH-01".to_string(),
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            Decimal::from(60),
        )
        .with_expiry_date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()),
    )?;
    engine.receive_lot(
        Lot::new(
            "LOT-002".to_string(),
            "PROD-A".to_string(),
            "WH-01".to_string(),
            NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
            Decimal::from(40),
        )
        .with_expiry_date(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()),
    )?;
    engine.receive_lot(Lot::new(
        "LOT-003".to_string(),
        "PROD-A".to_string(),
        "WH-01".to_string(),
        NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
        Decimal::from(100),
    ))?;

    // 建立訂單與訂單行（需求 80）
    engine.add_order(Order::new(
        "ORDER-001".to_string(),
        "CUST-001".to_string(),
        today,
    ))?;
    engine.add_order_line(OrderLine::new(
        "LINE-001".to_string(),
        "ORDER-001".to_string(),
        "PROD-A".to_string(),
        Decimal::from(80),
        today + chrono::Days::new(14),
    ))?;

    // 候選查詢（FEFO：最早到期優先，無到期日排最後）
    let selection =
        engine.select_candidates(&CandidateQuery::new("PROD-A".to_string(), today));
    println!("候選批次（FEFO 排序）:");
    for candidate in &selection.items {
        println!(
            "  - {}: 可用 {}, 到期 {:?}",
            candidate.lot_id, candidate.free_qty, candidate.expiry_date
        );
    }
    for warning in &selection.warnings {
        println!("  警告: {}", warning);
    }

    // 取得編輯鎖後依候選順序提交
    let grant = engine.acquire_lock("ORDER-001", "demo-session", now);
    println!("\n編輯鎖取得: {}", grant.granted);

    let requests: Vec<AllocationRequest> = selection
        .items
        .iter()
        .take(2)
        .map(|candidate| {
            AllocationRequest::new(candidate.lot_id.clone(), candidate.free_qty.min(Decimal::from(40)))
        })
        .collect();
    let commit = engine.commit_allocations("demo-session", "LINE-001", &requests, now)?;

    println!(
        "提交結果: 已分配 {} / 餘量 {} / 進度 {}% / 狀態 {:?}",
        commit.allocated_total, commit.remaining, commit.progress_pct, commit.line_status
    );

    engine.release_lock("ORDER-001", "demo-session");

    for event in engine.drain_events() {
        println!("事件: {:?}", event);
    }

    Ok(())
}
