//! 批次拆分（smart split）示例

use chrono::{NaiveDate, Utc};
use lot_alloc::{
    AllocationEngine, AllocationPolicy, AllocationRequest, Lot, Order, OrderLine, SplitTarget,
};
use rust_decimal::Decimal;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== 批次拆分示例 ===\n");

    let mut engine = AllocationEngine::new(AllocationPolicy::new(), 600);
    let now = Utc::now();
    let today = now.date_naive();

    // 單一批次 100，兩條訂單行各承諾 30 / 45
    engine.receive_lot(Lot::new(
        "LOT-100".to_string(),
        "PROD-B".to_string(),
        "WH-02".to_string(),
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
        Decimal::from(100),
    ))?;
    engine.add_order(Order::new(
        "ORDER-010".to_string(),
        "CUST-002".to_string(),
        today,
    ))?;
    for (line_id, quantity) in [("LINE-A", 30i64), ("LINE-B", 45)] {
        engine.add_order_line(OrderLine::new(
            line_id.to_string(),
            "ORDER-010".to_string(),
            "PROD-B".to_string(),
            Decimal::from(quantity),
            today + chrono::Days::new(30),
        ))?;
    }

    let first = engine.commit_allocations(
        "demo-session",
        "LINE-A",
        &[AllocationRequest::new(
            "LOT-100".to_string(),
            Decimal::from(30),
        )],
        now,
    )?;
    let second = engine.commit_allocations(
        "demo-session",
        "LINE-B",
        &[AllocationRequest::new(
            "LOT-100".to_string(),
            Decimal::from(45),
        )],
        now,
    )?;

    println!(
        "拆分前: current={}, allocated={}",
        engine.lot("LOT-100")?.current_quantity,
        engine.lot("LOT-100")?.allocated_quantity
    );

    // 拆分：LINE-A 的承諾留在原批次，LINE-B 的承諾移到新批次
    let result = engine.split_lot(
        "LOT-100",
        &[
            SplitTarget::new("LOT-100".to_string(), first.allocation_ids.clone()),
            SplitTarget::new("LOT-100-B".to_string(), second.allocation_ids.clone()),
        ],
    )?;

    println!("新批次: {:?}", result.new_lot_ids);
    println!("留在原批次的自由庫存: {}", result.remainder_quantity);
    println!(
        "拆分後原批次: current={}, allocated={}",
        engine.lot("LOT-100")?.current_quantity,
        engine.lot("LOT-100")?.allocated_quantity
    );
    println!(
        "拆分後新批次: current={}, allocated={}",
        engine.lot("LOT-100-B")?.current_quantity,
        engine.lot("LOT-100-B")?.allocated_quantity
    );

    Ok(())
}
