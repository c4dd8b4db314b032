// amm_sor_rs/demos/route_demo.rs

use amm_sor_rs::{
    parse_pools_json, RegistryHandle, Router, RouterConfig, SwapCostCalculator, SwapType,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const POOLS: &str = r#"{
    "pools": [
        {
            "id": "weth-dai-80-20",
            "address": "0x1000000000000000000000000000000000000001",
            "poolType": "Weighted",
            "swapFee": "0.003",
            "totalShares": "10000",
            "totalWeight": "1",
            "tokens": [
                { "address": "0xWETH", "balance": "400", "decimals": 18, "weight": "0.8" },
                { "address": "0xDAI", "balance": "200000", "decimals": 18, "weight": "0.2" }
            ]
        },
        {
            "id": "weth-dai-50-50",
            "address": "0x1000000000000000000000000000000000000002",
            "poolType": "Weighted",
            "swapFee": "0.002",
            "totalShares": "10000",
            "totalWeight": "1",
            "tokens": [
                { "address": "0xWETH", "balance": "250", "decimals": 18, "weight": "0.5" },
                { "address": "0xDAI", "balance": "500000", "decimals": 18, "weight": "0.5" }
            ]
        },
        {
            "id": "weth-usdc-50-50",
            "address": "0x1000000000000000000000000000000000000003",
            "poolType": "Weighted",
            "swapFee": "0.003",
            "totalShares": "10000",
            "totalWeight": "1",
            "tokens": [
                { "address": "0xWETH", "balance": "300", "decimals": 18, "weight": "0.5" },
                { "address": "0xUSDC", "balance": "600000", "decimals": 6, "weight": "0.5" }
            ]
        },
        {
            "id": "usdc-dai-stable",
            "address": "0x1000000000000000000000000000000000000004",
            "poolType": "Stable",
            "swapFee": "0.0004",
            "totalShares": "2000000",
            "amp": "200",
            "tokens": [
                { "address": "0xUSDC", "balance": "1000000", "decimals": 6 },
                { "address": "0xDAI", "balance": "1000000", "decimals": 18 }
            ]
        }
    ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    println!("AMM Smart Order Router Example");

    // 1. Load the pool snapshot
    let snapshots = parse_pools_json(POOLS)?;
    let registry = Arc::new(RegistryHandle::new(&snapshots));
    println!("Registry generation {} holds {} pools.", registry.load().generation(), registry.load().len());

    // 2. Price gas in the tokens we may optimize
    let mut costs = SwapCostCalculator::new();
    costs.set_native_asset_price("0xWETH", 1.0)?;
    costs.set_native_asset_price("0xDAI", 2000.0)?;

    // 3. Create Router
    let router = Router::new(Arc::clone(&registry), RouterConfig::default());

    // 4. Sell 40 WETH for DAI, then buy 50000 DAI with WETH
    for (swap_type, amount) in [(SwapType::ExactIn, 40.0), (SwapType::ExactOut, 50_000.0)] {
        let mut request = router.request("0xWETH", "0xDAI", swap_type, amount);
        request.options.gas_price = 20e9;
        let cost = request.cost_per_path(&costs);
        let plan = router.get_swaps(&request, cost)?;

        println!("\n{swap_type:?} {amount} (gas cost per path {cost:.6})");
        for step in &plan.swaps {
            println!(
                "  {} : {} -> {} amount {}",
                step.pool_id,
                plan.token_addresses[step.asset_in_index],
                plan.token_addresses[step.asset_out_index],
                step.amount
            );
        }
        println!("  return amount:            {:.6}", plan.return_amount);
        println!("  return amount after gas:  {:.6}", plan.return_amount_considering_fees);
        println!("  market spot price:        {:.6}", plan.market_sp);
        println!("{}", serde_json::to_string_pretty(&plan)?);
    }

    Ok(())
}
