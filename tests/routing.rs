// amm_sor_rs/tests/routing.rs
use amm_sor_rs::{
    parse_pools_json, PathBuilder, PoolFilter, PoolRegistry, PoolSnapshot, PricingContext,
    RegistryHandle, RouteRequest, RouteSelector, Router, RouterConfig, SnapshotToken, SorError,
    SwapOptions, SwapType,
};
use approx::assert_relative_eq;
use std::sync::Arc;

fn token(address: &str, balance: f64, weight: Option<f64>) -> SnapshotToken {
    SnapshotToken {
        address: address.to_string(),
        balance,
        decimals: 18,
        price_rate: None,
        weight,
    }
}

fn weighted(id: &str, a: &str, b: &str, balance_a: f64, balance_b: f64, swap_fee: f64) -> PoolSnapshot {
    PoolSnapshot {
        id: id.to_string(),
        address: format!("0x{id}"),
        pool_type: "Weighted".to_string(),
        swap_fee,
        total_shares: 1000.0,
        tokens: vec![token(a, balance_a, Some(0.5)), token(b, balance_b, Some(0.5))],
        tokens_list: vec![a.to_string(), b.to_string()],
        total_weight: Some(1.0),
        amp: None,
        expiry_time: None,
        unit_seconds: None,
        principal_token: None,
        base_token: None,
        swap_enabled: None,
    }
}

fn router(snapshots: &[PoolSnapshot]) -> Router {
    Router::new(Arc::new(RegistryHandle::new(snapshots)), RouterConfig::default())
}

fn scenario_a() -> Vec<PoolSnapshot> {
    vec![
        weighted("p1", "0xa", "0xb", 1000.0, 1000.0, 0.0),
        weighted("p2", "0xa", "0xb", 1000.0, 1000.0, 0.0),
    ]
}

#[test]
fn scenario_a_splits_across_both_pools() {
    let router = router(&scenario_a());
    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, 100.0);
    let plan = router.get_swaps(&request, 0.0).unwrap();

    assert_eq!(plan.swaps.len(), 2);
    for step in &plan.swaps {
        let raw: u128 = step.amount.parse().unwrap();
        assert!(raw > 0 && raw < 100_000_000_000_000_000_000);
    }
    let single = 1000.0 * 100.0 / 1100.0;
    assert!(plan.return_amount > single);
    assert_relative_eq!(plan.return_amount, 2.0 * 1000.0 * 50.0 / 1050.0, max_relative = 1e-9);
}

#[test]
fn split_sums_to_request_at_equal_marginal_prices() {
    let snapshots = vec![
        weighted("deep", "0xa", "0xb", 5000.0, 5000.0, 0.003),
        weighted("mid", "0xa", "0xb", 2000.0, 2100.0, 0.001),
        weighted("thin", "0xa", "0xb", 800.0, 750.0, 0.002),
    ];
    let registry = PoolRegistry::from_snapshots(&snapshots, 1);
    let config = RouterConfig::default();
    for swap_type in [SwapType::ExactIn, SwapType::ExactOut] {
        let paths = PathBuilder::new(&registry, PoolFilter::All, 4, PricingContext::default())
            .build("0xa", "0xb", swap_type);
        let allocation = RouteSelector::new(&config).select(&paths, 400.0, 0.0).unwrap();
        assert!(allocation.paths.len() > 1);
        assert_relative_eq!(allocation.total_amount(), 400.0, max_relative = 1e-12);
        let reference = allocation.paths[0].marginal_price;
        for used in &allocation.paths {
            assert_relative_eq!(used.marginal_price, reference, max_relative = 1e-8);
        }
    }
}

#[test]
fn scenario_b_reports_insufficient_liquidity() {
    let router = router(&scenario_a());
    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, 601.0);
    let err = router.get_swaps(&request, 0.0).unwrap_err();
    match err {
        SorError::InsufficientLiquidity { requested, available } => {
            assert_eq!(requested, 601.0);
            assert_relative_eq!(available, 600.0, max_relative = 1e-12);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn scenario_c_rejects_identical_tokens() {
    let router = router(&scenario_a());
    let request = RouteRequest::new("0xa", "0xA", SwapType::ExactOut, 1.0);
    assert!(matches!(router.get_swaps(&request, 0.0), Err(SorError::InvalidInput(_))));
}

#[test]
fn request_at_swap_limit_succeeds_and_beyond_fails() {
    let snapshots = vec![weighted("p1", "0xa", "0xb", 1000.0, 1000.0, 0.0)];
    let router = router(&snapshots);
    let registry = router.registry().load();
    let limit = PathBuilder::new(&registry, PoolFilter::All, 4, PricingContext::default())
        .build("0xa", "0xb", SwapType::ExactIn)[0]
        .limit;

    let at_limit = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, limit);
    let plan = router.get_swaps(&at_limit, 0.0).unwrap();
    assert_eq!(plan.swaps.len(), 1);

    let beyond = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, limit * (1.0 + 1e-12));
    assert!(matches!(
        router.get_swaps(&beyond, 0.0),
        Err(SorError::InsufficientLiquidity { .. })
    ));
}

#[test]
fn exact_out_plan_minimizes_input() {
    let snapshots = vec![
        weighted("p1", "0xa", "0xb", 1000.0, 1000.0, 0.0),
        weighted("p2", "0xa", "0xb", 3000.0, 3000.0, 0.0),
    ];
    let router = router(&snapshots);
    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactOut, 200.0);
    let plan = router.get_swaps(&request, 0.0).unwrap();

    let single = 3000.0 * (3000.0 / 2800.0 - 1.0);
    assert!(plan.return_amount < single);
    assert_eq!(plan.swap_amount_for_swaps, 200_000_000_000_000_000_000);
    let sum: u128 = plan.swaps.iter().map(|s| s.amount.parse::<u128>().unwrap()).sum();
    assert_eq!(sum, plan.swap_amount_for_swaps);
    // Input is rounded up.
    assert!(plan.return_amount_from_swaps as f64 >= plan.return_amount * 1e18 * (1.0 - 1e-15));
}

#[test]
fn two_hop_plan_chains_through_intermediate_token() {
    let snapshots = vec![
        weighted("ab", "0xa", "0xb", 1000.0, 1000.0, 0.001),
        weighted("bc", "0xb", "0xc", 1000.0, 1000.0, 0.001),
    ];
    let router = router(&snapshots);

    let request = RouteRequest::new("0xa", "0xc", SwapType::ExactIn, 10.0);
    let plan = router.get_swaps(&request, 0.0).unwrap();
    assert_eq!(plan.token_addresses, vec!["0xa", "0xb", "0xc"]);
    assert_eq!(plan.swaps.len(), 2);
    assert_eq!((plan.swaps[0].asset_in_index, plan.swaps[0].asset_out_index), (0, 1));
    assert_eq!((plan.swaps[1].asset_in_index, plan.swaps[1].asset_out_index), (1, 2));
    assert_eq!(plan.swaps[0].amount, "10000000000000000000");
    assert_eq!(plan.swaps[1].amount, "0");
    assert!(plan.return_amount > 0.0 && plan.return_amount < 10.0);

    let request = RouteRequest::new("0xa", "0xc", SwapType::ExactOut, 10.0);
    let plan = router.get_swaps(&request, 0.0).unwrap();
    assert_eq!(plan.swaps[0].pool_id, "bc");
    assert_eq!(plan.swaps[0].amount, "10000000000000000000");
    assert_eq!(plan.swaps[1].pool_id, "ab");
    assert_eq!(plan.swaps[1].amount, "0");
    assert!(plan.return_amount > 10.0);
}

#[test]
fn gas_cost_is_reflected_in_net_return() {
    let router = router(&scenario_a());
    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, 100.0);
    let plan = router.get_swaps(&request, 1.0).unwrap();
    assert_eq!(plan.swaps.len(), 2);
    assert_relative_eq!(
        plan.return_amount_considering_fees,
        plan.return_amount - 2.0,
        max_relative = 1e-12
    );
}

#[test]
fn pool_type_filter_restricts_candidates() {
    let mut snapshots = scenario_a();
    snapshots[1].pool_type = "LiquidityBootstrapping".to_string();
    let router = router(&snapshots);
    let options = SwapOptions {
        pool_type_filter: PoolFilter::LiquidityBootstrapping,
        ..SwapOptions::default()
    };
    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, 10.0).with_options(options);
    let plan = router.get_swaps(&request, 0.0).unwrap();
    assert_eq!(plan.swaps.len(), 1);
    assert_eq!(plan.swaps[0].pool_id, "p2");
}

#[test]
fn replaced_snapshot_does_not_affect_held_registry() {
    let router = router(&scenario_a());
    let held = router.registry().load();
    router.registry().replace(&[]);

    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, 10.0);
    assert!(router.get_swaps(&request, 0.0).unwrap().is_empty());
    let plan = router.route_on(&held, &request, 0.0).unwrap();
    assert!(!plan.is_empty());
}

const MIXED_POOLS: &str = r#"[
    {
        "id": "stable-usdc-dai",
        "address": "0xS",
        "poolType": "Stable",
        "swapFee": "0.0004",
        "totalShares": "20000",
        "amp": "200",
        "tokens": [
            { "address": "0xUSDC", "balance": "10000", "decimals": 6 },
            { "address": "0xDAI", "balance": "10000", "decimals": 18 }
        ]
    },
    {
        "id": "element-pt",
        "address": "0xE",
        "poolType": "Element",
        "swapFee": "0.001",
        "totalShares": "1000",
        "expiryTime": 2000000,
        "unitSeconds": 10000000,
        "principalToken": "0xPT",
        "baseToken": "0xUSDC",
        "tokens": [
            { "address": "0xUSDC", "balance": "1000", "decimals": 6 },
            { "address": "0xPT", "balance": "1000", "decimals": 6 }
        ]
    },
    {
        "id": "gyro",
        "address": "0xG",
        "poolType": "Gyro3",
        "swapFee": "0.001",
        "totalShares": "1",
        "tokens": []
    }
]"#;

#[test]
fn json_snapshot_routes_stable_pool() {
    let snapshots = parse_pools_json(MIXED_POOLS).unwrap();
    let router = router(&snapshots);
    assert_eq!(router.registry().load().len(), 2);

    let request = RouteRequest::new("0xUSDC", "0xDAI", SwapType::ExactIn, 100.0);
    let plan = router.get_swaps(&request, 0.0).unwrap();
    assert!(plan.return_amount > 99.9 && plan.return_amount < 100.0);
    assert_eq!(plan.swap_amount_for_swaps, 100_000_000);

    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["tokenIn"], "0xusdc");
    assert_eq!(json["swaps"][0]["poolId"], "stable-usdc-dai");
    assert_eq!(json["swaps"][0]["amount"], "100000000");
    assert_eq!(json["swaps"][0]["userData"], "0x");
    assert!(json["returnAmountFromSwaps"].is_string());
}

#[test]
fn element_pool_needs_a_timestamp() {
    let snapshots = parse_pools_json(MIXED_POOLS).unwrap();
    let router = router(&snapshots);

    let request = RouteRequest::new("0xUSDC", "0xPT", SwapType::ExactIn, 10.0);
    assert!(router.get_swaps(&request, 0.0).unwrap().is_empty());

    let options = SwapOptions {
        timestamp: Some(1_000_000),
        ..SwapOptions::default()
    };
    let plan = router.get_swaps(&request.with_options(options), 0.0).unwrap();
    assert_eq!(plan.swaps.len(), 1);
    // Principal trades at a discount before expiry.
    assert!(plan.return_amount > 10.0);
}

#[test]
fn unpriceable_element_pool_does_not_block_healthy_route() {
    let expiry = 2_000_000_000;
    let element = PoolSnapshot {
        pool_type: "Element".to_string(),
        total_shares: 10.0,
        tokens: vec![token("0xa", 1000.0, None), token("0xb", 10.0, None)],
        total_weight: None,
        expiry_time: Some(expiry),
        unit_seconds: Some(10_000_000),
        principal_token: Some("0xb".to_string()),
        base_token: Some("0xa".to_string()),
        ..weighted("e", "0xa", "0xb", 1000.0, 10.0, 0.001)
    };
    let router = router(&[element, weighted("w", "0xa", "0xb", 1000.0, 1000.0, 0.0)]);
    let options = SwapOptions {
        timestamp: Some(expiry - 100_000),
        ..SwapOptions::default()
    };
    let request = RouteRequest::new("0xa", "0xb", SwapType::ExactIn, 100.0).with_options(options);
    let plan = router.get_swaps(&request, 0.0).unwrap();

    assert!(!plan.is_empty());
    assert!(plan.return_amount.is_finite());
    assert!(plan.return_amount >= 1000.0 * 100.0 / 1100.0 - 1e-9);
    let sum: u128 = plan.swaps.iter().map(|s| s.amount.parse::<u128>().unwrap()).sum();
    assert_eq!(sum, plan.swap_amount_for_swaps);
}
