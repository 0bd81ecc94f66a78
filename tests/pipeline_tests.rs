use std::collections::BTreeSet;
use std::time::Duration;

use heatportal::{
    extract_menu, filter_menu, normalize_delta, EventBus, ParamAddress, ParamStore, ParamUpdate,
    ParamValue,
};
use serde_json::json;

fn value_update(addr: &str, v: f64) -> ParamUpdate {
    ParamUpdate::new(
        "D1",
        ParamAddress::parse(addr).unwrap(),
        Some(ParamValue::Number(v)),
    )
}

async fn settle(store: &ParamStore, addr: &str) {
    for _ in 0..200 {
        if store.get(addr).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store never observed {addr}");
}

#[tokio::test]
async fn scenario_a_value_then_metadata_only() {
    let bus = EventBus::new();
    let store = ParamStore::new();
    let subscription = bus.subscribe();
    let consumer = {
        let store = store.clone();
        tokio::spawn(async move { store.run_with_bus(subscription).await })
    };

    bus.publish(value_update("P4.v1", 20.5));

    let mut meta_only = ParamUpdate::new("D1", ParamAddress::parse("P4.s1").unwrap(), None);
    meta_only.metadata.insert("storable".to_string(), json!(1));
    bus.publish(meta_only);
    // A trailing marker so we know both earlier updates were consumed.
    bus.publish(value_update("P9.v9", 1.0));
    settle(&store, "P9.v9").await;

    assert_eq!(store.get("P4.v1"), Some(ParamValue::Number(20.5)));
    assert!(!store.flatten().contains_key("P4.s1"));

    consumer.abort();
}

#[tokio::test]
async fn scenario_b_two_subscribers_identical_order_and_sequence() {
    let bus = EventBus::new();
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();

    bus.publish(value_update("P4.v1", 1.0));
    bus.publish(value_update("P4.v2", 2.0));
    bus.publish(value_update("P4.v3", 3.0));

    let drain = |sub: &mut heatportal::Subscription| -> Vec<(String, u64)> {
        std::iter::from_fn(|| sub.try_next())
            .map(|u| (u.address.to_string(), u.sequence))
            .collect()
    };
    let a = drain(&mut first);
    let b = drain(&mut second);

    assert_eq!(a.len(), 3);
    assert_eq!(a, b);
    assert_eq!(
        a.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn scenario_c_menu_filtering_end_to_end() {
    let src = r#"var routes=[{path:"root",name:"MENU.ROOT",children:[
        {path:"a",name:"MENU.A",meta:{permissionModule:"X.A",read:["PARAM_1"]}},
        {path:"b",name:"MENU.B",meta:{permissionModule:"X.B",read:["PARAM_2"]}},
    ]}];"#;
    let tree = extract_menu(src).unwrap();

    let granted: BTreeSet<String> = ["X.A".to_string()].into();
    let visible = filter_menu(&tree, &granted).unwrap().unwrap();

    assert_eq!(visible.path_segment, "root");
    assert_eq!(visible.children.len(), 1);
    assert_eq!(visible.children[0].path_segment, "a");
}

#[tokio::test]
async fn scenario_d_malformed_addresses_never_reach_the_store() {
    let store = ParamStore::new();

    // The codec refuses the string and point lookups stay silent.
    assert!(ParamAddress::parse("garbage").is_err());
    assert_eq!(store.get("garbage"), None);

    // Normalization drops the unresolvable fragments before they can touch
    // the store; the well-formed sibling still lands.
    let payload = json!({"D1": {"garbage": {"1": {"v": 1.0}}, "P4": {"1": {"v": 2.0}}}});
    for update in normalize_delta(&payload) {
        store.upsert(&update);
    }
    let flat = store.flatten();
    assert_eq!(flat.len(), 1);
    assert_eq!(flat["P4.v1"], ParamValue::Number(2.0));
}

#[tokio::test]
async fn no_leak_before_subscribe() {
    let bus = EventBus::new();
    bus.publish(value_update("P4.v1", 1.0));

    let mut sub = bus.subscribe();
    bus.publish(value_update("P4.v2", 2.0));
    bus.publish(value_update("P4.v3", 3.0));

    let seen: Vec<String> = std::iter::from_fn(|| sub.try_next())
        .map(|u| u.address.to_string())
        .collect();
    assert_eq!(seen, vec!["P4.v2", "P4.v3"]);
}

#[tokio::test]
async fn independent_stores_on_one_bus() {
    let bus = EventBus::new();
    let lightweight = ParamStore::new();
    let mirror = ParamStore::new();

    let consumers: Vec<_> = [lightweight.clone(), mirror.clone()]
        .into_iter()
        .map(|store| {
            let subscription = bus.subscribe();
            tokio::spawn(async move { store.run_with_bus(subscription).await })
        })
        .collect();

    bus.publish(value_update("P4.v1", 20.5));
    bus.publish(value_update("P4.s1", 3.0));
    settle(&lightweight, "P4.s1").await;
    settle(&mirror, "P4.s1").await;

    assert_eq!(lightweight.flatten(), mirror.flatten());

    for c in consumers {
        c.abort();
    }
}
