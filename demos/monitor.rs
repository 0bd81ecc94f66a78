use std::env;

use heatportal::{EventBus, ParamStore, PortalGateway};

#[tokio::main]
async fn main() -> heatportal::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let base_url = args.get(1).expect("usage: monitor <base-url> <email> <password>");
    let email = args.get(2).expect("usage: monitor <base-url> <email> <password>");
    let password = args.get(3).expect("usage: monitor <base-url> <email> <password>");

    let bus = EventBus::new();
    let store = ParamStore::new();

    // Subscribe before priming: the bus never replays.
    let subscription = bus.subscribe();
    let mut watcher = bus.subscribe();
    {
        let store = store.clone();
        tokio::spawn(async move { store.run_with_bus(subscription).await });
    }

    let mut gateway = PortalGateway::builder(base_url.clone())
        .credentials(email.clone(), password.clone())
        .bus(bus)
        .build();

    println!("Logging in to {base_url}...");
    gateway.login().await?;
    let count = gateway.prime().await?;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    println!("Primed {count} updates into {} families.", store.len());

    while let Some(update) = watcher.next().await {
        match &update.value {
            Some(value) => println!("#{} {} = {value:?}", update.sequence, update.address),
            None => println!("#{} {} (metadata only)", update.sequence, update.address),
        }
    }
    Ok(())
}
