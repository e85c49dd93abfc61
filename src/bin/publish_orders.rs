//! Demo feed publisher: puts generated orders on the orders topic.

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use order_lookup::domain::order::{Delivery, Item, Order, Payment};
use order_lookup::messaging::OrderPublisher;

#[derive(Parser, Debug)]
#[command(name = "publish_orders")]
#[command(about = "Publish generated orders to the order feed")]
struct Args {
    /// Number of orders to publish
    #[arg(default_value = "1")]
    count: usize,

    /// Also publish one payload without an order_uid
    #[arg(long)]
    malformed: bool,

    #[arg(long, env = "KAFKA_BROKERS", default_value = "127.0.0.1:9092")]
    brokers: String,

    #[arg(long, env = "ORDERS_TOPIC", default_value = "orders")]
    topic: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let publisher = OrderPublisher::new(&args.brokers)?;

    for n in 0..args.count {
        let order = generated_order(n);
        publisher.publish_order(&args.topic, &order).await?;
        println!("{}", order.order_uid);
    }

    if args.malformed {
        let payload = serde_json::json!({
            "date_created": Utc::now(),
            "items": [],
        });
        publisher
            .publish_raw(&args.topic, "malformed", payload.to_string().as_bytes())
            .await?;
        tracing::info!("Published payload without order_uid");
    }

    tracing::info!(
        count = args.count,
        circuit = ?publisher.circuit_state().await,
        "Done publishing"
    );
    Ok(())
}

fn generated_order(n: usize) -> Order {
    let order_uid = uuid::Uuid::new_v4().simple().to_string();
    let track_number = format!("WBILM{:08}", n);
    let price = 100 + (n as i64 % 50) * 10;
    let sale = (n % 4) as i32 * 10;
    let total_price = price * (100 - sale as i64) / 100;

    let mut order = Order::new(order_uid.clone(), Utc::now());
    order.track_number = Some(track_number.clone());
    order.entry = Some("WBIL".to_string());
    order.locale = Some("en".to_string());
    order.customer_id = Some(format!("customer-{}", n % 7));
    order.delivery_service = Some("meest".to_string());
    order.shard_key = Some((n % 10).to_string());
    order.sm_id = Some(99);
    order.oof_shard = Some("1".to_string());
    order.delivery = Some(Delivery {
        name: "Test Testov".to_string(),
        phone: "+9720000000".to_string(),
        zip: "2639809".to_string(),
        city: "Kiryat Mozkin".to_string(),
        address: "Ploshad Mira 15".to_string(),
        region: "Kraiot".to_string(),
        email: "test@gmail.com".to_string(),
    });
    order.payment = Some(Payment {
        transaction: Some(order_uid),
        currency: Some("USD".to_string()),
        provider: Some("wbpay".to_string()),
        amount: Some(total_price + 1500),
        payment_dt: Some(Utc::now().timestamp()),
        bank: Some("alpha".to_string()),
        delivery_cost: Some(1500),
        goods_total: Some(total_price),
        custom_fee: Some(0),
        ..Default::default()
    });
    order.items = vec![Item {
        chrt_id: Some(9934930 + n as i64),
        track_number: Some(track_number),
        price: Some(price),
        rid: Some(uuid::Uuid::new_v4().simple().to_string()),
        name: Some("Mascaras".to_string()),
        sale: Some(sale),
        size: Some("0".to_string()),
        total_price: Some(total_price),
        nm_id: Some(2389212),
        brand: Some("Vivienne Sabo".to_string()),
        status: Some(202),
    }];
    order
}
