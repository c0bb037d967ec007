use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use parkd::config::FeeSchedule;
use parkd::payment::{AutoApproveGateway, PaymentGateway};
use parkd::tenant::TenantManager;
use parkd::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("parkd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(
        dir,
        FeeSchedule::default(),
        Duration::from_secs(300),
        "parking_updates".to_string(),
    ));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            let gateway: Arc<dyn PaymentGateway> = Arc::new(AutoApproveGateway);
            tokio::spawn(async move {
                let _ = wire::process_connection(
                    socket,
                    tm,
                    gateway,
                    Duration::from_secs(5),
                    "parkd".to_string(),
                    None,
                )
                .await;
            });
        }
    });

    (addr, tm)
}

async fn connect(addr: SocketAddr, dbname: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(dbname)
        .user("parkd")
        .password("parkd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn seed_spot(client: &tokio_postgres::Client, total: u32) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO spots (id, name, address, lat, lng, rate_cents, total_spots, zone) \
             VALUES ('{id}', 'Mission Garage', '501 Mission St', 37.78, -122.4, 250, {total}, 'downtown')"
        ))
        .await
        .unwrap();
    id
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn connect_insert_and_select_spot() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;

    let id = seed_spot(&client, 12).await;
    let rows = data_rows(client.simple_query("SELECT * FROM spots").await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(id.to_string().as_str()));
    assert_eq!(rows[0].get("name"), Some("Mission Garage"));
    assert_eq!(rows[0].get("total_spots"), Some("12"));
    assert_eq!(rows[0].get("available_spots"), Some("12"));
    assert_eq!(rows[0].get("active"), Some("t"));
}

#[tokio::test]
async fn session_lifecycle_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;

    let spot_id = seed_spot(&client, 3).await;

    // Create: the engine mints the id and returns the row.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "INSERT INTO sessions (plate, spot_id, duration_min, cost_cents) \
                 VALUES ('abc123', '{spot_id}', 60, 255)"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    let session_id = rows[0].get("id").unwrap().to_string();
    assert_eq!(rows[0].get("plate"), Some("ABC123"));
    assert_eq!(rows[0].get("status"), Some("active"));
    assert_eq!(rows[0].get("fee_paid_cents"), Some("5"));
    assert_eq!(rows[0].get("fee_saved_cents"), Some("32"));

    // Capacity moved.
    let rows = data_rows(client.simple_query("SELECT * FROM spots").await.unwrap());
    assert_eq!(rows[0].get("available_spots"), Some("2"));

    // Active lookup, case-insensitive.
    let rows = data_rows(
        client
            .simple_query("SELECT * FROM sessions WHERE plate = 'ABC123' AND status = 'active'")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(session_id.as_str()));
    assert_eq!(rows[0].get("is_expired"), Some("f"));

    // Extend.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "UPDATE sessions SET additional_min = 30, additional_cost_cents = 120 \
                 WHERE id = '{session_id}'"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows[0].get("duration_min"), Some("90"));
    assert_eq!(rows[0].get("cost_cents"), Some("375"));

    // Cancel releases the capacity unit.
    let rows = data_rows(
        client
            .simple_query(&format!("DELETE FROM sessions WHERE id = '{session_id}'"))
            .await
            .unwrap(),
    );
    assert_eq!(rows[0].get("status"), Some("cancelled"));

    let rows = data_rows(client.simple_query("SELECT * FROM spots").await.unwrap());
    assert_eq!(rows[0].get("available_spots"), Some("3"));

    // Active lookup now comes back empty, not as an error.
    let rows = data_rows(
        client
            .simple_query("SELECT * FROM sessions WHERE plate = 'ABC123' AND status = 'active'")
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());
}

#[tokio::test]
async fn paid_session_settles_a_payment() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;

    let spot_id = seed_spot(&client, 2).await;
    let rows = data_rows(
        client
            .simple_query(&format!(
                "INSERT INTO sessions (plate, spot_id, duration_min, cost_cents, paid) \
                 VALUES ('ABC123', '{spot_id}', 60, 255, true)"
            ))
            .await
            .unwrap(),
    );
    let payment_id = rows[0].get("payment_id").unwrap().to_string();
    assert!(!payment_id.is_empty());

    let rows = data_rows(
        client
            .simple_query(&format!("SELECT * FROM payments WHERE id = '{payment_id}'"))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status"), Some("succeeded"));
    assert_eq!(rows[0].get("amount_cents"), Some("255"));
    assert!(rows[0].get("receipt").is_some());
}

#[tokio::test]
async fn charge_webhook_flow_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;

    let rows = data_rows(
        client
            .simple_query(
                "INSERT INTO payments (plate, amount_cents, fee_cents, charge_ref) \
                 VALUES ('ABC123', 255, 5, 'ch_wire_1')",
            )
            .await
            .unwrap(),
    );
    assert_eq!(rows[0].get("status"), Some("pending"));

    let rows = data_rows(
        client
            .simple_query(
                "UPDATE payments SET status = 'succeeded', receipt = 'https://r/1' \
                 WHERE charge_ref = 'ch_wire_1'",
            )
            .await
            .unwrap(),
    );
    assert_eq!(rows[0].get("status"), Some("succeeded"));
    assert_eq!(rows[0].get("receipt"), Some("https://r/1"));

    // Lookup by charge reference.
    let rows = data_rows(
        client
            .simple_query("SELECT * FROM payments WHERE charge_ref = 'ch_wire_1'")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("plate"), Some("ABC123"));
}

#[tokio::test]
async fn engine_errors_carry_sqlstate() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;

    // Session against a spot that does not exist.
    let missing = Ulid::new();
    let err = client
        .simple_query(&format!(
            "INSERT INTO sessions (plate, spot_id, duration_min, cost_cents) \
             VALUES ('ABC123', '{missing}', 60, 255)"
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err.as_db_error().unwrap().code(),
        &SqlState::RAISE_EXCEPTION
    );

    // Unparseable dialect.
    let err = client
        .simple_query("SELECT * FROM garages")
        .await
        .unwrap_err();
    assert_eq!(err.as_db_error().unwrap().code(), &SqlState::SYNTAX_ERROR);
}

#[tokio::test]
async fn history_and_stats_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;

    let spot_id = seed_spot(&client, 1).await;
    for _ in 0..3 {
        let rows = data_rows(
            client
                .simple_query(&format!(
                    "INSERT INTO sessions (plate, spot_id, duration_min, cost_cents) \
                     VALUES ('ABC123', '{spot_id}', 60, 100)"
                ))
                .await
                .unwrap(),
        );
        let id = rows[0].get("id").unwrap().to_string();
        client
            .simple_query(&format!("DELETE FROM sessions WHERE id = '{id}'"))
            .await
            .unwrap();
    }

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM sessions WHERE plate = 'ABC123' AND page = 1 AND per_page = 2")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("total"), Some("3"));
    assert_eq!(rows[0].get("pages"), Some("2"));

    let rows = data_rows(client.simple_query("SELECT * FROM stats").await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("total_spots"), Some("1"));
    assert_eq!(rows[0].get("total_revenue_cents"), Some("300"));

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM stats WHERE plate = 'ABC123'")
            .await
            .unwrap(),
    );
    assert_eq!(rows[0].get("total_sessions"), Some("3"));
}

#[tokio::test]
async fn tenants_are_isolated_by_database_name() {
    let (addr, _tm) = start_test_server().await;
    let east = connect(addr, "garage_east").await;
    let west = connect(addr, "garage_west").await;

    seed_spot(&east, 5).await;
    let rows = data_rows(east.simple_query("SELECT * FROM spots").await.unwrap());
    assert_eq!(rows.len(), 1);

    let rows = data_rows(west.simple_query("SELECT * FROM spots").await.unwrap());
    assert!(rows.is_empty());
}

#[tokio::test]
async fn disconnect_does_not_wedge_the_server() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "test").await;
    seed_spot(&client, 2).await;
    drop(client);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client2 = connect(addr, "test").await;
    let rows = data_rows(client2.simple_query("SELECT * FROM spots").await.unwrap());
    assert_eq!(rows.len(), 1);
}
