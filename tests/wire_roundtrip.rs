use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use covers::engine::EngineConfig;
use futures::{stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, Config, NoTls, Notification, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use covers::tenant::TenantManager;
use covers::wire;

// ── Test infrastructure ──────────────────────────────────────

/// 2025-11-15T18:00:00Z.
const SIX_PM: i64 = 1_763_229_600_000;
const MIN: i64 = 60_000;

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("covers_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, EngineConfig::default()));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "covers".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect(
    addr: SocketAddr,
    dbname: &str,
) -> (
    tokio_postgres::Client,
    mpsc::UnboundedReceiver<Notification>,
) {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(dbname)
        .user("host")
        .password("covers");

    let (client, mut connection) = config.connect(NoTls).await.unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let stream = stream::poll_fn(move |cx| connection.poll_message(cx));
        futures::pin_mut!(stream);
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(AsyncMessage::Notification(n)) => {
                    let _ = tx.send(n);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    (client, rx)
}

async fn recv_notification(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    timeout: Duration,
) -> Option<Notification> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

async fn query_rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &tokio_postgres::Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.unwrap_err();
    err.code().map(|c| c.code().to_string()).unwrap_or_default()
}

async fn add_table(client: &tokio_postgres::Client, name: &str, capacity: u32) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO tables (id, name, capacity) VALUES ('{id}', '{name}', {capacity})"
        ))
        .await
        .unwrap();
    id
}

async fn book(
    client: &tokio_postgres::Client,
    party: u32,
    start: i64,
    minutes: i64,
) -> SimpleQueryRow {
    let mut rows = query_rows(
        client,
        &format!(
            "INSERT INTO reservations (customer_name, start, party_size, duration_minutes, status) \
             VALUES ('Sato', {start}, {party}, {minutes}, 'confirmed')"
        ),
    )
    .await;
    assert_eq!(rows.len(), 1);
    rows.remove(0)
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn tables_roundtrip() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;

    let a = add_table(&client, "A", 2).await;
    let b = add_table(&client, "B", 4).await;
    client
        .batch_execute(&format!("DELETE FROM tables WHERE id = '{a}'"))
        .await
        .unwrap();

    let rows = query_rows(&client, "SELECT * FROM tables").await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(a.to_string().as_str()));
    assert_eq!(rows[1].get("id"), Some(b.to_string().as_str()));
    assert_eq!(rows[1].get("capacity"), Some("4"));
    assert_eq!(rows[1].get("floor"), Some("1F"));
}

#[tokio::test]
async fn booking_lifecycle_over_sql() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;

    let _a = add_table(&client, "A", 2).await;
    let b = add_table(&client, "B", 4).await;
    let c = add_table(&client, "C", 4).await;

    let first = book(&client, 3, SIX_PM, 90).await;
    assert_eq!(first.get("table_id"), Some(b.to_string().as_str()));
    assert_eq!(first.get("status"), Some("confirmed"));
    assert_eq!(first.get("created_by"), Some("host"));
    let first_id = first.get("id").unwrap().to_string();

    let second = book(&client, 3, SIX_PM + 30 * MIN, 30).await;
    assert_eq!(second.get("table_id"), Some(c.to_string().as_str()));

    // Shrinking the party keeps its table.
    let rows = query_rows(
        &client,
        &format!("UPDATE reservations SET party_size = 2 WHERE id = '{first_id}'"),
    )
    .await;
    assert_eq!(rows[0].get("table_id"), Some(b.to_string().as_str()));
    assert_eq!(rows[0].get("party_size"), Some("2"));

    let rows = query_rows(
        &client,
        &format!(
            r#"SELECT * FROM reservations WHERE "end" > {} AND start < {}"#,
            SIX_PM,
            SIX_PM + 120 * MIN
        ),
    )
    .await;
    assert_eq!(rows.len(), 2);

    let rows = query_rows(&client, &format!("DELETE FROM reservations WHERE id = '{first_id}'")).await;
    assert_eq!(rows[0].get("status"), Some("cancelled"));

    let rows = query_rows(&client, &format!("SELECT * FROM reservations WHERE id = '{first_id}'")).await;
    assert_eq!(rows[0].get("status"), Some("cancelled"));
}

#[tokio::test]
async fn conflicts_have_distinct_sqlstates() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;
    add_table(&client, "A", 2).await;

    let seated = book(&client, 2, SIX_PM, 90).await;
    let id = seated.get("id").unwrap().to_string();

    let no_table = format!(
        "INSERT INTO reservations (customer_name, start, party_size) VALUES ('Ito', {SIX_PM}, 2)"
    );
    assert_eq!(sqlstate(&client, &no_table).await, "23P01");

    client
        .batch_execute(&format!("UPDATE reservations SET status = 'arrived' WHERE id = '{id}'"))
        .await
        .unwrap();
    let back_to_hold = format!("UPDATE reservations SET status = 'hold' WHERE id = '{id}'");
    assert_eq!(sqlstate(&client, &back_to_hold).await, "55000");

    let missing = format!("SELECT * FROM reservations WHERE id = '{}'", Ulid::new());
    assert_eq!(sqlstate(&client, &missing).await, "P0002");

    let no_party = format!(
        "INSERT INTO reservations (customer_name, start, party_size) VALUES ('Ito', {SIX_PM}, 0)"
    );
    assert_eq!(sqlstate(&client, &no_party).await, "22023");

    assert_eq!(sqlstate(&client, "SELECT * FROM menu").await, "42601");
}

#[tokio::test]
async fn availability_probe_over_sql() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;
    let two = add_table(&client, "A", 2).await;

    let probe = format!("SELECT * FROM availability WHERE start = {SIX_PM} AND party_size = 2");
    let rows = query_rows(&client, &probe).await;
    assert_eq!(rows[0].get("table_id"), Some(two.to_string().as_str()));
    assert_eq!(rows[0].get("capacity"), Some("2"));

    book(&client, 2, SIX_PM, 90).await;
    let rows = query_rows(&client, &probe).await;
    assert_eq!(rows[0].get("table_id"), None);
}

#[tokio::test]
async fn slot_upsert_over_sql() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;

    let upsert = "INSERT INTO slots (date, time, capacity_remains) VALUES ('2025-11-15', '18:00', 12)";
    let first = query_rows(&client, upsert).await;
    let second = query_rows(&client, upsert).await;
    assert_eq!(first[0].get("id"), second[0].get("id"));

    let slot_id = first[0].get("id").unwrap().to_string();
    let rows = query_rows(
        &client,
        &format!("UPDATE slots SET open_flag = 'close' WHERE id = '{slot_id}'"),
    )
    .await;
    assert_eq!(rows[0].get("open_flag"), Some("close"));
    assert_eq!(rows[0].get("capacity_remains"), Some("12"));

    let taken = "INSERT INTO slots (date, time) VALUES ('2025-11-15', '19:00')";
    let other = query_rows(&client, taken).await;
    let other_id = other[0].get("id").unwrap().to_string();
    let collide = format!("UPDATE slots SET time = '18:00' WHERE id = '{other_id}'");
    assert_eq!(sqlstate(&client, &collide).await, "23505");

    let rows = query_rows(&client, "SELECT * FROM slots WHERE date = '2025-11-15'").await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("time"), Some("18:00"));
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;
    let table = add_table(&client, "A", 4).await;
    let seated = book(&client, 2, SIX_PM, 90).await;
    let id = seated.get("id").unwrap().to_string();

    let rows = client
        .query(
            "UPDATE reservations SET memo = $1 WHERE id = $2",
            &[&"window seat", &id],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let memo: &str = rows[0].get("memo");
    assert_eq!(memo, "window seat");
    let table_id: &str = rows[0].get("table_id");
    assert_eq!(table_id, table.to_string());
}

#[tokio::test]
async fn bound_text_containing_placeholders_is_stored_verbatim() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr, "bistro").await;
    add_table(&client, "A", 4).await;
    let seated = book(&client, 2, SIX_PM, 90).await;
    let id = seated.get("id").unwrap().to_string();

    let rows = client
        .query(
            "UPDATE reservations SET memo = $2 WHERE id = $1",
            &[&id, &"deposit $1 paid, it's fine"],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let memo: &str = rows[0].get("memo");
    assert_eq!(memo, "deposit $1 paid, it's fine");
}

#[tokio::test]
async fn tenants_are_isolated_by_database() {
    let (addr, _tm) = start_test_server().await;
    let (bistro, _rx1) = connect(addr, "bistro").await;
    let (izakaya, _rx2) = connect(addr, "izakaya").await;

    add_table(&bistro, "A", 2).await;
    assert_eq!(query_rows(&bistro, "SELECT * FROM tables").await.len(), 1);
    assert!(query_rows(&izakaya, "SELECT * FROM tables").await.is_empty());

    let no_table = format!(
        "INSERT INTO reservations (customer_name, start, party_size) VALUES ('Ito', {SIX_PM}, 2)"
    );
    assert_eq!(sqlstate(&izakaya, &no_table).await, "23P01");
}

#[tokio::test]
async fn listen_delivers_at_next_statement() {
    let (addr, _tm) = start_test_server().await;
    let (listener, mut rx) = connect(addr, "bistro").await;
    listener.batch_execute("LISTEN reservations").await.unwrap();

    let (host, _) = connect(addr, "bistro").await;
    add_table(&host, "A", 2).await;
    let seated = book(&host, 2, SIX_PM, 90).await;

    // Queued until the listening connection runs something.
    listener.batch_execute("SELECT * FROM tables").await.unwrap();
    let notif = recv_notification(&mut rx, Duration::from_secs(5))
        .await
        .expect("expected notification");
    assert_eq!(notif.channel(), "reservations");

    let payload: serde_json::Value =
        serde_json::from_str(notif.payload()).expect("payload should be JSON");
    let booked = &payload["ReservationBooked"]["reservation"];
    assert_eq!(booked["id"].as_str(), seated.get("id"));

    // Table events are on another channel.
    let extra = recv_notification(&mut rx, Duration::from_millis(300)).await;
    assert!(extra.is_none());
}

#[tokio::test]
async fn unlisten_stops_notifications() {
    let (addr, _tm) = start_test_server().await;
    let (listener, mut rx) = connect(addr, "bistro").await;
    listener.batch_execute("LISTEN tables").await.unwrap();
    listener.batch_execute("LISTEN tables").await.unwrap();

    let (host, _) = connect(addr, "bistro").await;
    add_table(&host, "A", 2).await;
    listener.batch_execute("SELECT * FROM tables").await.unwrap();
    assert!(recv_notification(&mut rx, Duration::from_secs(5)).await.is_some());
    // Listening twice does not duplicate delivery.
    assert!(recv_notification(&mut rx, Duration::from_millis(300)).await.is_none());

    listener.batch_execute("UNLISTEN *").await.unwrap();
    add_table(&host, "B", 4).await;
    listener.batch_execute("SELECT * FROM tables").await.unwrap();
    assert!(recv_notification(&mut rx, Duration::from_millis(300)).await.is_none());
}
