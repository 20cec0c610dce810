use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

const HOUR: i64 = 3_600_000; // 1 hour in ms
/// 2025-11-15T00:00:00Z.
const SERVICE_DAY: i64 = 1_763_164_800_000;

/// Capacities of a mid-sized dining room.
const FLOOR: [u32; 20] = [2, 2, 2, 2, 2, 2, 4, 4, 4, 4, 4, 4, 4, 4, 6, 6, 6, 8, 8, 12];

async fn connect_to(host: &str, port: u16, dbname: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(dbname)
        .user("bench")
        .password("covers");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

/// Connect to a fresh tenant.
async fn connect(host: &str, port: u16) -> (tokio_postgres::Client, String) {
    let dbname = format!("bench_{}", Ulid::new());
    (connect_to(host, port, &dbname).await, dbname)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn setup_floor(client: &tokio_postgres::Client) {
    for (i, cap) in FLOOR.iter().enumerate() {
        let id = Ulid::new();
        client
            .batch_execute(&format!(
                "INSERT INTO tables (id, name, capacity) VALUES ('{id}', 'T{i}', {cap})"
            ))
            .await
            .unwrap();
    }
}

fn booking_sql(party: u32, start: i64) -> String {
    format!(
        "INSERT INTO reservations (customer_name, start, party_size, duration_minutes, status) \
         VALUES ('Bench', {start}, {party}, 90, 'confirmed')"
    )
}

/// SQLSTATE for "no table fits".
fn is_no_availability(e: &tokio_postgres::Error) -> bool {
    e.code().is_some_and(|c| c.code() == "23P01")
}

async fn phase1_sequential(host: &str, port: u16) {
    let (client, _) = connect(host, port).await;
    setup_floor(&client).await;

    // Every table gets one seating per two-hour turn, so nothing is refused.
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let turn = (i / FLOOR.len()) as i64;
        let s = SERVICE_DAY + turn * 2 * HOUR;
        let t = Instant::now();
        client.batch_execute(&booking_sql(2, s)).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

async fn phase2_contention(host: &str, port: u16) {
    let (setup, dbname) = connect(host, port).await;
    setup_floor(&setup).await;
    drop(setup);

    // Everyone wants the same 19:00 seating on one tenant.
    let n_tasks = 20;
    let n_per_task = 10;
    let assigned = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let host = host.to_string();
        let dbname = dbname.clone();
        let assigned = assigned.clone();
        let refused = refused.clone();
        handles.push(tokio::spawn(async move {
            let client = connect_to(&host, port, &dbname).await;
            for j in 0..n_per_task {
                let party = 1 + ((i + j) % 4) as u32;
                match client.batch_execute(&booking_sql(party, SERVICE_DAY + 19 * HOUR)).await {
                    Ok(()) => assigned.fetch_add(1, Ordering::Relaxed),
                    Err(e) if is_no_availability(&e) => refused.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let assigned = assigned.load(Ordering::Relaxed);
    println!(
        "  {total} attempts in {:.2}s: {assigned} seated, {} refused",
        elapsed.as_secs_f64(),
        refused.load(Ordering::Relaxed)
    );
    assert!(
        assigned <= FLOOR.len(),
        "{assigned} bookings for {} tables: double-booked",
        FLOOR.len()
    );
}

async fn phase3_probe_under_load(host: &str, port: u16) {
    let (setup, dbname) = connect(host, port).await;
    setup_floor(&setup).await;
    for turn in 0..10 {
        for _ in 0..FLOOR.len() / 2 {
            setup
                .batch_execute(&booking_sql(2, SERVICE_DAY + turn * 2 * HOUR))
                .await
                .unwrap();
        }
    }
    drop(setup);

    // Writers keep booking and cancelling on the same tenant.
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let host = host.to_string();
        let dbname = dbname.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect_to(&host, port, &dbname).await;
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = SERVICE_DAY + ((w * 7 + i) % 20) * HOUR;
                if let Ok(rows) = client.simple_query(&booking_sql(2, s)).await {
                    let id = rows.iter().find_map(|m| match m {
                        tokio_postgres::SimpleQueryMessage::Row(r) => r.get("id").map(String::from),
                        _ => None,
                    });
                    if let Some(id) = id {
                        let _ = client
                            .batch_execute(&format!("DELETE FROM reservations WHERE id = '{id}'"))
                            .await;
                    }
                }
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let host = host.to_string();
        let dbname = dbname.clone();
        reader_handles.push(tokio::spawn(async move {
            let client = connect_to(&host, port, &dbname).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for k in 0..reads_per_reader {
                let s = SERVICE_DAY + ((r + k) % 20) as i64 * HOUR;
                let party = 1 + (k % 8) as u32;
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        "SELECT * FROM availability WHERE start = {s} AND party_size = {party}"
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability probe", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let (client, _) = connect(&host, port).await;
            let id = Ulid::new();
            client
                .batch_execute(&format!(
                    "INSERT INTO tables (id, name, capacity) VALUES ('{id}', 'Solo', 4)"
                ))
                .await
                .unwrap();

            for i in 0..ops_per_conn {
                let s = SERVICE_DAY + (i as i64) * 2 * HOUR;
                client.batch_execute(&booking_sql(2, s)).await.unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} bookings each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("COVERS_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("COVERS_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid COVERS_PORT");

    println!("=== covers stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] contention on one seating");
    phase2_contention(&host, port).await;

    println!("\n[phase 3] availability latency under write load");
    phase3_probe_under_load(&host, port).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}
