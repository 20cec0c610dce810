use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use futures::{stream, Sink, SinkExt};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::response::NotificationResponse;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::auth::CoversAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

type Subscription = (Topic, broadcast::Receiver<Event>);

/// One handler per connection: it owns the connection's LISTEN subscriptions.
pub struct CoversHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<CoversQueryParser>,
    listening: Mutex<Vec<Subscription>>,
}

impl CoversHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(CoversQueryParser),
            listening: Mutex::new(Vec::new()),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Queued events on this connection's channels, as NOTIFY messages.
    /// Delivered at the next statement boundary.
    fn drain_notifications(&self) -> Vec<PgWireBackendMessage> {
        let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::new();
        for (topic, rx) in listening.iter_mut() {
            loop {
                match rx.try_recv() {
                    Ok(event) => out.push(notification(*topic, &event)),
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        warn!("listener on {} dropped {n} notifications", topic.as_str());
                    }
                    Err(_) => break,
                }
            }
        }
        out
    }

    async fn send_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send,
        PgWireError: From<C::Error>,
    {
        for msg in self.drain_notifications() {
            client.feed(msg).await?;
        }
        client.flush().await?;
        Ok(())
    }

    fn listen(&self, engine: &Engine, topic: Topic) {
        let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
        if !listening.iter().any(|(t, _)| *t == topic) {
            listening.push((topic, engine.notify.subscribe(topic)));
        }
    }

    fn unlisten(&self, topic: Option<Topic>) {
        let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
        match topic {
            Some(topic) => listening.retain(|(t, _)| *t != topic),
            None => listening.clear(),
        }
    }

    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let user = client.metadata().get("user").cloned();

        let started = Instant::now();
        let result = self.execute_command(&engine, cmd, user).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        user: Option<String>,
    ) -> PgWireResult<Response> {
        match cmd {
            Command::InsertTable(new) => {
                engine.create_table(new).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::DeleteTable { id } => {
                engine.deactivate_table(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectTables => {
                let tables = engine.list_tables().await;
                table_rows(&tables)
            }
            Command::InsertReservation(mut request) => {
                request.created_by = user;
                let r = engine.create_reservation(request).await.map_err(engine_err)?;
                reservation_rows(std::slice::from_ref(&r))
            }
            Command::UpdateReservation { id, patch } => {
                let r = engine.update_reservation(id, patch).await.map_err(engine_err)?;
                reservation_rows(std::slice::from_ref(&r))
            }
            Command::DeleteReservation { id } => {
                let r = engine.cancel_reservation(id).await.map_err(engine_err)?;
                reservation_rows(std::slice::from_ref(&r))
            }
            Command::SelectReservations { start, end } => {
                let list = engine.list_reservations(start, end).await.map_err(engine_err)?;
                reservation_rows(&list)
            }
            Command::SelectReservation { id } => {
                let r = engine.get_reservation(id).await.map_err(engine_err)?;
                reservation_rows(std::slice::from_ref(&r))
            }
            Command::SelectAvailability {
                start,
                party_size,
                duration_minutes,
                exclude_id,
            } => {
                let availability = engine
                    .check_availability(start, duration_minutes, party_size, exclude_id)
                    .await
                    .map_err(engine_err)?;
                availability_rows(&availability)
            }
            Command::UpsertSlot { date, time, fields } => {
                let slot = engine.upsert_slot(date, time, fields).await.map_err(engine_err)?;
                slot_rows(std::slice::from_ref(&slot))
            }
            Command::UpdateSlot { id, patch } => {
                let slot = engine.patch_slot(id, patch).await.map_err(engine_err)?;
                slot_rows(std::slice::from_ref(&slot))
            }
            Command::SelectSlots { from, to } => {
                let slots = engine.list_slots(from, to).await.map_err(engine_err)?;
                slot_rows(&slots)
            }
            Command::Listen { channel } => {
                self.listen(engine, channel);
                debug!("listening on {}", channel.as_str());
                Ok(Response::Execution(Tag::new("LISTEN")))
            }
            Command::Unlisten { channel } => {
                self.unlisten(channel);
                Ok(Response::Execution(Tag::new("UNLISTEN")))
            }
        }
    }
}

fn notification(topic: Topic, event: &Event) -> PgWireBackendMessage {
    let payload = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    PgWireBackendMessage::NotificationResponse(NotificationResponse::new(
        0,
        topic.as_str().to_string(),
        payload,
    ))
}

// ── Result sets ──────────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn table_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("capacity", Type::INT8),
        text_field("floor", Type::VARCHAR),
        text_field("area", Type::VARCHAR),
        text_field("kind", Type::VARCHAR),
        text_field("active", Type::BOOL),
    ]
}

fn reservation_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("customer_name", Type::VARCHAR),
        text_field("phone", Type::VARCHAR),
        text_field("email", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("party_size", Type::INT8),
        text_field("party_adult", Type::INT8),
        text_field("party_child", Type::INT8),
        text_field("table_id", Type::VARCHAR),
        text_field("channel", Type::VARCHAR),
        text_field("status", Type::VARCHAR),
        text_field("hold_expires_at", Type::INT8),
        text_field("tags", Type::VARCHAR),
        text_field("memo", Type::VARCHAR),
        text_field("created_by", Type::VARCHAR),
        text_field("created_at", Type::INT8),
        text_field("updated_at", Type::INT8),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("available", Type::BOOL),
        text_field("table_id", Type::VARCHAR),
        text_field("capacity", Type::INT8),
    ]
}

fn slot_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("date", Type::VARCHAR),
        text_field("time", Type::VARCHAR),
        text_field("capacity_remains", Type::INT8),
        text_field("assignable_table_ids", Type::VARCHAR),
        text_field("staff_id", Type::VARCHAR),
        text_field("open_flag", Type::VARCHAR),
        text_field("seat_time_minutes", Type::INT8),
        text_field("overbook_buffer", Type::INT8),
        text_field("notes", Type::VARCHAR),
    ]
}

fn rows<T>(
    schema: Vec<FieldInfo>,
    items: &[T],
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Response> {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn id_text(id: Option<Ulid>) -> Option<String> {
    id.map(|u| u.to_string())
}

fn table_rows(tables: &[Table]) -> PgWireResult<Response> {
    rows(table_schema(), tables, |e, t| {
        e.encode_field(&t.id.to_string())?;
        e.encode_field(&t.name)?;
        e.encode_field(&i64::from(t.capacity))?;
        e.encode_field(&t.floor)?;
        e.encode_field(&t.area)?;
        e.encode_field(&t.kind.as_str().to_string())?;
        e.encode_field(&t.active)
    })
}

fn reservation_rows(list: &[Reservation]) -> PgWireResult<Response> {
    rows(reservation_schema(), list, |e, r| {
        e.encode_field(&r.id.to_string())?;
        e.encode_field(&r.customer_name)?;
        e.encode_field(&r.phone)?;
        e.encode_field(&r.email)?;
        e.encode_field(&r.span.start)?;
        e.encode_field(&r.span.end)?;
        e.encode_field(&i64::from(r.party.total))?;
        e.encode_field(&i64::from(r.party.adult))?;
        e.encode_field(&i64::from(r.party.child))?;
        e.encode_field(&id_text(r.table_id))?;
        e.encode_field(&r.channel.as_str().to_string())?;
        e.encode_field(&r.status.as_str().to_string())?;
        e.encode_field(&r.hold_expires_at)?;
        e.encode_field(&r.tags.join(","))?;
        e.encode_field(&r.memo)?;
        e.encode_field(&r.created_by)?;
        e.encode_field(&r.created_at)?;
        e.encode_field(&r.updated_at)
    })
}

fn availability_rows(a: &Availability) -> PgWireResult<Response> {
    rows(availability_schema(), std::slice::from_ref(a), |e, a| {
        e.encode_field(&a.available)?;
        e.encode_field(&id_text(a.table_id))?;
        e.encode_field(&a.capacity.map(i64::from))
    })
}

fn slot_rows(slots: &[Slot]) -> PgWireResult<Response> {
    rows(slot_schema(), slots, |e, s| {
        let tables: Vec<String> = s.assignable_table_ids.iter().map(Ulid::to_string).collect();
        e.encode_field(&s.id.to_string())?;
        e.encode_field(&s.date.format("%Y-%m-%d").to_string())?;
        e.encode_field(&s.time.format("%H:%M").to_string())?;
        e.encode_field(&i64::from(s.capacity_remains))?;
        e.encode_field(&tables.join(","))?;
        e.encode_field(&id_text(s.staff_id))?;
        e.encode_field(&s.open_flag.as_str().to_string())?;
        e.encode_field(&i64::from(s.seat_time_minutes))?;
        e.encode_field(&i64::from(s.overbook_buffer))?;
        e.encode_field(&s.notes)
    })
}

/// Columns a statement will return, judged from its text so that statements
/// with unbound `$n` placeholders can be described.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    let mut words = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());
    let Some(verb) = words.next() else {
        return vec![];
    };
    if !matches!(verb, "SELECT" | "INSERT" | "UPDATE" | "DELETE") {
        return vec![];
    }
    let target = words.find(|w| matches!(*w, "TABLES" | "RESERVATIONS" | "SLOTS" | "AVAILABILITY"));
    match (verb, target) {
        ("SELECT", Some("TABLES")) => table_schema(),
        ("SELECT", Some("AVAILABILITY")) => availability_schema(),
        (_, Some("RESERVATIONS")) => reservation_schema(),
        ("SELECT" | "INSERT" | "UPDATE", Some("SLOTS")) => slot_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for CoversHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let response = self.run(client, query).await;
        self.send_notifications(client).await?;
        Ok(vec![response?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CoversQueryParser;

#[async_trait]
impl QueryParser for CoversQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CoversHandler {
    type Statement = String;
    type QueryParser = CoversQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = inline_params(&portal.statement.statement, &portal.parameters);
        let response = self.run(client, &sql).await;
        self.send_notifications(client).await?;
        response
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

enum Piece<'a> {
    Text(&'a str),
    Param(usize),
}

/// Split a statement into text and `$n` placeholders. Anything inside
/// `'...'` literals or `"..."` identifiers is text.
fn pieces(sql: &str) -> Vec<Piece<'_>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut quote: Option<u8> = None;
    let mut text_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None if b == b'\'' || b == b'"' => {
                quote = Some(b);
                i += 1;
            }
            None if b == b'$' => {
                let digits = bytes[i + 1..].iter().take_while(|c| c.is_ascii_digit()).count();
                match sql[i + 1..i + 1 + digits].parse::<usize>() {
                    Ok(n) if n >= 1 => {
                        out.push(Piece::Text(&sql[text_start..i]));
                        out.push(Piece::Param(n));
                        i += 1 + digits;
                        text_start = i;
                    }
                    _ => i += 1,
                }
            }
            None => i += 1,
        }
    }
    out.push(Piece::Text(&sql[text_start..]));
    out
}

/// Highest `$n` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    pieces(sql)
        .iter()
        .filter_map(|p| match p {
            Piece::Param(n) => Some(*n),
            Piece::Text(_) => None,
        })
        .max()
        .unwrap_or(0)
}

/// Inline bound text parameters as quoted literals in one pass. Inlined
/// values are never rescanned, so a `$1` inside a bound memo stays text.
fn inline_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    for piece in pieces(sql) {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Param(n) => match params.get(n - 1) {
                Some(Some(bytes)) => {
                    out.push('\'');
                    out.push_str(&String::from_utf8_lossy(bytes.as_ref()).replace('\'', "''"));
                    out.push('\'');
                }
                Some(None) => out.push_str("NULL"),
                None => out.push_str(&format!("${n}")),
            },
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CoversFactory {
    handler: Arc<CoversHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CoversAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CoversFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(CoversHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                CoversAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CoversFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(CoversFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM reservations WHERE id = $1"), 1);
        assert_eq!(count_params("UPDATE reservations SET memo = $2, party_size = $10 WHERE id = $1"), 10);
        assert_eq!(count_params("SELECT * FROM tables"), 0);
        assert_eq!(count_params("SELECT '$' FROM tables"), 0);
        assert_eq!(count_params("UPDATE reservations SET memo = 'paid $3' WHERE id = $1"), 1);
    }

    #[test]
    fn bound_values_are_inlined_once() {
        let sql = "UPDATE reservations SET memo = $2 WHERE id = $1";
        let params = [Some(b"01ARZ3NDEKTSV4RRFFQ69G5FAV".to_vec()), Some(b"deposit $1 paid".to_vec())];
        assert_eq!(
            inline_params(sql, &params),
            "UPDATE reservations SET memo = 'deposit $1 paid' WHERE id = '01ARZ3NDEKTSV4RRFFQ69G5FAV'"
        );
    }

    #[test]
    fn inlining_escapes_quotes_and_skips_literals() {
        let sql = "UPDATE reservations SET memo = $1, contact_email = '$2' WHERE id = $10";
        let mut params: Vec<Option<Vec<u8>>> = vec![None; 10];
        params[0] = Some(b"it's $10".to_vec());
        params[9] = Some(b"x".to_vec());
        assert_eq!(
            inline_params(sql, &params),
            "UPDATE reservations SET memo = 'it''s $10', contact_email = '$2' WHERE id = 'x'"
        );
        assert_eq!(inline_params("SELECT $1, $3", &[None::<Vec<u8>>]), "SELECT NULL, $3");
    }

    #[test]
    fn schema_follows_statement_target() {
        assert_eq!(result_schema("SELECT * FROM tables").len(), table_schema().len());
        assert_eq!(
            result_schema("INSERT INTO reservations (customer_name) VALUES ($1)").len(),
            reservation_schema().len()
        );
        assert_eq!(
            result_schema("update slots set notes = $1 where id = $2").len(),
            slot_schema().len()
        );
        assert!(result_schema("INSERT INTO tables (name, capacity) VALUES ($1, $2)").is_empty());
        assert!(result_schema("LISTEN reservations").is_empty());
    }

    #[test]
    fn sqlstates_distinguish_capacity_from_lifecycle_conflicts() {
        let no_table = EngineError::NoAvailability {
            party_size: 4,
            window: Span::new(0, 1),
        };
        let bad_move = EngineError::InvalidTransition {
            from: Status::Arrived,
            to: Status::Hold,
        };
        assert_ne!(no_table.sqlstate(), bad_move.sqlstate());
    }
}
