use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertTable(NewTable),
    DeleteTable {
        id: Ulid,
    },
    SelectTables,
    InsertReservation(NewReservation),
    UpdateReservation {
        id: Ulid,
        patch: ReservationPatch,
    },
    DeleteReservation {
        id: Ulid,
    },
    /// Every reservation whose span intersects `[start, end)`, any status.
    /// Spelled `"end" > F AND start < T`; the shorthand
    /// `start >= F AND "end" <= T` names the same window.
    SelectReservations {
        start: Ms,
        end: Ms,
    },
    SelectReservation {
        id: Ulid,
    },
    SelectAvailability {
        start: Ms,
        party_size: u32,
        duration_minutes: Option<i64>,
        exclude_id: Option<Ulid>,
    },
    UpsertSlot {
        date: NaiveDate,
        time: NaiveTime,
        fields: SlotFields,
    },
    UpdateSlot {
        id: Ulid,
        patch: SlotPatch,
    },
    SelectSlots {
        from: NaiveDate,
        to: NaiveDate,
    },
    Listen {
        channel: Topic,
    },
    /// `None` is `UNLISTEN *`.
    Unlisten {
        channel: Option<Topic>,
    },
}

// Column order assumed by `INSERT INTO x VALUES (...)` without a column list.
const TABLE_COLUMNS: &[&str] = &["id", "name", "capacity", "floor", "area", "kind"];
const RESERVATION_COLUMNS: &[&str] = &[
    "customer_name",
    "start",
    "party_size",
    "duration_minutes",
    "status",
    "channel",
    "phone",
    "email",
    "party_adult",
    "party_child",
    "hold_minutes",
    "tags",
    "memo",
    "id",
];
const RESERVATION_PATCHABLE: &[&str] = &[
    "customer_name",
    "start",
    "party_size",
    "duration_minutes",
    "status",
    "channel",
    "phone",
    "email",
    "party_adult",
    "party_child",
    "hold_minutes",
    "tags",
    "memo",
];
const SLOT_COLUMNS: &[&str] = &[
    "date",
    "time",
    "capacity_remains",
    "assignable_table_ids",
    "staff_id",
    "open_flag",
    "seat_time_minutes",
    "overbook_buffer",
    "notes",
];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let upper = trimmed.to_uppercase();
    if let Some(rest) = upper.strip_prefix("LISTEN ") {
        return Ok(Command::Listen {
            channel: parse_channel(rest)?,
        });
    }
    if upper == "UNLISTEN *" || upper == "UNLISTEN" {
        return Ok(Command::Unlisten { channel: None });
    }
    if let Some(rest) = upper.strip_prefix("UNLISTEN ") {
        return Ok(Command::Unlisten {
            channel: Some(parse_channel(rest)?),
        });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = stmts.first().ok_or(SqlError::Empty)?;

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection.as_ref()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_channel(name: &str) -> Result<Topic, SqlError> {
    let name = name.trim().trim_matches('"');
    Topic::parse(name).ok_or_else(|| SqlError::UnknownChannel(name.to_lowercase()))
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = single_values_row(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();

    match table.as_str() {
        "tables" => {
            let f = Fields::from_row("tables", TABLE_COLUMNS, &columns, values)?;
            Ok(Command::InsertTable(NewTable {
                id: f.ulid("id")?.unwrap_or_else(Ulid::new),
                name: f.required(f.text("name")?, "name")?,
                capacity: f.required(f.u32("capacity")?, "capacity")?,
                floor: f.text("floor")?,
                area: f.text("area")?,
                kind: f.parsed("kind", TableKind::parse)?,
            }))
        }
        "reservations" => {
            let f = Fields::from_row("reservations", RESERVATION_COLUMNS, &columns, values)?;
            Ok(Command::InsertReservation(NewReservation {
                id: f.ulid("id")?,
                customer_name: f.text("customer_name")?.unwrap_or_default(),
                phone: f.text("phone")?,
                email: f.text("email")?,
                start: f.i64("start")?,
                duration_minutes: f.i64("duration_minutes")?,
                party_total: f.required(f.u32("party_size")?, "party_size")?,
                party_adult: f.u32("party_adult")?,
                party_child: f.u32("party_child")?,
                channel: f.parsed("channel", Channel::parse)?,
                status: f.parsed("status", Status::parse)?,
                hold_minutes: f.i64("hold_minutes")?,
                tags: f.tags("tags")?.unwrap_or_default(),
                memo: f.text("memo")?,
                created_by: None,
            }))
        }
        "slots" => {
            let f = Fields::from_row("slots", SLOT_COLUMNS, &columns, values)?;
            Ok(Command::UpsertSlot {
                date: f.required(f.date("date")?, "date")?,
                time: f.required(f.time("time")?, "time")?,
                fields: slot_fields(&f)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn slot_fields(f: &Fields<'_>) -> Result<SlotFields, SqlError> {
    Ok(SlotFields {
        capacity_remains: f.u32("capacity_remains")?,
        assignable_table_ids: f.ulid_list("assignable_table_ids")?,
        staff_id: f.ulid("staff_id")?,
        open_flag: f.parsed("open_flag", OpenFlag::parse)?,
        seat_time_minutes: f.u32("seat_time_minutes")?,
        overbook_buffer: f.u32("overbook_buffer")?,
        notes: f.text("notes")?,
    })
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    let id = where_id(selection)?;

    let mut pairs = Vec::with_capacity(assignments.len());
    for a in assignments {
        let AssignmentTarget::ColumnName(col) = &a.target else {
            return Err(SqlError::Unsupported("tuple assignment".into()));
        };
        let col = object_name_last(col).ok_or_else(|| SqlError::Parse("empty column".into()))?;
        pairs.push((col, &a.value));
    }

    match name.as_str() {
        "reservations" => {
            let f = Fields::from_pairs("reservations", RESERVATION_PATCHABLE, pairs)?;
            Ok(Command::UpdateReservation {
                id,
                patch: ReservationPatch {
                    customer_name: f.text("customer_name")?,
                    phone: f.text("phone")?,
                    email: f.text("email")?,
                    start: f.i64("start")?,
                    duration_minutes: f.i64("duration_minutes")?,
                    party_total: f.u32("party_size")?,
                    party_adult: f.u32("party_adult")?,
                    party_child: f.u32("party_child")?,
                    channel: f.parsed("channel", Channel::parse)?,
                    status: f.parsed("status", Status::parse)?,
                    hold_minutes: f.i64("hold_minutes")?,
                    tags: f.tags("tags")?,
                    memo: f.text("memo")?,
                },
            })
        }
        "slots" => {
            let f = Fields::from_pairs("slots", SLOT_COLUMNS, pairs)?;
            Ok(Command::UpdateSlot {
                id,
                patch: SlotPatch {
                    date: f.date("date")?,
                    time: f.time("time")?,
                    fields: slot_fields(&f)?,
                },
            })
        }
        _ => Err(SqlError::UnknownTable(name)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = where_id(delete.selection.as_ref())?;

    match table.as_str() {
        "tables" => Ok(Command::DeleteTable { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(SqlError::Unsupported("non-SELECT query".into()));
    };
    let from = select
        .from
        .first()
        .ok_or_else(|| SqlError::Parse("SELECT without FROM".into()))?;
    let table = table_factor_name(&from.relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }
    let find = |col: &str, ops: &[Op]| {
        filters
            .iter()
            .find(|(c, op, _)| c == col && ops.contains(op))
            .map(|(_, _, e)| *e)
    };

    match table.as_str() {
        "tables" => Ok(Command::SelectTables),
        "reservations" => {
            if let Some(id) = find("id", &[Op::Eq]) {
                return Ok(Command::SelectReservation {
                    id: parse_ulid(id)?,
                });
            }
            if let (Some(from), Some(to)) = (find("end", &[Op::Gt]), find("start", &[Op::Lt])) {
                return Ok(Command::SelectReservations {
                    start: parse_i64(from)?,
                    end: parse_i64(to)?,
                });
            }
            let start = find("start", &[Op::GtEq, Op::Eq]).ok_or(SqlError::MissingFilter("start"))?;
            let end = find("end", &[Op::LtEq, Op::Lt]).ok_or(SqlError::MissingFilter("end"))?;
            Ok(Command::SelectReservations {
                start: parse_i64(start)?,
                end: parse_i64(end)?,
            })
        }
        "availability" => {
            let start = find("start", &[Op::Eq]).ok_or(SqlError::MissingFilter("start"))?;
            let party = find("party_size", &[Op::Eq]).ok_or(SqlError::MissingFilter("party_size"))?;
            Ok(Command::SelectAvailability {
                start: parse_i64(start)?,
                party_size: parse_u32(party)?,
                duration_minutes: find("duration_minutes", &[Op::Eq]).map(parse_i64).transpose()?,
                exclude_id: find("exclude_id", &[Op::Eq]).map(parse_ulid).transpose()?,
            })
        }
        "slots" => {
            let from = find("date", &[Op::GtEq, Op::Eq]).ok_or(SqlError::MissingFilter("date"))?;
            let to = find("date", &[Op::LtEq]).or_else(|| find("date", &[Op::Eq]));
            let from = parse_date(from)?;
            Ok(Command::SelectSlots {
                from,
                to: to.map(parse_date).transpose()?.unwrap_or(from),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Flatten `a AND b AND ...` into `(column, op, value)` triples.
fn collect_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, Op, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, out),
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                ast::BinaryOperator::And => {
                    collect_filters(left, out)?;
                    return collect_filters(right, out);
                }
                ast::BinaryOperator::Eq => Op::Eq,
                ast::BinaryOperator::Lt => Op::Lt,
                ast::BinaryOperator::LtEq => Op::LtEq,
                ast::BinaryOperator::Gt => Op::Gt,
                ast::BinaryOperator::GtEq => Op::GtEq,
                other => return Err(SqlError::Unsupported(format!("operator {other}"))),
            };
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            out.push((col, op, right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Column values ─────────────────────────────────────────────

/// Named values of one INSERT row or UPDATE assignment list.
struct Fields<'a> {
    values: HashMap<String, &'a Expr>,
}

impl<'a> Fields<'a> {
    fn from_row(
        table: &'static str,
        known: &[&str],
        columns: &[String],
        row: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let pairs: Vec<(String, &Expr)> = if columns.is_empty() {
            if row.len() > known.len() {
                return Err(SqlError::WrongArity(table, known.len(), row.len()));
            }
            known.iter().map(|c| c.to_string()).zip(row).collect()
        } else {
            if columns.len() != row.len() {
                return Err(SqlError::WrongArity(table, columns.len(), row.len()));
            }
            columns.iter().cloned().zip(row).collect()
        };
        Self::from_pairs(table, known, pairs)
    }

    fn from_pairs(
        table: &'static str,
        known: &[&str],
        pairs: Vec<(String, &'a Expr)>,
    ) -> Result<Self, SqlError> {
        let mut values = HashMap::with_capacity(pairs.len());
        for (col, expr) in pairs {
            if !known.contains(&col.as_str()) {
                return Err(SqlError::UnknownColumn(table, col));
            }
            if values.insert(col.clone(), expr).is_some() {
                return Err(SqlError::Parse(format!("column {col} given twice")));
            }
        }
        Ok(Self { values })
    }

    /// The expression for `col`, unless absent or NULL.
    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.values
            .get(col)
            .copied()
            .filter(|e| !matches!(extract_value(e), Some(Value::Null)))
    }

    fn required<T>(&self, value: Option<T>, col: &'static str) -> Result<T, SqlError> {
        value.ok_or(SqlError::MissingColumn(col))
    }

    fn text(&self, col: &str) -> Result<Option<String>, SqlError> {
        self.get(col).map(parse_string).transpose()
    }

    fn i64(&self, col: &str) -> Result<Option<i64>, SqlError> {
        self.get(col).map(parse_i64).transpose()
    }

    fn u32(&self, col: &str) -> Result<Option<u32>, SqlError> {
        self.get(col).map(parse_u32).transpose()
    }

    fn ulid(&self, col: &str) -> Result<Option<Ulid>, SqlError> {
        self.get(col).map(parse_ulid).transpose()
    }

    fn date(&self, col: &str) -> Result<Option<NaiveDate>, SqlError> {
        self.get(col).map(parse_date).transpose()
    }

    fn time(&self, col: &str) -> Result<Option<NaiveTime>, SqlError> {
        self.get(col).map(parse_time).transpose()
    }

    fn parsed<T>(&self, col: &str, parse: fn(&str) -> Option<T>) -> Result<Option<T>, SqlError> {
        self.text(col)?
            .map(|s| parse(&s).ok_or_else(|| SqlError::Parse(format!("bad {col}: {s}"))))
            .transpose()
    }

    /// Comma-separated list; an empty string is an empty list.
    fn tags(&self, col: &str) -> Result<Option<Vec<String>>, SqlError> {
        Ok(self.text(col)?.map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        }))
    }

    fn ulid_list(&self, col: &str) -> Result<Option<Vec<Ulid>>, SqlError> {
        let Some(tags) = self.tags(col)? else {
            return Ok(None);
        };
        tags.iter()
            .map(|s| Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}"))))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    let first = tables_with_joins
        .first()
        .ok_or_else(|| SqlError::Parse("DELETE without table".into()))?;
    table_factor_name(&first.relation)
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// One row only: every mutation is a single event.
fn single_values_row(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or_else(|| SqlError::Parse("no VALUES".into()))?;
    let SetExpr::Values(values) = body.body.as_ref() else {
        return Err(SqlError::Parse("expected VALUES".into()));
    };
    match values.rows.as_slice() {
        [row] => Ok(row),
        [] => Err(SqlError::Parse("empty VALUES".into())),
        _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
    }
}

fn where_id(selection: Option<&Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(Value::Boolean(b)) => Ok(b.to_string()),
        _ => Err(SqlError::Parse(format!("expected string, got {expr}"))),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
        _ => Err(SqlError::Parse(format!("expected number, got {expr}"))),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| SqlError::Parse(format!("bad date {s}: {e}")))
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_string(expr)?;
    NaiveTime::parse_from_str(&s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
        .map_err(|e| SqlError::Parse(format!("bad time {s}: {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    UnknownChannel(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "{t}: unknown column {c}"),
            SqlError::UnknownChannel(c) => {
                write!(f, "unknown channel: {c} (expected tables, reservations or slots)")
            }
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
