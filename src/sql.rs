//! The SQL surface: a small fixed dialect over four logical tables —
//! `spots`, `sessions`, `payments`, and the read-only `stats`. INSERT values
//! are positional; filters are flat `col = value` conjunctions.

use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertSpot {
        id: Ulid,
        name: String,
        address: String,
        lat: f64,
        lng: f64,
        rate_cents: Cents,
        total_spots: u32,
        zone: String,
        restrictions: Vec<String>,
    },
    SetAvailability {
        id: Ulid,
        available: u32,
    },
    DeactivateSpot {
        id: Ulid,
    },
    InsertSession {
        plate: String,
        spot_id: Ulid,
        duration_min: u32,
        cost_cents: Cents,
        paid: bool,
    },
    ExtendSession {
        id: Ulid,
        additional_min: u32,
        additional_cost_cents: Cents,
    },
    CancelSession {
        id: Ulid,
    },
    InsertPayment {
        plate: String,
        amount_cents: Cents,
        fee_cents: Cents,
        charge_ref: String,
        session_id: Option<Ulid>,
    },
    ConfirmCharge {
        charge_ref: String,
        receipt: Option<String>,
    },
    FailCharge {
        charge_ref: String,
    },
    RefundPayment {
        id: Ulid,
    },
    SelectSpots {
        zone: Option<String>,
        bbox: Option<BoundingBox>,
    },
    SelectSpot {
        id: Ulid,
    },
    SelectActiveSession {
        plate: String,
    },
    SelectSession {
        id: Ulid,
    },
    SelectSessionHistory {
        plate: String,
        page: u32,
        per_page: u32,
    },
    SelectPayments {
        plate: String,
    },
    SelectPayment {
        id: Ulid,
    },
    SelectPaymentByChargeRef {
        charge_ref: String,
    },
    SelectStats,
    SelectPlateStats {
        plate: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "spots" => {
            if values.len() < 7 {
                return Err(SqlError::WrongArity("spots", 7, values.len()));
            }
            let zone = if values.len() >= 8 {
                parse_string(&values[7])?
            } else {
                String::new()
            };
            let restrictions = if values.len() >= 9 {
                parse_string_list(&values[8])?
            } else {
                Vec::new()
            };
            Ok(Command::InsertSpot {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                address: parse_string(&values[2])?,
                lat: parse_f64(&values[3])?,
                lng: parse_f64(&values[4])?,
                rate_cents: parse_i64(&values[5])?,
                total_spots: parse_u32(&values[6])?,
                zone,
                restrictions,
            })
        }
        "sessions" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("sessions", 4, values.len()));
            }
            let paid = if values.len() >= 5 {
                parse_bool(&values[4])?
            } else {
                false
            };
            Ok(Command::InsertSession {
                plate: parse_string(&values[0])?,
                spot_id: parse_ulid(&values[1])?,
                duration_min: parse_u32(&values[2])?,
                cost_cents: parse_i64(&values[3])?,
                paid,
            })
        }
        "payments" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("payments", 4, values.len()));
            }
            let session_id = if values.len() >= 5 {
                parse_ulid_or_null(&values[4])?
            } else {
                None
            };
            Ok(Command::InsertPayment {
                plate: parse_string(&values[0])?,
                amount_cents: parse_i64(&values[1])?,
                fee_cents: parse_i64(&values[2])?,
                charge_ref: parse_string(&values[3])?,
                session_id,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let filters = extract_eq_filters(selection)?;

    match table.as_str() {
        "spots" => {
            let id = filter_ulid(&filters, "id")?;
            if let Some(expr) = assignment(assignments, "available_spots") {
                return Ok(Command::SetAvailability {
                    id,
                    available: parse_u32(expr)?,
                });
            }
            if let Some(expr) = assignment(assignments, "active") {
                if parse_bool(expr)? {
                    return Err(SqlError::Unsupported("spots cannot be reactivated".into()));
                }
                return Ok(Command::DeactivateSpot { id });
            }
            Err(SqlError::Unsupported("UPDATE spots assignment".into()))
        }
        "sessions" => {
            let id = filter_ulid(&filters, "id")?;
            if let Some(expr) = assignment(assignments, "status") {
                let status = parse_string(expr)?;
                return match SessionStatus::parse(&status) {
                    Some(SessionStatus::Cancelled) => Ok(Command::CancelSession { id }),
                    _ => Err(SqlError::Unsupported(format!(
                        "cannot set session status to {status:?}"
                    ))),
                };
            }
            let additional_min = assignment(assignments, "additional_min")
                .map(parse_u32)
                .transpose()?
                .ok_or(SqlError::MissingFilter("additional_min"))?;
            let additional_cost_cents = assignment(assignments, "additional_cost_cents")
                .map(parse_i64)
                .transpose()?
                .unwrap_or(0);
            Ok(Command::ExtendSession {
                id,
                additional_min,
                additional_cost_cents,
            })
        }
        "payments" => {
            let status_expr = assignment(assignments, "status")
                .ok_or(SqlError::MissingFilter("status"))?;
            let status = parse_string(status_expr)?;
            match PaymentStatus::parse(&status) {
                Some(PaymentStatus::Succeeded) => {
                    let receipt = assignment(assignments, "receipt")
                        .map(parse_string)
                        .transpose()?;
                    Ok(Command::ConfirmCharge {
                        charge_ref: filter_string(&filters, "charge_ref")?,
                        receipt,
                    })
                }
                Some(PaymentStatus::Failed) => Ok(Command::FailCharge {
                    charge_ref: filter_string(&filters, "charge_ref")?,
                }),
                Some(PaymentStatus::Refunded) => Ok(Command::RefundPayment {
                    id: filter_ulid(&filters, "id")?,
                }),
                _ => Err(SqlError::Unsupported(format!(
                    "cannot set payment status to {status:?}"
                ))),
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = extract_eq_filters(&delete.selection)?;

    match table.as_str() {
        // DELETE FROM sessions is cancellation, same as status='cancelled'.
        "sessions" => Ok(Command::CancelSession {
            id: filter_ulid(&filters, "id")?,
        }),
        "spots" => Ok(Command::DeactivateSpot {
            id: filter_ulid(&filters, "id")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = extract_eq_filters(&select.selection)?;

    match table.as_str() {
        "spots" => {
            if filters.iter().any(|(col, _)| col == "id") {
                return Ok(Command::SelectSpot {
                    id: filter_ulid(&filters, "id")?,
                });
            }
            let zone = filter_string_opt(&filters, "zone")?;
            let bbox = extract_bbox(&filters)?;
            Ok(Command::SelectSpots { zone, bbox })
        }
        "sessions" => {
            if filters.iter().any(|(col, _)| col == "id") {
                return Ok(Command::SelectSession {
                    id: filter_ulid(&filters, "id")?,
                });
            }
            let plate = filter_string(&filters, "plate")?;
            if filter_string_opt(&filters, "status")?.as_deref() == Some("active") {
                return Ok(Command::SelectActiveSession { plate });
            }
            let page = filter_u32_opt(&filters, "page")?.unwrap_or(1);
            let per_page = filter_u32_opt(&filters, "per_page")?
                .unwrap_or(crate::limits::DEFAULT_PAGE_SIZE);
            Ok(Command::SelectSessionHistory {
                plate,
                page,
                per_page,
            })
        }
        "payments" => {
            if filters.iter().any(|(col, _)| col == "id") {
                return Ok(Command::SelectPayment {
                    id: filter_ulid(&filters, "id")?,
                });
            }
            if let Some(charge_ref) = filter_string_opt(&filters, "charge_ref")? {
                return Ok(Command::SelectPaymentByChargeRef { charge_ref });
            }
            Ok(Command::SelectPayments {
                plate: filter_string(&filters, "plate")?,
            })
        }
        "stats" => match filter_string_opt(&filters, "plate")? {
            Some(plate) => Ok(Command::SelectPlateStats { plate }),
            None => Ok(Command::SelectStats),
        },
        _ => Err(SqlError::UnknownTable(table)),
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
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn assignment<'a>(assignments: &'a [ast::Assignment], col: &str) -> Option<&'a Expr> {
    assignments.iter().find_map(|a| match &a.target {
        ast::AssignmentTarget::ColumnName(name) => {
            (object_name_last(name).as_deref() == Some(col)).then_some(&a.value)
        }
        _ => None,
    })
}

/// Flatten a WHERE clause of `col = value` terms joined by AND into
/// `(column, value-expr)` pairs. Anything else is rejected.
fn extract_eq_filters(selection: &Option<Expr>) -> Result<Vec<(String, Expr)>, SqlError> {
    let mut filters = Vec::new();
    if let Some(expr) = selection {
        collect_eq_filters(expr, &mut filters)?;
    }
    Ok(filters)
}

fn collect_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)?;
            Ok(())
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column, got {left:?}")))?;
            out.push((col, (**right).clone()));
            Ok(())
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        other => Err(SqlError::Unsupported(format!("filter: {other}"))),
    }
}

fn filter_expr<'a>(filters: &'a [(String, Expr)], col: &str) -> Option<&'a Expr> {
    filters.iter().find(|(c, _)| c == col).map(|(_, e)| e)
}

fn filter_ulid(filters: &[(String, Expr)], col: &'static str) -> Result<Ulid, SqlError> {
    filter_expr(filters, col)
        .ok_or(SqlError::MissingFilter(col))
        .and_then(parse_ulid)
}

fn filter_string(filters: &[(String, Expr)], col: &'static str) -> Result<String, SqlError> {
    filter_expr(filters, col)
        .ok_or(SqlError::MissingFilter(col))
        .and_then(parse_string)
}

fn filter_string_opt(
    filters: &[(String, Expr)],
    col: &'static str,
) -> Result<Option<String>, SqlError> {
    filter_expr(filters, col).map(parse_string).transpose()
}

fn filter_u32_opt(filters: &[(String, Expr)], col: &'static str) -> Result<Option<u32>, SqlError> {
    filter_expr(filters, col).map(parse_u32).transpose()
}

fn filter_f64_opt(filters: &[(String, Expr)], col: &'static str) -> Result<Option<f64>, SqlError> {
    filter_expr(filters, col).map(parse_f64).transpose()
}

/// A bounding box needs all four corners; a partial box is an error rather
/// than a silently unbounded side.
fn extract_bbox(filters: &[(String, Expr)]) -> Result<Option<BoundingBox>, SqlError> {
    let min_lat = filter_f64_opt(filters, "min_lat")?;
    let max_lat = filter_f64_opt(filters, "max_lat")?;
    let min_lng = filter_f64_opt(filters, "min_lng")?;
    let max_lng = filter_f64_opt(filters, "max_lng")?;
    match (min_lat, max_lat, min_lng, max_lng) {
        (None, None, None, None) => Ok(None),
        (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) => Ok(Some(BoundingBox {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })),
        _ => Err(SqlError::MissingFilter("min_lat/max_lat/min_lng/max_lng")),
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

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        Ok(None)
    } else {
        parse_ulid(expr).map(Some)
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// Restriction labels travel as a JSON array inside a string literal.
fn parse_string_list(expr: &Expr) -> Result<Vec<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(Vec::new());
    }
    let raw = parse_string(expr)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).map_err(|e| SqlError::Parse(format!("bad restriction list: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad f64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad f64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_f64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
